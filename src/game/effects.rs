//! 法术与状态结算：法术效果、登场效果、中毒/冰冻计数以及统一的死亡流程。

use tracing::debug;

use super::catalog::{CardEffect, EffectTrigger};
use super::rules::RuleError;
use super::state::{GameEvent, InstanceId, MatchState, Side, StatusKind, Target};

/// 对单位造成伤害，不做死亡判定。
pub fn damage_unit(state: &mut MatchState, side: Side, id: InstanceId, amount: i16) -> Vec<GameEvent> {
    let mut events = Vec::new();
    if amount <= 0 {
        return events;
    }
    if let Some(unit) = state.side_mut(side).unit_mut(id) {
        unit.hp -= amount;
        debug!(%side, id, amount, hp = unit.hp, "unit damaged");
        events.push(GameEvent::DamageDealt {
            side,
            target: Target::Unit { id },
            amount,
        });
    }
    events
}

/// 对 `source` 的敌方全体造成伤害。敌方有城墙单位时英雄不受伤。
pub fn damage_all(state: &mut MatchState, source: Side, amount: i16) -> Vec<GameEvent> {
    let enemy = source.opponent();
    let guarded = state.side(enemy).has_wall_guard();
    let targets: Vec<InstanceId> = state.side(enemy).field.iter().map(|unit| unit.id).collect();

    let mut events = Vec::new();
    for id in targets {
        events.extend(damage_unit(state, enemy, id, amount));
    }
    if guarded {
        debug!(%enemy, "hero shielded by wall guard");
    } else {
        events.extend(state.damage_hero(source, enemy, amount));
    }
    events.extend(resolve_deaths(state));
    events
}

/// 死亡流程：先判定全部死亡单位，再触发亡语，最后移出战场进入墓地。
pub fn resolve_deaths(state: &mut MatchState) -> Vec<GameEvent> {
    let mut dead: Vec<(Side, InstanceId)> = Vec::new();
    for side in [Side::Human, Side::Opponent] {
        dead.extend(
            state
                .side(side)
                .field
                .iter()
                .filter(|unit| unit.is_dead())
                .map(|unit| (side, unit.id)),
        );
    }

    let mut events = Vec::new();
    if dead.is_empty() {
        return events;
    }

    for (side, id) in &dead {
        if let Some(unit) = state.side(*side).unit(*id) {
            events.push(GameEvent::UnitDied {
                side: *side,
                instance_id: *id,
                card_id: unit.card.id,
            });
        }
    }

    for (side, id) in &dead {
        let trigger = state
            .side(*side)
            .unit(*id)
            .and_then(|unit| unit.card.effect_with(EffectTrigger::OnDeath))
            .cloned();
        if let Some(CardEffect::DeathAddToHand { card_id }) = trigger {
            events.extend(state.add_card_to_hand(side.opponent(), card_id));
        }
    }

    for (side, id) in dead {
        let player = state.side_mut(side);
        if let Some(index) = player.unit_index(id) {
            let unit = player.field.remove(index);
            debug!(%side, id, name = %unit.card.name, "unit died");
            player.bury(unit.into_instance());
        }
    }

    events
}

/// 单位从手牌进入战场时同步触发一次。
pub fn apply_summon_effect(state: &mut MatchState, side: Side, unit_id: InstanceId) -> Vec<GameEvent> {
    let effect = state
        .side(side)
        .unit(unit_id)
        .and_then(|unit| unit.card.effect_with(EffectTrigger::OnSummon))
        .cloned();

    match effect {
        Some(CardEffect::SummonDamageAll { amount }) => damage_all(state, side, amount),
        Some(CardEffect::SummonAddToHand { card_id }) => {
            state.add_card_to_hand(side, card_id).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn enemy_unit(state: &MatchState, enemy: Side, id: InstanceId) -> Result<(), RuleError> {
    state
        .side(enemy)
        .unit(id)
        .map(|_| ())
        .ok_or(RuleError::TargetNotFound { id })
}

fn unguarded_hero(state: &MatchState, enemy: Side) -> Result<(), RuleError> {
    if state.side(enemy).has_wall_guard() {
        return Err(RuleError::HeroGuarded);
    }
    Ok(())
}

/// 施法前检查目标，不修改状态。
pub fn validate_spell(
    state: &MatchState,
    caster: Side,
    effect: &CardEffect,
    target: Target,
) -> Result<(), RuleError> {
    let enemy = caster.opponent();
    match (effect, target) {
        (CardEffect::HealSingle { .. }, Target::Hero) => Ok(()),
        (CardEffect::HealSingle { .. }, Target::Unit { id }) => state
            .locate_unit(id)
            .map(|_| ())
            .ok_or(RuleError::TargetNotFound { id }),
        (CardEffect::DamageAll { .. }, _) => Ok(()),
        (CardEffect::DamageSingle { .. } | CardEffect::Poison { .. }, Target::Hero) => {
            unguarded_hero(state, enemy)
        }
        (
            CardEffect::DamageSingle { .. } | CardEffect::Poison { .. } | CardEffect::FreezeSingle { .. },
            Target::Unit { id },
        ) => enemy_unit(state, enemy, id),
        (CardEffect::FreezeSingle { .. } | CardEffect::Haste, Target::Hero) => {
            Err(RuleError::InvalidSpellTarget)
        }
        (CardEffect::Haste, Target::Unit { id }) => {
            let unit = state
                .side(caster)
                .unit(id)
                .ok_or(RuleError::TargetNotFound { id })?;
            let keywords = unit.card.keywords;
            if unit.can_attack
                || unit.attacked_this_turn
                || unit.hasted
                || unit.frozen > 0
                || keywords.rush
                || keywords.super_haste
            {
                return Err(RuleError::HasteNotApplicable { id });
            }
            Ok(())
        }
        _ => Err(RuleError::NotASpellEffect),
    }
}

/// 结算法术效果。调用方需先通过 [`validate_spell`]。
pub fn apply_spell(
    state: &mut MatchState,
    caster: Side,
    effect: &CardEffect,
    target: Target,
) -> Vec<GameEvent> {
    let enemy = caster.opponent();
    match (effect, target) {
        (CardEffect::HealSingle { amount }, Target::Hero) => {
            state.heal_hero(caster, *amount).into_iter().collect()
        }
        (CardEffect::HealSingle { amount }, Target::Unit { id }) => {
            let Some(side) = state.locate_unit(id) else {
                return Vec::new();
            };
            let Some(unit) = state.side_mut(side).unit_mut(id) else {
                return Vec::new();
            };
            let before = unit.hp;
            unit.hp = (unit.hp + amount).min(unit.max_hp).max(before);
            vec![GameEvent::Healed {
                side,
                target,
                amount: unit.hp - before,
            }]
        }
        (CardEffect::DamageAll { amount }, _) => damage_all(state, caster, *amount),
        (CardEffect::DamageSingle { amount }, Target::Hero) => {
            state.damage_hero(caster, enemy, *amount)
        }
        (CardEffect::DamageSingle { amount }, Target::Unit { id }) => {
            let mut events = damage_unit(state, enemy, id, *amount);
            events.extend(resolve_deaths(state));
            events
        }
        (CardEffect::Poison { damage, .. }, Target::Hero) => {
            state.damage_hero(caster, enemy, *damage)
        }
        (CardEffect::Poison { damage, turns }, Target::Unit { id }) => {
            let Some(unit) = state.side_mut(enemy).unit_mut(id) else {
                return Vec::new();
            };
            unit.poison = *turns;
            unit.poison_damage = *damage;
            vec![GameEvent::StatusApplied {
                side: enemy,
                instance_id: id,
                status: StatusKind::Poison {
                    damage: *damage,
                    turns: *turns,
                },
            }]
        }
        (CardEffect::FreezeSingle { turns }, Target::Unit { id }) => {
            let Some(unit) = state.side_mut(enemy).unit_mut(id) else {
                return Vec::new();
            };
            unit.frozen = *turns;
            unit.can_attack = false;
            vec![GameEvent::StatusApplied {
                side: enemy,
                instance_id: id,
                status: StatusKind::Frozen { turns: *turns },
            }]
        }
        (CardEffect::Haste, Target::Unit { id }) => {
            let Some(unit) = state.side_mut(caster).unit_mut(id) else {
                return Vec::new();
            };
            unit.can_attack = true;
            unit.hasted = true;
            vec![GameEvent::StatusApplied {
                side: caster,
                instance_id: id,
                status: StatusKind::Haste,
            }]
        }
        _ => Vec::new(),
    }
}

/// 回合交界处推进状态计数。中毒对双方生效；冰冻只在其控制者回合结束时递减。
pub fn tick_statuses(state: &mut MatchState, ending: Side) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for side in [Side::Human, Side::Opponent] {
        for unit in state.side_mut(side).field.iter_mut() {
            if unit.poison > 0 {
                unit.hp -= unit.poison_damage;
                unit.poison -= 1;
                events.push(GameEvent::PoisonTicked {
                    side,
                    instance_id: unit.id,
                    damage: unit.poison_damage,
                });
            }
            if side == ending && unit.frozen > 0 {
                unit.frozen -= 1;
                if unit.frozen == 0 {
                    unit.can_attack = true;
                    events.push(GameEvent::Thawed {
                        side,
                        instance_id: unit.id,
                    });
                }
            }
        }
    }
    events.extend(resolve_deaths(state));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::SPARK_ID;
    use crate::game::state::fixtures::*;
    use crate::game::state::{FieldUnit, HERO_MAX_HP};

    #[test]
    fn heal_single_caps_at_max_hp() {
        let mut state = human_turn();
        let mut unit = ready(vanilla(1, 4));
        unit.hp = 1;
        let id = unit.id;
        state.human.field.push(unit);

        let effect = CardEffect::HealSingle { amount: 2 };
        validate_spell(&state, Side::Human, &effect, Target::Unit { id }).expect("valid target");
        apply_spell(&mut state, Side::Human, &effect, Target::Unit { id });
        assert_eq!(state.human.unit(id).map(|u| u.hp), Some(3));

        apply_spell(&mut state, Side::Human, &effect, Target::Unit { id });
        assert_eq!(state.human.unit(id).map(|u| u.hp), Some(4));

        state.human.hero_hp = HERO_MAX_HP - 1;
        apply_spell(&mut state, Side::Human, &effect, Target::Hero);
        assert_eq!(state.human.hero_hp, HERO_MAX_HP);
    }

    #[test]
    fn damage_all_hits_units_and_unguarded_hero() {
        let mut state = human_turn();
        let small = ready(vanilla(1, 2));
        let big = ready(vanilla(1, 5));
        let big_id = big.id;
        state.opponent.field.push(small);
        state.opponent.field.push(big);

        let events = apply_spell(
            &mut state,
            Side::Human,
            &CardEffect::DamageAll { amount: 2 },
            Target::Hero,
        );

        assert_eq!(state.opponent.field.len(), 1);
        assert_eq!(state.opponent.unit(big_id).map(|u| u.hp), Some(3));
        assert_eq!(state.opponent.graveyard.len(), 1);
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 2);
        assert!(events.iter().any(|e| matches!(e, GameEvent::UnitDied { .. })));
    }

    #[test]
    fn damage_all_spares_hero_behind_wall_guard() {
        let mut state = human_turn();
        state.opponent.field.push(ready(card(3)));

        apply_spell(
            &mut state,
            Side::Human,
            &CardEffect::DamageAll { amount: 2 },
            Target::Hero,
        );

        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP);
        assert_eq!(state.opponent.field[0].hp, 2);
    }

    #[test]
    fn wall_guard_shields_hero_even_when_it_dies_to_damage_all() {
        let mut state = human_turn();
        let mut guard = ready(card(3));
        guard.hp = 1;
        state.opponent.field.push(guard);

        apply_spell(
            &mut state,
            Side::Human,
            &CardEffect::DamageAll { amount: 2 },
            Target::Hero,
        );

        assert!(state.opponent.field.is_empty());
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP);
    }

    #[test]
    fn single_damage_at_hero_rejected_by_wall_guard() {
        let mut state = human_turn();
        state.opponent.field.push(ready(card(12)));
        let effect = CardEffect::DamageSingle { amount: 3 };

        assert_eq!(
            validate_spell(&state, Side::Human, &effect, Target::Hero),
            Err(RuleError::HeroGuarded)
        );
    }

    #[test]
    fn lethal_spell_declares_caster_winner() {
        let mut state = human_turn();
        state.opponent.hero_hp = 4;

        let events = apply_spell(
            &mut state,
            Side::Human,
            &CardEffect::DamageSingle { amount: 4 },
            Target::Hero,
        );

        assert_eq!(state.winner(), Some(Side::Human));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GameEvent::GameOver { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn poisoned_unit_dies_before_counter_expires() {
        let mut state = human_turn();
        let mut unit = ready(vanilla(1, 1));
        unit.poison = 2;
        unit.poison_damage = 1;
        let id = unit.id;
        state.opponent.field.push(unit);

        let events = tick_statuses(&mut state, Side::Human);

        assert!(state.opponent.unit(id).is_none());
        assert!(state.opponent.graveyard.iter().any(|c| c.id == id));
        assert!(events.contains(&GameEvent::UnitDied {
            side: Side::Opponent,
            instance_id: id,
            card_id: 900
        }));
    }

    #[test]
    fn poison_on_hero_is_a_single_chip() {
        let mut state = human_turn();
        let effect = CardEffect::Poison { damage: 1, turns: 3 };
        apply_spell(&mut state, Side::Human, &effect, Target::Hero);
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 1);

        tick_statuses(&mut state, Side::Human);
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 1);
    }

    #[test]
    fn poison_counts_down_on_every_boundary() {
        let mut state = human_turn();
        let unit = ready(vanilla(1, 10));
        let id = unit.id;
        state.opponent.field.push(unit);
        apply_spell(
            &mut state,
            Side::Human,
            &CardEffect::Poison { damage: 2, turns: 3 },
            Target::Unit { id },
        );

        tick_statuses(&mut state, Side::Human);
        tick_statuses(&mut state, Side::Opponent);
        tick_statuses(&mut state, Side::Human);
        tick_statuses(&mut state, Side::Opponent);

        let unit = state.opponent.unit(id).expect("unit survives");
        assert_eq!(unit.hp, 4);
        assert_eq!(unit.poison, 0);
    }

    #[test]
    fn freeze_rejected_on_hero_and_thaws_at_owner_turn_end() {
        let mut state = human_turn();
        let unit = ready(vanilla(2, 2));
        let id = unit.id;
        state.opponent.field.push(unit);
        let effect = CardEffect::FreezeSingle { turns: 1 };

        assert_eq!(
            validate_spell(&state, Side::Human, &effect, Target::Hero),
            Err(RuleError::InvalidSpellTarget)
        );

        apply_spell(&mut state, Side::Human, &effect, Target::Unit { id });
        assert!(!state.opponent.field[0].can_attack);

        tick_statuses(&mut state, Side::Human);
        assert_eq!(state.opponent.field[0].frozen, 1);

        let events = tick_statuses(&mut state, Side::Opponent);
        assert_eq!(state.opponent.field[0].frozen, 0);
        assert!(events.contains(&GameEvent::Thawed {
            side: Side::Opponent,
            instance_id: id
        }));
    }

    #[test]
    fn haste_readies_fresh_friendly_unit_once() {
        let mut state = human_turn();
        let unit = FieldUnit::summon(vanilla(2, 2));
        let id = unit.id;
        state.human.field.push(unit);

        validate_spell(&state, Side::Human, &CardEffect::Haste, Target::Unit { id })
            .expect("fresh unit accepts haste");
        apply_spell(&mut state, Side::Human, &CardEffect::Haste, Target::Unit { id });
        assert!(state.human.field[0].can_attack);
        assert!(state.human.field[0].hasted);

        assert_eq!(
            validate_spell(&state, Side::Human, &CardEffect::Haste, Target::Unit { id }),
            Err(RuleError::HasteNotApplicable { id })
        );
    }

    #[test]
    fn haste_rejects_rush_units_and_enemies() {
        let mut state = human_turn();
        let rush = FieldUnit::summon(card(2));
        let rush_id = rush.id;
        state.human.field.push(rush);
        let enemy = FieldUnit::summon(vanilla(1, 1));
        let enemy_id = enemy.id;
        state.opponent.field.push(enemy);

        assert_eq!(
            validate_spell(&state, Side::Human, &CardEffect::Haste, Target::Unit { id: rush_id }),
            Err(RuleError::HasteNotApplicable { id: rush_id })
        );
        assert_eq!(
            validate_spell(&state, Side::Human, &CardEffect::Haste, Target::Unit { id: enemy_id }),
            Err(RuleError::TargetNotFound { id: enemy_id })
        );
    }

    #[test]
    fn summon_trigger_adds_card_to_own_hand() {
        let mut state = human_turn();
        let unit = FieldUnit::summon(card(9));
        let id = unit.id;
        state.human.field.push(unit);

        let events = apply_summon_effect(&mut state, Side::Human, id);

        assert_eq!(state.human.hand.len(), 1);
        assert_eq!(state.human.hand[0].card.id, SPARK_ID);
        assert!(matches!(events[0], GameEvent::CardAddedToHand { side: Side::Human, .. }));
    }

    #[test]
    fn summon_damage_all_belongs_to_summoner() {
        let mut state = human_turn();
        state.human.field.push(ready(vanilla(1, 1)));
        state.opponent.field.push(ready(vanilla(1, 1)));
        let herald = FieldUnit::summon(card(8));
        let id = herald.id;
        state.human.field.push(herald);

        apply_summon_effect(&mut state, Side::Human, id);

        assert_eq!(state.human.field.len(), 2);
        assert!(state.opponent.field.is_empty());
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 1);
    }

    #[test]
    fn death_trigger_rewards_opponent_of_owner() {
        let mut state = human_turn();
        let mut warden = ready(card(10));
        warden.hp = 0;
        state.opponent.field.push(warden);

        let events = resolve_deaths(&mut state);

        assert_eq!(state.human.hand.len(), 1);
        assert_eq!(state.human.hand[0].card.id, SPARK_ID);
        assert!(state.opponent.hand.is_empty());
        assert!(matches!(events[0], GameEvent::UnitDied { .. }));
        assert!(matches!(events[1], GameEvent::CardAddedToHand { side: Side::Human, .. }));
    }
}

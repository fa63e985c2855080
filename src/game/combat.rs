//! 战斗结算。

use tracing::debug;

use super::catalog::{CardEffect, EffectTrigger};
use super::effects::{damage_unit, resolve_deaths};
use super::rules::RuleError;
use super::state::{FieldUnit, GameEvent, InstanceId, MatchState, Side, Target};

/// 检查攻击合法性，不修改状态。
pub fn validate_attack(
    state: &MatchState,
    side: Side,
    attacker_id: InstanceId,
    target: Target,
) -> Result<(), RuleError> {
    let attacker = state
        .side(side)
        .unit(attacker_id)
        .ok_or(RuleError::AttackerNotFound { id: attacker_id })?;
    if !attacker.can_attack {
        return Err(RuleError::AttackerNotReady { id: attacker_id });
    }

    let defender = state.side(side.opponent());
    match target {
        Target::Hero => {
            if attacker.just_summoned_with_rush {
                return Err(RuleError::RushCannotTargetHero { id: attacker_id });
            }
            if defender.has_wall_guard() {
                return Err(RuleError::HeroGuarded);
            }
        }
        Target::Unit { id } => {
            let unit = defender.unit(id).ok_or(RuleError::TargetNotFound { id })?;
            if unit.stealthed {
                return Err(RuleError::TargetStealthed { id });
            }
        }
    }
    Ok(())
}

fn self_damage(attacker: &FieldUnit) -> i16 {
    match attacker.card.effect_with(EffectTrigger::OnAttack) {
        Some(CardEffect::AttackSelfDamage { amount }) => *amount,
        _ => 0,
    }
}

/// 对英雄的伤害。"英雄加成"等于再加一次攻击力。
fn hero_damage(attacker: &FieldUnit) -> i16 {
    match attacker.card.effect_with(EffectTrigger::OnAttack) {
        Some(CardEffect::AttackBonusVsHero) => attacker.attack() * 2,
        _ => attacker.attack(),
    }
}

/// 结算一次攻击：伤害先于死亡判定，死亡判定先于亡语，亡语先于移除。
pub fn resolve_attack(
    state: &mut MatchState,
    side: Side,
    attacker_id: InstanceId,
    target: Target,
) -> Result<Vec<GameEvent>, RuleError> {
    validate_attack(state, side, attacker_id, target)?;

    let enemy = side.opponent();
    let attacker = state
        .side_mut(side)
        .unit_mut(attacker_id)
        .ok_or(RuleError::AttackerNotFound { id: attacker_id })?;
    attacker.can_attack = false;
    attacker.attacked_this_turn = true;
    attacker.stealthed = false;
    attacker.just_summoned_with_rush = false;
    let recoil = self_damage(attacker);
    let snapshot = attacker.clone();

    let mut events = Vec::new();
    let (damage, retaliation) = match target {
        Target::Hero => {
            let damage = hero_damage(&snapshot);
            events.extend(state.damage_hero(side, enemy, damage));
            (damage, 0)
        }
        Target::Unit { id } => {
            let retaliation = state
                .side(enemy)
                .unit(id)
                .map(FieldUnit::attack)
                .unwrap_or_default();
            let damage = snapshot.attack();
            events.extend(damage_unit(state, enemy, id, damage));
            events.extend(damage_unit(state, side, attacker_id, retaliation));
            (damage, retaliation)
        }
    };
    debug!(%side, attacker_id, ?target, damage, retaliation, "attack exchanged");

    events.insert(
        0,
        GameEvent::AttackResolved {
            side,
            attacker_id,
            target,
            damage,
            retaliation,
        },
    );

    if recoil > 0 {
        events.extend(damage_unit(state, side, attacker_id, recoil));
    }
    events.extend(resolve_deaths(state));
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::SPARK_ID;
    use crate::game::state::fixtures::*;
    use crate::game::state::HERO_MAX_HP;

    fn attack_setup(attacker: FieldUnit, defender: Option<FieldUnit>) -> (MatchState, InstanceId) {
        let mut state = human_turn();
        let id = attacker.id;
        state.human.field.push(attacker);
        if let Some(defender) = defender {
            state.opponent.field.push(defender);
        }
        (state, id)
    }

    #[test]
    fn equal_trade_destroys_both_units() {
        let defender = ready(vanilla(2, 2));
        let defender_id = defender.id;
        let (mut state, attacker_id) = attack_setup(ready(vanilla(3, 2)), Some(defender));

        let events = resolve_attack(&mut state, Side::Human, attacker_id, Target::Unit { id: defender_id })
            .expect("attack should resolve");

        assert!(state.human.field.is_empty());
        assert!(state.opponent.field.is_empty());
        assert!(state.human.graveyard.iter().any(|c| c.id == attacker_id));
        assert!(state.opponent.graveyard.iter().any(|c| c.id == defender_id));
        assert_eq!(
            events[0],
            GameEvent::AttackResolved {
                side: Side::Human,
                attacker_id,
                target: Target::Unit { id: defender_id },
                damage: 3,
                retaliation: 2,
            }
        );
        state.integrity_check().expect("no duplicated instances");
    }

    #[test]
    fn hero_attack_reduces_hp_and_exhausts_attacker() {
        let (mut state, id) = attack_setup(ready(vanilla(3, 3)), None);

        resolve_attack(&mut state, Side::Human, id, Target::Hero).expect("attack should resolve");

        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 3);
        let attacker = state.human.unit(id).expect("attacker survives");
        assert!(!attacker.can_attack);
        assert!(attacker.attacked_this_turn);

        assert_eq!(
            resolve_attack(&mut state, Side::Human, id, Target::Hero),
            Err(RuleError::AttackerNotReady { id })
        );
    }

    #[test]
    fn bonus_vs_hero_doubles_damage() {
        let (mut state, id) = attack_setup(ready(card(7)), None);
        resolve_attack(&mut state, Side::Human, id, Target::Hero).expect("attack should resolve");
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 6);
    }

    #[test]
    fn wall_guard_blocks_hero_until_it_dies() {
        let mut guard = ready(card(3));
        guard.hp = 1;
        let guard_id = guard.id;
        let (mut state, id) = attack_setup(ready(vanilla(2, 5)), Some(guard));
        let second = ready(vanilla(2, 5));
        let second_id = second.id;
        state.human.field.push(second);

        assert_eq!(
            resolve_attack(&mut state, Side::Human, id, Target::Hero),
            Err(RuleError::HeroGuarded)
        );
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP);

        resolve_attack(&mut state, Side::Human, id, Target::Unit { id: guard_id })
            .expect("guard can be attacked");
        resolve_attack(&mut state, Side::Human, second_id, Target::Hero)
            .expect("hero is open once the guard is gone");
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 2);
    }

    #[test]
    fn stealthed_units_cannot_be_attacked_until_they_strike() {
        let stalker = ready(card(4));
        let stalker_id = stalker.id;
        let (mut state, id) = attack_setup(ready(vanilla(1, 5)), Some(stalker));

        assert_eq!(
            resolve_attack(&mut state, Side::Human, id, Target::Unit { id: stalker_id }),
            Err(RuleError::TargetStealthed { id: stalker_id })
        );

        state.phase = crate::game::state::MatchPhase::TurnActive { side: Side::Opponent };
        resolve_attack(&mut state, Side::Opponent, stalker_id, Target::Hero)
            .expect("stalker attacks");
        assert!(!state.opponent.unit(stalker_id).expect("alive").stealthed);
        assert!(validate_attack(&state, Side::Human, id, Target::Unit { id: stalker_id }).is_ok());
    }

    #[test]
    fn rush_units_cannot_hit_hero_on_summon_turn() {
        let rusher = FieldUnit::summon(card(2));
        assert!(rusher.can_attack);
        let defender = ready(vanilla(0, 3));
        let defender_id = defender.id;
        let (mut state, id) = attack_setup(rusher, Some(defender));

        assert_eq!(
            resolve_attack(&mut state, Side::Human, id, Target::Hero),
            Err(RuleError::RushCannotTargetHero { id })
        );
        resolve_attack(&mut state, Side::Human, id, Target::Unit { id: defender_id })
            .expect("rush may hit units");
    }

    #[test]
    fn super_haste_can_hit_hero_immediately() {
        let courier = FieldUnit::summon(card(5));
        let (mut state, id) = attack_setup(courier, None);
        resolve_attack(&mut state, Side::Human, id, Target::Hero).expect("super haste hits hero");
        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 2);
    }

    #[test]
    fn self_damage_can_kill_attacker_after_hero_hit() {
        let mut berserker = ready(card(6));
        berserker.hp = 1;
        let (mut state, id) = attack_setup(berserker, None);

        resolve_attack(&mut state, Side::Human, id, Target::Hero).expect("attack should resolve");

        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 4);
        assert!(state.human.field.is_empty());
        assert!(state.human.graveyard.iter().any(|c| c.id == id));
    }

    #[test]
    fn recoil_kills_attacker_that_survives_the_exchange() {
        let mut berserker = ready(card(6));
        berserker.hp = 1;
        let wall = ready(vanilla(0, 5));
        let wall_id = wall.id;
        let (mut state, id) = attack_setup(berserker, Some(wall));

        resolve_attack(&mut state, Side::Human, id, Target::Unit { id: wall_id })
            .expect("attack should resolve");

        assert!(state.human.unit(id).is_none());
        assert!(state.human.graveyard.iter().any(|c| c.id == id));
        assert_eq!(state.opponent.unit(wall_id).expect("wall survives").hp, 1);
    }

    #[test]
    fn hasted_unit_reaches_the_hero() {
        let mut runner = FieldUnit::summon(vanilla(2, 2));
        runner.can_attack = true;
        runner.hasted = true;
        let (mut state, id) = attack_setup(runner, None);

        resolve_attack(&mut state, Side::Human, id, Target::Hero).expect("hasted unit hits hero");

        assert_eq!(state.opponent.hero_hp, HERO_MAX_HP - 2);
    }

    #[test]
    fn death_trigger_fires_for_the_killer_side() {
        let warden = ready(card(10));
        let warden_id = warden.id;
        let (mut state, id) = attack_setup(ready(vanilla(5, 5)), Some(warden));

        resolve_attack(&mut state, Side::Human, id, Target::Unit { id: warden_id })
            .expect("attack should resolve");

        assert_eq!(state.human.hand.len(), 1);
        assert_eq!(state.human.hand[0].card.id, SPARK_ID);
    }

    #[test]
    fn lethal_hero_attack_declares_winner() {
        let (mut state, id) = attack_setup(ready(vanilla(5, 5)), None);
        state.opponent.hero_hp = 3;

        let events = resolve_attack(&mut state, Side::Human, id, Target::Hero)
            .expect("attack should resolve");

        assert_eq!(state.opponent.hero_hp, 0);
        assert_eq!(state.winner(), Some(Side::Human));
        assert!(events.contains(&GameEvent::GameOver { winner: Side::Human }));
    }
}

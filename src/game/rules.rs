use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::{
    catalog::CardType,
    combat::resolve_attack,
    deck::{build_deck, reinstantiate},
    effects::{apply_spell, apply_summon_effect, tick_statuses, validate_spell},
    state::{
        FieldUnit, GameEvent, InstanceId, IntegrityError, MatchPhase, MatchState, Side, SideState,
        Target, MANA_CAP,
    },
};
use crate::config::MatchConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the match is over")]
    GameFinished,
    #[error("the match has not started")]
    NotStarted,
    #[error("the match already started")]
    AlreadyStarted,
    #[error("it is not {side}'s turn")]
    NotYourTurn { side: Side },
    #[error("the opponent is still acting")]
    OpponentActing,
    #[error("the coin flip has not been finalized")]
    CoinFlipPending,
    #[error("the coin flip was already finalized")]
    CoinFlipAlreadyFinalized,
    #[error("the mulligan was already used")]
    MulliganAlreadyUsed,
    #[error("card {id} is not in hand")]
    CardNotInHand { id: InstanceId },
    #[error("expected a {expected:?} card, found {actual:?}")]
    CardTypeMismatch { expected: CardType, actual: CardType },
    #[error("card costs {required} mana, {available} available")]
    InsufficientMana { required: u8, available: u8 },
    #[error("the field is full")]
    FieldFull,
    #[error("attacker {id} is not on the field")]
    AttackerNotFound { id: InstanceId },
    #[error("attacker {id} cannot attack right now")]
    AttackerNotReady { id: InstanceId },
    #[error("rush unit {id} cannot attack the hero on the turn it arrives")]
    RushCannotTargetHero { id: InstanceId },
    #[error("the hero is protected by a wall guard")]
    HeroGuarded,
    #[error("target {id} is not on the field")]
    TargetNotFound { id: InstanceId },
    #[error("target {id} is stealthed")]
    TargetStealthed { id: InstanceId },
    #[error("this spell cannot target that")]
    InvalidSpellTarget,
    #[error("unit {id} cannot be hasted")]
    HasteNotApplicable { id: InstanceId },
    #[error("the card has no spell effect")]
    NotASpellEffect,
    #[error("state integrity violated: {error}")]
    IntegrityViolation { error: IntegrityError },
}

/// 回合控制与规则命令入口。所有命令在出错时不改变状态。
pub struct RuleEngine {
    config: MatchConfig,
    rng: SmallRng,
}

impl RuleEngine {
    pub fn new(config: MatchConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    fn ensure_integrity(state: &MatchState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_pre_game(state: &MatchState) -> Result<(), RuleError> {
        match state.phase {
            MatchPhase::PreGame => Ok(()),
            MatchPhase::TurnActive { .. } => Err(RuleError::AlreadyStarted),
            MatchPhase::GameOver { .. } => Err(RuleError::GameFinished),
        }
    }

    fn ensure_turn_owner(state: &MatchState, side: Side) -> Result<(), RuleError> {
        match state.phase {
            MatchPhase::PreGame => Err(RuleError::NotStarted),
            MatchPhase::GameOver { .. } => Err(RuleError::GameFinished),
            MatchPhase::TurnActive { side: active } if active == side => Ok(()),
            MatchPhase::TurnActive { .. } => Err(RuleError::NotYourTurn { side }),
        }
    }

    /// 新建对局：双方随机牌库并发放起手牌，停在开局阶段。
    pub fn new_match(&mut self) -> MatchState {
        let deck_size = self.config.deck_size;
        let max_copies = self.config.max_copies;
        let human_deck = build_deck(&mut self.rng, deck_size, max_copies);
        let opponent_deck = build_deck(&mut self.rng, deck_size, max_copies);

        let mut state = MatchState::new(
            SideState::new(Side::Human, human_deck),
            SideState::new(Side::Opponent, opponent_deck),
        );
        let hand = self.config.starting_hand;
        let mut events = state.draw_cards(Side::Human, hand);
        events.extend(state.draw_cards(Side::Opponent, hand));
        state.record_all(&events);
        info!(hand, deck_size, "new match dealt");
        state
    }

    pub fn reset_match(&mut self, state: &mut MatchState) -> Vec<GameEvent> {
        *state = self.new_match();
        state.record_event(GameEvent::MatchReset);
        vec![GameEvent::MatchReset]
    }

    pub fn flip_coin(&mut self) -> Side {
        if self.rng.gen_bool(0.5) {
            Side::Human
        } else {
            Side::Opponent
        }
    }

    pub fn finalize_coin_flip(
        &mut self,
        state: &mut MatchState,
        winner: Side,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_pre_game(state)?;
        if state.first_side.is_some() {
            return Err(RuleError::CoinFlipAlreadyFinalized);
        }
        state.first_side = Some(winner);
        let event = GameEvent::CoinFlipFinalized { winner };
        state.record_event(event.clone());
        info!(%winner, "coin flip finalized");
        Ok(vec![event])
    }

    /// 人类换牌：未保留的牌换成牌库顶的新牌，旧牌以新身份洗回牌库。
    pub fn mulligan(
        &mut self,
        state: &mut MatchState,
        keep: &[InstanceId],
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_pre_game(state)?;
        Self::ensure_integrity(state)?;
        if state.mulligan_used {
            return Err(RuleError::MulliganAlreadyUsed);
        }
        if let Some(missing) = keep.iter().find(|id| state.human.hand_index(**id).is_none()) {
            return Err(RuleError::CardNotInHand { id: *missing });
        }

        let player = &mut state.human;
        let (kept, returned): (Vec<_>, Vec<_>) = player
            .hand
            .drain(..)
            .partition(|card| keep.contains(&card.id));
        player.hand = kept;
        let replaced: Vec<InstanceId> = returned.iter().map(|card| card.id).collect();

        let mut events = state.draw_cards(Side::Human, replaced.len());

        let player = &mut state.human;
        player.deck.extend(returned.into_iter().map(reinstantiate));
        player.deck.shuffle(&mut self.rng);
        state.mulligan_used = true;

        debug!(replaced = replaced.len(), "mulligan applied");
        events.push(GameEvent::MulliganApplied {
            side: Side::Human,
            replaced,
        });
        state.record_all(&events);
        Ok(events)
    }

    /// 离开开局阶段：先手方为人类则回合数为 1，否则为 2。
    pub fn start_match(&mut self, state: &mut MatchState) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_pre_game(state)?;
        Self::ensure_integrity(state)?;
        let first = state.first_side.ok_or(RuleError::CoinFlipPending)?;
        state.mulligan_used = true;
        state.turn = match first {
            Side::Human => 1,
            Side::Opponent => 2,
        };
        let events = Self::enter_turn(state, false);
        state.record_all(&events);
        Ok(events)
    }

    /// 进入回合：清空双方攻击状态，行动方抽牌、涨法力并就绪单位。
    fn enter_turn(state: &mut MatchState, draw: bool) -> Vec<GameEvent> {
        let side = MatchState::side_for_turn(state.turn);
        state.phase = MatchPhase::TurnActive { side };

        for unit in state
            .human
            .field
            .iter_mut()
            .chain(state.opponent.field.iter_mut())
        {
            unit.can_attack = false;
            unit.just_summoned_with_rush = false;
            unit.hasted = false;
            unit.attacked_this_turn = false;
        }

        let mut events = Vec::new();
        if draw {
            events.extend(state.draw_card(side));
        }

        let turn = state.turn;
        let player = state.side_mut(side);
        player.max_mana = (player.max_mana + 1).min(MANA_CAP);
        player.mana = player.max_mana;
        for unit in player.field.iter_mut() {
            unit.can_attack = unit.frozen == 0;
        }

        info!(%side, turn, mana = player.max_mana, "turn started");
        events.push(GameEvent::TurnStarted { side, turn });
        events
    }

    pub fn end_turn(
        &mut self,
        state: &mut MatchState,
        side: Side,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_turn_owner(state, side)?;
        Self::ensure_integrity(state)?;

        let mut events = vec![GameEvent::TurnEnded {
            side,
            turn: state.turn,
        }];
        events.extend(tick_statuses(state, side));

        if !state.is_finished() {
            state.turn += 1;
            events.extend(Self::enter_turn(state, true));
        }
        state.record_all(&events);
        Ok(events)
    }

    pub fn play_unit(
        &mut self,
        state: &mut MatchState,
        side: Side,
        card_id: InstanceId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_turn_owner(state, side)?;
        Self::ensure_integrity(state)?;

        let player = state.side(side);
        let card = player
            .hand_card(card_id)
            .ok_or(RuleError::CardNotInHand { id: card_id })?;
        if card.card.card_type != CardType::Unit {
            return Err(RuleError::CardTypeMismatch {
                expected: CardType::Unit,
                actual: card.card.card_type,
            });
        }
        if player.mana < card.card.cost {
            return Err(RuleError::InsufficientMana {
                required: card.card.cost,
                available: player.mana,
            });
        }
        if player.field_full() {
            return Err(RuleError::FieldFull);
        }

        let player = state.side_mut(side);
        let index = player
            .hand_index(card_id)
            .ok_or(RuleError::CardNotInHand { id: card_id })?;
        let card = player.hand.remove(index);
        player.mana -= card.card.cost;
        let definition_id = card.card.id;
        info!(%side, card_id, name = %card.card.name, "unit played");
        player.field.push(FieldUnit::summon(card));

        let mut events = vec![GameEvent::UnitPlayed {
            side,
            instance_id: card_id,
            card_id: definition_id,
        }];
        events.extend(apply_summon_effect(state, side, card_id));
        state.record_all(&events);
        Ok(events)
    }

    pub fn cast_spell(
        &mut self,
        state: &mut MatchState,
        side: Side,
        card_id: InstanceId,
        target: Target,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_turn_owner(state, side)?;
        Self::ensure_integrity(state)?;

        let player = state.side(side);
        let card = player
            .hand_card(card_id)
            .ok_or(RuleError::CardNotInHand { id: card_id })?;
        if card.card.card_type != CardType::Spell {
            return Err(RuleError::CardTypeMismatch {
                expected: CardType::Spell,
                actual: card.card.card_type,
            });
        }
        if player.mana < card.card.cost {
            return Err(RuleError::InsufficientMana {
                required: card.card.cost,
                available: player.mana,
            });
        }
        let effect = card.card.effect.clone().ok_or(RuleError::NotASpellEffect)?;
        validate_spell(state, side, &effect, target)?;

        let player = state.side_mut(side);
        let index = player
            .hand_index(card_id)
            .ok_or(RuleError::CardNotInHand { id: card_id })?;
        let card = player.hand.remove(index);
        player.mana -= card.card.cost;
        let definition_id = card.card.id;
        info!(%side, card_id, name = %card.card.name, ?target, "spell cast");
        player.bury(card);

        let mut events = vec![GameEvent::SpellCast {
            side,
            instance_id: card_id,
            card_id: definition_id,
            target,
        }];
        events.extend(apply_spell(state, side, &effect, target));
        state.record_all(&events);
        Ok(events)
    }

    pub fn attack(
        &mut self,
        state: &mut MatchState,
        side: Side,
        attacker_id: InstanceId,
        target: Target,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_turn_owner(state, side)?;
        Self::ensure_integrity(state)?;

        let events = resolve_attack(state, side, attacker_id, target)?;
        info!(%side, attacker_id, ?target, "attack resolved");
        state.record_all(&events);
        Ok(events)
    }
}

//! 一局对战的会话层：持有状态、规则引擎、回合计时与进行中的对手回合。
//!
//! 对外命令都不会失败，结果统一包装为 [`CommandOutcome`]，被拒绝的命令记录原因且不改变状态。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::{ClockSignal, ClockStatus, TurnClock};
use super::deck::reserve_ids_through;
use super::rules::{RuleEngine, RuleError};
use super::state::{
    CardInstance, FieldUnit, GameEvent, InstanceId, MatchPhase, MatchState, Side, SideState, Target,
};
use crate::ai::policy::{CancelToken, OpponentTurn, PolicyAction};
use crate::config::MatchConfig;

/// 对手一个回合内最多执行的步数。
const MAX_OPPONENT_STEPS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutcome {
    pub accepted: bool,
    #[serde(default)]
    pub events: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RuleError>,
}

impl CommandOutcome {
    pub fn accepted(events: Vec<GameEvent>) -> Self {
        Self {
            accepted: true,
            events,
            rejection: None,
        }
    }

    pub fn rejected(error: RuleError) -> Self {
        Self {
            accepted: false,
            events: Vec::new(),
            rejection: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SideView {
    pub side: Side,
    pub hero_hp: i16,
    pub mana: u8,
    pub max_mana: u8,
    pub deck_count: usize,
    pub hand_count: usize,
    /// 只有人类一方的手牌内容可见。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand: Option<Vec<CardInstance>>,
    pub field: Vec<FieldUnit>,
    pub graveyard: Vec<CardInstance>,
}

impl SideView {
    fn from_side(player: &SideState, reveal_hand: bool) -> Self {
        Self {
            side: player.side,
            hero_hp: player.hero_hp,
            mana: player.mana,
            max_mana: player.max_mana,
            deck_count: player.deck.len(),
            hand_count: player.hand.len(),
            hand: reveal_hand.then(|| player.hand.clone()),
            field: player.field.clone(),
            graveyard: player.graveyard.clone(),
        }
    }
}

/// 展示层读取的只读快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchView {
    pub turn: u32,
    pub phase: MatchPhase,
    pub active_side: Option<Side>,
    pub first_side: Option<Side>,
    pub winner: Option<Side>,
    pub mulligan_used: bool,
    pub human: SideView,
    pub opponent: SideView,
    pub clock_remaining_secs: u32,
    pub clock_status: ClockStatus,
    pub opponent_acting: bool,
}

pub struct Match {
    state: MatchState,
    rules: RuleEngine,
    clock: TurnClock,
    opponent_turn: Option<OpponentTurn>,
    cancel: CancelToken,
}

impl Match {
    pub fn new(config: MatchConfig) -> Self {
        let clock = TurnClock::from_secs(config.turn_seconds);
        let mut rules = RuleEngine::new(config);
        let state = rules.new_match();
        Self {
            state,
            rules,
            clock,
            opponent_turn: None,
            cancel: CancelToken::new(),
        }
    }

    /// 从已有状态恢复。若正处于某方回合，重新计时；对手回合则重新开始策略。
    /// 载入状态中的实例编号之后不会再被分配。
    pub fn with_state(config: MatchConfig, state: MatchState) -> Self {
        if let Some(max_id) = state.max_instance_id() {
            reserve_ids_through(max_id);
        }
        let mut session = Self::new(config);
        session.state = state;
        if let Some(side) = session.state.active_side() {
            session.begin_turn(side);
        }
        session
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn config(&self) -> &MatchConfig {
        self.rules.config()
    }

    pub fn clock(&self) -> &TurnClock {
        &self.clock
    }

    pub fn event_log(&self) -> &[GameEvent] {
        &self.state.event_log
    }

    pub fn opponent_turn_pending(&self) -> bool {
        self.opponent_turn.is_some()
    }

    pub fn view(&self) -> MatchView {
        MatchView {
            turn: self.state.turn,
            phase: self.state.phase,
            active_side: self.state.active_side(),
            first_side: self.state.first_side,
            winner: self.state.winner(),
            mulligan_used: self.state.mulligan_used,
            human: SideView::from_side(&self.state.human, true),
            opponent: SideView::from_side(&self.state.opponent, false),
            clock_remaining_secs: self.clock.remaining_secs(),
            clock_status: self.clock.status(),
            opponent_acting: self.opponent_turn.is_some(),
        }
    }

    fn begin_turn(&mut self, side: Side) {
        self.clock.arm(side);
        self.opponent_turn = match side {
            Side::Opponent => Some(OpponentTurn::new(side, self.cancel.clone())),
            Side::Human => None,
        };
    }

    fn halt(&mut self) {
        self.clock.stop();
        self.cancel.cancel();
        self.opponent_turn = None;
    }

    /// 命令完成后的统一收尾：回合切换时重新计时，对局结束时停表并取消对手回合。
    fn settle(&mut self, command: &str, result: Result<Vec<GameEvent>, RuleError>) -> CommandOutcome {
        match result {
            Ok(events) => {
                let started = events.iter().rev().find_map(|event| match event {
                    GameEvent::TurnStarted { side, .. } => Some(*side),
                    _ => None,
                });
                if self.state.is_finished() {
                    self.halt();
                } else if let Some(side) = started {
                    self.begin_turn(side);
                }
                debug!(command, events = events.len(), "command accepted");
                CommandOutcome::accepted(events)
            }
            Err(error) => {
                warn!(command, reason = %error, "command rejected");
                CommandOutcome::rejected(error)
            }
        }
    }

    fn ensure_human_may_act(&self) -> Result<(), RuleError> {
        if self.opponent_turn.is_some() && !self.state.is_finished() {
            return Err(RuleError::OpponentActing);
        }
        Ok(())
    }

    /// 由对局随机数决定先手方，不修改状态。
    pub fn flip_coin(&mut self) -> Side {
        self.rules.flip_coin()
    }

    pub fn finalize_coin_flip(&mut self, winner: Side) -> CommandOutcome {
        let result = self.rules.finalize_coin_flip(&mut self.state, winner);
        self.settle("finalize_coin_flip", result)
    }

    pub fn mulligan(&mut self, keep: &[InstanceId]) -> CommandOutcome {
        let result = self.rules.mulligan(&mut self.state, keep);
        self.settle("mulligan", result)
    }

    pub fn start_match(&mut self) -> CommandOutcome {
        let result = self.rules.start_match(&mut self.state);
        self.settle("start_match", result)
    }

    pub fn play_unit(&mut self, card_id: InstanceId) -> CommandOutcome {
        let result = self
            .ensure_human_may_act()
            .and_then(|_| self.rules.play_unit(&mut self.state, Side::Human, card_id));
        self.settle("play_unit", result)
    }

    pub fn cast_spell(&mut self, card_id: InstanceId, target: Target) -> CommandOutcome {
        let result = self
            .ensure_human_may_act()
            .and_then(|_| self.rules.cast_spell(&mut self.state, Side::Human, card_id, target));
        self.settle("cast_spell", result)
    }

    pub fn attack(&mut self, attacker_id: InstanceId, target: Target) -> CommandOutcome {
        let result = self
            .ensure_human_may_act()
            .and_then(|_| self.rules.attack(&mut self.state, Side::Human, attacker_id, target));
        self.settle("attack", result)
    }

    pub fn end_turn(&mut self) -> CommandOutcome {
        let result = self
            .ensure_human_may_act()
            .and_then(|_| self.rules.end_turn(&mut self.state, Side::Human));
        self.settle("end_turn", result)
    }

    /// 重建双方牌库与手牌，回到开局阶段。进行中的对手回合被取消。
    pub fn reset_match(&mut self) -> CommandOutcome {
        self.cancel.cancel();
        self.cancel = CancelToken::new();
        self.opponent_turn = None;
        self.clock.reset();
        let events = self.rules.reset_match(&mut self.state);
        info!("match reset");
        CommandOutcome::accepted(events)
    }

    pub fn pause_clock(&mut self) {
        self.clock.pause();
    }

    pub fn resume_clock(&mut self) {
        self.clock.resume();
    }

    /// 推进回合计时。超时等同于该方主动结束回合。
    pub fn advance_clock(&mut self, elapsed: Duration) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.state.is_finished() {
            return events;
        }
        for signal in self.clock.advance(elapsed) {
            match signal {
                ClockSignal::Tick {
                    side,
                    remaining_secs,
                } => {
                    // 计时通知只发给展示层，不进入对局日志。
                    events.push(GameEvent::ClockTick {
                        side,
                        remaining_secs,
                    });
                }
                ClockSignal::Expired { side } => {
                    info!(%side, "turn clock expired");
                    if side == Side::Opponent {
                        self.opponent_turn = None;
                    }
                    let result = self.rules.end_turn(&mut self.state, side);
                    let outcome = self.settle("clock_expired", result);
                    events.extend(outcome.events);
                }
            }
        }
        events
    }

    /// 执行对手回合的下一步。没有进行中的对手回合时返回 `None`。
    pub fn step_opponent(&mut self) -> Option<CommandOutcome> {
        let mut turn = self.opponent_turn.take()?;
        let Some(action) = turn.next_action(&self.state) else {
            debug!("opponent turn finished");
            return None;
        };
        let side = turn.side();
        self.opponent_turn = Some(turn);

        let (command, result) = match action {
            PolicyAction::PlayUnit { card_id } => {
                ("opponent_play_unit", self.rules.play_unit(&mut self.state, side, card_id))
            }
            PolicyAction::CastSpell { card_id, target } => (
                "opponent_cast_spell",
                self.rules.cast_spell(&mut self.state, side, card_id, target),
            ),
            PolicyAction::Attack {
                attacker_id,
                target,
            } => (
                "opponent_attack",
                self.rules.attack(&mut self.state, side, attacker_id, target),
            ),
            PolicyAction::EndTurn => {
                self.opponent_turn = None;
                ("opponent_end_turn", self.rules.end_turn(&mut self.state, side))
            }
        };
        Some(self.settle(command, result))
    }

    /// 同步跑完整个对手回合，返回每一步的结果。
    pub fn run_opponent_turn(&mut self) -> Vec<CommandOutcome> {
        let mut outcomes = Vec::new();
        while outcomes.len() < MAX_OPPONENT_STEPS {
            match self.step_opponent() {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        outcomes
    }
}

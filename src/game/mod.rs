//! 对战核心：卡牌目录、对局状态、战斗与法术结算、回合控制与计时。

pub mod catalog;
pub mod clock;
pub mod combat;
pub mod deck;
pub mod effects;
pub mod rules;
pub mod session;
pub mod state;

pub use catalog::{CardDefinition, CardEffect, CardId, CardType, EffectTrigger, Keywords};
pub use clock::{ClockSignal, ClockStatus, TurnClock};
pub use rules::{RuleEngine, RuleError};
pub use session::{CommandOutcome, Match, MatchView, SideView};
pub use state::{
    CardInstance, FieldUnit, GameEvent, InstanceId, IntegrityError, MatchPhase, MatchState, Side,
    SideState, StatusKind, Target,
};

//! 对手策略。

pub mod policy;

pub use policy::{CancelToken, OpponentTurn, PolicyAction};

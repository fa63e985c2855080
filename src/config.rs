//! 对局配置。

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::game::deck::{DEFAULT_DECK_SIZE, DEFAULT_MAX_COPIES};

fn default_turn_seconds() -> u32 {
    60
}

fn default_starting_hand() -> usize {
    5
}

fn default_deck_size() -> usize {
    DEFAULT_DECK_SIZE
}

fn default_max_copies() -> usize {
    DEFAULT_MAX_COPIES
}

fn default_step_delay() -> u32 {
    700
}

fn default_clock_tick() -> u32 {
    250
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchConfig {
    #[serde(default = "default_turn_seconds")]
    pub turn_seconds: u32,
    #[serde(default = "default_starting_hand")]
    pub starting_hand: usize,
    #[serde(default = "default_deck_size")]
    pub deck_size: usize,
    #[serde(default = "default_max_copies")]
    pub max_copies: usize,
    /// 固定种子便于复现；为空时使用系统熵。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// 对手每一步之间的展示间隔。
    #[serde(default = "default_step_delay")]
    pub opponent_step_delay_ms: u32,
    #[serde(default = "default_clock_tick")]
    pub clock_tick_ms: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl MatchConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            turn_seconds: default_turn_seconds(),
            starting_hand: default_starting_hand(),
            deck_size: default_deck_size(),
            max_copies: default_max_copies(),
            seed: None,
            opponent_step_delay_ms: default_step_delay(),
            clock_tick_ms: default_clock_tick(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config = MatchConfig::from_json("{}").expect("empty object parses");
        assert_eq!(config, MatchConfig::default());
        assert_eq!(config.turn_seconds, 60);
        assert_eq!(config.deck_size, 30);
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = MatchConfig::from_json(r#"{"seed": 9, "turn_seconds": 30, "log_level": "debug"}"#)
            .expect("partial config parses");
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.turn_seconds, 30);
        assert_eq!(config.level(), Level::DEBUG);
        assert_eq!(config.starting_hand, 5);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let config = MatchConfig {
            log_level: "loud".into(),
            ..MatchConfig::default()
        };
        assert_eq!(config.level(), Level::INFO);
    }
}

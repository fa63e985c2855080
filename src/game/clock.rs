//! 回合倒计时。本身不依赖计时器，由外部按实际流逝时间推进。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::Side;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClockStatus {
    Idle,
    Running,
    Paused,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClockSignal {
    Tick { side: Side, remaining_secs: u32 },
    Expired { side: Side },
}

#[derive(Debug, Clone)]
pub struct TurnClock {
    duration: Duration,
    remaining: Duration,
    side: Option<Side>,
    status: ClockStatus,
}

impl TurnClock {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            remaining: duration,
            side: None,
            status: ClockStatus::Idle,
        }
    }

    pub fn from_secs(secs: u32) -> Self {
        Self::new(Duration::from_secs(u64::from(secs)))
    }

    /// 为新回合重新计时并开始运行。
    pub fn arm(&mut self, side: Side) {
        self.side = Some(side);
        self.remaining = self.duration;
        self.status = ClockStatus::Running;
        debug!(%side, secs = self.duration.as_secs(), "turn clock armed");
    }

    pub fn pause(&mut self) {
        if self.status == ClockStatus::Running {
            self.status = ClockStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == ClockStatus::Paused {
            self.status = ClockStatus::Running;
        }
    }

    /// 停止计时，保留剩余时间。
    pub fn stop(&mut self) {
        if matches!(self.status, ClockStatus::Running | ClockStatus::Paused) {
            self.status = ClockStatus::Idle;
        }
    }

    pub fn reset(&mut self) {
        self.remaining = self.duration;
        self.side = None;
        self.status = ClockStatus::Idle;
    }

    pub fn status(&self) -> ClockStatus {
        self.status
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// 剩余整秒数，向上取整。
    pub fn remaining_secs(&self) -> u32 {
        let millis = self.remaining.as_millis();
        ((millis + 999) / 1000) as u32
    }

    /// 推进时间。整秒数变化时发出 `Tick`，归零时发出一次 `Expired`。
    pub fn advance(&mut self, elapsed: Duration) -> Vec<ClockSignal> {
        let mut signals = Vec::new();
        if self.status != ClockStatus::Running {
            return signals;
        }
        let Some(side) = self.side else {
            return signals;
        };

        let before = self.remaining_secs();
        self.remaining = self.remaining.saturating_sub(elapsed);
        let after = self.remaining_secs();
        if after != before {
            signals.push(ClockSignal::Tick {
                side,
                remaining_secs: after,
            });
        }
        if self.remaining.is_zero() {
            self.status = ClockStatus::Expired;
            debug!(%side, "turn clock expired");
            signals.push(ClockSignal::Expired { side });
        }
        signals
    }
}

impl Default for TurnClock {
    fn default() -> Self {
        Self::from_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_on_whole_second_changes() {
        let mut clock = TurnClock::from_secs(3);
        clock.arm(Side::Human);

        assert!(clock.advance(Duration::from_millis(400)).is_empty());
        assert_eq!(
            clock.advance(Duration::from_millis(700)),
            vec![ClockSignal::Tick {
                side: Side::Human,
                remaining_secs: 2
            }]
        );
        assert_eq!(clock.remaining_secs(), 2);
    }

    #[test]
    fn expires_exactly_once() {
        let mut clock = TurnClock::from_secs(1);
        clock.arm(Side::Opponent);

        let signals = clock.advance(Duration::from_secs(5));
        assert_eq!(
            signals,
            vec![
                ClockSignal::Tick {
                    side: Side::Opponent,
                    remaining_secs: 0
                },
                ClockSignal::Expired {
                    side: Side::Opponent
                },
            ]
        );
        assert_eq!(clock.status(), ClockStatus::Expired);
        assert!(clock.advance(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn pause_preserves_remaining_time() {
        let mut clock = TurnClock::from_secs(10);
        clock.arm(Side::Human);
        clock.advance(Duration::from_millis(2500));
        clock.pause();

        assert!(clock.advance(Duration::from_secs(30)).is_empty());
        assert_eq!(clock.remaining(), Duration::from_millis(7500));

        clock.resume();
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.remaining(), Duration::from_secs(7));
        assert_eq!(clock.status(), ClockStatus::Running);
    }

    #[test]
    fn arm_restarts_full_duration() {
        let mut clock = TurnClock::from_secs(10);
        clock.arm(Side::Human);
        clock.advance(Duration::from_secs(4));
        clock.arm(Side::Opponent);
        assert_eq!(clock.remaining_secs(), 10);
        assert_eq!(clock.side(), Some(Side::Opponent));
    }

    #[test]
    fn stopped_clock_ignores_time_and_resume() {
        let mut clock = TurnClock::from_secs(10);
        clock.arm(Side::Human);
        clock.stop();
        clock.resume();
        assert!(clock.advance(Duration::from_secs(20)).is_empty());
        assert_eq!(clock.status(), ClockStatus::Idle);
        assert_eq!(clock.remaining_secs(), 10);
    }
}

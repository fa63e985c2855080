use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{CardEffect, CardInstance, InstanceId, MatchState, Side, SideState, Target};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PolicyAction {
    PlayUnit { card_id: InstanceId },
    CastSpell { card_id: InstanceId, target: Target },
    Attack { attacker_id: InstanceId, target: Target },
    EndTurn,
}

/// 共享的取消标记。重置或对局结束时取消，进行中的步骤在每次修改前检查。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TurnStep {
    Plan,
    Play(VecDeque<InstanceId>),
    Spell,
    Attack(Option<VecDeque<InstanceId>>),
    End,
    Done,
}

/// 单位效率：(攻击 + 生命/2) / 费用。
pub fn efficiency(card: &CardInstance) -> f64 {
    let score = f64::from(card.card.attack) + f64::from(card.card.health) / 2.0;
    score / f64::from(card.card.cost.max(1))
}

/// 手牌单位按效率降序排列，同分保持手牌顺序。
pub fn rank_units(hand: &[CardInstance]) -> Vec<InstanceId> {
    let mut units: Vec<&CardInstance> = hand.iter().filter(|card| card.card.is_unit()).collect();
    units.sort_by(|a, b| {
        efficiency(b)
            .partial_cmp(&efficiency(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    units.into_iter().map(|card| card.id).collect()
}

/// 挑选一张可负担的伤害法术，优先以单体伤害打英雄。
pub fn choose_spell(state: &MatchState, side: Side) -> Option<PolicyAction> {
    let player = state.side(side);
    let enemy = state.side(side.opponent());
    let affordable = |card: &&CardInstance| card.card.cost <= player.mana;

    let single = player.hand.iter().filter(affordable).find(|card| {
        matches!(card.card.effect, Some(CardEffect::DamageSingle { .. }))
    });
    if let Some(card) = single {
        let target = if enemy.has_wall_guard() {
            Target::Unit {
                id: enemy.field.first()?.id,
            }
        } else {
            Target::Hero
        };
        return Some(PolicyAction::CastSpell {
            card_id: card.id,
            target,
        });
    }

    player
        .hand
        .iter()
        .filter(affordable)
        .find(|card| card.card.effect.as_ref().is_some_and(CardEffect::is_damage_spell))
        .map(|card| PolicyAction::CastSpell {
            card_id: card.id,
            target: Target::Hero,
        })
}

/// 攻击敌方第一个可选中的单位，没有则攻击英雄。
pub fn choose_attack_target(enemy: &SideState) -> Target {
    enemy
        .field
        .iter()
        .find(|unit| !unit.stealthed)
        .map(|unit| Target::Unit { id: unit.id })
        .unwrap_or(Target::Hero)
}

/// 对手的一个回合，按步骤逐次产出动作。只依据己方可见信息决策。
#[derive(Debug)]
pub struct OpponentTurn {
    side: Side,
    step: TurnStep,
    token: CancelToken,
}

impl OpponentTurn {
    pub fn new(side: Side, token: CancelToken) -> Self {
        Self {
            side,
            step: TurnStep::Plan,
            token,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.step == TurnStep::Done
    }

    /// 计算下一步动作；返回 `None` 表示本回合已结束或被取消。
    pub fn next_action(&mut self, state: &MatchState) -> Option<PolicyAction> {
        loop {
            if self.token.is_cancelled() || state.is_finished() {
                self.step = TurnStep::Done;
                return None;
            }
            let player = state.side(self.side);

            match std::mem::replace(&mut self.step, TurnStep::Done) {
                TurnStep::Plan => {
                    let queue: VecDeque<InstanceId> = rank_units(&player.hand).into();
                    debug!(side = %self.side, planned = queue.len(), "opponent ranked units");
                    self.step = TurnStep::Play(queue);
                }
                TurnStep::Play(mut queue) => {
                    if player.field_full() {
                        self.step = TurnStep::Spell;
                        continue;
                    }
                    let next = std::iter::from_fn(|| queue.pop_front()).find(|id| {
                        player
                            .hand_card(*id)
                            .is_some_and(|card| card.card.cost <= player.mana)
                    });
                    match next {
                        Some(card_id) => {
                            self.step = TurnStep::Play(queue);
                            return Some(PolicyAction::PlayUnit { card_id });
                        }
                        None => self.step = TurnStep::Spell,
                    }
                }
                TurnStep::Spell => {
                    self.step = TurnStep::Attack(None);
                    if let Some(action) = choose_spell(state, self.side) {
                        return Some(action);
                    }
                }
                TurnStep::Attack(None) => {
                    let ready: VecDeque<InstanceId> = player
                        .field
                        .iter()
                        .filter(|unit| unit.can_attack)
                        .map(|unit| unit.id)
                        .collect();
                    self.step = TurnStep::Attack(Some(ready));
                }
                TurnStep::Attack(Some(mut queue)) => {
                    let next = std::iter::from_fn(|| queue.pop_front())
                        .find(|id| player.unit(*id).is_some_and(|unit| unit.can_attack));
                    match next {
                        Some(attacker_id) => {
                            self.step = TurnStep::Attack(Some(queue));
                            let target = choose_attack_target(state.side(self.side.opponent()));
                            return Some(PolicyAction::Attack {
                                attacker_id,
                                target,
                            });
                        }
                        None => self.step = TurnStep::End,
                    }
                }
                TurnStep::End => {
                    self.step = TurnStep::Done;
                    return Some(PolicyAction::EndTurn);
                }
                TurnStep::Done => return None,
            }
        }
    }
}

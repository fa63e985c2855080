use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::catalog::{find_definition, CardDefinition, CardId};
use super::deck::instantiate;

pub const HERO_MAX_HP: i16 = 20;
pub const HAND_LIMIT: usize = 10;
pub const FIELD_LIMIT: usize = 5;
pub const MANA_CAP: u8 = 10;

/// 卡牌实例的唯一标识。
pub type InstanceId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Human,
    Opponent,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Human => Side::Opponent,
            Side::Opponent => Side::Human,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Human => f.write_str("human"),
            Side::Opponent => f.write_str("opponent"),
        }
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "player" => Ok(Side::Human),
            "opponent" | "ai" => Ok(Side::Opponent),
            _ => Err(()),
        }
    }
}

/// 攻击或法术的目标：场上单位或英雄。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Target {
    Hero,
    Unit { id: InstanceId },
}

impl Target {
    pub fn from_unit(id: Option<InstanceId>) -> Self {
        match id {
            Some(id) => Target::Unit { id },
            None => Target::Hero,
        }
    }
}

/// 卡牌定义加上唯一身份。任一时刻只属于一个容器。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInstance {
    pub id: InstanceId,
    pub card: CardDefinition,
}

/// 场上单位。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldUnit {
    pub id: InstanceId,
    pub card: CardDefinition,
    pub hp: i16,
    pub max_hp: i16,
    #[serde(default)]
    pub can_attack: bool,
    #[serde(default)]
    pub stealthed: bool,
    /// 冲锋单位登场回合不能攻击英雄。
    #[serde(default)]
    pub just_summoned_with_rush: bool,
    #[serde(default)]
    pub hasted: bool,
    #[serde(default)]
    pub attacked_this_turn: bool,
    #[serde(default)]
    pub poison: u8,
    #[serde(default)]
    pub poison_damage: i16,
    #[serde(default)]
    pub frozen: u8,
}

impl FieldUnit {
    pub fn summon(instance: CardInstance) -> Self {
        let keywords = instance.card.keywords;
        Self {
            id: instance.id,
            hp: instance.card.health,
            max_hp: instance.card.health,
            can_attack: keywords.rush || keywords.super_haste,
            stealthed: keywords.stealth,
            just_summoned_with_rush: keywords.rush && !keywords.super_haste,
            hasted: false,
            attacked_this_turn: false,
            poison: 0,
            poison_damage: 0,
            frozen: 0,
            card: instance.card,
        }
    }

    pub fn attack(&self) -> i16 {
        self.card.attack
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    pub fn into_instance(self) -> CardInstance {
        CardInstance {
            id: self.id,
            card: self.card,
        }
    }
}

/// 单方的全部区域与资源。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideState {
    pub side: Side,
    pub hero_hp: i16,
    pub mana: u8,
    pub max_mana: u8,
    #[serde(default)]
    pub deck: Vec<CardInstance>,
    #[serde(default)]
    pub hand: Vec<CardInstance>,
    #[serde(default)]
    pub field: Vec<FieldUnit>,
    #[serde(default)]
    pub graveyard: Vec<CardInstance>,
}

impl SideState {
    pub fn new(side: Side, deck: Vec<CardInstance>) -> Self {
        Self {
            side,
            hero_hp: HERO_MAX_HP,
            mana: 0,
            max_mana: 0,
            deck,
            hand: Vec::new(),
            field: Vec::new(),
            graveyard: Vec::new(),
        }
    }

    pub fn hand_index(&self, id: InstanceId) -> Option<usize> {
        self.hand.iter().position(|card| card.id == id)
    }

    pub fn hand_card(&self, id: InstanceId) -> Option<&CardInstance> {
        self.hand.iter().find(|card| card.id == id)
    }

    pub fn unit_index(&self, id: InstanceId) -> Option<usize> {
        self.field.iter().position(|unit| unit.id == id)
    }

    pub fn unit(&self, id: InstanceId) -> Option<&FieldUnit> {
        self.field.iter().find(|unit| unit.id == id)
    }

    pub fn unit_mut(&mut self, id: InstanceId) -> Option<&mut FieldUnit> {
        self.field.iter_mut().find(|unit| unit.id == id)
    }

    pub fn has_wall_guard(&self) -> bool {
        self.field.iter().any(|unit| unit.card.keywords.wall_guard)
    }

    pub fn field_full(&self) -> bool {
        self.field.len() >= FIELD_LIMIT
    }

    /// 进入墓地，按身份去重。
    pub fn bury(&mut self, card: CardInstance) {
        if !self.graveyard.iter().any(|buried| buried.id == card.id) {
            self.graveyard.push(card);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state")]
pub enum MatchPhase {
    PreGame,
    TurnActive { side: Side },
    GameOver { winner: Side },
}

impl Default for MatchPhase {
    fn default() -> Self {
        MatchPhase::PreGame
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum StatusKind {
    Poison { damage: i16, turns: u8 },
    Frozen { turns: u8 },
    Haste,
}

/// 引擎对外发出的事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MatchReset,
    CoinFlipFinalized {
        winner: Side,
    },
    MulliganApplied {
        side: Side,
        replaced: Vec<InstanceId>,
    },
    CardDrawn {
        side: Side,
        instance_id: InstanceId,
    },
    CardBurned {
        side: Side,
        instance_id: InstanceId,
    },
    CardAddedToHand {
        side: Side,
        instance_id: InstanceId,
        card_id: CardId,
    },
    TurnStarted {
        side: Side,
        turn: u32,
    },
    TurnEnded {
        side: Side,
        turn: u32,
    },
    UnitPlayed {
        side: Side,
        instance_id: InstanceId,
        card_id: CardId,
    },
    SpellCast {
        side: Side,
        instance_id: InstanceId,
        card_id: CardId,
        target: Target,
    },
    AttackResolved {
        side: Side,
        attacker_id: InstanceId,
        target: Target,
        damage: i16,
        retaliation: i16,
    },
    DamageDealt {
        side: Side,
        target: Target,
        amount: i16,
    },
    Healed {
        side: Side,
        target: Target,
        amount: i16,
    },
    StatusApplied {
        side: Side,
        instance_id: InstanceId,
        status: StatusKind,
    },
    PoisonTicked {
        side: Side,
        instance_id: InstanceId,
        damage: i16,
    },
    Thawed {
        side: Side,
        instance_id: InstanceId,
    },
    UnitDied {
        side: Side,
        instance_id: InstanceId,
        card_id: CardId,
    },
    ClockTick {
        side: Side,
        remaining_secs: u32,
    },
    GameOver {
        winner: Side,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    HeroHpOutOfRange { side: Side, value: i16 },
    ManaOutOfRange { side: Side, mana: u8, max_mana: u8 },
    HandOverflow { side: Side, size: usize },
    FieldOverflow { side: Side, size: usize },
    DuplicateInstance { id: InstanceId },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::HeroHpOutOfRange { side, value } => {
                write!(f, "{side} hero hp {value} out of range")
            }
            IntegrityError::ManaOutOfRange {
                side,
                mana,
                max_mana,
            } => write!(f, "{side} mana {mana}/{max_mana} out of range"),
            IntegrityError::HandOverflow { side, size } => write!(f, "{side} hand holds {size}"),
            IntegrityError::FieldOverflow { side, size } => write!(f, "{side} field holds {size}"),
            IntegrityError::DuplicateInstance { id } => write!(f, "instance {id} appears twice"),
        }
    }
}

/// 一局对战的完整可变状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchState {
    pub human: SideState,
    pub opponent: SideState,
    pub turn: u32,
    #[serde(default)]
    pub phase: MatchPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_side: Option<Side>,
    #[serde(default)]
    pub mulligan_used: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl MatchState {
    pub fn new(human: SideState, opponent: SideState) -> Self {
        Self {
            human,
            opponent,
            turn: 0,
            phase: MatchPhase::PreGame,
            first_side: None,
            mulligan_used: false,
            event_log: Vec::new(),
        }
    }

    pub fn side(&self, side: Side) -> &SideState {
        match side {
            Side::Human => &self.human,
            Side::Opponent => &self.opponent,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Human => &mut self.human,
            Side::Opponent => &mut self.opponent,
        }
    }

    pub fn active_side(&self) -> Option<Side> {
        match self.phase {
            MatchPhase::TurnActive { side } => Some(side),
            _ => None,
        }
    }

    /// 奇数回合属于人类，偶数回合属于对手。
    pub fn side_for_turn(turn: u32) -> Side {
        if turn % 2 == 1 {
            Side::Human
        } else {
            Side::Opponent
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, MatchPhase::GameOver { .. })
    }

    pub fn winner(&self) -> Option<Side> {
        match self.phase {
            MatchPhase::GameOver { winner } => Some(winner),
            _ => None,
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn record_all(&mut self, events: &[GameEvent]) {
        self.event_log.extend_from_slice(events);
    }

    /// 在双方场上查找单位，返回所属方。
    pub fn locate_unit(&self, id: InstanceId) -> Option<Side> {
        [Side::Human, Side::Opponent]
            .into_iter()
            .find(|side| self.side(*side).unit(id).is_some())
    }

    /// 从牌库顶抽一张。手牌已满时直接进入墓地。
    pub fn draw_card(&mut self, side: Side) -> Option<GameEvent> {
        let player = self.side_mut(side);
        if player.deck.is_empty() {
            debug!(%side, "deck empty, nothing drawn");
            return None;
        }

        let card = player.deck.remove(0);
        let instance_id = card.id;
        if player.hand.len() >= HAND_LIMIT {
            player.bury(card);
            debug!(%side, instance_id, "hand full, drawn card burned");
            Some(GameEvent::CardBurned { side, instance_id })
        } else {
            player.hand.push(card);
            Some(GameEvent::CardDrawn { side, instance_id })
        }
    }

    pub fn draw_cards(&mut self, side: Side, count: usize) -> Vec<GameEvent> {
        (0..count).filter_map(|_| self.draw_card(side)).collect()
    }

    /// 效果生成卡牌。手牌已满时不生成。
    pub fn add_card_to_hand(&mut self, side: Side, card_id: CardId) -> Option<GameEvent> {
        let definition = find_definition(card_id)?;
        let player = self.side_mut(side);
        if player.hand.len() >= HAND_LIMIT {
            debug!(%side, card_id, "hand full, generated card skipped");
            return None;
        }
        let card = instantiate(definition);
        let instance_id = card.id;
        player.hand.push(card);
        Some(GameEvent::CardAddedToHand {
            side,
            instance_id,
            card_id,
        })
    }

    /// 对英雄造成伤害，降至 0 时判定来源方获胜。
    pub fn damage_hero(&mut self, source: Side, target: Side, amount: i16) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if amount <= 0 || self.is_finished() {
            return events;
        }

        let player = self.side_mut(target);
        player.hero_hp = (player.hero_hp - amount).max(0);
        let remaining = player.hero_hp;
        events.push(GameEvent::DamageDealt {
            side: target,
            target: Target::Hero,
            amount,
        });
        debug!(%source, %target, amount, remaining, "hero damaged");

        if remaining == 0 {
            if let Some(event) = self.declare_winner(source) {
                events.push(event);
            }
        }
        events
    }

    pub fn heal_hero(&mut self, side: Side, amount: i16) -> Option<GameEvent> {
        if amount <= 0 {
            return None;
        }
        let player = self.side_mut(side);
        let before = player.hero_hp;
        player.hero_hp = (player.hero_hp + amount).min(HERO_MAX_HP);
        Some(GameEvent::Healed {
            side,
            target: Target::Hero,
            amount: player.hero_hp - before,
        })
    }

    /// 只设置一次胜者，之后的调用不生效。
    pub fn declare_winner(&mut self, winner: Side) -> Option<GameEvent> {
        if self.is_finished() {
            return None;
        }
        self.phase = MatchPhase::GameOver { winner };
        info!(%winner, turn = self.turn, "game over");
        Some(GameEvent::GameOver { winner })
    }

    /// 双方所有区域中最大的实例编号。
    pub fn max_instance_id(&self) -> Option<InstanceId> {
        [&self.human, &self.opponent]
            .into_iter()
            .flat_map(|player| {
                player
                    .deck
                    .iter()
                    .chain(player.hand.iter())
                    .chain(player.graveyard.iter())
                    .map(|card| card.id)
                    .chain(player.field.iter().map(|unit| unit.id))
            })
            .max()
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = HashSet::new();
        for player in [&self.human, &self.opponent] {
            let side = player.side;
            if !(0..=HERO_MAX_HP).contains(&player.hero_hp) {
                return Err(IntegrityError::HeroHpOutOfRange {
                    side,
                    value: player.hero_hp,
                });
            }
            if player.mana > player.max_mana || player.max_mana > MANA_CAP {
                return Err(IntegrityError::ManaOutOfRange {
                    side,
                    mana: player.mana,
                    max_mana: player.max_mana,
                });
            }
            if player.hand.len() > HAND_LIMIT {
                return Err(IntegrityError::HandOverflow {
                    side,
                    size: player.hand.len(),
                });
            }
            if player.field.len() > FIELD_LIMIT {
                return Err(IntegrityError::FieldOverflow {
                    side,
                    size: player.field.len(),
                });
            }

            let ids = player
                .deck
                .iter()
                .chain(player.hand.iter())
                .chain(player.graveyard.iter())
                .map(|card| card.id)
                .chain(player.field.iter().map(|unit| unit.id));
            for id in ids {
                if !seen.insert(id) {
                    return Err(IntegrityError::DuplicateInstance { id });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::game::catalog::{find_definition, CardDefinition, Keywords};

    pub fn card(card_id: CardId) -> CardInstance {
        instantiate(find_definition(card_id).expect("catalog card should exist"))
    }

    pub fn vanilla(attack: i16, health: i16) -> CardInstance {
        instantiate(&CardDefinition::unit(
            900,
            "Test Dummy",
            1,
            attack,
            health,
            Keywords::default(),
            None,
        ))
    }

    /// 已就绪、可攻击的场上单位。
    pub fn ready(instance: CardInstance) -> FieldUnit {
        let mut unit = FieldUnit::summon(instance);
        unit.can_attack = true;
        unit.just_summoned_with_rush = false;
        unit
    }

    pub fn filler_deck(count: usize) -> Vec<CardInstance> {
        (0..count).map(|_| card(1)).collect()
    }

    /// 第 1 回合、人类行动中的对局。
    pub fn human_turn() -> MatchState {
        let mut state = MatchState::new(
            SideState::new(Side::Human, filler_deck(5)),
            SideState::new(Side::Opponent, filler_deck(5)),
        );
        state.turn = 1;
        state.first_side = Some(Side::Human);
        state.phase = MatchPhase::TurnActive { side: Side::Human };
        state.human.max_mana = MANA_CAP;
        state.human.mana = MANA_CAP;
        state
    }
}

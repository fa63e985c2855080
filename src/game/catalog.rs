//! 卡牌目录：静态、不可变的卡牌定义表。

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 目录中的卡牌编号。
pub type CardId = u32;

pub const DEFAULT_HEAL: i16 = 2;
pub const DEFAULT_SPELL_DAMAGE: i16 = 3;
pub const DEFAULT_DAMAGE_ALL: i16 = 2;
pub const DEFAULT_POISON_DAMAGE: i16 = 1;
pub const DEFAULT_POISON_TURNS: u8 = 3;
pub const DEFAULT_FREEZE_TURNS: u8 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Unit,
    Spell,
}

impl Default for CardType {
    fn default() -> Self {
        CardType::Unit
    }
}

/// 单位关键字。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keywords {
    /// 登场回合可攻击单位，但不能攻击英雄。
    #[serde(default)]
    pub rush: bool,
    /// 登场回合可攻击任意目标。
    #[serde(default)]
    pub super_haste: bool,
    /// 存活时己方英雄不能成为攻击目标。
    #[serde(default)]
    pub wall_guard: bool,
    /// 不能被攻击选为目标，攻击后失效。
    #[serde(default)]
    pub stealth: bool,
}

impl Keywords {
    pub fn rush() -> Self {
        Self {
            rush: true,
            ..Self::default()
        }
    }

    pub fn super_haste() -> Self {
        Self {
            super_haste: true,
            ..Self::default()
        }
    }

    pub fn wall_guard() -> Self {
        Self {
            wall_guard: true,
            ..Self::default()
        }
    }

    pub fn stealth() -> Self {
        Self {
            stealth: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EffectTrigger {
    OnSummon,
    OnAttack,
    OnDeath,
    OnCast,
}

fn default_heal() -> i16 {
    DEFAULT_HEAL
}

fn default_spell_damage() -> i16 {
    DEFAULT_SPELL_DAMAGE
}

fn default_damage_all() -> i16 {
    DEFAULT_DAMAGE_ALL
}

fn default_poison_damage() -> i16 {
    DEFAULT_POISON_DAMAGE
}

fn default_poison_turns() -> u8 {
    DEFAULT_POISON_TURNS
}

fn default_freeze_turns() -> u8 {
    DEFAULT_FREEZE_TURNS
}

/// 卡牌效果描述，覆盖所有效果种类。数值都是显式字段。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CardEffect {
    /// 登场时对敌方全体造成伤害（英雄受城墙保护）。
    SummonDamageAll {
        #[serde(default = "default_damage_all")]
        amount: i16,
    },
    /// 登场时将指定卡牌加入己方手牌。
    SummonAddToHand { card_id: CardId },
    /// 攻击英雄时伤害翻倍。
    AttackBonusVsHero,
    /// 每次攻击后自身受到伤害。
    AttackSelfDamage { amount: i16 },
    /// 死亡时将指定卡牌加入对手手牌。
    DeathAddToHand { card_id: CardId },
    HealSingle {
        #[serde(default = "default_heal")]
        amount: i16,
    },
    DamageSingle {
        #[serde(default = "default_spell_damage")]
        amount: i16,
    },
    DamageAll {
        #[serde(default = "default_damage_all")]
        amount: i16,
    },
    Poison {
        #[serde(default = "default_poison_damage")]
        damage: i16,
        #[serde(default = "default_poison_turns")]
        turns: u8,
    },
    FreezeSingle {
        #[serde(default = "default_freeze_turns")]
        turns: u8,
    },
    Haste,
}

impl CardEffect {
    pub fn trigger(&self) -> EffectTrigger {
        match self {
            CardEffect::SummonDamageAll { .. } | CardEffect::SummonAddToHand { .. } => {
                EffectTrigger::OnSummon
            }
            CardEffect::AttackBonusVsHero | CardEffect::AttackSelfDamage { .. } => {
                EffectTrigger::OnAttack
            }
            CardEffect::DeathAddToHand { .. } => EffectTrigger::OnDeath,
            CardEffect::HealSingle { .. }
            | CardEffect::DamageSingle { .. }
            | CardEffect::DamageAll { .. }
            | CardEffect::Poison { .. }
            | CardEffect::FreezeSingle { .. }
            | CardEffect::Haste => EffectTrigger::OnCast,
        }
    }

    /// 直接伤害类法术，供对手策略挑选。
    pub fn is_damage_spell(&self) -> bool {
        matches!(
            self,
            CardEffect::DamageSingle { .. } | CardEffect::DamageAll { .. }
        )
    }

    /// 引用的其他目录卡牌。
    pub fn referenced_card(&self) -> Option<CardId> {
        match self {
            CardEffect::SummonAddToHand { card_id } | CardEffect::DeathAddToHand { card_id } => {
                Some(*card_id)
            }
            _ => None,
        }
    }
}

/// 目录中的卡牌定义。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardDefinition {
    pub id: CardId,
    pub name: String,
    #[serde(default)]
    pub card_type: CardType,
    pub cost: u8,
    #[serde(default)]
    pub attack: i16,
    #[serde(default)]
    pub health: i16,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<CardEffect>,
    /// 衍生牌只能由效果生成，不进入随机牌库。
    #[serde(default = "default_collectible")]
    pub collectible: bool,
}

fn default_collectible() -> bool {
    true
}

impl CardDefinition {
    pub fn unit(
        id: CardId,
        name: impl Into<String>,
        cost: u8,
        attack: i16,
        health: i16,
        keywords: Keywords,
        effect: Option<CardEffect>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            card_type: CardType::Unit,
            cost,
            attack,
            health,
            keywords,
            effect,
            collectible: true,
        }
    }

    pub fn spell(id: CardId, name: impl Into<String>, cost: u8, effect: CardEffect) -> Self {
        Self {
            id,
            name: name.into(),
            card_type: CardType::Spell,
            cost,
            attack: 0,
            health: 0,
            keywords: Keywords::default(),
            effect: Some(effect),
            collectible: true,
        }
    }

    pub fn token(mut self) -> Self {
        self.collectible = false;
        self
    }

    pub fn effect_with(&self, trigger: EffectTrigger) -> Option<&CardEffect> {
        self.effect
            .as_ref()
            .filter(|effect| effect.trigger() == trigger)
    }

    pub fn is_unit(&self) -> bool {
        self.card_type == CardType::Unit
    }
}

pub const SPARK_ID: CardId = 17;

static CATALOG: Lazy<Vec<CardDefinition>> = Lazy::new(build_catalog);

fn build_catalog() -> Vec<CardDefinition> {
    vec![
        CardDefinition::unit(1, "Militia Recruit", 1, 1, 2, Keywords::default(), None),
        CardDefinition::unit(2, "Ember Sprite", 1, 2, 1, Keywords::rush(), None),
        CardDefinition::unit(3, "Shieldbearer", 2, 1, 4, Keywords::wall_guard(), None),
        CardDefinition::unit(4, "Shadow Stalker", 2, 3, 1, Keywords::stealth(), None),
        CardDefinition::unit(5, "Storm Courier", 3, 2, 2, Keywords::super_haste(), None),
        CardDefinition::unit(
            6,
            "Reckless Berserker",
            3,
            4,
            3,
            Keywords::default(),
            Some(CardEffect::AttackSelfDamage { amount: 1 }),
        ),
        CardDefinition::unit(
            7,
            "Siege Brute",
            4,
            3,
            4,
            Keywords::default(),
            Some(CardEffect::AttackBonusVsHero),
        ),
        CardDefinition::unit(
            8,
            "Flame Herald",
            4,
            3,
            3,
            Keywords::default(),
            Some(CardEffect::SummonDamageAll { amount: 1 }),
        ),
        CardDefinition::unit(
            9,
            "Quartermaster",
            2,
            2,
            2,
            Keywords::default(),
            Some(CardEffect::SummonAddToHand { card_id: SPARK_ID }),
        ),
        CardDefinition::unit(
            10,
            "Grave Warden",
            3,
            2,
            3,
            Keywords::default(),
            Some(CardEffect::DeathAddToHand { card_id: SPARK_ID }),
        ),
        CardDefinition::unit(11, "Iron Golem", 5, 5, 6, Keywords::default(), None),
        CardDefinition::unit(12, "Stone Sentinel", 5, 3, 7, Keywords::wall_guard(), None),
        CardDefinition::spell(13, "Healing Light", 1, CardEffect::HealSingle { amount: DEFAULT_HEAL }),
        CardDefinition::spell(
            14,
            "Firebolt",
            2,
            CardEffect::DamageSingle {
                amount: DEFAULT_SPELL_DAMAGE,
            },
        ),
        CardDefinition::spell(15, "Lightning Strike", 3, CardEffect::DamageSingle { amount: 4 }),
        CardDefinition::spell(
            16,
            "Flame Wave",
            4,
            CardEffect::DamageAll {
                amount: DEFAULT_DAMAGE_ALL,
            },
        ),
        CardDefinition::spell(SPARK_ID, "Spark", 1, CardEffect::DamageSingle { amount: 1 }).token(),
        CardDefinition::spell(
            18,
            "Venom Dart",
            2,
            CardEffect::Poison {
                damage: DEFAULT_POISON_DAMAGE,
                turns: DEFAULT_POISON_TURNS,
            },
        ),
        CardDefinition::spell(
            19,
            "Frost Bind",
            2,
            CardEffect::FreezeSingle {
                turns: DEFAULT_FREEZE_TURNS,
            },
        ),
        CardDefinition::spell(20, "War Cry", 1, CardEffect::Haste),
        CardDefinition::unit(21, "Dune Raider", 2, 2, 3, Keywords::rush(), None),
    ]
}

pub fn catalog() -> &'static [CardDefinition] {
    &CATALOG
}

pub fn find_definition(id: CardId) -> Option<&'static CardDefinition> {
    CATALOG.iter().find(|definition| definition.id == id)
}

pub fn collectible() -> impl Iterator<Item = &'static CardDefinition> {
    CATALOG.iter().filter(|definition| definition.collectible)
}

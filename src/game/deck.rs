//! 牌库构建与卡牌实例化。

use std::sync::atomic::{AtomicU32, Ordering};

use rand::seq::SliceRandom;
use rand::Rng;

use super::catalog::{collectible, CardDefinition};
use super::state::{CardInstance, InstanceId};

pub const DEFAULT_DECK_SIZE: usize = 30;
pub const DEFAULT_MAX_COPIES: usize = 2;

static NEXT_INSTANCE_ID: AtomicU32 = AtomicU32::new(1);

/// 进程内唯一、永不复用的实例编号。
pub fn next_instance_id() -> InstanceId {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// 保证之后分配的编号都大于 `max_id`。载入外部状态时调用。
pub fn reserve_ids_through(max_id: InstanceId) {
    NEXT_INSTANCE_ID.fetch_max(max_id.saturating_add(1), Ordering::Relaxed);
}

pub fn instantiate(definition: &CardDefinition) -> CardInstance {
    CardInstance {
        id: next_instance_id(),
        card: definition.clone(),
    }
}

/// 以新身份重新实例化（例如换牌时洗回牌库）。
pub fn reinstantiate(instance: CardInstance) -> CardInstance {
    CardInstance {
        id: next_instance_id(),
        card: instance.card,
    }
}

/// 从可收集卡牌中随机组成牌库，每个编号最多 `max_copies` 张。
pub fn build_deck<R: Rng + ?Sized>(rng: &mut R, size: usize, max_copies: usize) -> Vec<CardInstance> {
    let mut pool: Vec<&CardDefinition> = collectible()
        .flat_map(|definition| std::iter::repeat(definition).take(max_copies))
        .collect();
    pool.shuffle(rng);
    pool.into_iter().take(size).map(instantiate).collect()
}

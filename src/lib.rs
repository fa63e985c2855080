pub mod ai;
pub mod config;
pub mod game;
pub mod utils;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use gloo_timers::callback::Interval;
use gloo_timers::future::TimeoutFuture;
use serde_wasm_bindgen::to_value;
use tracing::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::js_sys::Function;

pub use ai::{CancelToken, OpponentTurn, PolicyAction};
pub use config::MatchConfig;
pub use game::{
    CardDefinition, CardEffect, CardId, CardInstance, CardType, ClockSignal, ClockStatus,
    CommandOutcome, EffectTrigger, FieldUnit, GameEvent, InstanceId, IntegrityError, Keywords,
    Match, MatchPhase, MatchState, MatchView, RuleEngine, RuleError, Side, SideState, SideView,
    StatusKind, Target, TurnClock,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// 引擎与异步任务共享的部分。
struct Shared {
    session: RefCell<Match>,
    listener: RefCell<Option<Function>>,
    driving: Cell<bool>,
}

impl Shared {
    /// 通知展示层。调用前必须已释放 `session` 的借用。
    fn notify(&self, events: &[GameEvent]) {
        if events.is_empty() {
            return;
        }
        let Some(listener) = self.listener.borrow().clone() else {
            return;
        };
        match to_value(&events) {
            Ok(value) => {
                if let Err(error) = listener.call1(&JsValue::NULL, &value) {
                    warn!(?error, "event listener threw");
                }
            }
            Err(error) => warn!(%error, "events could not be serialized"),
        }
    }
}

/// 若有进行中的对手回合且尚无驱动任务，则按配置的间隔逐步执行。
fn drive_opponent(shared: Rc<Shared>) {
    if shared.driving.get() || !shared.session.borrow().opponent_turn_pending() {
        return;
    }
    shared.driving.set(true);
    let delay = shared.session.borrow().config().opponent_step_delay_ms;

    spawn_local(async move {
        loop {
            TimeoutFuture::new(delay).await;
            let outcome = shared.session.borrow_mut().step_opponent();
            match outcome {
                Some(outcome) => shared.notify(&outcome.events),
                None => break,
            }
        }
        shared.driving.set(false);
    });
}

#[wasm_bindgen]
pub struct MatchEngine {
    shared: Rc<Shared>,
    clock: Option<Interval>,
}

#[wasm_bindgen]
impl MatchEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<MatchEngine, JsValue> {
        let config = match config_json {
            Some(json) => MatchConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => MatchConfig::default(),
        };
        utils::init_logging(config.level());
        info!(seed = ?config.seed, turn_seconds = config.turn_seconds, "match engine created");

        Ok(MatchEngine {
            shared: Rc::new(Shared {
                session: RefCell::new(Match::new(config)),
                listener: RefCell::new(None),
                driving: Cell::new(false),
            }),
            clock: None,
        })
    }

    fn dispatch<F>(&self, command: F) -> Result<String, JsValue>
    where
        F: FnOnce(&mut Match) -> CommandOutcome,
    {
        let outcome = command(&mut *self.shared.session.borrow_mut());
        self.shared.notify(&outcome.events);
        drive_opponent(self.shared.clone());
        serde_json::to_string(&outcome).map_err(serde_to_js_error)
    }

    pub fn view_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.shared.session.borrow().view()).map_err(serde_to_js_error)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.shared.session.borrow().state()).map_err(serde_to_js_error)
    }

    /// 用导出的状态替换当前对局，进行中的对手回合会被丢弃。
    pub fn load_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: MatchState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        state
            .integrity_check()
            .map_err(|error| serde_to_js_error(RuleError::IntegrityViolation { error }))?;
        let config = self.shared.session.borrow().config().clone();
        self.shared.session.replace(Match::with_state(config, state));
        drive_opponent(self.shared.clone());
        Ok(())
    }

    pub fn set_listener(&self, listener: Option<Function>) {
        self.shared.listener.replace(listener);
    }

    pub fn flip_coin(&self) -> String {
        self.shared.session.borrow_mut().flip_coin().to_string()
    }

    pub fn finalize_coin_flip(&self, winner: &str) -> Result<String, JsValue> {
        let winner = Side::from_str(winner)
            .map_err(|_| JsValue::from_str(&format!("unknown side: {winner}")))?;
        self.dispatch(|session| session.finalize_coin_flip(winner))
    }

    pub fn mulligan(&self, keep: Vec<u32>) -> Result<String, JsValue> {
        self.dispatch(|session| session.mulligan(&keep))
    }

    pub fn start_match(&self) -> Result<String, JsValue> {
        self.dispatch(Match::start_match)
    }

    pub fn play_unit(&self, card_id: u32) -> Result<String, JsValue> {
        self.dispatch(|session| session.play_unit(card_id))
    }

    /// `target_unit` 为空表示英雄。
    pub fn cast_spell(&self, card_id: u32, target_unit: Option<u32>) -> Result<String, JsValue> {
        self.dispatch(|session| session.cast_spell(card_id, Target::from_unit(target_unit)))
    }

    pub fn attack(&self, attacker_id: u32, target_unit: Option<u32>) -> Result<String, JsValue> {
        self.dispatch(|session| session.attack(attacker_id, Target::from_unit(target_unit)))
    }

    pub fn end_turn(&self) -> Result<String, JsValue> {
        self.dispatch(Match::end_turn)
    }

    pub fn reset_match(&self) -> Result<String, JsValue> {
        self.dispatch(Match::reset_match)
    }

    pub fn pause_clock(&self) {
        self.shared.session.borrow_mut().pause_clock();
    }

    pub fn resume_clock(&self) {
        self.shared.session.borrow_mut().resume_clock();
    }

    /// 以固定间隔采样墙钟并推进回合计时。
    pub fn start_clock(&mut self) {
        let shared = self.shared.clone();
        let tick_ms = shared.session.borrow().config().clock_tick_ms;
        let mut last = utils::now_ms();

        self.clock = Some(Interval::new(tick_ms, move || {
            let now = utils::now_ms();
            let elapsed = (now - last).max(0.0);
            last = now;
            let events = shared
                .session
                .borrow_mut()
                .advance_clock(Duration::from_millis(elapsed as u64));
            shared.notify(&events);
            drive_opponent(shared.clone());
        }));
    }

    pub fn stop_clock(&mut self) {
        self.clock = None;
    }
}

/// 返回完整的卡牌目录，供前端渲染。
#[wasm_bindgen(js_name = "cardCatalog")]
pub fn card_catalog() -> Result<JsValue, JsValue> {
    to_value(&game::catalog::catalog()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state_json: &str) -> Result<(), JsValue> {
    let state: MatchState = serde_json::from_str(state_json).map_err(serde_to_js_error)?;
    state
        .integrity_check()
        .map_err(|error| serde_to_js_error(RuleError::IntegrityViolation { error }))
}

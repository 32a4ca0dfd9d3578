//! Observer interface for tick and cycle-end notifications

use crate::types::{CandleSet, Tick};

/// Receives scheduler notifications
///
/// `on_tick` fires synchronously after each fold, with the new tick and the
/// full current-candle set. `on_cycle_end` fires exactly once, after the
/// horizon tick. Both default to no-ops so observers implement only what they
/// care about.
pub trait FlowObserver: Send + Sync {
    fn on_tick(&self, _tick: &Tick, _candles: &CandleSet) {}

    fn on_cycle_end(&self, _tick: &Tick) {}
}

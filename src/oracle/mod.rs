//! Price oracle - deterministic price generation behind a narrow contract
//!
//! The flow engine never computes prices itself; it consumes a [`PriceOracle`]
//! injected at construction time. Sessions with different oracles (or test
//! doubles) coexist independently.

mod seeded;

pub use seeded::SeededOracle;

use anyhow::Result;
use async_trait::async_trait;

/// Deterministic price source consumed by the tick scheduler
///
/// Every method is deterministic for fixed inputs. `initialize` must complete
/// before any price request; its failure is fatal to session setup.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Prepare the oracle for a session: storm windows are derived from the
    /// seed here. Must be called before any `next_price` request.
    async fn initialize(
        &self,
        seed: &str,
        storm_per_cycle: u32,
        storm_max_multiplier: f64,
    ) -> Result<()>;

    /// Fixed-length hex digest of a seed. Display/audit only; never feeds
    /// price computation.
    fn seed_digest(&self, seed: &str) -> String;

    /// Next price after `last_price` at `tick_index`, rounded to `digits`
    /// decimal places. Rounding is the oracle's responsibility.
    async fn next_price(
        &self,
        seed: &str,
        last_price: f64,
        volatility: f64,
        tick_index: u64,
        digits: u32,
    ) -> Result<f64>;

    /// Volatility multiplier at a tick index. `1.0` when storms were never
    /// initialized.
    async fn storm_multiplier(&self, tick_index: u64) -> f64;

    /// `count` prices starting at `start_tick_index` with `last_price` as the
    /// prior price. Element-by-element identical to sequential `next_price`
    /// calls.
    async fn next_prices_batch(
        &self,
        seed: &str,
        last_price: f64,
        count: usize,
        volatility: f64,
        start_tick_index: u64,
        digits: u32,
    ) -> Result<Vec<f64>>;
}

//! Error taxonomy for the flow engine

use thiserror::Error;

/// Errors surfaced by session lifecycle and tick generation
#[derive(Debug, Error)]
pub enum FlowError {
    /// Tick generation or a price-dependent query was invoked before the
    /// session completed a successful reset.
    #[error("flow session not initialized")]
    NotInitialized,

    /// The oracle failed during session setup; the session stays uninitialized.
    #[error("oracle setup failed: {cause}")]
    OracleSetup { cause: anyhow::Error },

    /// A price request failed mid-run. Propagated as-is: skipping a tick would
    /// break the fixed-cadence timestamp invariant.
    #[error("oracle price generation failed at tick {tick_index}: {cause}")]
    Oracle { tick_index: u64, cause: anyhow::Error },
}

//! Flow engine - tick scheduling and session lifecycle
//!
//! A [`FlowGenerator`] owns one session: a seeded tick cursor, the five-way
//! candle aggregation state, and the scheduler that advances them. Two
//! scheduling modes drive the same fold state and stay numerically
//! interchangeable: wall-clock synchronized catch-up ticking and synchronous
//! batch generation for dev/replay tooling.

pub mod candles;
pub mod clock;
pub mod observer;

pub use candles::CandleAggregator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use observer::FlowObserver;

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::GeneratorConfig;
use crate::error::FlowError;
use crate::oracle::PriceOracle;
use crate::types::{Candle, Tick, Timeframe};

/// Ticks per simulated trading day
pub const TICKS_PER_CYCLE: u64 = 86_400;
/// Total ticks a run produces, seed tick included; the run stops here
pub const LAST_TICK_INDEX: u64 = TICKS_PER_CYCLE + 1;

/// Oracle batch call cap. Purely a call-efficiency detail; chunking never
/// changes the generated sequence.
const BATCH_CHUNK_SIZE: usize = 1_000;
/// Rolling raw-tick window: one full cycle
const TICK_WINDOW_CAP: usize = LAST_TICK_INDEX as usize;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    Stopped,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Uninitialized => write!(f, "uninitialized"),
            SessionPhase::Initializing => write!(f, "initializing"),
            SessionPhase::Ready => write!(f, "ready"),
            SessionPhase::Running => write!(f, "running"),
            SessionPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lightweight session snapshot for dev tooling and UI bootstraps
#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    /// The raw seed; only present when explicitly requested
    pub seed: Option<String>,
    pub seed_digest: String,
    /// Config echo with the seed redacted
    pub config: String,
    pub tick_interval_ms: i64,
    pub last_tick: Tick,
    /// Bounded tail of raw ticks, possibly strided
    pub ticks: Vec<Tick>,
    /// 10-candle OHLC echo per timeframe (15s omitted: too chatty for a
    /// bootstrap payload)
    pub ohlc: BTreeMap<String, Vec<Candle>>,
}

/// Everything a successfully initialized session owns
struct ActiveSession {
    config: GeneratorConfig,
    seed_digest: String,
    /// Monotonic tick counter; the seed tick counts as 1
    tick_count: u64,
    last_tick: Tick,
    ticks: VecDeque<Tick>,
    candles: CandleAggregator,
}

struct SessionState {
    phase: SessionPhase,
    /// Some exactly when phase is Ready, Running, or Stopped
    session: Option<ActiveSession>,
    observer: Option<Arc<dyn FlowObserver>>,
}

/// Synthetic market-data session: tick generation plus candle aggregation
///
/// The oracle and clock are injected; independent sessions with different
/// seeds or test doubles coexist freely.
pub struct FlowGenerator {
    state: Arc<Mutex<SessionState>>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    run_task: StdMutex<Option<JoinHandle<()>>>,
}

impl FlowGenerator {
    /// A new, uninitialized generator. Call [`reset`](Self::reset) before
    /// generating ticks.
    pub fn new(oracle: Arc<dyn PriceOracle>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                phase: SessionPhase::Uninitialized,
                session: None,
                observer: None,
            })),
            oracle,
            clock,
            run_task: StdMutex::new(None),
        }
    }

    /// Generator on the real wall clock
    pub fn with_system_clock(oracle: Arc<dyn PriceOracle>) -> Self {
        Self::new(oracle, Arc::new(SystemClock))
    }

    /// Initialize or re-initialize the session
    ///
    /// Atomic from the consumer's view: on oracle-setup failure the session is
    /// left `Uninitialized` with no stale candle or cursor state observable.
    /// An in-flight run is force-stopped first. The observer is cleared.
    pub async fn reset(&self, config: GeneratorConfig) -> Result<(), FlowError> {
        self.halt_runner();

        let mut state = self.state.lock().await;
        state.phase = SessionPhase::Initializing;
        state.session = None;
        state.observer = None;

        if let Err(cause) = self
            .oracle
            .initialize(&config.seed, config.storm_per_cycle, config.storm_max_multiplier)
            .await
        {
            state.phase = SessionPhase::Uninitialized;
            return Err(FlowError::OracleSetup { cause });
        }

        let seed_digest = self.oracle.seed_digest(&config.seed);
        let config_echo = config.digest();
        let seed_tick = Tick::new(config.start_timestamp_ms, config.init_price);
        let mut ticks = VecDeque::with_capacity(1024);
        ticks.push_back(seed_tick);

        state.session = Some(ActiveSession {
            candles: CandleAggregator::seeded(seed_tick.timestamp, seed_tick.price),
            seed_digest: seed_digest.clone(),
            config,
            tick_count: 1,
            last_tick: seed_tick,
            ticks,
        });
        state.phase = SessionPhase::Ready;

        info!(seed_hash = %seed_digest, config = %config_echo, "flow session initialized");
        Ok(())
    }

    /// Start real-time generation synchronized to the clock
    ///
    /// Drains a catch-up pass eagerly, then re-drains on a repeating timer at
    /// the tick interval. A no-op when already running; `NotInitialized` when
    /// the session has not been (re)set.
    pub async fn start_synchronized(&self) -> Result<(), FlowError> {
        let tick_interval_ms = {
            let mut state = self.state.lock().await;
            match state.phase {
                SessionPhase::Running => return Ok(()),
                SessionPhase::Ready => {}
                _ => return Err(FlowError::NotInitialized),
            }
            let tick_interval_ms = Self::ensure_session(&state)?.config.tick_interval_ms;
            state.phase = SessionPhase::Running;
            tick_interval_ms
        };

        // Eager pass: absorbs the gap between session start and run start.
        match Self::drain_catch_up(&self.state, self.oracle.as_ref(), self.clock.as_ref()).await {
            Ok(true) => {}
            // Horizon reached while catching up; nothing left to schedule.
            Ok(false) => return Ok(()),
            Err(err) => {
                let mut state = self.state.lock().await;
                if state.phase == SessionPhase::Running {
                    state.phase = SessionPhase::Stopped;
                }
                return Err(err);
            }
        }

        let state = Arc::clone(&self.state);
        let oracle = Arc::clone(&self.oracle);
        let clock = Arc::clone(&self.clock);
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(tick_interval_ms.max(1) as u64));
            // Catch-up already reconciles drift; a burst of missed firings
            // would only drain an empty gap.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match Self::drain_catch_up(&state, oracle.as_ref(), clock.as_ref()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        error!(error = %err, "tick generation failed, halting run");
                        let mut state = state.lock().await;
                        if state.phase == SessionPhase::Running {
                            state.phase = SessionPhase::Stopped;
                        }
                        break;
                    }
                }
            }
        });
        *self.run_task.lock().expect("runner lock poisoned") = Some(handle);

        info!(tick_interval_ms, "flow run started");
        Ok(())
    }

    /// Halt the run and clear the observer
    ///
    /// Candle and tick data stay queryable; a new run requires `reset`.
    /// A no-op on an already-stopped session.
    pub async fn stop(&self) {
        self.halt_runner();
        let mut state = self.state.lock().await;
        state.observer = None;
        if state.phase == SessionPhase::Running {
            state.phase = SessionPhase::Stopped;
            info!("flow run stopped");
        }
    }

    /// Install the observer notified on every tick and at cycle end
    pub async fn set_observer(&self, observer: Arc<dyn FlowObserver>) {
        self.state.lock().await.observer = Some(observer);
    }

    pub async fn clear_observer(&self) {
        self.state.lock().await.observer = None;
    }

    /// Generate `count` ticks through the single-tick path
    ///
    /// Returns how many were produced: short when the cycle horizon
    /// intervenes. Dev/replay tooling; not wall-clock paced.
    pub async fn generate_ticks(&self, count: usize) -> Result<usize, FlowError> {
        let mut state = self.state.lock().await;
        Self::ensure_generating(&state)?;

        let mut produced = 0;
        for _ in 0..count {
            if !matches!(state.phase, SessionPhase::Ready | SessionPhase::Running) {
                break;
            }
            Self::advance_tick(&mut state, self.oracle.as_ref()).await?;
            produced += 1;
        }
        Ok(produced)
    }

    /// Generate `count` ticks using the oracle's batch path
    ///
    /// Numerically identical to [`generate_ticks`](Self::generate_ticks) for
    /// the same session state; chunk size is a call-efficiency detail only.
    pub async fn generate_batch(&self, count: usize) -> Result<usize, FlowError> {
        let mut state = self.state.lock().await;
        Self::ensure_generating(&state)?;

        let mut produced = 0;
        let mut remaining = count;
        while remaining > 0 {
            if !matches!(state.phase, SessionPhase::Ready | SessionPhase::Running) {
                break;
            }
            let chunk = remaining.min(BATCH_CHUNK_SIZE);
            let (seed, last_price, volatility, start_index, digits) = {
                let session = state.session.as_ref().ok_or(FlowError::NotInitialized)?;
                (
                    session.config.seed.clone(),
                    session.last_tick.price,
                    session.config.volatility,
                    session.tick_count,
                    session.config.digits,
                )
            };
            let prices = self
                .oracle
                .next_prices_batch(&seed, last_price, chunk, volatility, start_index, digits)
                .await
                .map_err(|cause| FlowError::Oracle {
                    tick_index: start_index,
                    cause,
                })?;
            for price in prices {
                produced += 1;
                if !Self::apply_price(&mut state, price) {
                    break;
                }
            }
            remaining -= chunk;
        }
        Ok(produced)
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.phase == SessionPhase::Running
    }

    /// Ticks produced so far, seed tick included. 0 before initialization.
    pub async fn tick_count(&self) -> u64 {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.tick_count)
            .unwrap_or(0)
    }

    pub async fn last_tick(&self) -> Result<Tick, FlowError> {
        let state = self.state.lock().await;
        Ok(Self::ensure_session(&state)?.last_tick)
    }

    /// Closed candles for a timeframe, capped at `max_count`, with the
    /// current candle appended when non-trivial. The last element may still
    /// mutate.
    pub async fn ohlc_series(
        &self,
        timeframe: Timeframe,
        max_count: usize,
    ) -> Result<Vec<Candle>, FlowError> {
        let state = self.state.lock().await;
        Ok(Self::ensure_session(&state)?
            .candles
            .ohlc_series(timeframe, max_count))
    }

    /// The bare current (possibly open) candle for a timeframe
    pub async fn current_candle(&self, timeframe: Timeframe) -> Result<Candle, FlowError> {
        let state = self.state.lock().await;
        Ok(*Self::ensure_session(&state)?.candles.current(timeframe))
    }

    /// Deterministic digest of the session seed
    pub async fn seed_digest(&self) -> Result<String, FlowError> {
        let state = self.state.lock().await;
        Ok(Self::ensure_session(&state)?.seed_digest.clone())
    }

    /// Storm multiplier at a tick index; degrades to `1.0` when the session
    /// is not initialized.
    pub async fn storm_multiplier(&self, tick_index: u64) -> f64 {
        if self.state.lock().await.session.is_none() {
            return 1.0;
        }
        self.oracle.storm_multiplier(tick_index).await
    }

    /// Session snapshot with a bounded tick tail
    pub async fn snapshot(
        &self,
        max_ticks: usize,
        include_seed: bool,
    ) -> Result<FlowSnapshot, FlowError> {
        let state = self.state.lock().await;
        let session = Self::ensure_session(&state)?;
        Ok(Self::build_snapshot(session, max_ticks, include_seed, 1))
    }

    /// Snapshot whose tick tail is down-sampled by `stride` (every
    /// `stride`-th tick of the tail), for lightweight transfers
    pub async fn snapshot_with_stride(
        &self,
        max_ticks: usize,
        stride: usize,
    ) -> Result<FlowSnapshot, FlowError> {
        let state = self.state.lock().await;
        let session = Self::ensure_session(&state)?;
        Ok(Self::build_snapshot(session, max_ticks, false, stride.max(1)))
    }

    fn build_snapshot(
        session: &ActiveSession,
        max_ticks: usize,
        include_seed: bool,
        stride: usize,
    ) -> FlowSnapshot {
        let skip = session.ticks.len().saturating_sub(max_ticks);
        let ticks: Vec<Tick> = session
            .ticks
            .iter()
            .skip(skip)
            .enumerate()
            .filter(|(i, _)| i % stride == 0)
            .map(|(_, tick)| *tick)
            .collect();

        let snapshot_timeframes = [
            Timeframe::Min1,
            Timeframe::Min5,
            Timeframe::Min15,
            Timeframe::Hour1,
        ];
        let ohlc = snapshot_timeframes
            .iter()
            .map(|&tf| (tf.to_string(), session.candles.ohlc_series(tf, 10)))
            .collect();

        FlowSnapshot {
            seed: include_seed.then(|| session.config.seed.clone()),
            seed_digest: session.seed_digest.clone(),
            config: session.config.digest(),
            tick_interval_ms: session.config.tick_interval_ms,
            last_tick: session.last_tick,
            ticks,
            ohlc,
        }
    }

    fn ensure_generating(state: &SessionState) -> Result<(), FlowError> {
        match state.phase {
            SessionPhase::Ready | SessionPhase::Running if state.session.is_some() => Ok(()),
            _ => Err(FlowError::NotInitialized),
        }
    }

    fn ensure_session(state: &SessionState) -> Result<&ActiveSession, FlowError> {
        state.session.as_ref().ok_or(FlowError::NotInitialized)
    }

    fn halt_runner(&self) {
        if let Some(handle) = self.run_task.lock().expect("runner lock poisoned").take() {
            handle.abort();
        }
    }

    /// Generate ticks until the cursor is within one interval of "now".
    ///
    /// Returns false when the run is over (horizon reached or externally
    /// stopped). Holds the session lock for the whole drain: folds are atomic
    /// steps and queries observe either all of a tick or none of it.
    async fn drain_catch_up(
        state: &Mutex<SessionState>,
        oracle: &dyn PriceOracle,
        clock: &dyn Clock,
    ) -> Result<bool, FlowError> {
        let mut state = state.lock().await;
        loop {
            if state.phase != SessionPhase::Running {
                return Ok(false);
            }
            let (last_ts, interval) = {
                let session = Self::ensure_session(&state)?;
                (session.last_tick.timestamp, session.config.tick_interval_ms)
            };
            if last_ts >= clock.now_ms() - interval {
                return Ok(true);
            }
            Self::advance_tick(&mut state, oracle).await?;
        }
    }

    /// Generate exactly one tick at the current tick index
    async fn advance_tick(
        state: &mut SessionState,
        oracle: &dyn PriceOracle,
    ) -> Result<bool, FlowError> {
        let (seed, last_price, volatility, tick_index, digits) = {
            let session = Self::ensure_session(state)?;
            (
                session.config.seed.clone(),
                session.last_tick.price,
                session.config.volatility,
                session.tick_count,
                session.config.digits,
            )
        };

        // The only suspension point. Session state is untouched until the
        // price is in hand, so cancellation mid-await never half-applies a
        // tick, and the oracle always sees the true previous price.
        let price = oracle
            .next_price(&seed, last_price, volatility, tick_index, digits)
            .await
            .map_err(|cause| FlowError::Oracle { tick_index, cause })?;

        Ok(Self::apply_price(state, price))
    }

    /// Fold a freshly generated price into the session; returns false when
    /// this tick completed the cycle.
    fn apply_price(state: &mut SessionState, price: f64) -> bool {
        let observer = state.observer.clone();
        let session = state
            .session
            .as_mut()
            .expect("tick applied without an active session");

        let timestamp = session.last_tick.timestamp + session.config.tick_interval_ms;
        let tick = Tick::new(timestamp, price);
        session.last_tick = tick;
        session.ticks.push_back(tick);
        while session.ticks.len() > TICK_WINDOW_CAP {
            session.ticks.pop_front();
        }
        session.tick_count += 1;
        session.candles.fold(timestamp, price);

        let ended = session.tick_count >= LAST_TICK_INDEX;
        let candles = session.candles.current_set();
        let tick_count = session.tick_count;

        if let Some(observer) = observer.as_deref() {
            observer.on_tick(&tick, &candles);
        }
        if ended {
            state.phase = SessionPhase::Stopped;
            if let Some(observer) = observer.as_deref() {
                observer.on_cycle_end(&tick);
            }
            info!(tick_count, "simulated day complete, run stopped");
        }
        !ended
    }
}

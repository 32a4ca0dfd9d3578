//! Candle aggregation - folds ticks into five concurrent OHLC series
//!
//! One current candle plus an append-only closed series per timeframe. The
//! catalog is fixed, so state lives in a plain array indexed by
//! [`Timeframe::index`] instead of keyed maps.

use std::collections::HashMap;
use tracing::debug;

use crate::types::{Candle, CandleSet, Timeframe};

/// Per-timeframe candle state: current candle, closed series, bucket lookup
#[derive(Debug, Clone)]
struct TimeframeSeries {
    timeframe: Timeframe,
    current: Candle,
    closed: Vec<Candle>,
    /// bucket_start -> position in `closed`
    by_bucket: HashMap<i64, usize>,
}

impl TimeframeSeries {
    fn seeded(timeframe: Timeframe, timestamp: i64, price: f64) -> Self {
        Self {
            timeframe,
            current: Candle::seeded(timeframe.bucket_start(timestamp), price),
            closed: Vec::new(),
            by_bucket: HashMap::new(),
        }
    }

    fn fold(&mut self, timestamp: i64, price: f64) {
        let bucket_start = self.timeframe.bucket_start(timestamp);

        // The tick always lands in the current candle, including the one that
        // seeded it.
        self.current.apply(price);
        if self.current.bucket_start == bucket_start {
            return;
        }

        // Rollover: the current candle is final. Empty buckets skipped by a
        // large timestamp jump are not synthesized.
        let finished = self.current;
        self.by_bucket.insert(finished.bucket_start, self.closed.len());
        self.closed.push(finished);
        self.current = Candle::seeded(bucket_start, price);

        debug!(
            timeframe = %self.timeframe,
            bucket_start = finished.bucket_start,
            close = finished.close,
            "candle closed"
        );
    }
}

/// Aggregates ticks into one OHLC series per timeframe in the fixed catalog
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    series: [TimeframeSeries; Timeframe::COUNT],
}

impl CandleAggregator {
    /// Seed every timeframe's current candle from the session's initial tick
    pub fn seeded(timestamp: i64, price: f64) -> Self {
        Self {
            series: Timeframe::ALL.map(|tf| TimeframeSeries::seeded(tf, timestamp, price)),
        }
    }

    /// Fold one tick into every timeframe
    pub fn fold(&mut self, timestamp: i64, price: f64) {
        for series in &mut self.series {
            series.fold(timestamp, price);
        }
    }

    /// The current (open, still mutating) candle for a timeframe
    pub fn current(&self, timeframe: Timeframe) -> &Candle {
        &self.series[timeframe.index()].current
    }

    /// Copy of all five current candles, in catalog order
    pub fn current_set(&self) -> CandleSet {
        Timeframe::ALL.map(|tf| *self.current(tf))
    }

    /// Number of closed candles for a timeframe
    pub fn closed_len(&self, timeframe: Timeframe) -> usize {
        self.series[timeframe.index()].closed.len()
    }

    /// O(1) closed-candle lookup by bucket start
    pub fn closed_at_bucket(&self, timeframe: Timeframe, bucket_start: i64) -> Option<&Candle> {
        let series = &self.series[timeframe.index()];
        series
            .by_bucket
            .get(&bucket_start)
            .map(|&pos| &series.closed[pos])
    }

    /// Last `max_count` closed candles, with the current candle appended as
    /// the final still-open element when it is non-trivial.
    ///
    /// An untouched current candle (all four OHLC fields equal) is excluded;
    /// a flat market is indistinguishable from an untouched bucket here.
    pub fn ohlc_series(&self, timeframe: Timeframe, max_count: usize) -> Vec<Candle> {
        let series = &self.series[timeframe.index()];
        let skip = series.closed.len().saturating_sub(max_count);
        let mut candles: Vec<Candle> = series.closed[skip..].to_vec();

        let current = &series.current;
        if current.is_untouched() {
            return candles;
        }
        match candles.last() {
            None => candles.push(*current),
            Some(last) if last.bucket_start != current.bucket_start => candles.push(*current),
            Some(_) => {}
        }
        candles
    }
}

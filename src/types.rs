//! Core types used throughout FlowGen
//!
//! Defines ticks, OHLC candles, and the fixed timeframe catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported candle timeframes
///
/// The catalog is fixed; per-timeframe state is held in arrays indexed by
/// [`Timeframe::index`] rather than keyed maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Sec15,
    Min1,
    Min5,
    Min15,
    Hour1,
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Min1
    }
}

impl Timeframe {
    /// Number of timeframes in the catalog
    pub const COUNT: usize = 5;

    /// Every timeframe, in ascending duration order
    pub const ALL: [Timeframe; Self::COUNT] = [
        Timeframe::Sec15,
        Timeframe::Min1,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Hour1,
    ];

    /// Get duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        match self {
            Timeframe::Sec15 => 15_000,
            Timeframe::Min1 => 60_000,
            Timeframe::Min5 => 300_000,
            Timeframe::Min15 => 900_000,
            Timeframe::Hour1 => 3_600_000,
        }
    }

    /// Dense index into per-timeframe arrays
    pub fn index(&self) -> usize {
        match self {
            Timeframe::Sec15 => 0,
            Timeframe::Min1 => 1,
            Timeframe::Min5 => 2,
            Timeframe::Min15 => 3,
            Timeframe::Hour1 => 4,
        }
    }

    /// Align a timestamp to the start of its bucket for this timeframe
    pub fn bucket_start(&self, timestamp_ms: i64) -> i64 {
        let interval = self.duration_ms();
        timestamp_ms.div_euclid(interval) * interval
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "15s" | "15sec" => Some(Timeframe::Sec15),
            "1m" | "1min" => Some(Timeframe::Min1),
            "5m" | "5min" => Some(Timeframe::Min5),
            "15m" | "15min" => Some(Timeframe::Min15),
            "1h" | "1hour" => Some(Timeframe::Hour1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Sec15 => write!(f, "15s"),
            Timeframe::Min1 => write!(f, "1m"),
            Timeframe::Min5 => write!(f, "5m"),
            Timeframe::Min15 => write!(f, "15m"),
            Timeframe::Hour1 => write!(f, "1h"),
        }
    }
}

/// One (timestamp, price) observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Timestamp in milliseconds
    pub timestamp: i64,
    /// Generated price
    pub price: f64,
}

impl Tick {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// OHLC candle for one timeframe bucket
///
/// `open` is fixed at bucket creation; `high`/`low`/`close` mutate while the
/// candle is the current one for its timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start (aligned to the timeframe duration)
    pub bucket_start: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
}

impl Candle {
    /// Seed a fresh candle where all four prices start at `price`
    pub fn seeded(bucket_start: i64, price: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    /// Fold one price into this candle
    pub fn apply(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    /// All four OHLC fields still equal: the candle has only seen its seeding
    /// price. Cannot distinguish a genuinely flat market from an untouched
    /// bucket; callers accept that ambiguity.
    pub fn is_untouched(&self) -> bool {
        self.open == self.high && self.open == self.low && self.open == self.close
    }
}

/// The set of current (open) candles, one per timeframe
pub type CandleSet = [Candle; Timeframe::COUNT];

//! Trading-session window.
//!
//! The gate answers one question: does a wall-clock instant fall inside the
//! daily window? It holds no state beyond the configured bounds.

use crate::config::ConfigError;
use chrono::{FixedOffset, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// A daily recurring interval `[open, close)` in wall-clock time.
///
/// When `open > close` the window wraps midnight (night session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    open: NaiveTime,
    close: NaiveTime,
}

impl SessionWindow {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Result<Self, ConfigError> {
        if open == close {
            return Err(ConfigError::EmptySessionWindow(open));
        }
        Ok(Self { open, close })
    }

    /// Parses `"HH:MM"` or `"HH:MM:SS"` bounds.
    pub fn parse(open: &str, close: &str) -> Result<Self, ConfigError> {
        Self::new(parse_time(open)?, parse_time(close)?)
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }

    pub fn wraps_midnight(&self) -> bool {
        self.open > self.close
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.open || time < self.close
        } else {
            self.open <= time && time < self.close
        }
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ConfigError::InvalidSessionTime(value.to_string()))
}

/// Decides whether a message should be persisted.
#[derive(Debug, Clone, Copy)]
pub struct SessionGate {
    window: SessionWindow,
}

impl SessionGate {
    pub fn new(window: SessionWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> SessionWindow {
        self.window
    }

    /// Compares the time-of-day portion of `now` against the window.
    pub fn is_open(&self, now: NaiveDateTime) -> bool {
        self.window.contains(now.time())
    }
}

/// The deployment's wall clock.
///
/// Decides both the session check and the calendar date of a log file.
#[derive(Debug, Clone, Copy)]
pub enum WallClock {
    /// The host's time zone.
    Local,
    /// A fixed offset from UTC.
    Fixed(FixedOffset),
}

impl WallClock {
    pub fn from_offset_minutes(minutes: Option<i32>) -> Result<Self, ConfigError> {
        match minutes {
            None => Ok(WallClock::Local),
            Some(m) => m
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(WallClock::Fixed)
                .ok_or(ConfigError::InvalidUtcOffset(m)),
        }
    }

    /// Converts microseconds since the Unix epoch into wall-clock time.
    ///
    /// Returns `None` for timestamps chrono cannot represent.
    pub fn at_micros(&self, micros: i64) -> Option<NaiveDateTime> {
        let utc = Utc.timestamp_micros(micros).single()?;
        Some(match self {
            WallClock::Local => utc.with_timezone(&Local).naive_local(),
            WallClock::Fixed(offset) => utc.with_timezone(offset).naive_local(),
        })
    }

    pub fn now(&self) -> NaiveDateTime {
        let utc = Utc::now();
        match self {
            WallClock::Local => utc.with_timezone(&Local).naive_local(),
            WallClock::Fixed(offset) => utc.with_timezone(offset).naive_local(),
        }
    }
}

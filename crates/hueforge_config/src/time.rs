//! Time-of-day windows and durations used by room configurations.
//!
//! Windows are written as `T<HH:MM:SS>/T<HH:MM:SS>` (start inclusive, end
//! exclusive, start > end wraps over midnight). Durations are `HH:MM:SS`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use chrono::Timelike;
use serde::Deserialize;
use serde::Deserializer;

/// Number of seconds in a day.
pub const DAY_SECS: u32 = 24 * 60 * 60;

const HMS: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError {
    pub input: String,
    pub expected: &'static str,
}

impl fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}'", self.expected, self.input)
    }
}

impl std::error::Error for TimeParseError {}

/// Half-open time-of-day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether the window spans midnight.
    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps() {
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }

    /// Second-of-day ranges covered by this window, split at midnight.
    fn segments(&self) -> Vec<(u32, u32)> {
        let start = self.start.num_seconds_from_midnight();
        let end = self.end.num_seconds_from_midnight();
        if start < end {
            vec![(start, end)]
        } else if end == 0 {
            vec![(start, DAY_SECS)]
        } else {
            vec![(start, DAY_SECS), (0, end)]
        }
    }
}

impl FromStr for TimeWindow {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TimeParseError {
            input: s.to_string(),
            expected: "time window (T<HH:MM:SS>/T<HH:MM:SS>)",
        };
        let (start, end) = s.split_once('/').ok_or_else(err)?;
        let start = start.strip_prefix('T').ok_or_else(err)?;
        let end = end.strip_prefix('T').ok_or_else(err)?;
        let start = NaiveTime::parse_from_str(start, HMS).map_err(|_| err())?;
        let end = NaiveTime::parse_from_str(end, HMS).map_err(|_| err())?;
        Ok(Self { start, end })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T{}/T{}",
            self.start.format(HMS),
            self.end.format(HMS)
        )
    }
}

impl<'de> Deserialize<'de> for TimeWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Why a set of windows does not tile the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TilingError {
    Empty(TimeWindow),
    Overlap { at: NaiveTime },
    Gap { from: NaiveTime, to: NaiveTime },
}

impl fmt::Display for TilingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TilingError::Empty(window) => write!(f, "window {} is empty", window),
            TilingError::Overlap { at } => {
                write!(f, "windows overlap at {}", at.format(HMS))
            }
            TilingError::Gap { from, to } => write!(
                f,
                "no window covers {} to {}",
                from.format(HMS),
                to.format(HMS)
            ),
        }
    }
}

impl std::error::Error for TilingError {}

fn time_at(secs: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(secs % DAY_SECS, 0).unwrap_or(NaiveTime::MIN)
}

/// Check that `windows` cover the whole day exactly once.
pub fn check_tiling<'a>(
    windows: impl IntoIterator<Item = &'a TimeWindow>,
) -> Result<(), TilingError> {
    let mut segments = Vec::new();
    for window in windows {
        if window.start == window.end {
            return Err(TilingError::Empty(*window));
        }
        segments.extend(window.segments());
    }
    segments.sort_unstable();

    let mut cursor = 0;
    for (start, end) in segments {
        if start < cursor {
            return Err(TilingError::Overlap { at: time_at(start) });
        }
        if start > cursor {
            return Err(TilingError::Gap {
                from: time_at(cursor),
                to: time_at(start),
            });
        }
        cursor = end;
    }
    if cursor != DAY_SECS {
        return Err(TilingError::Gap {
            from: time_at(cursor),
            to: time_at(DAY_SECS),
        });
    }
    Ok(())
}

/// A duration written as `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HmsDuration(u32);

impl HmsDuration {
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }

    /// Relative timer literal understood by the hub (`PT01:02:03`).
    pub fn to_timer(&self) -> String {
        format!("PT{}", self)
    }
}

impl FromStr for HmsDuration {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s, HMS)
            .map(|t| Self(t.num_seconds_from_midnight()))
            .map_err(|_| TimeParseError {
                input: s.to_string(),
                expected: "duration (HH:MM:SS)",
            })
    }
}

impl fmt::Display for HmsDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

impl<'de> Deserialize<'de> for HmsDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

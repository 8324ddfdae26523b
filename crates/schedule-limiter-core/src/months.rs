// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Month designator normalization.
//!
//! Callers name months in three ways: a three-letter English abbreviation in
//! any letter case (`"Jan"`, `"feb"`, `"MAR"`), a numeric string (`"4"`), or
//! an integer (`5`).  [`normalize`] maps every form onto a canonical
//! [`Month`] in `1..=12`, which is the only form used for storage keys.
//!
//! ```rust
//! use schedule_limiter_core::months::{normalize, MonthDesignator};
//!
//! let jan = normalize(&MonthDesignator::from("Jan")).unwrap();
//! assert_eq!(jan, normalize(&MonthDesignator::from("JAN")).unwrap());
//! assert_eq!(jan, normalize(&MonthDesignator::from("1")).unwrap());
//! assert_eq!(jan, normalize(&MonthDesignator::from(1)).unwrap());
//! assert_eq!(jan.get(), 1);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnknownMonthError;

/// Abbreviation table, index `i` is month `i + 1`.
const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

// ---------------------------------------------------------------------------
// Month
// ---------------------------------------------------------------------------

/// A canonical calendar month, always in `1..=12`.
///
/// Serializes as its bare integer so usage maps render as
/// `{"2015": {"1": 5}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Month(u8);

impl Month {
    /// Construct from a month number.  Returns `None` outside `1..=12`.
    pub const fn new(value: u8) -> Option<Self> {
        if value >= 1 && value <= 12 {
            Some(Month(value))
        } else {
            None
        }
    }

    /// Month from a calendar library's 1-based month number, clamped into
    /// range.
    pub(crate) fn from_calendar(month: u32) -> Self {
        Month(month.clamp(1, 12) as u8)
    }

    /// The month number, `1..=12`.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Lowercase three-letter abbreviation.
    pub fn abbreviation(self) -> &'static str {
        MONTH_ABBREVIATIONS[usize::from(self.0 - 1)]
    }

    /// Parse a textual designator: abbreviation or decimal number.
    pub fn parse(designator: &str) -> Result<Self, UnknownMonthError> {
        let trimmed = designator.trim();

        if let Some(index) = MONTH_ABBREVIATIONS
            .iter()
            .position(|name| name.eq_ignore_ascii_case(trimmed))
        {
            return Ok(Month(index as u8 + 1));
        }

        trimmed
            .parse::<i64>()
            .ok()
            .and_then(|number| Month::try_from(number).ok())
            .ok_or_else(|| UnknownMonthError {
                designator: designator.to_owned(),
            })
    }

    /// All twelve months in calendar order.
    pub fn all() -> impl Iterator<Item = Month> {
        (1..=12).map(Month)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Month {
    type Error = UnknownMonthError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Month::new)
            .ok_or_else(|| UnknownMonthError {
                designator: value.to_string(),
            })
    }
}

impl TryFrom<u8> for Month {
    type Error = UnknownMonthError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Month::try_from(i64::from(value))
    }
}

impl From<Month> for u8 {
    fn from(month: Month) -> u8 {
        month.0
    }
}

// ---------------------------------------------------------------------------
// MonthDesignator
// ---------------------------------------------------------------------------

/// A month as written by a caller, before normalization.
///
/// Deserializes untagged, so both `3` and `"Mar"` are accepted.  Object keys
/// in JSON and TOML are always strings and therefore arrive as
/// [`MonthDesignator::Name`]; numeric strings still normalize correctly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonthDesignator {
    /// Integer form.
    Number(i64),
    /// Abbreviation or numeric string.
    Name(String),
}

impl From<&str> for MonthDesignator {
    fn from(value: &str) -> Self {
        MonthDesignator::Name(value.to_owned())
    }
}

impl From<String> for MonthDesignator {
    fn from(value: String) -> Self {
        MonthDesignator::Name(value)
    }
}

impl From<i64> for MonthDesignator {
    fn from(value: i64) -> Self {
        MonthDesignator::Number(value)
    }
}

impl From<i32> for MonthDesignator {
    fn from(value: i32) -> Self {
        MonthDesignator::Number(i64::from(value))
    }
}

impl From<u32> for MonthDesignator {
    fn from(value: u32) -> Self {
        MonthDesignator::Number(i64::from(value))
    }
}

impl From<Month> for MonthDesignator {
    fn from(month: Month) -> Self {
        MonthDesignator::Number(i64::from(month.get()))
    }
}

impl fmt::Display for MonthDesignator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthDesignator::Number(number) => write!(f, "{number}"),
            MonthDesignator::Name(name) => f.write_str(name),
        }
    }
}

/// Map a designator onto its canonical [`Month`].
///
/// Pure: the same designator always yields the same result.
pub fn normalize(designator: &MonthDesignator) -> Result<Month, UnknownMonthError> {
    match designator {
        MonthDesignator::Number(number) => Month::try_from(*number),
        MonthDesignator::Name(name) => Month::parse(name),
    }
}

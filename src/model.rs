use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::schema::behavior;

/// Whether a cost scales with production of a specific product or is overhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBehavior {
    Variable,
    Fixed,
}

impl CostBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Variable => behavior::VARIABLE,
            Self::Fixed => behavior::FIXED,
        }
    }
}

impl fmt::Display for CostBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostBehavior {
    type Err = MetricsError;

    /// Blank values are treated as fixed, matching how uncategorised overhead
    /// is recorded in the source data.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            behavior::VARIABLE => Ok(Self::Variable),
            behavior::FIXED | "" => Ok(Self::Fixed),
            other => Err(MetricsError::InvalidData(format!(
                "Invalid cost behavior: '{}'. Must be 'variable' or 'fixed'",
                other
            ))),
        }
    }
}

/// Quarter value as stored on a time period: an integer, a label like "Q3",
/// or nothing at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarterValue {
    Missing,
    Number(i64),
    Text(String),
}

impl From<Option<&str>> for QuarterValue {
    fn from(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Missing,
            Some(text) => match text.parse::<i64>() {
                Ok(n) => Self::Number(n),
                Err(_) => Self::Text(text.to_string()),
            },
        }
    }
}

/// Normalize a stored quarter to an integer. Digits are pulled out of text
/// values ("Q3" → 3); anything unusable becomes 0.
pub fn parse_quarter(raw: &QuarterValue) -> u32 {
    match raw {
        QuarterValue::Missing => 0,
        QuarterValue::Number(n) => u32::try_from(*n).unwrap_or(0),
        QuarterValue::Text(text) => {
            let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        }
    }
}

/// Quarter a calendar month falls in (`ceil(month / 3)`).
pub fn quarter_of_month(month: u32) -> u32 {
    month.div_ceil(3)
}

/// A calendar month the metrics are recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimePeriod {
    pub year: i32,
    pub month: u32,
    pub quarter: u32,
}

impl TimePeriod {
    /// Build a period whose quarter is derived from the month.
    pub fn new(year: i32, month: u32) -> Result<Self, MetricsError> {
        Self::with_quarter(year, month, quarter_of_month(month))
    }

    pub fn with_quarter(year: i32, month: u32, quarter: u32) -> Result<Self, MetricsError> {
        if !(1..=12).contains(&month) {
            return Err(MetricsError::InvalidData(format!(
                "Month must be within 1..=12, got {month} for year {year}"
            )));
        }
        Ok(Self {
            year,
            month,
            quarter,
        })
    }
}

/// Display-friendly product name: drops a trailing parenthesised qualifier.
pub fn display_name(raw_name: &str) -> String {
    let trimmed = raw_name.trim();
    if trimmed.is_empty() {
        return "Unnamed Product".to_string();
    }
    trimmed
        .split(" (")
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_parsing_normalizes_every_shape() {
        assert_eq!(parse_quarter(&QuarterValue::Text("Q3".into())), 3);
        assert_eq!(parse_quarter(&QuarterValue::Number(3)), 3);
        assert_eq!(parse_quarter(&QuarterValue::Missing), 0);
        assert_eq!(parse_quarter(&QuarterValue::Text("abc".into())), 0);
        assert_eq!(parse_quarter(&QuarterValue::Number(-2)), 0);
    }

    #[test]
    fn quarter_value_from_csv_cell() {
        assert_eq!(QuarterValue::from(Some(" 2 ")), QuarterValue::Number(2));
        assert_eq!(QuarterValue::from(Some("")), QuarterValue::Missing);
        assert_eq!(QuarterValue::from(None), QuarterValue::Missing);
        assert_eq!(
            QuarterValue::from(Some("Q4")),
            QuarterValue::Text("Q4".into())
        );
    }

    #[test]
    fn quarter_derived_from_month() {
        let quarters: Vec<u32> = (1..=12).map(quarter_of_month).collect();
        assert_eq!(quarters, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
        assert_eq!(TimePeriod::new(2024, 8).unwrap().quarter, 3);
    }

    #[test]
    fn month_out_of_range_is_rejected() {
        assert!(TimePeriod::new(2024, 0).is_err());
        assert!(TimePeriod::new(2024, 13).is_err());
    }

    #[test]
    fn behavior_parses_case_insensitively() {
        assert_eq!(
            "Variable".parse::<CostBehavior>().unwrap(),
            CostBehavior::Variable
        );
        assert_eq!(" fixed ".parse::<CostBehavior>().unwrap(), CostBehavior::Fixed);
        assert_eq!("".parse::<CostBehavior>().unwrap(), CostBehavior::Fixed);
        assert!("semi".parse::<CostBehavior>().is_err());
    }

    #[test]
    fn display_name_strips_qualifier() {
        assert_eq!(display_name("Goldenberries (Physalis)"), "Goldenberries");
        assert_eq!(display_name("Exotic Fruits Mix"), "Exotic Fruits Mix");
        assert_eq!(display_name("  "), "Unnamed Product");
    }
}

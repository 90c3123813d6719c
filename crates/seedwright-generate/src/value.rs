use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use seedwright_core::types::{parse_date, parse_timestamp, DATE_FORMAT, TIMESTAMP_FORMAT};
use seedwright_core::{ColumnType, ScalarBound};

/// Generated value for a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeneratedValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl GeneratedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, GeneratedValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneratedValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            GeneratedValue::Int(value) => Some(Decimal::from(*value)),
            GeneratedValue::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeneratedValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            GeneratedValue::Date(value) => Some(value.and_time(NaiveTime::MIN)),
            GeneratedValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Build a value of `column_type` from a JSON literal in a schema document.
    pub fn from_json(value: &Value, column_type: ColumnType, scale: u32) -> Option<Self> {
        if value.is_null() {
            return Some(GeneratedValue::Null);
        }
        let converted = match column_type {
            ColumnType::String | ColumnType::Enum => GeneratedValue::Text(value.as_str()?.to_string()),
            ColumnType::Integer => GeneratedValue::Int(value.as_i64()?),
            ColumnType::Decimal => {
                let number = value.as_number()?;
                let parsed = Decimal::from_str(&number.to_string())
                    .or_else(|_| Decimal::from_scientific(&number.to_string()))
                    .ok()?;
                GeneratedValue::Decimal(round_to_scale(parsed, scale))
            }
            ColumnType::Boolean => GeneratedValue::Bool(value.as_bool()?),
            ColumnType::Date => GeneratedValue::Date(parse_date(value.as_str()?)?),
            ColumnType::Timestamp => GeneratedValue::Timestamp(parse_timestamp(value.as_str()?)?),
            ColumnType::Reference => return None,
        };
        Some(converted)
    }

    /// Convert to the stored type of a column, rendering as text when the
    /// target is textual.
    pub fn coerce(self, column_type: ColumnType, scale: u32) -> Option<Self> {
        if self.is_null() {
            return Some(self);
        }
        let coerced = match (column_type, self) {
            (ColumnType::String | ColumnType::Enum, value) => GeneratedValue::Text(value.to_string()),
            (ColumnType::Integer, GeneratedValue::Int(value)) => GeneratedValue::Int(value),
            (ColumnType::Integer, GeneratedValue::Decimal(value)) => GeneratedValue::Int(
                value
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .to_i64()?,
            ),
            (ColumnType::Decimal, value @ (GeneratedValue::Int(_) | GeneratedValue::Decimal(_))) => {
                GeneratedValue::Decimal(round_to_scale(value.as_decimal()?, scale))
            }
            (ColumnType::Boolean, GeneratedValue::Bool(value)) => GeneratedValue::Bool(value),
            (ColumnType::Date, value @ (GeneratedValue::Date(_) | GeneratedValue::Timestamp(_))) => {
                GeneratedValue::Date(value.as_timestamp()?.date())
            }
            (
                ColumnType::Timestamp,
                value @ (GeneratedValue::Date(_) | GeneratedValue::Timestamp(_)),
            ) => GeneratedValue::Timestamp(value.as_timestamp()?),
            _ => return None,
        };
        Some(coerced)
    }

    /// JSON rendering used by previews and reports.
    pub fn to_json(&self) -> Value {
        match self {
            GeneratedValue::Null => Value::Null,
            GeneratedValue::Bool(value) => Value::Bool(*value),
            GeneratedValue::Int(value) => Value::from(*value),
            GeneratedValue::Decimal(value) => Value::String(value.to_string()),
            GeneratedValue::Text(value) => Value::String(value.clone()),
            GeneratedValue::Date(_) | GeneratedValue::Timestamp(_) => {
                Value::String(self.to_string())
            }
        }
    }
}

impl fmt::Display for GeneratedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratedValue::Null => Ok(()),
            GeneratedValue::Bool(value) => write!(f, "{value}"),
            GeneratedValue::Int(value) => write!(f, "{value}"),
            GeneratedValue::Decimal(value) => write!(f, "{value}"),
            GeneratedValue::Text(value) => f.write_str(value),
            GeneratedValue::Date(value) => write!(f, "{}", value.format(DATE_FORMAT)),
            GeneratedValue::Timestamp(value) => write!(f, "{}", value.format(TIMESTAMP_FORMAT)),
        }
    }
}

pub(crate) fn round_to_scale(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded
}

/// Column `min`/`max` limit, normalised for comparison with generated values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueBound {
    Numeric(Decimal),
    Temporal(NaiveDateTime),
}

impl ValueBound {
    pub fn from_scalar(bound: &ScalarBound) -> Option<Self> {
        match bound {
            ScalarBound::Integer(value) => Some(Self::Numeric(Decimal::from(*value))),
            ScalarBound::Number(value) => Decimal::from_str(&value.to_string())
                .ok()
                .map(Self::Numeric),
            ScalarBound::Date(_) | ScalarBound::Timestamp(_) => {
                bound.as_timestamp().map(Self::Temporal)
            }
        }
    }

    /// Ordering of `value` relative to this bound; `None` for null or
    /// mismatched kinds.
    pub fn compare(&self, value: &GeneratedValue) -> Option<Ordering> {
        match self {
            Self::Numeric(bound) => value.as_decimal().map(|value| value.cmp(bound)),
            Self::Temporal(bound) => value.as_timestamp().map(|value| value.cmp(bound)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decimal_from_json_respects_scale() {
        let value = GeneratedValue::from_json(&json!(12.345), ColumnType::Decimal, 2)
            .expect("decimal");
        assert_eq!(value.to_string(), "12.35");
        let value = GeneratedValue::from_json(&json!(3), ColumnType::Decimal, 2).expect("decimal");
        assert_eq!(value.to_string(), "3.00");
    }

    #[test]
    fn coerce_timestamp_into_date() {
        let timestamp = GeneratedValue::from_json(
            &json!("2024-03-09T17:45:00"),
            ColumnType::Timestamp,
            0,
        )
        .expect("timestamp");
        let date = timestamp.coerce(ColumnType::Date, 0).expect("date");
        assert_eq!(date.to_string(), "2024-03-09");
    }

    #[test]
    fn bounds_compare_numbers_and_dates() {
        let bound = ValueBound::from_scalar(&ScalarBound::Number(1.5)).expect("bound");
        assert_eq!(bound.compare(&GeneratedValue::Int(2)), Some(Ordering::Greater));
        assert_eq!(bound.compare(&GeneratedValue::Null), None);
    }
}

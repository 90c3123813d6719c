use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Date format accepted in schema documents.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamp format accepted in schema documents.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Integer,
    Decimal,
    Date,
    Timestamp,
    Boolean,
    Enum,
    /// Foreign-key reference; the stored type is the referenced column's.
    Reference,
}

impl ColumnType {
    /// Parse a type name from a schema document, accepting common aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        let column_type = match normalized.as_str() {
            "string" | "text" | "varchar" => Self::String,
            "integer" | "int" | "bigint" => Self::Integer,
            "decimal" | "numeric" | "money" => Self::Decimal,
            "date" => Self::Date,
            "timestamp" | "datetime" => Self::Timestamp,
            "boolean" | "bool" => Self::Boolean,
            "enum" => Self::Enum,
            "reference" | "foreign_key" | "fk" => Self::Reference,
            _ => return None,
        };
        Some(column_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
            Self::Reference => "reference",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Enum)
    }

    /// Returns true when a non-null JSON literal can be stored in this type.
    pub fn accepts_json(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::Enum => value.is_string(),
            Self::Integer => value.is_i64(),
            Self::Decimal => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Date => value.as_str().and_then(parse_date).is_some(),
            Self::Timestamp => value.as_str().and_then(parse_timestamp).is_some(),
            Self::Reference => !value.is_array() && !value.is_object() && !value.is_null(),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality hint for a relationship.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    OneToMany,
    /// Every parent row is referenced at most once.
    OneToOne,
}

/// A range bound or column limit: integer, number, date or timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ScalarBound {
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl ScalarBound {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(value) => Some(value.and_time(NaiveTime::MIN)),
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether this bound can constrain a column of the given type.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        match column_type {
            ColumnType::Integer => matches!(self, Self::Integer(_)),
            ColumnType::Decimal => matches!(self, Self::Integer(_) | Self::Number(_)),
            ColumnType::Date => matches!(self, Self::Date(_)),
            ColumnType::Timestamp => matches!(self, Self::Date(_) | Self::Timestamp(_)),
            _ => false,
        }
    }

    /// Compare two bounds of compatible kinds; `None` when the kinds differ.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            _ => {
                if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                    return a.partial_cmp(&b);
                }
                match (self.as_timestamp(), other.as_timestamp()) {
                    (Some(a), Some(b)) => Some(a.cmp(&b)),
                    _ => None,
                }
            }
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| parse_date(raw).map(|date| date.and_time(NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_type_aliases() {
        assert_eq!(ColumnType::parse("VARCHAR"), Some(ColumnType::String));
        assert_eq!(ColumnType::parse("bigint"), Some(ColumnType::Integer));
        assert_eq!(ColumnType::parse("fk"), Some(ColumnType::Reference));
        assert_eq!(ColumnType::parse("blob"), None);
    }

    #[test]
    fn bounds_deserialize_by_shape() {
        let bounds: Vec<ScalarBound> =
            serde_json::from_value(json!([3, 2.5, "2024-02-01", "2024-02-01T10:30:00"]))
                .expect("parse bounds");
        assert!(matches!(bounds[0], ScalarBound::Integer(3)));
        assert!(matches!(bounds[1], ScalarBound::Number(_)));
        assert!(matches!(bounds[2], ScalarBound::Date(_)));
        assert!(matches!(bounds[3], ScalarBound::Timestamp(_)));
    }

    #[test]
    fn compare_mixes_integer_and_number() {
        let low = ScalarBound::Integer(1);
        let high = ScalarBound::Number(1.5);
        assert_eq!(low.compare(&high), Some(Ordering::Less));
        assert_eq!(
            low.compare(&ScalarBound::Date(NaiveDate::default())),
            None
        );
    }

    #[test]
    fn accepts_json_checks_shape() {
        assert!(ColumnType::Date.accepts_json(&json!("2024-01-31")));
        assert!(!ColumnType::Date.accepts_json(&json!("31/01/2024")));
        assert!(ColumnType::Decimal.accepts_json(&json!(3)));
        assert!(!ColumnType::Integer.accepts_json(&json!(3.5)));
    }
}

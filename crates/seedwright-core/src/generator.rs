use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ScalarBound;

/// Declarative description of how a column's values are produced.
///
/// The set of variants is closed so the loader can check every generator
/// up front instead of discovering bad parameters mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorSpec {
    /// Numeric or temporal value drawn from `[min, max]`.
    ScalarRange(ScalarRangeSpec),
    /// Value drawn from a fixed weighted set.
    Enumeration(EnumerationSpec),
    /// Unique values derived from the row position.
    UniqueSequence(UniqueSequenceSpec),
    /// Key copied from a row of the referenced parent table.
    ForeignKey(ForeignKeySpec),
    /// Value computed from earlier columns of the same row.
    Derived(DerivedSpec),
    /// Text built from a template with random digits and letters.
    Pattern(PatternSpec),
    Boolean(BooleanSpec),
    Uuid,
}

impl GeneratorSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ScalarRange(_) => "scalar_range",
            Self::Enumeration(_) => "enumeration",
            Self::UniqueSequence(_) => "unique_sequence",
            Self::ForeignKey(_) => "foreign_key",
            Self::Derived(_) => "derived",
            Self::Pattern(_) => "pattern",
            Self::Boolean(_) => "boolean",
            Self::Uuid => "uuid",
        }
    }

    /// Columns of the same row this generator reads.
    pub fn input_columns(&self) -> Vec<String> {
        match self {
            Self::Derived(spec) => spec.input_columns(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScalarRangeSpec {
    pub min: ScalarBound,
    pub max: ScalarBound,
    /// Exponent applied to the uniform draw; `1.0` is uniform, larger
    /// values favour the low end of the range.
    #[serde(default = "default_skew")]
    pub skew: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnumerationSpec {
    pub values: Vec<EnumEntry>,
}

impl EnumerationSpec {
    pub fn total_weight(&self) -> f64 {
        self.values.iter().map(EnumEntry::weight).sum()
    }
}

/// One enumeration member, either bare or with an explicit weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum EnumEntry {
    Weighted {
        value: Value,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Bare(Value),
}

impl EnumEntry {
    pub fn value(&self) -> &Value {
        match self {
            Self::Weighted { value, .. } | Self::Bare(value) => value,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Self::Weighted { weight, .. } => *weight,
            Self::Bare(_) => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SequenceOrder {
    #[default]
    Ascending,
    Shuffled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UniqueSequenceSpec {
    #[serde(default = "default_one")]
    pub start: i64,
    #[serde(default = "default_one")]
    pub step: i64,
    /// Inclusive last value; the sequence is unbounded when absent.
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub order: SequenceOrder,
    /// Text template for string columns; `{}` is replaced by the number.
    #[serde(default)]
    pub template: Option<String>,
}

impl UniqueSequenceSpec {
    /// Number of distinct values, `None` when unbounded.
    pub fn domain_size(&self) -> Option<u64> {
        let end = self.end?;
        let (start, end, step) = (self.start as i128, end as i128, self.step as i128);
        if step == 0 {
            return Some(0);
        }
        let span = end - start;
        if span != 0 && span.signum() != step.signum() {
            return Some(0);
        }
        let count = span / step + 1;
        Some(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKeySpec {
    #[serde(default)]
    pub policy: SelectionPolicy,
}

/// How a child row picks its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Uniform,
    /// Low parent positions are picked more often: `floor(n * u^exponent)`.
    Skewed { exponent: f64 },
}

/// Computation over columns declared earlier in the same table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DerivedSpec {
    Copy {
        column: String,
    },
    Scale {
        column: String,
        factor: f64,
    },
    Sum {
        columns: Vec<String>,
    },
    Difference {
        minuend: String,
        subtrahend: String,
    },
    /// Date or timestamp a random number of days after the source.
    DaysAfter {
        column: String,
        #[serde(default)]
        min_days: i64,
        max_days: i64,
    },
    /// Text with `{column}` placeholders.
    Template {
        template: String,
    },
}

impl DerivedSpec {
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Scale { .. } => "scale",
            Self::Sum { .. } => "sum",
            Self::Difference { .. } => "difference",
            Self::DaysAfter { .. } => "days_after",
            Self::Template { .. } => "template",
        }
    }

    pub fn input_columns(&self) -> Vec<String> {
        match self {
            Self::Copy { column } | Self::Scale { column, .. } | Self::DaysAfter { column, .. } => {
                vec![column.clone()]
            }
            Self::Sum { columns } => columns.clone(),
            Self::Difference {
                minuend,
                subtrahend,
            } => vec![minuend.clone(), subtrahend.clone()],
            Self::Template { template } => template_placeholders(template),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternSpec {
    /// `{row}` is the 1-based row number, `#` a random digit, `?` a random
    /// lowercase letter; `\` escapes the next character.
    pub template: String,
}

impl PatternSpec {
    /// Distinct outputs the template can produce, `None` when unbounded.
    pub fn domain_size(&self) -> Option<u64> {
        if self.template.contains("{row}") {
            return None;
        }
        let mut size: u64 = 1;
        let mut escaped = false;
        for ch in self.template.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            let factor = match ch {
                '\\' => {
                    escaped = true;
                    1
                }
                '#' => 10,
                '?' => 26,
                _ => 1,
            };
            size = size.saturating_mul(factor);
        }
        Some(size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BooleanSpec {
    /// Probability of `true`.
    #[serde(default = "default_probability")]
    pub probability: f64,
}

/// Exact decimal form of a `scale` factor, as the generator applies it.
pub fn scale_factor(factor: f64) -> Result<Decimal, rust_decimal::Error> {
    factor.to_string().parse::<Decimal>()
}

/// True when the template contains a `{}` placeholder with no column name.
pub fn template_has_empty_placeholder(template: &str) -> bool {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return false;
        };
        if after[..close].trim().is_empty() {
            return true;
        }
        rest = &after[close + 1..];
    }
    false
}

/// Extract `{name}` placeholders from a template, in order of appearance.
pub fn template_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = after[..close].trim();
        if !name.is_empty() && !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
        rest = &after[close + 1..];
    }
    names
}

fn default_skew() -> f64 {
    1.0
}

fn default_weight() -> f64 {
    1.0
}

fn default_one() -> i64 {
    1
}

fn default_probability() -> f64 {
    0.5
}

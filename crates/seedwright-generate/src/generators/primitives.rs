use std::collections::HashSet;
use std::str::FromStr;

use chrono::{Days, NaiveDate, NaiveDateTime, TimeDelta};
use rand::{Rng, RngCore};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use seedwright_core::{
    BooleanSpec, ColumnDefinition, ColumnType, EnumerationSpec, PatternSpec, ScalarBound,
    ScalarRangeSpec,
};

use crate::value::GeneratedValue;

/// Offset in `0..=span`, uniform when `skew == 1`, otherwise `floor((span + 1) * u^skew)`.
pub(crate) fn draw_offset(rng: &mut ChaCha8Rng, span: u128, skew: f64) -> u128 {
    if skew == 1.0 {
        return rng.random_range(0..=span);
    }
    let draw: f64 = rng.random();
    let scaled = (draw.powf(skew) * (span as f64 + 1.0)).floor();
    (scaled as u128).min(span)
}

#[derive(Debug, Clone, PartialEq)]
enum RangeKind {
    Integer { min: i64 },
    /// Bounds in units of `10^-scale`.
    Decimal { min: i128, scale: u32 },
    Date { min: NaiveDate },
    Timestamp { min: NaiveDateTime },
}

/// Numeric or temporal value within `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRange {
    kind: RangeKind,
    span: u128,
    skew: f64,
}

impl ScalarRange {
    pub fn compile(column: &ColumnDefinition, spec: &ScalarRangeSpec) -> Result<Self, String> {
        let (kind, span) = match column.storage_type {
            ColumnType::Integer => match (spec.min, spec.max) {
                (ScalarBound::Integer(min), ScalarBound::Integer(max)) if min <= max => {
                    (RangeKind::Integer { min }, (max as i128 - min as i128) as u128)
                }
                _ => return Err("integer range needs integer bounds with min <= max".to_string()),
            },
            ColumnType::Decimal => {
                let scale = column.scale;
                let low = scaled_units(&spec.min, scale, true)
                    .ok_or_else(|| format!("range min {:?} cannot be scaled", spec.min))?;
                let high = scaled_units(&spec.max, scale, false)
                    .ok_or_else(|| format!("range max {:?} cannot be scaled", spec.max))?;
                if low > high {
                    return Err(format!("no value with scale {scale} lies in the range"));
                }
                (RangeKind::Decimal { min: low, scale }, (high - low) as u128)
            }
            ColumnType::Date => {
                let (Some(min), Some(max)) = (spec.min.as_timestamp(), spec.max.as_timestamp())
                else {
                    return Err("date range needs date bounds".to_string());
                };
                let (min, max) = (min.date(), max.date());
                if min > max {
                    return Err("range min is after max".to_string());
                }
                (RangeKind::Date { min }, (max - min).num_days() as u128)
            }
            ColumnType::Timestamp => {
                let (Some(min), Some(max)) = (spec.min.as_timestamp(), spec.max.as_timestamp())
                else {
                    return Err("timestamp range needs date or timestamp bounds".to_string());
                };
                if min > max {
                    return Err("range min is after max".to_string());
                }
                (RangeKind::Timestamp { min }, (max - min).num_seconds() as u128)
            }
            other => return Err(format!("scalar range cannot produce {other} values")),
        };
        Ok(Self {
            kind,
            span,
            skew: spec.skew,
        })
    }

    pub fn produce(&self, rng: &mut ChaCha8Rng) -> Result<GeneratedValue, String> {
        let offset = draw_offset(rng, self.span, self.skew);
        let value = match &self.kind {
            RangeKind::Integer { min } => {
                let value = i64::try_from(*min as i128 + offset as i128)
                    .map_err(|_| "integer out of range".to_string())?;
                GeneratedValue::Int(value)
            }
            RangeKind::Decimal { min, scale } => {
                let units = min + offset as i128;
                let value = Decimal::try_from_i128_with_scale(units, *scale)
                    .map_err(|err| format!("decimal out of range: {err}"))?;
                GeneratedValue::Decimal(value)
            }
            RangeKind::Date { min } => {
                let days = u64::try_from(offset).map_err(|_| "date offset overflow".to_string())?;
                let value = min
                    .checked_add_days(Days::new(days))
                    .ok_or_else(|| "date out of range".to_string())?;
                GeneratedValue::Date(value)
            }
            RangeKind::Timestamp { min } => {
                let seconds = i64::try_from(offset)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .ok_or_else(|| "timestamp offset overflow".to_string())?;
                let value = min
                    .checked_add_signed(seconds)
                    .ok_or_else(|| "timestamp out of range".to_string())?;
                GeneratedValue::Timestamp(value)
            }
        };
        Ok(value)
    }

    pub fn domain_size(&self) -> Option<u64> {
        Some(u64::try_from(self.span.saturating_add(1)).unwrap_or(u64::MAX))
    }
}

fn scaled_units(bound: &ScalarBound, scale: u32, round_up: bool) -> Option<i128> {
    let value = match bound {
        ScalarBound::Integer(value) => Decimal::from(*value),
        ScalarBound::Number(value) => Decimal::from_str(&value.to_string()).ok()?,
        _ => return None,
    };
    let factor = Decimal::from_i128_with_scale(10_i128.checked_pow(scale)?, 0);
    let scaled = value.checked_mul(factor)?;
    let rounded = if round_up { scaled.ceil() } else { scaled.floor() };
    rounded.to_i128()
}

/// Value drawn from a fixed weighted set.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedChoice {
    entries: Vec<(GeneratedValue, f64)>,
    total_weight: f64,
}

impl WeightedChoice {
    pub fn compile(column: &ColumnDefinition, spec: &EnumerationSpec) -> Result<Self, String> {
        let mut entries = Vec::with_capacity(spec.values.len());
        for entry in &spec.values {
            let value = GeneratedValue::from_json(entry.value(), column.storage_type, column.scale)
                .ok_or_else(|| {
                    format!(
                        "enumeration value {} is not a {}",
                        entry.value(),
                        column.storage_type
                    )
                })?;
            let weight = entry.weight();
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("invalid enumeration weight {weight}"));
            }
            entries.push((value, weight));
        }
        let total_weight: f64 = entries.iter().map(|(_, weight)| weight).sum();
        if total_weight <= 0.0 {
            return Err("enumeration total weight must be > 0".to_string());
        }
        Ok(Self {
            entries,
            total_weight,
        })
    }

    pub fn produce(&self, rng: &mut ChaCha8Rng) -> GeneratedValue {
        let mut roll = rng.random_range(0.0..self.total_weight);
        let mut last = None;
        for (value, weight) in &self.entries {
            if *weight <= 0.0 {
                continue;
            }
            if roll < *weight {
                return value.clone();
            }
            roll -= weight;
            last = Some(value);
        }
        last.cloned().unwrap_or(GeneratedValue::Null)
    }

    pub fn domain_size(&self) -> Option<u64> {
        let distinct: HashSet<&GeneratedValue> = self
            .entries
            .iter()
            .filter(|(_, weight)| *weight > 0.0)
            .map(|(value, _)| value)
            .collect();
        Some(distinct.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternToken {
    Literal(String),
    Row,
    Digit,
    Letter,
}

/// Text from a template: `{row}` is the 1-based row number, `#` a digit and
/// `?` a lowercase letter.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternText {
    tokens: Vec<PatternToken>,
    domain: Option<u64>,
}

impl PatternText {
    pub fn compile(spec: &PatternSpec) -> Result<Self, String> {
        if spec.template.is_empty() {
            return Err("pattern template is empty".to_string());
        }
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = spec.template.chars().peekable();
        while let Some(ch) = chars.next() {
            let token = match ch {
                '\\' => {
                    if let Some(next) = chars.next() {
                        literal.push(next);
                    }
                    continue;
                }
                '#' => PatternToken::Digit,
                '?' => PatternToken::Letter,
                '{' if chars.clone().take(4).collect::<String>() == "row}" => {
                    for _ in 0..4 {
                        chars.next();
                    }
                    PatternToken::Row
                }
                other => {
                    literal.push(other);
                    continue;
                }
            };
            if !literal.is_empty() {
                tokens.push(PatternToken::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(token);
        }
        if !literal.is_empty() {
            tokens.push(PatternToken::Literal(literal));
        }
        Ok(Self {
            tokens,
            domain: spec.domain_size(),
        })
    }

    pub fn produce(&self, row_index: u64, rng: &mut ChaCha8Rng) -> GeneratedValue {
        let mut text = String::new();
        for token in &self.tokens {
            match token {
                PatternToken::Literal(literal) => text.push_str(literal),
                PatternToken::Row => text.push_str(&(row_index + 1).to_string()),
                PatternToken::Digit => text.push(char::from(b'0' + rng.random_range(0..10_u8))),
                PatternToken::Letter => text.push(char::from(b'a' + rng.random_range(0..26_u8))),
            }
        }
        GeneratedValue::Text(text)
    }

    pub fn domain_size(&self) -> Option<u64> {
        self.domain
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanFlag {
    probability: f64,
}

impl BooleanFlag {
    pub fn compile(spec: &BooleanSpec) -> Self {
        Self {
            probability: spec.probability.clamp(0.0, 1.0),
        }
    }

    pub fn produce(&self, rng: &mut ChaCha8Rng) -> GeneratedValue {
        GeneratedValue::Bool(rng.random_bool(self.probability))
    }

    pub fn domain_size(&self) -> Option<u64> {
        if self.probability == 0.0 || self.probability == 1.0 {
            Some(1)
        } else {
            Some(2)
        }
    }
}

pub(crate) fn random_uuid(rng: &mut ChaCha8Rng) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use seedwright_core::{ColumnConstraints, GeneratorSpec};

    fn column(storage_type: ColumnType, scale: u32) -> ColumnDefinition {
        ColumnDefinition {
            name: "value".to_string(),
            column_type: storage_type,
            storage_type,
            generator: GeneratorSpec::Uuid,
            constraints: ColumnConstraints::default(),
            scale,
        }
    }

    #[test]
    fn decimal_range_stays_within_bounds() {
        let spec = ScalarRangeSpec {
            min: ScalarBound::Number(0.5),
            max: ScalarBound::Integer(2),
            skew: 1.0,
        };
        let range = ScalarRange::compile(&column(ColumnType::Decimal, 2), &spec).expect("range");
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..200 {
            let value = range.produce(&mut rng).expect("value");
            let decimal = value.as_decimal().expect("decimal");
            assert!(decimal >= Decimal::new(50, 2) && decimal <= Decimal::new(200, 2));
            assert_eq!(decimal.scale(), 2);
        }
        assert_eq!(range.domain_size(), Some(151));
    }

    #[test]
    fn skew_favours_low_end() {
        let spec = ScalarRangeSpec {
            min: ScalarBound::Integer(0),
            max: ScalarBound::Integer(99),
            skew: 3.0,
        };
        let range = ScalarRange::compile(&column(ColumnType::Integer, 0), &spec).expect("range");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let low = (0..1000)
            .filter_map(|_| range.produce(&mut rng).ok()?.as_i64())
            .filter(|value| *value < 50)
            .count();
        assert!(low > 700, "expected most draws below 50, got {low}");
    }

    #[test]
    fn zero_weight_entries_are_never_drawn() {
        let spec: EnumerationSpec = serde_json::from_value(serde_json::json!({
            "values": [{"value": "never", "weight": 0}, {"value": "always", "weight": 2}]
        }))
        .expect("spec");
        let choice = WeightedChoice::compile(&column(ColumnType::Enum, 0), &spec).expect("choice");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(choice.produce(&mut rng), GeneratedValue::Text("always".into()));
        }
        assert_eq!(choice.domain_size(), Some(1));
    }

    #[test]
    fn pattern_expands_tokens() {
        let pattern = PatternText::compile(&PatternSpec {
            template: "INV-{row}-##\\#".to_string(),
        })
        .expect("pattern");
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let GeneratedValue::Text(text) = pattern.produce(41, &mut rng) else {
            panic!("expected text");
        };
        assert!(text.starts_with("INV-42-"));
        assert!(text.ends_with('#'));
        assert_eq!(text.len(), "INV-42-00#".len());
        assert_eq!(pattern.domain_size(), None);
    }
}

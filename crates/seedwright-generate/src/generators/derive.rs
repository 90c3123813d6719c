use chrono::TimeDelta;
use rand::Rng;
use rust_decimal::Decimal;

use seedwright_core::{scale_factor, ColumnDefinition, ColumnType, DerivedSpec, TableDefinition};

use crate::errors::GenerationError;
use crate::value::GeneratedValue;

use super::RowContext;

#[derive(Debug, Clone, PartialEq)]
enum TemplatePart {
    Literal(String),
    Column(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum DerivedOp {
    Copy(usize),
    Scale(usize, Decimal),
    Sum(Vec<usize>),
    Difference(usize, usize),
    DaysAfter {
        source: usize,
        min_days: i64,
        max_days: i64,
    },
    Template(Vec<TemplatePart>),
}

/// Value computed from columns generated earlier in the same row.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedValue {
    op: DerivedOp,
    output: ColumnType,
    scale: u32,
}

impl DerivedValue {
    pub fn compile(
        table: &TableDefinition,
        position: usize,
        spec: &DerivedSpec,
    ) -> Result<Self, String> {
        let column: &ColumnDefinition = table
            .columns
            .get(position)
            .ok_or_else(|| format!("no column at position {position}"))?;
        let earlier = |name: &str| -> Result<usize, String> {
            match table.column_index(name) {
                Some(index) if index < position => Ok(index),
                _ => Err(format!(
                    "'{}' reads '{name}', which is not generated before it",
                    column.name
                )),
            }
        };

        let op = match spec {
            DerivedSpec::Copy { column } => DerivedOp::Copy(earlier(column.as_str())?),
            DerivedSpec::Scale { column, factor } => {
                let factor = scale_factor(*factor)
                    .map_err(|err| format!("scale factor {factor} is not representable: {err}"))?;
                DerivedOp::Scale(earlier(column.as_str())?, factor)
            }
            DerivedSpec::Sum { columns } => DerivedOp::Sum(
                columns
                    .iter()
                    .map(|name| earlier(name.as_str()))
                    .collect::<Result<_, _>>()?,
            ),
            DerivedSpec::Difference {
                minuend,
                subtrahend,
            } => DerivedOp::Difference(earlier(minuend.as_str())?, earlier(subtrahend.as_str())?),
            DerivedSpec::DaysAfter {
                column,
                min_days,
                max_days,
            } => {
                if min_days > max_days {
                    return Err(format!("min_days {min_days} exceeds max_days {max_days}"));
                }
                DerivedOp::DaysAfter {
                    source: earlier(column.as_str())?,
                    min_days: *min_days,
                    max_days: *max_days,
                }
            }
            DerivedSpec::Template { template } => {
                DerivedOp::Template(parse_template(template, &earlier)?)
            }
        };

        Ok(Self {
            op,
            output: column.storage_type,
            scale: column.scale,
        })
    }

    pub fn produce(&self, ctx: &mut RowContext<'_>) -> Result<GeneratedValue, GenerationError> {
        let (table, column) = (ctx.table(), ctx.column());
        let fault = |message: String| GenerationError::generator(table, column, message);
        let raw = match &self.op {
            DerivedOp::Copy(source) => input(ctx, *source).clone(),
            DerivedOp::Scale(source, factor) => match input(ctx, *source).as_decimal() {
                Some(value) => GeneratedValue::Decimal(
                    value
                        .checked_mul(*factor)
                        .ok_or_else(|| fault("scaled value overflows".to_string()))?,
                ),
                None => GeneratedValue::Null,
            },
            DerivedOp::Sum(sources) => {
                let mut total = Some(Decimal::ZERO);
                for source in sources {
                    total = match (total, input(ctx, *source).as_decimal()) {
                        (Some(total), Some(value)) => Some(
                            total
                                .checked_add(value)
                                .ok_or_else(|| fault("sum overflows".to_string()))?,
                        ),
                        _ => None,
                    };
                }
                total.map_or(GeneratedValue::Null, GeneratedValue::Decimal)
            }
            DerivedOp::Difference(minuend, subtrahend) => {
                match (
                    input(ctx, *minuend).as_decimal(),
                    input(ctx, *subtrahend).as_decimal(),
                ) {
                    (Some(minuend), Some(subtrahend)) => GeneratedValue::Decimal(
                        minuend
                            .checked_sub(subtrahend)
                            .ok_or_else(|| fault("difference overflows".to_string()))?,
                    ),
                    _ => GeneratedValue::Null,
                }
            }
            DerivedOp::DaysAfter {
                source,
                min_days,
                max_days,
            } => match input(ctx, *source).as_timestamp() {
                Some(start) => {
                    let days = ctx.rng().random_range(*min_days..=*max_days);
                    let shifted = TimeDelta::try_days(days)
                        .and_then(|delta| start.checked_add_signed(delta))
                        .ok_or_else(|| fault(format!("{days} days after {start} overflows")))?;
                    GeneratedValue::Timestamp(shifted)
                }
                None => GeneratedValue::Null,
            },
            DerivedOp::Template(parts) => {
                let mut text = String::new();
                let mut null = false;
                for part in parts {
                    match part {
                        TemplatePart::Literal(literal) => text.push_str(literal),
                        TemplatePart::Column(source) => {
                            let value = input(ctx, *source);
                            null |= value.is_null();
                            text.push_str(&value.to_string());
                        }
                    }
                }
                if null {
                    GeneratedValue::Null
                } else {
                    GeneratedValue::Text(text)
                }
            }
        };

        let rendered = raw.to_string();
        raw.coerce(self.output, self.scale).ok_or_else(|| {
            fault(format!("cannot store '{rendered}' as {}", self.output))
        })
    }
}

static NULL: GeneratedValue = GeneratedValue::Null;

fn input<'a>(ctx: &'a RowContext<'_>, position: usize) -> &'a GeneratedValue {
    ctx.value_at(position).unwrap_or(&NULL)
}

fn parse_template(
    template: &str,
    resolve: &impl Fn(&str) -> Result<usize, String>,
) -> Result<Vec<TemplatePart>, String> {
    let mut parts = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        if open > 0 {
            parts.push(TemplatePart::Literal(rest[..open].to_string()));
        }
        parts.push(TemplatePart::Column(resolve(after[..close].trim())?));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        parts.push(TemplatePart::Literal(rest.to_string()));
    }
    Ok(parts)
}

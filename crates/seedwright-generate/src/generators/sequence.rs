use seedwright_core::{ColumnDefinition, ColumnType, SequenceOrder, UniqueSequenceSpec};

use crate::errors::GenerationError;
use crate::rng::Permutation;
use crate::value::GeneratedValue;

use super::RowContext;

/// Unique values derived from the row index: `start + i * step`, optionally
/// visited in a seeded shuffled order.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueSequence {
    start: i64,
    step: i64,
    domain: Option<u64>,
    permutation: Option<Permutation>,
    text: bool,
    template: Option<String>,
}

impl UniqueSequence {
    pub fn compile(
        column: &ColumnDefinition,
        spec: &UniqueSequenceSpec,
        seed: u64,
    ) -> Result<Self, String> {
        if spec.step == 0 {
            return Err("sequence step must not be zero".to_string());
        }
        let domain = spec.domain_size();
        let permutation = match (spec.order, domain) {
            (SequenceOrder::Ascending, _) => None,
            (SequenceOrder::Shuffled, Some(domain)) => Some(Permutation::new(domain, seed)),
            (SequenceOrder::Shuffled, None) => {
                return Err("a shuffled sequence needs an `end`".to_string());
            }
        };
        let text = match column.storage_type {
            ColumnType::Integer => false,
            ColumnType::String | ColumnType::Enum => true,
            other => return Err(format!("unique sequence cannot produce {other} values")),
        };
        Ok(Self {
            start: spec.start,
            step: spec.step,
            domain,
            permutation,
            text,
            template: spec.template.clone(),
        })
    }

    pub fn produce(&self, ctx: &RowContext<'_>) -> Result<GeneratedValue, GenerationError> {
        let index = ctx.row_index();
        let exhausted = || GenerationError::ExhaustedSequence {
            table: ctx.table().to_string(),
            column: ctx.column().to_string(),
            domain: self.domain.unwrap_or(index),
        };
        if self.domain.is_some_and(|domain| index >= domain) {
            return Err(exhausted());
        }
        let position = match &self.permutation {
            Some(permutation) => permutation.apply(index).ok_or_else(exhausted)?,
            None => index,
        };
        let number = i64::try_from(self.start as i128 + position as i128 * self.step as i128)
            .map_err(|_| exhausted())?;

        if !self.text {
            return Ok(GeneratedValue::Int(number));
        }
        let text = match &self.template {
            Some(template) => template.replace("{}", &number.to_string()),
            None => number.to_string(),
        };
        Ok(GeneratedValue::Text(text))
    }

    pub fn domain_size(&self) -> Option<u64> {
        self.domain
    }
}

use rand::Rng;

use seedwright_core::{
    Cardinality, ColumnDefinition, ForeignKeySpec, Relationship, SelectionPolicy, TableDefinition,
};

use crate::errors::GenerationError;
use crate::record::ParentSets;
use crate::rng::Permutation;
use crate::value::GeneratedValue;

use super::RowContext;

/// Copies a key from a row of the referenced parent table.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyPicker {
    parent: String,
    column: usize,
    parent_rows: u64,
    policy: SelectionPolicy,
    /// Set for one-to-one relationships: row `i` takes parent `p(i)`.
    permutation: Option<Permutation>,
}

impl ForeignKeyPicker {
    pub fn compile(
        table: &TableDefinition,
        column: &ColumnDefinition,
        relationship: &Relationship,
        spec: &ForeignKeySpec,
        parents: &ParentSets,
        seed: u64,
    ) -> Result<Self, GenerationError> {
        let target = &relationship.references;
        let parent = parents
            .get(&target.table)
            .ok_or_else(|| GenerationError::ParentUnavailable {
                table: table.name.clone(),
                parent: target.table.clone(),
            })?;
        let key_column = parent.column_index(&target.column).ok_or_else(|| {
            GenerationError::generator(
                &table.name,
                &column.name,
                format!(
                    "parent keys of '{}' do not retain column '{}'",
                    target.table, target.column
                ),
            )
        })?;
        let permutation = (relationship.cardinality == Cardinality::OneToOne)
            .then(|| Permutation::new(parent.len(), seed));
        Ok(Self {
            parent: target.table.clone(),
            column: key_column,
            parent_rows: parent.len(),
            policy: spec.policy,
            permutation,
        })
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn is_one_to_one(&self) -> bool {
        self.permutation.is_some()
    }

    pub fn produce(&self, ctx: &mut RowContext<'_>) -> Result<GeneratedValue, GenerationError> {
        let row_index = ctx.row_index();
        let rows = ctx
            .parent(&self.parent)
            .map(|parent| parent.len())
            .ok_or_else(|| GenerationError::ParentUnavailable {
                table: ctx.table().to_string(),
                parent: self.parent.clone(),
            })?;
        if rows == 0 {
            return Err(GenerationError::EmptyParentSet {
                table: ctx.table().to_string(),
                column: ctx.column().to_string(),
                parent: self.parent.clone(),
            });
        }

        let index = match &self.permutation {
            Some(permutation) => permutation.apply(row_index).ok_or_else(|| {
                GenerationError::ConstraintUnsatisfiable {
                    table: ctx.table().to_string(),
                    column: ctx.column().to_string(),
                    reason: format!(
                        "one-to-one relationship to '{}' has only {rows} parent rows",
                        self.parent
                    ),
                }
            })?,
            None => match self.policy {
                SelectionPolicy::Uniform => ctx.rng().random_range(0..rows),
                SelectionPolicy::Skewed { exponent } => {
                    let draw: f64 = ctx.rng().random();
                    ((rows as f64 * draw.powf(exponent)).floor() as u64).min(rows - 1)
                }
            },
        };

        ctx.parent(&self.parent)
            .and_then(|parent| parent.value(self.column, index))
            .cloned()
            .ok_or_else(|| GenerationError::ParentUnavailable {
                table: ctx.table().to_string(),
                parent: self.parent.clone(),
            })
    }

    /// Number of parent keys available.
    pub fn domain_size(&self) -> Option<u64> {
        Some(self.parent_rows)
    }
}

//! Field generators compiled from a column's `GeneratorSpec`.

pub mod derive;
pub mod primitives;
pub mod reference;
pub mod sequence;

use rand_chacha::ChaCha8Rng;

use seedwright_core::{GeneratorSpec, TableDefinition};

use crate::errors::GenerationError;
use crate::record::{ParentKeys, ParentSets};
use crate::rng::column_seed;
use crate::value::GeneratedValue;

pub use derive::DerivedValue;
pub use primitives::{BooleanFlag, PatternText, ScalarRange, WeightedChoice};
pub use reference::ForeignKeyPicker;
pub use sequence::UniqueSequence;

/// What a generator can see while producing one column of one row.
pub struct RowContext<'a> {
    table: &'a str,
    column: &'a str,
    row_index: u64,
    rng: ChaCha8Rng,
    columns: &'a [String],
    values: &'a [GeneratedValue],
    parents: &'a ParentSets,
}

impl<'a> RowContext<'a> {
    pub fn new(
        table: &'a str,
        column: &'a str,
        row_index: u64,
        rng: ChaCha8Rng,
        columns: &'a [String],
        values: &'a [GeneratedValue],
        parents: &'a ParentSets,
    ) -> Self {
        Self {
            table,
            column,
            row_index,
            rng,
            columns,
            values,
            parents,
        }
    }

    pub fn table(&self) -> &'a str {
        self.table
    }

    pub fn column(&self) -> &'a str {
        self.column
    }

    /// 0-based index of the row within its table.
    pub fn row_index(&self) -> u64 {
        self.row_index
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Value of an earlier column of this row.
    pub fn value(&self, column: &str) -> Option<&GeneratedValue> {
        let position = self.columns.iter().position(|name| name == column)?;
        self.values.get(position)
    }

    pub fn value_at(&self, position: usize) -> Option<&GeneratedValue> {
        self.values.get(position)
    }

    /// Keys of a completed table earlier in resolution order.
    pub fn parent(&self, table: &str) -> Option<&'a ParentKeys> {
        self.parents.get(table).map(|keys| keys.as_ref())
    }
}

/// Compiled value producer for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldGenerator {
    ScalarRange(ScalarRange),
    Enumeration(WeightedChoice),
    UniqueSequence(UniqueSequence),
    ForeignKey(ForeignKeyPicker),
    Derived(DerivedValue),
    Pattern(PatternText),
    Boolean(BooleanFlag),
    Uuid,
}

impl FieldGenerator {
    /// Compile the generator of `table.columns[position]`. Foreign keys need
    /// their parent in `parents`.
    pub fn compile(
        table: &TableDefinition,
        position: usize,
        table_seed: u64,
        parents: &ParentSets,
    ) -> Result<Self, GenerationError> {
        let column = table.columns.get(position).ok_or_else(|| {
            GenerationError::generator(&table.name, "", format!("no column at position {position}"))
        })?;
        let seed = column_seed(table_seed, position);
        let fault = |message: String| GenerationError::generator(&table.name, &column.name, message);

        let generator = match &column.generator {
            GeneratorSpec::ScalarRange(spec) => {
                Self::ScalarRange(ScalarRange::compile(column, spec).map_err(fault)?)
            }
            GeneratorSpec::Enumeration(spec) => {
                Self::Enumeration(WeightedChoice::compile(column, spec).map_err(fault)?)
            }
            GeneratorSpec::UniqueSequence(spec) => {
                Self::UniqueSequence(UniqueSequence::compile(column, spec, seed).map_err(fault)?)
            }
            GeneratorSpec::ForeignKey(spec) => {
                let relationship = table.relationship_for(&column.name).ok_or_else(|| {
                    fault("foreign_key generator without a relationship".to_string())
                })?;
                Self::ForeignKey(ForeignKeyPicker::compile(
                    table,
                    column,
                    relationship,
                    spec,
                    parents,
                    seed,
                )?)
            }
            GeneratorSpec::Derived(spec) => {
                Self::Derived(DerivedValue::compile(table, position, spec).map_err(fault)?)
            }
            GeneratorSpec::Pattern(spec) => {
                Self::Pattern(PatternText::compile(spec).map_err(fault)?)
            }
            GeneratorSpec::Boolean(spec) => Self::Boolean(BooleanFlag::compile(spec)),
            GeneratorSpec::Uuid => Self::Uuid,
        };
        Ok(generator)
    }

    pub fn produce(&self, ctx: &mut RowContext<'_>) -> Result<GeneratedValue, GenerationError> {
        let (table, column) = (ctx.table(), ctx.column());
        let fault = |message: String| GenerationError::generator(table, column, message);
        match self {
            Self::ScalarRange(range) => range.produce(ctx.rng()).map_err(fault),
            Self::Enumeration(choice) => Ok(choice.produce(ctx.rng())),
            Self::UniqueSequence(sequence) => sequence.produce(ctx),
            Self::ForeignKey(picker) => picker.produce(ctx),
            Self::Derived(derived) => derived.produce(ctx),
            Self::Pattern(pattern) => {
                let row_index = ctx.row_index();
                Ok(pattern.produce(row_index, ctx.rng()))
            }
            Self::Boolean(flag) => Ok(flag.produce(ctx.rng())),
            Self::Uuid => Ok(GeneratedValue::Text(primitives::random_uuid(ctx.rng()))),
        }
    }

    /// Number of distinct values this generator can emit, when finite.
    pub fn domain_size(&self) -> Option<u64> {
        match self {
            Self::ScalarRange(range) => range.domain_size(),
            Self::Enumeration(choice) => choice.domain_size(),
            Self::UniqueSequence(sequence) => sequence.domain_size(),
            Self::ForeignKey(picker) => picker.domain_size(),
            Self::Pattern(pattern) => pattern.domain_size(),
            Self::Boolean(flag) => flag.domain_size(),
            Self::Derived(_) | Self::Uuid => None,
        }
    }

    /// Values are distinct by construction, so no uniqueness tracking is
    /// needed.
    pub fn is_distinct_by_construction(&self) -> bool {
        match self {
            Self::UniqueSequence(_) => true,
            Self::ForeignKey(picker) => picker.is_one_to_one(),
            _ => false,
        }
    }

    pub fn parent_table(&self) -> Option<&str> {
        match self {
            Self::ForeignKey(picker) => Some(picker.parent()),
            _ => None,
        }
    }
}

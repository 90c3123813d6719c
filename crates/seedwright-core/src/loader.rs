//! Schema document loading and exhaustive validation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value;

use crate::document::{ColumnDocument, SchemaDocument, TableDocument};
use crate::error::{SchemaError, SchemaErrorKind, SchemaIssue};
use crate::generator::{
    BooleanSpec, DerivedSpec, EnumEntry, EnumerationSpec, ForeignKeySpec, GeneratorSpec,
    PatternSpec, ScalarRangeSpec, SelectionPolicy, SequenceOrder, UniqueSequenceSpec,
    scale_factor, template_has_empty_placeholder,
};
use crate::schema::{
    ColumnConstraints, ColumnDefinition, Relationship, SchemaDefinition, TableDefinition,
};
use crate::types::{Cardinality, ColumnType, ScalarBound};

/// Largest supported decimal scale.
pub const MAX_DECIMAL_SCALE: u32 = 18;
const DEFAULT_DECIMAL_SCALE: u32 = 2;

/// Parse and validate a JSON schema document.
pub fn load_schema(bytes: &[u8]) -> Result<SchemaDefinition, SchemaError> {
    let document: SchemaDocument = serde_json::from_slice(bytes).map_err(|err| {
        SchemaError::single(SchemaIssue::new(
            SchemaErrorKind::MalformedInput,
            "",
            format!("schema document is not valid: {err}"),
        ))
    })?;
    validate_document(&document)
}

/// Read a schema document from disk and validate it.
pub fn load_schema_file(path: impl AsRef<Path>) -> Result<SchemaDefinition, SchemaError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|err| {
        SchemaError::single(SchemaIssue::new(
            SchemaErrorKind::MalformedInput,
            "",
            format!("failed to read {}: {err}", path.display()),
        ))
    })?;
    load_schema(&bytes)
}

/// JSON Schema describing the input document format.
pub fn schema_document_json_schema() -> Value {
    let schema = schemars::schema_for!(SchemaDocument);
    serde_json::to_value(&schema).unwrap_or_default()
}

/// Validate a parsed document, collecting every issue before failing.
pub fn validate_document(document: &SchemaDocument) -> Result<SchemaDefinition, SchemaError> {
    let mut issues = Issues::default();
    if document.name.trim().is_empty() {
        issues.push(
            SchemaErrorKind::MalformedInput,
            "/name",
            "schema name must not be empty",
        );
    }
    if document.tables.is_empty() {
        issues.push(
            SchemaErrorKind::MalformedInput,
            "/tables",
            "schema declares no tables",
        );
    }

    let catalog = Catalog::new(document);
    let mut seen = BTreeSet::new();
    let mut tables = Vec::with_capacity(document.tables.len());
    for (index, table) in document.tables.iter().enumerate() {
        if !seen.insert(table.name.as_str()) {
            issues.push(
                SchemaErrorKind::DuplicateTableName,
                format!("/tables/{index}/name"),
                format!("table `{}` is declared more than once", table.name),
            );
        }
        tables.push(validate_table(index, table, &catalog, &mut issues));
    }

    if !issues.0.is_empty() {
        return Err(SchemaError { issues: issues.0 });
    }

    Ok(SchemaDefinition {
        name: document.name.clone(),
        vertical: document.vertical.clone(),
        description: document.description.clone(),
        tables,
    })
}

#[derive(Default)]
struct Issues(Vec<SchemaIssue>);

impl Issues {
    fn push(&mut self, kind: SchemaErrorKind, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(SchemaIssue::new(kind, path, message));
    }
}

/// Cross-table lookups over the raw document. Duplicate table names resolve
/// to their first declaration.
struct Catalog<'a> {
    tables: BTreeMap<&'a str, &'a TableDocument>,
    column_count: usize,
}

impl<'a> Catalog<'a> {
    fn new(document: &'a SchemaDocument) -> Self {
        let mut tables = BTreeMap::new();
        for table in &document.tables {
            tables.entry(table.name.as_str()).or_insert(table);
        }
        let column_count = document.tables.iter().map(|table| table.columns.len()).sum();
        Self {
            tables,
            column_count,
        }
    }

    fn column(&self, table: &str, column: &str) -> Option<&'a ColumnDocument> {
        self.tables
            .get(table)?
            .columns
            .iter()
            .find(|candidate| candidate.name == column)
    }

    /// Stored type of a column, following reference chains to the key they
    /// finally point at.
    fn storage_type<'b>(&'b self, table: &'b str, column: &'b str) -> Option<ColumnType> {
        let mut current = (table, column);
        for _ in 0..=self.column_count {
            let column_type = ColumnType::parse(&self.column(current.0, current.1)?.column_type)?;
            if column_type != ColumnType::Reference {
                return Some(column_type);
            }
            let relationship = self
                .tables
                .get(current.0)?
                .relationships
                .iter()
                .find(|relationship| relationship.column == current.1)?;
            current = (
                relationship.references.table.as_str(),
                relationship.references.column.as_str(),
            );
        }
        None
    }

    fn is_key(&self, table: &str, column: &str) -> bool {
        let Some(document) = self.tables.get(table) else {
            return false;
        };
        document.primary_key.as_deref() == Some(column)
            || self
                .column(table, column)
                .is_some_and(|candidate| candidate.unique && !candidate.nullable)
    }
}

fn validate_table(
    index: usize,
    table: &TableDocument,
    catalog: &Catalog<'_>,
    issues: &mut Issues,
) -> TableDefinition {
    let base = format!("/tables/{index}");
    if table.name.trim().is_empty() {
        issues.push(
            SchemaErrorKind::MalformedInput,
            format!("{base}/name"),
            "table name must not be empty",
        );
    }

    let mut by_source: BTreeMap<&str, &Relationship> = BTreeMap::new();
    for relationship in &table.relationships {
        by_source
            .entry(relationship.column.as_str())
            .or_insert(relationship);
    }

    let mut names = BTreeSet::new();
    let mut earlier: BTreeMap<&str, ColumnType> = BTreeMap::new();
    let mut columns = Vec::with_capacity(table.columns.len());
    for (position, column) in table.columns.iter().enumerate() {
        let path = format!("{base}/columns/{position}");
        if !names.insert(column.name.as_str()) {
            issues.push(
                SchemaErrorKind::DuplicateColumnName,
                format!("{path}/name"),
                format!(
                    "column `{}` is declared more than once in table `{}`",
                    column.name, table.name
                ),
            );
        }

        let Some(column_type) = ColumnType::parse(&column.column_type) else {
            issues.push(
                SchemaErrorKind::UnknownColumnType,
                format!("{path}/type"),
                format!(
                    "unknown column type `{}` for column `{}`",
                    column.column_type, column.name
                ),
            );
            continue;
        };

        let relationship = by_source.get(column.name.as_str()).copied();
        let storage_type = match (column_type, relationship) {
            (ColumnType::Reference, Some(relationship)) => catalog
                .storage_type(&relationship.references.table, &relationship.references.column)
                .unwrap_or(ColumnType::Integer),
            (ColumnType::Reference, None) => ColumnType::Integer,
            (other, _) => other,
        };
        let is_primary = table.primary_key.as_deref() == Some(column.name.as_str());
        let one_to_one =
            relationship.is_some_and(|relationship| relationship.cardinality == Cardinality::OneToOne);

        let constraints = check_constraints(
            &path,
            column,
            storage_type,
            is_primary || one_to_one,
            is_primary,
            issues,
        );

        let scale = column.scale.unwrap_or(DEFAULT_DECIMAL_SCALE);
        if scale > MAX_DECIMAL_SCALE {
            issues.push(
                SchemaErrorKind::InvalidConstraint,
                format!("{path}/scale"),
                format!("scale {scale} exceeds the maximum of {MAX_DECIMAL_SCALE}"),
            );
        }

        let generator = match &column.generator {
            Some(raw) => match serde_json::from_value::<GeneratorSpec>(raw.clone()) {
                Ok(spec) => Some(spec),
                Err(err) => {
                    issues.push(
                        SchemaErrorKind::InvalidGeneratorSpec,
                        format!("{path}/generator"),
                        format!("cannot parse generator for `{}`: {err}", column.name),
                    );
                    None
                }
            },
            None => {
                let fallback = default_generator(
                    &column.name,
                    column_type,
                    &constraints,
                    relationship.is_some(),
                );
                if fallback.is_none() {
                    issues.push(
                        SchemaErrorKind::InvalidGeneratorSpec,
                        format!("{path}/generator"),
                        format!(
                            "column `{}` of type {column_type} needs `values` or an explicit generator",
                            column.name
                        ),
                    );
                }
                fallback
            }
        };

        if let Some(generator) = generator {
            let scope = ColumnScope {
                name: &column.name,
                column_type,
                storage_type,
                allowed: constraints.values.as_deref(),
                relationship,
                earlier: &earlier,
            };
            check_generator(&format!("{path}/generator"), &generator, &scope, issues);
            columns.push(ColumnDefinition {
                name: column.name.clone(),
                column_type,
                storage_type,
                generator,
                constraints,
                scale: scale.min(MAX_DECIMAL_SCALE),
            });
        }
        earlier.insert(column.name.as_str(), storage_type);
    }

    if let Some(primary_key) = &table.primary_key {
        if !names.contains(primary_key.as_str()) {
            issues.push(
                SchemaErrorKind::UnknownColumn,
                format!("{base}/primary_key"),
                format!(
                    "primary key `{primary_key}` is not a column of table `{}`",
                    table.name
                ),
            );
        }
    }

    check_relationships(&base, table, catalog, issues);

    TableDefinition {
        name: table.name.clone(),
        rows: table.rows,
        primary_key: table.primary_key.clone(),
        columns,
        relationships: table.relationships.clone(),
    }
}

fn check_relationships(
    base: &str,
    table: &TableDocument,
    catalog: &Catalog<'_>,
    issues: &mut Issues,
) {
    let mut sources = BTreeSet::new();
    for (index, relationship) in table.relationships.iter().enumerate() {
        let path = format!("{base}/relationships/{index}");
        if !sources.insert(relationship.column.as_str()) {
            issues.push(
                SchemaErrorKind::InvalidConstraint,
                format!("{path}/column"),
                format!(
                    "column `{}` already has a relationship",
                    relationship.column
                ),
            );
        }

        let source = table
            .columns
            .iter()
            .find(|column| column.name == relationship.column);
        if source.is_none() {
            issues.push(
                SchemaErrorKind::UnknownColumn,
                format!("{path}/column"),
                format!(
                    "relationship source `{}` is not a column of table `{}`",
                    relationship.column, table.name
                ),
            );
        }

        let target = &relationship.references;
        if !catalog.tables.contains_key(target.table.as_str()) {
            issues.push(
                SchemaErrorKind::DanglingForeignKey,
                format!("{path}/references/table"),
                format!("relationship references unknown table `{}`", target.table),
            );
            continue;
        }
        if catalog.column(&target.table, &target.column).is_none() {
            issues.push(
                SchemaErrorKind::DanglingForeignKey,
                format!("{path}/references/column"),
                format!(
                    "table `{}` has no column `{}`",
                    target.table, target.column
                ),
            );
            continue;
        }
        if !catalog.is_key(&target.table, &target.column) {
            issues.push(
                SchemaErrorKind::DanglingForeignKey,
                format!("{path}/references/column"),
                format!(
                    "`{}.{}` is neither the primary key nor a unique, non-nullable column",
                    target.table, target.column
                ),
            );
            continue;
        }

        let source_type = source.and_then(|column| ColumnType::parse(&column.column_type));
        let target_type = catalog.storage_type(&target.table, &target.column);
        if let (Some(source_type), Some(target_type)) = (source_type, target_type) {
            if source_type != ColumnType::Reference && source_type != target_type {
                issues.push(
                    SchemaErrorKind::InvalidConstraint,
                    format!("{path}/column"),
                    format!(
                        "column `{}` is {source_type} but `{}.{}` stores {target_type}",
                        relationship.column, target.table, target.column
                    ),
                );
            }
        }
    }
}

fn check_constraints(
    path: &str,
    column: &ColumnDocument,
    storage_type: ColumnType,
    unique: bool,
    is_primary: bool,
    issues: &mut Issues,
) -> ColumnConstraints {
    let null_probability = column.null_probability.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&null_probability) {
        issues.push(
            SchemaErrorKind::InvalidConstraint,
            format!("{path}/null_probability"),
            format!("null_probability {null_probability} is outside [0, 1]"),
        );
    } else if null_probability > 0.0 && !column.nullable {
        issues.push(
            SchemaErrorKind::InvalidConstraint,
            format!("{path}/null_probability"),
            format!(
                "null_probability is set but column `{}` is not nullable",
                column.name
            ),
        );
    }
    if is_primary && column.nullable {
        issues.push(
            SchemaErrorKind::InvalidConstraint,
            format!("{path}/nullable"),
            format!("primary key column `{}` cannot be nullable", column.name),
        );
    }

    let min = column
        .min
        .as_ref()
        .and_then(|raw| parse_bound(&format!("{path}/min"), raw, storage_type, issues));
    let max = column
        .max
        .as_ref()
        .and_then(|raw| parse_bound(&format!("{path}/max"), raw, storage_type, issues));
    if let (Some(low), Some(high)) = (min, max) {
        if low.compare(&high) == Some(Ordering::Greater) {
            issues.push(
                SchemaErrorKind::InvalidConstraint,
                format!("{path}/min"),
                format!("min is greater than max for column `{}`", column.name),
            );
        }
    }

    if let Some(values) = &column.values {
        if values.is_empty() {
            issues.push(
                SchemaErrorKind::InvalidConstraint,
                format!("{path}/values"),
                "value set must not be empty",
            );
        }
        for (index, value) in values.iter().enumerate() {
            if !storage_type.accepts_json(value) {
                issues.push(
                    SchemaErrorKind::InvalidConstraint,
                    format!("{path}/values/{index}"),
                    format!("value {value} is not a valid {storage_type}"),
                );
            }
        }
    }

    ColumnConstraints {
        nullable: column.nullable,
        null_probability: if column.nullable { null_probability } else { 0.0 },
        unique: column.unique || unique,
        min,
        max,
        values: column.values.clone(),
    }
}

fn parse_bound(
    path: &str,
    raw: &Value,
    storage_type: ColumnType,
    issues: &mut Issues,
) -> Option<ScalarBound> {
    let bound = match serde_json::from_value::<ScalarBound>(raw.clone()) {
        Ok(bound) => bound,
        Err(_) => {
            issues.push(
                SchemaErrorKind::InvalidConstraint,
                path,
                format!("{raw} is not a number, date or timestamp"),
            );
            return None;
        }
    };
    if !bound.fits(storage_type) {
        issues.push(
            SchemaErrorKind::InvalidConstraint,
            path,
            format!(
                "{} bound does not apply to a {storage_type} column",
                bound.kind_name()
            ),
        );
        return None;
    }
    Some(bound)
}

/// Generator used when a column declares none.
fn default_generator(
    name: &str,
    column_type: ColumnType,
    constraints: &ColumnConstraints,
    is_relationship_source: bool,
) -> Option<GeneratorSpec> {
    if is_relationship_source || column_type == ColumnType::Reference {
        return Some(GeneratorSpec::ForeignKey(ForeignKeySpec::default()));
    }
    if let Some(values) = &constraints.values {
        return Some(GeneratorSpec::Enumeration(EnumerationSpec {
            values: values.iter().cloned().map(EnumEntry::Bare).collect(),
        }));
    }

    let bounded = |low: ScalarBound, high: ScalarBound| {
        let (min, max) = match (constraints.min, constraints.max) {
            (Some(min), Some(max)) => (min, max),
            _ => (low, high),
        };
        GeneratorSpec::ScalarRange(ScalarRangeSpec {
            min,
            max,
            skew: 1.0,
        })
    };

    let start = NaiveDate::from_ymd_opt(2024, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(2024, 12, 31)?;
    let spec = match column_type {
        ColumnType::Integer if constraints.unique => {
            GeneratorSpec::UniqueSequence(UniqueSequenceSpec {
                start: 1,
                step: 1,
                end: None,
                order: SequenceOrder::Ascending,
                template: None,
            })
        }
        ColumnType::Integer => bounded(ScalarBound::Integer(1), ScalarBound::Integer(100_000)),
        ColumnType::Decimal => bounded(ScalarBound::Integer(0), ScalarBound::Integer(10_000)),
        ColumnType::Date => bounded(ScalarBound::Date(start), ScalarBound::Date(end)),
        ColumnType::Timestamp => bounded(
            ScalarBound::Timestamp(start.and_hms_opt(0, 0, 0)?),
            ScalarBound::Timestamp(end.and_hms_opt(23, 59, 59)?),
        ),
        ColumnType::Boolean => GeneratorSpec::Boolean(BooleanSpec { probability: 0.5 }),
        ColumnType::String => GeneratorSpec::Pattern(PatternSpec {
            template: format!("{}_{{row}}", escape_pattern(name)),
        }),
        ColumnType::Enum | ColumnType::Reference => return None,
    };
    Some(spec)
}

fn escape_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '#' | '?' | '\\' | '{') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

struct ColumnScope<'s> {
    name: &'s str,
    column_type: ColumnType,
    storage_type: ColumnType,
    allowed: Option<&'s [Value]>,
    relationship: Option<&'s Relationship>,
    earlier: &'s BTreeMap<&'s str, ColumnType>,
}

fn applies_to(spec: &GeneratorSpec, column_type: ColumnType) -> bool {
    use ColumnType as T;
    match spec {
        GeneratorSpec::ScalarRange(_) => {
            matches!(column_type, T::Integer | T::Decimal | T::Date | T::Timestamp)
        }
        GeneratorSpec::Enumeration(_) | GeneratorSpec::Derived(_) => column_type != T::Reference,
        GeneratorSpec::UniqueSequence(_) => matches!(column_type, T::Integer | T::String | T::Enum),
        GeneratorSpec::ForeignKey(_) => true,
        GeneratorSpec::Pattern(_) => column_type.is_textual(),
        GeneratorSpec::Boolean(_) => column_type == T::Boolean,
        GeneratorSpec::Uuid => column_type == T::String,
    }
}

fn check_generator(path: &str, spec: &GeneratorSpec, scope: &ColumnScope<'_>, issues: &mut Issues) {
    let mut invalid = |message: String| {
        issues.push(SchemaErrorKind::InvalidGeneratorSpec, path, message);
    };

    match (spec, scope.relationship) {
        (GeneratorSpec::ForeignKey(_), None) => {
            invalid(format!(
                "column `{}` uses a foreign_key generator but is not a relationship source",
                scope.name
            ));
        }
        (GeneratorSpec::ForeignKey(_), Some(_)) => {}
        (other, Some(_)) => {
            invalid(format!(
                "relationship source `{}` needs a foreign_key generator, found {}",
                scope.name,
                other.kind_name()
            ));
            return;
        }
        _ => {}
    }

    if !applies_to(spec, scope.column_type) {
        invalid(format!(
            "{} generator does not apply to {} column `{}`",
            spec.kind_name(),
            scope.column_type,
            scope.name
        ));
        return;
    }

    match spec {
        GeneratorSpec::ScalarRange(range) => {
            for (label, bound) in [("min", &range.min), ("max", &range.max)] {
                if !bound.fits(scope.column_type) {
                    invalid(format!(
                        "range {label} is a {} but the column is {}",
                        bound.kind_name(),
                        scope.column_type
                    ));
                }
            }
            if range.min.compare(&range.max) == Some(Ordering::Greater) {
                invalid(format!("range min is greater than max for `{}`", scope.name));
            }
            if !(range.skew.is_finite() && range.skew > 0.0) {
                invalid(format!("skew must be positive, got {}", range.skew));
            }
        }
        GeneratorSpec::Enumeration(enumeration) => {
            if enumeration.values.is_empty() {
                invalid(format!("enumeration for `{}` has no values", scope.name));
                return;
            }
            if enumeration
                .values
                .iter()
                .any(|entry| !entry.weight().is_finite() || entry.weight() < 0.0)
            {
                invalid("enumeration weights must be finite and non-negative".to_string());
            } else if enumeration.total_weight() <= 0.0 {
                invalid("enumeration weights sum to zero".to_string());
            }
            for entry in &enumeration.values {
                let value = entry.value();
                if !scope.column_type.accepts_json(value) {
                    invalid(format!(
                        "enumeration value {value} is not a valid {}",
                        scope.column_type
                    ));
                } else if scope.allowed.is_some_and(|allowed| !allowed.contains(value)) {
                    invalid(format!(
                        "enumeration value {value} is outside the column's value set"
                    ));
                }
            }
        }
        GeneratorSpec::UniqueSequence(sequence) => {
            if sequence.step == 0 {
                invalid("sequence step must not be zero".to_string());
            } else if sequence.domain_size() == Some(0) {
                invalid("sequence end lies on the wrong side of start".to_string());
            }
            if sequence.order == SequenceOrder::Shuffled && sequence.end.is_none() {
                invalid("a shuffled sequence needs an `end`".to_string());
            }
            match (&sequence.template, scope.column_type) {
                (Some(_), ColumnType::Integer) => {
                    invalid("sequence template only applies to text columns".to_string());
                }
                (Some(template), _) if !template.contains("{}") => {
                    invalid("sequence template must contain `{}`".to_string());
                }
                _ => {}
            }
        }
        GeneratorSpec::ForeignKey(foreign) => {
            if let SelectionPolicy::Skewed { exponent } = foreign.policy {
                if !(exponent.is_finite() && exponent > 0.0) {
                    invalid(format!("skewed exponent must be positive, got {exponent}"));
                }
            }
        }
        GeneratorSpec::Derived(derived) => check_derived(derived, scope, &mut invalid),
        GeneratorSpec::Pattern(pattern) => {
            if pattern.template.is_empty() {
                invalid("pattern template must not be empty".to_string());
            }
        }
        GeneratorSpec::Boolean(boolean) => {
            if !(0.0..=1.0).contains(&boolean.probability) {
                invalid(format!(
                    "boolean probability {} is outside [0, 1]",
                    boolean.probability
                ));
            }
        }
        GeneratorSpec::Uuid => {}
    }
}

fn check_derived(derived: &DerivedSpec, scope: &ColumnScope<'_>, invalid: &mut impl FnMut(String)) {
    let mut inputs = Vec::new();
    for input in derived.input_columns() {
        match scope.earlier.get(input.as_str()) {
            Some(input_type) => inputs.push((input, *input_type)),
            None => invalid(format!(
                "derived column `{}` reads `{input}`, which is not declared before it",
                scope.name
            )),
        }
    }

    let output = scope.storage_type;
    match derived {
        DerivedSpec::Copy { .. } => {
            for (input, input_type) in &inputs {
                if *input_type != output && !output.is_textual() {
                    invalid(format!(
                        "cannot copy {input_type} column `{input}` into {output} column `{}`",
                        scope.name
                    ));
                }
            }
        }
        DerivedSpec::Scale { factor, .. } => {
            if !factor.is_finite() {
                invalid(format!("scale factor must be finite, got {factor}"));
            } else if let Err(err) = scale_factor(*factor) {
                invalid(format!("scale factor {factor} is not representable as a decimal: {err}"));
            }
            require_numeric(&inputs, output, scope.name, derived.op_name(), invalid);
        }
        DerivedSpec::Sum { columns } => {
            if columns.is_empty() {
                invalid("sum needs at least one column".to_string());
            }
            require_numeric(&inputs, output, scope.name, derived.op_name(), invalid);
        }
        DerivedSpec::Difference { .. } => {
            require_numeric(&inputs, output, scope.name, derived.op_name(), invalid);
        }
        DerivedSpec::DaysAfter {
            min_days, max_days, ..
        } => {
            if min_days > max_days {
                invalid(format!("min_days {min_days} exceeds max_days {max_days}"));
            }
            if !output.is_temporal() {
                invalid(format!("days_after needs a date or timestamp column, `{}` is {output}", scope.name));
            }
            for (input, input_type) in &inputs {
                if !input_type.is_temporal() {
                    invalid(format!("days_after reads {input_type} column `{input}`"));
                }
            }
        }
        DerivedSpec::Template { template } => {
            if !output.is_textual() {
                invalid(format!("template needs a text column, `{}` is {output}", scope.name));
            }
            if template_has_empty_placeholder(template) {
                invalid(format!("template `{template}` has an empty `{{}}` placeholder"));
            }
        }
    }
}

fn require_numeric(
    inputs: &[(String, ColumnType)],
    output: ColumnType,
    name: &str,
    op: &str,
    invalid: &mut impl FnMut(String),
) {
    if !output.is_numeric() {
        invalid(format!("{op} needs a numeric column, `{name}` is {output}"));
    }
    for (input, input_type) in inputs {
        if !input_type.is_numeric() {
            invalid(format!("{op} reads {input_type} column `{input}`"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(document: Value) -> Result<SchemaDefinition, SchemaError> {
        load_schema(document.to_string().as_bytes())
    }

    #[test]
    fn fills_default_generators() {
        let schema = load(json!({
            "name": "defaults",
            "tables": [{
                "name": "accounts",
                "primary_key": "id",
                "columns": [
                    {"name": "id", "type": "integer"},
                    {"name": "handle", "type": "string"},
                    {"name": "tier", "type": "enum", "values": ["free", "pro"]},
                    {"name": "active", "type": "boolean"},
                    {"name": "opened_on", "type": "date"}
                ]
            }]
        }))
        .expect("valid schema");

        let table = &schema.tables[0];
        let kinds: Vec<_> = table
            .columns
            .iter()
            .map(|column| column.generator.kind_name())
            .collect();
        assert_eq!(
            kinds,
            vec!["unique_sequence", "pattern", "enumeration", "boolean", "scalar_range"]
        );
        assert!(table.columns[0].constraints.unique);
    }

    #[test]
    fn reference_storage_type_follows_the_chain() {
        let schema = load(json!({
            "name": "chain",
            "tables": [
                {"name": "users", "primary_key": "email", "columns": [
                    {"name": "email", "type": "string", "generator": {"kind": "pattern", "template": "user{row}@example.test"}}
                ]},
                {"name": "profiles", "primary_key": "user_email", "columns": [
                    {"name": "user_email", "type": "reference"}
                ], "relationships": [
                    {"column": "user_email", "references": {"table": "users", "column": "email"}, "cardinality": "one_to_one"}
                ]},
                {"name": "avatars", "columns": [
                    {"name": "profile", "type": "reference"}
                ], "relationships": [
                    {"column": "profile", "references": {"table": "profiles", "column": "user_email"}}
                ]}
            ]
        }))
        .expect("valid schema");
        let avatar = &schema.tables[2].columns[0];
        assert_eq!(avatar.storage_type, ColumnType::String);
    }

    #[test]
    fn rejects_non_json_input() {
        let err = load_schema(b"{not json").expect_err("malformed");
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].kind, SchemaErrorKind::MalformedInput);
    }

    #[test]
    fn null_probability_requires_nullable() {
        let err = load(json!({
            "name": "nulls",
            "tables": [{"name": "t", "columns": [
                {"name": "a", "type": "integer", "null_probability": 0.2},
                {"name": "b", "type": "integer", "nullable": true, "null_probability": 1.5}
            ]}]
        }))
        .expect_err("invalid");
        assert_eq!(err.count_kind(SchemaErrorKind::InvalidConstraint), 2);
        assert_eq!(err.issues[0].path, "/tables/0/columns/0/null_probability");
    }

    #[test]
    fn derived_must_read_earlier_columns() {
        let err = load(json!({
            "name": "derived",
            "tables": [{"name": "orders", "columns": [
                {"name": "tax", "type": "decimal", "generator": {"kind": "derived", "op": "scale", "column": "subtotal", "factor": 0.1}},
                {"name": "subtotal", "type": "decimal"}
            ]}]
        }))
        .expect_err("invalid");
        assert!(err.has_kind(SchemaErrorKind::InvalidGeneratorSpec));
        assert!(err.issues[0].message.contains("subtotal"));
    }

    #[test]
    fn derived_specs_that_cannot_run_are_rejected() {
        let err = load(json!({
            "name": "derived",
            "tables": [{"name": "invoices", "columns": [
                {"name": "amount", "type": "decimal"},
                {"name": "label", "type": "string", "generator": {"kind": "derived", "op": "template", "template": "x{}y"}},
                {"name": "huge", "type": "decimal", "generator": {"kind": "derived", "op": "scale", "column": "amount", "factor": 1e30}}
            ]}]
        }))
        .expect_err("invalid");
        assert_eq!(err.count_kind(SchemaErrorKind::InvalidGeneratorSpec), 2);
        assert_eq!(err.issues[0].path, "/tables/0/columns/1/generator");
        assert!(err.issues[0].message.contains("empty"));
        assert_eq!(err.issues[1].path, "/tables/0/columns/2/generator");
        assert!(err.issues[1].message.contains("not representable"));
    }

    #[test]
    fn representable_scale_factor_and_named_placeholders_load() {
        load(json!({
            "name": "derived",
            "tables": [{"name": "invoices", "columns": [
                {"name": "amount", "type": "decimal"},
                {"name": "tax", "type": "decimal", "generator": {"kind": "derived", "op": "scale", "column": "amount", "factor": 0.08}},
                {"name": "label", "type": "string", "generator": {"kind": "derived", "op": "template", "template": "inv-{amount}"}}
            ]}]
        }))
        .expect("valid schema");
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use seedwright_core::TableDefinition;

use crate::value::GeneratedValue;

/// One generated row. `id` is the 1-based row ordinal within its table.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedRecord {
    pub id: u64,
    pub values: Vec<GeneratedValue>,
}

/// Ordered records of one table, either the whole table or one contiguous
/// batch of it, indexed by primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    table: String,
    columns: Vec<String>,
    primary_key: Option<usize>,
    records: Vec<GeneratedRecord>,
    key_index: HashMap<GeneratedValue, usize>,
}

impl RecordSet {
    pub fn new(table: impl Into<String>, columns: Vec<String>, primary_key: Option<usize>) -> Self {
        Self {
            table: table.into(),
            columns,
            primary_key,
            records: Vec::new(),
            key_index: HashMap::new(),
        }
    }

    pub fn for_table(table: &TableDefinition) -> Self {
        let primary_key = table
            .primary_key
            .as_deref()
            .and_then(|name| table.column_index(name));
        Self::new(table.name.clone(), table.column_names(), primary_key)
    }

    /// Empty set with the same table and columns.
    pub fn empty_like(&self) -> Self {
        Self::new(self.table.clone(), self.columns.clone(), self.primary_key)
    }

    pub fn push(&mut self, record: GeneratedRecord) {
        if let Some(key) = self.primary_key.and_then(|index| record.values.get(index)) {
            if !key.is_null() {
                self.key_index.insert(key.clone(), self.records.len());
            }
        }
        self.records.push(record);
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[GeneratedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn value<'a>(&self, record: &'a GeneratedRecord, column: &str) -> Option<&'a GeneratedValue> {
        record.values.get(self.column_index(column)?)
    }

    pub fn column_values(&self, column: &str) -> impl Iterator<Item = &GeneratedValue> {
        let index = self.column_index(column);
        self.records
            .iter()
            .filter_map(move |record| index.and_then(|index| record.values.get(index)))
    }

    pub fn find_by_key(&self, key: &GeneratedValue) -> Option<&GeneratedRecord> {
        self.key_index
            .get(key)
            .and_then(|position| self.records.get(*position))
    }

    pub fn first_id(&self) -> Option<u64> {
        self.records.first().map(|record| record.id)
    }
}

/// Key columns retained from a completed table for its children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentKeys {
    table: String,
    columns: Vec<String>,
    values: Vec<Vec<GeneratedValue>>,
    rows: u64,
}

impl ParentKeys {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        let values = vec![Vec::new(); columns.len()];
        Self {
            table: table.into(),
            columns,
            values,
            rows: 0,
        }
    }

    /// Append one row; `row` holds the retained columns in order.
    pub fn push_row(&mut self, row: impl IntoIterator<Item = GeneratedValue>) {
        for (column, value) in self.values.iter_mut().zip(row) {
            column.push(value);
        }
        self.rows += 1;
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn value(&self, column: usize, row: u64) -> Option<&GeneratedValue> {
        self.values
            .get(column)
            .and_then(|values| values.get(usize::try_from(row).ok()?))
    }

    pub fn column_values(&self, column: &str) -> &[GeneratedValue] {
        self.column_index(column)
            .and_then(|index| self.values.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Completed parents by table name.
pub type ParentSets = BTreeMap<String, Arc<ParentKeys>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_index_finds_records() {
        let mut set = RecordSet::new("customers", vec!["id".into(), "email".into()], Some(0));
        for id in 1..=3 {
            set.push(GeneratedRecord {
                id,
                values: vec![
                    GeneratedValue::Int(id as i64 * 10),
                    GeneratedValue::Text(format!("c{id}@shop.test")),
                ],
            });
        }
        let record = set.find_by_key(&GeneratedValue::Int(20)).expect("record");
        assert_eq!(record.id, 2);
        assert_eq!(
            set.value(record, "email"),
            Some(&GeneratedValue::Text("c2@shop.test".into()))
        );
        assert!(set.find_by_key(&GeneratedValue::Int(25)).is_none());
    }

    #[test]
    fn parent_keys_store_columns() {
        let mut keys = ParentKeys::new("customers", vec!["id".into()]);
        keys.push_row([GeneratedValue::Int(1)]);
        keys.push_row([GeneratedValue::Int(2)]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.value(0, 1), Some(&GeneratedValue::Int(2)));
        assert_eq!(keys.column_values("missing"), &[] as &[GeneratedValue]);
    }
}

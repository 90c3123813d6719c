use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CyclicDependencyError;
use crate::schema::SchemaDefinition;

/// Generation order over the tables of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOrder {
    /// Every table appears after all tables it references.
    pub order: Vec<String>,
    /// Tables each table holds foreign keys to.
    pub parents: BTreeMap<String, BTreeSet<String>>,
}

impl ResolvedOrder {
    pub fn parents_of(&self, table: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(table)
            .into_iter()
            .flat_map(|parents| parents.iter().map(String::as_str))
    }

    pub fn position(&self, table: &str) -> Option<usize> {
        self.order.iter().position(|name| name == table)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tables grouped by dependency depth. No table in a group references
    /// another table of the same group, so a group can run concurrently.
    pub fn independent_groups(&self) -> Vec<Vec<String>> {
        let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
        let mut groups: Vec<Vec<String>> = Vec::new();
        for table in &self.order {
            let level = self
                .parents_of(table)
                .filter_map(|parent| depth.get(parent))
                .map(|parent_depth| parent_depth + 1)
                .max()
                .unwrap_or(0);
            depth.insert(table.as_str(), level);
            if groups.len() <= level {
                groups.resize_with(level + 1, Vec::new);
            }
            groups[level].push(table.clone());
        }
        groups
    }
}

/// Summary of the relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for relationship ordering, either an order or the cycle members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub summary: DependencySummary,
    pub order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
}

/// Build a deterministic dependency report for a schema.
pub fn build_dependency_report(schema: &SchemaDefinition) -> DependencyReport {
    let parents = parent_map(schema);
    let summary = DependencySummary {
        nodes: parents.len(),
        edges: parents.values().map(BTreeSet::len).sum(),
    };

    match resolve_order(schema) {
        Ok(resolved) => DependencyReport {
            summary,
            order: Some(resolved.order),
            cycle: None,
        },
        Err(err) => DependencyReport {
            summary,
            order: None,
            cycle: Some(err.tables),
        },
    }
}

/// Topologically sort tables so parents precede children.
///
/// Ready tables are taken in declaration order, so the result is stable for
/// a given document.
pub fn resolve_order(schema: &SchemaDefinition) -> Result<ResolvedOrder, CyclicDependencyError> {
    let parents = parent_map(schema);
    let names: Vec<&str> = schema.table_names().collect();
    let index: BTreeMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(position, name)| (*name, position))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    let mut indegree: Vec<usize> = vec![0; names.len()];
    for (child, name) in names.iter().enumerate() {
        for parent in parents.get(*name).into_iter().flatten() {
            if let Some(&parent_index) = index.get(parent.as_str()) {
                children[parent_index].push(child);
                indegree[child] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter_map(|(position, count)| (*count == 0).then_some(position))
        .collect();

    let mut order = Vec::with_capacity(names.len());
    while let Some(next) = ready.pop_first() {
        order.push(names[next].to_string());
        for &child in &children[next] {
            indegree[child] = indegree[child].saturating_sub(1);
            if indegree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() == names.len() {
        return Ok(ResolvedOrder { order, parents });
    }

    let remaining: BTreeSet<&str> = indegree
        .iter()
        .enumerate()
        .filter_map(|(position, count)| (*count > 0).then_some(names[position]))
        .collect();
    let tables = remaining
        .iter()
        .filter(|table| on_cycle(table, &parents, &remaining))
        .map(|table| table.to_string())
        .collect();
    Err(CyclicDependencyError { tables })
}

fn parent_map(schema: &SchemaDefinition) -> BTreeMap<String, BTreeSet<String>> {
    schema
        .tables
        .iter()
        .map(|table| {
            let parents = table
                .parent_tables()
                .into_iter()
                .map(str::to_string)
                .collect();
            (table.name.clone(), parents)
        })
        .collect()
}

/// Whether `start` can reach itself through parent edges among `remaining`.
fn on_cycle(
    start: &str,
    parents: &BTreeMap<String, BTreeSet<String>>,
    remaining: &BTreeSet<&str>,
) -> bool {
    let mut stack: Vec<&str> = parents
        .get(start)
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if !remaining.contains(node) || !seen.insert(node) {
            continue;
        }
        stack.extend(
            parents
                .get(node)
                .into_iter()
                .flatten()
                .map(String::as_str),
        );
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_schema;
    use serde_json::json;

    fn schema_with(edges: &[(&str, &[&str])]) -> SchemaDefinition {
        let tables: Vec<_> = edges
            .iter()
            .map(|(name, parents)| {
                let mut columns = vec![json!({"name": "id", "type": "integer"})];
                let mut relationships = Vec::new();
                for parent in *parents {
                    let column = format!("{parent}_id");
                    columns.push(json!({"name": column, "type": "reference"}));
                    relationships.push(json!({
                        "column": column,
                        "references": {"table": parent, "column": "id"}
                    }));
                }
                json!({
                    "name": name,
                    "primary_key": "id",
                    "columns": columns,
                    "relationships": relationships
                })
            })
            .collect();
        let document = json!({"name": "graph", "tables": tables});
        load_schema(document.to_string().as_bytes()).expect("load schema")
    }

    #[test]
    fn orders_parents_first_with_declaration_tiebreak() {
        let schema = schema_with(&[
            ("order_items", &["orders", "products"]),
            ("products", &[]),
            ("orders", &["customers"]),
            ("customers", &[]),
        ]);
        let resolved = resolve_order(&schema).expect("acyclic");
        assert_eq!(
            resolved.order,
            vec!["products", "customers", "orders", "order_items"]
        );
        assert_eq!(
            resolved.independent_groups(),
            vec![
                vec!["products".to_string(), "customers".to_string()],
                vec!["orders".to_string()],
                vec!["order_items".to_string()],
            ]
        );
    }

    #[test]
    fn cycle_names_only_participants() {
        let schema = schema_with(&[
            ("a", &["c"]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("downstream", &["a"]),
            ("root", &[]),
        ]);
        let err = resolve_order(&schema).expect_err("cycle");
        assert_eq!(err.tables, vec!["a", "b", "c"]);

        let report = build_dependency_report(&schema);
        assert_eq!(report.summary.nodes, 5);
        assert_eq!(report.summary.edges, 4);
        assert!(report.order.is_none());
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let schema = schema_with(&[("employees", &["employees"])]);
        let err = resolve_order(&schema).expect_err("self cycle");
        assert_eq!(err.tables, vec!["employees"]);
    }
}

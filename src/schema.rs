//! Schema Descriptor
//!
//! The fixed set of tables (and their alias letters) that generated queries may touch.
//! Built once at startup, shared read-only between the prompt builder and the validator.

use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl TableSchema {
    fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            relationships: Vec::new(),
        }
    }

    fn references(mut self, column: &str, table: &str, target: &str) -> Self {
        self.relationships.push(Relationship {
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: target.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        let tables = vec![
            TableSchema::new("departments", &["id", "name", "created_at"]),
            TableSchema::new(
                "employees",
                &["id", "name", "department_id", "email", "salary", "created_at", "name_embedding"],
            )
            .references("department_id", "departments", "id"),
            TableSchema::new("products", &["id", "name", "price", "created_at", "name_embedding"]),
            TableSchema::new(
                "orders",
                &[
                    "id",
                    "customer_name",
                    "employee_id",
                    "order_total",
                    "order_date",
                    "created_at",
                    "customer_name_embedding",
                ],
            )
            .references("employee_id", "employees", "id"),
        ];

        let aliases = ["e", "d", "o", "p"].iter().map(|a| a.to_string()).collect();

        Self { tables, aliases }
    }
}

impl SchemaDescriptor {
    /// Load a descriptor from a JSON file. Names are lowercased.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading schema descriptor from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let descriptor: SchemaDescriptor = serde_json::from_str(&content)?;
        descriptor.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        if self.tables.is_empty() {
            return Err(SearchError::Schema("schema descriptor lists no tables".to_string()));
        }
        for table in &mut self.tables {
            table.name = table.name.trim().to_lowercase();
            if table.name.is_empty() {
                return Err(SearchError::Schema("table with empty name".to_string()));
            }
        }
        self.aliases = self
            .aliases
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        Ok(self)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// True when `identifier` is a known table or a registered alias (case-insensitive).
    pub fn is_known(&self, identifier: &str) -> bool {
        let identifier = identifier.to_lowercase();
        self.table(&identifier).is_some() || self.aliases.contains(&identifier)
    }

    /// Schema text handed to the language model for grounding.
    pub fn prompt_context(&self) -> String {
        let mut out = String::from("\nDatabase Schema:\n");
        for (idx, table) in self.tables.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} table: {}\n",
                idx + 1,
                table.name,
                table.columns.join(", ")
            ));
        }

        let relationships: Vec<String> = self
            .tables
            .iter()
            .flat_map(|t| {
                t.relationships.iter().map(move |r| {
                    format!(
                        "- {}.{} → {}.{}",
                        t.name, r.column, r.references_table, r.references_column
                    )
                })
            })
            .collect();

        if !relationships.is_empty() {
            out.push_str("\nRelationships:\n");
            out.push_str(&relationships.join("\n"));
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_schema_knows_tables_and_aliases() {
        let schema = SchemaDescriptor::default();
        for name in ["employees", "departments", "orders", "products", "e", "d", "o", "p"] {
            assert!(schema.is_known(name), "{} should be known", name);
        }
        assert!(schema.is_known("EMPLOYEES"));
        assert!(!schema.is_known("secrets"));
        assert!(!schema.is_known("pg_shadow"));
    }

    #[test]
    fn test_prompt_context_lists_relationships() {
        let context = SchemaDescriptor::default().prompt_context();
        assert!(context.contains("2. employees table: id, name, department_id"));
        assert!(context.contains("- employees.department_id → departments.id"));
        assert!(context.contains("- orders.employee_id → employees.id"));
    }

    #[test]
    fn test_load_lowercases_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tables":[{{"name":"Invoices","columns":["id","amount"]}}],"aliases":["I"]}}"#
        )
        .unwrap();

        let schema = SchemaDescriptor::load(file.path()).unwrap();
        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["invoices"]);
        assert!(schema.is_known("i"));
        assert!(!schema.is_known("employees"));
    }

    #[test]
    fn test_load_rejects_empty_table_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tables":[]}}"#).unwrap();
        assert!(matches!(SchemaDescriptor::load(file.path()), Err(SearchError::Schema(_))));
    }
}

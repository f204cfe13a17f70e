//! One-shot schema discovery.

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::client::ProtocolClient;
use crate::error::FuzzError;

/// Tool that answers schema introspection calls
pub const SCHEMA_TOOL: &str = "mysql";

/// `table_name` argument selecting every table
pub const ALL_TABLES: &str = "all-tables";

/// Side-channel member of the introspection result holding the catalog
pub const SCHEMAS_FIELD: &str = "schemas";

const SCHEMA_REQUEST_ID: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns
                .into_iter()
                .map(|name| ColumnSchema { name: name.into() })
                .collect(),
        }
    }
}

/// Table catalog discovered once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCache {
    tables: Vec<TableSchema>,
}

impl SchemaCache {
    /// Ask the server for every table's schema.
    ///
    /// A successful answer without a usable `schemas` member yields an empty
    /// cache. Protocol failures and server-reported errors are returned.
    pub async fn fetch<W, R>(client: &mut ProtocolClient<W, R>) -> Result<Self, FuzzError>
    where
        W: AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        let payload = client
            .call_tool(
                SCHEMA_TOOL,
                json!({ "table_name": ALL_TABLES }),
                SCHEMA_REQUEST_ID,
            )
            .await?
            .into_payload()?;

        let tables = payload
            .extra(SCHEMAS_FIELD)
            .map(parse_catalog)
            .unwrap_or_default();
        tracing::info!(tables = tables.len(), "schema fetched");

        Ok(Self { tables })
    }

    pub fn from_tables(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Map the `schemas` array onto [`TableSchema`]s.
///
/// Entries without a string `table_name` are dropped, as are columns without
/// a string `name`; the remaining columns of that table are kept.
pub fn parse_catalog(schemas: &Value) -> Vec<TableSchema> {
    let Some(entries) = schemas.as_array() else {
        tracing::warn!("schemas member is not an array, ignoring it");
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let Some(name) = entry.get("table_name").and_then(Value::as_str) else {
                tracing::warn!(index, "schema entry without a table_name, skipping");
                return None;
            };

            let columns = entry
                .get("columns")
                .and_then(Value::as_array)
                .map(|columns| parse_columns(name, columns))
                .unwrap_or_default();

            Some(TableSchema {
                name: name.to_string(),
                columns,
            })
        })
        .collect()
}

fn parse_columns(table: &str, columns: &[Value]) -> Vec<ColumnSchema> {
    columns
        .iter()
        .filter_map(|column| match column.get("name").and_then(Value::as_str) {
            Some(name) => Some(ColumnSchema {
                name: name.to_string(),
            }),
            None => {
                tracing::warn!(table, "column without a name, skipping");
                None
            }
        })
        .collect()
}

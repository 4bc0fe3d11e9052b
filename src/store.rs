//! Relational data-store collaborator.
//!
//! [`DataStore`] is the narrow interface the resolvers consume: a schema
//! description for prompt construction and an `execute` that returns rows
//! as ordered column → value maps. [`SqliteStore`] is the production
//! implementation over an sqlx pool.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::models::Row;

/// Error crossing the data-store collaborator boundary.
///
/// Covers malformed queries and connectivity loss alike; resolvers convert
/// it into failure results, never propagate it.
#[derive(Debug, Error)]
#[error("data access error: {0}")]
pub struct DataAccessError(pub String);

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Schema text handed to the language model when generating SQL.
    fn schema_description(&self) -> String;

    /// Execute a query and return its rows in result order.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, DataAccessError>;
}

/// Curated schema context for the QA-tracking catalog.
///
/// Kept static so SQL-generation prompts are deterministic; the live
/// introspection variant backs the `qah schema` command.
const CATALOG_SCHEMA: &str = "\
QA CATALOG DATABASE SCHEMA (SQLite):

TABLES AND COLUMNS:

aplicacion (
    id INTEGER PRIMARY KEY,
    nombre TEXT,
    descripcion TEXT,
    equipo_responsable TEXT,
    estado TEXT,
    fecha_creacion TEXT
)

elemento_promocionable (
    id INTEGER PRIMARY KEY,
    nombre TEXT,
    descripcion TEXT,
    tipo TEXT,
    url_demo TEXT,
    aplicacion_id INTEGER REFERENCES aplicacion(id)
)

itinerario_qa (
    id INTEGER PRIMARY KEY,
    nombre TEXT,
    fecha_inicio TEXT,
    fecha_fin TEXT,
    estado TEXT,
    elemento_promocionable_id INTEGER REFERENCES elemento_promocionable(id)
)

actividad_qa (
    id INTEGER PRIMARY KEY,
    nombre TEXT,
    descripcion TEXT,
    tipo TEXT,
    porcentaje_completado INTEGER,
    fecha_estimada TEXT,
    estado TEXT,
    itinerario_id INTEGER REFERENCES itinerario_qa(id)
)

RELATIONSHIPS:
- aplicacion 1:N elemento_promocionable
- elemento_promocionable 1:N itinerario_qa (only one ACTIVO at a time)
- itinerario_qa 1:N actividad_qa

VALID STATES:
- actividad_qa.estado: ['PENDIENTE', 'EN_PROGRESO', 'COMPLETADA', 'BLOQUEADA', 'CANCELADA']
- itinerario_qa.estado: ['PLANIFICADO', 'ACTIVO', 'COMPLETADO', 'CANCELADO']
- aplicacion.estado: ['ACTIVA', 'EN_DESARROLLO', 'INACTIVA']
";

/// SQLite-backed [`DataStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file with WAL journaling.
    pub async fn connect(db_path: &Path) -> anyhow::Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory database; a single connection so all queries share state.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Introspect the live database: tables, columns, and row counts.
    pub async fn describe_live_schema(&self) -> Result<String, DataAccessError> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DataAccessError(e.to_string()))?;

        let mut out = String::new();
        out.push_str(&format!("TABLES ({}):\n", tables.len()));

        for table in &tables {
            out.push_str(&format!("\n=== TABLE: {} ===\n", table));

            let columns = self
                .execute(&format!("PRAGMA table_info({})", table))
                .await?;
            for col in &columns {
                let name = col.get("name").and_then(|v| v.as_str()).unwrap_or("?");
                let ty = col.get("type").and_then(|v| v.as_str()).unwrap_or("?");
                let notnull = col.get("notnull").and_then(|v| v.as_i64()).unwrap_or(0);
                out.push_str(&format!(
                    "  - {} [{}] - {}\n",
                    name,
                    ty,
                    if notnull == 1 { "NOT NULL" } else { "NULLABLE" }
                ));
            }

            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DataAccessError(e.to_string()))?;
            out.push_str(&format!("  ROWS: {}\n", count));
        }

        Ok(out)
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    fn schema_description(&self) -> String {
        CATALOG_SCHEMA.to_string()
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>, DataAccessError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataAccessError(e.to_string()))?;

        rows.iter().map(row_to_map).collect()
    }
}

/// Decode an SQLite row into an ordered column → tagged value map.
fn row_to_map(row: &SqliteRow) -> Result<Row, DataAccessError> {
    let mut map = Row::new();

    for (i, col) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| DataAccessError(e.to_string()))?;

        let value = if raw.is_null() {
            serde_json::Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => row
                    .try_get::<i64, _>(i)
                    .map(serde_json::Value::from)
                    .map_err(|e| DataAccessError(e.to_string()))?,
                "REAL" => {
                    let f = row
                        .try_get::<f64, _>(i)
                        .map_err(|e| DataAccessError(e.to_string()))?;
                    serde_json::Number::from_f64(f)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
                "BLOB" => {
                    let bytes = row
                        .try_get::<Vec<u8>, _>(i)
                        .map_err(|e| DataAccessError(e.to_string()))?;
                    serde_json::Value::String(BASE64.encode(bytes))
                }
                _ => decode_text_fallback(row, i)?,
            }
        };

        map.insert(col.name().to_string(), value);
    }

    Ok(map)
}

/// TEXT and anything with an unknown declared type. Expression columns can
/// surface numeric values under a TEXT-ish type, so fall through the scalar
/// decoders before giving up.
fn decode_text_fallback(row: &SqliteRow, i: usize) -> Result<serde_json::Value, DataAccessError> {
    if let Ok(s) = row.try_get::<String, _>(i) {
        return Ok(serde_json::Value::String(s));
    }
    if let Ok(n) = row.try_get::<i64, _>(i) {
        return Ok(serde_json::Value::from(n));
    }
    if let Ok(f) = row.try_get::<f64, _>(i) {
        return Ok(serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null));
    }
    Err(DataAccessError(format!("undecodable column at index {}", i)))
}

//! Structured resolution path: natural language → SQL → catalog rows.
//!
//! The resolver asks the language model for a query over the catalog
//! schema, then refuses to execute anything that fails sanitization. The
//! model's output is treated as hostile until proven otherwise: code
//! fences and comments are stripped, and the remaining text must *begin*
//! with an allow-listed statement keyword — `DROP TABLE x` is rejected
//! outright, not executed and rolled back.
//!
//! Every failure mode (model unavailable, untranslatable question, query
//! error) comes back as a `success = false` result with a readable
//! explanation; nothing here returns `Err` to the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::LanguageModel;
use crate::models::{Row, StructuredQueryResult};
use crate::store::DataStore;

/// Statement keywords the sanitizer will let through.
const ALLOWED_STATEMENTS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "WITH"];

/// Marker the model is instructed to emit when no translation exists.
const NO_SQL: &str = "NO_SQL";

/// Maximum rendered cell width in the formatted table.
const MAX_CELL_WIDTH: usize = 50;

pub struct StructuredResolver {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn DataStore>,
}

impl StructuredResolver {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn DataStore>) -> Self {
        Self { llm, store }
    }

    pub async fn resolve(&self, question: &str) -> StructuredQueryResult {
        let schema = self.store.schema_description();
        let prompt = build_sql_prompt(&schema, question);

        let raw = match self.llm.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, question, "SQL generation failed");
                return failure(
                    question,
                    None,
                    "I could not generate a query for your question.",
                    format!("Language model unavailable: {}", e),
                );
            }
        };

        let sql = match sanitize_sql(&raw) {
            Some(sql) => sql,
            None => {
                debug!(raw = raw.trim(), question, "generated text rejected by sanitizer");
                return failure(
                    question,
                    None,
                    "I could not translate your question into a query.",
                    "The generated text was not a valid catalog query. Try rephrasing the question.",
                );
            }
        };

        debug!(%sql, question, "executing generated query");

        match self.store.execute(&sql).await {
            Ok(rows) => {
                let formatted = format_rows(&rows);
                let explanation = build_explanation(question, &sql, rows.len());
                StructuredQueryResult {
                    original_question: question.to_string(),
                    generated_sql: Some(sql),
                    raw_rows: Some(rows),
                    formatted,
                    explanation,
                    success: true,
                }
            }
            Err(e) => {
                warn!(error = %e, %sql, "query execution failed");
                failure(
                    question,
                    Some(sql),
                    "The query could not be executed.",
                    format!("Query execution failed: {}. Try rephrasing the question.", e),
                )
            }
        }
    }
}

fn failure(
    question: &str,
    generated_sql: Option<String>,
    message: &str,
    explanation: impl Into<String>,
) -> StructuredQueryResult {
    StructuredQueryResult {
        original_question: question.to_string(),
        generated_sql,
        raw_rows: None,
        formatted: message.to_string(),
        explanation: explanation.into(),
        success: false,
    }
}

fn build_sql_prompt(schema: &str, question: &str) -> String {
    format!(
        "You are a SQL assistant for an SQLite database.\n\
         \n\
         SCHEMA:\n\
         {}\n\
         \n\
         INSTRUCTIONS:\n\
         - Answer ONLY with the SQL query\n\
         - Do not include explanations, comments or extra text\n\
         - If no SQL can answer the question, answer exactly: {}\n\
         - Use only the tables and columns from the schema above\n\
         \n\
         For the question: \"{}\"\n\
         \n\
         SQL:\n",
        schema, NO_SQL, question
    )
}

/// Clean model output down to a bare statement, or reject it.
///
/// Strips markdown code fences, `--` and `//` line comments, `/* */` block
/// comments, blank lines, and a trailing semicolon. The survivor must begin
/// with an allow-listed statement keyword (the check uppercases a copy; the
/// query itself is returned untouched).
pub fn sanitize_sql(raw: &str) -> Option<String> {
    let mut text = raw.trim().to_string();

    if text.is_empty() || text.contains(NO_SQL) {
        return None;
    }

    // Extract from code fences if present
    if let Some(inner) = extract_fenced(&text, "```sql") {
        text = inner;
    } else if let Some(inner) = extract_fenced(&text, "```") {
        text = inner;
    }

    text = strip_block_comments(&text);

    // Line comments, then collapse blank lines
    let cleaned: String = text
        .lines()
        .map(|line| {
            let line = match line.find("--") {
                Some(pos) => &line[..pos],
                None => line,
            };
            match line.find("//") {
                Some(pos) => &line[..pos],
                None => line,
            }
        })
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let cleaned = cleaned.trim().trim_end_matches(';').trim().to_string();
    if cleaned.is_empty() {
        return None;
    }

    let upper = cleaned.to_uppercase();
    if ALLOWED_STATEMENTS.iter().any(|kw| upper.starts_with(kw)) {
        Some(cleaned)
    } else {
        None
    }
}

fn extract_fenced(text: &str, fence: &str) -> Option<String> {
    let start = text.find(fence)? + fence.len();
    let rest = &text[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    let inner = rest[..end].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start..].find("*/") {
            Some(end) => rest = &rest[start + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Render rows as a numbered markdown table.
///
/// Deterministic: columns come from the first row in stored order, cell
/// values over 50 chars are truncated with an ellipsis, NULLs print as
/// `NULL`.
pub fn format_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "No rows matched the query.".to_string();
    }

    let columns: Vec<&String> = rows[0].keys().collect();

    let mut out = format!("Found {} result(s):\n\n", rows.len());

    out.push_str("| # ");
    for col in &columns {
        out.push_str(&format!("| {} ", col));
    }
    out.push_str("|\n");
    out.push_str(&format!("|{}\n", "---|".repeat(columns.len() + 1)));

    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!("| {} ", i + 1));
        for col in &columns {
            let display = row
                .get(*col)
                .map(format_value)
                .unwrap_or_else(|| "NULL".to_string());
            out.push_str(&format!("| {} ", display));
        }
        out.push_str("|\n");
    }

    out
}

fn format_value(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => return "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.chars().count() > MAX_CELL_WIDTH {
        let truncated: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

fn build_explanation(question: &str, sql: &str, row_count: usize) -> String {
    format!(
        "For your question '{}', the generated query was: {}. {} row(s) returned.",
        question, sql, row_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_select() {
        assert_eq!(
            sanitize_sql("SELECT * FROM aplicacion"),
            Some("SELECT * FROM aplicacion".to_string())
        );
    }

    #[test]
    fn test_sanitize_strips_fences() {
        let raw = "```sql\nSELECT COUNT(*) AS total FROM aplicacion;\n```";
        assert_eq!(
            sanitize_sql(raw),
            Some("SELECT COUNT(*) AS total FROM aplicacion".to_string())
        );
    }

    #[test]
    fn test_sanitize_strips_bare_fences() {
        let raw = "```\nSELECT nombre FROM aplicacion\n```";
        assert_eq!(
            sanitize_sql(raw),
            Some("SELECT nombre FROM aplicacion".to_string())
        );
    }

    #[test]
    fn test_sanitize_strips_comments_and_blank_lines() {
        let raw = "-- count them\nSELECT COUNT(*) FROM aplicacion // trailing\n\n/* block\ncomment */";
        assert_eq!(
            sanitize_sql(raw),
            Some("SELECT COUNT(*) FROM aplicacion".to_string())
        );
    }

    #[test]
    fn test_sanitize_rejects_drop() {
        assert_eq!(sanitize_sql("DROP TABLE aplicacion"), None);
        assert_eq!(sanitize_sql("```sql\nDROP TABLE x;\n```"), None);
    }

    #[test]
    fn test_sanitize_rejects_pragma_and_prose() {
        assert_eq!(sanitize_sql("PRAGMA table_info(aplicacion)"), None);
        assert_eq!(sanitize_sql("I cannot answer that"), None);
    }

    #[test]
    fn test_sanitize_rejects_no_sql_marker() {
        assert_eq!(sanitize_sql("NO_SQL"), None);
        assert_eq!(sanitize_sql("  NO_SQL  "), None);
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert_eq!(sanitize_sql(""), None);
        assert_eq!(sanitize_sql("   \n  "), None);
        assert_eq!(sanitize_sql("-- only a comment"), None);
    }

    #[test]
    fn test_sanitize_allows_with_and_case_insensitive() {
        assert!(sanitize_sql("WITH t AS (SELECT 1) SELECT * FROM t").is_some());
        assert!(sanitize_sql("select nombre from aplicacion").is_some());
    }

    #[test]
    fn test_format_rows_empty() {
        assert_eq!(format_rows(&[]), "No rows matched the query.");
    }

    #[test]
    fn test_format_rows_table() {
        let mut row = Row::new();
        row.insert("total".to_string(), serde_json::json!(4));
        let out = format_rows(&[row]);
        assert!(out.contains("Found 1 result(s)"));
        assert!(out.contains("| total |"));
        assert!(out.contains("| 1 | 4 |"));
    }

    #[test]
    fn test_format_rows_null_and_truncation() {
        let mut row = Row::new();
        row.insert("a".to_string(), serde_json::Value::Null);
        row.insert("b".to_string(), serde_json::json!("x".repeat(80)));
        let out = format_rows(&[row]);
        assert!(out.contains("NULL"));
        assert!(out.contains("..."));
        assert!(!out.contains(&"x".repeat(60)));
    }

    #[test]
    fn test_format_rows_preserves_column_order() {
        let mut row = Row::new();
        row.insert("zebra".to_string(), serde_json::json!(1));
        row.insert("apple".to_string(), serde_json::json!(2));
        let out = format_rows(&[row]);
        let zebra_pos = out.find("zebra").unwrap();
        let apple_pos = out.find("apple").unwrap();
        assert!(zebra_pos < apple_pos);
    }
}

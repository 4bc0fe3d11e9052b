//! Knowledge resolution path: semantic retrieval with optional live data.
//!
//! Always retrieves first. When the question's wording implies a need for
//! live figures (counts, rankings, current states), a small set of
//! pre-authored catalog queries is dispatched by keyword — no language
//! model involved — and the formatted rows are folded into the answer. A
//! failing canned query degrades to retrieval-only output; it never fails
//! the response.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::index::DocumentIndex;
use crate::models::{Intent, UnifiedResult};
use crate::store::DataStore;
use crate::structured::format_rows;

/// Phrases implying the caller wants live catalog figures rather than
/// documentation. Deliberately distinct from the intent classifier's
/// keyword sets: a question can be Knowledge-routed overall and still
/// benefit from a live lookup.
const DATA_NEED_TRIGGERS: &[&str] = &[
    "datos de",
    "base de datos",
    "calcula",
    "ranking",
    "cuántos",
    "cuántas",
    "cuantos",
    "cuantas",
    "qué actividades",
    "estado de",
    "how many",
];

/// Follow-up prompts returned with every knowledge answer.
const SUGGESTIONS: &[&str] = &[
    "Ver ranking completo",
    "Listar todas las aplicaciones",
    "Mostrar actividades recientes",
    "Consultar itinerarios activos",
];

pub struct KnowledgeResolver {
    index: Arc<DocumentIndex>,
    store: Arc<dyn DataStore>,
    top_k: usize,
}

impl KnowledgeResolver {
    pub fn new(index: Arc<DocumentIndex>, store: Arc<dyn DataStore>, top_k: usize) -> Self {
        Self { index, store, top_k }
    }

    pub async fn resolve(&self, question: &str) -> UnifiedResult {
        let docs = self.index.search(question, self.top_k).await;
        debug!(documents = docs.len(), question, "knowledge retrieval");

        let lower = question.to_lowercase();
        let mut canned_ok = false;
        let mut answer = String::new();

        if needs_live_data(&lower) {
            let sql = canned_query(&lower);
            debug!(%sql, "dispatching canned catalog query");
            match self.store.execute(sql).await {
                Ok(rows) => {
                    canned_ok = true;
                    answer.push_str("Live catalog data:\n\n");
                    answer.push_str(&format_rows(&rows));
                    answer.push('\n');
                }
                Err(e) => {
                    warn!(error = %e, %sql, "canned query failed; falling back to retrieval only");
                    answer.push_str(&format!(
                        "Could not reach the catalog database ({}). Answering from indexed knowledge only.\n\n",
                        e
                    ));
                }
            }
        }

        if !docs.is_empty() {
            answer.push_str(&format!(
                "Based on {} indexed document(s):\n\n",
                docs.len()
            ));
            for doc in &docs {
                let title = doc.title.as_deref().unwrap_or("(untitled)");
                answer.push_str(&format!("### {}\n{}\n\n", title, excerpt(&doc.content)));
            }
        } else if !canned_ok {
            answer.push_str("No relevant documents were found for your question.");
        }

        let success = !docs.is_empty() || canned_ok;

        UnifiedResult {
            original_question: question.to_string(),
            intent: Intent::Knowledge,
            answer: answer.trim_end().to_string(),
            suggestions: SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
            generated_sql: None,
            raw_rows: None,
            sources: Some(docs),
            success,
            error_message: if success {
                None
            } else {
                Some("no relevant documents found".to_string())
            },
        }
    }
}

fn needs_live_data(lower: &str) -> bool {
    DATA_NEED_TRIGGERS.iter().any(|t| lower.contains(t))
        || (lower.contains("aplicaciones")
            && (lower.contains("todas") || lower.contains("lista") || lower.contains("mostrar")))
}

/// Keyword dispatch to a pre-authored query. Most specific patterns first;
/// the overview query is the fallthrough.
fn canned_query(lower: &str) -> &'static str {
    if lower.contains("actividades") && lower.contains("itinerario") {
        "SELECT a.nombre, a.tipo, a.porcentaje_completado, a.estado, i.nombre AS itinerario \
         FROM actividad_qa a \
         JOIN itinerario_qa i ON a.itinerario_id = i.id \
         ORDER BY a.porcentaje_completado DESC"
    } else if lower.contains("ranking") || lower.contains("cobertura") {
        "SELECT app.nombre AS aplicacion, \
         ROUND(AVG(a.porcentaje_completado), 2) AS cobertura_promedio, \
         COUNT(a.id) AS total_actividades, \
         COUNT(CASE WHEN a.estado = 'COMPLETADA' THEN 1 END) AS actividades_completadas \
         FROM aplicacion app \
         LEFT JOIN elemento_promocionable ep ON app.id = ep.aplicacion_id \
         LEFT JOIN itinerario_qa i ON ep.id = i.elemento_promocionable_id AND i.estado = 'ACTIVO' \
         LEFT JOIN actividad_qa a ON i.id = a.itinerario_id \
         GROUP BY app.id, app.nombre \
         HAVING COUNT(a.id) > 0 \
         ORDER BY cobertura_promedio DESC"
    } else if lower.contains("cuántas aplicaciones") || lower.contains("cuantas aplicaciones") {
        "SELECT COUNT(*) AS total FROM aplicacion"
    } else if lower.contains("aplicaciones") && (lower.contains("todas") || lower.contains("lista"))
    {
        "SELECT id, nombre, descripcion, equipo_responsable, estado FROM aplicacion ORDER BY nombre"
    } else if lower.contains("itinerarios activos") {
        "SELECT id, nombre, elemento_promocionable_id, estado FROM itinerario_qa WHERE estado = 'ACTIVO'"
    } else if lower.contains("elementos promocionables") {
        "SELECT ep.id, ep.nombre, ep.tipo, app.nombre AS aplicacion \
         FROM elemento_promocionable ep \
         JOIN aplicacion app ON ep.aplicacion_id = app.id"
    } else {
        "SELECT nombre, estado, equipo_responsable FROM aplicacion ORDER BY estado, nombre"
    }
}

fn excerpt(content: &str) -> String {
    let flat = content.trim().replace('\n', " ");
    let excerpt: String = flat.chars().take(240).collect();
    if flat.chars().count() > 240 {
        format!("{}...", excerpt.trim_end())
    } else {
        excerpt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_need_triggers() {
        assert!(needs_live_data("dame los datos de la aplicación"));
        assert!(needs_live_data("calcula el ranking"));
        assert!(needs_live_data("cuántos itinerarios existen"));
        assert!(needs_live_data("mostrar aplicaciones"));
        assert!(!needs_live_data("qué es una prueba de integración"));
        assert!(!needs_live_data("proceso de promoción"));
    }

    #[test]
    fn test_canned_dispatch_most_specific_first() {
        assert!(canned_query("qué actividades tiene el itinerario login").contains("actividad_qa"));
        assert!(canned_query("ranking de cobertura").contains("cobertura_promedio"));
        assert!(canned_query("cuántas aplicaciones hay").starts_with("SELECT COUNT(*)"));
        assert!(canned_query("lista de todas las aplicaciones").contains("ORDER BY nombre"));
        assert!(canned_query("itinerarios activos").contains("estado = 'ACTIVO'"));
        assert!(canned_query("algo con datos de").contains("FROM aplicacion"));
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "palabra ".repeat(100);
        let e = excerpt(&long);
        assert!(e.chars().count() <= 243);
        assert!(e.ends_with("..."));
        assert_eq!(excerpt("corto"), "corto");
    }
}

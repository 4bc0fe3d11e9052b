//! Intent classification: which resolution path answers a question.
//!
//! Two interchangeable strategies live behind the [`Classifier`] trait,
//! selected by `classifier.strategy` in the config:
//! - **[`LexicalClassifier`]** — keyword scoring with a few positional
//!   heuristics; fully offline and deterministic.
//! - **[`LlmClassifier`]** — delegates the decision to the language model
//!   with a fixed single-token protocol.
//!
//! Classification is total: blank input, unparseable model output, and
//! collaborator failures all default to [`Intent::Knowledge`], which is the
//! richer-response path.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::LanguageModel;
use crate::models::Intent;

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, question: &str) -> Intent;
}

/// Select the classifier named by the configuration.
pub fn create_classifier(
    strategy: &str,
    llm: Arc<dyn LanguageModel>,
) -> Result<Box<dyn Classifier>> {
    match strategy {
        "lexical" => Ok(Box::new(LexicalClassifier)),
        "llm" => Ok(Box::new(LlmClassifier::new(llm))),
        other => bail!("Unknown classifier strategy: {}", other),
    }
}

// ============ Lexical strategy ============

/// Terms that indicate a data lookup (Spanish-first catalog, English
/// aliases for mixed-language teams).
const STRUCTURED_KEYWORDS: &[&str] = &[
    "listar",
    "mostrar",
    "cuántos",
    "cuántas",
    "cuantos",
    "cuantas",
    "contar",
    "total",
    "ranking",
    "top",
    "promedio",
    "suma",
    "estadísticas",
    "registros",
    "datos de",
    "consultar",
    "buscar en",
    "filtrar",
    "list",
    "count",
    "how many",
    "average",
    "records",
];

/// Terms that indicate a conceptual / documentation question.
const KNOWLEDGE_KEYWORDS: &[&str] = &[
    "proceso",
    "método",
    "metodología",
    "en qué consiste",
    "características",
    "ventajas",
    "desventajas",
    "beneficios",
    "pasos para",
    "documentación",
    "guía",
    "tutorial",
    "buenas prácticas",
    "estándares",
    "procedimiento",
    "process",
    "guide",
    "best practices",
];

/// Sentence-initial interrogatives that short-circuit to Knowledge before
/// any scoring happens.
const INTERROGATIVE_OPENERS: &[&str] = &[
    "qué", "que ", "cómo", "como ", "cuál", "cual ", "por qué", "what", "how", "why",
];

/// Explanatory verbs anywhere in the question also short-circuit.
const EXPLANATORY_VERBS: &[&str] = &[
    "explicar", "explica", "explain", "describe", "definir", "define",
];

pub struct LexicalClassifier;

impl LexicalClassifier {
    fn classify_sync(question: &str) -> Intent {
        if question.trim().is_empty() {
            return Intent::Knowledge;
        }

        let q = question.to_lowercase();
        let q = q.trim();

        if INTERROGATIVE_OPENERS.iter().any(|w| q.starts_with(w))
            || EXPLANATORY_VERBS.iter().any(|w| q.contains(w))
        {
            return Intent::Knowledge;
        }

        let mut structured_score = count_keywords(q, STRUCTURED_KEYWORDS);
        let knowledge_score = count_keywords(q, KNOWLEDGE_KEYWORDS);

        // Digit sequences and explicit table talk lean structured.
        if q.chars().any(|c| c.is_ascii_digit()) {
            structured_score += 1;
        }
        if q.contains("tabla") || q.contains("base de datos") || q.contains("table") || q.contains("database") {
            structured_score += 1;
        }

        debug!(structured_score, knowledge_score, question, "lexical intent scores");

        // Ties go to Knowledge.
        if structured_score > knowledge_score {
            Intent::Structured
        } else {
            Intent::Knowledge
        }
    }
}

fn count_keywords(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

#[async_trait]
impl Classifier for LexicalClassifier {
    async fn classify(&self, question: &str) -> Intent {
        Self::classify_sync(question)
    }
}

// ============ Delegated strategy ============

/// Classifier that asks the language model to pick the path.
///
/// The model is instructed to answer with a single token, `SQL` or `RAG`;
/// trailing punctuation is tolerated, anything else defaults to Knowledge.
pub struct LlmClassifier {
    llm: Arc<dyn LanguageModel>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    fn build_prompt(question: &str) -> String {
        format!(
            "Classify the following question into one of two categories:\n\
             - SQL: the question can be answered by querying a database of \
             applications, QA itineraries, activities, progress and states.\n\
             - RAG: the question is about documentation, processes, or general knowledge.\n\
             \n\
             Examples:\n\
             - \"Listar todas las actividades\" -> SQL\n\
             - \"¿Cuántas actividades hay en progreso?\" -> SQL\n\
             - \"¿Cómo configurar el entorno de pruebas?\" -> RAG\n\
             - \"¿Qué es una prueba de integración?\" -> RAG\n\
             \n\
             Answer with exactly one word: SQL or RAG.\n\
             \n\
             Question: \"{}\"\n",
            question
        )
    }

    fn parse_response(response: &str) -> Intent {
        let token = response
            .trim()
            .trim_end_matches(['.', '!', ',', ';'])
            .trim();
        if token.eq_ignore_ascii_case("SQL") {
            Intent::Structured
        } else if token.eq_ignore_ascii_case("RAG") {
            Intent::Knowledge
        } else {
            Intent::Knowledge
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, question: &str) -> Intent {
        if question.trim().is_empty() {
            return Intent::Knowledge;
        }

        match self.llm.complete(&Self::build_prompt(question)).await {
            Ok(response) => {
                let intent = Self::parse_response(&response);
                debug!(%intent, response = response.trim(), "delegated classification");
                intent
            }
            Err(e) => {
                // Classification failure is non-fatal; fall back to the
                // conservative default.
                warn!(error = %e, "classifier LLM call failed; defaulting to KNOWLEDGE");
                Intent::Knowledge
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_defaults_to_knowledge() {
        assert_eq!(LexicalClassifier::classify_sync(""), Intent::Knowledge);
        assert_eq!(LexicalClassifier::classify_sync("   "), Intent::Knowledge);
    }

    #[test]
    fn test_count_question_is_structured() {
        assert_eq!(
            LexicalClassifier::classify_sync("cuántas aplicaciones hay"),
            Intent::Structured
        );
        assert_eq!(
            LexicalClassifier::classify_sync("listar todas las actividades"),
            Intent::Structured
        );
    }

    #[test]
    fn test_interrogative_opener_short_circuits() {
        // "qué" opens the sentence, so structured keywords later on lose.
        assert_eq!(
            LexicalClassifier::classify_sync("qué significa el ranking de cobertura"),
            Intent::Knowledge
        );
        assert_eq!(
            LexicalClassifier::classify_sync("how do I interpret the total count"),
            Intent::Knowledge
        );
    }

    #[test]
    fn test_explanatory_verb_short_circuits() {
        assert_eq!(
            LexicalClassifier::classify_sync("explica el total de registros"),
            Intent::Knowledge
        );
    }

    #[test]
    fn test_digits_push_structured() {
        assert_eq!(
            LexicalClassifier::classify_sync("actividades con más de 80 de cobertura"),
            Intent::Structured
        );
    }

    #[test]
    fn test_table_mention_pushes_structured() {
        assert_eq!(
            LexicalClassifier::classify_sync("registros en la tabla de actividades"),
            Intent::Structured
        );
    }

    #[test]
    fn test_tie_goes_to_knowledge() {
        // No keywords from either set, no digits, no openers.
        assert_eq!(
            LexicalClassifier::classify_sync("itinerario biometrico"),
            Intent::Knowledge
        );
    }

    #[test]
    fn test_deterministic() {
        let q = "cuántas aplicaciones hay";
        let first = LexicalClassifier::classify_sync(q);
        for _ in 0..10 {
            assert_eq!(LexicalClassifier::classify_sync(q), first);
        }
    }

    #[test]
    fn test_parse_llm_response_tokens() {
        assert_eq!(LlmClassifier::parse_response("SQL"), Intent::Structured);
        assert_eq!(LlmClassifier::parse_response("sql."), Intent::Structured);
        assert_eq!(LlmClassifier::parse_response(" RAG \n"), Intent::Knowledge);
        assert_eq!(LlmClassifier::parse_response("RAG!"), Intent::Knowledge);
        assert_eq!(
            LlmClassifier::parse_response("I think SQL fits best"),
            Intent::Knowledge
        );
        assert_eq!(LlmClassifier::parse_response(""), Intent::Knowledge);
    }
}

//! Decomposition of high-complexity questions and merging of sub-results.
//!
//! Splitting prefers the language model; if that collaborator fails, a
//! lexical fallback splits on the conjunction " y " so the pipeline always
//! has at least one sub-question to work with. Merging preserves
//! sub-question order end to end: the per-part narrative, and the
//! concatenated row sequences, both follow the order the sub-questions
//! were resolved in.

use tracing::{debug, warn};

use crate::llm::LanguageModel;
use crate::models::{Intent, Row, UnifiedResult};

/// Ask the model for 2-3 simpler questions, one per line.
pub async fn split_question(llm: &dyn LanguageModel, question: &str) -> Vec<String> {
    let prompt = format!(
        "Break the following complex question into 2-3 simpler, more specific questions.\n\
         Return ONLY the questions, one per line, without numbering or explanations.\n\
         \n\
         Complex question: \"{}\"\n\
         \n\
         Simple questions:\n",
        question
    );

    match llm.complete(&prompt).await {
        Ok(response) => {
            let subs: Vec<String> = response
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with('#'))
                .map(String::from)
                .collect();

            if subs.is_empty() {
                debug!(question, "model returned no usable sub-questions; using lexical split");
                lexical_split(question)
            } else {
                debug!(parts = subs.len(), question, "split question via model");
                subs
            }
        }
        Err(e) => {
            warn!(error = %e, question, "split failed; using lexical split");
            lexical_split(question)
        }
    }
}

/// Fallback: split on the literal conjunction " y ". Always yields at
/// least one sub-question (the original, unsplit).
fn lexical_split(question: &str) -> Vec<String> {
    let parts: Vec<String> = question
        .split(" y ")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();

    if parts.is_empty() {
        vec![question.to_string()]
    } else {
        parts
    }
}

/// Merge sub-results into one response.
///
/// Row sequences from structured sub-results are concatenated in
/// sub-question order — never re-sorted. `success` holds only if every
/// part succeeded; partial results are kept either way.
pub fn merge_results(original_question: &str, sub_results: &[UnifiedResult]) -> UnifiedResult {
    let mut answer = format!("Question answered in {} part(s):\n\n", sub_results.len());
    let mut all_rows: Vec<Row> = Vec::new();
    let mut all_successful = true;

    for (i, sub) in sub_results.iter().enumerate() {
        if sub.success {
            answer.push_str(&format!("Part {}: ✓ {}\n", i + 1, sub.answer));
            if let Some(rows) = &sub.raw_rows {
                all_rows.extend(rows.iter().cloned());
            }
        } else {
            let error = sub
                .error_message
                .as_deref()
                .unwrap_or("unknown error");
            answer.push_str(&format!("Part {}: ✗ {}\n", i + 1, error));
            all_successful = false;
        }
    }

    answer.push_str(&format!("\nTotal combined rows: {}", all_rows.len()));

    UnifiedResult {
        original_question: original_question.to_string(),
        intent: Intent::Structured,
        answer,
        suggestions: Vec::new(),
        generated_sql: None,
        raw_rows: Some(all_rows),
        sources: None,
        success: all_successful,
        error_message: if all_successful {
            None
        } else {
            Some("some parts of the question failed".to_string())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result(question: &str, answer: &str, rows: Vec<Row>) -> UnifiedResult {
        UnifiedResult {
            original_question: question.to_string(),
            intent: Intent::Structured,
            answer: answer.to_string(),
            suggestions: Vec::new(),
            generated_sql: Some("SELECT 1".to_string()),
            raw_rows: Some(rows),
            sources: None,
            success: true,
            error_message: None,
        }
    }

    fn row(key: &str, value: i64) -> Row {
        let mut r = Row::new();
        r.insert(key.to_string(), serde_json::json!(value));
        r
    }

    #[test]
    fn test_lexical_split_on_conjunction() {
        assert_eq!(
            lexical_split("cuántas aplicaciones hay y cuántos itinerarios"),
            vec!["cuántas aplicaciones hay", "cuántos itinerarios"]
        );
    }

    #[test]
    fn test_lexical_split_without_conjunction_returns_original() {
        assert_eq!(
            lexical_split("ranking de cobertura"),
            vec!["ranking de cobertura"]
        );
    }

    #[test]
    fn test_lexical_split_multiple_conjunctions() {
        let parts = lexical_split("a y b y c");
        assert_eq!(parts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_preserves_row_order() {
        let subs = vec![
            ok_result("s1", "first", vec![row("n", 1), row("n", 2)]),
            ok_result("s2", "second", vec![row("n", 3)]),
        ];
        let merged = merge_results("original", &subs);

        assert!(merged.success);
        assert_eq!(merged.intent, Intent::Structured);
        let rows = merged.raw_rows.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("n").unwrap().as_i64(), Some(1));
        assert_eq!(rows[1].get("n").unwrap().as_i64(), Some(2));
        assert_eq!(rows[2].get("n").unwrap().as_i64(), Some(3));
    }

    #[test]
    fn test_merge_partial_failure_keeps_partial_answer() {
        let subs = vec![
            ok_result("s1", "the good part", vec![row("n", 1)]),
            UnifiedResult::error("s2", "collaborator exploded"),
        ];
        let merged = merge_results("original", &subs);

        assert!(!merged.success);
        assert!(merged.answer.contains("Part 1: ✓ the good part"));
        assert!(merged.answer.contains("Part 2: ✗ collaborator exploded"));
        assert_eq!(merged.raw_rows.unwrap().len(), 1);
        assert_eq!(
            merged.error_message.as_deref(),
            Some("some parts of the question failed")
        );
    }

    #[test]
    fn test_merge_reports_total_rows() {
        let subs = vec![ok_result("s1", "a", vec![row("n", 1), row("n", 2)])];
        let merged = merge_results("q", &subs);
        assert!(merged.answer.contains("Total combined rows: 2"));
    }
}

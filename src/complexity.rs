//! Question complexity analysis.
//!
//! A pure keyword scorer that decides whether a question should be
//! decomposed before resolution. Tier precedence matters: the HIGH check
//! runs first so a question dense in aggregation vocabulary is never
//! demoted by also matching lookup terms.

use crate::config::ComplexityConfig;
use crate::models::ComplexityLevel;

/// Aggregation / comparison / ranking vocabulary.
const HIGH_SIGNAL: &[&str] = &[
    "comparar",
    "compare",
    "estadística",
    "estadisticas",
    "statistics",
    "promedio",
    "average",
    "media",
    "máximo",
    "maximo",
    "mínimo",
    "minimo",
    "suma",
    "sum",
    "agrupar",
    "agrupado",
    "group by",
    "ordenar",
    "ranking",
    "clasificar",
    "todos",
    "cada",
    "ambos",
    "entre",
];

/// Lookup / filter vocabulary.
const MEDIUM_SIGNAL: &[&str] = &[
    "contar",
    "count",
    "cuántos",
    "cuántas",
    "cuantos",
    "cuantas",
    "how many",
    "listar",
    "list",
    "mostrar",
    "show",
    "buscar",
    "filtrar",
    "donde",
    "where",
    "actividades",
    "progreso",
    "estado",
];

/// Score a question into a complexity tier.
///
/// HIGH if high-signal hits reach `high_threshold`; otherwise MEDIUM on a
/// single high-signal hit or `medium_threshold` medium-signal hits;
/// otherwise LOW. Evaluated in exactly that order.
pub fn analyze_complexity(question: &str, config: &ComplexityConfig) -> ComplexityLevel {
    let q = question.to_lowercase();

    let high_hits = HIGH_SIGNAL.iter().filter(|k| q.contains(*k)).count();
    let medium_hits = MEDIUM_SIGNAL.iter().filter(|k| q.contains(*k)).count();

    if high_hits >= config.high_threshold {
        ComplexityLevel::High
    } else if high_hits >= 1 || medium_hits >= config.medium_threshold {
        ComplexityLevel::Medium
    } else {
        ComplexityLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(q: &str) -> ComplexityLevel {
        analyze_complexity(q, &ComplexityConfig::default())
    }

    #[test]
    fn test_two_high_signals_is_high() {
        assert_eq!(
            analyze("comparar el promedio de cobertura"),
            ComplexityLevel::High
        );
        assert_eq!(
            analyze("ranking agrupado por aplicación"),
            ComplexityLevel::High
        );
    }

    #[test]
    fn test_one_high_signal_is_medium() {
        assert_eq!(analyze("dame el ranking"), ComplexityLevel::Medium);
    }

    #[test]
    fn test_two_medium_signals_is_medium() {
        assert_eq!(
            analyze("listar actividades pendientes"),
            ComplexityLevel::Medium
        );
    }

    #[test]
    fn test_single_medium_signal_is_low() {
        assert_eq!(analyze("cuántas aplicaciones hay"), ComplexityLevel::Low);
    }

    #[test]
    fn test_no_signals_is_low() {
        assert_eq!(analyze("itinerario biometrico"), ComplexityLevel::Low);
    }

    #[test]
    fn test_high_check_takes_precedence() {
        // Dense in both vocabularies: the HIGH rule must win even though
        // the medium count alone would also qualify.
        assert_eq!(
            analyze("comparar y ordenar las actividades mostrando el estado"),
            ComplexityLevel::High
        );
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let strict = ComplexityConfig {
            high_threshold: 3,
            medium_threshold: 2,
        };
        assert_eq!(
            analyze_complexity("comparar el promedio de cobertura", &strict),
            ComplexityLevel::Medium
        );
    }
}

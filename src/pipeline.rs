//! The query orchestration pipeline.
//!
//! [`Pipeline`] is the single entry point consumed by the CLI and HTTP
//! layers. Control flow for [`Pipeline::answer`]:
//!
//! ```text
//! question ──▶ cache ──hit──▶ done
//!                │miss
//!                ▼
//!          complexity ──HIGH──▶ split ──▶ resolve each* ──▶ merge
//!                │LOW/MEDIUM                                  │
//!                ▼                                            ▼
//!            classify ──▶ {structured | knowledge} ──▶ store on success
//!
//!   * sub-questions run the inner cached pipeline, sequentially,
//!     without re-entering complexity analysis
//! ```
//!
//! The pipeline is total: resolvers convert every collaborator failure
//! into a `success = false` result, so `answer` always returns a valid
//! [`UnifiedResult`] and never panics or errors. No retries happen at this
//! layer — collaborators own their own timeout and retry policy.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::classify::Classifier;
use crate::complexity::analyze_complexity;
use crate::config::ComplexityConfig;
use crate::decompose::{merge_results, split_question};
use crate::knowledge::KnowledgeResolver;
use crate::learning::LearningStore;
use crate::llm::LanguageModel;
use crate::models::{ComplexityLevel, Intent, UnifiedResult};
use crate::structured::StructuredResolver;

pub struct Pipeline {
    cache: Arc<ResultCache>,
    classifier: Box<dyn Classifier>,
    structured: StructuredResolver,
    knowledge: KnowledgeResolver,
    llm: Arc<dyn LanguageModel>,
    complexity: ComplexityConfig,
    learning: Option<Arc<LearningStore>>,
}

impl Pipeline {
    pub fn new(
        cache: Arc<ResultCache>,
        classifier: Box<dyn Classifier>,
        structured: StructuredResolver,
        knowledge: KnowledgeResolver,
        llm: Arc<dyn LanguageModel>,
        complexity: ComplexityConfig,
    ) -> Self {
        Self {
            cache,
            classifier,
            structured,
            knowledge,
            llm,
            complexity,
            learning: None,
        }
    }

    /// Attach a learning store; successful structured resolutions are
    /// recorded there.
    pub fn with_learning(mut self, learning: Arc<LearningStore>) -> Self {
        self.learning = Some(learning);
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Answer a question. Always returns a valid result; on total failure
    /// the intent is [`Intent::Unknown`] with `success = false`.
    pub async fn answer(&self, question: &str) -> UnifiedResult {
        if let Some(hit) = self.cache.get(question) {
            info!(question, "answered from cache");
            return hit;
        }

        let complexity = analyze_complexity(question, &self.complexity);
        debug!(?complexity, question, "analyzed complexity");

        let result = match complexity {
            ComplexityLevel::High => self.answer_complex(question).await,
            ComplexityLevel::Low | ComplexityLevel::Medium => {
                let result = self.resolve_direct(question).await;
                self.store_if_successful(question, &result);
                result
            }
        };

        info!(
            question,
            intent = %result.intent,
            success = result.success,
            "question resolved"
        );
        result
    }

    /// Decompose a high-complexity question, resolve each part through the
    /// inner cached pipeline, and merge.
    async fn answer_complex(&self, question: &str) -> UnifiedResult {
        let sub_questions = split_question(self.llm.as_ref(), question).await;
        info!(
            parts = sub_questions.len(),
            question, "decomposed high-complexity question"
        );

        // Sequential on purpose: the merge's ordering guarantee falls out
        // of resolution order.
        let mut sub_results = Vec::with_capacity(sub_questions.len());
        for sub in &sub_questions {
            sub_results.push(self.resolve_cached(sub).await);
        }

        let merged = merge_results(question, &sub_results);
        self.store_if_successful(question, &merged);
        merged
    }

    /// The inner pipeline used for sub-questions: cache → classify →
    /// resolve → conditional store. Complexity analysis is not re-entered,
    /// so decomposition cannot recurse.
    pub async fn resolve_cached(&self, question: &str) -> UnifiedResult {
        if let Some(hit) = self.cache.get(question) {
            return hit;
        }

        let result = self.resolve_direct(question).await;
        self.store_if_successful(question, &result);
        result
    }

    /// Classify and dispatch to the matching resolver.
    async fn resolve_direct(&self, question: &str) -> UnifiedResult {
        let intent = self.classifier.classify(question).await;
        debug!(%intent, question, "classified intent");

        match intent {
            Intent::Structured => {
                let sql_result = self.structured.resolve(question).await;
                self.record_learning(&sql_result).await;
                UnifiedResult::from_structured(sql_result)
            }
            Intent::Knowledge | Intent::Unknown => self.knowledge.resolve(question).await,
        }
    }

    /// Only successful resolutions enter the cache; each store also bumps
    /// the question's frequency counter.
    fn store_if_successful(&self, question: &str, result: &UnifiedResult) {
        if result.success {
            self.cache.put(question, result);
            self.cache.bump_frequency(question);
        }
    }

    async fn record_learning(&self, result: &crate::models::StructuredQueryResult) {
        if !result.success {
            return;
        }
        let Some(learning) = &self.learning else {
            return;
        };
        let Some(sql) = &result.generated_sql else {
            return;
        };

        let count = result.raw_rows.as_ref().map(|r| r.len() as i64).unwrap_or(0);
        if let Err(e) = learning
            .record_success(&result.original_question, sql, Intent::Structured, count)
            .await
        {
            // Telemetry only — never fail the answer over it.
            warn!(error = %e, "failed to record learned query");
        }
    }
}

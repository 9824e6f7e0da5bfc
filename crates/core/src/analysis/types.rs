use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::llm::LlmError;
use crate::report::FindingDraft;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The model answered, but not in the required shape.
    #[error("invalid analysis output: {0}")]
    Validation(String),
}

/// Text handed to an engine.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub tenant_id: String,
    pub filename: String,
    pub text: String,
}

/// Normalized output of any engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub engine: String,
    pub engine_version: String,
    /// Failed checks, in evaluation order.
    pub findings: Vec<FindingDraft>,
    pub passed_rules: u32,
    pub failed_rules: u32,
    /// Score proposed by the engine itself; the stored score is always
    /// recomputed from the findings.
    pub model_score: Option<u8>,
    pub summary: Option<String>,
}

#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, AnalysisError>;
}

//! Mock analysis engine for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::analysis::{AnalysisEngine, AnalysisError, AnalysisInput, AnalysisResult, LlmError};
use crate::report::FindingDraft;

#[derive(Debug, Clone)]
enum Reply {
    Findings {
        findings: Vec<FindingDraft>,
        model_score: Option<u8>,
    },
    Invalid(String),
    Unreachable,
}

/// Mock implementation of the AnalysisEngine trait, standing in for the AI
/// engine. Results are tagged with engine `ai:mock`.
#[derive(Debug, Clone)]
pub struct MockAnalysisEngine {
    reply: Arc<RwLock<Reply>>,
    delay: Arc<RwLock<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockAnalysisEngine {
    fn default() -> Self {
        Self::returning(Vec::new(), Some(100))
    }
}

impl MockAnalysisEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply: Arc::new(RwLock::new(reply)),
            delay: Arc::new(RwLock::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Succeed with these findings.
    pub fn returning(findings: Vec<FindingDraft>, model_score: Option<u8>) -> Self {
        Self::with_reply(Reply::Findings {
            findings,
            model_score,
        })
    }

    /// Fail with a schema validation error.
    pub fn invalid_output(reason: &str) -> Self {
        Self::with_reply(Reply::Invalid(reason.to_string()))
    }

    /// Fail as if the provider could not be reached.
    pub fn unreachable() -> Self {
        Self::with_reply(Reply::Unreachable)
    }

    /// Sleep before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisEngine for MockAnalysisEngine {
    fn name(&self) -> &str {
        "ai"
    }

    fn version(&self) -> &str {
        "mock-model"
    }

    async fn analyze(&self, _input: &AnalysisInput) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.reply.read().await.clone() {
            Reply::Findings {
                findings,
                model_score,
            } => Ok(AnalysisResult {
                engine: "ai:mock".to_string(),
                engine_version: self.version().to_string(),
                passed_rules: 0,
                failed_rules: findings.len() as u32,
                findings,
                model_score,
                summary: None,
            }),
            Reply::Invalid(reason) => Err(AnalysisError::Validation(reason)),
            Reply::Unreachable => Err(AnalysisError::Llm(LlmError::Http(
                "connection refused".to_string(),
            ))),
        }
    }
}

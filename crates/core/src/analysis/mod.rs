//! Analysis engines: deterministic rules and an optional AI model.

mod ai;
mod llm;
mod rules;
mod score;
mod types;

pub use ai::{AiEngine, DEFAULT_INSTRUCTION};
pub use llm::{
    create_llm_client, AnthropicClient, CompletionRequest, CompletionResponse, LlmClient,
    LlmError, LlmUsage, OllamaClient, OpenAiClient,
};
pub use rules::{Rule, RuleCheck, RuleEngine, RULES};
pub use score::{score_findings, summarize, total_weight};
pub use types::{AnalysisEngine, AnalysisError, AnalysisInput, AnalysisResult};

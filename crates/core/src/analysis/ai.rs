//! AI analysis engine with strict output validation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::llm::{CompletionRequest, LlmClient, LlmError};
use super::types::{AnalysisEngine, AnalysisError, AnalysisInput, AnalysisResult};
use crate::config::AiConfig;
use crate::report::{FindingDraft, Severity};

pub const DEFAULT_INSTRUCTION: &str = "You review inspection reports for compliance. \
Check that the report identifies the project, the inspector's license, the inventory of \
inspected equipment, laboratory or test protocol references, photo evidence, a conclusion, \
the legal basis, and that any risk classification cites a norm.";

const OUTPUT_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{"score": <integer 0-100>,
 "summary": "<one sentence>",
 "findings": [{"code": "<kebab-case id>", "title": "<short title>", "category": "<category>",
               "severity": "LOW|MEDIUM|HIGH|CRITICAL", "status": "failed|passed",
               "message": "<optional detail>", "suggestion": "<optional fix>",
               "evidence": "<optional quote>"}]}
List every check you performed, passed or failed."#;

#[derive(Debug, Deserialize)]
struct RawResponse {
    score: i64,
    #[serde(default)]
    summary: Option<String>,
    findings: Vec<RawFinding>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    code: String,
    title: String,
    category: String,
    severity: String,
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    evidence: Option<String>,
}

/// Engine that asks an LLM for findings. Any transport error, timeout or
/// schema violation surfaces as an `AnalysisError`.
pub struct AiEngine {
    client: Arc<dyn LlmClient>,
    instruction: String,
    tenant_instructions: HashMap<String, String>,
    max_tokens: u32,
    max_input_chars: usize,
    timeout: Duration,
}

impl AiEngine {
    pub fn new(client: Arc<dyn LlmClient>, config: &AiConfig) -> Self {
        Self {
            client,
            instruction: config
                .instruction
                .clone()
                .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string()),
            tenant_instructions: config.tenant_instructions.clone(),
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// The instruction used for `tenant_id`.
    pub fn instruction_for(&self, tenant_id: &str) -> &str {
        self.tenant_instructions
            .get(tenant_id)
            .map(String::as_str)
            .unwrap_or(&self.instruction)
    }

    fn build_prompt(&self, input: &AnalysisInput) -> String {
        let text: String = input.text.chars().take(self.max_input_chars).collect();
        format!(
            "Document: {}\n\n<document>\n{}\n</document>",
            input.filename, text
        )
    }
}

/// Remove a surrounding markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse and validate a model response.
pub(crate) fn parse_response(
    text: &str,
    engine: &str,
    version: &str,
) -> Result<AnalysisResult, AnalysisError> {
    let raw: RawResponse = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AnalysisError::Validation(e.to_string()))?;

    if !(0..=100).contains(&raw.score) {
        return Err(AnalysisError::Validation(format!(
            "score {} outside 0-100",
            raw.score
        )));
    }

    let mut findings = Vec::new();
    let mut passed = 0u32;
    for (idx, item) in raw.findings.into_iter().enumerate() {
        if item.code.trim().is_empty() || item.title.trim().is_empty() {
            return Err(AnalysisError::Validation(format!(
                "finding {} has an empty code or title",
                idx
            )));
        }
        if item.category.trim().is_empty() {
            return Err(AnalysisError::Validation(format!(
                "finding {} has an empty category",
                idx
            )));
        }
        let severity: Severity = item
            .severity
            .parse()
            .map_err(|e: String| AnalysisError::Validation(format!("finding {}: {}", idx, e)))?;

        match item.status.to_ascii_lowercase().as_str() {
            "passed" => passed += 1,
            "failed" => {
                let mut finding = FindingDraft::new(
                    item.code.trim(),
                    severity,
                    item.message.unwrap_or(item.title),
                );
                finding.suggestion = item.suggestion;
                finding.evidence = item.evidence;
                findings.push(finding);
            }
            other => {
                return Err(AnalysisError::Validation(format!(
                    "finding {}: unknown status {}",
                    idx, other
                )))
            }
        }
    }

    Ok(AnalysisResult {
        engine: engine.to_string(),
        engine_version: version.to_string(),
        failed_rules: findings.len() as u32,
        passed_rules: passed,
        findings,
        model_score: Some(raw.score as u8),
        summary: raw.summary.filter(|s| !s.trim().is_empty()),
    })
}

#[async_trait]
impl AnalysisEngine for AiEngine {
    fn name(&self) -> &str {
        "ai"
    }

    fn version(&self) -> &str {
        self.client.model()
    }

    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, AnalysisError> {
        let request = CompletionRequest::new(self.build_prompt(input))
            .with_system(format!(
                "{}\n\n{}",
                self.instruction_for(&input.tenant_id),
                OUTPUT_CONTRACT
            ))
            .with_max_tokens(self.max_tokens);

        let response = tokio::time::timeout(self.timeout, self.client.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        debug!(
            provider = self.client.provider(),
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "AI analysis response received"
        );

        let engine = format!("ai:{}", self.client.provider());
        parse_response(&response.text, &engine, &response.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CompletionResponse, LlmUsage};
    use crate::config::LlmProvider;
    use std::sync::Mutex;

    struct ScriptedClient {
        reply: Result<String, String>,
        seen_system: Mutex<Option<String>>,
    }

    impl ScriptedClient {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen_system: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn provider(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            *self.seen_system.lock().unwrap() = request.system.clone();
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    text: text.clone(),
                    usage: LlmUsage::default(),
                    model: "scripted-1".to_string(),
                }),
                Err(message) => Err(LlmError::Api {
                    status: 503,
                    message: message.clone(),
                }),
            }
        }
    }

    fn config() -> AiConfig {
        let mut tenant_instructions = HashMap::new();
        tenant_instructions.insert("acme".to_string(), "ACME RULES".to_string());
        AiConfig {
            provider: LlmProvider::Ollama,
            model: "scripted-1".to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: 5,
            max_tokens: 512,
            max_input_chars: 100,
            instruction: None,
            tenant_instructions,
        }
    }

    fn input(tenant: &str) -> AnalysisInput {
        AnalysisInput {
            tenant_id: tenant.to_string(),
            filename: "site.txt".to_string(),
            text: "Inspection text".to_string(),
        }
    }

    const VALID: &str = r#"{"score": 70, "summary": "Mostly fine",
        "findings": [
          {"code": "inventory", "title": "Inventory missing", "category": "completeness",
           "severity": "MEDIUM", "status": "failed", "suggestion": "Add a list"},
          {"code": "conclusion", "title": "Conclusion present", "category": "structure",
           "severity": "LOW", "status": "passed"}
        ]}"#;

    #[test]
    fn test_parse_valid_response() {
        let result = parse_response(VALID, "ai:test", "m1").unwrap();
        assert_eq!(result.model_score, Some(70));
        assert_eq!(result.passed_rules, 1);
        assert_eq!(result.failed_rules, 1);
        assert_eq!(result.findings[0].code, "inventory");
        assert_eq!(result.findings[0].severity, Severity::Medium);
        assert_eq!(result.findings[0].message, "Inventory missing");
        assert_eq!(result.summary.as_deref(), Some("Mostly fine"));
    }

    #[test]
    fn test_parse_strips_code_fence() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_response(&fenced, "ai", "m").is_ok());
    }

    #[test]
    fn test_missing_score_is_rejected() {
        let text = r#"{"findings": []}"#;
        assert!(matches!(
            parse_response(text, "ai", "m"),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let text = r#"{"score": 140, "findings": []}"#;
        assert!(matches!(
            parse_response(text, "ai", "m"),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_severity_or_status_is_rejected() {
        let bad_severity = r#"{"score": 50, "findings": [{"code": "x", "title": "t",
            "category": "c", "severity": "SEVERE", "status": "failed"}]}"#;
        assert!(parse_response(bad_severity, "ai", "m").is_err());

        let bad_status = r#"{"score": 50, "findings": [{"code": "x", "title": "t",
            "category": "c", "severity": "LOW", "status": "maybe"}]}"#;
        assert!(parse_response(bad_status, "ai", "m").is_err());
    }

    #[test]
    fn test_missing_finding_field_is_rejected() {
        let text = r#"{"score": 50, "findings": [{"code": "x", "title": "t",
            "severity": "LOW", "status": "failed"}]}"#;
        assert!(matches!(
            parse_response(text, "ai", "m"),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn test_prose_is_rejected() {
        assert!(parse_response("Looks good to me!", "ai", "m").is_err());
    }

    #[tokio::test]
    async fn test_tenant_instruction_override() {
        let client = Arc::new(ScriptedClient::replying(VALID));
        let engine = AiEngine::new(client.clone(), &config());

        engine.analyze(&input("acme")).await.unwrap();
        let system = client.seen_system.lock().unwrap().clone().unwrap();
        assert!(system.starts_with("ACME RULES"));

        engine.analyze(&input("globex")).await.unwrap();
        let system = client.seen_system.lock().unwrap().clone().unwrap();
        assert!(system.starts_with(DEFAULT_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_engine_records_provider_and_model() {
        let engine = AiEngine::new(Arc::new(ScriptedClient::replying(VALID)), &config());
        let result = engine.analyze(&input("acme")).await.unwrap();
        assert_eq!(result.engine, "ai:scripted");
        assert_eq!(result.engine_version, "scripted-1");
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let client = ScriptedClient {
            reply: Err("overloaded".to_string()),
            seen_system: Mutex::new(None),
        };
        let engine = AiEngine::new(Arc::new(client), &config());
        let result = engine.analyze(&input("acme")).await;
        assert!(matches!(result, Err(AnalysisError::Llm(LlmError::Api { .. }))));
    }

    #[test]
    fn test_prompt_truncates_long_input() {
        let engine = AiEngine::new(Arc::new(ScriptedClient::replying(VALID)), &config());
        let long = AnalysisInput {
            text: "x".repeat(500),
            ..input("acme")
        };
        let prompt = engine.build_prompt(&long);
        assert!(prompt.contains(&"x".repeat(100)));
        assert!(!prompt.contains(&"x".repeat(101)));
    }
}

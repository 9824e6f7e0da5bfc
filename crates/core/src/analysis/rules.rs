//! Keyword rule engine.

use async_trait::async_trait;

use super::types::{AnalysisEngine, AnalysisError, AnalysisInput, AnalysisResult};
use crate::report::{FindingDraft, Severity};

/// How a rule inspects the text.
#[derive(Debug, Clone, Copy)]
pub enum RuleCheck {
    /// Fires when none of the keywords occur.
    RequireAny(&'static [&'static str]),
    /// Fires when a trigger keyword occurs without any of the required ones.
    RequireWith {
        trigger: &'static [&'static str],
        required: &'static [&'static str],
    },
}

/// One compliance check.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub code: &'static str,
    pub severity: Severity,
    pub message: &'static str,
    pub suggestion: &'static str,
    pub check: RuleCheck,
}

const NORM_REFERENCES: &[&str] = &[
    "norm",
    "norms",
    "standard",
    "standards",
    "nen",
    "iso",
    "iec",
    "en 50",
    "en 60",
];

pub const RULES: &[Rule] = &[
    Rule {
        code: "project-info",
        severity: Severity::Medium,
        message: "Project information is missing",
        suggestion: "State the project name, client and site address",
        check: RuleCheck::RequireAny(&[
            "project",
            "client",
            "site address",
            "object address",
            "location",
        ]),
    },
    Rule {
        code: "inspector-license",
        severity: Severity::High,
        message: "No inspector license or certificate is referenced",
        suggestion: "Include the inspector's certificate or registration number",
        check: RuleCheck::RequireAny(&[
            "license",
            "licence",
            "licensed",
            "certificate",
            "certificates",
            "certified inspector",
            "accreditation",
            "registration number",
        ]),
    },
    Rule {
        code: "inventory",
        severity: Severity::Medium,
        message: "No equipment inventory was found",
        suggestion: "Add an inventory of the installations and equipment inspected",
        check: RuleCheck::RequireAny(&[
            "inventory",
            "equipment list",
            "installation list",
            "asset register",
            "components inspected",
        ]),
    },
    Rule {
        code: "lab-reference",
        severity: Severity::Medium,
        message: "No laboratory or test protocol is referenced",
        suggestion: "Reference the laboratory report or measurement protocol used",
        check: RuleCheck::RequireAny(&[
            "laboratory",
            "lab report",
            "test protocol",
            "test protocols",
            "test report",
            "measurement protocol",
            "calibration",
        ]),
    },
    Rule {
        code: "photo-evidence",
        severity: Severity::Low,
        message: "No photo evidence is included",
        suggestion: "Attach photographs of the inspected items",
        check: RuleCheck::RequireAny(&[
            "photo",
            "photos",
            "photograph",
            "photographs",
            "image",
            "images",
            "picture",
            "pictures",
            "figure",
            "figures",
        ]),
    },
    Rule {
        code: "conclusion-structure",
        severity: Severity::Low,
        message: "The document has no conclusion section",
        suggestion: "End the report with an explicit conclusion",
        check: RuleCheck::RequireAny(&[
            "conclusion",
            "conclusions",
            "summary of findings",
            "final assessment",
            "verdict",
        ]),
    },
    Rule {
        code: "legal-reference",
        severity: Severity::Medium,
        message: "No legal or regulatory reference was found",
        suggestion: "Cite the regulation or decree the inspection was performed under",
        check: RuleCheck::RequireAny(&[
            "regulation",
            "regulations",
            "legislation",
            "decree",
            "directive",
            "directives",
            "statute",
            "building code",
            "law",
            "laws",
        ]),
    },
    Rule {
        code: "risk-class-inconsistency",
        severity: Severity::High,
        message: "A risk class is stated without a norm reference",
        suggestion: "Name the norm the risk classification is based on",
        check: RuleCheck::RequireWith {
            trigger: &["risk class", "risk classes", "risk category", "risk level"],
            required: NORM_REFERENCES,
        },
    },
];

/// Whether `keyword` occurs in `haystack` as a whole word. A keyword ending
/// in a digit ("en 50") also matches longer numbers. Both must already be
/// lowercase.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    let open_ended = keyword.ends_with(|c: char| c.is_ascii_digit());
    haystack.match_indices(keyword).any(|(idx, _)| {
        let starts_word = haystack[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let ends_word = open_ended
            || haystack[idx + keyword.len()..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric());
        starts_word && ends_word
    })
}

fn first_match(haystack: &str, keywords: &[&str]) -> Option<String> {
    keywords
        .iter()
        .find(|k| contains_keyword(haystack, k))
        .map(|k| k.trim().to_string())
}

impl Rule {
    /// Evaluate against lowercased text. `None` means the rule passed.
    fn evaluate(&self, lowered: &str) -> Option<FindingDraft> {
        let finding = FindingDraft::new(self.code, self.severity, self.message)
            .with_suggestion(self.suggestion);
        match self.check {
            RuleCheck::RequireAny(keywords) => {
                first_match(lowered, keywords).is_none().then_some(finding)
            }
            RuleCheck::RequireWith { trigger, required } => {
                let hit = first_match(lowered, trigger)?;
                if first_match(lowered, required).is_some() {
                    None
                } else {
                    Some(finding.with_evidence(format!("mentions \"{}\"", hit)))
                }
            }
        }
    }
}

/// Evaluates the fixed rule table. Pure and order-independent.
pub struct RuleEngine {
    rules: &'static [Rule],
}

impl RuleEngine {
    pub fn new() -> Self {
        Self { rules: RULES }
    }

    /// Findings for every rule that fires, in table order.
    pub fn evaluate(&self, text: &str) -> Vec<FindingDraft> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(&lowered))
            .collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisEngine for RuleEngine {
    fn name(&self) -> &str {
        "rules"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, AnalysisError> {
        let findings = self.evaluate(&input.text);
        let failed = findings.len() as u32;
        Ok(AnalysisResult {
            engine: self.name().to_string(),
            engine_version: self.version().to_string(),
            passed_rules: self.rule_count() as u32 - failed,
            failed_rules: failed,
            findings,
            model_score: None,
            summary: None,
        })
    }
}

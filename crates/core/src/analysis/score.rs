//! Deterministic scoring.

use crate::report::{FindingDraft, Severity};

/// Sum of severity weights over `findings`.
pub fn total_weight(findings: &[FindingDraft]) -> u32 {
    findings.iter().map(|f| f.severity.weight()).sum()
}

/// `clamp(100 - total_weight, 0, 100)`.
pub fn score_findings(findings: &[FindingDraft]) -> u8 {
    100u32.saturating_sub(total_weight(findings)) as u8
}

/// One-line summary such as `Score 58/100: 7 findings (2 high, 3 medium, 2 low)`.
pub fn summarize(findings: &[FindingDraft], score: u8) -> String {
    if findings.is_empty() {
        return format!("Score {}/100: no findings", score);
    }

    let parts: Vec<String> = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ]
    .iter()
    .filter_map(|severity| {
        let n = findings.iter().filter(|f| f.severity == *severity).count();
        (n > 0).then(|| format!("{} {}", n, severity.as_str().to_ascii_lowercase()))
    })
    .collect();

    format!(
        "Score {}/100: {} finding{} ({})",
        score,
        findings.len(),
        if findings.len() == 1 { "" } else { "s" },
        parts.join(", ")
    )
}

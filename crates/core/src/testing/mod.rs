//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the pipeline's external
//! collaborators so the pipeline, lifecycle and HTTP layers can be tested
//! without real storage, model providers or notification receivers.
//!
//! # Example
//!
//! ```rust,ignore
//! use inspectra_core::testing::{MockAnalysisEngine, MockNotifier, MockObjectStore};
//!
//! let objects = MockObjectStore::new();
//! let notifier = MockNotifier::new();
//!
//! // Simulate an unconfirmed upload
//! objects.set_put_unconfirmed(true).await;
//!
//! // Use in ReportPipeline::new(...)
//! ```

mod mock_analysis_engine;
mod mock_notifier;
mod mock_object_store;

pub use mock_analysis_engine::MockAnalysisEngine;
pub use mock_notifier::{MockNotifier, RecordedNotification};
pub use mock_object_store::MockObjectStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::report::{FindingDraft, Severity};

    /// Document text that satisfies every rule.
    pub const COMPLETE_REPORT: &str = "\
Project: Tower A renovation, client Acme BV, site address Main Street 1.
Inspection by certified inspector, certificate no. 4411.
Inventory: switchboards, cabling, RCDs.
Measurements per test protocol TP-7, laboratory report attached.
Photo 1 to 12 show the distribution boards.
Inspected under the national building code and the low-voltage directive.
Risk class 2 according to NEN 3140.
Conclusion: the installation is safe for use.";

    /// Mentions a risk class and a norm and nothing else: seven findings, score 58.
    pub const RISK_CLASS_ONLY: &str =
        "The risk class is 2 according to the applicable norm NEN 3140.";

    /// A finding with reasonable defaults.
    pub fn finding(code: &str, severity: Severity) -> FindingDraft {
        FindingDraft::new(code, severity, format!("{} check failed", code))
    }
}

//! Durable evidence of what ran and why
//!
//! Two independent stores: an append-only CSV table of executed runs and a
//! JSON log of scheduling decisions.

pub mod decision_log;
pub mod report;
pub mod table;

pub use decision_log::{DecisionLog, DecisionLogEntry};
pub use report::{EvidenceReport, PhaseSummary};
pub use table::{EvidenceRecord, EvidenceRow, EvidenceTable, EVIDENCE_HEADER};

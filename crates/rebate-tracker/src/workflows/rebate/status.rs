use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a rebate application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    PreliminaryEligibility,
    DocumentsRequested,
    DocumentsReceived,
    SubmittedToProgram,
    Approved,
    ContractorMatched,
    InstallationInProgress,
    Completed,
    Rejected,
    Cancelled,
}

use ApplicationStatus::*;

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 10] = [
        PreliminaryEligibility,
        DocumentsRequested,
        DocumentsReceived,
        SubmittedToProgram,
        Approved,
        ContractorMatched,
        InstallationInProgress,
        Completed,
        Rejected,
        Cancelled,
    ];

    /// Statuses reachable in one step. Hardcoded so the graph can be audited
    /// at a glance.
    pub const fn allowed_targets(self) -> &'static [ApplicationStatus] {
        match self {
            PreliminaryEligibility => &[DocumentsRequested, Rejected, Cancelled],
            DocumentsRequested => &[DocumentsReceived, Rejected, Cancelled],
            DocumentsReceived => &[SubmittedToProgram, Rejected, Cancelled],
            SubmittedToProgram => &[Approved, Rejected, Cancelled],
            Approved => &[ContractorMatched, Rejected, Cancelled],
            ContractorMatched => &[InstallationInProgress, Rejected, Cancelled],
            InstallationInProgress => &[Completed, Rejected, Cancelled],
            Completed | Rejected | Cancelled => &[],
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Completed | Rejected | Cancelled)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PreliminaryEligibility => "PRELIMINARY_ELIGIBILITY",
            DocumentsRequested => "DOCUMENTS_REQUESTED",
            DocumentsReceived => "DOCUMENTS_RECEIVED",
            SubmittedToProgram => "SUBMITTED_TO_PROGRAM",
            Approved => "APPROVED",
            ContractorMatched => "CONTRACTOR_MATCHED",
            InstallationInProgress => "INSTALLATION_IN_PROGRESS",
            Completed => "COMPLETED",
            Rejected => "REJECTED",
            Cancelled => "CANCELLED",
        }
    }

    /// Human-readable text used in notification copy.
    pub const fn label(self) -> &'static str {
        match self {
            PreliminaryEligibility => "Preliminary Eligibility Review",
            DocumentsRequested => "Documents Requested",
            DocumentsReceived => "Documents Received",
            SubmittedToProgram => "Submitted to Rebate Program",
            Approved => "Approved",
            ContractorMatched => "Contractor Matched",
            InstallationInProgress => "Installation in Progress",
            Completed => "Completed",
            Rejected => "Rejected",
            Cancelled => "Cancelled",
        }
    }
}

pub fn is_valid_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    from.allowed_targets().contains(&to)
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

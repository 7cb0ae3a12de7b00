//! Rebate program intake, document collection, contractor matching, and fees.
//!
//! Services are synchronous and generic over their storage, file, and mail
//! backends; [`rebate_router`] exposes them over HTTP.

pub mod documents;
pub mod domain;
pub mod error;
pub mod fees;
pub mod matching;
pub mod memory;
pub mod notifier;
pub mod platform;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;
pub mod storage;

#[cfg(test)]
mod tests;

pub use documents::{DocumentSettings, DocumentWorkflow, ReviewDecision, UploadedFile};
pub use domain::{
    Application, ApplicationId, ApplicationSubmission, Contractor, ContractorId,
    ContractorOnboarding, Document, DocumentId, DocumentRequest, DocumentStatus, DocumentType,
    Notification, NotificationId, NotificationType, StatusChange, SubjectId,
};
pub use error::WorkflowError;
pub use fees::{
    calculate_contractor_balance, calculate_project_fees, calculate_referral_fee, referral_tier,
    ContractorBalance, ProjectFees, ReferralTier, FILING_FEE,
};
pub use matching::{ContractorDirectory, MatchOutcome};
pub use memory::{InMemoryFileStorage, InMemoryMailer, InMemoryRebateStore};
pub use notifier::{MailError, Mailer, Notifier, OutboundEmail};
pub use platform::{PlatformSettings, RebatePlatform};
pub use repository::{RebateStore, RepositoryError};
pub use router::{rebate_router, SUBJECT_HEADER};
pub use service::{ApplicationService, DashboardStats, TransitionOutcome, TransitionRequest};
pub use status::{is_valid_transition, ApplicationStatus};
pub use storage::{FileStorage, StorageError, UrlSigner};

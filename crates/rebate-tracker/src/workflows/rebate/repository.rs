use std::collections::BTreeMap;

use super::domain::{
    Application, ApplicationId, Contractor, ContractorId, Document, DocumentId, DocumentRequest,
    DocumentStatus, Notification, NotificationId, StatusChange, StatusUpdate, SubjectId,
};
use super::status::ApplicationStatus;

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("status precondition failed: expected {expected}, found {found}")]
    StaleStatus {
        expected: ApplicationStatus,
        found: ApplicationStatus,
    },
    #[error("document precondition failed: expected {expected:?}, found {found:?}")]
    StaleDocument {
        expected: DocumentStatus,
        found: DocumentStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Applications plus their append-only status history.
pub trait ApplicationRepository: Send + Sync {
    /// Atomically increment and return the application sequence.
    fn next_application_number(&self) -> Result<u64, RepositoryError>;
    fn insert_application(&self, application: Application)
        -> Result<Application, RepositoryError>;
    fn fetch_application(&self, id: &ApplicationId)
        -> Result<Option<Application>, RepositoryError>;
    fn applications_for_customer(
        &self,
        customer: &SubjectId,
    ) -> Result<Vec<Application>, RepositoryError>;
    /// Compare-and-swap on `expected`; fails with `StaleStatus` when another
    /// writer moved the application first.
    fn update_application_status(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> Result<Application, RepositoryError>;
    fn update_eligibility_score(
        &self,
        id: &ApplicationId,
        score: f64,
    ) -> Result<Application, RepositoryError>;
    fn application_status_counts(
        &self,
    ) -> Result<BTreeMap<ApplicationStatus, usize>, RepositoryError>;
    fn append_status_change(&self, change: StatusChange) -> Result<(), RepositoryError>;
    fn status_history(&self, id: &ApplicationId) -> Result<Vec<StatusChange>, RepositoryError>;
}

pub trait DocumentRepository: Send + Sync {
    fn insert_document(&self, document: Document) -> Result<Document, RepositoryError>;
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;
    /// Replace `document` only while the stored copy is still in `expected`;
    /// fails with `StaleDocument` otherwise.
    fn review_document(
        &self,
        document: Document,
        expected: DocumentStatus,
    ) -> Result<Document, RepositoryError>;
    fn documents_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError>;
    fn count_documents_with_status(&self, status: DocumentStatus)
        -> Result<usize, RepositoryError>;
    fn insert_document_request(
        &self,
        request: DocumentRequest,
    ) -> Result<DocumentRequest, RepositoryError>;
    fn update_document_request(&self, request: DocumentRequest) -> Result<(), RepositoryError>;
    fn document_requests_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<DocumentRequest>, RepositoryError>;
    fn count_pending_document_requests(&self) -> Result<usize, RepositoryError>;
}

pub trait NotificationRepository: Send + Sync {
    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError>;
    fn fetch_notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;
    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError>;
    fn notifications_for(
        &self,
        recipient: &SubjectId,
    ) -> Result<Vec<Notification>, RepositoryError>;
}

pub trait ContractorRepository: Send + Sync {
    fn insert_contractor(&self, contractor: Contractor) -> Result<Contractor, RepositoryError>;
    fn fetch_contractor(&self, id: &ContractorId) -> Result<Option<Contractor>, RepositoryError>;
    fn update_contractor(&self, contractor: Contractor) -> Result<(), RepositoryError>;
    fn contractors(&self) -> Result<Vec<Contractor>, RepositoryError>;
}

/// Every collection the platform persists, so services take a single store.
pub trait RebateStore:
    ApplicationRepository + DocumentRepository + NotificationRepository + ContractorRepository
{
}

impl<T> RebateStore for T where
    T: ApplicationRepository + DocumentRepository + NotificationRepository + ContractorRepository
{
}

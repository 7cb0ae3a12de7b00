use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::workflows::rebate::domain::{
    Application, ApplicationId, ApplicationSubmission, Contractor, ContractorId, ContractorStatus,
    Document, DocumentId, DocumentRequest, DocumentStatus, Notification, NotificationId,
    StatusChange, StatusUpdate, SubjectId,
};
use crate::workflows::rebate::memory::{InMemoryFileStorage, InMemoryMailer, InMemoryRebateStore};
use crate::workflows::rebate::notifier::{MailError, Mailer, OutboundEmail};
use crate::workflows::rebate::platform::{PlatformSettings, RebatePlatform};
use crate::workflows::rebate::repository::{
    ApplicationRepository, ContractorRepository, DocumentRepository, NotificationRepository,
    RepositoryError,
};
use crate::workflows::rebate::status::ApplicationStatus;

pub(super) const ADMIN: &str = "admin";
pub(super) const CUSTOMER: &str = "65f1a2b3c4d5e6f708192a3b";
pub(super) const OTHER_CUSTOMER: &str = "user_2NxOther";
pub(super) const SIGNING_SECRET: &str = "test-signing-secret";

pub(super) struct Harness<R = InMemoryRebateStore, M = InMemoryMailer> {
    pub platform: Arc<RebatePlatform<R, InMemoryFileStorage, M>>,
    pub store: Arc<R>,
    pub storage: Arc<InMemoryFileStorage>,
    pub mailer: Arc<M>,
}

pub(super) fn harness() -> Harness {
    harness_with(InMemoryRebateStore::default(), InMemoryMailer::default())
}

pub(super) fn harness_with<R, M>(store: R, mailer: M) -> Harness<R, M>
where
    R: crate::workflows::rebate::repository::RebateStore + 'static,
    M: Mailer + 'static,
{
    let store = Arc::new(store);
    let storage = Arc::new(InMemoryFileStorage::new(SIGNING_SECRET));
    let mailer = Arc::new(mailer);
    let platform = Arc::new(RebatePlatform::new(
        store.clone(),
        storage.clone(),
        mailer.clone(),
        PlatformSettings::default(),
    ));
    Harness {
        platform,
        store,
        storage,
        mailer,
    }
}

pub(super) fn subject(raw: &str) -> SubjectId {
    SubjectId::canonical(raw)
}

pub(super) fn admin() -> SubjectId {
    subject(ADMIN)
}

pub(super) fn customer() -> SubjectId {
    subject(CUSTOMER)
}

pub(super) fn submission() -> ApplicationSubmission {
    ApplicationSubmission {
        name: Some("Dana Whitfield".to_string()),
        phone: Some("515-555-0142".to_string()),
        email: Some("dana@example.com".to_string()),
        property_address: Some("418 Maple Ave, Ames, IA 50010".to_string()),
        property_type: Some("single-family".to_string()),
        hvac_type: Some("heat-pump".to_string()),
        home_size_sq_ft: Some(1850),
        system_age_years: Some(17),
        service_area: Some("Story County".to_string()),
        requested_amount: Some(4_200.0),
    }
}

pub(super) fn submit_application<R, M>(harness: &Harness<R, M>) -> Application
where
    R: crate::workflows::rebate::repository::RebateStore + 'static,
    M: Mailer + 'static,
{
    harness
        .platform
        .applications
        .submit(Some(customer()), submission())
        .expect("submission accepted")
}

/// Approved contractor seeded straight into the store.
pub(super) fn seed_contractor(
    store: &InMemoryRebateStore,
    company: &str,
    areas: &[&str],
    completed_projects: u32,
) -> Contractor {
    let contractor = Contractor {
        id: ContractorId::generate(),
        company_name: company.to_string(),
        contact_name: "Pat Installer".to_string(),
        email: format!("{}@contractors.test", company.to_lowercase().replace(' ', "-")),
        phone: None,
        service_areas: areas.iter().map(|area| area.to_string()).collect(),
        approved: true,
        status: ContractorStatus::Approved,
        completed_projects,
        onboarded_at: Utc::now(),
        approved_at: Some(Utc::now()),
        filing_fees_owed: 0.0,
        referral_fees_owed: 0.0,
        approval_fee_paid: false,
        referral_fee_tier: None,
    };
    store
        .insert_contractor(contractor)
        .expect("contractor stored")
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Collection an [`OutageStore`] refuses to write.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Outage {
    Notifications,
    StatusChanges,
}

/// Delegates to the in-memory store but refuses every write to one collection.
pub(super) struct OutageStore {
    pub inner: InMemoryRebateStore,
    outage: Outage,
}

impl OutageStore {
    pub fn new(outage: Outage) -> Self {
        Self {
            inner: InMemoryRebateStore::default(),
            outage,
        }
    }

    fn refuse(&self, outage: Outage) -> Result<(), RepositoryError> {
        if self.outage == outage {
            return Err(RepositoryError::Unavailable(match outage {
                Outage::Notifications => "notifications offline".to_string(),
                Outage::StatusChanges => "status history offline".to_string(),
            }));
        }
        Ok(())
    }
}

impl ApplicationRepository for OutageStore {
    fn next_application_number(&self) -> Result<u64, RepositoryError> {
        self.inner.next_application_number()
    }

    fn insert_application(&self, application: Application) -> Result<Application, RepositoryError> {
        self.inner.insert_application(application)
    }

    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.inner.fetch_application(id)
    }

    fn applications_for_customer(
        &self,
        customer: &SubjectId,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.inner.applications_for_customer(customer)
    }

    fn update_application_status(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> Result<Application, RepositoryError> {
        self.inner.update_application_status(id, expected, update)
    }

    fn update_eligibility_score(
        &self,
        id: &ApplicationId,
        score: f64,
    ) -> Result<Application, RepositoryError> {
        self.inner.update_eligibility_score(id, score)
    }

    fn application_status_counts(
        &self,
    ) -> Result<BTreeMap<ApplicationStatus, usize>, RepositoryError> {
        self.inner.application_status_counts()
    }

    fn append_status_change(&self, change: StatusChange) -> Result<(), RepositoryError> {
        self.refuse(Outage::StatusChanges)?;
        self.inner.append_status_change(change)
    }

    fn status_history(&self, id: &ApplicationId) -> Result<Vec<StatusChange>, RepositoryError> {
        self.inner.status_history(id)
    }
}

impl DocumentRepository for OutageStore {
    fn insert_document(&self, document: Document) -> Result<Document, RepositoryError> {
        self.inner.insert_document(document)
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        self.inner.fetch_document(id)
    }

    fn review_document(
        &self,
        document: Document,
        expected: DocumentStatus,
    ) -> Result<Document, RepositoryError> {
        self.inner.review_document(document, expected)
    }

    fn documents_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError> {
        self.inner.documents_for_application(id)
    }

    fn count_documents_with_status(
        &self,
        status: DocumentStatus,
    ) -> Result<usize, RepositoryError> {
        self.inner.count_documents_with_status(status)
    }

    fn insert_document_request(
        &self,
        request: DocumentRequest,
    ) -> Result<DocumentRequest, RepositoryError> {
        self.inner.insert_document_request(request)
    }

    fn update_document_request(&self, request: DocumentRequest) -> Result<(), RepositoryError> {
        self.inner.update_document_request(request)
    }

    fn document_requests_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<DocumentRequest>, RepositoryError> {
        self.inner.document_requests_for_application(id)
    }

    fn count_pending_document_requests(&self) -> Result<usize, RepositoryError> {
        self.inner.count_pending_document_requests()
    }
}

impl NotificationRepository for OutageStore {
    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        self.refuse(Outage::Notifications)?;
        self.inner.insert_notification(notification)
    }

    fn fetch_notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        self.inner.fetch_notification(id)
    }

    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError> {
        self.refuse(Outage::Notifications)?;
        self.inner.update_notification(notification)
    }

    fn notifications_for(
        &self,
        recipient: &SubjectId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.inner.notifications_for(recipient)
    }
}

impl ContractorRepository for OutageStore {
    fn insert_contractor(&self, contractor: Contractor) -> Result<Contractor, RepositoryError> {
        self.inner.insert_contractor(contractor)
    }

    fn fetch_contractor(&self, id: &ContractorId) -> Result<Option<Contractor>, RepositoryError> {
        self.inner.fetch_contractor(id)
    }

    fn update_contractor(&self, contractor: Contractor) -> Result<(), RepositoryError> {
        self.inner.update_contractor(contractor)
    }

    fn contractors(&self) -> Result<Vec<Contractor>, RepositoryError> {
        self.inner.contractors()
    }
}

/// Mail relay that is always down.
#[derive(Default)]
pub(super) struct OfflineMailer;

impl Mailer for OfflineMailer {
    fn send(&self, _email: OutboundEmail) -> Result<(), MailError> {
        Err(MailError::Transport("relay offline".to_string()))
    }
}

pub(super) const BOUNDARY: &str = "rebate-test-boundary";

/// Hand-built `multipart/form-data` body with text fields and an optional file part.
pub(super) fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

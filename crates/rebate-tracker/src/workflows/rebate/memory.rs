//! In-process backends for the store, storage, and mail collaborators.
//!
//! Used by the API binary when no external services are configured and by
//! the test suites. Every operation touches a single collection under one
//! lock, matching the single-document atomicity the services assume.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};

use super::domain::{
    Application, ApplicationId, Contractor, ContractorId, Document, DocumentId, DocumentRequest,
    DocumentRequestId, DocumentRequestStatus, DocumentStatus, Notification, NotificationId,
    StatusChange, StatusUpdate, SubjectId,
};
use super::notifier::{MailError, Mailer, OutboundEmail};
use super::repository::{
    ApplicationRepository, ContractorRepository, DocumentRepository, NotificationRepository,
    RepositoryError,
};
use super::status::ApplicationStatus;
use super::storage::{FileStorage, FileUpload, SignedUrl, StorageError, StoredObject, UrlSigner};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
}

#[derive(Default, Clone)]
pub struct InMemoryRebateStore {
    sequence: Arc<AtomicU64>,
    applications: Arc<Mutex<HashMap<ApplicationId, Application>>>,
    status_changes: Arc<Mutex<Vec<StatusChange>>>,
    documents: Arc<Mutex<HashMap<DocumentId, Document>>>,
    document_requests: Arc<Mutex<HashMap<DocumentRequestId, DocumentRequest>>>,
    notifications: Arc<Mutex<HashMap<NotificationId, Notification>>>,
    contractors: Arc<Mutex<HashMap<ContractorId, Contractor>>>,
}

impl InMemoryRebateStore {
    /// Every notification recorded so far, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .lock()
            .map(|guard| guard.values().cloned().collect())
            .unwrap_or_default();
        notifications.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        notifications
    }
}

impl ApplicationRepository for InMemoryRebateStore {
    fn next_application_number(&self) -> Result<u64, RepositoryError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn insert_application(
        &self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        let mut guard = lock(&self.applications)?;
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id, application.clone());
        Ok(application)
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(lock(&self.applications)?.get(id).cloned())
    }

    fn applications_for_customer(
        &self,
        customer: &SubjectId,
    ) -> Result<Vec<Application>, RepositoryError> {
        Ok(lock(&self.applications)?
            .values()
            .filter(|application| &application.customer_id == customer)
            .cloned()
            .collect())
    }

    fn update_application_status(
        &self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> Result<Application, RepositoryError> {
        let mut guard = lock(&self.applications)?;
        let application = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if application.status != expected {
            return Err(RepositoryError::StaleStatus {
                expected,
                found: application.status,
            });
        }
        update.apply(application);
        Ok(application.clone())
    }

    fn update_eligibility_score(
        &self,
        id: &ApplicationId,
        score: f64,
    ) -> Result<Application, RepositoryError> {
        let mut guard = lock(&self.applications)?;
        let application = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        application.eligibility_score = score;
        application.updated_at = Utc::now();
        Ok(application.clone())
    }

    fn application_status_counts(
        &self,
    ) -> Result<BTreeMap<ApplicationStatus, usize>, RepositoryError> {
        let mut counts = BTreeMap::new();
        for application in lock(&self.applications)?.values() {
            *counts.entry(application.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn append_status_change(&self, change: StatusChange) -> Result<(), RepositoryError> {
        lock(&self.status_changes)?.push(change);
        Ok(())
    }

    fn status_history(&self, id: &ApplicationId) -> Result<Vec<StatusChange>, RepositoryError> {
        Ok(lock(&self.status_changes)?
            .iter()
            .filter(|change| &change.application_id == id)
            .cloned()
            .collect())
    }
}

impl DocumentRepository for InMemoryRebateStore {
    fn insert_document(&self, document: Document) -> Result<Document, RepositoryError> {
        let mut guard = lock(&self.documents)?;
        if guard.contains_key(&document.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(document.id, document.clone());
        Ok(document)
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(lock(&self.documents)?.get(id).cloned())
    }

    fn review_document(
        &self,
        document: Document,
        expected: DocumentStatus,
    ) -> Result<Document, RepositoryError> {
        let mut guard = lock(&self.documents)?;
        let existing = guard.get_mut(&document.id).ok_or(RepositoryError::NotFound)?;
        if existing.status != expected {
            return Err(RepositoryError::StaleDocument {
                expected,
                found: existing.status,
            });
        }
        *existing = document;
        Ok(existing.clone())
    }

    fn documents_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<Document>, RepositoryError> {
        Ok(lock(&self.documents)?
            .values()
            .filter(|document| &document.application_id == id)
            .cloned()
            .collect())
    }

    fn count_documents_with_status(
        &self,
        status: DocumentStatus,
    ) -> Result<usize, RepositoryError> {
        Ok(lock(&self.documents)?
            .values()
            .filter(|document| document.status == status)
            .count())
    }

    fn insert_document_request(
        &self,
        request: DocumentRequest,
    ) -> Result<DocumentRequest, RepositoryError> {
        let mut guard = lock(&self.document_requests)?;
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id, request.clone());
        Ok(request)
    }

    fn update_document_request(&self, request: DocumentRequest) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.document_requests)?;
        match guard.get_mut(&request.id) {
            Some(existing) => {
                *existing = request;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn document_requests_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<DocumentRequest>, RepositoryError> {
        Ok(lock(&self.document_requests)?
            .values()
            .filter(|request| &request.application_id == id)
            .cloned()
            .collect())
    }

    fn count_pending_document_requests(&self) -> Result<usize, RepositoryError> {
        Ok(lock(&self.document_requests)?
            .values()
            .filter(|request| request.status == DocumentRequestStatus::Pending)
            .count())
    }
}

impl NotificationRepository for InMemoryRebateStore {
    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        lock(&self.notifications)?.insert(notification.id, notification.clone());
        Ok(notification)
    }

    fn fetch_notification(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(lock(&self.notifications)?.get(id).cloned())
    }

    fn update_notification(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.notifications)?;
        match guard.get_mut(&notification.id) {
            Some(existing) => {
                *existing = notification;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn notifications_for(
        &self,
        recipient: &SubjectId,
    ) -> Result<Vec<Notification>, RepositoryError> {
        Ok(lock(&self.notifications)?
            .values()
            .filter(|notification| &notification.recipient_id == recipient)
            .cloned()
            .collect())
    }
}

impl ContractorRepository for InMemoryRebateStore {
    fn insert_contractor(&self, contractor: Contractor) -> Result<Contractor, RepositoryError> {
        let mut guard = lock(&self.contractors)?;
        if guard.contains_key(&contractor.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(contractor.id, contractor.clone());
        Ok(contractor)
    }

    fn fetch_contractor(&self, id: &ContractorId) -> Result<Option<Contractor>, RepositoryError> {
        Ok(lock(&self.contractors)?.get(id).cloned())
    }

    fn update_contractor(&self, contractor: Contractor) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.contractors)?;
        match guard.get_mut(&contractor.id) {
            Some(existing) => {
                *existing = contractor;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn contractors(&self) -> Result<Vec<Contractor>, RepositoryError> {
        Ok(lock(&self.contractors)?.values().cloned().collect())
    }
}

#[derive(Clone)]
struct StoredFile {
    content_type: String,
    bytes: Vec<u8>,
}

/// Object store kept in process memory, serving signed URLs it minted.
#[derive(Clone)]
pub struct InMemoryFileStorage {
    objects: Arc<Mutex<HashMap<String, StoredFile>>>,
    signer: UrlSigner,
}

impl InMemoryFileStorage {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            objects: Arc::default(),
            signer: UrlSigner::new(signing_secret),
        }
    }

    /// Content type recorded at upload, if the object exists.
    pub fn content_type(&self, locator: &str) -> Option<String> {
        self.objects()
            .ok()
            .and_then(|guard| guard.get(locator).map(|file| file.content_type.clone()))
    }

    fn objects(&self) -> Result<MutexGuard<'_, HashMap<String, StoredFile>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
    }
}

impl FileStorage for InMemoryFileStorage {
    fn put(&self, upload: FileUpload) -> Result<StoredObject, StorageError> {
        let size_bytes = upload.bytes.len() as u64;
        self.objects()?.insert(
            upload.locator.clone(),
            StoredFile {
                content_type: upload.content_type,
                bytes: upload.bytes,
            },
        );
        Ok(StoredObject {
            locator: upload.locator,
            size_bytes,
        })
    }

    fn signed_url(&self, locator: &str, ttl: Duration) -> Result<SignedUrl, StorageError> {
        if !self.objects()?.contains_key(locator) {
            return Err(StorageError::NotFound(locator.to_string()));
        }
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| StorageError::Unavailable("signed url ttl out of range".to_string()))?;
        self.signer.sign(locator, expires_at)
    }

    fn fetch_signed(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let locator = self.signer.verify(url, Utc::now())?;
        self.objects()?
            .get(&locator)
            .map(|file| file.bytes.clone())
            .ok_or(StorageError::NotFound(locator))
    }
}

/// Mailer that keeps every message, for local runs and assertions.
#[derive(Default, Clone)]
pub struct InMemoryMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
}

impl InMemoryMailer {
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Mailer for InMemoryMailer {
    fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        if !email.to.contains('@') {
            return Err(MailError::InvalidAddress(email.to));
        }
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("mailbox lock poisoned".to_string()))?
            .push(email);
        Ok(())
    }
}

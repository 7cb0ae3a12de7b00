use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{info, warn};

use super::domain::{
    Application, ApplicationId, Document, DocumentId, DocumentRequest, DocumentRequestId,
    DocumentRequestStatus, DocumentStatus, DocumentType, NotificationType, SubjectId,
};
use super::error::WorkflowError;
use super::notifier::{Mailer, NotificationDraft, Notifier};
use super::repository::{RebateStore, RepositoryError};
use super::storage::{sanitize_file_name, FileStorage, FileUpload, SignedUrl};

/// Limits applied by the document workflow.
#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub download_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            download_ttl: Duration::minutes(5),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// File received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Admin review decision for an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Verify,
    Reject { reason: Option<String> },
}

/// Authorised retrieval of a stored document.
#[derive(Debug, Clone)]
pub struct DownloadGrant {
    pub document: Document,
    pub url: SignedUrl,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub document: Document,
    pub bytes: Vec<u8>,
}

pub struct DocumentWorkflow<R, S, M> {
    store: Arc<R>,
    storage: Arc<S>,
    notifier: Notifier<R, M>,
    settings: DocumentSettings,
}

impl<R, S, M> DocumentWorkflow<R, S, M>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    pub fn new(
        store: Arc<R>,
        storage: Arc<S>,
        notifier: Notifier<R, M>,
        settings: DocumentSettings,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &DocumentSettings {
        &self.settings
    }

    /// Store the file, then persist the document row.
    pub fn upload(
        &self,
        application_id: &ApplicationId,
        owner: SubjectId,
        file: UploadedFile,
        document_type: DocumentType,
    ) -> Result<Document, WorkflowError> {
        let file_name = file.file_name.trim().to_string();
        if file_name.is_empty() {
            return Err(WorkflowError::validation(
                "missing_fields",
                "uploaded file has no name",
            ));
        }
        if file.bytes.is_empty() {
            return Err(WorkflowError::validation("empty_file", "uploaded file is empty"));
        }
        if file.bytes.len() > self.settings.max_upload_bytes {
            return Err(WorkflowError::validation(
                "file_too_large",
                format!(
                    "uploaded file exceeds {} bytes",
                    self.settings.max_upload_bytes
                ),
            ));
        }

        let application = self.application(application_id)?;

        let document_id = DocumentId::generate();
        let locator = format!(
            "applications/{}/{}-{}",
            application.id,
            document_id,
            sanitize_file_name(&file_name)
        );
        let stored = self.storage.put(FileUpload {
            locator,
            content_type: file.content_type.clone(),
            bytes: file.bytes,
        })?;

        let document = Document {
            id: document_id,
            application_id: application.id,
            owner_id: owner,
            file_name,
            storage_locator: stored.locator,
            document_type,
            status: DocumentStatus::Uploaded,
            size_bytes: stored.size_bytes,
            mime_type: file.content_type,
            uploaded_at: Utc::now(),
            verified_at: None,
            verified_by: None,
            rejection_reason: None,
        };
        let document = self.store.insert_document(document)?;

        info!(
            document_id = %document.id,
            application_id = %application.id,
            document_type = document.document_type.as_str(),
            size_bytes = document.size_bytes,
            "document uploaded"
        );

        self.notifier.dispatch(NotificationDraft {
            recipient: self.notifier.admin().clone(),
            application_id: application.id,
            kind: NotificationType::DocumentReceived,
            subject: format!("New document for {}", application.application_number),
            body: format!(
                "{} ({}) was uploaded for application {}.",
                document.file_name,
                document.document_type.label(),
                application.application_number
            ),
            email_to: None,
        });
        self.reconcile_requests(&application);

        Ok(document)
    }

    /// All documents for an application, newest first.
    pub fn list_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Document>, WorkflowError> {
        let mut documents = self.store.documents_for_application(application_id)?;
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    /// Documents for an application that belong to `owner`, newest first.
    pub fn list_for_owner(
        &self,
        application_id: &ApplicationId,
        owner: &SubjectId,
    ) -> Result<Vec<Document>, WorkflowError> {
        let mut documents = self.list_for_application(application_id)?;
        documents.retain(|document| &document.owner_id == owner);
        Ok(documents)
    }

    /// Verify or reject an uploaded document. Reviewed documents are final.
    pub fn update_status(
        &self,
        document_id: &DocumentId,
        decision: ReviewDecision,
        actor: Option<SubjectId>,
    ) -> Result<Document, WorkflowError> {
        let rejection_reason = match &decision {
            ReviewDecision::Verify => None,
            ReviewDecision::Reject { reason } => {
                let reason = reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|reason| !reason.is_empty())
                    .ok_or_else(|| {
                        WorkflowError::validation(
                            "missing_rejection_reason",
                            "rejecting a document requires a rejection reason",
                        )
                    })?;
                Some(reason.to_string())
            }
        };

        let mut document = self
            .store
            .fetch_document(document_id)?
            .ok_or_else(|| WorkflowError::not_found("document", document_id))?;

        if document.status != DocumentStatus::Uploaded {
            return Err(already_reviewed(document_id));
        }

        match rejection_reason {
            None => {
                document.status = DocumentStatus::Verified;
                document.verified_at = Some(Utc::now());
                document.verified_by = actor;
            }
            Some(reason) => {
                document.status = DocumentStatus::Rejected;
                document.rejection_reason = Some(reason);
                document.verified_by = actor;
            }
        }
        let document = self
            .store
            .review_document(document, DocumentStatus::Uploaded)
            .map_err(|err| match err {
                RepositoryError::StaleDocument { .. } => already_reviewed(document_id),
                RepositoryError::NotFound => WorkflowError::not_found("document", document_id),
                other => WorkflowError::Repository(other),
            })?;

        info!(
            document_id = %document.id,
            status = ?document.status,
            "document reviewed"
        );

        let email_to = match self.store.fetch_application(&document.application_id) {
            Ok(application) => application.map(|application| application.applicant.email),
            Err(err) => {
                warn!(error = %err, "application lookup for review email failed");
                None
            }
        };
        self.notifier
            .dispatch(review_notification(&document, email_to));

        Ok(document)
    }

    /// Ask the customer for one or more document types by `due_date`.
    pub fn request_documents(
        &self,
        application_id: &ApplicationId,
        required: Vec<DocumentType>,
        due_date: NaiveDate,
        admin: SubjectId,
    ) -> Result<DocumentRequest, WorkflowError> {
        let mut seen = BTreeSet::new();
        let required: Vec<DocumentType> = required
            .into_iter()
            .filter(|kind| seen.insert(*kind))
            .collect();
        if required.is_empty() {
            return Err(WorkflowError::validation(
                "missing_document_types",
                "at least one document type is required",
            ));
        }

        let application = self.application(application_id)?;

        let request = DocumentRequest {
            id: DocumentRequestId::generate(),
            application_id: application.id,
            customer_id: application.customer_id.clone(),
            requested_by: admin,
            required_documents: required,
            due_date,
            status: DocumentRequestStatus::Pending,
            created_at: Utc::now(),
            fulfilled_at: None,
        };
        let request = self.store.insert_document_request(request)?;

        info!(
            request_id = %request.id,
            application_id = %application.id,
            documents = request.required_documents.len(),
            "documents requested"
        );

        let listing = request
            .required_documents
            .iter()
            .map(|kind| format!("- {}", kind.label()))
            .collect::<Vec<_>>()
            .join("\n");
        self.notifier.dispatch(NotificationDraft {
            recipient: application.customer_id.clone(),
            application_id: application.id,
            kind: NotificationType::DocumentRequest,
            subject: format!("Documents needed for {}", application.application_number),
            body: format!(
                "Please upload the following documents by {}:\n{}",
                request.due_date.format("%B %-d, %Y"),
                listing
            ),
            email_to: Some(application.applicant.email.clone()),
        });

        Ok(request)
    }

    pub fn document_requests(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<DocumentRequest>, WorkflowError> {
        self.application(application_id)?;
        let mut requests = self.store.document_requests_for_application(application_id)?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Check ownership and mint a short-lived retrieval URL.
    pub fn authorize_download(
        &self,
        document_id: &DocumentId,
        claimed_owner: &SubjectId,
    ) -> Result<DownloadGrant, WorkflowError> {
        let document = self
            .store
            .fetch_document(document_id)?
            .ok_or_else(|| WorkflowError::not_found("document", document_id))?;

        if document.owner_id.as_str() != claimed_owner.as_str() {
            warn!(
                document_id = %document.id,
                claimed_owner = %claimed_owner,
                "download refused: owner mismatch"
            );
            return Err(WorkflowError::forbidden(
                "document",
                document_id,
                claimed_owner,
            ));
        }

        let url = self
            .storage
            .signed_url(&document.storage_locator, self.settings.download_ttl)?;
        Ok(DownloadGrant { document, url })
    }

    pub fn download(
        &self,
        document_id: &DocumentId,
        claimed_owner: &SubjectId,
    ) -> Result<DownloadedFile, WorkflowError> {
        let DownloadGrant { document, url } = self.authorize_download(document_id, claimed_owner)?;
        let bytes = self.storage.fetch_signed(&url.url)?;
        Ok(DownloadedFile { document, bytes })
    }

    fn application(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.store
            .fetch_application(id)?
            .ok_or_else(|| WorkflowError::not_found("application", id))
    }

    /// Mark pending requests fulfilled once every requested type has a
    /// non-rejected document. Best-effort.
    fn reconcile_requests(&self, application: &Application) {
        let outcome = self
            .store
            .document_requests_for_application(&application.id)
            .and_then(|requests| {
                let documents = self.store.documents_for_application(&application.id)?;
                let available: BTreeSet<DocumentType> = documents
                    .iter()
                    .filter(|document| document.status != DocumentStatus::Rejected)
                    .map(|document| document.document_type)
                    .collect();

                for mut request in requests {
                    if request.status != DocumentRequestStatus::Pending {
                        continue;
                    }
                    if request
                        .required_documents
                        .iter()
                        .all(|kind| available.contains(kind))
                    {
                        request.status = DocumentRequestStatus::Fulfilled;
                        request.fulfilled_at = Some(Utc::now());
                        info!(request_id = %request.id, "document request fulfilled");
                        self.store.update_document_request(request)?;
                    }
                }
                Ok(())
            });

        if let Err(err) = outcome {
            warn!(
                error = %err,
                application_id = %application.id,
                "document request reconciliation failed"
            );
        }
    }
}

fn already_reviewed(document_id: &DocumentId) -> WorkflowError {
    WorkflowError::validation(
        "document_already_reviewed",
        format!("document {document_id} has already been reviewed"),
    )
}

fn review_notification(document: &Document, email_to: Option<String>) -> NotificationDraft {
    let (kind, subject, body) = match document.status {
        DocumentStatus::Rejected => (
            NotificationType::Rejection,
            format!("{} needs attention", document.document_type.label()),
            format!(
                "Your document {} was not accepted. Reason: {}. Please upload a replacement.",
                document.file_name,
                document.rejection_reason.as_deref().unwrap_or("not provided")
            ),
        ),
        _ => (
            NotificationType::Approval,
            format!("{} verified", document.document_type.label()),
            format!("Your document {} has been verified.", document.file_name),
        ),
    };

    NotificationDraft {
        recipient: document.owner_id.clone(),
        application_id: document.application_id,
        kind,
        subject,
        body,
        email_to,
    }
}

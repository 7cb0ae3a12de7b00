use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use super::domain::{
    format_application_number, ApplicantContact, Application, ApplicationId,
    ApplicationSubmission, ContractorStatus, DocumentStatus, NotificationType, PropertyDetails,
    StatusChange, StatusChangeId, StatusUpdate, SubjectId,
};
use super::error::WorkflowError;
use super::notifier::{Mailer, NotificationDraft, Notifier, OutboundEmail};
use super::repository::{RebateStore, RepositoryError};
use super::status::{is_valid_transition, ApplicationStatus};

/// Status change requested by an admin.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub new_status: ApplicationStatus,
    pub reason: Option<String>,
    pub actor: SubjectId,
}

/// Persisted result of a transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub application: Application,
    pub previous_status: ApplicationStatus,
    pub change: StatusChange,
}

/// Aggregate counts for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_applications: usize,
    pub active_applications: usize,
    pub applications_by_status: BTreeMap<ApplicationStatus, usize>,
    pub documents_awaiting_review: usize,
    pub pending_document_requests: usize,
    pub approved_contractors: usize,
    pub pending_contractors: usize,
}

/// Orchestrates intake and status transitions: state first, audit row second,
/// notification last.
pub struct ApplicationService<R, M> {
    store: Arc<R>,
    notifier: Notifier<R, M>,
}

impl<R, M> ApplicationService<R, M>
where
    R: RebateStore + 'static,
    M: Mailer + 'static,
{
    pub fn new(store: Arc<R>, notifier: Notifier<R, M>) -> Self {
        Self { store, notifier }
    }

    /// Create an application for an authenticated customer.
    pub fn submit(
        &self,
        customer: Option<SubjectId>,
        submission: ApplicationSubmission,
    ) -> Result<Application, WorkflowError> {
        let customer = customer.ok_or(WorkflowError::Unauthenticated)?;

        let name = required(&submission.name);
        let phone = required(&submission.phone);
        let email = required(&submission.email);
        let address = required(&submission.property_address);

        let missing: Vec<&str> = [
            ("name", name.is_none()),
            ("phone", phone.is_none()),
            ("email", email.is_none()),
            ("propertyAddress", address.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect();

        let (Some(name), Some(phone), Some(email), Some(address)) = (name, phone, email, address)
        else {
            return Err(WorkflowError::validation(
                "missing_fields",
                format!("missing required fields: {}", missing.join(", ")),
            ));
        };

        if let Some(amount) = submission.requested_amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(WorkflowError::validation(
                    "invalid_amount",
                    "requestedAmount must be a non-negative number",
                ));
            }
        }

        let sequence = self.store.next_application_number()?;
        let now = Utc::now();
        let application = Application {
            id: ApplicationId::generate(),
            application_number: format_application_number(sequence),
            customer_id: customer,
            status: ApplicationStatus::DocumentsRequested,
            eligibility_score: 0.0,
            requested_amount: submission.requested_amount,
            service_area: optional(submission.service_area),
            applicant: ApplicantContact { name, phone, email },
            property: PropertyDetails {
                address,
                property_type: optional(submission.property_type),
                hvac_type: optional(submission.hvac_type),
                home_size_sq_ft: submission.home_size_sq_ft,
                system_age_years: submission.system_age_years,
            },
            created_at: now,
            updated_at: now,
            approved_at: None,
            rejected_at: None,
            completed_at: None,
        };

        let stored = self.store.insert_application(application)?;
        info!(
            application_id = %stored.id,
            application_number = %stored.application_number,
            customer = %stored.customer_id,
            "application received"
        );

        self.notifier.send_email(OutboundEmail {
            to: stored.applicant.email.clone(),
            subject: format!("We received your rebate application {}", stored.application_number),
            body: format!(
                "Hi {},\n\nThanks for applying. Your application number is {}. \
                 We will let you know which documents we need next.",
                stored.applicant.name, stored.application_number
            ),
        });

        Ok(stored)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.store
            .fetch_application(id)?
            .ok_or_else(|| WorkflowError::not_found("application", id))
    }

    /// A customer's applications, newest first.
    pub fn list_for_customer(
        &self,
        customer: &SubjectId,
    ) -> Result<Vec<Application>, WorkflowError> {
        let mut applications = self.store.applications_for_customer(customer)?;
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(applications)
    }

    /// Validate and apply a status change.
    ///
    /// The status write and the audit row must both land for the call to
    /// succeed. The customer notification is best-effort and never unwinds
    /// either.
    pub fn transition(
        &self,
        id: &ApplicationId,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let current = self.get(id)?;
        let previous_status = current.status;

        if !is_valid_transition(previous_status, request.new_status) {
            return Err(WorkflowError::InvalidTransition {
                from: previous_status,
                to: request.new_status,
            });
        }

        let now = Utc::now();
        let update = StatusUpdate::entering(request.new_status, now);
        let application = self
            .store
            .update_application_status(id, previous_status, update)
            .map_err(|err| match err {
                RepositoryError::StaleStatus { found, .. } => WorkflowError::StaleStatus {
                    id: id.to_string(),
                    found,
                },
                RepositoryError::NotFound => WorkflowError::not_found("application", id),
                other => WorkflowError::Repository(other),
            })?;

        let reason = request
            .reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());
        let change = StatusChange {
            id: StatusChangeId::generate(),
            application_id: *id,
            from_status: previous_status,
            to_status: request.new_status,
            changed_by: request.actor,
            reason,
            changed_at: now,
        };

        if let Err(err) = self.store.append_status_change(change.clone()) {
            error!(
                error = %err,
                application_id = %id,
                from = %previous_status,
                to = %request.new_status,
                "status persisted without audit row; retry required"
            );
            return Err(err.into());
        }

        info!(
            application_id = %id,
            from = %previous_status,
            to = %request.new_status,
            actor = %change.changed_by,
            "application status changed"
        );

        self.notifier.dispatch(status_notification(&application, &change));

        Ok(TransitionOutcome {
            application,
            previous_status,
            change,
        })
    }

    /// Audit trail for an application, newest first.
    pub fn status_history(&self, id: &ApplicationId) -> Result<Vec<StatusChange>, WorkflowError> {
        self.get(id)?;
        let mut history = self.store.status_history(id)?;
        // Stable ascending sort, then reverse: rows sharing a timestamp keep
        // append order.
        history.sort_by(|a, b| a.changed_at.cmp(&b.changed_at));
        history.reverse();
        Ok(history)
    }

    pub fn record_eligibility(
        &self,
        id: &ApplicationId,
        score: f64,
    ) -> Result<Application, WorkflowError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(WorkflowError::validation(
                "invalid_score",
                "eligibility score must be between 0.0 and 1.0",
            ));
        }
        self.store
            .update_eligibility_score(id, score)
            .map_err(|err| match err {
                RepositoryError::NotFound => WorkflowError::not_found("application", id),
                other => WorkflowError::Repository(other),
            })
    }

    pub fn dashboard_stats(&self) -> Result<DashboardStats, WorkflowError> {
        let applications_by_status = self.store.application_status_counts()?;
        let total_applications = applications_by_status.values().sum();
        let active_applications = applications_by_status
            .iter()
            .filter(|(status, _)| !status.is_terminal())
            .map(|(_, count)| count)
            .sum();

        let contractors = self.store.contractors()?;
        let approved_contractors = contractors
            .iter()
            .filter(|contractor| contractor.is_matchable())
            .count();
        let pending_contractors = contractors
            .iter()
            .filter(|contractor| contractor.status == ContractorStatus::Pending)
            .count();

        Ok(DashboardStats {
            total_applications,
            active_applications,
            applications_by_status,
            documents_awaiting_review: self
                .store
                .count_documents_with_status(DocumentStatus::Uploaded)?,
            pending_document_requests: self.store.count_pending_document_requests()?,
            approved_contractors,
            pending_contractors,
        })
    }
}

fn status_notification(application: &Application, change: &StatusChange) -> NotificationDraft {
    let mut body = format!(
        "Your application {} is now: {}.",
        application.application_number,
        change.to_status.label()
    );
    if let Some(reason) = &change.reason {
        body.push_str(&format!(" Reason: {reason}"));
    }

    NotificationDraft {
        recipient: application.customer_id.clone(),
        application_id: application.id,
        kind: NotificationType::StatusUpdate,
        subject: format!(
            "Application {} status update",
            application.application_number
        ),
        body,
        email_to: Some(application.applicant.email.clone()),
    }
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn optional(value: Option<String>) -> Option<String> {
    required(&value)
}

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{ApplicationId, Notification, NotificationId, NotificationType, SubjectId};
use super::error::WorkflowError;
use super::repository::NotificationRepository;

/// Outbound e-mail hook (SMTP relay, transactional provider, log sink).
pub trait Mailer: Send + Sync {
    fn send(&self, email: OutboundEmail) -> Result<(), MailError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),
}

/// Notification to record (and optionally e-mail) after a primary write.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient: SubjectId,
    pub application_id: ApplicationId,
    pub kind: NotificationType,
    pub subject: String,
    pub body: String,
    pub email_to: Option<String>,
}

/// Failure-isolated dispatcher. Every method here swallows collaborator
/// errors after logging them; callers have already committed their state.
pub struct Notifier<R, M> {
    store: Arc<R>,
    mailer: Arc<M>,
    admin: SubjectId,
}

impl<R, M> Clone for Notifier<R, M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            mailer: self.mailer.clone(),
            admin: self.admin.clone(),
        }
    }
}

impl<R, M> Notifier<R, M>
where
    R: NotificationRepository + 'static,
    M: Mailer + 'static,
{
    pub fn new(store: Arc<R>, mailer: Arc<M>, admin: SubjectId) -> Self {
        Self {
            store,
            mailer,
            admin,
        }
    }

    /// Subject that receives admin-channel notifications.
    pub fn admin(&self) -> &SubjectId {
        &self.admin
    }

    pub fn dispatch(&self, draft: NotificationDraft) -> Option<Notification> {
        let NotificationDraft {
            recipient,
            application_id,
            kind,
            subject,
            body,
            email_to,
        } = draft;

        let notification = Notification {
            id: NotificationId::generate(),
            recipient_id: recipient,
            application_id,
            kind,
            subject,
            body,
            read: false,
            read_at: None,
            email_sent: false,
            email_sent_at: None,
            created_at: Utc::now(),
        };

        let mut stored = match self.store.insert_notification(notification) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    error = %err,
                    application_id = %application_id,
                    kind = ?kind,
                    "notification not recorded"
                );
                return None;
            }
        };

        if let Some(to) = email_to {
            let email = OutboundEmail {
                to,
                subject: stored.subject.clone(),
                body: stored.body.clone(),
            };
            if self.send_email(email) {
                stored.email_sent = true;
                stored.email_sent_at = Some(Utc::now());
                if let Err(err) = self.store.update_notification(stored.clone()) {
                    warn!(error = %err, notification_id = %stored.id, "email flag not persisted");
                }
            }
        }

        debug!(notification_id = %stored.id, recipient = %stored.recipient_id, "notification recorded");
        Some(stored)
    }

    /// Best-effort e-mail; returns whether the transport accepted it.
    pub fn send_email(&self, email: OutboundEmail) -> bool {
        let to = email.to.clone();
        match self.mailer.send(email) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, to = %to, "outbound email failed");
                false
            }
        }
    }

    /// Inbox for a subject, newest first.
    pub fn inbox(&self, recipient: &SubjectId) -> Result<Vec<Notification>, WorkflowError> {
        let mut notifications = self.store.notifications_for(recipient)?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    /// Mark a notification read. Only its recipient or the admin subject may.
    pub fn mark_read(
        &self,
        id: &NotificationId,
        reader: &SubjectId,
    ) -> Result<Notification, WorkflowError> {
        let mut notification = self
            .store
            .fetch_notification(id)?
            .ok_or_else(|| WorkflowError::not_found("notification", id))?;

        if &notification.recipient_id != reader && reader != &self.admin {
            return Err(WorkflowError::forbidden("notification", id, reader));
        }

        if !notification.read {
            notification.read = true;
            notification.read_at = Some(Utc::now());
            self.store.update_notification(notification.clone())?;
        }
        Ok(notification)
    }
}

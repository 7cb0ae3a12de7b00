use std::sync::Arc;

use chrono::Duration;

use crate::config::{WorkflowConfig, MAX_DOWNLOAD_TTL_SECS};

use super::documents::{DocumentSettings, DocumentWorkflow};
use super::domain::SubjectId;
use super::matching::{ContractorDirectory, DEFAULT_MATCH_LIMIT};
use super::notifier::{Mailer, Notifier};
use super::repository::RebateStore;
use super::service::ApplicationService;
use super::storage::FileStorage;

/// Tunables shared by the rebate services.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub admin_subject: SubjectId,
    pub documents: DocumentSettings,
    pub match_limit: usize,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            admin_subject: SubjectId::canonical("admin"),
            documents: DocumentSettings::default(),
            match_limit: DEFAULT_MATCH_LIMIT,
        }
    }
}

impl From<&WorkflowConfig> for PlatformSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            admin_subject: SubjectId::canonical(&config.admin_subject),
            documents: DocumentSettings {
                download_ttl: download_ttl(config.download_ttl_secs),
                max_upload_bytes: config.max_upload_bytes,
            },
            match_limit: config.match_limit,
        }
    }
}

/// Clamped to the configured ceiling; values past it never reach chrono.
fn download_ttl(secs: u64) -> Duration {
    i64::try_from(secs.min(MAX_DOWNLOAD_TTL_SECS))
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| DocumentSettings::default().download_ttl)
}

/// Service bundle handed to the HTTP router.
pub struct RebatePlatform<R, S, M> {
    pub applications: ApplicationService<R, M>,
    pub documents: DocumentWorkflow<R, S, M>,
    pub contractors: ContractorDirectory<R>,
    pub notifications: Notifier<R, M>,
}

impl<R, S, M> RebatePlatform<R, S, M>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    pub fn new(store: Arc<R>, storage: Arc<S>, mailer: Arc<M>, settings: PlatformSettings) -> Self {
        let notifier = Notifier::new(store.clone(), mailer, settings.admin_subject);
        Self {
            applications: ApplicationService::new(store.clone(), notifier.clone()),
            documents: DocumentWorkflow::new(
                store.clone(),
                storage,
                notifier.clone(),
                settings.documents,
            ),
            contractors: ContractorDirectory::new(store, settings.match_limit),
            notifications: notifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow_config(download_ttl_secs: u64) -> WorkflowConfig {
        WorkflowConfig {
            admin_subject: "ops-lead".to_string(),
            download_ttl_secs,
            max_upload_bytes: 1024,
            match_limit: 3,
            storage_secret: "secret".to_string(),
        }
    }

    #[test]
    fn settings_follow_workflow_config() {
        let settings = PlatformSettings::from(&workflow_config(90));
        assert_eq!(settings.documents.download_ttl, Duration::seconds(90));
        assert_eq!(settings.documents.max_upload_bytes, 1024);
        assert_eq!(settings.match_limit, 3);
        assert_eq!(settings.admin_subject, SubjectId::canonical("ops-lead"));
    }

    #[test]
    fn oversized_ttl_is_clamped() {
        let settings = PlatformSettings::from(&workflow_config(u64::MAX / 2));
        assert_eq!(
            settings.documents.download_ttl,
            Duration::seconds(MAX_DOWNLOAD_TTL_SECS as i64)
        );
    }
}

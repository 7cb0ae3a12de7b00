use metrics_exporter_prometheus::PrometheusHandle;
use rebate_tracker::config::WorkflowConfig;
use rebate_tracker::workflows::rebate::{
    InMemoryFileStorage, InMemoryRebateStore, MailError, Mailer, OutboundEmail, PlatformSettings,
    RebatePlatform,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ServicePlatform = RebatePlatform<InMemoryRebateStore, InMemoryFileStorage, LogMailer>;

/// Mailer that records outbound messages in the service log instead of
/// handing them to a relay.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        if !email.to.contains('@') {
            return Err(MailError::InvalidAddress(email.to));
        }
        info!(to = %email.to, subject = %email.subject, "outbound email");
        Ok(())
    }
}

pub(crate) fn in_memory_platform(config: &WorkflowConfig) -> Arc<ServicePlatform> {
    Arc::new(RebatePlatform::new(
        Arc::new(InMemoryRebateStore::default()),
        Arc::new(InMemoryFileStorage::new(config.storage_secret.clone())),
        Arc::new(LogMailer),
        PlatformSettings::from(config),
    ))
}

pub(crate) fn parse_amount(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse()
        .map_err(|err| format!("failed to parse '{raw}' as an amount ({err})"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("amount must be a non-negative number (got '{raw}')"));
    }
    Ok(value)
}

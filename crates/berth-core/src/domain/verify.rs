use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use berth_model::Tenant;

use crate::{
    domain::{DomainChallenge, RecordType},
    error::{CoreError, DnsError},
    metrics::{MetricsHandle, noop_metrics},
    progress::ProgressSink,
};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// DNS lookups needed by the verification loop.
///
/// A name with no records resolves to an empty list, not an error.
#[async_trait]
pub trait DnsResolver: Send + Sync + 'static {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;

    async fn resolve_cname(&self, _name: &str) -> Result<Vec<String>, DnsError> {
        Err(DnsError::Unsupported("CNAME"))
    }
}

/// Polling configuration of the verification loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Sleep between two lookups.
    pub interval_ms: u64,
    /// Give up after this long. `None` polls until the record appears or the operation is
    /// cancelled.
    pub max_duration_ms: Option<u64>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_duration_ms: None,
        }
    }
}

impl VerifyConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}

/// Proof that a challenge was found in DNS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verified {
    /// Number of lookups it took.
    pub attempts: u32,
}

/// Polls DNS until a domain challenge is visible.
#[derive(Clone)]
pub struct Verifier {
    resolver: Arc<dyn DnsResolver>,
    config: VerifyConfig,
    metrics: MetricsHandle,
}

impl Verifier {
    pub fn new(resolver: Arc<dyn DnsResolver>, config: VerifyConfig) -> Self {
        Self {
            resolver,
            config,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Verify ownership of `domain` by `tenant` through its TXT challenge.
    ///
    /// Tells the tenant which record to publish, then polls for it.
    pub async fn verify_domain(
        &self,
        domain: &str,
        tenant: &Tenant,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Verified, CoreError> {
        let challenge =
            DomainChallenge::txt(domain, tenant).with_poll_interval(self.config.interval());
        progress
            .progress(format!("to verify '{}', publish a {challenge}", challenge.domain))
            .await;
        self.verify(&challenge, progress, cancel).await
    }

    /// Poll until the challenge value is resolved.
    ///
    /// Never returns without a match: the loop ends on a match, on a resolver error, on
    /// cancellation (`Aborted`) or, only when a maximum duration is configured, with
    /// `VerificationTimeout`. Cancellation is honoured during lookups and sleeps.
    #[instrument(skip_all, fields(domain = %challenge.domain, record = %challenge.record_name))]
    pub async fn verify(
        &self,
        challenge: &DomainChallenge,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Verified, CoreError> {
        let started = Instant::now();
        let max = self.config.max_duration();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Aborted("verification"));
            }
            attempts += 1;

            let lookup = async {
                match challenge.record_type {
                    RecordType::Txt => self.resolver.resolve_txt(&challenge.record_name).await,
                    RecordType::Cname => self.resolver.resolve_cname(&challenge.record_name).await,
                }
            };
            let values = tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::Aborted("verification")),
                values = lookup => values?,
            };

            let matched = challenge.matches(&values);
            self.metrics.record_dns_poll(matched);
            if matched {
                info!(attempts, "domain verified");
                progress
                    .progress(format!("domain '{}' verified", challenge.domain))
                    .await;
                return Ok(Verified { attempts });
            }
            debug!(attempts, found = values.len(), "challenge not visible yet");

            if let Some(max) = max {
                if started.elapsed() >= max {
                    return Err(CoreError::VerificationTimeout {
                        domain: challenge.domain.clone(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }

            progress
                .progress(format!(
                    "checking {} for domain '{}' (attempt {attempts}), retrying in {}s",
                    challenge.record_name,
                    challenge.domain,
                    challenge.poll_interval.as_secs_f32(),
                ))
                .await;

            tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::Aborted("verification")),
                _ = sleep(challenge.poll_interval) => {}
            }
        }
    }
}

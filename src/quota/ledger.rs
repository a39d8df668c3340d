use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::QuotaConfig;

use super::clock::{Clock, SystemClock};
use super::record::{QuotaRecord, ReadResult, VersionToken};
use super::store::{QuotaStore, StoreError};

/// Decision returned to the caller of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The metered work may proceed; the increment is already persisted
    Allowed { remaining: u64 },
    /// Quota for the current period is exhausted
    Denied,
    /// No durable decision within the retry budget. Callers must fail closed.
    Unavailable,
}

impl Outcome {
    #[cfg(test)]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Outcome::Allowed { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            Outcome::Allowed { .. } => "allowed",
            Outcome::Denied => "denied",
            Outcome::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub default_limit: u64,
    pub period: Duration,
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Applied to each individual store call
    pub store_timeout: StdDuration,
}

impl From<&QuotaConfig> for LedgerSettings {
    fn from(config: &QuotaConfig) -> Self {
        Self {
            default_limit: config.limit,
            period: Duration::days(i64::from(config.period_days)),
            max_attempts: config.max_attempts,
            store_timeout: StdDuration::from_millis(config.store_timeout_ms),
        }
    }
}

/// Read-only view of an identity's consumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UsageSnapshot {
    pub identity: String,
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub period_start: DateTime<Utc>,
    pub resets_at: DateTime<Utc>,
}

enum Attempt {
    Committed { remaining: u64 },
    /// A write from an earlier attempt of this call turned out to have landed
    Recovered { remaining: u64 },
    Exhausted,
    Retry(StoreError),
}

/// Per-identity quota gate over a conditional-write record store
pub struct QuotaLedger {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn QuotaStore>, settings: LedgerSettings) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// [`Self::check_and_increment`] with the configured limit and period
    pub async fn check_and_increment_default(&self, identity: &str) -> Outcome {
        self.check_and_increment(identity, self.settings.default_limit, self.settings.period)
            .await
    }

    /// Decide whether one more metered operation is allowed for `identity` and,
    /// if so, persist the increment before returning.
    ///
    /// Each attempt reads the record, applies period rollover, checks the limit
    /// and writes conditioned on the version it read. A lost race or a failed
    /// store call starts a new attempt; after `max_attempts` the result is
    /// [`Outcome::Unavailable`]. Denials never write.
    ///
    /// Every write carries a token issued here. When a later attempt reads back
    /// one of those tokens, the earlier write committed even though its reply
    /// was lost, and the call is answered from it instead of charging again.
    pub async fn check_and_increment(
        &self,
        identity: &str,
        limit: u64,
        period: Duration,
    ) -> Outcome {
        let outcome = if limit == 0 {
            Outcome::Denied
        } else {
            self.run_attempts(identity, limit, period).await
        };

        metrics::counter!("quota_checks_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn run_attempts(&self, identity: &str, limit: u64, period: Duration) -> Outcome {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut issued = Vec::new();

        for attempt in 1..=max_attempts {
            match self.attempt(identity, limit, period, &mut issued).await {
                Attempt::Committed { remaining } => {
                    tracing::debug!(identity, attempt, remaining, "Quota consumed");
                    return Outcome::Allowed { remaining };
                }
                Attempt::Recovered { remaining } => {
                    tracing::info!(
                        identity,
                        attempt,
                        remaining,
                        "Earlier quota write had committed, not charging again"
                    );
                    return Outcome::Allowed { remaining };
                }
                Attempt::Exhausted => {
                    tracing::info!(identity, limit, "Quota exhausted");
                    return Outcome::Denied;
                }
                Attempt::Retry(StoreError::Conflict(_)) => {
                    metrics::counter!("quota_write_conflicts_total").increment(1);
                    tracing::debug!(identity, attempt, "Quota write lost a race, retrying");
                }
                Attempt::Retry(err) => {
                    tracing::warn!(identity, attempt, error = %err, "Quota store call failed");
                }
            }
        }

        tracing::warn!(
            identity,
            attempts = max_attempts,
            "Quota decision unavailable, failing closed"
        );
        Outcome::Unavailable
    }

    async fn attempt(
        &self,
        identity: &str,
        limit: u64,
        period: Duration,
        issued: &mut Vec<VersionToken>,
    ) -> Attempt {
        let now = self.clock.now();

        let read = match self.bounded(self.store.fetch(identity)).await {
            Ok(found) => ReadResult::from(found),
            Err(err) => return Attempt::Retry(err),
        };

        let (mut record, version) = match read {
            ReadResult::Fresh => (QuotaRecord::fresh(identity, now), None),
            ReadResult::Existing(stored) if issued.contains(&stored.version) => {
                return Attempt::Recovered {
                    remaining: limit.saturating_sub(stored.record.used),
                };
            }
            ReadResult::Existing(stored) => {
                (stored.record.rolled_over(now, period), Some(stored.version))
            }
        };

        if record.used >= limit {
            return Attempt::Exhausted;
        }
        record.used += 1;

        let next = VersionToken::generate();
        issued.push(next.clone());
        let written = match &version {
            None => self.bounded(self.store.create(&record, &next)).await,
            Some(expected) => self.bounded(self.store.replace(&record, expected, &next)).await,
        };

        match written {
            Ok(_) => Attempt::Committed {
                remaining: limit - record.used,
            },
            Err(err) => Attempt::Retry(err),
        }
    }

    /// Current consumption without writing anything
    pub async fn usage(
        &self,
        identity: &str,
        limit: u64,
        period: Duration,
    ) -> Result<UsageSnapshot, StoreError> {
        let now = self.clock.now();
        let record = match self.bounded(self.store.fetch(identity)).await? {
            Some(stored) => stored.record.rolled_over(now, period),
            None => QuotaRecord::fresh(identity, now),
        };

        Ok(UsageSnapshot {
            identity: record.identity.clone(),
            used: record.used,
            limit,
            remaining: limit.saturating_sub(record.used),
            period_start: record.period_start,
            resets_at: record.resets_at(period),
        })
    }

    pub async fn usage_default(&self, identity: &str) -> Result<UsageSnapshot, StoreError> {
        self.usage(identity, self.settings.default_limit, self.settings.period)
            .await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let limit = self.settings.store_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| StoreError::Timeout(limit))?
    }
}

//! Lease timing for a registered instance
//!
//! A [`LeaseInfo`] is an immutable snapshot. Every change goes through
//! [`LeaseInfo::to_builder`] and produces a new value, so a snapshot can be
//! shared freely between the heartbeat task and readers.
//!
//! Timestamps are milliseconds since the Unix epoch; `0` means unset.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default renewal interval in seconds
pub const DEFAULT_RENEWAL_INTERVAL_SECS: u32 = 30;

/// Default lease duration in seconds
pub const DEFAULT_DURATION_SECS: u32 = 90;

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Lease of a registered instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "LeaseRecord")]
pub struct LeaseInfo {
    #[serde(rename = "renewalIntervalInSecs")]
    renewal_interval_secs: u32,
    #[serde(rename = "durationInSecs")]
    duration_secs: u32,
    registration_timestamp: i64,
    #[serde(rename = "lastRenewalTimestamp")]
    renewal_timestamp: i64,
    eviction_timestamp: i64,
    service_up_timestamp: i64,
}

impl Default for LeaseInfo {
    fn default() -> Self {
        Self {
            renewal_interval_secs: DEFAULT_RENEWAL_INTERVAL_SECS,
            duration_secs: DEFAULT_DURATION_SECS,
            registration_timestamp: 0,
            renewal_timestamp: 0,
            eviction_timestamp: 0,
            service_up_timestamp: 0,
        }
    }
}

impl LeaseInfo {
    /// Start building a lease with default timings
    pub fn builder() -> LeaseInfoBuilder {
        LeaseInfoBuilder::default()
    }

    /// A builder seeded with this snapshot's values
    pub fn to_builder(&self) -> LeaseInfoBuilder {
        LeaseInfoBuilder { lease: *self }
    }

    /// Seconds between renewals
    pub fn renewal_interval_secs(&self) -> u32 {
        self.renewal_interval_secs
    }

    /// Seconds after the last renewal before the lease expires
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Renewal interval as a [`Duration`]
    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.renewal_interval_secs))
    }

    /// Lease duration as a [`Duration`]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_secs))
    }

    /// When the instance was first registered
    pub fn registration_timestamp(&self) -> i64 {
        self.registration_timestamp
    }

    /// When the lease was last renewed
    pub fn renewal_timestamp(&self) -> i64 {
        self.renewal_timestamp
    }

    /// When the instance was evicted
    pub fn eviction_timestamp(&self) -> i64 {
        self.eviction_timestamp
    }

    /// When the instance was marked up
    pub fn service_up_timestamp(&self) -> i64 {
        self.service_up_timestamp
    }

    /// Epoch millis at which the lease lapses without another renewal
    pub fn expires_at(&self) -> i64 {
        self.renewal_timestamp
            .saturating_add(i64::from(self.duration_secs) * 1000)
    }

    /// Whether the lease is evicted or lapsed at `now` (epoch millis)
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.eviction_timestamp > 0 || now > self.expires_at()
    }

    /// A copy of this lease renewed at `timestamp`
    pub fn renewed_at(&self, timestamp: i64) -> Self {
        self.to_builder().renewal_timestamp(timestamp).build()
    }
}

/// Builder for [`LeaseInfo`]
///
/// Non-positive intervals and durations fall back to the defaults instead of
/// failing.
#[derive(Debug, Clone, Default)]
pub struct LeaseInfoBuilder {
    lease: LeaseInfo,
}

impl LeaseInfoBuilder {
    /// Set the renewal interval; non-positive values select the default
    pub fn renewal_interval_secs(mut self, secs: i64) -> Self {
        self.lease.renewal_interval_secs = positive_or(secs, DEFAULT_RENEWAL_INTERVAL_SECS);
        self
    }

    /// Set the lease duration; non-positive values select the default
    pub fn duration_secs(mut self, secs: i64) -> Self {
        self.lease.duration_secs = positive_or(secs, DEFAULT_DURATION_SECS);
        self
    }

    /// Set the registration timestamp
    pub fn registration_timestamp(mut self, timestamp: i64) -> Self {
        self.lease.registration_timestamp = timestamp;
        self
    }

    /// Set the last renewal timestamp
    pub fn renewal_timestamp(mut self, timestamp: i64) -> Self {
        self.lease.renewal_timestamp = timestamp;
        self
    }

    /// Set the eviction timestamp
    pub fn eviction_timestamp(mut self, timestamp: i64) -> Self {
        self.lease.eviction_timestamp = timestamp;
        self
    }

    /// Set the service-up timestamp
    pub fn service_up_timestamp(mut self, timestamp: i64) -> Self {
        self.lease.service_up_timestamp = timestamp;
        self
    }

    /// Finish the snapshot
    pub fn build(self) -> LeaseInfo {
        self.lease
    }
}

fn positive_or(value: i64, default: u32) -> u32 {
    if value <= 0 {
        default
    } else {
        u32::try_from(value).unwrap_or(u32::MAX)
    }
}

/// Wire form accepted on input
///
/// Older registries wrote the last renewal as `renewalTimestamp`; both
/// names are read, the canonical one wins.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaseRecord {
    #[serde(default)]
    renewal_interval_in_secs: i64,
    #[serde(default)]
    duration_in_secs: i64,
    #[serde(default)]
    registration_timestamp: i64,
    #[serde(default)]
    last_renewal_timestamp: Option<i64>,
    #[serde(default)]
    renewal_timestamp: Option<i64>,
    #[serde(default)]
    eviction_timestamp: i64,
    #[serde(default)]
    service_up_timestamp: i64,
}

impl From<LeaseRecord> for LeaseInfo {
    fn from(record: LeaseRecord) -> Self {
        let renewal = record
            .last_renewal_timestamp
            .or(record.renewal_timestamp)
            .unwrap_or(0);

        LeaseInfo::builder()
            .renewal_interval_secs(record.renewal_interval_in_secs)
            .duration_secs(record.duration_in_secs)
            .registration_timestamp(record.registration_timestamp)
            .renewal_timestamp(renewal)
            .eviction_timestamp(record.eviction_timestamp)
            .service_up_timestamp(record.service_up_timestamp)
            .build()
    }
}

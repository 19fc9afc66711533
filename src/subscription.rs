//! Subscription tiers and usage metering.
//!
//! Billing itself lives outside this crate. The conversion service only needs
//! to ask whether a user may perform an action and to report what was done,
//! which is the [`UsageTracker`] capability.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Studio,
}

/// Something a user can ask the backend to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// One image or PDF conversion.
    Conversion,
    /// One batch run, regardless of how many files it holds.
    BatchProcessing,
    WatermarkFree,
    CloudStorage,
    KdpIntegration,
    PrioritySupport,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Self::Conversion,
        Self::BatchProcessing,
        Self::WatermarkFree,
        Self::CloudStorage,
        Self::KdpIntegration,
        Self::PrioritySupport,
    ];
}

/// What a tier allows. `None` limits are unlimited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierLimits {
    pub name: &'static str,
    pub monthly_conversions: Option<u32>,
    pub batch_processing_limit: Option<u32>,
    pub watermark_free: bool,
    pub priority_support: bool,
    pub advanced_features: bool,
    pub cloud_storage: bool,
    pub kdp_integration: bool,
    pub price: f64,
}

static FREE: TierLimits = TierLimits {
    name: "Free",
    monthly_conversions: Some(5),
    batch_processing_limit: Some(1),
    watermark_free: false,
    priority_support: false,
    advanced_features: false,
    cloud_storage: false,
    kdp_integration: false,
    price: 0.0,
};

static PRO: TierLimits = TierLimits {
    name: "Pro",
    monthly_conversions: None,
    batch_processing_limit: Some(10),
    watermark_free: true,
    priority_support: true,
    advanced_features: true,
    cloud_storage: true,
    kdp_integration: true,
    price: 19.99,
};

static STUDIO: TierLimits = TierLimits {
    name: "Studio",
    monthly_conversions: None,
    batch_processing_limit: None,
    watermark_free: true,
    priority_support: true,
    advanced_features: true,
    cloud_storage: true,
    kdp_integration: true,
    price: 49.99,
};

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 3] = [Self::Free, Self::Pro, Self::Studio];

    pub fn limits(&self) -> &'static TierLimits {
        match self {
            Self::Free => &FREE,
            Self::Pro => &PRO,
            Self::Studio => &STUDIO,
        }
    }
}

/// Counters for the current billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Usage {
    pub conversions: u32,
    pub batch_operations: u32,
}

/// Remaining allowance in the current cycle; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub conversions: Option<u32>,
    pub batch_operations: Option<u32>,
}

impl Usage {
    pub fn remaining(&self, limits: &TierLimits) -> Remaining {
        Remaining {
            conversions: limits
                .monthly_conversions
                .map(|max| max.saturating_sub(self.conversions)),
            batch_operations: limits
                .batch_processing_limit
                .map(|max| max.saturating_sub(self.batch_operations)),
        }
    }

    fn record(&mut self, action: Action) {
        match action {
            Action::Conversion => self.conversions += 1,
            Action::BatchProcessing => self.batch_operations += 1,
            _ => {}
        }
    }

    fn release(&mut self, action: Action) {
        match action {
            Action::Conversion => self.conversions = self.conversions.saturating_sub(1),
            Action::BatchProcessing => {
                self.batch_operations = self.batch_operations.saturating_sub(1)
            }
            _ => {}
        }
    }
}

impl TierLimits {
    /// Whether this tier allows `action` given the usage so far.
    ///
    /// # Example
    /// ```
    /// use colorbook::subscription::{Action, SubscriptionTier, Usage};
    ///
    /// let free = SubscriptionTier::Free.limits();
    /// let used = Usage { conversions: 4, batch_operations: 0 };
    /// assert!(free.permits(Action::Conversion, &used));
    /// assert!(!free.permits(Action::BatchProcessing, &used));
    /// ```
    pub fn permits(&self, action: Action, usage: &Usage) -> bool {
        match action {
            Action::Conversion => self
                .monthly_conversions
                .is_none_or(|max| usage.conversions < max),
            Action::BatchProcessing => {
                self.advanced_features
                    && self
                        .batch_processing_limit
                        .is_none_or(|max| usage.batch_operations < max)
            }
            Action::WatermarkFree => self.watermark_free,
            Action::CloudStorage => self.cloud_storage,
            Action::KdpIntegration => self.kdp_integration,
            Action::PrioritySupport => self.priority_support,
        }
    }
}

/// Metering capability injected into the conversion service.
pub trait UsageTracker: Send + Sync {
    fn tier(&self, user_id: &str) -> SubscriptionTier;

    fn usage(&self, user_id: &str) -> Usage;

    /// Records that `user_id` performed `action`.
    fn record(&self, user_id: &str, action: Action);

    /// Takes back one earlier [`UsageTracker::record`] or successful
    /// [`UsageTracker::try_acquire`] of `action`.
    fn release(&self, user_id: &str, action: Action);

    fn can_perform(&self, user_id: &str, action: Action) -> bool {
        self.tier(user_id)
            .limits()
            .permits(action, &self.usage(user_id))
    }

    /// Checks the quota and records `action` in one step. Returns `false`
    /// without recording anything when the tier does not permit it.
    ///
    /// Trackers shared between threads must override this so the check and the
    /// increment happen atomically.
    fn try_acquire(&self, user_id: &str, action: Action) -> bool {
        if !self.can_perform(user_id, action) {
            return false;
        }
        self.record(user_id, action);
        true
    }
}

/// Tracker that allows everything and remembers nothing, for anonymous or
/// internal callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl UsageTracker for Unmetered {
    fn tier(&self, _user_id: &str) -> SubscriptionTier {
        SubscriptionTier::Studio
    }

    fn usage(&self, _user_id: &str) -> Usage {
        Usage::default()
    }

    fn record(&self, _user_id: &str, _action: Action) {}

    fn release(&self, _user_id: &str, _action: Action) {}

    fn can_perform(&self, _user_id: &str, _action: Action) -> bool {
        true
    }
}

/// Process-local tracker. Users without an assigned tier are on
/// [`SubscriptionTier::Free`].
#[derive(Debug, Default)]
pub struct InMemoryUsageTracker {
    tiers: Mutex<HashMap<String, SubscriptionTier>>,
    usage: Mutex<HashMap<String, Usage>>,
}

impl InMemoryUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tier(&self, user_id: &str, tier: SubscriptionTier) {
        debug!("User {} moved to {:?}", user_id, tier);
        match self.tiers.lock() {
            Ok(mut tiers) => {
                tiers.insert(user_id.to_string(), tier);
            }
            Err(_) => warn!("Tier table poisoned; {} keeps its tier", user_id),
        }
    }

    /// Starts a new billing cycle for everyone.
    pub fn reset_cycle(&self) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.clear();
        }
    }
}

impl UsageTracker for InMemoryUsageTracker {
    fn tier(&self, user_id: &str) -> SubscriptionTier {
        self.tiers
            .lock()
            .ok()
            .and_then(|tiers| tiers.get(user_id).copied())
            .unwrap_or_default()
    }

    fn usage(&self, user_id: &str) -> Usage {
        self.usage
            .lock()
            .ok()
            .and_then(|usage| usage.get(user_id).copied())
            .unwrap_or_default()
    }

    fn record(&self, user_id: &str, action: Action) {
        match self.usage.lock() {
            Ok(mut usage) => usage.entry(user_id.to_string()).or_default().record(action),
            Err(_) => warn!("Usage table poisoned; dropping {:?} for {}", action, user_id),
        }
    }

    fn release(&self, user_id: &str, action: Action) {
        match self.usage.lock() {
            Ok(mut usage) => {
                if let Some(entry) = usage.get_mut(user_id) {
                    entry.release(action);
                }
            }
            Err(_) => warn!("Usage table poisoned; cannot release {:?} for {}", action, user_id),
        }
    }

    fn try_acquire(&self, user_id: &str, action: Action) -> bool {
        let limits = self.tier(user_id).limits();
        match self.usage.lock() {
            Ok(mut usage) => {
                let entry = usage.entry(user_id.to_string()).or_default();
                if !limits.permits(action, entry) {
                    return false;
                }
                entry.record(action);
                true
            }
            Err(_) => {
                warn!("Usage table poisoned; denying {:?} for {}", action, user_id);
                false
            }
        }
    }
}

//! In-process metrics counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: HashMap<String, u64>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: HashMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    pub async fn increment(&self, name: &str, value: u64) {
        let mut inner = self.inner.write().await;
        *inner.counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.counters.get(name).copied().unwrap_or(0)
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            uptime_secs: inner.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub uptime_secs: u64,
}

/// Predefined metric names
pub mod metrics {
    // Orders
    pub const ORDER_CREATED: &str = "order_created_total";
    pub const ORDER_STATUS_UPDATED: &str = "order_status_updated_total";

    // Reconciliation
    pub const TRADE_VERIFIED: &str = "trade_verified_total";
    pub const TRADE_VERIFY_REJECTED: &str = "trade_verify_rejected_total";

    // Bot session
    pub const BOT_LOGIN_OK: &str = "bot_login_total";
    pub const BOT_LOGIN_FAILED: &str = "bot_login_failed_total";

    // Offers
    pub const OFFER_ACCEPTED: &str = "offer_accepted_total";
    pub const OFFER_DECLINED: &str = "offer_declined_total";
}

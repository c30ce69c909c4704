use std::sync::atomic::Ordering::Relaxed;
use std::sync::{atomic::AtomicBool, Arc};
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

use crate::server_config::cfg;

/// Pacing for calls to the generative backend. A remote 429 flips the
/// backoff flag for 60 seconds; while it is set, prompt callers skip the
/// backend entirely and take the deterministic fallback path instead of
/// queueing behind the bucket.
#[derive(Clone)]
pub struct RateLimiters {
    prompt: Arc<RateLimiter>,
    backoff: Arc<AtomicBool>,
    backoff_duration: Duration,
}

impl RateLimiters {
    pub fn new(limit_per_sec: usize, interval_ms: usize, refill: usize) -> Self {
        let prompt = RateLimiter::builder()
            .initial(1)
            .interval(Duration::from_millis(interval_ms as u64))
            .max(limit_per_sec)
            .refill(refill)
            .build();

        Self {
            prompt: Arc::new(prompt),
            backoff: Arc::new(AtomicBool::new(false)),
            backoff_duration: Duration::from_secs(60),
        }
    }

    pub fn from_config() -> Self {
        let limit_per_sec = cfg.api.prompt_limits.rate_limit_per_sec;
        let interval_ms = cfg.api.prompt_limits.refill_interval_ms;
        let refill = cfg.api.prompt_limits.refill_amount;
        Self::new(limit_per_sec, interval_ms, refill)
    }

    pub async fn acquire_one(&self) {
        self.prompt.acquire_one().await;
    }

    pub fn is_backing_off(&self) -> bool {
        self.backoff.load(Relaxed)
    }

    pub fn trigger_backoff(&self) {
        tracing::info!("Triggering backoff...");
        self.backoff.store(true, Relaxed);
        let self_ = self.clone();
        let duration = self.backoff_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            tracing::info!("Backoff expired");
            self_.backoff.store(false, Relaxed);
        });
    }

    pub fn get_status(&self) -> String {
        let prompt_bucket = format!("{}/{}", self.prompt.balance(), self.prompt.max());
        if self.is_backing_off() {
            format!("prompts: {} (BACKOFF)", prompt_bucket)
        } else {
            format!("prompts: {}", prompt_bucket)
        }
    }
}

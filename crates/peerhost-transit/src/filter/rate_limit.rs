use super::{FilterContext, FilterResult, TransitFilter};
use async_trait::async_trait;
use peerhost_core::models::{MultipartPart, OdinId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const FILTER_ID: &str = "sender-rate-limit";
const SHARD_COUNT: usize = 16;
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(600);
const MAX_BUCKETS_PER_SHARD: usize = 10_000;

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_minute: u32) -> Self {
        let capacity = per_minute as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-sender token bucket, charged once per transfer on its key header part.
pub struct SenderRateLimitFilter {
    per_minute: u32,
    shards: Vec<Mutex<HashMap<OdinId, TokenBucket>>>,
}

impl SenderRateLimitFilter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, sender: &OdinId) -> &Mutex<HashMap<OdinId, TokenBucket>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        sender.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }
}

#[async_trait]
impl TransitFilter for SenderRateLimitFilter {
    fn id(&self) -> &'static str {
        FILTER_ID
    }

    async fn apply(&self, ctx: &FilterContext<'_>) -> anyhow::Result<FilterResult> {
        if ctx.part != MultipartPart::TransferKeyHeader {
            return Ok(FilterResult::accept(FILTER_ID));
        }

        let mut buckets = self.shard(ctx.sender).lock().await;
        if buckets.len() > MAX_BUCKETS_PER_SHARD {
            buckets.retain(|_, b| b.last_refill.elapsed() < IDLE_BUCKET_TTL);
        }

        let allowed = buckets
            .entry(ctx.sender.clone())
            .or_insert_with(|| TokenBucket::new(self.per_minute))
            .try_acquire();

        if allowed {
            Ok(FilterResult::accept(FILTER_ID))
        } else {
            Ok(FilterResult::reject(
                FILTER_ID,
                format!("{} exceeded {} transfers per minute", ctx.sender, self.per_minute),
            ))
        }
    }
}

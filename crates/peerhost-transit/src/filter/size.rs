use super::{FilterContext, FilterResult, TransitFilter};
use async_trait::async_trait;
use peerhost_core::config::TransitConfig;
use peerhost_core::models::MultipartPart;

const FILTER_ID: &str = "part-size";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSizeLimits {
    pub key_header: u64,
    pub metadata: u64,
    pub payload: u64,
}

impl PartSizeLimits {
    pub fn from_config(config: &TransitConfig) -> Self {
        Self {
            key_header: config.max_key_header_bytes,
            metadata: config.max_metadata_bytes,
            payload: config.max_payload_bytes,
        }
    }

    pub fn limit_for(&self, part: MultipartPart) -> u64 {
        match part {
            MultipartPart::TransferKeyHeader => self.key_header,
            MultipartPart::Metadata => self.metadata,
            MultipartPart::Payload => self.payload,
        }
    }
}

/// Rejects parts larger than the limit for their kind.
pub struct PartSizeFilter {
    limits: PartSizeLimits,
}

impl PartSizeFilter {
    pub fn new(limits: PartSizeLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl TransitFilter for PartSizeFilter {
    fn id(&self) -> &'static str {
        FILTER_ID
    }

    async fn apply(&self, ctx: &FilterContext<'_>) -> anyhow::Result<FilterResult> {
        let limit = self.limits.limit_for(ctx.part);
        if ctx.size_bytes > limit {
            return Ok(FilterResult::reject(
                FILTER_ID,
                format!(
                    "{} part is {} bytes, limit is {}",
                    ctx.part, ctx.size_bytes, limit
                ),
            ));
        }
        Ok(FilterResult::accept(FILTER_ID))
    }
}

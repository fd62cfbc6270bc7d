//! Content filters for incoming transfer parts.
//!
//! Each filter sees one part at a time and returns a recommendation. Filters keep
//! no memory between parts; anything they need about earlier parts comes from the
//! [`IncomingTransferStateItem`] in the context.

mod connection;
mod pipeline;
mod rate_limit;
mod size;

#[cfg(feature = "clamav")]
mod clamav;

pub use connection::ConnectedSenderFilter;
pub use pipeline::FilterPipeline;
pub use rate_limit::SenderRateLimitFilter;
pub use size::{PartSizeFilter, PartSizeLimits};

#[cfg(feature = "clamav")]
pub use clamav::{ClamAvScanner, MalwareScanFilter, ScanResult};

use crate::state::IncomingTransferStateItem;
use async_trait::async_trait;
use peerhost_core::models::{FilterAction, MultipartPart, OdinId};
use peerhost_storage::DriveFileSystem;

/// What a filter gets to look at.
pub struct FilterContext<'a> {
    pub sender: &'a OdinId,
    pub transfer: &'a IncomingTransferStateItem,
    pub part: MultipartPart,
    pub size_bytes: u64,
    pub drives: &'a dyn DriveFileSystem,
}

impl FilterContext<'_> {
    /// Load the part's bytes from temp storage.
    pub async fn read_part(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = self
            .drives
            .read_temp_bytes(&self.transfer.temp_file, self.part.extension())
            .await?;
        Ok(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub filter_id: &'static str,
    pub recommendation: FilterAction,
    pub message: Option<String>,
}

impl FilterResult {
    pub fn accept(filter_id: &'static str) -> Self {
        Self {
            filter_id,
            recommendation: FilterAction::Accept,
            message: None,
        }
    }

    pub fn quarantine(filter_id: &'static str, message: impl Into<String>) -> Self {
        Self {
            filter_id,
            recommendation: FilterAction::Quarantine,
            message: Some(message.into()),
        }
    }

    pub fn reject(filter_id: &'static str, message: impl Into<String>) -> Self {
        Self {
            filter_id,
            recommendation: FilterAction::Reject,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait TransitFilter: Send + Sync {
    fn id(&self) -> &'static str;

    async fn apply(&self, ctx: &FilterContext<'_>) -> anyhow::Result<FilterResult>;
}

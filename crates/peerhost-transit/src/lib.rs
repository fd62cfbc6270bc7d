//! Peerhost Transit Library
//!
//! Receiving side of peer-to-peer file transfers:
//!
//! - [`perimeter`]: the ingestion state machine that accepts multipart transfers
//! - [`filter`]: per-part content filters and the pipeline that combines them
//! - [`state`]: tracking of in-flight transfers
//! - [`inbox`]: durable queue between the perimeter and the inbox worker
//! - [`writer`]: reconciliation of received files against the drive
//! - [`keyed_lock`]: per-dedup-key locks used by the writer
//! - [`events`]: transit notifications
//! - [`key_exchange`]: recipient key validation and key header decryption

pub mod events;
pub mod filter;
pub mod inbox;
pub mod key_exchange;
pub mod keyed_lock;
pub mod perimeter;
pub mod state;
pub mod writer;

// Re-export commonly used types
pub use events::{EventBus, TransitEvent};
pub use filter::{
    ConnectedSenderFilter, FilterContext, FilterPipeline, FilterResult, PartSizeFilter,
    PartSizeLimits, SenderRateLimitFilter, TransitFilter,
};
#[cfg(feature = "clamav")]
pub use filter::{ClamAvScanner, MalwareScanFilter, ScanResult};
pub use inbox::{InboxStorage, SqliteInbox};
pub use key_exchange::{KeyExchange, SharedSecretKeyExchange};
pub use keyed_lock::{DedupKey, KeyedLock};
pub use perimeter::{TransferGuard, TransitPerimeterService};
pub use state::{IncomingTransferStateItem, PartState, TransferStateTracker};
pub use writer::{TransitFileWriter, WriteOutcome};

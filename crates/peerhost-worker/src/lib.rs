//! Peerhost inbox worker
//!
//! Drains the durable transfer inbox: every accepted transfer is decrypted and
//! reconciled into its drive by the transit file writer. Items are removed only
//! once processing succeeded or failed for good.

pub mod processor;
pub mod worker;

pub use processor::{InboxProcessor, ProcessOutcome};
pub use worker::{InboxWorker, InboxWorkerConfig};

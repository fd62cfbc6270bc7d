//! Application state shared by the handlers.

use peerhost_core::Config;
use peerhost_storage::DriveFileSystem;
use peerhost_transit::{EventBus, InboxStorage, TransitPerimeterService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub perimeter: TransitPerimeterService,
    pub drives: Arc<dyn DriveFileSystem>,
    pub inbox: Arc<dyn InboxStorage>,
    pub events: EventBus,
}

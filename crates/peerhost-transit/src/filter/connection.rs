use super::{FilterContext, FilterResult, TransitFilter};
use async_trait::async_trait;
use peerhost_core::models::OdinId;
use std::collections::HashSet;

const FILTER_ID: &str = "connected-sender";

/// Rejects senders that are not in the connection directory.
pub struct ConnectedSenderFilter {
    connected: HashSet<OdinId>,
}

impl ConnectedSenderFilter {
    pub fn new(connected: impl IntoIterator<Item = OdinId>) -> Self {
        Self {
            connected: connected.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TransitFilter for ConnectedSenderFilter {
    fn id(&self) -> &'static str {
        FILTER_ID
    }

    async fn apply(&self, ctx: &FilterContext<'_>) -> anyhow::Result<FilterResult> {
        if self.connected.contains(ctx.sender) {
            Ok(FilterResult::accept(FILTER_ID))
        } else {
            Ok(FilterResult::reject(
                FILTER_ID,
                format!("{} is not connected", ctx.sender),
            ))
        }
    }
}

use super::{FilterContext, TransitFilter};
use peerhost_core::models::FilterAction;
use std::sync::Arc;
use std::time::Instant;

/// Ordered filter chain.
///
/// The first `Reject` ends evaluation. Otherwise any `Quarantine` wins over `Accept`.
/// A filter that errors counts as a `Reject`.
#[derive(Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn TransitFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Arc<dyn TransitFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: Arc<dyn TransitFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filter_ids(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.id()).collect()
    }

    #[tracing::instrument(
        skip(self, ctx),
        fields(transfer_id = %ctx.transfer.id, sender = %ctx.sender, part = %ctx.part)
    )]
    pub async fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterAction {
        let start = Instant::now();
        let mut outcome = FilterAction::Accept;

        for filter in &self.filters {
            let result = match filter.apply(ctx).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        filter = filter.id(),
                        error = %e,
                        "Filter failed, rejecting part"
                    );
                    outcome = FilterAction::Reject;
                    break;
                }
            };

            match result.recommendation {
                FilterAction::Accept => {}
                FilterAction::Quarantine => {
                    tracing::warn!(
                        filter = result.filter_id,
                        message = result.message.as_deref().unwrap_or(""),
                        "Filter recommends quarantine"
                    );
                    outcome = FilterAction::Quarantine;
                }
                FilterAction::Reject => {
                    tracing::info!(
                        filter = result.filter_id,
                        message = result.message.as_deref().unwrap_or(""),
                        "Filter rejected part"
                    );
                    outcome = FilterAction::Reject;
                    break;
                }
            }
        }

        tracing::debug!(
            outcome = ?outcome,
            filters = self.filters.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Part filtered"
        );
        outcome
    }
}

use common::UserId;
use serde_json::Value;
use store::{CartChange, CommerceStore};

use crate::command::CommandHandler;
use crate::error::CommerceError;

use super::{GuestCartLine, MergeOutcome, MergeReport, SkipReason};

/// Folds a guest cart into the user's persisted cart.
///
/// Each entry follows the add-to-cart rules (active product, quantity within
/// stock, quantities summed into an existing line) but a rule violation
/// skips the entry instead of failing.
pub struct GuestCartMerger<S: CommerceStore> {
    handler: CommandHandler<S>,
}

impl<S: CommerceStore> GuestCartMerger<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Merges a guest cart exactly as the client submitted it.
    ///
    /// `null` and `[]` mean there is nothing to merge. Any other non-array
    /// value is reported as a single malformed entry.
    pub async fn merge_submitted(&self, user_id: UserId, guest_cart: &Value) -> Option<MergeReport> {
        match guest_cart {
            Value::Null => None,
            Value::Array(entries) if entries.is_empty() => None,
            Value::Array(entries) => Some(self.merge(user_id, entries).await),
            other => {
                tracing::warn!(%user_id, kind = json_kind(other), "guest cart is not an array");
                let reason = SkipReason::Malformed {
                    detail: format!("guest cart must be an array, got {}", json_kind(other)),
                };
                metrics::counter!("guest_cart_lines_skipped_total", "reason" => reason.label())
                    .increment(1);
                Some(MergeReport {
                    outcomes: vec![MergeOutcome::Skipped { index: 0, reason }],
                })
            }
        }
    }

    /// Merges every entry and reports what happened to each.
    #[tracing::instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn merge(&self, user_id: UserId, entries: &[Value]) -> MergeReport {
        let mut report = MergeReport::default();

        for (index, entry) in entries.iter().enumerate() {
            let outcome = match GuestCartLine::parse(entry) {
                Ok(line) => self.merge_line(user_id, index, line).await,
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping malformed guest cart entry");
                    MergeOutcome::Skipped {
                        index,
                        reason: SkipReason::Malformed {
                            detail: e.to_string(),
                        },
                    }
                }
            };

            match &outcome {
                MergeOutcome::Skipped { reason, .. } => {
                    metrics::counter!("guest_cart_lines_skipped_total", "reason" => reason.label())
                        .increment(1);
                }
                _ => metrics::counter!("guest_cart_lines_merged_total").increment(1),
            }
            report.outcomes.push(outcome);
        }

        tracing::info!(
            %user_id,
            merged = report.merged(),
            inserted = report.inserted(),
            skipped = report.skipped(),
            "guest cart merged"
        );
        report
    }

    async fn merge_line(&self, user_id: UserId, index: usize, line: GuestCartLine) -> MergeOutcome {
        let skipped = |reason| MergeOutcome::Skipped { index, reason };

        let product = match self.handler.store().get_product(line.product_id).await {
            Ok(Some(product)) if product.is_active => product,
            Ok(_) => {
                tracing::debug!(product_id = %line.product_id, "guest cart product unavailable");
                return skipped(SkipReason::ProductUnavailable {
                    product_id: line.product_id,
                });
            }
            Err(e) => {
                tracing::warn!(product_id = %line.product_id, error = %e, "guest cart product lookup failed");
                return skipped(SkipReason::StoreFailure {
                    detail: e.to_string(),
                });
            }
        };

        let result = self
            .handler
            .execute(user_id, |cart| cart.add_item(&product, line.quantity))
            .await;

        match result {
            Ok(result) => match result.changes.first() {
                Some(CartChange::QuantityChanged { quantity, .. }) => MergeOutcome::Merged {
                    product_id: line.product_id,
                    quantity: *quantity,
                },
                _ => MergeOutcome::Inserted {
                    product_id: line.product_id,
                    quantity: line.quantity,
                },
            },
            Err(CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            }) => {
                tracing::debug!(%product_id, requested, available, "guest cart line exceeds stock");
                skipped(SkipReason::ExceedsStock {
                    product_id,
                    requested,
                    available,
                })
            }
            Err(CommerceError::NotFound(_)) => skipped(SkipReason::ProductUnavailable {
                product_id: line.product_id,
            }),
            Err(e) => {
                tracing::warn!(product_id = %line.product_id, error = %e, "guest cart line failed");
                skipped(SkipReason::StoreFailure {
                    detail: e.to_string(),
                })
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

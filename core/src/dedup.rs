//! Dedupe gate approximating effectively-once delivery.
//!
//! Under [`Delivery::EffectivelyOnce`] the gate performs an atomic
//! "set if absent, with expiry" on `<key>:dedupe:<message id>`. The first
//! caller within the TTL window wins; everyone else is told to skip.
//!
//! This reduces duplicates, it does not eliminate them. The admission record
//! is written before the handler runs, so a handler that fails after
//! admission will not be retried with the same id until the record expires,
//! and a lost store record re-admits the id.

use crate::error::{BusError, Result};
use crate::key;
use crate::options::Delivery;
use crate::store::StreamStore;
use std::sync::Arc;
use std::time::Duration;

/// TTL-bounded admission check.
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn StreamStore>,
}

impl DedupGate {
    /// Gate backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self { store }
    }

    /// Decide whether `message_id` on `topic_key` should be handed to a handler.
    ///
    /// Always `true` for [`Delivery::AtLeastOnce`].
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DedupeFailed`] if the store cannot be reached.
    pub async fn admit(
        &self,
        topic_key: &str,
        message_id: &str,
        delivery: Delivery,
        ttl_secs: u64,
    ) -> Result<bool> {
        if delivery == Delivery::AtLeastOnce {
            return Ok(true);
        }

        let dedupe_key = key::dedupe_key(topic_key, message_id);
        let admitted = self
            .store
            .set_if_absent(&dedupe_key, "1", Duration::from_secs(ttl_secs))
            .await
            .map_err(|e| BusError::DedupeFailed {
                key: dedupe_key.clone(),
                reason: e.to_string(),
            })?;

        if !admitted {
            tracing::debug!(
                key = %dedupe_key,
                message_id = %message_id,
                "Duplicate message rejected by dedupe gate"
            );
        }

        Ok(admitted)
    }
}

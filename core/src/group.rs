//! Consumer group management.

use crate::error::Result;
use crate::store::{GroupCreation, StreamStore};
use std::sync::Arc;

/// Ensures consumer groups exist on log keys.
///
/// Creation is idempotent and commutative: concurrent creators may race and
/// every one of them observes success. An existing group is never reset.
#[derive(Clone)]
pub struct GroupManager {
    store: Arc<dyn StreamStore>,
}

impl GroupManager {
    /// Manage groups on `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self { store }
    }

    /// Make sure `group` exists on `key`, creating the log if needed.
    ///
    /// # Errors
    ///
    /// Returns the store's error for failures other than "already exists".
    pub async fn ensure(&self, key: &str, group: &str) -> Result<GroupCreation> {
        let creation = self.store.create_group(key, group).await?;

        tracing::debug!(
            key = %key,
            group = %group,
            already_exists = creation == GroupCreation::AlreadyExists,
            "Consumer group ensured"
        );

        Ok(creation)
    }
}

//! User directory accessor.

use std::sync::Arc;

use entities::User;
use tracing::debug;

use crate::{decode::decode_rows, Backend, Query, StoreResult, PROFILES_TABLE};

/// Reads the list of known users.
#[derive(Clone)]
pub struct UserDirectory {
    backend: Arc<dyn Backend>,
}

impl UserDirectory {
    /// Creates a user directory over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Lists every user profile. Errors are returned to the caller.
    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        let query = Query::table(PROFILES_TABLE).select(&["id", "email"]);
        let rows = self.backend.select(&query).await?;
        debug!(count = rows.len(), "Loaded user profiles");
        decode_rows("User", rows)
    }
}

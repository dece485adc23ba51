use uuid::Uuid;

use crate::Result;
use crate::model::Profile;
use crate::platform::Tables;

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Profiles whose username contains `query`, ignoring case, never `self_id`.
/// A blank query matches nobody and skips the lookup.
pub async fn search_users(tables: &dyn Tables, query: &str, self_id: Uuid, limit: u32) -> Result<Vec<Profile>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    tables.search_profiles(query, self_id, limit).await
}

use crate::client::MultiMap;
use crate::context::RequestContext;
use crate::downstream::{Downstream, null_as_default};
use crate::errors::Result;
use serde::{Deserialize, Serialize};

pub const ENTRIES_PATH: &str = "/entries";

/// A record belonging to a user. Serialized with the same field names the
/// downstream uses.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Entry {
    #[serde(
        rename = "Name",
        alias = "name",
        alias = "NAME",
        default,
        deserialize_with = "null_as_default"
    )]
    pub name: String,
    #[serde(
        rename = "UserID",
        alias = "userID",
        alias = "userId",
        alias = "UserId",
        alias = "userid",
        alias = "USERID",
        alias = "user_id"
    )]
    pub user_id: u64,
    #[serde(
        rename = "Salary",
        alias = "salary",
        alias = "SALARY",
        default,
        deserialize_with = "null_as_default"
    )]
    pub salary: i64,
}

/// Fetches the entries of already resolved users
#[derive(Clone, Debug)]
pub struct Joiner {
    downstream: Downstream,
}

impl Joiner {
    pub fn new(downstream: Downstream) -> Self {
        Self { downstream }
    }

    /// Returns the downstream entries for `user_ids` as received. Entries for
    /// ids that were not asked for are passed through untouched.
    pub async fn resolve_entries(
        &self,
        ctx: &RequestContext,
        user_ids: &[u64],
    ) -> Result<Vec<Entry>> {
        let query = MultiMap::from([(
            "userID".to_string(),
            user_ids.iter().map(u64::to_string).collect(),
        )]);

        let entries: Option<Vec<Entry>> =
            self.downstream.get_json(ctx, ENTRIES_PATH, query).await?;
        let entries = entries.unwrap_or_default();

        tracing::debug!(count = entries.len(), "Fetched entries");
        Ok(entries)
    }
}

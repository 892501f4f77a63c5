use crate::client::MultiMap;
use crate::context::RequestContext;
use crate::downstream::{Downstream, null_as_default};
use crate::errors::Result;
use serde::Deserialize;

pub const USERS_PATH: &str = "/users";

/// A user as returned by the downstream users resource
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "ID", alias = "id", alias = "Id", alias = "iD")]
    pub id: u64,
    #[serde(
        rename = "Name",
        alias = "name",
        alias = "NAME",
        default,
        deserialize_with = "null_as_default"
    )]
    pub name: String,
    #[serde(
        rename = "Age",
        alias = "age",
        alias = "AGE",
        default,
        deserialize_with = "null_as_default"
    )]
    pub age: i64,
}

/// Maps a name filter to user identifiers
#[derive(Clone, Debug)]
pub struct Resolver {
    downstream: Downstream,
}

impl Resolver {
    pub fn new(downstream: Downstream) -> Self {
        Self { downstream }
    }

    /// Returns the ids of all users matching any of `names`, in downstream
    /// order. Zero matches is a valid, empty result.
    pub async fn resolve_user_ids(
        &self,
        ctx: &RequestContext,
        names: &[String],
    ) -> Result<Vec<u64>> {
        let query = MultiMap::from([("name".to_string(), names.to_vec())]);

        let users: Option<Vec<User>> = self.downstream.get_json(ctx, USERS_PATH, query).await?;
        let ids: Vec<u64> = users.unwrap_or_default().iter().map(|u| u.id).collect();

        tracing::debug!(user_ids = ?ids, "Resolved user ids");
        Ok(ids)
    }
}

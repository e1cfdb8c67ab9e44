use serde::{Deserialize, Deserializer};

use crate::error::DecodeError;

const BRANCH_PREFIX: &str = "refs/heads/";

// GitHub sends `null` for some optional fields (e.g. the pusher email of bot pushes).
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A GitHub `push` webhook payload. Unknown fields are ignored.
#[derive(Deserialize, Debug, Clone)]
pub struct PushEvent {
    pub r#ref: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub before: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub after: String,
    pub repository: Repository,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pusher: Pusher,
    #[serde(default, deserialize_with = "null_as_default")]
    pub commits: Vec<CommitRecord>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Repository {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub html_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clone_url: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Pusher {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitRecord {
    #[serde(rename = "id")]
    pub sha: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// RFC 3339, but kept raw: a bad timestamp must not reject the push.
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: Author,
    pub committer: Option<Author>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub added: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub removed: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub modified: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Author {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
}

impl PushEvent {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// `ref` without the `refs/heads/` prefix. Any other ref (e.g. a tag) is returned unchanged.
    pub fn branch_name(&self) -> &str {
        self.r#ref
            .strip_prefix(BRANCH_PREFIX)
            .unwrap_or(&self.r#ref)
    }
}

impl CommitRecord {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

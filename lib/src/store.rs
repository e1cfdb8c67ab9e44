//! Collaborators the linking engine calls into. Implementations live with whatever owns the
//! data: [`crate::memory::MemoryStore`] here, SQLite in the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;

pub type TaskId = i64;
pub type TeamId = i64;
pub type MemberId = i64;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Normalized, see [`crate::repo::normalize_repo_url`].
    pub repo_url: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub team_id: TeamId,
    pub created_by: Option<MemberId>,
}

/// A commit-to-task link about to be persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCommitLink {
    pub task_id: TaskId,
    pub sha: String,
    pub message: String,
    pub author: String,
    pub url: String,
    pub committed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    Inserted,
    /// Another writer stored the same `(task, sha)` pair first.
    AlreadyLinked,
}

#[async_trait]
pub trait TeamDirectory: Send + Sync {
    /// Exact match on the normalized repository URL.
    async fn find_team_by_repo_url(&self, repo_url: &str) -> Result<Option<Team>, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    async fn list_assignees(&self, id: TaskId) -> Result<Vec<MemberId>, StoreError>;
}

#[async_trait]
pub trait CommitLinkStore: Send + Sync {
    async fn link_exists(&self, task_id: TaskId, sha: &str) -> Result<bool, StoreError>;

    /// Must be atomic with respect to the `(task_id, sha)` pair: concurrent inserts of the same
    /// pair produce one row, and every loser gets [`LinkOutcome::AlreadyLinked`].
    async fn insert_link(&self, link: &NewCommitLink) -> Result<LinkOutcome, StoreError>;
}

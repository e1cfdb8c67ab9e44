//! Links pushed commits to the tasks they mention.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::StoreError,
    event::{CommitRecord, PushEvent},
    extract::{task_ids_from_branch, task_ids_from_message},
    notify::{self, Notifier},
    repo::RepositoryResolver,
    store::{
        CommitLinkStore, LinkOutcome, NewCommitLink, Task, TaskId, TaskStore, TeamDirectory, TeamId,
    },
};

const MAX_MESSAGE_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

const NO_TASK_ID: &str = "no task id found";
const NOTHING_LINKED: &str = "already linked or task not found";

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Linked,
    Skipped,
    /// Part of the response contract; the engine itself reports per-task failures as skips.
    Failed,
}

/// Where the task ids of a commit came from.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    Branch,
    Commit,
    Both,
}

impl LinkSource {
    pub fn via_branch(self) -> bool {
        matches!(self, LinkSource::Branch | LinkSource::Both)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitLinkResult {
    pub commit_sha: String,
    pub commit_message: String,
    pub status: LinkStatus,
    pub source: Option<LinkSource>,
    /// Set iff `status` is [`LinkStatus::Skipped`].
    pub reason: Option<String>,
    pub linked_task_ids: Vec<TaskId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebhookResult {
    pub team_id: Option<TeamId>,
    pub team_name: Option<String>,
    /// The push could not be processed at all.
    pub error: Option<String>,
    pub commits: Vec<CommitLinkResult>,
}

impl WebhookResult {
    fn count(&self, status: LinkStatus) -> usize {
        self.commits.iter().filter(|c| c.status == status).count()
    }

    pub fn linked_count(&self) -> usize {
        self.count(LinkStatus::Linked)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(LinkStatus::Skipped)
    }

    pub fn failed_count(&self) -> usize {
        self.count(LinkStatus::Failed)
    }
}

/// First line only, capped at 200 characters including a trailing `...`.
pub fn truncate_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default();
    if first_line.chars().count() <= MAX_MESSAGE_CHARS {
        return first_line.to_owned();
    }
    let mut truncated: String = first_line
        .chars()
        .take(MAX_MESSAGE_CHARS - ELLIPSIS.len())
        .collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

fn parse_timestamp(timestamp: Option<&str>) -> Option<DateTime<Utc>> {
    let timestamp = timestamp?;
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(err) => {
            tracing::debug!(%err, "Failed to parse commit timestamp: {timestamp}");
            None
        }
    }
}

pub struct LinkingEngine {
    resolver: RepositoryResolver,
    tasks: Arc<dyn TaskStore>,
    links: Arc<dyn CommitLinkStore>,
    notifier: Arc<dyn Notifier>,
}

impl LinkingEngine {
    pub fn new(
        teams: Arc<dyn TeamDirectory>,
        tasks: Arc<dyn TaskStore>,
        links: Arc<dyn CommitLinkStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            resolver: RepositoryResolver::new(teams),
            tasks,
            links,
            notifier,
        }
    }

    /// For a backend that plays every collaborator role.
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: TeamDirectory + TaskStore + CommitLinkStore + Notifier + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    /// Processes one push. `Err` means a collaborator failed before any commit was looked at;
    /// failures while linking individual commits are logged and absorbed.
    #[tracing::instrument(skip_all, fields(repo = %event.repository.full_name, branch = event.branch_name()))]
    pub async fn process(&self, event: &PushEvent) -> Result<WebhookResult, StoreError> {
        let mut result = WebhookResult::default();
        if event.commits.is_empty() {
            tracing::info!("No commits to process");
            return Ok(result);
        }

        tracing::info!("Processing {} commit(s)", event.commits.len());
        let Some(team) = self.resolver.resolve(&event.repository).await? else {
            let url = &event.repository.html_url;
            tracing::warn!("No team found for repository: {url}");
            result.error = Some(format!("no team registered for repository: {url}"));
            return Ok(result);
        };
        result.team_id = Some(team.id);
        result.team_name = Some(team.name);

        if !event.r#ref.starts_with("refs/heads/") {
            tracing::debug!(git_ref = %event.r#ref, "Not a branch ref, scanning it as-is");
        }
        let branch_task_ids = task_ids_from_branch(event.branch_name());
        tracing::info!(?branch_task_ids, "Task ids from branch");

        for commit in &event.commits {
            let commit_result = self.process_commit(commit, &branch_task_ids).await;
            result.commits.push(commit_result);
        }

        tracing::info!(
            linked = result.linked_count(),
            skipped = result.skipped_count(),
            failed = result.failed_count(),
            "Webhook processing complete"
        );
        Ok(result)
    }

    async fn process_commit(
        &self,
        commit: &CommitRecord,
        branch_task_ids: &BTreeSet<TaskId>,
    ) -> CommitLinkResult {
        let mut task_ids: BTreeSet<TaskId> = BTreeSet::new();
        let mut source = None;

        if !branch_task_ids.is_empty() {
            task_ids.extend(branch_task_ids);
            source = Some(LinkSource::Branch);
        }
        let message_task_ids = task_ids_from_message(&commit.message);
        if !message_task_ids.is_empty() {
            task_ids.extend(message_task_ids);
            source = Some(match source {
                Some(_) => LinkSource::Both,
                None => LinkSource::Commit,
            });
        }

        let mut result = CommitLinkResult {
            commit_sha: commit.sha.clone(),
            commit_message: truncate_message(&commit.message),
            status: LinkStatus::Skipped,
            source,
            reason: None,
            linked_task_ids: Vec::new(),
        };
        let Some(source) = source else {
            result.reason = Some(NO_TASK_ID.into());
            return result;
        };

        for task_id in task_ids {
            match self
                .link_commit_to_task(commit, &result.commit_message, task_id, source)
                .await
            {
                Ok(true) => result.linked_task_ids.push(task_id),
                Ok(false) => {}
                Err(err) => tracing::error!(
                    %err,
                    sha = commit.short_sha(),
                    task_id,
                    "Failed to link commit to task"
                ),
            }
        }

        if result.linked_task_ids.is_empty() {
            result.reason = Some(NOTHING_LINKED.into());
        } else {
            result.status = LinkStatus::Linked;
        }
        result
    }

    /// `Ok(false)` if the task does not exist or the pair is already linked.
    async fn link_commit_to_task(
        &self,
        commit: &CommitRecord,
        message: &str,
        task_id: TaskId,
        source: LinkSource,
    ) -> Result<bool, StoreError> {
        let Some(task) = self.tasks.get_task(task_id).await? else {
            tracing::debug!("Task {task_id} not found");
            return Ok(false);
        };

        if self.links.link_exists(task_id, &commit.sha).await? {
            tracing::debug!("Commit {} already linked to task {task_id}", commit.short_sha());
            return Ok(false);
        }

        let link = NewCommitLink {
            task_id,
            sha: commit.sha.clone(),
            message: message.to_owned(),
            author: commit.author.name.clone(),
            url: commit.url.clone(),
            committed_at: parse_timestamp(commit.timestamp.as_deref()),
        };
        if self.links.insert_link(&link).await? == LinkOutcome::AlreadyLinked {
            tracing::debug!("Commit {} linked to task {task_id} concurrently", commit.short_sha());
            return Ok(false);
        }
        tracing::info!("Linked commit {} to task {task_id}", commit.short_sha());

        self.notify(&task, message, source).await;
        Ok(true)
    }

    async fn notify(&self, task: &Task, message: &str, source: LinkSource) {
        let assignees = match self.tasks.list_assignees(task.id).await {
            Ok(assignees) => assignees,
            Err(err) => {
                tracing::error!(%err, task_id = task.id, "Failed to list assignees");
                Vec::new()
            }
        };
        let sent = notify::fan_out(
            self.notifier.as_ref(),
            task,
            &assignees,
            message,
            source.via_branch(),
        )
        .await;
        tracing::debug!(task_id = task.id, "Sent {sent} notification(s)");
    }
}

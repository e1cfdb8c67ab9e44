//! In-process implementation of every collaborator, for tests.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    error::StoreError,
    notify::{CommitLinkedNotice, Notifier},
    store::{
        CommitLinkStore, LinkOutcome, MemberId, NewCommitLink, Task, TaskId, TaskStore, Team,
        TeamDirectory, TeamId,
    },
};

#[derive(Default)]
struct State {
    teams: Vec<Team>,
    tasks: HashMap<TaskId, Task>,
    assignees: HashMap<TaskId, Vec<MemberId>>,
    links: Vec<NewCommitLink>,
    notices: Vec<CommitLinkedNotice>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_team(&self, id: TeamId, name: &str, repo_url: &str) {
        self.state().teams.push(Team {
            id,
            name: name.to_owned(),
            repo_url: Some(repo_url.to_owned()),
        });
    }

    pub fn add_task(&self, task: Task, assignees: impl IntoIterator<Item = MemberId>) {
        let mut state = self.state();
        state.assignees.insert(task.id, assignees.into_iter().collect());
        state.tasks.insert(task.id, task);
    }

    pub fn links(&self) -> Vec<NewCommitLink> {
        self.state().links.clone()
    }

    pub fn notices(&self) -> Vec<CommitLinkedNotice> {
        self.state().notices.clone()
    }
}

#[async_trait]
impl TeamDirectory for MemoryStore {
    async fn find_team_by_repo_url(&self, repo_url: &str) -> Result<Option<Team>, StoreError> {
        Ok(self
            .lock()?
            .teams
            .iter()
            .find(|team| team.repo_url.as_deref() == Some(repo_url))
            .cloned())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.lock()?.tasks.get(&id).cloned())
    }

    async fn list_assignees(&self, id: TaskId) -> Result<Vec<MemberId>, StoreError> {
        Ok(self.lock()?.assignees.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CommitLinkStore for MemoryStore {
    async fn link_exists(&self, task_id: TaskId, sha: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .links
            .iter()
            .any(|link| link.task_id == task_id && link.sha == sha))
    }

    async fn insert_link(&self, link: &NewCommitLink) -> Result<LinkOutcome, StoreError> {
        let mut state = self.lock()?;
        if state
            .links
            .iter()
            .any(|l| l.task_id == link.task_id && l.sha == link.sha)
        {
            return Ok(LinkOutcome::AlreadyLinked);
        }
        state.links.push(link.clone());
        Ok(LinkOutcome::Inserted)
    }
}

#[async_trait]
impl Notifier for MemoryStore {
    async fn commit_linked(&self, notice: &CommitLinkedNotice) -> Result<(), StoreError> {
        self.lock()?.notices.push(notice.clone());
        Ok(())
    }
}

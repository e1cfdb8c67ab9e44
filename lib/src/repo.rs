use std::sync::Arc;

use crate::{
    error::StoreError,
    event::Repository,
    store::{Team, TeamDirectory},
};

/// Strips one trailing `.git`, then one trailing `/`.
pub fn normalize_repo_url(url: &str) -> &str {
    let url = url.strip_suffix(".git").unwrap_or(url);
    url.strip_suffix('/').unwrap_or(url)
}

/// Maps a pushed repository to the team that registered it.
#[derive(Clone)]
pub struct RepositoryResolver {
    teams: Arc<dyn TeamDirectory>,
}

impl RepositoryResolver {
    pub fn new(teams: Arc<dyn TeamDirectory>) -> Self {
        Self { teams }
    }

    pub async fn resolve_url(&self, url: &str) -> Result<Option<Team>, StoreError> {
        let url = normalize_repo_url(url);
        if url.is_empty() {
            return Ok(None);
        }
        self.teams.find_team_by_repo_url(url).await
    }

    /// Tries `html_url`, then `clone_url` if it normalizes to a different key.
    pub async fn resolve(&self, repository: &Repository) -> Result<Option<Team>, StoreError> {
        if let Some(team) = self.resolve_url(&repository.html_url).await? {
            return Ok(Some(team));
        }
        if normalize_repo_url(&repository.clone_url) == normalize_repo_url(&repository.html_url) {
            return Ok(None);
        }
        self.resolve_url(&repository.clone_url).await
    }
}

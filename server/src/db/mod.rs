mod migrations;

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushlink::{
    notify::{CommitLinkedNotice, Notifier},
    store::{
        CommitLinkStore, LinkOutcome, MemberId, NewCommitLink, Task, TaskId, TaskStore, Team,
        TeamDirectory,
    },
    StoreError,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

trait SqliteResultExt<T> {
    fn to_db(self) -> Result<T, StoreError>;
}

impl<T> SqliteResultExt<T> for rusqlite::Result<T> {
    fn to_db(self) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// A persisted commit link, as listed for a task.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredLink {
    pub id: i64,
    pub task_id: TaskId,
    pub sha: String,
    pub message: String,
    pub author: String,
    pub url: String,
    pub committed_at: Option<DateTime<Utc>>,
    /// Empty for links created from a webhook.
    pub linked_by: Option<MemberId>,
    pub linked_at: DateTime<Utc>,
}

fn row_to_link(row: &Row) -> rusqlite::Result<StoredLink> {
    Ok(StoredLink {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        sha: row.get("commit_sha")?,
        message: row.get("commit_message")?,
        author: row.get("commit_author")?,
        url: row.get("github_url")?,
        committed_at: row.get("commit_date")?,
        linked_by: row.get("linked_by")?,
        linked_at: row.get("linked_at")?,
    })
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).to_db()?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )
        .to_db()?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().to_db()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").to_db()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        migrations::run(&conn).to_db()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    pub fn find_team_sync(&self, repo_url: &str) -> Result<Option<Team>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT team_id, team_name, github_repo_url FROM teams
                 WHERE github_repo_url = ?1 ORDER BY team_id LIMIT 1",
                params![repo_url],
                |row| {
                    Ok(Team {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        repo_url: row.get(2)?,
                    })
                },
            )
            .optional()
            .to_db()
        })
    }

    pub fn get_task_sync(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT task_id, title, team_id, created_by FROM tasks WHERE task_id = ?1",
                params![id],
                |row| {
                    Ok(Task {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        team_id: row.get(2)?,
                        created_by: row.get(3)?,
                    })
                },
            )
            .optional()
            .to_db()
        })
    }

    pub fn list_assignees_sync(&self, id: TaskId) -> Result<Vec<MemberId>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT member_no FROM task_assignees WHERE task_id = ?1 ORDER BY rowid")
                .to_db()?;
            let members = stmt
                .query_map(params![id], |row| row.get(0))
                .to_db()?
                .collect::<Result<Vec<_>, _>>()
                .to_db()?;
            Ok(members)
        })
    }

    pub fn link_exists_sync(&self, task_id: TaskId, sha: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM task_commits WHERE task_id = ?1 AND commit_sha = ?2)",
                params![task_id, sha],
                |row| row.get(0),
            )
            .to_db()
        })
    }

    pub fn insert_link_sync(&self, link: &NewCommitLink) -> Result<LinkOutcome, StoreError> {
        self.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO task_commits
                        (task_id, commit_sha, commit_message, commit_author, commit_date, github_url, linked_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        link.task_id,
                        link.sha,
                        link.message,
                        link.author,
                        link.committed_at,
                        link.url,
                        Utc::now(),
                    ],
                )
                .to_db()?;
            Ok(if inserted == 0 {
                LinkOutcome::AlreadyLinked
            } else {
                LinkOutcome::Inserted
            })
        })
    }

    /// Newest first.
    pub async fn list_links(&self, task_id: TaskId) -> Result<Vec<StoredLink>, StoreError> {
        self.blocking(move |db| db.list_links_sync(task_id)).await
    }

    fn list_links_sync(&self, task_id: TaskId) -> Result<Vec<StoredLink>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM task_commits WHERE task_id = ?1 ORDER BY linked_at DESC, id DESC")
                .to_db()?;
            let links = stmt
                .query_map(params![task_id], row_to_link)
                .to_db()?
                .collect::<Result<Vec<_>, _>>()
                .to_db()?;
            Ok(links)
        })
    }

    pub fn insert_notice_sync(&self, notice: &CommitLinkedNotice) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                    (member_no, kind, task_id, task_title, commit_message, via_branch, team_id, created_at)
                 VALUES (?1, 'COMMIT_LINKED', ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    notice.recipient,
                    notice.task_id,
                    notice.task_title,
                    notice.commit_message,
                    notice.via_branch,
                    notice.team_id,
                    Utc::now(),
                ],
            )
            .to_db()?;
            Ok(())
        })
    }
}

#[async_trait]
impl TeamDirectory for SqliteStore {
    async fn find_team_by_repo_url(&self, repo_url: &str) -> Result<Option<Team>, StoreError> {
        let repo_url = repo_url.to_owned();
        self.blocking(move |db| db.find_team_sync(&repo_url)).await
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.blocking(move |db| db.get_task_sync(id)).await
    }

    async fn list_assignees(&self, id: TaskId) -> Result<Vec<MemberId>, StoreError> {
        self.blocking(move |db| db.list_assignees_sync(id)).await
    }
}

#[async_trait]
impl CommitLinkStore for SqliteStore {
    async fn link_exists(&self, task_id: TaskId, sha: &str) -> Result<bool, StoreError> {
        let sha = sha.to_owned();
        self.blocking(move |db| db.link_exists_sync(task_id, &sha)).await
    }

    async fn insert_link(&self, link: &NewCommitLink) -> Result<LinkOutcome, StoreError> {
        let link = link.clone();
        self.blocking(move |db| db.insert_link_sync(&link)).await
    }
}

#[async_trait]
impl Notifier for SqliteStore {
    async fn commit_linked(&self, notice: &CommitLinkedNotice) -> Result<(), StoreError> {
        let notice = notice.clone();
        self.blocking(move |db| db.insert_notice_sync(&notice))
            .await
            .map_err(|e| StoreError::Notify(e.to_string()))
    }
}

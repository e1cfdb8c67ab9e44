use rusqlite::Connection;

// Teams, tasks and assignees are owned by the board application; the tables are created here
// only so a fresh database is usable.
pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS teams (
            team_id         INTEGER PRIMARY KEY,
            team_name       TEXT NOT NULL,
            github_repo_url TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_teams_repo_url ON teams(github_repo_url);

        CREATE TABLE IF NOT EXISTS tasks (
            task_id    INTEGER PRIMARY KEY,
            team_id    INTEGER NOT NULL REFERENCES teams(team_id) ON DELETE CASCADE,
            title      TEXT NOT NULL,
            created_by INTEGER
        );

        CREATE TABLE IF NOT EXISTS task_assignees (
            task_id    INTEGER NOT NULL REFERENCES tasks(task_id) ON DELETE CASCADE,
            member_no  INTEGER NOT NULL,
            PRIMARY KEY (task_id, member_no)
        );

        CREATE TABLE IF NOT EXISTS task_commits (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id        INTEGER NOT NULL REFERENCES tasks(task_id) ON DELETE CASCADE,
            commit_sha     TEXT NOT NULL,
            commit_message TEXT NOT NULL DEFAULT '',
            commit_author  TEXT NOT NULL DEFAULT '',
            commit_date    TEXT,
            github_url     TEXT NOT NULL DEFAULT '',
            linked_by      INTEGER,
            linked_at      TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_task_commits_task_sha
            ON task_commits(task_id, commit_sha);

        CREATE TABLE IF NOT EXISTS notifications (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            member_no      INTEGER NOT NULL,
            kind           TEXT NOT NULL,
            task_id        INTEGER NOT NULL,
            task_title     TEXT NOT NULL,
            commit_message TEXT NOT NULL,
            via_branch     INTEGER NOT NULL,
            team_id        INTEGER NOT NULL,
            is_read        INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_member ON notifications(member_no, is_read);
        ",
    )
}

//! Best-effort task id extraction from branch names and commit messages.

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;

use crate::store::TaskId;

/// `TASK-<n>` at the start of the branch name or right after a separator, e.g.
/// `feature/TASK-42-login` or `bugfix/TASK-10-and-TASK-20`.
static BRANCH_TASK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[/_-])TASK-(\d+)").expect("branch task regex is valid")
});

/// `#<n>` or `#TASK-<n>` anywhere in a commit message.
static MESSAGE_TASK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#(?:TASK-)?(\d+)").expect("message task regex is valid"));

fn capture_ids(regex: &Regex, haystack: &str) -> BTreeSet<TaskId> {
    regex
        .captures_iter(haystack)
        .filter_map(|captures| captures.get(1)?.as_str().parse().ok())
        .collect()
}

pub fn task_ids_from_branch(branch_name: &str) -> BTreeSet<TaskId> {
    capture_ids(&BRANCH_TASK_REGEX, branch_name)
}

pub fn task_ids_from_message(message: &str) -> BTreeSet<TaskId> {
    capture_ids(&MESSAGE_TASK_REGEX, message)
}

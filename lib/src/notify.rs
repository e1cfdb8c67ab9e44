//! Decides who hears about a new commit link. Delivery is up to the [`Notifier`].

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    error::StoreError,
    store::{MemberId, Task, TaskId, TeamId},
};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitLinkedNotice {
    pub recipient: MemberId,
    pub task_id: TaskId,
    pub task_title: String,
    pub commit_message: String,
    /// The link was inferred (at least partly) from the branch name.
    pub via_branch: bool,
    pub team_id: TeamId,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn commit_linked(&self, notice: &CommitLinkedNotice) -> Result<(), StoreError>;
}

/// Every assignee, then the creator unless they are already an assignee.
pub fn recipients(task: &Task, assignees: &[MemberId]) -> Vec<MemberId> {
    let mut recipients = Vec::with_capacity(assignees.len() + 1);
    for &member in assignees.iter().chain(task.created_by.as_ref()) {
        if !recipients.contains(&member) {
            recipients.push(member);
        }
    }
    recipients
}

/// Sends one notice per recipient. A failed send is logged and skipped.
pub async fn fan_out(
    notifier: &dyn Notifier,
    task: &Task,
    assignees: &[MemberId],
    commit_message: &str,
    via_branch: bool,
) -> usize {
    let mut sent = 0;
    for recipient in recipients(task, assignees) {
        let notice = CommitLinkedNotice {
            recipient,
            task_id: task.id,
            task_title: task.title.clone(),
            commit_message: commit_message.to_owned(),
            via_branch,
            team_id: task.team_id,
        };
        match notifier.commit_linked(&notice).await {
            Ok(()) => sent += 1,
            Err(err) => tracing::error!(%err, recipient, task_id = task.id, "Failed to notify"),
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn task(created_by: Option<MemberId>) -> Task {
        Task {
            id: 42,
            title: "Login form".into(),
            team_id: 7,
            created_by,
        }
    }

    #[test]
    fn creator_not_assigned() {
        assert_eq!(recipients(&task(Some(9)), &[1, 2]), [1, 2, 9]);
    }

    #[test]
    fn creator_already_assigned() {
        assert_eq!(recipients(&task(Some(2)), &[1, 2]), [1, 2]);
    }

    #[test]
    fn no_creator_no_assignees() {
        assert!(recipients(&task(None), &[]).is_empty());
        assert_eq!(recipients(&task(None), &[3, 3]), [3]);
    }

    #[tokio::test]
    async fn fan_out_sends_per_recipient() {
        let store = MemoryStore::default();
        let sent = fan_out(&store, &task(Some(9)), &[1], "feat: login", true).await;
        assert_eq!(sent, 2);

        let notices = store.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].recipient, 1);
        assert_eq!(notices[1].recipient, 9);
        assert!(notices.iter().all(|n| n.via_branch && n.team_id == 7 && n.task_id == 42));
        assert_eq!(notices[0].commit_message, "feat: login");
    }

    struct Unreachable(MemberId, MemoryStore);

    #[async_trait]
    impl Notifier for Unreachable {
        async fn commit_linked(&self, notice: &CommitLinkedNotice) -> Result<(), StoreError> {
            if notice.recipient == self.0 {
                return Err(StoreError::Notify("mailbox unavailable".into()));
            }
            self.1.commit_linked(notice).await
        }
    }

    #[tokio::test]
    async fn failed_send_does_not_stop_the_rest() {
        let notifier = Unreachable(1, MemoryStore::default());
        let sent = fan_out(&notifier, &task(Some(9)), &[1, 2], "feat: login", false).await;
        assert_eq!(sent, 2);
        let recipients = notifier.1.notices().iter().map(|n| n.recipient).collect::<Vec<_>>();
        assert_eq!(recipients, [2, 9]);
    }
}

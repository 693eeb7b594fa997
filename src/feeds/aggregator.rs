use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::access::Visibility;

use super::model::{ActionItem, ActivityItem, DiscussionItem, FeedStore, FileItem};

/// 单个内容槽位的三态结果。
/// Hidden 表示无权查看，Shown 带条目（可以为空），
/// Failed 表示有权查看但该槽位读取失败，其余槽位不受影响。
/// 禁止用空列表冒充 Hidden。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedSlot<T> {
    Hidden,
    Shown { items: Vec<T> },
    Failed,
}

impl<T> FeedSlot<T> {
    pub fn is_shown(&self) -> bool {
        matches!(self, FeedSlot::Shown { .. })
    }

    pub fn items(&self) -> Option<&[T]> {
        match self {
            FeedSlot::Shown { items } => Some(items),
            _ => None,
        }
    }
}

/// 聚合视图，四个槽位各自独立
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedBundle {
    pub discussions: FeedSlot<DiscussionItem>,
    pub files: FeedSlot<FileItem>,
    pub actions: FeedSlot<ActionItem>,
    pub activities: FeedSlot<ActivityItem>,
}

async fn fetch_slot<T, F>(permitted: bool, timeout: Duration, label: &str, fetch: F) -> FeedSlot<T>
where
    F: Future<Output = Result<Vec<T>, sqlx::Error>>,
{
    if !permitted {
        return FeedSlot::Hidden;
    }

    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(items)) => FeedSlot::Shown { items },
        Ok(Err(e)) => {
            tracing::warn!("Failed to fetch {} feed: {}", label, e);
            FeedSlot::Failed
        }
        Err(_) => {
            tracing::warn!("Fetching {} feed timed out", label);
            FeedSlot::Failed
        }
    }
}

/// 按可见性读取允许的集合并组装有界视图。
/// 四个读取彼此独立，并发发出，单个槽位的超时或出错只降级该槽位。
pub async fn aggregate(
    store: &dyn FeedStore,
    group_id: &str,
    visibility: Visibility,
    now: DateTime<Utc>,
    timeout: Duration,
) -> FeedBundle {
    let (discussions, files, actions, activities) = tokio::join!(
        fetch_slot(
            visibility.discussions,
            timeout,
            "discussion",
            store.recent_discussions(group_id),
        ),
        fetch_slot(
            visibility.files,
            timeout,
            "file",
            store.recent_files(group_id),
        ),
        fetch_slot(
            visibility.actions,
            timeout,
            "action",
            store.upcoming_actions(group_id, now),
        ),
        fetch_slot(
            visibility.activities,
            timeout,
            "activity",
            store.recent_activities(group_id),
        ),
    );

    FeedBundle {
        discussions,
        files,
        actions,
        activities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeFeedStore {
        discussions: Vec<DiscussionItem>,
        files: Vec<FileItem>,
        actions: Vec<ActionItem>,
        activities: Vec<ActivityItem>,
        discussions_fail: bool,
        slow_files: bool,
    }

    #[async_trait]
    impl FeedStore for FakeFeedStore {
        async fn recent_discussions(
            &self,
            _group_id: &str,
        ) -> Result<Vec<DiscussionItem>, sqlx::Error> {
            if self.discussions_fail {
                return Err(sqlx::Error::PoolTimedOut);
            }
            Ok(self.discussions.clone())
        }

        async fn recent_files(&self, _group_id: &str) -> Result<Vec<FileItem>, sqlx::Error> {
            if self.slow_files {
                tokio::time::sleep(Duration::from_secs(120)).await;
            }
            Ok(self.files.clone())
        }

        async fn upcoming_actions(
            &self,
            _group_id: &str,
            now: DateTime<Utc>,
        ) -> Result<Vec<ActionItem>, sqlx::Error> {
            Ok(self
                .actions
                .iter()
                .filter(|a| a.start >= now)
                .cloned()
                .collect())
        }

        async fn recent_activities(
            &self,
            _group_id: &str,
        ) -> Result<Vec<ActivityItem>, sqlx::Error> {
            Ok(self.activities.clone())
        }
    }

    fn discussion(id: &str) -> DiscussionItem {
        DiscussionItem {
            discussion_id: id.into(),
            title: "On reading".into(),
            author: "ann".into(),
            reply_count: 2,
            updated_at: Utc::now(),
        }
    }

    const ALL: Visibility = Visibility {
        discussions: true,
        files: true,
        actions: true,
        activities: true,
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn denied_slots_are_hidden_not_empty() {
        let store = FakeFeedStore {
            discussions: vec![discussion("d1")],
            ..Default::default()
        };
        let visibility = Visibility {
            discussions: true,
            files: false,
            actions: false,
            activities: false,
        };

        let bundle = aggregate(&store, "g1", visibility, Utc::now(), TIMEOUT).await;
        assert!(bundle.discussions.is_shown());
        assert_eq!(bundle.files, FeedSlot::Hidden);
        assert_eq!(bundle.actions, FeedSlot::Hidden);
        assert_eq!(bundle.activities, FeedSlot::Hidden);
    }

    #[tokio::test]
    async fn permitted_empty_collections_are_shown_empty() {
        let store = FakeFeedStore::default();

        let bundle = aggregate(&store, "g1", ALL, Utc::now(), TIMEOUT).await;
        assert_eq!(bundle.discussions, FeedSlot::Shown { items: vec![] });
        assert_eq!(bundle.files, FeedSlot::Shown { items: vec![] });
        assert_eq!(bundle.actions, FeedSlot::Shown { items: vec![] });
        assert_eq!(bundle.activities, FeedSlot::Shown { items: vec![] });
    }

    #[tokio::test]
    async fn aggregation_is_idempotent_without_intervening_mutation() {
        let store = FakeFeedStore {
            discussions: vec![discussion("d1"), discussion("d2")],
            ..Default::default()
        };
        let now = Utc::now();

        let first = aggregate(&store, "g1", ALL, now, TIMEOUT).await;
        let second = aggregate(&store, "g1", ALL, now, TIMEOUT).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn one_failed_fetch_degrades_only_its_slot() {
        let store = FakeFeedStore {
            discussions_fail: true,
            files: vec![FileItem {
                file_id: "f1".into(),
                name: "minutes.pdf".into(),
                uploader: "ann".into(),
                updated_at: Utc::now(),
            }],
            ..Default::default()
        };

        let bundle = aggregate(&store, "g1", ALL, Utc::now(), TIMEOUT).await;
        assert_eq!(bundle.discussions, FeedSlot::Failed);
        assert!(bundle.files.is_shown());
        assert!(bundle.actions.is_shown());
        assert!(bundle.activities.is_shown());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out_into_failed_slot() {
        let store = FakeFeedStore {
            slow_files: true,
            ..Default::default()
        };

        let bundle = aggregate(&store, "g1", ALL, Utc::now(), TIMEOUT).await;
        assert_eq!(bundle.files, FeedSlot::Failed);
        assert!(bundle.discussions.is_shown());
    }

    #[tokio::test]
    async fn past_actions_are_filtered_out() {
        let now = Utc::now();
        let past = ActionItem {
            action_id: "a1".into(),
            title: "Old meetup".into(),
            location: None,
            start: now - chrono::Duration::days(1),
            stop: now - chrono::Duration::hours(22),
        };
        let upcoming = ActionItem {
            action_id: "a2".into(),
            title: "Next meetup".into(),
            location: Some("Library".into()),
            start: now + chrono::Duration::days(1),
            stop: now + chrono::Duration::days(1) + chrono::Duration::hours(2),
        };
        let store = FakeFeedStore {
            actions: vec![past, upcoming.clone()],
            ..Default::default()
        };

        let bundle = aggregate(&store, "g1", ALL, now, TIMEOUT).await;
        assert_eq!(bundle.actions.items(), Some(&[upcoming][..]));
    }
}

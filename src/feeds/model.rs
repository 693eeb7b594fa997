use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

// 摘要视图的固定条数上限，不做分页
pub const DISCUSSION_LIMIT: i64 = 5;
pub const FILE_LIMIT: i64 = 5;
pub const ACTION_LIMIT: i64 = 10;
pub const ACTIVITY_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DiscussionItem {
    pub discussion_id: String,
    pub title: String,
    pub author: String,
    pub reply_count: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct FileItem {
    pub file_id: String,
    pub name: String,
    pub uploader: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ActionItem {
    pub action_id: String,
    pub title: String,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ActivityItem {
    pub activity_id: String,
    pub user_id: String,
    pub action: String,
    pub object_type: String,
    pub object_id: String,
    pub created_at: DateTime<Utc>,
}

/// 按群组读取四个内容集合，每个集合带自己的过滤、排序和上限
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn recent_discussions(&self, group_id: &str)
    -> Result<Vec<DiscussionItem>, sqlx::Error>;

    async fn recent_files(&self, group_id: &str) -> Result<Vec<FileItem>, sqlx::Error>;

    async fn upcoming_actions(
        &self,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActionItem>, sqlx::Error>;

    async fn recent_activities(&self, group_id: &str) -> Result<Vec<ActivityItem>, sqlx::Error>;
}

pub struct PgFeedStore {
    pool: PgPool,
}

impl PgFeedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn recent_discussions(
        &self,
        group_id: &str,
    ) -> Result<Vec<DiscussionItem>, sqlx::Error> {
        // 内连接排除作者已不存在的讨论
        sqlx::query_as::<_, DiscussionItem>(
            r#"
            SELECT d.discussion_id, d.title, u.nickname AS author, d.reply_count, d.updated_at
            FROM discussions d
            JOIN users u ON u.user_id = d.user_id
            WHERE d.group_id = $1 AND d.deleted_at IS NULL
            ORDER BY d.updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(group_id)
        .bind(DISCUSSION_LIMIT)
        .fetch_all(&self.pool)
        .await
    }

    async fn recent_files(&self, group_id: &str) -> Result<Vec<FileItem>, sqlx::Error> {
        sqlx::query_as::<_, FileItem>(
            r#"
            SELECT f.file_id, f.name, u.nickname AS uploader, f.updated_at
            FROM files f
            JOIN users u ON u.user_id = f.user_id
            WHERE f.group_id = $1 AND f.deleted_at IS NULL
            ORDER BY f.updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(group_id)
        .bind(FILE_LIMIT)
        .fetch_all(&self.pool)
        .await
    }

    async fn upcoming_actions(
        &self,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActionItem>, sqlx::Error> {
        // 只取未开始或进行中的日程，按开始时间正序
        sqlx::query_as::<_, ActionItem>(
            r#"
            SELECT action_id, title, location, start, stop
            FROM actions
            WHERE group_id = $1 AND deleted_at IS NULL AND start >= $2
            ORDER BY start ASC
            LIMIT $3
            "#,
        )
        .bind(group_id)
        .bind(now)
        .bind(ACTION_LIMIT)
        .fetch_all(&self.pool)
        .await
    }

    async fn recent_activities(&self, group_id: &str) -> Result<Vec<ActivityItem>, sqlx::Error> {
        sqlx::query_as::<_, ActivityItem>(
            r#"
            SELECT activity_id, user_id, action, object_type, object_id, created_at
            FROM activities
            WHERE group_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(group_id)
        .bind(ACTIVITY_LIMIT)
        .fetch_all(&self.pool)
        .await
    }
}

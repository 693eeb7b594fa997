use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::access::Role;

// 缓存相关常量
const GROUP_CACHE_EXPIRE: u64 = 600; // 群组缓存过期时间，单位秒
const GROUP_ID_CACHE_PREFIX: &str = "group:id:"; // 群组ID缓存前缀

// 创建群组时发起人的默认通知间隔（分钟），0 表示从不通知
pub const DEFAULT_NOTIFICATION_INTERVAL: i32 = 60 * 24;

/// 群组类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Association,
    Collective,
    Company,
    Informal,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Association => "association",
            GroupType::Collective => "collective",
            GroupType::Company => "company",
            GroupType::Informal => "informal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "association" => Some(GroupType::Association),
            "collective" => Some(GroupType::Collective),
            "company" => Some(GroupType::Company),
            "informal" => Some(GroupType::Informal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: String,
    pub name: String,
    pub body: String,
    pub group_type: GroupType,
    pub is_public: bool,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// 数据库行，group_type 在行内是 TEXT
#[derive(Debug, FromRow)]
struct GroupRow {
    group_id: String,
    name: String,
    body: String,
    group_type: String,
    is_public: bool,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    user_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<GroupRow> for Group {
    type Error = sqlx::Error;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        let group_type = GroupType::parse(&row.group_type).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown group_type: {}", row.group_type).into())
        })?;

        Ok(Group {
            group_id: row.group_id,
            name: row.name,
            body: row.body,
            group_type,
            is_public: row.is_public,
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub group_id: String,
    pub user_id: String,
    pub role: Role,
    pub notification_interval: i32,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    group_id: String,
    user_id: String,
    role: String,
    notification_interval: i32,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = sqlx::Error;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown role: {}", row.role).into()))?;

        Ok(Membership {
            group_id: row.group_id,
            user_id: row.user_id,
            role,
            notification_interval: row.notification_interval,
            joined_at: row.joined_at,
        })
    }
}

/// 展示层的成员摘要
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MemberInfo {
    pub user_id: String,
    pub nickname: String,
}

/// 群组及其成员、标签的持久化协作者接口
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn insert(&self, group: &Group) -> Result<(), sqlx::Error>;

    async fn save(&self, group: &Group) -> Result<(), sqlx::Error>;

    async fn soft_delete(&self, group_id: &str) -> Result<(), sqlx::Error>;

    async fn find_by_id(&self, group_id: &str) -> Result<Option<Group>, sqlx::Error>;

    async fn membership_role(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<Option<Role>, sqlx::Error>;

    /// 以 (user, group) 为键的 find-or-create，避免重复成员行
    async fn find_or_create_membership(
        &self,
        user_id: &str,
        group_id: &str,
        role: Role,
        notification_interval: i32,
    ) -> Result<Membership, sqlx::Error>;

    /// 整体替换标签集合：全部删除后重建，不做差量合并
    async fn replace_tags(&self, group_id: &str, tags: &[String]) -> Result<(), sqlx::Error>;

    async fn tags_of(&self, group_id: &str) -> Result<Vec<String>, sqlx::Error>;

    async fn admins_of(&self, group_id: &str) -> Result<Vec<MemberInfo>, sqlx::Error>;

    /// 系统管理员（不是群组管理员），创建通知的收件人集合
    async fn system_admin_ids(&self) -> Result<Vec<String>, sqlx::Error>;
}

pub struct PgGroupStore {
    pool: PgPool,
    redis: Arc<RedisClient>,
}

impl PgGroupStore {
    pub fn new(pool: PgPool, redis: Arc<RedisClient>) -> Self {
        Self { pool, redis }
    }

    async fn invalidate_cache(&self, group_id: &str) {
        if let Ok(mut conn) = self.redis.get_multiplexed_async_connection().await {
            let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);
            let _: Result<(), redis::RedisError> = conn.del(&cache_key).await;
        }
    }
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn insert(&self, group: &Group) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO groups (
                group_id, name, body, group_type, is_public, address,
                latitude, longitude, user_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&group.group_id)
        .bind(&group.name)
        .bind(&group.body)
        .bind(group.group_type.as_str())
        .bind(group.is_public)
        .bind(&group.address)
        .bind(group.latitude)
        .bind(group.longitude)
        .bind(&group.user_id)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, group: &Group) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE groups
            SET name = $2, body = $3, group_type = $4, is_public = $5, address = $6,
                latitude = $7, longitude = $8, user_id = $9, updated_at = $10
            WHERE group_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(&group.group_id)
        .bind(&group.name)
        .bind(&group.body)
        .bind(group.group_type.as_str())
        .bind(group.is_public)
        .bind(&group.address)
        .bind(group.latitude)
        .bind(group.longitude)
        .bind(&group.user_id)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;

        // 写入后清除缓存
        self.invalidate_cache(&group.group_id).await;

        Ok(())
    }

    async fn soft_delete(&self, group_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE groups
            SET deleted_at = NOW()
            WHERE group_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(group_id)
        .execute(&self.pool)
        .await?;

        self.invalidate_cache(group_id).await;

        Ok(())
    }

    async fn find_by_id(&self, group_id: &str) -> Result<Option<Group>, sqlx::Error> {
        // 尝试从缓存读取
        let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);

        if let Ok(mut conn) = self.redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

            if let Ok(json_str) = cached {
                if let Ok(group) = serde_json::from_str::<Group>(&json_str) {
                    tracing::debug!("Get group from cache: {}", cache_key);
                    return Ok(Some(group));
                }
            }
        }

        // 从数据库查询，软删除的群组不可见
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT group_id, name, body, group_type, is_public, address,
                   latitude, longitude, user_id, created_at, updated_at, deleted_at
            FROM groups
            WHERE group_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        let group = row.map(Group::try_from).transpose()?;

        // 缓存结果
        if let Some(ref g) = group {
            if let Ok(mut conn) = self.redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(g) {
                    let _: Result<(), redis::RedisError> =
                        conn.set_ex(&cache_key, json_str, GROUP_CACHE_EXPIRE).await;
                    tracing::debug!("Set group to cache: {}", cache_key);
                }
            }
        }

        Ok(group)
    }

    async fn membership_role(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<Option<Role>, sqlx::Error> {
        let role: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT role FROM memberships
            WHERE user_id = $1 AND group_id = $2
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        role.map(|(r,)| {
            Role::parse(&r).ok_or_else(|| sqlx::Error::Decode(format!("unknown role: {}", r).into()))
        })
        .transpose()
    }

    async fn find_or_create_membership(
        &self,
        user_id: &str,
        group_id: &str,
        role: Role,
        notification_interval: i32,
    ) -> Result<Membership, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO memberships (group_id, user_id, role, notification_interval, joined_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(notification_interval)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT group_id, user_id, role, notification_interval, joined_at
            FROM memberships
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Membership::try_from(row)
    }

    async fn replace_tags(&self, group_id: &str, tags: &[String]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM group_tags WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        for tag in tags {
            sqlx::query(
                r#"
                INSERT INTO group_tags (group_id, tag)
                VALUES ($1, $2)
                ON CONFLICT (group_id, tag) DO NOTHING
                "#,
            )
            .bind(group_id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    async fn tags_of(&self, group_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let tags: Vec<(String,)> =
            sqlx::query_as("SELECT tag FROM group_tags WHERE group_id = $1 ORDER BY tag")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(tags.into_iter().map(|(t,)| t).collect())
    }

    async fn admins_of(&self, group_id: &str) -> Result<Vec<MemberInfo>, sqlx::Error> {
        sqlx::query_as::<_, MemberInfo>(
            r#"
            SELECT u.user_id, u.nickname
            FROM memberships m
            JOIN users u ON u.user_id = m.user_id
            WHERE m.group_id = $1 AND m.role = 'admin'
            ORDER BY u.nickname
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn system_admin_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM users WHERE is_admin = TRUE")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

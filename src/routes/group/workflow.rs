use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::access::{Capability, GroupAccess, Role, Viewer, allows};
use crate::geocode::{GeocodeOutcome, Geocoder, resolve_address};
use crate::images::{CodecError, DerivativeError, DerivativePipeline};
use crate::notify::{GroupCreatedNotification, Notifier, notify_admins};

use super::model::{DEFAULT_NOTIFICATION_INTERVAL, Group, GroupStore, GroupType};

const ADDRESS_MAX_LEN: usize = 500;

/// 按字段归集的校验错误，调用方据此重新渲染表单
pub type FieldErrors = BTreeMap<&'static str, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    // 可恢复：调用方带着保留的输入重新提交
    #[error("validation failed")]
    Validation(FieldErrors),
    // 权限拒绝：整个动作拒绝执行，与校验失败严格区分
    #[error("forbidden")]
    Forbidden,
    #[error("group not found")]
    NotFound,
    // 衍生图失败只影响图片步骤，基础记录此时已保存
    #[error(transparent)]
    Derivative(#[from] DerivativeError),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// 创建/更新的原始输入，group_type 在校验阶段才解析
#[derive(Debug, Clone)]
pub struct GroupInput {
    pub name: String,
    pub body: String,
    pub group_type: String,
    pub is_public: bool,
    pub address: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// 保存成功的结果：记录本体、地理编码信号和投递失败数
#[derive(Debug)]
pub struct SavedGroup {
    pub group: Group,
    pub geocode: GeocodeOutcome,
    pub delivery_failures: usize,
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub notify_admins_on_group_create: bool,
    pub geocoder_timeout: Duration,
}

/// 群组生命周期编排：校验、持久化、归属、标签、地理编码、
/// 衍生图、发起人管理员身份和管理员通知扇出。
/// 所有协作者都由构造方注入，不读取任何全局状态。
pub struct GroupWorkflow {
    store: Arc<dyn GroupStore>,
    geocoder: Arc<dyn Geocoder>,
    derivatives: Option<Arc<DerivativePipeline>>,
    notifier: Arc<dyn Notifier>,
    settings: WorkflowSettings,
}

fn validate(input: &GroupInput) -> Result<GroupType, FieldErrors> {
    let mut errors = FieldErrors::new();

    if input.name.trim().is_empty() {
        errors.entry("name").or_default().push("name is required".into());
    }
    if input.body.trim().is_empty() {
        errors.entry("body").or_default().push("body is required".into());
    }

    let group_type = GroupType::parse(&input.group_type);
    if group_type.is_none() {
        errors
            .entry("group_type")
            .or_default()
            .push(format!("unknown group type: {}", input.group_type));
    }

    if let Some(address) = &input.address {
        if address.len() > ADDRESS_MAX_LEN {
            errors
                .entry("address")
                .or_default()
                .push("address is too long".into());
        }
    }

    match group_type {
        Some(group_type) if errors.is_empty() => Ok(group_type),
        _ => Err(errors),
    }
}

impl GroupWorkflow {
    pub fn new(
        store: Arc<dyn GroupStore>,
        geocoder: Arc<dyn Geocoder>,
        derivatives: Option<Arc<DerivativePipeline>>,
        notifier: Arc<dyn Notifier>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            geocoder,
            derivatives,
            notifier,
            settings,
        }
    }

    pub async fn create(
        &self,
        actor: &Viewer,
        input: GroupInput,
        cover: Option<&[u8]>,
    ) -> Result<SavedGroup, WorkflowError> {
        // 创建不依赖具体群组，用中性的 access 询问 gate
        let access = GroupAccess {
            is_public: false,
            role: None,
        };
        let Some(user_id) = actor.user_id() else {
            return Err(WorkflowError::Forbidden);
        };
        if !allows(actor, &access, Capability::Create) {
            return Err(WorkflowError::Forbidden);
        }

        // 校验失败在任何持久化或副作用之前中止
        let group_type = validate(&input).map_err(WorkflowError::Validation)?;

        let address = input
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        let geocode = resolve_address(
            self.geocoder.as_ref(),
            address.as_deref().unwrap_or(""),
            self.settings.geocoder_timeout,
        )
        .await;

        let (latitude, longitude) = match geocode {
            GeocodeOutcome::Resolved {
                latitude,
                longitude,
            } => (Some(latitude), Some(longitude)),
            _ => (None, None),
        };

        let now = Utc::now();
        let group = Group {
            group_id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            body: input.body.clone(),
            group_type,
            is_public: input.is_public,
            address,
            latitude,
            longitude,
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.store.insert(&group).await?;

        if let Some(tags) = &input.tags {
            self.store.replace_tags(&group.group_id, tags).await?;
        }

        if let Some(raw) = cover {
            self.derive_cover(raw, &group.group_id).await?;
        }

        // 发起人成为唯一的群组管理员
        self.store
            .find_or_create_membership(
                user_id,
                &group.group_id,
                Role::Admin,
                DEFAULT_NOTIFICATION_INTERVAL,
            )
            .await?;

        let mut delivery_failures = 0;
        if self.settings.notify_admins_on_group_create {
            let admin_ids = self.store.system_admin_ids().await?;
            let event = GroupCreatedNotification {
                group_id: group.group_id.clone(),
                group_name: group.name.clone(),
                created_by: user_id.to_string(),
            };
            delivery_failures = notify_admins(self.notifier.as_ref(), &admin_ids, &event)
                .await
                .len();
        }

        Ok(SavedGroup {
            group,
            geocode,
            delivery_failures,
        })
    }

    pub async fn update(
        &self,
        actor: &Viewer,
        group_id: &str,
        input: GroupInput,
        cover: Option<&[u8]>,
    ) -> Result<SavedGroup, WorkflowError> {
        let Some(user_id) = actor.user_id() else {
            return Err(WorkflowError::Forbidden);
        };

        let mut group = self
            .store
            .find_by_id(group_id)
            .await?
            .ok_or(WorkflowError::NotFound)?;

        // 更新至少要求群组成员身份
        let role = self.store.membership_role(user_id, group_id).await?;
        if role.is_none() {
            return Err(WorkflowError::Forbidden);
        }
        let access = GroupAccess {
            is_public: group.is_public,
            role,
        };

        let group_type = validate(&input).map_err(WorkflowError::Validation)?;

        group.name = input.name.trim().to_string();
        group.body = input.body.clone();
        group.is_public = input.is_public;

        // 类别变更单独鉴权，拒绝时静默保留原值而不是报错
        if allows(actor, &access, Capability::ChangeGroupType) {
            group.group_type = group_type;
        }

        // 地址变化才重新地理编码，一次保存最多尝试一次
        let submitted = input
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let geocode = if submitted != group.address {
            group.address = submitted;
            let outcome = resolve_address(
                self.geocoder.as_ref(),
                group.address.as_deref().unwrap_or(""),
                self.settings.geocoder_timeout,
            )
            .await;
            match outcome {
                GeocodeOutcome::Resolved {
                    latitude,
                    longitude,
                } => {
                    group.latitude = Some(latitude);
                    group.longitude = Some(longitude);
                }
                // 失败或地址被清空都回到无坐标状态
                _ => {
                    group.latitude = None;
                    group.longitude = None;
                }
            }
            outcome
        } else {
            GeocodeOutcome::NotAttempted
        };

        // 每次编辑都会把归属改到当前编辑者（保留原系统的行为）
        group.user_id = user_id.to_string();
        group.updated_at = Utc::now();

        self.store.save(&group).await?;

        if let Some(tags) = &input.tags {
            self.store.replace_tags(&group.group_id, tags).await?;
        }

        if let Some(raw) = cover {
            self.derive_cover(raw, &group.group_id).await?;
        }

        Ok(SavedGroup {
            group,
            geocode,
            delivery_failures: 0,
        })
    }

    pub async fn delete(&self, actor: &Viewer, group_id: &str) -> Result<(), WorkflowError> {
        let Some(user_id) = actor.user_id() else {
            return Err(WorkflowError::Forbidden);
        };

        let group = self
            .store
            .find_by_id(group_id)
            .await?
            .ok_or(WorkflowError::NotFound)?;

        let role = self.store.membership_role(user_id, group_id).await?;
        let access = GroupAccess {
            is_public: group.is_public,
            role,
        };
        if !allows(actor, &access, Capability::Delete) {
            return Err(WorkflowError::Forbidden);
        }

        self.store.soft_delete(group_id).await?;
        Ok(())
    }

    async fn derive_cover(&self, raw: &[u8], group_id: &str) -> Result<(), WorkflowError> {
        let Some(pipeline) = &self.derivatives else {
            return Err(WorkflowError::Derivative(DerivativeError::Codec(
                CodecError("no image codec registered".into()),
            )));
        };
        pipeline.derive(raw, group_id).await?;
        Ok(())
    }
}

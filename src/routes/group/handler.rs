use std::sync::Arc;

use axum::{
    Extension,
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::access::{GroupAccess, Viewer, resolve};
use crate::feeds::{FeedBundle, PgFeedStore, aggregate};
use crate::utils::{
    Claims, error_codes, error_to_api_response, success_to_api_response, validation_to_api_response,
};

use super::model::{Group, GroupStore, GroupType, MemberInfo, PgGroupStore};
use super::workflow::{GroupInput, GroupWorkflow, SavedGroup, WorkflowError, WorkflowSettings};

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub body: String,
    pub group_type: String,
    #[serde(default)]
    pub is_public: bool,
    pub address: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub group_id: String,
    pub name: String,
    pub body: String,
    pub group_type: String,
    #[serde(default)]
    pub is_public: bool,
    pub address: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub name: String,
    pub body: String,
    pub group_type: GroupType,
    pub is_public: bool,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Group> for GroupInfo {
    fn from(group: Group) -> Self {
        Self {
            group_id: group.group_id,
            name: group.name,
            body: group.body,
            group_type: group.group_type,
            is_public: group.is_public,
            address: group.address,
            latitude: group.latitude,
            longitude: group.longitude,
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaveGroupResponse {
    pub group: GroupInfo,
    // 地理编码的提示信号："geocoded" / "geocode_failed"，未尝试时缺省
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geocode: Option<&'static str>,
}

impl From<SavedGroup> for SaveGroupResponse {
    fn from(saved: SavedGroup) -> Self {
        Self {
            geocode: saved.geocode.signal(),
            group: GroupInfo::from(saved.group),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub group: GroupInfo,
    pub admins: Vec<MemberInfo>,
    pub tags: Vec<String>,
    pub feeds: FeedBundle,
}

fn workflow(state: &AppState) -> GroupWorkflow {
    GroupWorkflow::new(
        Arc::new(PgGroupStore::new(state.pool.clone(), state.redis.clone())),
        state.geocoder.clone(),
        // 封面走部署方注册的编解码协作者，JSON 接口不收图片
        None,
        state.notifier.clone(),
        WorkflowSettings {
            notify_admins_on_group_create: state.config.notify_admins_on_group_create,
            geocoder_timeout: state.config.geocoder_timeout(),
        },
    )
}

// 把工作流错误映射到响应信封，鉴权失败和校验失败必须可区分
fn workflow_error_response(e: WorkflowError) -> Response {
    match e {
        WorkflowError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            validation_to_api_response("validation failed".to_string(), errors),
        )
            .into_response(),
        WorkflowError::Forbidden => (
            StatusCode::FORBIDDEN,
            error_to_api_response::<()>(error_codes::PERMISSION_DENIED, "Forbidden".to_string()),
        )
            .into_response(),
        WorkflowError::NotFound => (
            StatusCode::NOT_FOUND,
            error_to_api_response::<()>(error_codes::NOT_FOUND, "Group not found".to_string()),
        )
            .into_response(),
        WorkflowError::Derivative(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response::<()>(error_codes::INTERNAL_ERROR, e.to_string()),
        )
            .into_response(),
        WorkflowError::Storage(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response::<()>(error_codes::INTERNAL_ERROR, e.to_string()),
        )
            .into_response(),
    }
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> impl IntoResponse {
    let viewer = Viewer::from(&claims);
    let input = GroupInput {
        name: req.name,
        body: req.body,
        group_type: req.group_type,
        is_public: req.is_public,
        address: req.address,
        tags: req.tags,
    };

    match workflow(&state).create(&viewer, input, None).await {
        Ok(saved) => (
            StatusCode::CREATED,
            success_to_api_response(SaveGroupResponse::from(saved)),
        )
            .into_response(),
        Err(e) => workflow_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn update_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateGroupRequest>,
) -> impl IntoResponse {
    let viewer = Viewer::from(&claims);
    let input = GroupInput {
        name: req.name,
        body: req.body,
        group_type: req.group_type,
        is_public: req.is_public,
        address: req.address,
        tags: req.tags,
    };

    match workflow(&state).update(&viewer, &req.group_id, input, None).await {
        Ok(saved) => (
            StatusCode::OK,
            success_to_api_response(SaveGroupResponse::from(saved)),
        )
            .into_response(),
        Err(e) => workflow_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<IdQuery>,
) -> impl IntoResponse {
    let viewer = Viewer::from(&claims);

    match workflow(&state).delete(&viewer, &req.group_id).await {
        Ok(()) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({
                "success": true
            })),
        )
            .into_response(),
        Err(e) => workflow_error_response(e),
    }
}

/// 群组详情：按访问者解析四个集合的可见性并聚合成有界视图。
/// 匿名访客也会走到这里，身份由 viewer 中间件注入。
#[axum::debug_handler]
pub async fn show_group(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<IdQuery>,
) -> impl IntoResponse {
    let store = PgGroupStore::new(state.pool.clone(), state.redis.clone());

    let group = match store.find_by_id(&query.group_id).await {
        Ok(Some(group)) => group,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response::<()>(error_codes::NOT_FOUND, "Group not found".to_string()),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, e.to_string()),
            )
                .into_response();
        }
    };

    // 匿名访客没有成员关系可查
    let role = match viewer.user_id() {
        Some(user_id) => match store.membership_role(user_id, &group.group_id).await {
            Ok(role) => role,
            Err(e) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_to_api_response::<()>(error_codes::INTERNAL_ERROR, e.to_string()),
                )
                    .into_response();
            }
        },
        None => None,
    };

    let access = GroupAccess {
        is_public: group.is_public,
        role,
    };
    let visibility = resolve(&viewer, &access);

    let feed_store = PgFeedStore::new(state.pool.clone());
    let feeds = aggregate(
        &feed_store,
        &group.group_id,
        visibility,
        Utc::now(),
        state.config.feed_timeout(),
    )
    .await;

    let (admins, tags) = match tokio::join!(
        store.admins_of(&group.group_id),
        store.tags_of(&group.group_id)
    ) {
        (Ok(admins), Ok(tags)) => (admins, tags),
        (Err(e), _) | (_, Err(e)) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, e.to_string()),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        success_to_api_response(GroupView {
            group: GroupInfo::from(group),
            admins,
            tags,
            feeds,
        }),
    )
        .into_response()
}

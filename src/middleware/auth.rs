use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    AppState,
    access::Viewer,
    utils::{error_codes, error_to_api_response, verify_token},
};

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        error_to_api_response::<()>(error_codes::AUTH_FAILED, "未授权访问".to_string()),
    )
        .into_response()
}

/// 受保护路由的认证中间件：校验 Bearer 令牌并把 Claims 注入请求
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(TypedHeader(auth)) = auth else {
        return unauthorized();
    };

    match verify_token(auth.token(), &state.config) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Token rejected: {}", e);
            unauthorized()
        }
    }
}

/// 可选身份中间件：没有令牌按匿名访客放行，
/// 带了无效令牌仍然按未授权拒绝而不是降级为匿名
pub async fn viewer_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let viewer = match auth {
        Some(TypedHeader(auth)) => match verify_token(auth.token(), &state.config) {
            Ok(claims) => Viewer::from(&claims),
            Err(e) => {
                tracing::debug!("Token rejected: {}", e);
                return unauthorized();
            }
        },
        None => Viewer::Anonymous,
    };

    request.extensions_mut().insert(viewer);
    next.run(request).await
}

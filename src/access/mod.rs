mod gate;
mod visibility;

pub use gate::{Capability, allows};
pub use visibility::{Visibility, resolve};

use crate::utils::Claims;

/// 访问者身份，匿名或已登录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Authenticated { user_id: String, verified: bool },
}

impl Viewer {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Authenticated { user_id, .. } => Some(user_id),
        }
    }
}

impl From<&Claims> for Viewer {
    fn from(claims: &Claims) -> Self {
        Viewer::Authenticated {
            user_id: claims.sub.clone(),
            verified: claims.is_verified,
        }
    }
}

/// 群组内的成员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// 权限判定所需的群组侧输入：公开标志 + 访问者在该群组中的角色。
/// 角色由调用方先行解析，判定本身不做任何 I/O。
#[derive(Debug, Clone, Copy)]
pub struct GroupAccess {
    pub is_public: bool,
    pub role: Option<Role>,
}

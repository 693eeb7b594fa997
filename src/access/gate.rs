use super::{GroupAccess, Role, Viewer};

/// 可判定的能力集合。未知能力在类型层面不可表达，
/// 调用错误在编译期暴露而不是运行期。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewDiscussions,
    ViewFiles,
    ViewActions,
    ViewActivities,
    Create,
    ChangeGroupType,
    Delete,
}

/// 纯函数：(访问者, 群组, 能力) -> 允许/拒绝。
/// 匿名访客在这里一律拒绝浏览能力，匿名的公开群组放行
/// 由 visibility::resolve 单独处理。
pub fn allows(viewer: &Viewer, group: &GroupAccess, capability: Capability) -> bool {
    match capability {
        // 只有已验证的登录用户才能创建群组
        Capability::Create => {
            matches!(viewer, Viewer::Authenticated { verified: true, .. })
        }
        // 成员可见，公开群组对登录的非成员也可见
        Capability::ViewDiscussions
        | Capability::ViewFiles
        | Capability::ViewActions
        | Capability::ViewActivities => {
            viewer.is_authenticated() && (group.role.is_some() || group.is_public)
        }
        // 仅限群组管理员
        Capability::ChangeGroupType | Capability::Delete => {
            viewer.is_authenticated() && group.role == Some(Role::Admin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(verified: bool) -> Viewer {
        Viewer::Authenticated {
            user_id: "u1".into(),
            verified,
        }
    }

    #[test]
    fn create_requires_verified_authenticated_viewer() {
        let group = GroupAccess {
            is_public: true,
            role: None,
        };
        assert!(allows(&member(true), &group, Capability::Create));
        assert!(!allows(&member(false), &group, Capability::Create));
        assert!(!allows(&Viewer::Anonymous, &group, Capability::Create));
    }

    #[test]
    fn members_can_view_private_group_feeds() {
        let group = GroupAccess {
            is_public: false,
            role: Some(Role::Member),
        };
        for cap in [
            Capability::ViewDiscussions,
            Capability::ViewFiles,
            Capability::ViewActions,
            Capability::ViewActivities,
        ] {
            assert!(allows(&member(true), &group, cap));
        }
    }

    #[test]
    fn non_members_can_view_public_but_not_private_groups() {
        let public = GroupAccess {
            is_public: true,
            role: None,
        };
        let private = GroupAccess {
            is_public: false,
            role: None,
        };
        for cap in [
            Capability::ViewDiscussions,
            Capability::ViewFiles,
            Capability::ViewActions,
            Capability::ViewActivities,
        ] {
            assert!(allows(&member(true), &public, cap));
            assert!(!allows(&member(true), &private, cap));
        }
    }

    #[test]
    fn anonymous_is_always_denied_by_the_gate() {
        let public = GroupAccess {
            is_public: true,
            role: None,
        };
        for cap in [
            Capability::ViewDiscussions,
            Capability::ViewFiles,
            Capability::ViewActions,
            Capability::ViewActivities,
            Capability::Create,
            Capability::ChangeGroupType,
            Capability::Delete,
        ] {
            assert!(!allows(&Viewer::Anonymous, &public, cap));
        }
    }

    #[test]
    fn admin_role_implies_change_group_type_and_delete() {
        let group = GroupAccess {
            is_public: false,
            role: Some(Role::Admin),
        };
        assert!(allows(&member(true), &group, Capability::ChangeGroupType));
        assert!(allows(&member(true), &group, Capability::Delete));
    }

    #[test]
    fn plain_members_cannot_administer() {
        let group = GroupAccess {
            is_public: true,
            role: Some(Role::Member),
        };
        assert!(!allows(&member(true), &group, Capability::ChangeGroupType));
        assert!(!allows(&member(true), &group, Capability::Delete));
    }
}

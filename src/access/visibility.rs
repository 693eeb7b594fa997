use serde::Serialize;

use super::{Capability, GroupAccess, Viewer, allows};

/// 四个内容集合各自是否可以被当前访问者查看
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visibility {
    pub discussions: bool,
    pub files: bool,
    pub actions: bool,
    pub activities: bool,
}

impl Visibility {
    pub const NONE: Visibility = Visibility {
        discussions: false,
        files: false,
        actions: false,
        activities: false,
    };
}

/// 按访问者分两条互斥的路径：
/// 登录用户逐项询问 gate；匿名访客没有成员关系可查，
/// 直接以群组自身的公开标志代替，但活动日志对匿名永远不可见。
pub fn resolve(viewer: &Viewer, group: &GroupAccess) -> Visibility {
    match viewer {
        Viewer::Anonymous => Visibility {
            discussions: group.is_public,
            files: group.is_public,
            actions: group.is_public,
            activities: false,
        },
        Viewer::Authenticated { .. } => Visibility {
            discussions: allows(viewer, group, Capability::ViewDiscussions),
            files: allows(viewer, group, Capability::ViewFiles),
            actions: allows(viewer, group, Capability::ViewActions),
            activities: allows(viewer, group, Capability::ViewActivities),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;

    #[test]
    fn anonymous_viewer_of_public_group_sees_everything_but_activities() {
        let vis = resolve(
            &Viewer::Anonymous,
            &GroupAccess {
                is_public: true,
                role: None,
            },
        );
        assert!(vis.discussions);
        assert!(vis.files);
        assert!(vis.actions);
        assert!(!vis.activities);
    }

    #[test]
    fn anonymous_viewer_of_private_group_sees_nothing() {
        let vis = resolve(
            &Viewer::Anonymous,
            &GroupAccess {
                is_public: false,
                role: None,
            },
        );
        assert_eq!(vis, Visibility::NONE);
    }

    #[test]
    fn authenticated_non_member_of_private_group_sees_nothing() {
        let viewer = Viewer::Authenticated {
            user_id: "u1".into(),
            verified: true,
        };
        let vis = resolve(
            &viewer,
            &GroupAccess {
                is_public: false,
                role: None,
            },
        );
        assert_eq!(vis, Visibility::NONE);
    }

    #[test]
    fn member_flags_match_the_gate_exactly() {
        let viewer = Viewer::Authenticated {
            user_id: "u1".into(),
            verified: false,
        };
        let group = GroupAccess {
            is_public: false,
            role: Some(Role::Member),
        };
        let vis = resolve(&viewer, &group);
        assert_eq!(vis.discussions, allows(&viewer, &group, Capability::ViewDiscussions));
        assert_eq!(vis.files, allows(&viewer, &group, Capability::ViewFiles));
        assert_eq!(vis.actions, allows(&viewer, &group, Capability::ViewActions));
        assert_eq!(vis.activities, allows(&viewer, &group, Capability::ViewActivities));
        assert!(vis.activities);
    }
}

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;

/// 群组创建事件的通知载荷
#[derive(Debug, Clone, Serialize)]
pub struct GroupCreatedNotification {
    pub group_id: String,
    pub group_name: String,
    pub created_by: String,
}

#[derive(Debug, thiserror::Error)]
#[error("delivery to {user_id} failed: {reason}")]
pub struct DeliveryError {
    pub user_id: String,
    pub reason: String,
}

/// 通知投递的外部协作者接口，投递通道（邮件、推送）在实现里
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        event: &GroupCreatedNotification,
    ) -> Result<(), DeliveryError>;
}

/// 向所有系统管理员并发扇出一条通知。
/// 单个收件人失败不影响其他收件人，失败集合汇总返回并记录日志，
/// 永远不会让触发它的创建流程失败。
pub async fn notify_admins(
    notifier: &dyn Notifier,
    admin_ids: &[String],
    event: &GroupCreatedNotification,
) -> Vec<DeliveryError> {
    let sends = admin_ids.iter().map(|id| notifier.notify(id, event));
    let failures: Vec<DeliveryError> = join_all(sends)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();

    for failure in &failures {
        tracing::warn!("Admin notification not delivered: {}", failure);
    }

    failures
}

/// 把投递写进日志的实现，真实投递通道不在本服务范围内
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        user_id: &str,
        event: &GroupCreatedNotification,
    ) -> Result<(), DeliveryError> {
        tracing::info!(
            "Notify {}: group {} created by {}",
            user_id,
            event.group_name,
            event.created_by
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeNotifier {
        failing: Vec<String>,
        delivered: Mutex<Vec<String>>,
    }

    impl FakeNotifier {
        fn failing_for(failing: Vec<String>) -> Self {
            Self {
                failing,
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn notify(
            &self,
            user_id: &str,
            _event: &GroupCreatedNotification,
        ) -> Result<(), DeliveryError> {
            if self.failing.iter().any(|id| id == user_id) {
                return Err(DeliveryError {
                    user_id: user_id.to_string(),
                    reason: "mailbox unreachable".into(),
                });
            }
            self.delivered.lock().unwrap().push(user_id.to_string());
            Ok(())
        }
    }

    fn event() -> GroupCreatedNotification {
        GroupCreatedNotification {
            group_id: "g1".into(),
            group_name: "Reading Club".into(),
            created_by: "u1".into(),
        }
    }

    #[tokio::test]
    async fn every_admin_is_notified() {
        let notifier = FakeNotifier::failing_for(vec![]);
        let admins = vec!["a1".to_string(), "a2".to_string(), "a3".to_string()];

        let failures = notify_admins(&notifier, &admins, &event()).await;
        assert!(failures.is_empty());

        let mut delivered = notifier.delivered.lock().unwrap().clone();
        delivered.sort();
        assert_eq!(delivered, admins);
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_cancel_the_others() {
        let notifier = FakeNotifier::failing_for(vec!["a2".to_string()]);
        let admins = vec!["a1".to_string(), "a2".to_string(), "a3".to_string()];

        let failures = notify_admins(&notifier, &admins, &event()).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].user_id, "a2");

        let mut delivered = notifier.delivered.lock().unwrap().clone();
        delivered.sort();
        assert_eq!(delivered, vec!["a1".to_string(), "a3".to_string()]);
    }

    #[tokio::test]
    async fn no_admins_means_no_deliveries_and_no_failures() {
        let notifier = FakeNotifier::failing_for(vec![]);
        let failures = notify_admins(&notifier, &[], &event()).await;
        assert!(failures.is_empty());
        assert!(notifier.delivered.lock().unwrap().is_empty());
    }
}

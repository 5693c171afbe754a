use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier;
use super::rate_tracker::SlidingWindowTracker;
use crate::model::{MessageEvent, TenantConfig};
use crate::platform::{ActionExecutor, PermissionResolver};

/// 单条链接违规最多上报的链接数
const MAX_REPORTED_LINKS: usize = 3;

/// 违规类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// 消息频率超限
    Spam,
    /// 未授权链接
    ForbiddenLink,
    /// 提及过多
    MentionFlood,
}

/// 违规证据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    MessageRate {
        count: usize,
        limit: u32,
        window_seconds: u64,
        excerpt: String,
    },
    Links {
        links: Vec<String>,
    },
    Mentions {
        count: usize,
        limit: usize,
    },
}

/// 一次违规
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub reason: String,
    pub evidence: Evidence,
}

/// 豁免原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exemption {
    /// 机器人发出的消息
    Bot,
    /// 权限解析器判定为版主
    Moderator,
    /// 持有租户配置的版主角色
    ModeratorRole,
}

/// 评估结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Exempt(Exemption),
    /// 可能为空（消息干净）
    Violations(Vec<Violation>),
}

/// 违规评估器
///
/// 按固定顺序独立执行三项检查：频率、链接、提及。
/// 一条消息可以同时触发多项违规，每项都单独处理。
pub struct ViolationEvaluator {
    tracker: Arc<SlidingWindowTracker>,
    permissions: Arc<dyn PermissionResolver>,
    executor: Arc<dyn ActionExecutor>,
}

impl ViolationEvaluator {
    pub fn new(
        tracker: Arc<SlidingWindowTracker>,
        permissions: Arc<dyn PermissionResolver>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            tracker,
            permissions,
            executor,
        }
    }

    /// 评估一条消息（含豁免判断）
    pub async fn evaluate(&self, event: &MessageEvent, config: &TenantConfig) -> Evaluation {
        if let Some(exemption) = self.exemption(event, config).await {
            debug!(
                "⏭️ 跳过审核: tenant={}, user={}, 原因={:?}",
                event.tenant_id, event.author_id, exemption
            );
            return Evaluation::Exempt(exemption);
        }
        Evaluation::Violations(self.check(event, config))
    }

    /// 三项检查（不含豁免判断）
    pub fn check(&self, event: &MessageEvent, config: &TenantConfig) -> Vec<Violation> {
        let mut violations = Vec::new();

        // 1. 频率
        if config.anti_spam.enabled {
            let count = self.tracker.record_and_count(
                event.tenant_id,
                event.author_id,
                event.occurred_at,
                config.anti_spam.window_seconds,
            );
            if count >= config.anti_spam.message_limit as usize {
                violations.push(Violation {
                    kind: ViolationKind::Spam,
                    reason: "message rate exceeded".to_string(),
                    evidence: Evidence::MessageRate {
                        count,
                        limit: config.anti_spam.message_limit,
                        window_seconds: config.anti_spam.window_seconds,
                        excerpt: event.excerpt(),
                    },
                });
            }
        }

        // 2. 链接
        if config.anti_links.enabled {
            let forbidden =
                classifier::disallowed_links(&event.content, &config.anti_links.allowed_domains);
            if !forbidden.is_empty() {
                violations.push(Violation {
                    kind: ViolationKind::ForbiddenLink,
                    reason: "unauthorized link".to_string(),
                    evidence: Evidence::Links {
                        links: forbidden.into_iter().take(MAX_REPORTED_LINKS).collect(),
                    },
                });
            }
        }

        // 3. 提及（始终检查）
        let mentions = classifier::mention_count(event);
        if mentions > config.max_mentions {
            violations.push(Violation {
                kind: ViolationKind::MentionFlood,
                reason: format!("too many mentions ({}/{})", mentions, config.max_mentions),
                evidence: Evidence::Mentions {
                    count: mentions,
                    limit: config.max_mentions,
                },
            });
        }

        violations
    }

    async fn exemption(&self, event: &MessageEvent, config: &TenantConfig) -> Option<Exemption> {
        if event.author_is_bot {
            return Some(Exemption::Bot);
        }
        if self
            .permissions
            .is_moderator(event.tenant_id, event.author_id)
            .await
        {
            return Some(Exemption::Moderator);
        }
        let role_id = config.moderator_role_id?;
        match self
            .executor
            .has_role(event.tenant_id, event.author_id, role_id)
            .await
        {
            Ok(true) => Some(Exemption::ModeratorRole),
            Ok(false) => None,
            Err(e) => {
                debug!(
                    "版主角色查询失败，按普通成员处理: tenant={}, user={}, error={}",
                    event.tenant_id, event.author_id, e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn evaluator() -> (ViolationEvaluator, Arc<InMemoryPlatform>) {
        let platform = Arc::new(InMemoryPlatform::new());
        let evaluator = ViolationEvaluator::new(
            Arc::new(SlidingWindowTracker::new()),
            platform.clone(),
            platform.clone(),
        );
        (evaluator, platform)
    }

    #[test]
    fn test_nth_message_triggers_spam() {
        let (evaluator, _) = evaluator();
        let config = TenantConfig::default();

        for i in 0..4 {
            let event = MessageEvent::new(1, 100, 5, i, "hi").at(t0() + Duration::milliseconds(i as i64 * 100));
            assert!(evaluator.check(&event, &config).is_empty(), "message {} flagged", i + 1);
        }
        let fifth = MessageEvent::new(1, 100, 5, 4, "hi").at(t0() + Duration::seconds(1));
        let violations = evaluator.check(&fifth, &config);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Spam);
        assert_eq!(violations[0].reason, "message rate exceeded");
    }

    #[test]
    fn test_disabled_checks_are_skipped() {
        let (evaluator, _) = evaluator();
        let mut config = TenantConfig::default();
        config.anti_spam.enabled = false;
        config.anti_links.enabled = false;
        config.anti_spam.message_limit = 1;

        let event = MessageEvent::new(1, 100, 5, 1, "discord.gg/xyz").at(t0());
        assert!(evaluator.check(&event, &config).is_empty());
    }

    #[test]
    fn test_link_evidence_is_capped() {
        let (evaluator, _) = evaluator();
        let config = TenantConfig::default();
        let event = MessageEvent::new(
            1,
            100,
            5,
            1,
            "a.net b.net c.net d.net e.net",
        )
        .at(t0());

        let violations = evaluator.check(&event, &config);
        assert_eq!(violations.len(), 1);
        match &violations[0].evidence {
            Evidence::Links { links } => assert_eq!(links.len(), 3),
            other => panic!("unexpected evidence: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_violations_on_one_message() {
        let (evaluator, _) = evaluator();
        let mut config = TenantConfig::default();
        config.anti_spam.message_limit = 1;
        config.max_mentions = 2;

        let event = MessageEvent::new(1, 100, 5, 1, "spam at evil.com")
            .with_user_mentions([1, 2, 3])
            .at(t0());
        let kinds: Vec<_> = evaluator
            .check(&event, &config)
            .into_iter()
            .map(|v| v.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::Spam,
                ViolationKind::ForbiddenLink,
                ViolationKind::MentionFlood
            ]
        );
    }

    #[test]
    fn test_mentions_at_limit_are_allowed() {
        let (evaluator, _) = evaluator();
        let config = TenantConfig::default();
        let event = MessageEvent::new(1, 100, 5, 1, "hey")
            .with_user_mentions([1, 2, 3, 4, 5])
            .at(t0());
        assert!(evaluator.check(&event, &config).is_empty());
    }

    #[tokio::test]
    async fn test_exemptions() {
        let (evaluator, platform) = evaluator();
        let mut config = TenantConfig::default();
        config.anti_spam.message_limit = 1;

        let bot = MessageEvent::new(1, 100, 5, 1, "x").from_bot();
        assert_eq!(
            evaluator.evaluate(&bot, &config).await,
            Evaluation::Exempt(Exemption::Bot)
        );

        platform.add_moderator(1, 200);
        let moderator = MessageEvent::new(1, 200, 5, 2, "x");
        assert_eq!(
            evaluator.evaluate(&moderator, &config).await,
            Evaluation::Exempt(Exemption::Moderator)
        );

        config.moderator_role_id = Some(9);
        platform.assign_role(1, 300, 9);
        let helper = MessageEvent::new(1, 300, 5, 3, "x");
        assert_eq!(
            evaluator.evaluate(&helper, &config).await,
            Evaluation::Exempt(Exemption::ModeratorRole)
        );

        let member = MessageEvent::new(1, 400, 5, 4, "x");
        match evaluator.evaluate(&member, &config).await {
            Evaluation::Violations(v) => assert_eq!(v.len(), 1),
            other => panic!("unexpected evaluation: {:?}", other),
        }
    }
}

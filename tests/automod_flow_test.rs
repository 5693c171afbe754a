use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use automod::{
    ActionTaken, AutoModerator, DegradeReason, EscalationTier, EventBus, Evidence,
    InMemoryPlatform, ManualActionKind, MessageEvent, ModerationError, ModerationEvent,
    PlatformOp, TenantSetting, ViolationKind,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

const TENANT: u64 = 1;
const USER: u64 = 100;
const CHANNEL: u64 = 7;
const MUTE_ROLE: u64 = 42;

/// 创建测试用的审核引擎
fn create_test_engine() -> (Arc<AutoModerator>, Arc<InMemoryPlatform>, Arc<EventBus>) {
    let platform = Arc::new(InMemoryPlatform::new());
    let bus = Arc::new(EventBus::new(256));
    let engine = AutoModerator::builder()
        .with_executor(platform.clone())
        .with_permissions(platform.clone())
        .with_sink(bus.clone())
        .build()
        .expect("engine should build");
    (Arc::new(engine), platform, bus)
}

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn message(id: u64, content: &str, offset_ms: i64) -> MessageEvent {
    MessageEvent::new(TENANT, USER, CHANNEL, id, content)
        .at(t0() + ChronoDuration::milliseconds(offset_ms))
}

#[tokio::test(start_paused = true)]
async fn test_spam_scenario_warns_then_mutes_with_reversal() {
    let (engine, platform, _bus) = create_test_engine();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::MuteRole(Some(MUTE_ROLE)));

    // 3 秒内 5 条消息：只有第 5 条违规
    for (i, offset) in [0, 700, 1400, 2100].into_iter().enumerate() {
        let records = engine.handle_event(&message(i as u64, "hello", offset)).await;
        assert!(records.is_empty(), "message {} flagged", i + 1);
    }
    let fifth = engine.handle_event(&message(4, "hello", 3000)).await;
    assert_eq!(fifth.len(), 1);
    assert_eq!(fifth[0].kind, ViolationKind::Spam);
    assert_eq!(fifth[0].warning_count, 1);
    assert_eq!(fifth[0].action_label, "Warn only");
    assert!(fifth[0].message_removed);
    assert!(platform.is_message_deleted(TENANT, 4));

    // 2 秒后第 6 条：窗口内 6 条，警告数 2，禁言 10 分钟
    let sixth = engine.handle_event(&message(5, "hello", 5000)).await;
    assert_eq!(sixth.len(), 1);
    assert_eq!(sixth[0].warning_count, 2);
    assert_eq!(sixth[0].action_label, "Temporary mute, 10 minutes");
    assert_eq!(
        sixth[0].action,
        ActionTaken::Muted {
            role_id: MUTE_ROLE,
            duration: Duration::from_secs(600)
        }
    );
    match &sixth[0].evidence {
        Evidence::MessageRate {
            count,
            limit,
            window_seconds,
            ..
        } => assert_eq!((*count, *limit, *window_seconds), (6, 5, 10)),
        other => panic!("unexpected evidence: {:?}", other),
    }
    assert!(platform.user_has_role(TENANT, USER, MUTE_ROLE));
    assert_eq!(engine.reversals().stats().pending, 1);

    // 600 秒后禁言角色被移除
    tokio::time::sleep(Duration::from_secs(599)).await;
    assert!(platform.user_has_role(TENANT, USER, MUTE_ROLE));
    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!(!platform.user_has_role(TENANT, USER, MUTE_ROLE));
    assert_eq!(engine.reversals().stats().fired, 1);
}

#[tokio::test]
async fn test_window_restarts_after_silence() {
    let (engine, _platform, _bus) = create_test_engine();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::MessageLimit(2));

    assert!(engine.handle_event(&message(1, "a", 0)).await.is_empty());
    // 超过 10 秒后重新从 1 开始计数
    assert!(engine.handle_event(&message(2, "b", 11_000)).await.is_empty());
    let flagged = engine.handle_event(&message(3, "c", 11_500)).await;
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].kind, ViolationKind::Spam);
}

#[tokio::test]
async fn test_clear_warnings_restarts_at_warn_tier() {
    let (engine, _platform, _bus) = create_test_engine();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::MuteRole(Some(MUTE_ROLE)));

    engine.handle_event(&message(1, "evil.com", 0)).await;
    engine.handle_event(&message(2, "evil.com", 100)).await;
    assert_eq!(engine.ledger().get_warnings(TENANT, USER), 2);

    engine.manual().clear_warnings(TENANT, USER, 999);
    assert_eq!(engine.ledger().get_warnings(TENANT, USER), 0);

    let records = engine.handle_event(&message(3, "evil.com", 200)).await;
    assert_eq!(records[0].warning_count, 1);
    assert_eq!(records[0].action, ActionTaken::Warned);
}

#[tokio::test]
async fn test_allow_list_is_substring_match() {
    let (engine, _platform, _bus) = create_test_engine();
    engine.store().update(TENANT, |config| {
        config.anti_links.allowed_domains = ["github.com".to_string()].into_iter().collect();
    });

    let allowed = engine
        .handle_event(&message(1, "check https://sub.github.com/repo", 0))
        .await;
    assert!(allowed.is_empty());

    // 已知的宽松行为：路径中包含白名单域名也会放行
    let loose = engine
        .handle_event(&message(2, "visit http://evil.com/github.com", 1000))
        .await;
    assert!(loose.is_empty());

    let blocked = engine
        .handle_event(&message(3, "visit http://evil.com/login", 2000))
        .await;
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].kind, ViolationKind::ForbiddenLink);
    assert_eq!(blocked[0].reason, "unauthorized link");
}

#[tokio::test]
async fn test_mentions_are_counted_as_a_set() {
    let (engine, _platform, _bus) = create_test_engine();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::MaxMentions(3));

    let repeated = message(1, "hey", 0).with_user_mentions([11, 12, 13, 11, 12, 13, 11, 12, 13]);
    assert!(engine.handle_event(&repeated).await.is_empty());

    // 角色 ID 与用户 ID 相同时合并为一项
    let overlapping = message(3, "hey", 500)
        .with_user_mentions([11, 12, 13])
        .with_role_mentions([13]);
    assert!(engine.handle_event(&overlapping).await.is_empty());

    let flood = message(2, "hey", 1000)
        .with_user_mentions([11, 12, 13])
        .with_role_mentions([500]);
    let records = engine.handle_event(&flood).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ViolationKind::MentionFlood);
    assert_eq!(records[0].reason, "too many mentions (4/3)");
}

#[tokio::test]
async fn test_forbidden_action_degrades_and_keeps_count() {
    let (engine, platform, _bus) = create_test_engine();
    platform.forbid(PlatformOp::Kick);

    let mut last = None;
    for i in 0..4 {
        last = engine
            .handle_event(&message(i, "discord.gg/raid", i as i64 * 100))
            .await
            .pop();
    }
    let record = last.expect("fourth message flagged");
    assert_eq!(record.warning_count, 4);
    assert_eq!(
        record.action,
        ActionTaken::Degraded {
            attempted: EscalationTier::Kick,
            reason: DegradeReason::Forbidden
        }
    );
    assert_eq!(
        record.action_label,
        "Warn only (action failed: insufficient permissions)"
    );
    assert!(!platform.is_kicked(TENANT, USER));
    assert_eq!(engine.ledger().get_warnings(TENANT, USER), 4);
}

#[tokio::test]
async fn test_moderators_and_bots_are_exempt() {
    let (engine, platform, _bus) = create_test_engine();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::ModeratorRole(Some(9)));
    platform.add_moderator(TENANT, 200);
    platform.assign_role(TENANT, 300, 9);

    for author in [200, 300] {
        let event = MessageEvent::new(TENANT, author, CHANNEL, author, "evil.com");
        assert!(engine.handle_event(&event).await.is_empty());
    }
    let bot = MessageEvent::new(TENANT, 400, CHANNEL, 400, "evil.com").from_bot();
    assert!(engine.handle_event(&bot).await.is_empty());

    assert_eq!(engine.stats().exempt, 3);
    assert!(platform.journal().is_empty());
}

#[tokio::test]
async fn test_records_reach_notification_sink() {
    let (engine, _platform, bus) = create_test_engine();
    let mut rx = bus.subscribe();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::LogsTarget(Some(77)));

    let records = engine.handle_event(&message(1, "evil.com", 0)).await;
    match rx.recv().await.unwrap() {
        ModerationEvent::AutoModeration(published) => {
            assert_eq!(published.incident_id, records[0].incident_id);
            assert_eq!(published.logs_target, Some(77));
            assert_eq!(published.user_id, USER);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    engine.manual().warn(TENANT, USER, 999, "manual");
    match rx.recv().await.unwrap() {
        ModerationEvent::ManualAction(record) => {
            assert_eq!(record.kind, ManualActionKind::Warn);
            assert_eq!(record.warning_count, Some(2));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let (engine, _platform, _bus) = create_test_engine();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::AntiLinksEnabled(false));

    assert!(engine.handle_event(&message(1, "evil.com", 0)).await.is_empty());
    let other = MessageEvent::new(2, USER, CHANNEL, 1, "evil.com");
    assert_eq!(engine.handle_event(&other).await.len(), 1);
    assert_eq!(engine.ledger().get_warnings(TENANT, USER), 0);
    assert_eq!(engine.ledger().get_warnings(2, USER), 1);
}

#[tokio::test]
async fn test_manual_timeout_validation() {
    let (engine, platform, _bus) = create_test_engine();
    let result = engine.manual().timeout(TENANT, USER, 999, 0, "x").await;
    assert!(matches!(result, Err(ModerationError::Validation(_))));

    engine
        .manual()
        .timeout(TENANT, USER, 999, 40_320, "x")
        .await
        .unwrap();
    assert_eq!(
        platform.restriction(TENANT, USER),
        Some(Duration::from_secs(40_320 * 60))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_violations_get_distinct_counts() {
    let (engine, _platform, _bus) = create_test_engine();
    engine
        .store()
        .set_setting(TENANT, TenantSetting::AntiSpamEnabled(false));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .handle_event(&message(i, "evil.com", i as i64))
                    .await
                    .into_iter()
                    .map(|r| r.warning_count)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut counts = HashSet::new();
    for handle in handles {
        for count in handle.await.unwrap() {
            assert!(counts.insert(count), "count {} decided twice", count);
        }
    }
    assert_eq!(counts, (1..=8).collect::<HashSet<u32>>());
}

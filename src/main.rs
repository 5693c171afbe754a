use std::env;
use std::fs;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use automod::{
    cli::{Cli, Commands},
    config::{self, AutomodConfig},
    logging, AutoModerator, EventBus, InMemoryPlatform, MessageEvent,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast::error::RecvError, mpsc, oneshot};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 处理子命令
    if let Some(command) = &cli.command {
        match command {
            Commands::GenerateConfig { path } => {
                return generate_config(path);
            }
            Commands::ValidateConfig { path } => {
                return validate_config(path);
            }
            Commands::ShowConfig => {
                return show_config(&cli);
            }
        }
    }

    // 快速读取配置文件的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > 环境变量 > 配置文件 > 默认值）
    let log_level = cli
        .get_log_level()
        .or_else(|| env::var("AUTOMOD_LOG_LEVEL").ok())
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli
        .get_log_format()
        .or_else(|| env::var("AUTOMOD_LOG_FORMAT").ok())
        .or(early_log.format);
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| env::var("AUTOMOD_LOG_FILE").ok())
        .or(early_log.file);

    let _log_guard = logging::init_logging(
        &log_level,
        log_format.as_deref(),
        log_file.as_deref(),
        cli.quiet,
    )?;

    tracing::info!("🚀 Automod starting...");

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = AutomodConfig::load(&cli).context("加载配置失败")?;

    if cli.dev {
        tracing::info!("🔧 开发模式已启用");
    }

    tracing::info!("📊 Automod Configuration:");
    tracing::info!("  - Max Inflight Handlers: {}", config.engine.max_inflight_handlers);
    tracing::info!("  - Event Queue Capacity: {}", config.engine.event_queue_capacity);
    tracing::info!("  - Mute Duration: {}s", config.escalation.mute_duration_secs);
    tracing::info!(
        "  - Restriction Duration: {}s",
        config.escalation.restriction_duration_secs
    );
    tracing::info!(
        "  - Default Anti-Spam: {} msgs / {}s",
        config.tenant_defaults.anti_spam.message_limit,
        config.tenant_defaults.anti_spam.window_seconds
    );
    tracing::info!("  - Default Max Mentions: {}", config.tenant_defaults.max_mentions);
    tracing::info!("  - Log Level: {}", log_level);
    if let Some(f) = &log_file {
        tracing::info!("  - Log File: {}", f);
    }

    if let Err(e) = replay(&cli, &config).await {
        tracing::error!("❌ 事件回放失败: {:#}", e);
        process::exit(1);
    }

    Ok(())
}

/// 回放 JSON Lines 事件，把发布的审核记录逐行输出到标准输出
async fn replay(cli: &Cli, config: &AutomodConfig) -> Result<()> {
    let platform = Arc::new(InMemoryPlatform::new());
    let bus = Arc::new(EventBus::new(config.engine.notification_capacity));
    let mut records = bus.subscribe();

    let engine = Arc::new(
        AutoModerator::builder()
            .with_config(config)
            .with_executor(platform.clone())
            .with_permissions(platform.clone())
            .with_sink(bus.clone())
            .build()?,
    );

    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                result = records.recv() => match result {
                    Ok(record) => print_record(&record),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("⚠️ 输出落后，丢失 {} 条记录", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = &mut stop_rx => {
                    while let Ok(record) = records.try_recv() {
                        print_record(&record);
                    }
                    break;
                }
            }
        }
    });

    let (tx, rx) = mpsc::channel(config.engine.event_queue_capacity);
    let runner = tokio::spawn(engine.clone().run(rx));

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("无法打开事件文件: {}", path))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("读取事件失败")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: MessageEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("⚠️ 第 {} 行解析失败，跳过: {}", line_no, e);
                continue;
            }
        };
        for moderator in &cli.moderators {
            platform.add_moderator(event.tenant_id, *moderator);
        }
        if tx.send(event).await.is_err() {
            break;
        }
    }
    drop(tx);

    runner.await.context("引擎任务异常退出")??;
    let _ = stop_tx.send(());
    printer.await.context("输出任务异常退出")?;

    let stats = engine.stats();
    let reversals = engine.reversals().stats();
    tracing::info!(
        "✅ 回放完成: processed={}, exempt={}, flagged={}, violations={}",
        stats.processed,
        stats.exempt,
        stats.flagged,
        stats.violations
    );
    if reversals.pending > 0 {
        tracing::info!("⏰ {} 个定时撤销在退出时未触发", reversals.pending);
    }
    Ok(())
}

fn print_record(record: &automod::ModerationEvent) {
    match serde_json::to_string(record) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!("⚠️ 记录序列化失败: {}", e),
    }
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# Automod 配置文件
# 此文件由 automod generate-config 生成

[engine]
max_inflight_handlers = 256
event_queue_capacity = 1024
notification_capacity = 1000

[escalation]
mute_duration_secs = 600
restriction_duration_secs = 3600
mute_role_names = ["muted", "muet", "silence"]

# 新租户首次出现时使用的默认配置
[tenant_defaults]
max_mentions = 5
# logs_target = 0
# moderator_role_id = 0
# mute_role_id = 0

[tenant_defaults.anti_spam]
enabled = true
message_limit = 5
window_seconds = 10

[tenant_defaults.anti_links]
enabled = true
allowed_domains = [
    "youtube.com",
    "youtu.be",
    "twitter.com",
    "twitch.tv",
    "github.com",
    "stackoverflow.com",
    "reddit.com",
]

[tenant_defaults.status]
kind = "watching"
text = "🛡️ Protecting the server"

[logging]
level = "info"
format = "compact"
# file = "./logs/automod.log"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = AutomodConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config
        .validate()
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - Max Inflight Handlers: {}", config.engine.max_inflight_handlers);
    println!("  - Mute Duration: {}s", config.escalation.mute_duration_secs);
    println!(
        "  - Anti-Spam: {} msgs / {}s",
        config.tenant_defaults.anti_spam.message_limit,
        config.tenant_defaults.anti_spam.window_seconds
    );
    println!(
        "  - Allowed Domains: {}",
        config.tenant_defaults.anti_links.allowed_domains.len()
    );

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    // 初始化基本日志（用于显示配置）
    let _guard = logging::init_logging("info", None, None, false)?;

    let config = AutomodConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

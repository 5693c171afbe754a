use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 初始化日志系统
///
/// 日志经非阻塞 writer 输出到文件或 stderr，返回的 guard 必须持有到进程退出，
/// 否则缓冲中的日志会丢失。
pub fn init_logging(
    log_level: &str,
    log_format: Option<&str>,
    log_file: Option<&str>,
    quiet: bool,
) -> Result<WorkerGuard> {
    // 如果静默模式，只输出错误
    let level = if quiet { "error" } else { log_level };

    // RUST_LOG 优先
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("无效的日志文件路径: {:?}", path))?;
            std::fs::create_dir_all(directory)
                .with_context(|| format!("无法创建日志目录: {:?}", directory))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            tracing_appender::non_blocking(appender)
        }
        // 标准输出留给审核记录
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let ansi = log_file.is_none();

    // 根据格式选择不同的输出方式
    let layer = match log_format {
        // JSON 格式（适合生产环境）
        Some("json") => fmt::layer().json().with_writer(writer).boxed(),
        // Pretty 格式（适合开发环境）
        Some("pretty") | Some("dev") => fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        // Compact 格式（默认）
        _ => fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .context("日志系统已初始化")?;

    Ok(guard)
}

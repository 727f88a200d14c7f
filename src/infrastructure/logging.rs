//! 日志初始化
//! 支持结构化日志、日志级别配置和按天轮转的文件日志

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{Builder, Rotation},
};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

const DEFAULT_LOG_DIR: &str = "./logs";
const DEFAULT_LOG_FILE: &str = "ironcore-sdk.log";

/// 文件日志的后台写线程句柄，释放前会刷盘，需与程序同生命周期持有
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先于配置中的级别。全局订阅者已存在时返回错误。
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let json = config.format == "json";

    let stdout_layer = if json {
        fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).boxed()
    } else {
        fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .boxed()
    };

    let (file_layer, guard) = if config.enable_file_logging {
        let (writer, guard) = file_writer(config)?;
        let layer = if json {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .boxed()
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("global tracing subscriber already installed")?;

    Ok(LoggingGuard { _file: guard })
}

fn file_writer(config: &LoggingConfig) -> Result<(NonBlocking, WorkerGuard)> {
    let path = config.log_file_path.as_deref().map(Path::new);
    let log_dir = path
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new(DEFAULT_LOG_DIR));
    let file_name = path
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);

    std::fs::create_dir_all(log_dir).with_context(|| format!("failed to create log dir {}", log_dir.display()))?;

    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .with_context(|| format!("failed to open log file in {}", log_dir.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// 简化初始化（使用默认配置），失败时回退到最基本的控制台日志
pub fn init_default_logging() -> Option<LoggingGuard> {
    let config = LoggingConfig::default();
    match init_logging(&config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            let _ = tracing_subscriber::fmt().try_init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_error_not_panic() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
            enable_file_logging: false,
            log_file_path: None,
            max_files: 7,
        };
        // 测试进程内可能已有订阅者，第二次一定失败
        let _first = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_file_writer_uses_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
            enable_file_logging: true,
            log_file_path: Some(dir.path().join("sdk.log").to_string_lossy().into_owned()),
            max_files: 3,
        };
        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(dir.path().exists());
    }
}

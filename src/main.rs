use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use treesync::config::{self, RemoteConfig, SyncSettings};
use treesync::core::{CycleConfig, Selection, SessionStore, SyncCycle};
use treesync::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use treesync::storage::{FileJumpClient, LocalFileSystem};

/// 初始化日志系统
fn init_logging() {
    let log_dir = get_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let config = LogConfig::load(&log_dir);

    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let mut env_filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(config.tracing_level().into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse::<tracing_subscriber::filter::Directive>() {
            env_filter = env_filter.add_directive(d);
        }
    }

    match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            // 在 debug 模式下也输出到控制台
            #[cfg(debug_assertions)]
            {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false);
                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(console_layer);
                let _ = tracing::subscriber::set_global_default(subscriber);
            }

            #[cfg(not(debug_assertions))]
            {
                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer);
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        }
        Err(e) => {
            // 文件日志创建失败，回退到控制台
            eprintln!("无法创建日志文件 {:?}: {}", log_dir, e);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("无法创建数据目录 {:?}", data_dir))?;

    let remote_config = RemoteConfig::load(&data_dir);
    if remote_config.token.is_empty() {
        warn!("未配置访问令牌，请在 config.json 的 remote.token 或 {} 中设置", config::TOKEN_ENV);
    }
    let settings = SyncSettings::load(&data_dir);

    let remote = FileJumpClient::new(&remote_config).context("创建远程客户端失败")?;
    let cycle = SyncCycle::new(
        Arc::new(remote),
        Arc::new(LocalFileSystem::new()),
        SessionStore::new(&data_dir),
        CycleConfig::from(&settings),
    );

    let state = match cycle.restore() {
        Some(state) => {
            info!("使用上次保存的会话");
            state
        }
        None => cycle.scan(&Selection::from(&settings)).await?,
    };

    let report = cycle.run(&state).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_success() {
        anyhow::bail!("{} 个操作失败", report.failed);
    }
    Ok(())
}

//! 日志初始化
//!
//! 终端被游戏画面占用，所以日志写入文件。`RUST_LOG` 可以覆盖默认级别。

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_subscriber::EnvFilter;

static SUBSCRIBER_INIT: Once = Once::new();

/// Configure and initialize logging for the application.
///
/// Only the first call installs a subscriber; later calls are no-ops.
pub fn setup_logging(log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    SUBSCRIBER_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("warn,{name}=info", name = env!("CARGO_CRATE_NAME")))
        });

        let result = tracing_subscriber::fmt()
            .with_target(true)
            .with_ansi(false)
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .try_init();
        if let Err(err) = result {
            eprintln!("failed to install tracing subscriber: {err}");
        }
    });
    Ok(())
}

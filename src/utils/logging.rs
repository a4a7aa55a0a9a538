//! 日志初始化
//!
//! 调用点只使用 `log` 宏；这里把 `[log]` 配置接到 flexi_logger 的文件输出上。
//! 驱动模块单独设级别，重复初始化时只替换过滤规则。

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming,
    WriteMode,
};
use parking_lot::Mutex;

use crate::config::{Config, LogConfig};

/// 单独设级别的驱动模块
const DRIVER_MODULES: &[&str] = &["scylla", "sqlx"];

static LOGGER_HANDLE: Mutex<Option<LoggerHandle>> = parking_lot::const_mutex(None);

/// 过滤规则：全局级别加上驱动模块级别
pub fn log_spec(config: &LogConfig) -> String {
    let mut spec = config.level.trim().to_string();
    for module in DRIVER_MODULES {
        spec.push_str(&format!(", {}={}", module, config.driver_level.trim()));
    }
    spec
}

/// 启动文件日志；已启动时只更新过滤规则
///
/// ```no_run
/// let config = polystore::config::Config::default();
/// polystore::utils::logging::init(&config).expect("日志初始化失败");
/// ```
pub fn init(config: &Config) -> Result<(), FlexiLoggerError> {
    let spec = log_spec(&config.log);
    let mut guard = LOGGER_HANDLE.lock();
    if let Some(handle) = guard.as_mut() {
        handle.parse_new_spec(&spec)?;
        log::info!("日志级别已更新: {}", spec);
        return Ok(());
    }

    let duplicate = if config.log.echo_warnings {
        Duplicate::Warn
    } else {
        Duplicate::None
    };
    let handle = Logger::try_with_str(&spec)?
        .log_to_file(
            FileSpec::default()
                .basename(&config.log.file)
                .directory(&config.log.dir),
        )
        .rotate(
            Criterion::Size(config.log.max_file_size),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.log.max_files),
        )
        .duplicate_to_stderr(duplicate)
        .write_mode(WriteMode::Async)
        .append()
        .start()?;
    *guard = Some(handle);

    log::info!(
        "日志系统初始化完成: {}/{} ({})",
        config.log.dir,
        config.log.file,
        spec
    );
    Ok(())
}

/// 阻塞到异步写线程把缓冲写完
pub fn shutdown() {
    if let Some(handle) = LOGGER_HANDLE.lock().take() {
        handle.flush();
    }
}

pub fn is_initialized() -> bool {
    LOGGER_HANDLE.lock().is_some()
}

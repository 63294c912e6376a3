pub mod file_logger;

use std::sync::Once;

use env_logger::{Builder, Env};

use crate::error::E::Failed2InitLogger;
use crate::error::R;
use crate::logger::file_logger::FileLogger;
use crate::options::LogOptions;

static INIT: Once = Once::new();

/// 控制台日志，默认 info，RUST_LOG 可以覆盖，重复调用没有影响
pub fn initialize_logger() {
    INIT.call_once(|| {
        let env = Env::default().default_filter_or("info");
        // 全局 logger 只能设置一次，已经用了文件日志时保留文件日志
        let _ = Builder::from_env(env).format_timestamp_millis().try_init();
    });
}

/// 用滚动文件日志作为全局 logger
pub fn init_file_logger(options: &LogOptions) -> R<()> {
    let logger = FileLogger::new(options)?;
    log::set_boxed_logger(Box::new(logger)).map_err(|e| Failed2InitLogger(e.to_string()))?;
    log::set_max_level(options.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use log::{debug, info};

    use super::*;

    #[test]
    fn test_logging_levels() {
        initialize_logger();
        initialize_logger();
        debug!("Debug message in test");
        info!("Info message in test");
    }
}

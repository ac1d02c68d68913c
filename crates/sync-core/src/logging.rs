//! Process-wide diagnostic logging.
//!
//! Library code only talks to the `log` facade; hosts call [`init_logging`]
//! once to route records to stderr through `flexi_logger`.

use flexi_logger::{Logger, LoggerHandle};
use log::info;
use once_cell::sync::OnceCell;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: String,
    _logger: LoggerHandle,
}

/// Starts the stderr logger with `level` (any `flexi_logger` filter string such as
/// `"info"` or `"debug,template_sync_core::realm=trace"`).
///
/// Repeating the call with the same level is a no-op; switching levels after
/// initialization is rejected. Never panics.
pub fn init_logging(level: &str) -> Result<(), String> {
    let level = level.trim();
    if level.is_empty() {
        return Err("log level must not be empty".to_string());
    }

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, String> {
        let logger = Logger::try_with_str(level)
            .map_err(|err| format!("invalid log level `{level}`: {err}"))?
            .log_to_stderr()
            .start()
            .map_err(|err| format!("failed to start logger: {err}"))?;
        info!(
            "event=logging_init module=logging status=ok level={level} version={}",
            env!("CARGO_PKG_VERSION")
        );
        Ok(LoggingState {
            level: level.to_string(),
            _logger: logger,
        })
    })?;

    if state.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{level}`",
            state.level
        ));
    }
    Ok(())
}

pub fn logging_level() -> Option<&'static str> {
    LOGGING_STATE.get().map(|state| state.level.as_str())
}

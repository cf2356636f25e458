use std::io::Write;

use chrono::Utc;
use log::info;

/// Default filter when `RUST_LOG` is unset. Tuner plugins are chatty at
/// debug level, so keep them quiet unless asked.
pub const DEFAULT_FILTER: &str = "info";

fn builder(default_filter: &str) -> env_logger::Builder {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let mut builder = env_logger::Builder::from_env(env);
    builder.format(|buf, record| {
        let level_style = buf.default_level_style(record.level());
        writeln!(
            buf,
            "[{} {} {} {}:{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            level_style.value(record.level()),
            record.target(),
            record.file().unwrap_or("<unnamed>"),
            record.line().unwrap_or(0),
            &record.args()
        )
    });
    builder
}

pub fn init_log() {
    init_log_with_filter(DEFAULT_FILTER);
}

pub fn init_log_with_filter(default_filter: &str) {
    builder(default_filter).init();
    info!("env_logger initialized");
}

/// Same format as [`init_log`], but safe to call from every test.
pub fn init_test_log() {
    let _ = builder("debug").is_test(true).try_init();
}

use chrono::Local;
use env_logger::{Builder, Env};
use std::io::Write;

/// Timestamped logging at `info` unless `RUST_LOG` says otherwise.
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    log::debug!("Logger initialized.");
}

use std::io::Write;

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;

/// Installs the global logger. `RUST_LOG` overrides the `info` default.
pub fn init() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<30} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();
}

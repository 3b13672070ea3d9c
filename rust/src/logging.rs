use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "sierra.log";

static INIT: Once = Once::new();

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stderr,
/// and a plain-text copy under `<data_dir>/sierra.log`. Later calls are no-ops.
pub fn init_logging(data_dir: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let file_layer = match open_log_file(data_dir) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("sierra: file logging disabled: {e:#}");
                None
            }
        };

        // Another subscriber may already be installed (host app, test harness).
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init();
    });
}

fn open_log_file(data_dir: &str) -> anyhow::Result<std::fs::File> {
    use anyhow::Context;

    std::fs::create_dir_all(data_dir).with_context(|| format!("create {data_dir}"))?;
    let path = Path::new(data_dir).join(LOG_FILE_NAME);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))
}

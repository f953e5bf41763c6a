//! Logging initialisation via tracing-subscriber.
//!
//! Log lines go to stdout and are appended to `<dir>/backend.log`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "backend.log";

/// Opens (creating if needed) the append-only log file inside `dir`.
pub fn open_log_file(dir: &Path) -> std::io::Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// `RUST_LOG` takes precedence; `level` is the fallback.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(level: &str, dir: &str) -> anyhow::Result<PathBuf> {
    let (path, file) = open_log_file(Path::new(dir))?;

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set subscriber: {e}"))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_log_file_creates_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("nested").join("logs");

        let (path, mut file) = open_log_file(&dir).expect("open log file");
        assert_eq!(path, dir.join(LOG_FILE_NAME));
        writeln!(file, "first").expect("write");

        let (_, mut again) = open_log_file(&dir).expect("reopen log file");
        writeln!(again, "second").expect("write");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_build_filter_falls_back_to_info() {
        let filter = build_filter("definitely not a [filter");
        assert!(!filter.to_string().is_empty());
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::transport::Identity;

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Default filter for a verbosity count: 0 info, 1 debug, 2+ trace
fn default_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Log file of an agent: `<dir>/<config-name>-<nick>.log`.
///
/// Without `dir` the file goes to `logs/` under the platform data directory.
/// Several agents sharing one config name get one file per nick.
pub fn log_file_path(dir: Option<&Path>, identity: &Identity) -> io::Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => default_log_directory()?,
    };
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect()
    };
    Ok(dir.join(format!(
        "{}-{}.log",
        clean(&identity.config_name),
        clean(&identity.nick)
    )))
}

/// Initialize logging for an agent.
///
/// Console output goes to stderr, stdout carries the wire. With `log_file`
/// a copy is appended to that file, which is truncated first once it grew
/// past 1MB.
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(default_filter(verbosity))
            .with_writer(io::stderr)
            .init();
        return Ok(None);
    };

    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    truncate_if_needed(log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(default_filter(verbosity))
        .with(fmt::layer().with_writer(io::stderr).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());

    Ok(Some(guard))
}

fn default_log_directory() -> io::Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "pifon")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))?;
    Ok(dirs.data_dir().join("logs"))
}

/// Truncate log file if it exceeds MAX_LOG_SIZE.
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        File::create(log_path)?.set_len(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity::new("alice", "pifon");
        assert_eq!(
            log_file_path(Some(dir.path()), &identity).unwrap(),
            dir.path().join("pifon-alice.log")
        );

        let identity = Identity::new("kitchen speaker/1", "mon");
        assert_eq!(
            log_file_path(Some(dir.path()), &identity).unwrap(),
            dir.path().join("mon-kitchen_speaker_1.log")
        );
    }

    #[test]
    fn test_truncate_if_needed() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.log");
        fs::write(&small, b"hello").unwrap();
        truncate_if_needed(&small).unwrap();
        assert_eq!(fs::metadata(&small).unwrap().len(), 5);

        let big = dir.path().join("big.log");
        let mut f = File::create(&big).unwrap();
        f.write_all(&vec![b'x'; MAX_LOG_SIZE as usize + 1]).unwrap();
        drop(f);
        truncate_if_needed(&big).unwrap();
        assert_eq!(fs::metadata(&big).unwrap().len(), 0);

        // missing files are fine
        truncate_if_needed(&dir.path().join("none.log")).unwrap();
    }
}

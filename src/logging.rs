use log::{LevelFilter, Metadata, Record};
use once_cell::sync::OnceCell;
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const LOG_FILE: &str = "log.txt";

#[derive(Debug)]
struct SimpleLogger {
    log_file: PathBuf,
    level: LevelFilter,
}

static LOGGER: OnceCell<SimpleLogger> = OnceCell::new();

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let log_entry = format!("{} - {}\n", record.level(), record.args());

            if let Ok(mut file) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_file)
            {
                let _ = file.write_all(log_entry.as_bytes());
            }
        }
    }

    fn flush(&self) {}
}

// Installs the file logger once per process; later calls keep the first logger.
pub fn init(log_dir: &Path, level: LevelFilter) -> Result<(), AppError> {
    create_dir_all(log_dir)?;

    let logger = LOGGER.get_or_init(|| SimpleLogger {
        log_file: log_dir.join(LOG_FILE),
        level,
    });

    log::set_logger(logger)?;
    log::set_max_level(logger.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn entries_are_appended_as_level_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SimpleLogger {
            log_file: dir.path().join(LOG_FILE),
            level: LevelFilter::Info,
        };
        logger.log(
            &Record::builder()
                .args(format_args!("rolled 2d6"))
                .level(log::Level::Info)
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("hidden"))
                .level(log::Level::Debug)
                .build(),
        );
        let written = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert_eq!(written, "INFO - rolled 2d6\n");
    }

    #[test]
    fn second_install_is_a_logger_error() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), LevelFilter::Warn).unwrap();

        let err = init(dir.path(), LevelFilter::Warn).unwrap_err();
        assert!(matches!(err, AppError::Logger(_)));
        assert!(err.to_string().starts_with("Logger error"));
    }
}

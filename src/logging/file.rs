//! Rotating file logger
//!
//! Links must stay responsive, so file logging is implemented as:
//! - a bounded queue (non-blocking `try_send`)
//! - a dedicated thread with buffered writes and periodic flush

use super::{LogEntry, LogKind};
use crate::config::LogsConfig;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;
use std::time::{Duration, Instant};

/// Which entry kinds reach the file
#[derive(Debug, Clone, Copy)]
pub struct FileLogFilter {
    pub include_frames: bool,
    pub include_firmware: bool,
    pub include_system: bool,
}

impl FileLogFilter {
    pub fn should_write(&self, entry: &LogEntry) -> bool {
        match &entry.kind {
            LogKind::Frame { .. } => self.include_frames,
            LogKind::Firmware { .. } => self.include_firmware,
            LogKind::System { .. } => self.include_system,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileLoggerConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub max_files: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
    pub filter: FileLogFilter,
}

impl FileLoggerConfig {
    /// Build from the `[logs]` section; `None` when file logging is off
    pub fn from_logs(logs: &LogsConfig) -> Option<Self> {
        let path = logs.file.clone()?;
        Some(Self {
            path,
            max_bytes: logs.max_bytes,
            max_files: logs.max_files,
            flush_interval: Duration::from_millis(250),
            channel_capacity: 1024,
            filter: FileLogFilter {
                include_frames: logs.include_frames,
                include_firmware: logs.include_firmware,
                include_system: logs.include_system,
            },
        })
    }
}

/// Handle to the logger thread
#[derive(Clone)]
pub struct FileLogger {
    tx: SyncSender<LogEntry>,
    filter: FileLogFilter,
}

impl FileLogger {
    /// Queue an entry; dropped if filtered out or the queue is full
    pub fn log(&self, entry: &LogEntry) {
        if self.filter.should_write(entry) {
            let _ = self.tx.try_send(entry.clone());
        }
    }
}

pub fn spawn_file_logger(cfg: FileLoggerConfig) -> io::Result<FileLogger> {
    if let Some(parent) = cfg.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let (file, size) = open_append(&cfg.path)?;
    let (tx, rx) = sync_channel::<LogEntry>(cfg.channel_capacity.max(1));
    let filter = cfg.filter;

    thread::Builder::new()
        .name("ikarus-file-logger".to_string())
        .spawn(move || run_logger(rx, cfg, file, size))?;

    Ok(FileLogger { tx, filter })
}

fn run_logger(rx: Receiver<LogEntry>, cfg: FileLoggerConfig, file: File, start_size: u64) {
    let max_bytes = cfg.max_bytes.max(1024);
    let max_files = cfg.max_files.max(1);
    let flush_interval = if cfg.flush_interval.is_zero() {
        Duration::from_millis(250)
    } else {
        cfg.flush_interval
    };

    let mut writer = BufWriter::new(file);
    let mut size = start_size;
    let mut dirty = false;
    let mut last_flush = Instant::now();

    loop {
        match rx.recv_timeout(flush_interval) {
            Ok(entry) => {
                let line = entry.to_string();
                if write_line(&mut writer, &line).is_ok() {
                    size = size.saturating_add(line.len() as u64 + 1);
                    dirty = true;
                }

                if size >= max_bytes {
                    let _ = writer.flush();
                    drop(writer);
                    let _ = rotate_files(&cfg.path, max_files);
                    match open_truncate(&cfg.path) {
                        Ok(f) => {
                            writer = BufWriter::new(f);
                            size = 0;
                            dirty = false;
                            last_flush = Instant::now();
                        }
                        // Cannot reopen: stop logging
                        Err(_) => break,
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if dirty && last_flush.elapsed() >= flush_interval {
                    let _ = writer.flush();
                    dirty = false;
                    last_flush = Instant::now();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                let _ = writer.flush();
                break;
            }
        }
    }
}

fn write_line(writer: &mut BufWriter<File>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

fn open_truncate(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

fn rotate_files(path: &Path, max_files: usize) -> io::Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let stem = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "ikarus-link.log".to_string());
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Remove the oldest
    let oldest = dir.join(format!("{}.{}", stem, max_files));
    let _ = fs::remove_file(&oldest);

    // Shift: N-1 -> N, ... 1 -> 2
    for i in (1..max_files).rev() {
        let src = dir.join(format!("{}.{}", stem, i));
        let dst = dir.join(format!("{}.{}", stem, i + 1));
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }

    // Active -> .1
    let first = dir.join(format!("{}.1", stem));
    if path.exists() {
        let _ = fs::rename(path, first);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let base = std::env::temp_dir();
        let pid = std::process::id();
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        base.join(format!("ikarus-filelog-{}-{}-{}", tag, pid, ts))
    }

    #[test]
    fn test_rotate_files_keeps_max_files() {
        let dir = unique_temp_dir("rotate");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("link.log");

        fs::write(&path, "active").unwrap();
        fs::write(dir.join("link.log.1"), "one").unwrap();
        fs::write(dir.join("link.log.2"), "two").unwrap();

        rotate_files(&path, 2).unwrap();

        assert_eq!(fs::read_to_string(dir.join("link.log.1")).unwrap(), "active");
        assert_eq!(fs::read_to_string(dir.join("link.log.2")).unwrap(), "one");
        assert!(!dir.join("link.log.3").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_filter() {
        let filter = FileLogFilter {
            include_frames: false,
            include_firmware: true,
            include_system: false,
        };
        assert!(!filter.should_write(&LogEntry::frame_in("Thrust", 104)));
        assert!(filter.should_write(&LogEntry::firmware(Some(LogLevel::Info), "armed")));
        assert!(!filter.should_write(&LogEntry::system("connected")));
    }

    #[test]
    fn test_config_from_logs_section() {
        let mut logs = LogsConfig::default();
        assert!(FileLoggerConfig::from_logs(&logs).is_none());

        logs.file = Some(PathBuf::from("logs/link.log"));
        let cfg = FileLoggerConfig::from_logs(&logs).unwrap();
        assert_eq!(cfg.path, PathBuf::from("logs/link.log"));
        assert_eq!(cfg.max_files, logs.max_files);
    }

    #[test]
    fn test_logger_writes_lines() {
        let dir = unique_temp_dir("write");
        let path = dir.join("link.log");
        let logger = spawn_file_logger(FileLoggerConfig {
            path: path.clone(),
            max_bytes: 1 << 20,
            max_files: 2,
            flush_interval: Duration::from_millis(10),
            channel_capacity: 16,
            filter: FileLogFilter {
                include_frames: true,
                include_firmware: true,
                include_system: true,
            },
        })
        .unwrap();

        logger.log(&LogEntry::system("hello"));
        drop(logger);

        // Thread flushes on disconnect
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut content = String::new();
        while Instant::now() < deadline {
            content = fs::read_to_string(&path).unwrap_or_default();
            if content.contains("hello") {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(content.contains("[SYS] hello"));

        let _ = fs::remove_dir_all(&dir);
    }
}

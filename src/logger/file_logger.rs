use std::cell::Cell;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use crate::error::E::Failed2OpenFile;
use crate::error::R;
use crate::fio::file_io::FileIO;
use crate::fio::{IOManager, Mode};
use crate::options::LogOptions;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    /// FileIO 出错时自己也会打日志，同一线程内的嵌套日志直接丢弃
    static LOGGING: Cell<bool> = const { Cell::new(false) };
}

struct LogState {
    /// 写入失败后为 None，下次写日志时重新打开
    io: Option<FileIO>,
    /// 当前 0.log 已写入的字节数，避免每次都去 stat
    written: u64,
}

/// 同步写入的滚动文件日志，新日志总是写入 0.log
pub struct FileLogger {
    dir: PathBuf,
    file_threshold: u64,
    rotation: u16,
    level: LevelFilter,
    state: Mutex<LogState>,
}

impl FileLogger {
    pub fn new(options: &LogOptions) -> R<Self> {
        let dir = PathBuf::from(&options.dir_path);
        if fs::create_dir_all(&dir).is_err() {
            return Err(Failed2OpenFile(dir.display().to_string()));
        }
        let mut io = FileIO::new();
        let written = io.open(&dir.join("0.log"), Mode::Append)?;
        Ok(Self {
            dir,
            file_threshold: options.file_threshold,
            rotation: options.rotation,
            level: options.level,
            state: Mutex::new(LogState {
                io: Some(io),
                written,
            }),
        })
    }

    fn path(&self, num: u32) -> PathBuf {
        self.dir.join(format!("{}.log", num))
    }

    pub fn log_message(&self, level: Level, file: &str, line: u32, message: &str) {
        let thread = THREAD_ID.with(|id| *id);
        let buffer = format_line(Local::now(), level, thread, file, line, message);
        self.write(&[buffer.as_bytes()]);
    }

    /// 写一行带时间的标题，然后原样写入数据
    pub fn dump(&self, header: &str, data: &[u8]) {
        let now = Local::now();
        let buffer = format!("{}  {}\n", format_date(&now), header);
        self.write(&[buffer.as_bytes(), data]);
    }

    fn write(&self, parts: &[&[u8]]) {
        if LOGGING.with(|logging| logging.replace(true)) {
            return;
        }
        let mut state = self.state.lock();
        self.write_locked(&mut state, parts);
        drop(state);
        LOGGING.with(|logging| logging.set(false));
    }

    fn write_locked(&self, state: &mut LogState, parts: &[&[u8]]) {
        let path = self.path(0);
        if state.io.is_none() {
            let mut io = FileIO::new();
            let Ok(written) = io.open(&path, Mode::Append) else {
                return;
            };
            state.io = Some(io);
            state.written = written;
        }
        let Some(io) = state.io.as_mut() else {
            return;
        };

        let mut size = 0;
        for part in parts {
            if io.write(&path, part).is_err() {
                state.io = None;
                return;
            }
            size += part.len() as u64;
        }
        self.manage(state, size);
    }

    fn manage(&self, state: &mut LogState, written: u64) {
        // 0 表示不限制单个文件大小
        if self.file_threshold == 0 {
            return;
        }
        state.written += written;
        if state.written <= self.file_threshold {
            return;
        }

        state.written = 0;
        state.io = None;
        self.rotate();

        // 重新写一个空的 0.log
        let mut io = FileIO::new();
        if io.open(&self.path(0), Mode::Write).is_ok() {
            state.io = Some(io);
        }
    }

    /// 删除超出保留个数的旧文件，剩下的从最大编号开始依次 N.log -> N+1.log
    fn rotate(&self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        let mut max = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(num) = log_number(&name.to_string_lossy()) else {
                continue;
            };
            if self.rotation > 0 && num + 1 >= self.rotation as u32 {
                let _ = fs::remove_file(entry.path());
            } else if num > max {
                max = num;
            }
        }
        for num in (0..=max).rev() {
            let _ = fs::rename(self.path(num), self.path(num + 1));
        }
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.log_message(
            record.level(),
            record.file().unwrap_or(record.target()),
            record.line().unwrap_or(0),
            &record.args().to_string(),
        );
    }

    fn flush(&self) {}
}

fn log_number(name: &str) -> Option<u32> {
    name.strip_suffix(".log")?.parse().ok()
}

fn format_date(now: &DateTime<Local>) -> String {
    format!("{}.{:02}", now.format("%d/%m %H:%M:%S"), now.timestamp_subsec_millis() / 10)
}

fn pad(buffer: &mut String, width: usize) {
    while buffer.len() < width {
        buffer.push(' ');
    }
}

/// DD/MM HH:MM:SS.cc  LEVEL  threadId folder/file[line]  message
fn format_line(now: DateTime<Local>, level: Level, thread: u64, file: &str, line: u32, message: &str) -> String {
    let mut buffer = format!("{}  {}", format_date(&now), level);
    pad(&mut buffer, 25);

    let _ = write!(buffer, "{} ", thread);
    let path = Path::new(file);
    if let Some(parent) = path.parent().and_then(Path::file_name) {
        let parent = parent.to_string_lossy();
        if !parent.eq_ignore_ascii_case("src") {
            let _ = write!(buffer, "{}/", parent);
        }
    }
    let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    let _ = write!(buffer, "{}[{}] ", name, line);
    pad(&mut buffer, 60);

    buffer.push_str(message);
    buffer.push('\n');
    buffer
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};
    use tempfile::tempdir;

    use super::*;

    fn options(dir: &Path, file_threshold: u64, rotation: u16) -> LogOptions {
        LogOptions {
            dir_path: dir.display().to_string(),
            file_threshold,
            rotation,
            level: LevelFilter::Info,
        }
    }

    #[test]
    fn test_format_line() {
        let now = Local
            .with_ymd_and_hms(2024, 3, 7, 9, 5, 2)
            .unwrap()
            .with_nanosecond(345_000_000)
            .unwrap();
        let line = format_line(now, Level::Info, 3, "src/logger/file_logger.rs", 42, "hello");
        assert_eq!(&line[..25], "07/03 09:05:02.34  INFO  ");
        assert!(line[25..].starts_with("3 logger/file_logger.rs[42] "));
        assert_eq!(line.find("hello"), Some(60));
        assert!(line.ends_with("hello\n"));

        let line = format_line(now, Level::Warn, 12, "src/iofile.rs", 7, "x");
        assert!(line[25..].starts_with("12 iofile.rs[7] "));
    }

    #[test]
    fn test_log_number() {
        assert_eq!(log_number("0.log"), Some(0));
        assert_eq!(log_number("12.log"), Some(12));
        assert_eq!(log_number("a.log"), None);
        assert_eq!(log_number("3.txt"), None);
    }

    #[test]
    fn test_file_logger_writes_to_0_log() {
        let dir = tempdir().unwrap();
        let logger = FileLogger::new(&options(dir.path(), 0, 0)).unwrap();
        logger.log(
            &Record::builder()
                .args(format_args!("first message"))
                .level(Level::Warn)
                .file(Some("src/iofile.rs"))
                .line(Some(3))
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("filtered"))
                .level(Level::Debug)
                .build(),
        );
        let content = fs::read_to_string(dir.path().join("0.log")).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("WARN"));
        assert!(content.contains("iofile.rs[3]"));
        assert!(content.ends_with("first message\n"));
    }

    #[test]
    fn test_file_logger_rotation() {
        let dir = tempdir().unwrap();
        let logger = FileLogger::new(&options(dir.path(), 100, 3)).unwrap();
        for i in 0..20 {
            logger.log_message(Level::Info, "src/iofile.rs", i, "rotate me");
        }
        assert!(dir.path().join("0.log").exists());
        assert!(dir.path().join("1.log").exists());
        assert!(dir.path().join("2.log").exists());
        assert!(!dir.path().join("3.log").exists());
        assert!(fs::metadata(dir.path().join("0.log")).unwrap().len() <= 200);
    }

    #[test]
    fn test_file_logger_without_rotation_limit() {
        let dir = tempdir().unwrap();
        let logger = FileLogger::new(&options(dir.path(), 10, 0)).unwrap();
        for i in 0..5 {
            logger.log_message(Level::Error, "src/iofile.rs", i, "keep everything");
        }
        // 每一行都超过上限，每一行都会触发一次滚动
        for num in 1..=5 {
            assert!(dir.path().join(format!("{}.log", num)).exists());
        }
        assert_eq!(fs::metadata(dir.path().join("0.log")).unwrap().len(), 0);
        let oldest = fs::read_to_string(dir.path().join("5.log")).unwrap();
        assert!(oldest.contains("iofile.rs[0]"));
    }

    #[test]
    fn test_file_logger_dump() {
        let dir = tempdir().unwrap();
        let logger = FileLogger::new(&options(dir.path(), 0, 0)).unwrap();
        logger.dump("packet", &[1, 2, 3]);
        let content = fs::read(dir.path().join("0.log")).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("  packet\n"));
        assert!(content.ends_with(&[1, 2, 3]));
    }
}

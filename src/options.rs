use std::num::NonZeroUsize;
use std::thread;

use log::LevelFilter;

pub struct Options {
    /// IO 线程数，磁盘速度最多是内存的两倍左右，所以默认是 CPU 核数的两倍
    pub io_threads: usize,

    /// 解码线程数
    pub decode_threads: usize,
}

impl Default for Options {
    fn default() -> Self {
        let cores = cores();
        Self {
            io_threads: cores * 2,
            decode_threads: cores,
        }
    }
}

pub struct LogOptions {
    /// 日志目录
    pub dir_path: String,

    /// 单个日志文件大小上限，0 表示不限制
    pub file_threshold: u64,

    /// 保留的日志文件个数，0 表示不删除旧文件
    pub rotation: u16,

    pub level: LevelFilter,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir_path: "./logs".to_string(),
            file_threshold: 1_000_000,
            rotation: 10,
            level: LevelFilter::Info,
        }
    }
}

pub fn cores() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

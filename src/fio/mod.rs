pub mod file_io;

use std::path::{Path, MAIN_SEPARATOR};

use crate::error::R;

/// 文件打开模式
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Read,
    /// 打开时清空文件
    Write,
    Append,
}

impl Mode {
    pub fn is_write(&self) -> bool {
        matches!(self, Mode::Write | Mode::Append)
    }
}

/// IO 层接口，同步阻塞，只会在工作线程中被调用
pub trait IOManager: Send {
    /// 打开文件（或者创建/检查目录），返回文件当前大小
    fn open(&mut self, path: &Path, mode: Mode) -> R<u64>;

    /// 从当前位置读取数据，尽量填满 buf，返回读取到的字节数，0 表示到达文件末尾
    fn read(&mut self, path: &Path, buf: &mut [u8]) -> R<usize>;

    /// 写入整个字节数组
    fn write(&mut self, path: &Path, buf: &[u8]) -> R<()>;

    /// 关闭文件并从磁盘删除，文件不存在也算成功
    fn erase(&mut self, path: &Path) -> R<()>;

    fn close(&mut self);
}

/// 以路径分隔符结尾的路径表示目录
pub fn is_folder(path: &Path) -> bool {
    let path = path.as_os_str().to_string_lossy();
    path.ends_with('/') || path.ends_with(MAIN_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_is_folder() {
        assert!(is_folder(&PathBuf::from("logs/")));
        assert!(is_folder(&PathBuf::from("/tmp/a/b/")));
        assert!(!is_folder(&PathBuf::from("logs/0.log")));
        assert!(!is_folder(&PathBuf::from("")));
    }

    #[test]
    fn test_mode_is_write() {
        assert!(!Mode::Read.is_write());
        assert!(Mode::Write.is_write());
        assert!(Mode::Append.is_write());
    }
}

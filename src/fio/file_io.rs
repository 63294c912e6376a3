use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use log::error;

use crate::error::E::{Failed2EraseFile, Failed2OpenFile, Failed2ReadFromFile, Failed2Write2File};
use crate::error::R;
use crate::fio::{is_folder, IOManager, Mode};

/// 基于标准库的文件 IO
#[derive(Default)]
pub struct FileIO {
    /// file descriptor, 目录或者未打开时为 None
    fd: Option<File>,
}

impl FileIO {
    pub fn new() -> Self {
        Self { fd: None }
    }

    fn open_folder(path: &Path, mode: Mode) -> R<u64> {
        if mode == Mode::Read {
            if path.is_dir() {
                return Ok(0);
            }
            error!("folder {} doesn't exist", path.display());
            return Err(Failed2OpenFile(path.display().to_string()));
        }
        return match fs::create_dir_all(path) {
            Ok(()) => Ok(0),
            Err(e) => {
                error!("failed to create folder {}: {}", path.display(), e);
                Err(Failed2OpenFile(path.display().to_string()))
            }
        };
    }
}

impl IOManager for FileIO {
    fn open(&mut self, path: &Path, mode: Mode) -> R<u64> {
        self.close();
        if is_folder(path) {
            return Self::open_folder(path, mode);
        }

        let mut options = OpenOptions::new();
        match mode {
            Mode::Read => {
                options.read(true);
            }
            Mode::Write => {
                options.write(true).create(true).truncate(true);
            }
            Mode::Append => {
                options.append(true).create(true);
            }
        }

        let file = match options.open(path) {
            Ok(file) => file,
            Err(e) => {
                error!("failed to open file {}: {}", path.display(), e);
                return Err(Failed2OpenFile(path.display().to_string()));
            }
        };
        let size = match file.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                error!("failed to stat file {}: {}", path.display(), e);
                return Err(Failed2OpenFile(path.display().to_string()));
            }
        };
        self.fd = Some(file);
        Ok(size)
    }

    fn read(&mut self, path: &Path, buf: &mut [u8]) -> R<usize> {
        let Some(fd) = self.fd.as_mut() else {
            error!("read from {} which is not opened", path.display());
            return Err(Failed2ReadFromFile(path.display().to_string()));
        };
        let mut readen = 0;
        while readen < buf.len() {
            match fd.read(&mut buf[readen..]) {
                Ok(0) => break,
                Ok(n) => readen += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("read from file {} err: {}", path.display(), e);
                    return Err(Failed2ReadFromFile(path.display().to_string()));
                }
            }
        }
        Ok(readen)
    }

    fn write(&mut self, path: &Path, buf: &[u8]) -> R<()> {
        let Some(fd) = self.fd.as_mut() else {
            error!("write to {} which is not opened", path.display());
            return Err(Failed2Write2File(path.display().to_string()));
        };
        if let Err(e) = fd.write_all(buf) {
            error!("write to file {} err: {}", path.display(), e);
            return Err(Failed2Write2File(path.display().to_string()));
        }
        Ok(())
    }

    fn erase(&mut self, path: &Path) -> R<()> {
        self.close();
        let res = if is_folder(path) {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        return match res {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("failed to erase {}: {}", path.display(), e);
                Err(Failed2EraseFile(path.display().to_string()))
            }
        };
    }

    fn close(&mut self) {
        self.fd = None;
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_file_io_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tmp.data");
        let mut fio = FileIO::new();
        assert_eq!(fio.open(&path, Mode::Write).unwrap(), 0);
        assert!(fio.write(&path, "hello".as_bytes()).is_ok());
        fio.close();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_file_io_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tmp.data");
        fs::write(&path, "hello").unwrap();

        let mut fio = FileIO::new();
        assert_eq!(fio.open(&path, Mode::Append).unwrap(), 5);
        fio.write(&path, " world".as_bytes()).unwrap();
        fio.close();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn test_file_io_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tmp.data");
        fs::write(&path, "hello").unwrap();

        let mut fio = FileIO::new();
        assert_eq!(fio.open(&path, Mode::Read).unwrap(), 5);
        let mut buf = vec![0; 3];
        assert_eq!(fio.read(&path, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        let mut buf = vec![0; 10];
        assert_eq!(fio.read(&path, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
    }

    #[test]
    fn test_file_io_open_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.data");
        let mut fio = FileIO::new();
        let res = fio.open(&path, Mode::Read);
        assert_eq!(res, Err(Failed2OpenFile(path.display().to_string())));
        assert!(fio.read(&path, &mut [0; 1]).is_err());
    }

    #[test]
    fn test_file_io_folder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/");
        let mut fio = FileIO::new();
        assert!(fio.open(&path, Mode::Read).is_err());
        assert_eq!(fio.open(&path, Mode::Write).unwrap(), 0);
        assert!(path.is_dir());
        assert_eq!(fio.open(&path, Mode::Read).unwrap(), 0);
        fio.erase(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_io_erase() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tmp.data");
        let mut fio = FileIO::new();
        fio.open(&path, Mode::Append).unwrap();
        fio.erase(&path).unwrap();
        assert!(!path.exists());
        // 不存在的文件删除也算成功
        assert!(fio.erase(&path).is_ok());
    }
}

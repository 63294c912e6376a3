use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum E {
    #[error("failed to open file {0}")]
    Failed2OpenFile(String),

    #[error("failed to read from file {0}")]
    Failed2ReadFromFile(String),

    #[error("failed to write to file {0}")]
    Failed2Write2File(String),

    #[error("failed to erase file {0}")]
    Failed2EraseFile(String),

    #[error("file {0} is not opened in a mode allowing this operation")]
    WrongMode(String),

    #[error("{0} is a folder")]
    IsAFolder(String),

    /// 之前的错误已经释放了底层文件，不再允许任何操作
    #[error("file {0} has been released after a previous error")]
    FileReleased(String),

    #[error("data is corrupted")]
    DataCorrupted,

    #[error("failed to decode {0}")]
    Failed2Decode(String),

    #[error("cannot spawn worker thread")]
    Failed2SpawnThread,

    #[error("cannot install logger: {0}")]
    Failed2InitLogger(String),
}

pub type R<T> = Result<T, E>;

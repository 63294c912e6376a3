//! 异步文件 IO 引擎
//!
//! 调用方在自己的线程里提交 load/read/write/erase，阻塞的文件操作在 IO 线程池中执行，
//! 可选的流式解码在解码线程池中执行，所有回调都投递到 Handler 由拥有者线程执行。

mod action;
pub mod data;
pub mod error;
pub mod fio;
pub mod iofile;
pub mod logger;
pub mod options;
pub mod thread;

pub use data::decoder::{ChecksumDecoder, Decoded, Decoder};
pub use data::file::File;
pub use data::Buffer;
pub use error::{E, R};
pub use fio::Mode;
pub use iofile::IOFile;
pub use options::{LogOptions, Options};
pub use thread::handler::Handler;
pub use thread::thread_pool::{Priority, ThreadPool, Track};

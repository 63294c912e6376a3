use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use log::trace;
use parking_lot::{Mutex, RwLock};

use crate::data::decoder::{Decoded, Decoder};
use crate::data::Buffer;
use crate::error::E::{FileReleased, IsAFolder, WrongMode};
use crate::error::{E, R};
use crate::fio::file_io::FileIO;
use crate::fio::{is_folder, IOManager, Mode};
use crate::thread::thread_pool::Track;

pub type OnError = Arc<dyn Fn(&E) + Send + Sync>;
pub type OnFlush = Arc<dyn Fn(bool) + Send + Sync>;
pub type OnReaden = Arc<dyn Fn(Buffer, bool) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_error: Option<OnError>,
    on_flush: Option<OnFlush>,
    on_readen: Option<OnReaden>,
}

/// 异步 IO 操作的文件句柄，通过 Arc<File> 在调用方和工作线程之间共享
pub struct File {
    path: PathBuf,
    mode: Mode,
    folder: bool,

    /// 底层 IO，出错释放后为 None，之后的操作全部直接失败
    device: Mutex<Option<Box<dyn IOManager>>>,
    loaded: AtomicBool,

    /// 最近一次打开时的大小加上之后写入的字节数
    size: AtomicU64,
    readen: AtomicU64,

    /// 已入队还未写入的字节数
    queueing: AtomicU64,
    /// 正在投递中的 flush 通知数
    flushing: AtomicU32,

    decoder: Option<Mutex<Box<dyn Decoder>>>,
    callbacks: RwLock<Callbacks>,

    io_track: Track,
    decoding_track: Track,
}

impl File {
    pub fn new(path: impl Into<PathBuf>, mode: Mode) -> Self {
        Self::with_io(path, mode, Box::new(FileIO::new()))
    }

    pub fn with_io(path: impl Into<PathBuf>, mode: Mode, io: Box<dyn IOManager>) -> Self {
        let path = path.into();
        Self {
            folder: is_folder(&path),
            path,
            mode,
            device: Mutex::new(Some(io)),
            loaded: AtomicBool::new(false),
            size: AtomicU64::new(0),
            readen: AtomicU64::new(0),
            queueing: AtomicU64::new(0),
            flushing: AtomicU32::new(0),
            decoder: None,
            callbacks: RwLock::new(Callbacks::default()),
            io_track: Track::new(),
            decoding_track: Track::new(),
        }
    }

    pub fn with_decoder<D: Decoder + 'static>(mut self, decoder: D) -> Self {
        self.decoder = Some(Mutex::new(Box::new(decoder)));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_folder(&self) -> bool {
        self.folder
    }

    pub fn loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// 出错后底层 IO 已被释放
    pub fn released(&self) -> bool {
        self.device.lock().is_none()
    }

    /// 不会重新 stat，和调用方之前拿到的大小保持一致
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    pub fn readen(&self) -> u64 {
        self.readen.load(Ordering::SeqCst)
    }

    pub fn queueing(&self) -> u64 {
        self.queueing.load(Ordering::SeqCst)
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    pub(crate) fn load(&self) -> R<()> {
        let mut device = self.device.lock();
        self.load_locked(&mut device)
    }

    fn load_locked(&self, device: &mut Option<Box<dyn IOManager>>) -> R<()> {
        let Some(io) = device.as_mut() else {
            return Err(FileReleased(self.display()));
        };
        if self.loaded() {
            return Ok(());
        }
        let size = io.open(&self.path, self.mode)?;
        self.size.store(size, Ordering::SeqCst);
        self.readen.store(0, Ordering::SeqCst);
        // 写模式打开的目录永远不算 loaded，空写入总能触发目录创建
        self.loaded.store(!(self.folder && self.mode.is_write()), Ordering::SeqCst);
        trace!("file {} loaded, size {}", self.path.display(), size);
        Ok(())
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> R<usize> {
        if self.mode != Mode::Read {
            return Err(WrongMode(self.display()));
        }
        let mut device = self.device.lock();
        self.load_locked(&mut device)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(io) = device.as_mut() else {
            return Err(FileReleased(self.display()));
        };
        let readen = io.read(&self.path, buf)?;
        self.readen.fetch_add(readen as u64, Ordering::SeqCst);
        Ok(readen)
    }

    pub(crate) fn write(&self, data: &[u8]) -> R<()> {
        if !self.mode.is_write() {
            return Err(WrongMode(self.display()));
        }
        if self.folder && !data.is_empty() {
            return Err(IsAFolder(self.display()));
        }
        let mut device = self.device.lock();
        self.load_locked(&mut device)?;
        if data.is_empty() {
            return Ok(());
        }
        let Some(io) = device.as_mut() else {
            return Err(FileReleased(self.display()));
        };
        io.write(&self.path, data)?;
        self.size.fetch_add(data.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn erase(&self) -> R<()> {
        let mut device = self.device.lock();
        let Some(io) = device.as_mut() else {
            return Err(FileReleased(self.display()));
        };
        io.erase(&self.path)?;
        self.loaded.store(false, Ordering::SeqCst);
        self.size.store(0, Ordering::SeqCst);
        self.readen.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// 出错后释放底层 IO
    pub(crate) fn release(&self) {
        if let Some(mut io) = self.device.lock().take() {
            io.close();
        }
        self.loaded.store(false, Ordering::SeqCst);
    }

    pub(crate) fn decode(&self, buffer: Buffer, end: bool) -> R<Decoded> {
        return match &self.decoder {
            Some(decoder) => decoder.lock().decode(buffer, end),
            None => Ok(Decoded {
                output: Some(buffer),
                wanted: 0,
            }),
        };
    }

    pub(crate) fn add_queueing(&self, size: u64) {
        self.queueing.fetch_add(size, Ordering::SeqCst);
    }

    /// 返回剩余的排队字节数
    pub(crate) fn sub_queueing(&self, size: u64) -> u64 {
        self.queueing.fetch_sub(size, Ordering::SeqCst) - size
    }

    /// 返回 true 表示由调用者负责投递 flush 通知，已经有通知在路上时合并掉
    pub(crate) fn begin_flush(&self) -> bool {
        if self.flushing.fetch_add(1, Ordering::SeqCst) == 0 {
            return true;
        }
        self.flushing.fetch_sub(1, Ordering::SeqCst);
        false
    }

    /// 返回 true 表示这是最后一个在路上的 flush 通知
    pub(crate) fn end_flush(&self) -> bool {
        self.flushing.fetch_sub(1, Ordering::SeqCst) == 1
    }

    pub(crate) fn io_track(&self) -> &Track {
        &self.io_track
    }

    pub(crate) fn decoding_track(&self) -> &Track {
        &self.decoding_track
    }

    pub(crate) fn set_on_error(&self, on_error: OnError) {
        self.callbacks.write().on_error = Some(on_error);
    }

    pub(crate) fn set_on_flush(&self, on_flush: OnFlush) {
        self.callbacks.write().on_flush = Some(on_flush);
    }

    pub(crate) fn set_on_readen(&self, on_readen: OnReaden) {
        self.callbacks.write().on_readen = Some(on_readen);
    }

    // 回调先克隆出来再调用，回调内部可以重新订阅

    pub(crate) fn on_error(&self, e: &E) {
        let on_error = self.callbacks.read().on_error.clone();
        if let Some(on_error) = on_error {
            on_error(e);
        }
    }

    pub(crate) fn on_flush(&self, drained: bool) {
        let on_flush = self.callbacks.read().on_flush.clone();
        if let Some(on_flush) = on_flush {
            on_flush(drained);
        }
    }

    pub(crate) fn on_readen(&self, buffer: Buffer, end: bool) {
        let on_readen = self.callbacks.read().on_readen.clone();
        if let Some(on_readen) = on_readen {
            on_readen(buffer, end);
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("loaded", &self.loaded())
            .field("size", &self.size())
            .field("readen", &self.readen())
            .finish()
    }
}

impl Drop for File {
    fn drop(&mut self) {
        trace!("file {} dropped", self.path.display());
    }
}

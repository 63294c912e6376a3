use std::sync::Arc;

use log::debug;

use crate::action::{Action, Context, Kind};
use crate::data::file::{File, OnError, OnFlush, OnReaden};
use crate::data::Buffer;
use crate::error::{E, R};
use crate::options::Options;
use crate::thread::handler::Handler;
use crate::thread::thread_pool::{Priority, ThreadPool};

/// 异步文件 IO 引擎
///
/// 所有阻塞的文件操作都在 IO 线程池中执行，解码在解码线程池中执行，
/// 用户回调全部投递到 Handler，由拥有者线程执行。同一个文件的操作按提交顺序执行。
pub struct IOFile {
    context: Context,
}

impl IOFile {
    pub fn new(handler: Handler, decode_pool: Arc<ThreadPool>, options: &Options) -> R<Self> {
        // 磁盘操作大部分时间在等待，低优先级运行，不和解码等计算任务抢 CPU
        let io_pool = Arc::new(ThreadPool::new("iofile", options.io_threads, Priority::Low)?);
        debug!(
            "IOFile started, {} io threads, decoding on pool {}",
            io_pool.threads(),
            decode_pool.name()
        );
        Ok(Self {
            context: Context {
                handler,
                io_pool,
                decode_pool,
            },
        })
    }

    /// 自己创建解码线程池，不和调用方共享
    pub fn standalone(handler: Handler, options: &Options) -> R<Self> {
        let decode_pool = Arc::new(ThreadPool::new("decoding", options.decode_threads, Priority::Normal)?);
        Self::new(handler, decode_pool, options)
    }

    pub fn handler(&self) -> &Handler {
        &self.context.handler
    }

    pub fn subscribe<FE, FF>(&self, file: &Arc<File>, on_error: FE, on_flush: FF)
    where
        FE: Fn(&E) + Send + Sync + 'static,
        FF: Fn(bool) + Send + Sync + 'static,
    {
        file.set_on_error(Arc::new(on_error) as OnError);
        let on_flush = Arc::new(on_flush) as OnFlush;
        file.set_on_flush(on_flush.clone());
        if file.mode().is_write() {
            // 可以马上开始写
            on_flush(false);
        }
    }

    pub fn subscribe_read<FR, FE>(&self, file: &Arc<File>, on_readen: FR, on_error: FE)
    where
        FR: Fn(Buffer, bool) + Send + Sync + 'static,
        FE: Fn(&E) + Send + Sync + 'static,
    {
        file.set_on_readen(Arc::new(on_readen) as OnReaden);
        file.set_on_error(Arc::new(on_error) as OnError);
    }

    /// 强引用：即使调用方已经放手，文件/目录的创建也要完成
    pub fn load(&self, file: &Arc<File>) {
        if file.loaded() {
            return;
        }
        Action::strong(file, Kind::Load, self.context.clone()).queue_on(&self.context.io_pool, file.io_track());
    }

    /// 弱引用：size 为 0 也会执行，以便收到一次读取完成事件
    pub fn read(&self, file: &Arc<File>, size: usize) {
        Action::weak(file, Kind::Read(size), self.context.clone()).queue_on(&self.context.io_pool, file.io_track());
    }

    /// 强引用：排队的写入一定会落盘
    ///
    /// 未加载时的空写入不会被跳过，用于创建（清空）文件或者创建目录
    pub fn write(&self, file: &Arc<File>, data: impl Into<Buffer>) {
        let data = data.into();
        if data.is_empty() && file.loaded() {
            return;
        }
        file.add_queueing(data.len() as u64);
        Action::strong(file, Kind::Write(data), self.context.clone()).queue_on(&self.context.io_pool, file.io_track());
    }

    pub fn erase(&self, file: &Arc<File>) {
        Action::strong(file, Kind::Erase, self.context.clone()).queue_on(&self.context.io_pool, file.io_track());
    }

    /// 等待两个线程池都空闲
    ///
    /// 解码会发起新的读取，读取又会发起新的解码，所以要反复 join 直到两边都没有新任务
    pub fn join(&self) {
        loop {
            let decoding = self.context.decode_pool.join();
            let io = self.context.io_pool.join();
            if !decoding && !io {
                break;
            }
        }
    }
}

impl Drop for IOFile {
    fn drop(&mut self) {
        self.join();
    }
}

use std::sync::{Arc, Weak};

use log::{trace, warn};

use crate::data::file::File;
use crate::data::Buffer;
use crate::error::E::WrongMode;
use crate::error::{E, R};
use crate::fio::Mode;
use crate::thread::handler::Handler;
use crate::thread::thread_pool::{ThreadPool, Track};

/// 动作对文件的引用方式
pub(crate) enum FileRef {
    /// 持有文件，即使调用方已经放手操作也一定会执行完
    Strong(Arc<File>),
    /// 只观察文件，执行时文件已被释放就直接放弃
    Weak(Weak<File>),
}

impl FileRef {
    fn resolve(self) -> Option<Arc<File>> {
        return match self {
            FileRef::Strong(file) => Some(file),
            FileRef::Weak(file) => file.upgrade(),
        };
    }
}

/// 除了当前动作之外是否还有人持有这个文件，没有的话结果不会有人看到
pub(crate) fn observed(file: &Arc<File>) -> bool {
    Arc::strong_count(file) > 1
}

pub(crate) enum Kind {
    Load,
    Read(usize),
    Write(Buffer),
    Erase,
    Decode { buffer: Buffer, end: bool },
}

impl Kind {
    fn name(&self) -> &'static str {
        return match self {
            Kind::Load => "LoadFile",
            Kind::Read(_) => "ReadFile",
            Kind::Write(_) => "WriteFile",
            Kind::Erase => "EraseFile",
            Kind::Decode { .. } => "DecodingFile",
        };
    }

    fn process(self, file: &Arc<File>, context: &Context) -> R<()> {
        return match self {
            Kind::Load => file.load(),
            Kind::Read(size) => read(file, size, context),
            Kind::Write(data) => write(file, data, context),
            Kind::Erase => {
                file.erase()?;
                context.signal_flush(file);
                Ok(())
            }
            Kind::Decode { buffer, end } => decode(file, buffer, end, context),
        };
    }
}

/// 投递到 Handler 的通知，执行时同样只持有弱引用
pub(crate) enum Notification {
    Error(E),
    Readen { buffer: Buffer, end: bool },
    Flush,
}

impl Notification {
    fn deliver(self, file: &File) {
        match self {
            Notification::Error(e) => file.on_error(&e),
            Notification::Readen { buffer, end } => file.on_readen(buffer, end),
            Notification::Flush => {
                if file.end_flush() {
                    file.on_flush(!file.loaded());
                }
            }
        }
    }
}

#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) handler: Handler,
    /// 所有磁盘操作所在的线程池，包括解码之后的后续读取
    pub(crate) io_pool: Arc<ThreadPool>,
    pub(crate) decode_pool: Arc<ThreadPool>,
}

impl Context {
    /// 有人持有文件时才投递通知，返回是否投递
    fn notify(&self, file: &Arc<File>, notification: Notification) -> bool {
        if !observed(file) {
            return false;
        }
        let file = Arc::downgrade(file);
        self.handler.queue(move || {
            if let Some(file) = file.upgrade() {
                notification.deliver(&file);
            }
        });
        true
    }

    fn signal_flush(&self, file: &Arc<File>) {
        if file.begin_flush() && !self.notify(file, Notification::Flush) {
            file.end_flush();
        }
    }
}

pub(crate) struct Action {
    file: FileRef,
    kind: Kind,
    context: Context,
}

impl Action {
    pub(crate) fn strong(file: &Arc<File>, kind: Kind, context: Context) -> Self {
        Self {
            file: FileRef::Strong(file.clone()),
            kind,
            context,
        }
    }

    pub(crate) fn weak(file: &Arc<File>, kind: Kind, context: Context) -> Self {
        Self {
            file: FileRef::Weak(Arc::downgrade(file)),
            kind,
            context,
        }
    }

    pub(crate) fn queue_on(self, pool: &ThreadPool, track: &Track) {
        pool.queue_ordered(move || self.run(), track);
    }

    pub(crate) fn run(self) {
        let Action { file, kind, context } = self;
        let name = kind.name();
        let Some(file) = file.resolve() else {
            trace!("{} abandoned, file already released", name);
            return;
        };
        trace!("{} {}", name, file.path().display());

        if let Err(e) = kind.process(&file, &context) {
            warn!("{} {} failed: {}", name, file.path().display(), e);
            context.notify(&file, Notification::Error(e));
            file.release();
        }
    }
}

fn read(file: &Arc<File>, size: usize, context: &Context) -> R<()> {
    if !observed(file) {
        trace!("nobody to receive {}, skip reading", file.path().display());
        return Ok(());
    }
    // 写模式的文件加载时会被清空，先检查
    if file.mode() != Mode::Read {
        return Err(WrongMode(file.path().display().to_string()));
    }
    file.load()?;

    // 用上次拿到的大小而不是重新 stat，和调用方之前看到的大小保持一致，同时避免分配过大的缓冲
    let available = file.size().saturating_sub(file.readen());
    let mut buffer = vec![0; available.min(size as u64) as usize];
    let readen = file.read(&mut buffer)?;
    buffer.truncate(readen);
    let end = readen as u64 == available;

    if file.has_decoder() {
        let track = file.decoding_track();
        Action::weak(file, Kind::Decode { buffer, end }, context.clone()).queue_on(&context.decode_pool, track);
    } else {
        context.notify(file, Notification::Readen { buffer, end });
    }
    Ok(())
}

fn write(file: &Arc<File>, data: Buffer, context: &Context) -> R<()> {
    let queueing = file.sub_queueing(data.len() as u64);
    file.write(&data)?;
    // 后面还有排队的写入时不通知
    if queueing == 0 {
        context.signal_flush(file);
    }
    Ok(())
}

fn decode(file: &Arc<File>, buffer: Buffer, end: bool, context: &Context) -> R<()> {
    let decoded = file.decode(buffer, end)?;
    // 后续读取回到 IO 线程池的文件队列上，排在调用方之前发起的读取之后；先入队再投递输出
    if decoded.wanted > 0 && !end {
        let track = file.io_track();
        Action::weak(file, Kind::Read(decoded.wanted), context.clone()).queue_on(&context.io_pool, track);
    }
    if let Some(output) = decoded.output {
        context.notify(file, Notification::Readen { buffer: output, end });
    }
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;
use parking_lot::Mutex;

use crate::thread::thread_pool::Job;

pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// 所有用户回调都投递到这里，由拥有者线程调用 flush 统一执行
#[derive(Clone)]
pub struct Handler {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    flushing: Arc<Mutex<()>>,
    notifier: Option<Notifier>,
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            flushing: Arc::new(Mutex::new(())),
            notifier: None,
        }
    }

    /// 每次投递之后在投递线程上调用 notifier，拥有者可以借此唤醒自己的事件循环再 flush
    pub fn with_notifier<F>(notifier: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            notifier: Some(Arc::new(notifier)),
            ..Self::new()
        }
    }

    pub fn queue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.sender.send(Box::new(job));
        if let Some(notifier) = &self.notifier {
            notifier();
        }
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// 在当前线程执行所有待处理的回调，返回执行的个数
    ///
    /// 回调内部再次 flush 会直接返回 0，保证回调之间不会并发也不会重入
    pub fn flush(&self) -> usize {
        let Some(_guard) = self.flushing.try_lock() else {
            return 0;
        };
        let mut count = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            count += 1;
        }
        if count > 0 {
            trace!("handler flushed {} jobs", count);
        }
        count
    }

    /// 最多等待 timeout 直到有回调到达，然后执行所有待处理的回调
    pub fn flush_timeout(&self, timeout: Duration) -> usize {
        let Some(_guard) = self.flushing.try_lock() else {
            return 0;
        };
        let Ok(first) = self.receiver.recv_timeout(timeout) else {
            return 0;
        };
        first();
        let mut count = 1;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn test_handler_fifo() {
        let handler = Handler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            handler.queue(move || seen.lock().push(i));
        }
        assert_eq!(handler.pending(), 10);
        assert!(seen.lock().is_empty());
        assert_eq!(handler.flush(), 10);
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
        assert_eq!(handler.flush(), 0);
    }

    #[test]
    fn test_handler_runs_on_flushing_thread() {
        let handler = Handler::new();
        let poster = handler.clone();
        let owner = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let ran = ran_on.clone();
        thread::spawn(move || poster.queue(move || *ran.lock() = Some(thread::current().id())))
            .join()
            .unwrap();
        assert_eq!(handler.flush_timeout(Duration::from_secs(5)), 1);
        assert_eq!(*ran_on.lock(), Some(owner));
    }

    #[test]
    fn test_handler_refuses_reentrant_flush() {
        let handler = Handler::new();
        let inner = handler.clone();
        let nested = Arc::new(Mutex::new(None));
        let n = nested.clone();
        handler.queue(move || *n.lock() = Some(inner.flush()));
        handler.queue(|| {});
        assert_eq!(handler.flush(), 2);
        assert_eq!(*nested.lock(), Some(0));
    }

    #[test]
    fn test_notifier_called_after_each_post() {
        let posted = Arc::new(AtomicUsize::new(0));
        let counter = posted.clone();
        let handler = Handler::with_notifier(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let poster = handler.clone();
        thread::spawn(move || {
            poster.queue(|| {});
            poster.queue(|| {});
        })
        .join()
        .unwrap();
        assert_eq!(posted.load(Ordering::SeqCst), 2);
        assert_eq!(handler.pending(), 2);
        assert_eq!(handler.flush(), 2);
        // flush 不会触发通知
        assert_eq!(posted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_flush_timeout_without_jobs() {
        let handler = Handler::new();
        assert_eq!(handler.flush_timeout(Duration::from_millis(10)), 0);
    }
}

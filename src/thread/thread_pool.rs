use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex};
use thread_priority::{set_current_thread_priority, ThreadPriority};

use crate::error::E::Failed2SpawnThread;
use crate::error::R;

pub type Job = Box<dyn FnOnce() + Send>;

/// 工作线程的调度优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Normal,
    /// 系统允许的最低优先级，设置失败时按普通优先级运行
    Low,
}

/// 顺序队列：同一个 Track 上的任务严格按入队顺序执行，不同 Track 之间可以并发
#[derive(Clone, Default)]
pub struct Track {
    inner: Arc<Mutex<TrackJobs>>,
}

#[derive(Default)]
struct TrackJobs {
    jobs: VecDeque<Job>,
    /// 已经交给线程池调度，同一时刻只有一个线程在执行这个 Track 的任务
    scheduled: bool,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队，返回 true 表示需要交给线程池调度
    fn push(&self, job: Job) -> bool {
        let mut guard = self.inner.lock();
        guard.jobs.push_back(job);
        !std::mem::replace(&mut guard.scheduled, true)
    }

    /// 等待执行的任务数，不包括正在执行的
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    fn pop(&self) -> Option<Job> {
        self.inner.lock().jobs.pop_front()
    }

    /// 执行完一个任务后调用，返回 true 表示还有任务需要重新调度
    fn reschedule(&self) -> bool {
        let mut guard = self.inner.lock();
        if guard.jobs.is_empty() {
            guard.scheduled = false;
            return false;
        }
        true
    }
}

enum Message {
    Job(Job),
    Track(Track),
    Terminate,
}

struct Shared {
    name: String,
    priority: Priority,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    /// 已入队但还未执行完的任务数
    active: Mutex<usize>,
    idle: Condvar,
    /// 上次 join 之后入队的任务数
    queued: AtomicUsize,
}

impl Shared {
    fn enqueue(&self) {
        *self.active.lock() += 1;
        self.queued.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        let mut active = self.active.lock();
        *active -= 1;
        if *active == 0 {
            self.idle.notify_all();
        }
    }

    fn run(&self, job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("a job of thread pool {} panicked", self.name);
        }
        self.done();
    }
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(name: &str, threads: usize, priority: Priority) -> R<Self> {
        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared {
            name: name.to_string(),
            priority,
            sender,
            receiver,
            active: Mutex::new(0),
            idle: Condvar::new(),
            queued: AtomicUsize::new(0),
        });

        let threads = threads.max(1);
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let worker_shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || worker_loop(worker_shared));
            match handle {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!("failed to spawn thread {} of pool {}: {}", i, name, e);
                    stop(&shared, handles);
                    return Err(Failed2SpawnThread);
                }
            }
        }
        debug!("thread pool {} started with {} threads at {:?} priority", name, threads, priority);

        Ok(Self {
            shared,
            threads: Mutex::new(handles),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn priority(&self) -> Priority {
        self.shared.priority
    }

    pub fn threads(&self) -> usize {
        self.threads.lock().len()
    }

    /// 无序任务，交给任意空闲线程
    pub fn queue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.enqueue();
        // receiver 由 shared 持有，发送不会失败
        let _ = self.shared.sender.send(Message::Job(Box::new(job)));
    }

    /// 有序任务，同一个 track 上的任务按入队顺序逐个执行
    pub fn queue_ordered<F>(&self, job: F, track: &Track)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.enqueue();
        if track.push(Box::new(job)) {
            let _ = self.shared.sender.send(Message::Track(track.clone()));
        }
    }

    /// 等待所有已入队的任务执行完，返回上次 join 之后是否有过任务
    ///
    /// 不能在本线程池的工作线程中调用
    pub fn join(&self) -> bool {
        let mut active = self.shared.active.lock();
        while *active > 0 {
            self.shared.idle.wait(&mut active);
        }
        drop(active);
        self.shared.queued.swap(0, Ordering::SeqCst) > 0
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join();
        let handles = std::mem::take(&mut *self.threads.lock());
        stop(&self.shared, handles);
        debug!("thread pool {} stopped", self.shared.name);
    }
}

fn stop(shared: &Shared, handles: Vec<JoinHandle<()>>) {
    for _ in 0..handles.len() {
        let _ = shared.sender.send(Message::Terminate);
    }
    for handle in handles {
        if handle.join().is_err() {
            error!("a thread of pool {} panicked", shared.name);
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    if shared.priority == Priority::Low {
        if let Err(e) = set_current_thread_priority(ThreadPriority::Min) {
            warn!("failed to lower the priority of a thread of pool {}: {:?}", shared.name, e);
        }
    }
    while let Ok(message) = shared.receiver.recv() {
        match message {
            Message::Job(job) => shared.run(job),
            Message::Track(track) => {
                if let Some(job) = track.pop() {
                    // 先执行，再决定是否把 track 重新交给线程池，保证同一个 track 不会被两个线程同时执行
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("a job of thread pool {} panicked", shared.name);
                    }
                    if track.reschedule() {
                        let _ = shared.sender.send(Message::Track(track));
                    }
                    shared.done();
                }
            }
            Message::Terminate => break,
        }
    }
}

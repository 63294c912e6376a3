pub mod handler;
pub mod thread_pool;

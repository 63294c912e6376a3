pub mod decoder;
pub mod file;

/// 读取、解码、投递过程中传递的字节缓冲，每个阶段独占所有权
pub type Buffer = Vec<u8>;

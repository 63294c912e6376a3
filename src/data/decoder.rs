use crc::{Crc, Digest, CRC_32_ISO_HDLC};
use log::warn;

use crate::data::Buffer;
use crate::error::E::DataCorrupted;
use crate::error::R;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// 一次解码的结果
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// 需要投递给调用方的数据
    pub output: Option<Buffer>,

    /// 还想继续读取的字节数，0 表示不再需要
    pub wanted: usize,
}

/// 流式解码插件，读取完成后在解码线程池中调用，同一个文件的调用严格有序
pub trait Decoder: Send {
    fn decode(&mut self, buffer: Buffer, end: bool) -> R<Decoded>;
}

/// 原样透传数据，按固定大小分块读取，读到末尾时校验整个流的 crc
pub struct ChecksumDecoder {
    expected: u32,
    chunk_size: usize,
    digest: Option<Digest<'static, u32>>,
}

impl ChecksumDecoder {
    pub fn new(expected: u32, chunk_size: usize) -> Self {
        Self {
            expected,
            chunk_size,
            digest: Some(CRC32.digest()),
        }
    }

    pub fn checksum(data: &[u8]) -> u32 {
        CRC32.checksum(data)
    }
}

impl Decoder for ChecksumDecoder {
    fn decode(&mut self, buffer: Buffer, end: bool) -> R<Decoded> {
        let digest = self.digest.get_or_insert_with(|| CRC32.digest());
        digest.update(&buffer);
        if !end {
            return Ok(Decoded {
                output: Some(buffer),
                wanted: self.chunk_size,
            });
        }

        let Some(digest) = self.digest.take() else {
            return Err(DataCorrupted);
        };
        let actual = digest.finalize();
        if actual != self.expected {
            warn!("crc mismatch, expected {:#010x} got {:#010x}", self.expected, actual);
            return Err(DataCorrupted);
        }
        Ok(Decoded {
            output: Some(buffer),
            wanted: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_decoder_pass_through() {
        let data = b"hello world".to_vec();
        let mut decoder = ChecksumDecoder::new(ChecksumDecoder::checksum(&data), 4);

        let decoded = decoder.decode(data[..6].to_vec(), false).unwrap();
        assert_eq!(decoded.output.unwrap(), b"hello ");
        assert_eq!(decoded.wanted, 4);

        let decoded = decoder.decode(data[6..].to_vec(), true).unwrap();
        assert_eq!(decoded.output.unwrap(), b"world");
        assert_eq!(decoded.wanted, 0);
    }

    #[test]
    fn test_checksum_decoder_corrupted() {
        let mut decoder = ChecksumDecoder::new(ChecksumDecoder::checksum(b"hello"), 16);
        assert!(decoder.decode(b"hel".to_vec(), false).is_ok());
        assert_eq!(decoder.decode(b"p!".to_vec(), true), Err(DataCorrupted));
    }
}

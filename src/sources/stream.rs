//! Blocks read from a byte stream

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::Result;
use crate::codec::ByteBuffer;
use crate::source::{BlockSource, RawBlock};
use crate::transport::{BLOCK_HEADER_LEN, read_block};

/// Reads length-prefixed blocks from any async byte stream.
pub struct StreamSource<R> {
    reader: R,
    endpoint: String,
    max_block_length: u32,
    buffer: ByteBuffer,
}

impl<R> StreamSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Wrap `reader`, refusing blocks whose body exceeds `max_block_length`.
    pub fn new(reader: R, endpoint: impl Into<String>, max_block_length: u32) -> Self {
        Self { reader, endpoint: endpoint.into(), max_block_length, buffer: ByteBuffer::new() }
    }
}

#[async_trait::async_trait]
impl<R> BlockSource for StreamSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn next_block(&mut self) -> Result<Option<RawBlock>> {
        self.buffer.clear();
        let limit = self.max_block_length;
        let result = read_block(&mut self.reader, &mut self.buffer, |tag, length| {
            if length > limit {
                warn!(tag, length, limit, "Refusing oversized block");
                return false;
            }
            true
        })
        .await;

        match result {
            Ok(header) => {
                let body = self.buffer.as_bytes()[BLOCK_HEADER_LEN..].to_vec();
                Ok(Some(RawBlock::new(header.tag, body)))
            }
            Err(e) if e.is_disconnect() => {
                debug!(endpoint = %self.endpoint, "Stream closed by peer");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamError;
    use crate::transport::append_block;

    #[tokio::test]
    async fn yields_blocks_then_end_of_stream() {
        let mut bytes = ByteBuffer::new();
        append_block(&mut bytes, 7, &1u32);
        append_block(&mut bytes, 8, "body");

        let mut source = StreamSource::new(std::io::Cursor::new(bytes.into_vec()), "memory", 1024);
        let first = source.next_block().await.unwrap().unwrap();
        assert_eq!(first.tag, 7);
        assert_eq!(first.body.as_bytes(), &1u32.to_ne_bytes());

        let mut second = source.next_block().await.unwrap().unwrap();
        assert_eq!(second.body.read::<String>().as_deref(), Some("body"));

        assert!(source.next_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_block_is_rejected() {
        let mut bytes = ByteBuffer::new();
        append_block(&mut bytes, 7, &[0u8; 64][..]);

        let mut source = StreamSource::new(std::io::Cursor::new(bytes.into_vec()), "memory", 16);
        let result = source.next_block().await;
        assert!(matches!(result, Err(StreamError::BlockRejected { tag: 7, .. })));
    }
}

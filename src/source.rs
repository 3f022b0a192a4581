//! Source trait for incoming blocks

use crate::Result;
use crate::codec::ByteBuffer;

/// One framed block as read off the wire, body not yet interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub tag: u32,
    /// Body bytes only, cursor at zero
    pub body: ByteBuffer,
}

impl RawBlock {
    pub fn new(tag: u32, body: impl Into<Vec<u8>>) -> Self {
        Self { tag, body: ByteBuffer::from_bytes(body) }
    }
}

/// Trait for block inputs
///
/// Sources abstract over a TCP stream and a multicast receiver. Each source
/// handles its own framing; the connection driver only sees whole blocks.
#[async_trait::async_trait]
pub trait BlockSource: Send + 'static {
    /// Get the next block
    ///
    /// Returns:
    /// - `Ok(Some(block))` - A whole block arrived
    /// - `Ok(None)` - The peer closed the stream
    /// - `Err(e)` - Socket error or rejected block
    async fn next_block(&mut self) -> Result<Option<RawBlock>>;

    /// Human-readable endpoint, used in logs
    fn endpoint(&self) -> String;
}

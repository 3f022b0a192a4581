//! Block framing over stream and datagram sockets.
//!
//! Every block is `[tag: u32][length: u32][body: length bytes]` in native byte
//! order. Reads go through a verify callback that sees the header before any
//! body bytes are consumed, so oversized or unwanted blocks can be refused
//! without allocating for them.

use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;

use crate::codec::{ByteBuffer, Encode};
use crate::{Result, StreamError};

/// Size of the `(tag, length)` header in front of every block.
pub const BLOCK_HEADER_LEN: usize = 8;

/// Parsed block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub tag: u32,
    /// Body length in bytes, header excluded
    pub length: u32,
}

impl BlockHeader {
    /// Parse a header from the first [`BLOCK_HEADER_LEN`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let tag = u32::from_ne_bytes(bytes.get(0..4)?.try_into().ok()?);
        let length = u32::from_ne_bytes(bytes.get(4..8)?.try_into().ok()?);
        Some(Self { tag, length })
    }

    pub fn to_bytes(self) -> [u8; BLOCK_HEADER_LEN] {
        let mut bytes = [0u8; BLOCK_HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.tag.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.length.to_ne_bytes());
        bytes
    }

    /// Header plus body size.
    pub fn block_len(self) -> usize {
        BLOCK_HEADER_LEN + self.length as usize
    }
}

/// Append one complete block to the end of `buffer`.
///
/// The header is reserved first, the body encoded behind it, then the length
/// is filled in. The cursor ends after the block.
pub fn append_block<T: Encode + ?Sized>(buffer: &mut ByteBuffer, tag: u32, body: &T) {
    let start = buffer.len();
    buffer.set_offset(start);
    buffer.write(&tag);
    buffer.write(&0u32);
    buffer.write(body);

    let end = buffer.offset();
    let length = (end - start - BLOCK_HEADER_LEN) as u32;
    buffer.set_offset(start + 4);
    buffer.write(&length);
    buffer.set_offset(end);
}

/// Read one block from `reader` and append it, header included, to `buffer`.
///
/// `verify` is called with `(tag, length)` once the header is in; returning
/// `false` fails the read with [`StreamError::BlockRejected`] and leaves the
/// body unread. On success the cursor sits at the start of the body.
pub async fn read_block<R, F>(
    reader: &mut R,
    buffer: &mut ByteBuffer,
    verify: F,
) -> Result<BlockHeader>
where
    R: AsyncRead + Unpin,
    F: FnOnce(u32, u32) -> bool,
{
    let mut header_bytes = [0u8; BLOCK_HEADER_LEN];
    reader
        .read_exact(&mut header_bytes)
        .await
        .map_err(|e| StreamError::io("read block header", e))?;

    let header = BlockHeader::parse(&header_bytes).ok_or_else(|| {
        StreamError::io("read block header", std::io::ErrorKind::InvalidData.into())
    })?;
    if !verify(header.tag, header.length) {
        return Err(StreamError::BlockRejected { tag: header.tag, length: header.length });
    }

    let start = buffer.len();
    let body_start = start + BLOCK_HEADER_LEN;
    buffer.set_length(start + header.block_len());
    buffer.as_mut_bytes()[start..body_start].copy_from_slice(&header_bytes);

    if let Err(e) = reader.read_exact(&mut buffer.as_mut_bytes()[body_start..]).await {
        buffer.set_length(start);
        return Err(StreamError::io("read block body", e));
    }

    buffer.set_offset(body_start);
    Ok(header)
}

/// Write the raw bytes of `buffer` as-is. Headers must already be encoded.
pub async fn write_block<W>(writer: &mut W, buffer: &ByteBuffer) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(buffer.as_bytes()).await.map_err(|e| StreamError::io("write block", e))?;
    writer.flush().await.map_err(|e| StreamError::io("flush block", e))
}

/// Send `buffer` on a connected datagram socket.
pub async fn send_datagram(socket: &UdpSocket, buffer: &ByteBuffer) -> Result<usize> {
    socket.send(buffer.as_bytes()).await.map_err(|e| StreamError::io("send datagram", e))
}

/// Send `buffer` to an explicit destination.
pub async fn send_datagram_to(
    socket: &UdpSocket,
    buffer: &ByteBuffer,
    destination: SocketAddr,
) -> Result<usize> {
    socket
        .send_to(buffer.as_bytes(), destination)
        .await
        .map_err(|e| StreamError::io("send datagram", e))
}

/// Iterator over the whole blocks packed into one datagram.
///
/// Stops at the first block whose declared length runs past the end of the
/// datagram.
#[derive(Debug, Clone)]
pub struct DatagramBlocks<'a> {
    bytes: &'a [u8],
}

impl<'a> DatagramBlocks<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> Iterator for DatagramBlocks<'a> {
    type Item = (BlockHeader, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let header = BlockHeader::parse(self.bytes)?;
        let body = self.bytes.get(BLOCK_HEADER_LEN..header.block_len())?;
        self.bytes = &self.bytes[header.block_len()..];
        Some((header, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blocks() -> ByteBuffer {
        let mut buffer = ByteBuffer::new();
        append_block(&mut buffer, 0x10, &[1u8, 2, 3][..]);
        append_block(&mut buffer, 0x20, &42u64);
        buffer
    }

    #[test]
    fn append_block_fills_in_length() {
        let buffer = two_blocks();
        let header = BlockHeader::parse(buffer.as_bytes()).unwrap();
        assert_eq!(header, BlockHeader { tag: 0x10, length: 7 });
        assert_eq!(buffer.offset(), buffer.len());
        assert_eq!(buffer.len(), 2 * BLOCK_HEADER_LEN + 7 + 8);
    }

    #[tokio::test]
    async fn read_block_appends_header_and_body() {
        let source = two_blocks();
        let mut reader = source.as_bytes();

        let mut buffer = ByteBuffer::new();
        let first = read_block(&mut reader, &mut buffer, |_, _| true).await.unwrap();
        assert_eq!(first.tag, 0x10);
        assert_eq!(buffer.offset(), BLOCK_HEADER_LEN);
        assert_eq!(buffer.read::<Vec<u8>>(), Some(vec![1, 2, 3]));

        buffer.clear();
        let second = read_block(&mut reader, &mut buffer, |_, _| true).await.unwrap();
        assert_eq!(second, BlockHeader { tag: 0x20, length: 8 });
        assert_eq!(buffer.read::<u64>(), Some(42));
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn rejected_block_leaves_body_unread() {
        let source = two_blocks();
        let mut reader = source.as_bytes();
        let mut buffer = ByteBuffer::new();

        let result = read_block(&mut reader, &mut buffer, |tag, length| {
            assert_eq!((tag, length), (0x10, 7));
            false
        })
        .await;
        assert!(matches!(result, Err(StreamError::BlockRejected { tag: 0x10, length: 7 })));
        assert!(buffer.is_empty());
        assert_eq!(reader.len(), source.len() - BLOCK_HEADER_LEN);
    }

    #[tokio::test]
    async fn short_body_fails_without_partial_block() {
        let source = two_blocks();
        let mut reader = &source.as_bytes()[..BLOCK_HEADER_LEN + 3];
        let mut buffer = ByteBuffer::new();

        let error = read_block(&mut reader, &mut buffer, |_, _| true).await.unwrap_err();
        assert!(error.is_disconnect());
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn write_block_sends_raw_bytes() {
        let source = two_blocks();
        let mut sink = Vec::new();
        write_block(&mut sink, &source).await.unwrap();
        assert_eq!(sink, source.as_bytes());
    }

    #[test]
    fn datagram_blocks_stop_at_truncation() {
        let source = two_blocks();
        let bytes = &source.as_bytes()[..source.len() - 1];
        let blocks: Vec<_> = DatagramBlocks::new(bytes).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].0.tag, 0x10);
        assert_eq!(blocks[0].1.len(), 7);
    }

    #[tokio::test]
    async fn datagram_sends_reach_the_peer() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let destination = receiver.local_addr().unwrap();
        let source = two_blocks();

        let sent = send_datagram_to(&sender, &source, destination).await.unwrap();
        assert_eq!(sent, source.len());

        sender.connect(destination).await.unwrap();
        send_datagram(&sender, &source).await.unwrap();

        let mut bytes = vec![0u8; 1024];
        for _ in 0..2 {
            let received = receiver.recv(&mut bytes).await.unwrap();
            assert_eq!(&bytes[..received], source.as_bytes());
        }
    }
}

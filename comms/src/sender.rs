use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{FrameLen, Serialize};

/// The writing end of a framed channel.
pub struct FrameSender<W: AsyncWrite + Unpin> {
    tx: W,
    /// Scratch space for the serialized prefix of a frame.
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` as a single frame.
    ///
    /// A borrowed tail handed back by the serializer, such as a block of rows, goes straight
    /// from the caller's memory to the writer.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        self.buf.clear();
        let tail = msg.serialize(&mut self.buf);
        let len = self.buf.len() + tail.map_or(0, <[u8]>::len);

        self.tx.write_u64(len as FrameLen).await?;
        self.tx.write_all(&self.buf).await?;
        if let Some(tail) = tail {
            self.tx.write_all(tail).await?;
        }

        self.tx.flush().await
    }
}

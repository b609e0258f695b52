use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, FrameLen, MAX_FRAME_LEN, Word};

/// The reading end of a framed channel.
pub struct FrameReceiver<R: AsyncRead + Unpin> {
    rx: R,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            max_len: MAX_FRAME_LEN,
        }
    }

    /// Sets the largest frame this receiver accepts.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Waits for the next frame and deserializes it.
    ///
    /// The frame is read into `buf`, which is resized as needed and can be reused between
    /// calls. The returned `T` borrows from it.
    ///
    /// # Errors
    /// `InvalidData` if the announced length is over the limit or `T` rejects the frame,
    /// `UnexpectedEof` if the stream ends mid frame.
    pub async fn recv_into<'buf, T, B>(&mut self, buf: &'buf mut Vec<B>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
        B: Word,
    {
        let len: FrameLen = self.rx.read_u64().await?;
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= self.max_len)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame of {len} bytes is over the {} bytes limit", self.max_len),
                )
            })?;

        buf.clear();
        buf.resize(len.div_ceil(size_of::<B>()), B::zeroed());

        let bytes = &mut bytemuck::cast_slice_mut::<B, u8>(buf)[..len];
        self.rx.read_exact(bytes).await?;

        T::deserialize(bytes)
    }
}

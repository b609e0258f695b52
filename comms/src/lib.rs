mod deserialize;
pub mod msg;
mod receiver;
mod sender;
mod serialize;
pub mod specs;
mod word;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use receiver::FrameReceiver;
pub use sender::FrameSender;
pub use serialize::Serialize;
pub use word::Word;

/// Every frame starts with its length as a big endian `u64`.
type FrameLen = u64;

/// Largest frame a receiver accepts unless told otherwise, a full training set fits.
pub const MAX_FRAME_LEN: usize = 1 << 30;

/// Wraps a reader and a writer into the two ends of a framed channel.
///
/// Both halves usually come from the same stream, e.g. `TcpStream::into_split` or
/// `tokio::io::split` over a duplex pipe.
pub fn channel<R, W>(rx: R, tx: W) -> (FrameReceiver<R>, FrameSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FrameReceiver::new(rx), FrameSender::new(tx))
}

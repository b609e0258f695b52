use std::io;

/// Reads a value back from a received frame, borrowing from `buf` where possible.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}

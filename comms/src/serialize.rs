/// Writes a value into an outgoing frame.
///
/// Implementors append their fixed-size prefix to `buf` and may hand back a borrowed
/// tail that the sender writes right after the buffer without copying it.
pub trait Serialize<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}

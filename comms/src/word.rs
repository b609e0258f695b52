/// Element types of a receive buffer.
///
/// A frame is read into a `Vec` of words so that every numeric payload starts 4 byte aligned
/// and can be viewed as `&[f32]` or `&[u32]` without copying it out.
pub trait Word: bytemuck::Pod {}

impl Word for u32 {}
impl Word for i32 {}
impl Word for f32 {}
impl Word for u64 {}
impl Word for f64 {}

/// Collections for the engine's thread hand-offs
///
/// - ring_buffer: bounded MPSC ring with reusable pre-allocated slots

pub mod ringbuffer;

pub use ringbuffer::{ring_buffer, Consumer, Publisher};

pub mod buffer;
pub mod manager;
pub mod pool;

pub use buffer::{ChannelLayout, PixelBuffer};
pub use manager::{FrameBufferManager, FrameHandle, FrameLease, FrameReadyCallback, FrameUpdate};
pub use pool::BufferPool;

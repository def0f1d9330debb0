// YUV 4:2:0 to RGBA conversion with up-front plane validation.

pub mod types;
pub mod yuv;

pub use types::{ColorRange, PlaneDescriptor, PlaneOrder, YuvFrame};
pub use yuv::{BufferReuse, YuvConverter};

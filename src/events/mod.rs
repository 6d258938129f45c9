pub mod feed;
pub mod protocol;

pub use feed::event_stream;
pub use protocol::{parse_frame, DeviceEvent, Frame, FrameDecoder};

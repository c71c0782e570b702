pub mod reader;
pub mod writer;

pub use reader::{CaptureContainer, FrameEvent, StreamDescriptor};
pub use writer::ContainerWriter;

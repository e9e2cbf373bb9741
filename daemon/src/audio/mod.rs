pub mod capture;
pub mod device;

pub use capture::{AudioError, AudioInput, CaptureEnd, EndpointCapturer, FrameSource, Utterance};
pub use device::CpalInput;

pub mod capture;
pub mod file;
pub mod platform;

pub use capture::{AudioCapture, AudioFormat, BufferedCapture};
pub use file::WavFileCapture;
pub use platform::{AudioPlatform, HostPlatform, InputDevice};

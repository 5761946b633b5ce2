use async_trait::async_trait;

/// An input device as reported by the platform.
#[derive(Debug, Clone)]
pub struct InputDevice {
    pub id: String,
    pub name: String,
}

/// Platform audio capabilities injected into the recording core.
///
/// Concrete implementations talk to CoreAudio, WASAPI, etc.; the core only
/// ever sees this trait.
#[async_trait]
pub trait AudioPlatform: Send + Sync {
    /// Input devices currently available, default device first.
    fn list_input_devices(&self) -> Vec<InputDevice>;

    /// Ask for microphone access. Suspends until the user responds (or the
    /// platform answers from a previous decision).
    async fn request_microphone_permission(&self) -> bool;
}

/// Host environment with no permission prompt of its own.
pub struct HostPlatform;

#[async_trait]
impl AudioPlatform for HostPlatform {
    fn list_input_devices(&self) -> Vec<InputDevice> {
        vec![InputDevice {
            id: "default".to_string(),
            name: "Default Input".to_string(),
        }]
    }

    async fn request_microphone_permission(&self) -> bool {
        true
    }
}

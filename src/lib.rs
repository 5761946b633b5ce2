pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod transcript;

pub use analysis::{AnalysisClient, OpenAiAnalysis};
pub use audio::{
    AudioCapture, AudioFormat, AudioPlatform, BufferedCapture, HostPlatform, InputDevice,
    WavFileCapture,
};
pub use config::Config;
pub use error::{RecordingError, SessionError};
pub use orchestrator::{
    OrchestratorConfig, RunState, TranscriptSnapshot, TranscriptionOrchestrator,
};
pub use provider::{
    select_chain, AssemblyAiSession, DeepgramSession, NetworkSessionFactory, ProviderConfig,
    ProviderKind, ProviderSession, ProviderSettings, SessionFactory, SessionState,
    TranscriptEvent, WhisperSession,
};
pub use scheduler::SummarySchedule;
pub use session::{JsonSessionStore, SessionRecord, SessionSink};
pub use transcript::{is_phantom_text, TranscriptState};

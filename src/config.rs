use anyhow::Result;
use serde::Deserialize;

use crate::provider::{selector, ProviderSettings};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub providers: ProvidersConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub deepgram_key: Option<String>,
    #[serde(default)]
    pub assemblyai_key: Option<String>,
    #[serde(default)]
    pub openai_key: Option<String>,
    /// "auto" or one of "deepgram", "assemblyai", "whisper"
    #[serde(default = "default_preference")]
    pub preference: String,
    /// "auto", a two-letter code, or a full locale tag (e.g. "ru-RU")
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub model: String,
    /// Language the insight JSON is written in, regardless of what was spoken
    #[serde(default = "default_reply_language")]
    pub reply_language: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub sessions_path: String,
}

fn default_preference() -> String {
    "auto".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_reply_language() -> String {
    "English".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("NOTA").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Provider snapshot for one recording session.
    ///
    /// Taken once at session start; configuration changes made while a
    /// recording is active only apply to the next session.
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            deepgram_key: self.providers.deepgram_key.clone(),
            assemblyai_key: self.providers.assemblyai_key.clone(),
            openai_key: self.providers.openai_key.clone(),
            preference: self.providers.preference.clone(),
            language: self.providers.language.clone(),
            system_language: selector::system_language(),
        }
    }
}

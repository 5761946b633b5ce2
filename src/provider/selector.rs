//! Fallback-chain policy
//!
//! One table-driven policy decides which providers are tried and in what
//! order: an explicit preference goes first when its key is configured and
//! its language table admits the target language, then the fixed priority
//! Deepgram → AssemblyAI → Whisper. A provider whose language table excludes
//! the target is skipped entirely, preference or not.

use super::{ProviderConfig, ProviderKind, ProviderSettings};

/// Languages AssemblyAI's streaming model is allowed to take; outside this
/// set the provider is skipped for the session.
const ASSEMBLYAI_LANGUAGES: &[&str] = &["en", "es", "fr", "de", "it", "pt"];

/// Fixed fallback priority after the explicit preference.
const PRIORITY: &[ProviderKind] = &[
    ProviderKind::Deepgram,
    ProviderKind::AssemblyAi,
    ProviderKind::Whisper,
];

/// Build the ordered fallback chain for one recording session.
///
/// Returns an empty chain when no usable provider is configured; the caller
/// must then fail fast instead of opening any connection.
pub fn select_chain(settings: &ProviderSettings) -> Vec<ProviderConfig> {
    let language = resolve_language(&settings.language, &settings.system_language);
    let primary = primary_subtag(&language).to_string();
    // Streaming providers always run their multilingual models; the language
    // parameter only matters to the upload provider, and only when the user
    // picked one explicitly.
    let explicit_language = (settings.language != "auto").then(|| language.clone());

    let mut chain: Vec<ProviderConfig> = Vec::new();

    let admit = |kind: ProviderKind, chain: &mut Vec<ProviderConfig>| {
        if chain.iter().any(|entry| entry.kind == kind) {
            return;
        }
        let Some(api_key) = configured_key(settings, kind) else {
            return;
        };
        if !supports_language(kind, &primary) {
            return;
        }
        chain.push(ProviderConfig {
            kind,
            api_key: api_key.to_string(),
            language: explicit_language.clone(),
        });
    };

    if let Some(preferred) = ProviderKind::parse(&settings.preference) {
        admit(preferred, &mut chain);
    }
    for &kind in PRIORITY {
        admit(kind, &mut chain);
    }

    chain
}

fn configured_key(settings: &ProviderSettings, kind: ProviderKind) -> Option<&str> {
    let key = match kind {
        ProviderKind::Deepgram => &settings.deepgram_key,
        ProviderKind::AssemblyAi => &settings.assemblyai_key,
        ProviderKind::Whisper => &settings.openai_key,
    };
    key.as_deref().filter(|key| !key.trim().is_empty())
}

fn supports_language(kind: ProviderKind, primary: &str) -> bool {
    match kind {
        ProviderKind::AssemblyAi => ASSEMBLYAI_LANGUAGES.contains(&primary),
        // Deepgram runs language=multi; Whisper auto-detects per chunk.
        ProviderKind::Deepgram | ProviderKind::Whisper => true,
    }
}

/// Normalize a language selection to a locale tag.
///
/// "auto" resolves through the system language; bare two-letter codes map to
/// the region forms the providers expect; full tags pass through unchanged.
pub fn resolve_language(hint: &str, system_language: &str) -> String {
    let code = if hint == "auto" { system_language } else { hint };
    if code.contains('-') {
        return code.to_string();
    }
    locale_tag(code).to_string()
}

/// The primary subtag of a locale tag ("ru-RU" → "ru").
pub fn primary_subtag(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

fn locale_tag(code: &str) -> &'static str {
    match code {
        "en" => "en-US",
        "ru" => "ru-RU",
        "es" => "es-ES",
        "fr" => "fr-FR",
        "de" => "de-DE",
        "zh" => "zh-CN",
        "ja" => "ja-JP",
        "ko" => "ko-KR",
        "pt" => "pt-BR",
        "it" => "it-IT",
        "nl" => "nl-NL",
        "sv" => "sv-SE",
        "da" => "da-DK",
        "no" => "nb-NO",
        "fi" => "fi-FI",
        "pl" => "pl-PL",
        "tr" => "tr-TR",
        "ar" => "ar-SA",
        "he" => "he-IL",
        "hi" => "hi-IN",
        "th" => "th-TH",
        "vi" => "vi-VN",
        _ => "en-US",
    }
}

/// Two-letter system language from the POSIX locale environment.
pub fn system_language() -> String {
    for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
        if let Ok(value) = std::env::var(var) {
            let code = value.split(['_', '.', '@']).next().unwrap_or("");
            if !code.is_empty() && code != "C" && code != "POSIX" {
                return code.to_lowercase();
            }
        }
    }
    "en".to_string()
}

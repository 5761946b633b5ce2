// Integration tests for the fallback-chain policy
//
// The chain decides which transcription backends are tried and in what
// order, from configured keys, the explicit preference, and the target
// language.

use nota::{select_chain, ProviderKind, ProviderSettings};

fn kinds(settings: &ProviderSettings) -> Vec<ProviderKind> {
    select_chain(settings)
        .iter()
        .map(|entry| entry.kind)
        .collect()
}

fn all_keys() -> ProviderSettings {
    ProviderSettings {
        deepgram_key: Some("dg-key".to_string()),
        assemblyai_key: Some("aai-key".to_string()),
        openai_key: Some("sk-test".to_string()),
        ..ProviderSettings::default()
    }
}

#[test]
fn zero_keys_yield_an_empty_chain() {
    assert!(select_chain(&ProviderSettings::default()).is_empty());
}

#[test]
fn blank_keys_count_as_missing() {
    let settings = ProviderSettings {
        deepgram_key: Some("   ".to_string()),
        ..ProviderSettings::default()
    };
    assert!(select_chain(&settings).is_empty());
}

#[test]
fn fixed_priority_with_all_keys() {
    assert_eq!(
        kinds(&all_keys()),
        vec![
            ProviderKind::Deepgram,
            ProviderKind::AssemblyAi,
            ProviderKind::Whisper
        ]
    );
}

#[test]
fn explicit_preference_goes_first() {
    let settings = ProviderSettings {
        preference: "assemblyai".to_string(),
        ..all_keys()
    };
    assert_eq!(
        kinds(&settings),
        vec![
            ProviderKind::AssemblyAi,
            ProviderKind::Deepgram,
            ProviderKind::Whisper
        ]
    );
}

#[test]
fn preference_without_a_key_falls_back_to_priority() {
    let settings = ProviderSettings {
        deepgram_key: Some("dg-key".to_string()),
        openai_key: Some("sk-test".to_string()),
        preference: "assemblyai".to_string(),
        ..ProviderSettings::default()
    };
    assert_eq!(
        kinds(&settings),
        vec![ProviderKind::Deepgram, ProviderKind::Whisper]
    );
}

#[test]
fn russian_skips_the_restricted_streaming_provider() {
    // AssemblyAI streaming is limited to a small Western-language set; for
    // Russian it must not appear ahead of the universal upload fallback.
    let settings = ProviderSettings {
        language: "ru".to_string(),
        ..all_keys()
    };
    assert_eq!(
        kinds(&settings),
        vec![ProviderKind::Deepgram, ProviderKind::Whisper]
    );
}

#[test]
fn language_restriction_beats_explicit_preference() {
    let settings = ProviderSettings {
        language: "ru-RU".to_string(),
        preference: "assemblyai".to_string(),
        ..all_keys()
    };
    assert!(!kinds(&settings).contains(&ProviderKind::AssemblyAi));
}

#[test]
fn auto_language_resolves_through_the_system_locale() {
    let settings = ProviderSettings {
        assemblyai_key: Some("aai-key".to_string()),
        openai_key: Some("sk-test".to_string()),
        system_language: "ru".to_string(),
        ..ProviderSettings::default()
    };
    // System locale is Russian, so the restricted provider drops out even
    // though the user never picked a language.
    assert_eq!(kinds(&settings), vec![ProviderKind::Whisper]);
}

#[test]
fn upload_fallback_is_used_when_no_streaming_key_exists() {
    let settings = ProviderSettings {
        openai_key: Some("sk-test".to_string()),
        ..ProviderSettings::default()
    };
    assert_eq!(kinds(&settings), vec![ProviderKind::Whisper]);
}

#[test]
fn restricted_key_alone_for_an_excluded_language_yields_nothing() {
    let settings = ProviderSettings {
        assemblyai_key: Some("aai-key".to_string()),
        language: "ru".to_string(),
        ..ProviderSettings::default()
    };
    assert!(select_chain(&settings).is_empty());
}

#[test]
fn explicit_language_is_carried_on_chain_entries() {
    let settings = ProviderSettings {
        language: "ru".to_string(),
        ..all_keys()
    };
    let chain = select_chain(&settings);
    assert!(chain
        .iter()
        .all(|entry| entry.language.as_deref() == Some("ru-RU")));
}

#[test]
fn auto_language_leaves_entries_unpinned() {
    let chain = select_chain(&all_keys());
    assert!(chain.iter().all(|entry| entry.language.is_none()));
}

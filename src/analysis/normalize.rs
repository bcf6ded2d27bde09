use serde_json::Value;

use super::SongAnalysis;
use crate::songs::{Flags, UNKNOWN_LANGUAGE};

/// Maximum embedding input length (characters, not tokens)
const MAX_EMBEDDING_TEXT_LENGTH: usize = 2048;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// First present, non-null field among `keys`.
fn field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
}

fn text_field(payload: &Value, keys: &[&str]) -> Option<String> {
    match field(payload, keys)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Flatten whatever shape the upstream used into an ordered list of strings.
///
/// Arrays keep their order, objects contribute their values in document order,
/// a bare scalar becomes a one-element list and absence an empty one.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let mut out = vec![];
    if let Some(value) = value {
        collect_strings(value, &mut out);
    }
    out
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "explicit")
        }
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// Normalize a raw lyrics analysis payload into a fixed schema.
pub fn normalize_analysis(payload: &Value) -> SongAnalysis {
    SongAnalysis {
        language: text_field(payload, &["language"])
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
        language_code: text_field(payload, &["language-iso", "language_iso"])
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
        summary: text_field(payload, &["summary"]).unwrap_or_default(),
        explicit: flag(field(payload, &["explicit"])),
        keywords: string_list(field(payload, &["keywords"])),
        moods: string_list(field(payload, &["ddex moods", "ddex_moods", "moods"])),
        themes: string_list(field(payload, &["ddex themes", "ddex_themes", "themes"])),
        flags: match field(payload, &["flags"]) {
            Some(Value::Object(flags)) => flags.clone(),
            _ => Flags::new(),
        },
    }
}

/// Text that represents a song for embedding: summary, keywords, moods, themes.
///
/// Returns `None` when there is nothing to embed.
pub fn embedding_text(analysis: &SongAnalysis) -> Option<String> {
    let parts = std::iter::once(analysis.summary.as_str())
        .chain(analysis.keywords.iter().map(String::as_str))
        .chain(analysis.moods.iter().map(String::as_str))
        .chain(analysis.themes.iter().map(String::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return None;
    }

    Some(truncate_content(&parts.join(" ")))
}

/// Truncate content to MAX_EMBEDDING_TEXT_LENGTH characters, adding ellipsis if truncated.
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_EMBEDDING_TEXT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_EMBEDDING_TEXT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_payload() {
        let payload = json!({
            "language": "English",
            "language-iso": "en",
            "summary": "A song about leaving home.",
            "explicit": false,
            "keywords": {"1": "home", "2": "road", "10": "goodbye"},
            "ddex moods": ["Nostalgic", "Hopeful"],
            "ddex themes": {"a": "Journey"},
            "flags": {}
        });

        let analysis = normalize_analysis(&payload);
        assert_eq!(analysis.language, "English");
        assert_eq!(analysis.language_code, "en");
        assert_eq!(analysis.summary, "A song about leaving home.");
        assert!(!analysis.explicit);
        // object values keep document order, not key order
        assert_eq!(analysis.keywords, vec!["home", "road", "goodbye"]);
        assert_eq!(analysis.moods, vec!["Nostalgic", "Hopeful"]);
        assert_eq!(analysis.themes, vec!["Journey"]);
        assert!(analysis.flags.is_empty());
    }

    #[test]
    fn test_flags_object_is_kept() {
        let payload = json!({"flags": {"violence": true, "profanity": "mild"}});
        let flags = normalize_analysis(&payload).flags;
        assert_eq!(flags.get("violence"), Some(&json!(true)));
        assert_eq!(flags.get("profanity"), Some(&json!("mild")));

        assert!(normalize_analysis(&json!({"flags": ["violence"]})).flags.is_empty());
        assert!(normalize_analysis(&json!({"flags": null})).flags.is_empty());
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let analysis = normalize_analysis(&json!({}));
        assert_eq!(analysis.language, "unknown");
        assert_eq!(analysis.language_code, "unknown");
        assert_eq!(analysis.summary, "");
        assert!(!analysis.explicit);
        assert!(analysis.keywords.is_empty());
        assert!(analysis.moods.is_empty());
        assert!(analysis.themes.is_empty());
    }

    #[test]
    fn test_scalar_and_empty_object_become_sequences() {
        let payload = json!({
            "keywords": "dance",
            "ddex moods": {},
            "ddex themes": null,
        });

        let analysis = normalize_analysis(&payload);
        assert_eq!(analysis.keywords, vec!["dance"]);
        assert!(analysis.moods.is_empty());
        assert!(analysis.themes.is_empty());
    }

    #[test]
    fn test_explicit_flag_shapes() {
        assert!(normalize_analysis(&json!({"explicit": true})).explicit);
        assert!(normalize_analysis(&json!({"explicit": "Yes"})).explicit);
        assert!(normalize_analysis(&json!({"explicit": 1})).explicit);
        assert!(!normalize_analysis(&json!({"explicit": "no"})).explicit);
        assert!(!normalize_analysis(&json!({"explicit": 0})).explicit);
    }

    #[test]
    fn test_blank_language_falls_back_to_unknown() {
        let analysis = normalize_analysis(&json!({"language": "  ", "language_iso": "fr"}));
        assert_eq!(analysis.language, "unknown");
        assert_eq!(analysis.language_code, "fr");
    }

    #[test]
    fn test_embedding_text_joins_fields() {
        let analysis = SongAnalysis {
            summary: "Rainy night".into(),
            keywords: vec!["rain".into()],
            moods: vec!["Sad".into()],
            themes: vec!["Loss".into(), " ".into()],
            ..Default::default()
        };

        assert_eq!(
            embedding_text(&analysis),
            Some("Rainy night rain Sad Loss".to_string())
        );
    }

    #[test]
    fn test_embedding_text_empty() {
        assert_eq!(embedding_text(&SongAnalysis::default()), None);
    }

    #[test]
    fn test_embedding_text_truncation() {
        let analysis = SongAnalysis {
            summary: "é".repeat(3000),
            ..Default::default()
        };

        let text = embedding_text(&analysis).unwrap();
        assert_eq!(text.chars().count(), MAX_EMBEDDING_TEXT_LENGTH);
        assert!(text.ends_with(TRUNCATION_SUFFIX));
    }
}

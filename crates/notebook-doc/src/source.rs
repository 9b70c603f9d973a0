//! Conversion between a cell's editable text and its persisted form.
//!
//! On disk a cell's source is either a single string or an array of line
//! fragments where every fragment except possibly the last keeps its own
//! trailing `\n`. Everything past the load boundary works with one logical
//! `String`; these helpers are the only place the two forms meet.

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Source text as it appears in a notebook file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersistedSource {
    /// A single string holding the whole text.
    Text(String),
    /// Line fragments, each carrying its own terminator except the last.
    Lines(Vec<String>),
}

impl Default for PersistedSource {
    fn default() -> Self {
        PersistedSource::Lines(Vec::new())
    }
}

/// Join a persisted source into its logical text.
///
/// A missing or `null` source decodes to the empty string.
pub fn decode(source: Option<&PersistedSource>) -> String {
    match source {
        Some(PersistedSource::Text(text)) => text.clone(),
        Some(PersistedSource::Lines(lines)) => lines.concat(),
        None => String::new(),
    }
}

/// Split text into the standard line-array form.
pub fn encode(text: &str) -> PersistedSource {
    PersistedSource::Lines(split_lines(text))
}

/// Split text after every `\n`, keeping the terminator on each fragment.
///
/// The empty string yields no fragments, and a trailing newline does not
/// produce an empty trailing fragment, so `split_lines(t).concat() == t`.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

/// Deserialize a "multiline string" field (string, array of strings, or
/// `null`) into one `String`.
///
/// Used with `#[serde(default, deserialize_with = "deserialize_multiline")]`
pub fn deserialize_multiline<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct MultilineVisitor;

    impl<'de> de::Visitor<'de> for MultilineVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, an array of strings, or null")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<String, A::Error> {
            let mut text = String::new();
            while let Some(fragment) = seq.next_element::<String>()? {
                text.push_str(&fragment);
            }
            Ok(text)
        }
    }

    deserializer.deserialize_any(MultilineVisitor)
}

/// Serialize text as a line array.
///
/// Used with `#[serde(serialize_with = "serialize_lines")]`
pub fn serialize_lines<S>(text: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    split_lines(text).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_joins_lines() {
        let source = PersistedSource::Lines(vec!["a = 1\n".into(), "b = 2".into()]);
        assert_eq!(decode(Some(&source)), "a = 1\nb = 2");
    }

    #[test]
    fn test_decode_accepts_bare_string() {
        let source = PersistedSource::Text("print('hi')\n".into());
        assert_eq!(decode(Some(&source)), "print('hi')\n");
    }

    #[test]
    fn test_decode_missing_source_is_empty() {
        assert_eq!(decode(None), "");
    }

    #[test]
    fn test_encode_keeps_terminators() {
        assert_eq!(
            encode("line1\nline2"),
            PersistedSource::Lines(vec!["line1\n".into(), "line2".into()])
        );
        assert_eq!(
            encode("line1\nline2\n"),
            PersistedSource::Lines(vec!["line1\n".into(), "line2\n".into()])
        );
    }

    #[test]
    fn test_encode_empty_text() {
        assert_eq!(encode(""), PersistedSource::Lines(vec![]));
    }

    #[test]
    fn test_roundtrip() {
        for original in [
            "",
            "single",
            "single\n",
            "line1\nline2",
            "line1\nline2\n",
            "\n\n",
            "crlf\r\nline\r\n",
            "  indented\n\ttabbed",
        ] {
            let encoded = encode(original);
            assert_eq!(decode(Some(&encoded)), original, "roundtrip failed for {original:?}");
        }
    }

    #[test]
    fn test_reencoding_normalizes_irregular_fragments() {
        // Another tool may split mid-line; the logical text is what counts.
        let irregular = PersistedSource::Lines(vec!["pri".into(), "nt(1)\nx".into()]);
        let text = decode(Some(&irregular));
        assert_eq!(
            encode(&text),
            PersistedSource::Lines(vec!["print(1)\n".into(), "x".into()])
        );
    }

    #[test]
    fn test_persisted_source_deserializes_both_forms() {
        let text: PersistedSource = serde_json::from_str(r#""x = 1""#).unwrap();
        assert_eq!(text, PersistedSource::Text("x = 1".into()));

        let lines: PersistedSource = serde_json::from_str(r#"["x = 1\n", "y"]"#).unwrap();
        assert_eq!(lines, PersistedSource::Lines(vec!["x = 1\n".into(), "y".into()]));
    }

    #[derive(Serialize, Deserialize)]
    struct TextHolder {
        #[serde(
            default,
            serialize_with = "serialize_lines",
            deserialize_with = "deserialize_multiline"
        )]
        text: String,
    }

    #[test]
    fn test_multiline_field_forms() {
        let from_array: TextHolder = serde_json::from_str(r#"{"text": ["a\n", "b"]}"#).unwrap();
        assert_eq!(from_array.text, "a\nb");

        let from_string: TextHolder = serde_json::from_str(r#"{"text": "a\nb"}"#).unwrap();
        assert_eq!(from_string.text, "a\nb");

        let from_null: TextHolder = serde_json::from_str(r#"{"text": null}"#).unwrap();
        assert_eq!(from_null.text, "");

        let missing: TextHolder = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.text, "");
    }

    #[test]
    fn test_multiline_field_serializes_as_lines() {
        let holder = TextHolder {
            text: "a\nb".into(),
        };
        let json = serde_json::to_value(&holder).unwrap();
        assert_eq!(json["text"], serde_json::json!(["a\n", "b"]));
    }
}

//! Output records attached to code cells.
//!
//! Each record is one of the four output types of the notebook format,
//! modelled as a closed enum tagged by `output_type` so every variant
//! carries exactly the fields its type allows.

use std::borrow::Cow;
use std::collections::BTreeMap;

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::source::{deserialize_multiline, serialize_lines};

/// MIME type -> payload.
///
/// Textual payloads are held as one string. Image payloads are base64 text.
pub type MimeBundle = BTreeMap<String, Value>;

/// Image types rendered from base64 payloads, in preference order.
const IMAGE_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// One structured result of running a code cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type")]
pub enum OutputRecord {
    #[serde(rename = "stream")]
    Stream {
        name: String,
        #[serde(
            default,
            serialize_with = "serialize_lines",
            deserialize_with = "deserialize_multiline"
        )]
        text: String,
    },

    #[serde(rename = "execute_result")]
    Result {
        #[serde(default, with = "bundle")]
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
        execution_count: Option<i64>,
    },

    #[serde(rename = "display_data")]
    DisplayData {
        #[serde(default, with = "bundle")]
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(rename = "ename")]
        name: String,
        #[serde(rename = "evalue")]
        message: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

/// What a host should display for an output record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputView<'a> {
    /// Trusted HTML, displayed as-is.
    Html(&'a str),
    /// Decoded image bytes.
    Image { mime: &'a str, bytes: Bytes },
    /// Preformatted text.
    Text(Cow<'a, str>),
}

impl OutputRecord {
    pub fn stdout(text: impl Into<String>) -> Self {
        OutputRecord::Stream {
            name: "stdout".to_string(),
            text: text.into(),
        }
    }

    pub fn error(
        name: impl Into<String>,
        message: impl Into<String>,
        traceback: Vec<String>,
    ) -> Self {
        OutputRecord::Error {
            name: name.into(),
            message: message.into(),
            traceback,
        }
    }

    pub fn output_type(&self) -> &'static str {
        match self {
            OutputRecord::Stream { .. } => "stream",
            OutputRecord::Result { .. } => "execute_result",
            OutputRecord::DisplayData { .. } => "display_data",
            OutputRecord::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OutputRecord::Error { .. })
    }

    /// Pick the representation to display.
    ///
    /// MIME bundles prefer HTML, then an image, then plain text. Returns
    /// `None` when a bundle holds none of those.
    pub fn preferred_view(&self) -> Option<OutputView<'_>> {
        match self {
            OutputRecord::Stream { text, .. } => Some(OutputView::Text(Cow::Borrowed(text))),
            OutputRecord::Result { data, .. } | OutputRecord::DisplayData { data, .. } => {
                bundle_view(data)
            }
            OutputRecord::Error {
                message, traceback, ..
            } => {
                if traceback.is_empty() {
                    Some(OutputView::Text(Cow::Borrowed(message)))
                } else {
                    Some(OutputView::Text(Cow::Owned(traceback.join("\n"))))
                }
            }
        }
    }
}

fn bundle_view(data: &MimeBundle) -> Option<OutputView<'_>> {
    if let Some(html) = data.get("text/html").and_then(Value::as_str) {
        return Some(OutputView::Html(html));
    }

    for mime in IMAGE_MIME_TYPES {
        if let Some((mime, encoded)) = data
            .get_key_value(*mime)
            .and_then(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
        {
            match decode_image(encoded) {
                Ok(bytes) => return Some(OutputView::Image { mime, bytes }),
                Err(e) => log::warn!("[output] Skipping undecodable {} payload: {}", mime, e),
            }
        }
    }

    data.get("text/plain")
        .and_then(Value::as_str)
        .map(|text| OutputView::Text(Cow::Borrowed(text)))
}

/// Decode a base64 image payload. Writers commonly wrap the text, so
/// whitespace is ignored.
fn decode_image(encoded: &str) -> Result<Bytes, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STANDARD.decode(compact).map(Bytes::from)
}

fn is_json_mime(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

/// On-disk form of MIME bundles: textual payloads may be line arrays.
mod bundle {
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::{is_json_mime, MimeBundle};
    use crate::source::split_lines;

    pub fn serialize<S>(data: &MimeBundle, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(data.len()))?;
        for (mime, payload) in data {
            match payload {
                Value::String(text) if mime.starts_with("text/") || mime == "image/svg+xml" => {
                    map.serialize_entry(mime, &split_lines(text))?
                }
                other => map.serialize_entry(mime, other)?,
            }
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<MimeBundle, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = MimeBundle::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(mime, payload)| {
                let payload = if is_json_mime(&mime) {
                    payload
                } else {
                    join_fragments(payload)
                };
                (mime, payload)
            })
            .collect())
    }

    fn join_fragments(payload: Value) -> Value {
        match payload {
            Value::Array(items) if items.iter().all(Value::is_string) => {
                Value::String(items.iter().filter_map(Value::as_str).collect())
            }
            other => other,
        }
    }
}

//! Journal events and their line encoding
//!
//! Each event is one JSON object terminated by `\n`:
//!
//! ```text
//! {"type":"add_file","add_file":{"id":"…","name":"…","mime_type":"…"}}
//! ```
//!
//! The `type` field selects the payload key. Readers decode the types they know
//! and surface anything else as [`Event::Unknown`] so older binaries can replay
//! journals written by newer ones.

use crate::common::{Error, FileId, Result};
use serde::{Deserialize, Serialize};

const ADD_FILE: &str = "add_file";

/// Metadata for one uploaded file. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Client-supplied display name, not unique
    pub name: String,
    /// Client-declared content type, not checked against the bytes
    #[serde(rename = "mime_type")]
    pub content_type: String,
}

impl FileRecord {
    pub fn new(id: FileId, name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            content_type: content_type.into(),
        }
    }
}

/// A committed metadata change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AddFile(FileRecord),
    /// A well-formed event whose `type` this build does not understand
    Unknown { kind: String },
}

#[derive(Serialize)]
struct EventLineRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    add_file: Option<&'a FileRecord>,
}

#[derive(Deserialize)]
struct EventLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    add_file: Option<FileRecord>,
}

impl Event {
    pub fn kind(&self) -> &str {
        match self {
            Event::AddFile(_) => ADD_FILE,
            Event::Unknown { kind } => kind,
        }
    }

    /// Serialize to a single newline-terminated record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let line = match self {
            Event::AddFile(record) => EventLineRef {
                kind: ADD_FILE,
                add_file: Some(record),
            },
            Event::Unknown { kind } => {
                return Err(Error::Internal(format!(
                    "refusing to write event of unknown type {:?}",
                    kind
                )))
            }
        };
        let mut buf = serde_json::to_vec(&line)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Parse one record, without its trailing newline.
    pub fn decode(line: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let raw: EventLine = serde_json::from_slice(line)?;
        match raw.kind.as_str() {
            ADD_FILE => raw.add_file.map(Event::AddFile).ok_or_else(|| {
                <serde_json::Error as serde::de::Error>::custom("add_file event without payload")
            }),
            _ => Ok(Event::Unknown { kind: raw.kind }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, content_type: &str) -> FileRecord {
        FileRecord::new(FileId::parse(id).unwrap(), name, content_type)
    }

    #[test]
    fn test_encode_matches_journal_format() {
        let event = Event::AddFile(record("id", "name", "mime_type"));
        assert_eq!(
            String::from_utf8(event.encode().unwrap()).unwrap(),
            "{\"type\":\"add_file\",\"add_file\":{\"id\":\"id\",\"name\":\"name\",\"mime_type\":\"mime_type\"}}\n"
        );
    }

    #[test]
    fn test_decode_add_file() {
        let line = br#"{"type":"add_file","add_file":{"id":"a","name":"x.txt","mime_type":"text/plain"}}"#;
        assert_eq!(
            Event::decode(line).unwrap(),
            Event::AddFile(record("a", "x.txt", "text/plain"))
        );
    }

    #[test]
    fn test_decode_unknown_type_is_not_fatal() {
        let line = br#"{"type":"rename_file","rename_file":{"id":"a","name":"z"}}"#;
        assert_eq!(
            Event::decode(line).unwrap(),
            Event::Unknown {
                kind: "rename_file".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Event::decode(b"not json").is_err());
        assert!(Event::decode(br#"{"add_file":{}}"#).is_err());
        assert!(Event::decode(br#"{"type":"add_file"}"#).is_err());
        assert!(Event::decode(br#"{"type":"add_file","add_file":{"id":"a"}}"#).is_err());
        assert!(Event::decode(
            br#"{"type":"add_file","add_file":{"id":"../a","name":"n","mime_type":"m"}}"#
        )
        .is_err());
    }

    #[test]
    fn test_unknown_events_are_not_written() {
        let event = Event::Unknown {
            kind: "delete_file".into(),
        };
        assert!(event.encode().is_err());
    }
}

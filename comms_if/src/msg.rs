//! # Console message module
//!
//! Everything exchanged with the operator console is a [`Message`]: a type tag and an opaque
//! content payload. On the wire a message is a JSON object whose content is base64 encoded:
//!
//! ```json
//! {"Type": "log", "Content": "R29pbmcgaG9tZSBYWQ=="}
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A tagged message exchanged with the operator console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "Type")]
    pub msg_type: MsgType,

    #[serde(rename = "Content", with = "base64_bytes")]
    pub content: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The type of a message, which tells the receiver how to interpret the content.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Operator command token
    #[serde(rename = "cmd")]
    Cmd,

    /// Human readable status line
    #[serde(rename = "log")]
    Log,

    /// Position export text
    #[serde(rename = "pos")]
    Pos,

    /// Checkpoint graph text
    #[serde(rename = "fly_map")]
    FlyMap,

    #[serde(rename = "")]
    Undefined,
}

/// Errors converting messages to and from their wire form.
#[derive(Debug, Error)]
pub enum MsgError {
    #[error("Could not serialize the message: {0}")]
    SerializeError(serde_json::Error),

    #[error("Could not deserialize the message: {0}")]
    DeserializeError(serde_json::Error),

    #[error("Message content is not valid UTF-8")]
    NotUtf8,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Message {
    pub fn new<C: Into<Vec<u8>>>(msg_type: MsgType, content: C) -> Self {
        Self {
            msg_type,
            content: content.into(),
        }
    }

    pub fn cmd<C: Into<Vec<u8>>>(content: C) -> Self {
        Self::new(MsgType::Cmd, content)
    }

    pub fn log<C: Into<Vec<u8>>>(content: C) -> Self {
        Self::new(MsgType::Log, content)
    }

    pub fn pos<C: Into<Vec<u8>>>(content: C) -> Self {
        Self::new(MsgType::Pos, content)
    }

    pub fn fly_map<C: Into<Vec<u8>>>(content: C) -> Self {
        Self::new(MsgType::FlyMap, content)
    }

    /// Interpret the content as UTF-8 text.
    pub fn content_str(&self) -> Result<&str, MsgError> {
        std::str::from_utf8(&self.content).map_err(|_| MsgError::NotUtf8)
    }

    /// Serialize the message into its JSON wire form.
    pub fn to_json(&self) -> Result<String, MsgError> {
        serde_json::to_string(self).map_err(MsgError::SerializeError)
    }

    /// Parse a message from its JSON wire form.
    pub fn from_json(json_str: &str) -> Result<Self, MsgError> {
        serde_json::from_str(json_str).map_err(MsgError::DeserializeError)
    }
}

// ---------------------------------------------------------------------------
// SERDE HELPERS
// ---------------------------------------------------------------------------

mod base64_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::decode(s.as_bytes()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wire_format() {
        let msg = Message::log("Going home XY");

        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"Type":"log","Content":"R29pbmcgaG9tZSBYWQ=="}"#
        );

        let parsed = Message::from_json(r#"{"Type":"cmd","Content":"VW4="}"#).unwrap();
        assert_eq!(parsed, Message::cmd("Un"));
        assert_eq!(parsed.content_str().unwrap(), "Un");
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(
            serde_json::to_string(&MsgType::FlyMap).unwrap(),
            "\"fly_map\""
        );
        assert_eq!(serde_json::to_string(&MsgType::Pos).unwrap(), "\"pos\"");
        assert_eq!(
            serde_json::from_str::<MsgType>("\"\"").unwrap(),
            MsgType::Undefined
        );
    }

    #[test]
    fn test_invalid_messages() {
        assert!(matches!(
            Message::from_json(r#"{"Type":"cmd","Content":"***"}"#),
            Err(MsgError::DeserializeError(_))
        ));
        assert!(matches!(
            Message::from_json(r#"{"Type":"video","Content":""}"#),
            Err(MsgError::DeserializeError(_))
        ));
        assert!(matches!(
            Message::log(vec![0xff, 0xfe]).content_str(),
            Err(MsgError::NotUtf8)
        ));
    }
}

//! Cross-window wire format.
//!
//! The payload shape is shared with viewer pages that are not part of this
//! workspace, so field names must not change.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "changePage")]
    ChangePage {
        page: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        highlight: Option<Vec<String>>,
        #[serde(
            default,
            rename = "searchText",
            skip_serializing_if = "Option::is_none"
        )]
        search_text: Option<String>,
    },
}

impl WireMessage {
    pub fn change_page(page: u32, highlight: &[String], search_text: Option<&str>) -> Self {
        WireMessage::ChangePage {
            page,
            highlight: if highlight.is_empty() {
                None
            } else {
                Some(highlight.to_vec())
            },
            search_text: search_text
                .filter(|text| !text.is_empty())
                .map(str::to_string),
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            WireMessage::ChangePage { page, .. } => *page,
        }
    }
}

/// Scheme, host and port of the application, e.g. `http://localhost:8080`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppOrigin(String);

impl AppOrigin {
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let url = Url::parse(raw)?;
        Self::of(&url)
    }

    pub fn of(url: &Url) -> Result<Self, BridgeError> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(BridgeError::OpaqueOrigin(url.to_string()));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    origin: &'a str,
    data: &'a WireMessage,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    origin: String,
    data: serde_json::Value,
}

pub fn encode(origin: &AppOrigin, message: &WireMessage) -> Result<String, BridgeError> {
    serde_json::to_string(&OutgoingEnvelope {
        origin: origin.as_str(),
        data: message,
    })
    .map_err(BridgeError::Encode)
}

/// Decodes a raw envelope, rejecting anything not sent from `expected`.
/// The origin is checked before the payload is interpreted.
pub fn decode(expected: &AppOrigin, raw: &str) -> Result<WireMessage, BridgeError> {
    let envelope: IncomingEnvelope = serde_json::from_str(raw).map_err(BridgeError::Decode)?;
    if envelope.origin != expected.as_str() {
        return Err(BridgeError::OriginMismatch {
            expected: expected.to_string(),
            actual: envelope.origin,
        });
    }
    serde_json::from_value(envelope.data).map_err(BridgeError::Decode)
}

// ── Control-socket frames ──
//
// One JSON object per line: `{"v": <version>, "body": <frame>}`.
// Bodies decode leniently (missing fields take defaults, unknown fields
// are skipped) so peers one version apart still understand each other.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bus::Signal;
use crate::error::{RpcError, WireError};
use crate::rpc::{Reply, Request};

pub const PROTOCOL_VERSION: u32 = 1;

/// Longest accepted frame, in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientFrame {
    /// One request, one reply.
    Call { request: Request },
    /// Turn the connection into a signal stream.
    Subscribe {
        #[serde(default)]
        keepalive: bool,
    },
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply { reply: Reply },
    Error { error: RpcError },
    Subscribed,
    Signal { signal: Signal },
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    v: u32,
    body: &'a T,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default = "default_version")]
    v: u32,
    body: serde_json::Value,
}

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

/// Encode one frame as a single line (without the newline).
pub fn encode<T: Serialize>(body: &T) -> Result<String, WireError> {
    Ok(serde_json::to_string(&Envelope {
        v: PROTOCOL_VERSION,
        body,
    })?)
}

/// Decode one line.
///
/// A body that does not fit this build's types is `UnsupportedVersion`
/// when the sender announced a newer protocol, `Malformed` otherwise.
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, WireError> {
    let raw: RawEnvelope =
        serde_json::from_str(line).map_err(|e| WireError::Malformed(e.to_string()))?;
    serde_json::from_value(raw.body).map_err(|e| {
        if raw.v > PROTOCOL_VERSION {
            WireError::UnsupportedVersion {
                version: raw.v,
                supported: PROTOCOL_VERSION,
            }
        } else {
            WireError::Malformed(e.to_string())
        }
    })
}

//! Messages for a native host that previews or saves files on our behalf.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use crate::preview::PreviewObject;

/// A fire-and-forget message to the native host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Open the platform previewer.
    PreviewFile {
        filename: String,
        content_type: String,
        /// Base64 bytes.
        data: String,
    },
    /// Hand a file to the platform save dialog.
    SaveFile {
        filename: String,
        content_type: String,
        /// Base64 bytes.
        data: String,
    },
}

/// A native host. Sending never blocks and never reports failure back.
pub trait NativeBridge: Send + Sync {
    fn send(&self, message: BridgeMessage);
}

/// Writes each message as one JSON line, e.g. to the host's stdin pipe.
pub struct JsonLinesBridge<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesBridge<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> NativeBridge for JsonLinesBridge<W> {
    fn send(&self, message: BridgeMessage) {
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize bridge message");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(error = %e, "Failed to write bridge message");
        } else {
            debug!(bytes = line.len(), "Sent bridge message");
        }
    }
}

/// Ask the host to preview a ready attachment.
pub fn preview_file(bridge: &dyn NativeBridge, preview: &PreviewObject) {
    bridge.send(BridgeMessage::PreviewFile {
        filename: preview.filename.clone(),
        content_type: preview.content_type.clone(),
        data: preview.data.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines() {
        let bridge = JsonLinesBridge::new(Vec::new());
        bridge.send(BridgeMessage::SaveFile {
            filename: "a.zip".into(),
            content_type: "application/zip".into(),
            data: "UEs=".into(),
        });
        let out = String::from_utf8(bridge.into_inner()).unwrap();
        assert_eq!(
            out,
            "{\"type\":\"save_file\",\"filename\":\"a.zip\",\"content_type\":\"application/zip\",\"data\":\"UEs=\"}\n"
        );
    }
}

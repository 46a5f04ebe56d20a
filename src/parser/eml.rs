//! Attachment import from individual `.eml` files (RFC 5322 messages).

use std::path::Path;

use mail_parser::{MessageParser, MimeHeaders};

use crate::error::{AttachmentError, Result};
use crate::model::attachment::{AttachmentId, AttachmentState, ClientAttachment};
use crate::model::payload::Payload;

/// Read a `.eml` file and list its attachments.
pub fn read_eml(path: impl AsRef<Path>) -> Result<Vec<ClientAttachment>> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AttachmentError::FileNotFound(path.to_path_buf())
        } else {
            AttachmentError::io(path, e)
        }
    })?;
    attachments_from_eml(&data)
}

/// Decode every attachment of a raw message into a ready record.
///
/// The records are in the `Local` state with base64 content, so they can
/// be previewed or attached to a draft right away. A message that cannot be
/// parsed yields no attachments.
pub fn attachments_from_eml(raw_message: &[u8]) -> Result<Vec<ClientAttachment>> {
    let message_bytes = skip_from_line(raw_message);
    let Some(msg) = MessageParser::default().parse(message_bytes) else {
        tracing::debug!(bytes = raw_message.len(), "Message could not be parsed");
        return Ok(Vec::new());
    };

    let mut result = Vec::new();
    for (idx, part) in msg.attachments().enumerate() {
        let name = part
            .attachment_name()
            .map(String::from)
            .unwrap_or_else(|| format!("attachment_{idx}"));

        let content_type = part
            .content_type()
            .map(|ct: &mail_parser::ContentType| match ct.subtype() {
                Some(sub) => format!("{}/{sub}", ct.ctype()),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let inline = part
            .content_disposition()
            .map(|d: &mail_parser::ContentType| d.ctype().eq_ignore_ascii_case("inline"))
            .unwrap_or(false);

        let content_id = part
            .content_id()
            .map(|cid| cid.trim_matches(|c| c == '<' || c == '>').to_string());

        let contents = part.contents();
        result.push(ClientAttachment {
            id: AttachmentId::generate(),
            name,
            content_type,
            size: contents.len() as u64,
            content_id,
            inline,
            state: AttachmentState::Local {
                content: Payload::from_bytes(contents),
            },
        });
    }

    tracing::debug!(count = result.len(), "Listed message attachments");
    Ok(result)
}

/// Skip an MBOX `From ` separator line (and a UTF-8 BOM) if present.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = "From: a@example.com\r\n\
To: b@example.com\r\n\
Subject: files\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attached\r\n\
--XX\r\n\
Content-Type: text/csv; name=\"data.csv\"\r\n\
Content-Disposition: attachment; filename=\"data.csv\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
YSxiCjEsMgo=\r\n\
--XX\r\n\
Content-Type: image/png\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-ID: <logo@x>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--XX--\r\n";

    #[test]
    fn test_lists_attachments() {
        let atts = attachments_from_eml(MESSAGE.as_bytes()).unwrap();
        assert_eq!(atts.len(), 2);

        assert_eq!(atts[0].name, "data.csv");
        assert_eq!(atts[0].content_type, "text/csv");
        assert!(!atts[0].inline);
        assert_eq!(atts[0].content().unwrap().to_bytes().unwrap(), b"a,b\n1,2\n");

        assert_eq!(atts[1].name, "logo.png");
        assert!(atts[1].inline);
        assert_eq!(atts[1].content_id.as_deref(), Some("logo@x"));
        assert_eq!(atts[1].size, 8);
    }

    #[test]
    fn test_skip_from_line() {
        let data = b"From someone Mon Jan 1 00:00:00 2024\nSubject: x\n\nbody";
        assert!(skip_from_line(data).starts_with(b"Subject"));
        assert_eq!(skip_from_line(b"Subject: y\n"), b"Subject: y\n");
    }

    #[test]
    fn test_missing_file() {
        let err = read_eml("/no/such/message.eml").unwrap_err();
        assert!(matches!(err, AttachmentError::FileNotFound(_)));
    }
}

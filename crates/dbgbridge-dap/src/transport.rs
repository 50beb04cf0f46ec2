//! DAP transport layer: Content-Length based message framing.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::DapError;

/// Encode a JSON value into a DAP wire-format message with Content-Length header.
pub fn encode_message(value: &serde_json::Value) -> Vec<u8> {
    let body = serde_json::to_string(value).unwrap_or_default();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Read one framed message from the adapter's output.
///
/// Returns `Ok(None)` on a clean end of stream before any header byte.
/// A stream that ends mid-message, a missing `Content-Length` header, or a
/// body that is not JSON is a `Transport`/`InvalidResponse` error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<serde_json::Value>, DapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut header = String::new();
    let mut started = false;
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| DapError::Transport(e.to_string()))?;
        if n == 0 {
            if started {
                return Err(DapError::Transport(
                    "incomplete header: stream closed".into(),
                ));
            }
            return Ok(None);
        }
        started = true;
        if line.trim().is_empty() {
            break;
        }
        header.push_str(&line);
    }

    let content_length = parse_content_length(&header)?;
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.map_err(|e| {
        DapError::Transport(format!(
            "incomplete body: expected {content_length} bytes: {e}"
        ))
    })?;

    let value = serde_json::from_slice(&body)
        .map_err(|e| DapError::InvalidResponse(format!("JSON parse error: {e}")))?;
    Ok(Some(value))
}

/// Parse the Content-Length value from the header section.
fn parse_content_length(header: &str) -> Result<usize, DapError> {
    for line in header.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let value = value.trim();
            return value.parse::<usize>().map_err(|e| {
                DapError::Transport(format!("invalid Content-Length value '{value}': {e}"))
            });
        }
    }
    Err(DapError::Transport("missing Content-Length header".into()))
}

//! Message framing for the stdio channel.
//!
//! Accepts both newline-delimited JSON and `Content-Length` framed messages; a
//! response is written with the framing of the message it answers.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Line,
    ContentLength,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Message(Value),
    /// Payload that is not valid JSON; answered with a parse error.
    Malformed(String),
}

pub async fn read_message<R>(reader: &mut R) -> Result<Option<(Framing, Incoming)>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Only a Content-Length line opens a header block; anything else is a line message.
        let Some(value) = content_length_value(trimmed) else {
            return Ok(Some((Framing::Line, parse_payload(trimmed.as_bytes()))));
        };

        let mut content_length = value.parse::<usize>().ok();
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).await? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Unexpected EOF while reading MCP headers",
                ));
            }
            let header = header.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }
            if let Some(value) = content_length_value(header) {
                content_length = value.parse::<usize>().ok();
            }
        }

        let Some(content_length) = content_length else {
            return Ok(Some((
                Framing::ContentLength,
                Incoming::Malformed("Invalid Content-Length header".to_string()),
            )));
        };
        let mut payload = vec![0_u8; content_length];
        reader.read_exact(&mut payload).await?;
        return Ok(Some((Framing::ContentLength, parse_payload(&payload))));
    }
}

pub async fn write_message<W>(
    writer: &mut W,
    framing: Framing,
    value: &Value,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

fn parse_payload(bytes: &[u8]) -> Incoming {
    match serde_json::from_slice(bytes) {
        Ok(value) => Incoming::Message(value),
        Err(e) => Incoming::Malformed(format!("Invalid JSON payload: {e}")),
    }
}

fn content_length_value(line: &str) -> Option<&str> {
    let (name, value) = line.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case("content-length")
        .then(|| value.trim())
}

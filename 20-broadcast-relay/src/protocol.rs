use std::{fmt, io};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Sent to a freshly accepted connection to ask for a display name.
pub const SUBMIT_NAME: &str = "SUBMIT_NAME";

/// Prefix of the line confirming the handshake, followed by the chosen name.
pub const NAME_ACCEPTED: &str = "NAME_ACCEPTED";

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// A relayed line, built right before fan-out and dropped right after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine<'a> {
    Joined { name: &'a str },
    Message { name: &'a str, content: &'a str },
    Left { name: &'a str },
}

impl fmt::Display for ChatLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatLine::Joined { name } => write!(f, "{name} has joined the chat."),
            ChatLine::Message { name, content } => write!(f, "{name}: {content}"),
            ChatLine::Left { name } => write!(f, "{name} has left the chat."),
        }
    }
}

pub fn name_accepted(name: &str) -> String {
    format!("{NAME_ACCEPTED} {name}")
}

/// Reads one newline-terminated line with the terminator stripped.
///
/// Returns `Ok(None)` once the peer closes its side. Bytes that are not valid
/// UTF-8 are replaced rather than rejected, so a stray byte never tears down a
/// session. A final line without a trailing newline is still returned.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let bytes = reader.read_until(b'\n', &mut buf).await?;
    if bytes == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    // One write per line so concurrent writers to other sinks never interleave
    // partial lines on this one.
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

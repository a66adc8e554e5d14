//! DAP stdio framing.
//! - read_message: parse a Content-Length framed payload
//! - write_message/write_message_locked: emit a framed payload

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

const CONTENT_LENGTH: &str = "Content-Length";

pub(super) fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut content_length = None;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                if let Ok(length) = value.trim().parse::<usize>() {
                    content_length = Some(length);
                }
            }
        }
    }

    let length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    let payload = String::from_utf8(buffer)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8 payload"))?;
    Ok(Some(payload))
}

pub(super) fn write_message<W: Write>(writer: &mut W, payload: &str) -> io::Result<()> {
    let length = payload.len();
    write!(writer, "Content-Length: {length}\r\n\r\n")?;
    writer.write_all(payload.as_bytes())?;
    writer.flush()
}

pub(super) fn write_message_locked<W: Write>(
    writer: &Arc<Mutex<W>>,
    payload: &str,
) -> io::Result<()> {
    let mut writer = writer
        .lock()
        .map_err(|_| io::Error::other("output lock poisoned"))?;
    write_message(&mut *writer, payload)
}

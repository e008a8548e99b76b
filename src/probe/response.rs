use std::borrow::Cow;

use super::error::TransferFailure;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// A complete HTTP response as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    version: String,
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    raw: Vec<u8>,
}

impl ProbeResponse {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The payload with any chunked framing removed.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Every byte received, interim responses included.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Outcome of feeding the reader a possibly incomplete buffer.
#[derive(Debug)]
pub(crate) enum Parsed {
    Complete(ProbeResponse),
    Partial,
}

enum Framing {
    Empty,
    Length(usize),
    UntilClose,
    Chunked(ChunkedDecoder),
}

struct Head {
    version: String,
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    body_start: usize,
    framing: Framing,
}

/// Incremental response parser.
///
/// The caller keeps appending to one buffer and passes all of it to
/// [`ResponseReader::advance`] each time. The reader remembers how far it got,
/// so every byte is examined a bounded number of times.
pub(crate) struct ResponseReader {
    expects_body: bool,
    head_start: usize,
    scanned: usize,
    head: Option<Head>,
}

impl ResponseReader {
    pub(crate) fn new(expects_body: bool) -> Self {
        Self {
            expects_body,
            head_start: 0,
            scanned: 0,
            head: None,
        }
    }

    /// With `closed` set the peer has hung up, so missing bytes are an error
    /// rather than a reason to keep reading.
    pub(crate) fn advance(&mut self, raw: &[u8], closed: bool) -> Result<Parsed, TransferFailure> {
        if self.head.is_none() && !self.read_head(raw)? {
            if closed {
                return Err(early_close(raw));
            }
            return Ok(Parsed::Partial);
        }
        let Some(head) = self.head.as_mut() else {
            return Ok(Parsed::Partial);
        };

        let body_start = head.body_start;
        let body = match &mut head.framing {
            Framing::Empty => Some(Vec::new()),
            Framing::Length(length) => {
                let end = body_start.checked_add(*length).ok_or_else(|| {
                    TransferFailure::Malformed(format!("Content-Length {length} is out of range"))
                })?;
                (raw.len() >= end).then(|| raw[body_start..end].to_vec())
            }
            Framing::UntilClose => closed.then(|| raw[body_start..].to_vec()),
            Framing::Chunked(decoder) => decoder.advance(raw)?,
        };

        match (body, self.head.take()) {
            (Some(body), Some(head)) => Ok(Parsed::Complete(ProbeResponse {
                version: head.version,
                status: head.status,
                reason: head.reason,
                headers: head.headers,
                body,
                raw: raw.to_vec(),
            })),
            (_, taken) => {
                self.head = taken;
                if closed {
                    Err(early_close(raw))
                } else {
                    Ok(Parsed::Partial)
                }
            }
        }
    }

    /// Looks for the end of the final (non-interim) header block.
    fn read_head(&mut self, raw: &[u8]) -> Result<bool, TransferFailure> {
        loop {
            let from = self.scanned.max(self.head_start);
            let Some(found) = find(&raw[from..], HEADER_END) else {
                // A terminator may straddle the next read.
                self.scanned = raw
                    .len()
                    .saturating_sub(HEADER_END.len() - 1)
                    .max(self.head_start);
                return Ok(false);
            };
            let head_end = from + found;
            let body_start = head_end + HEADER_END.len();

            let text = std::str::from_utf8(&raw[self.head_start..head_end])
                .map_err(|_| TransferFailure::Malformed("response head is not UTF-8".into()))?;
            let mut lines = text.split("\r\n");
            let status_line = lines.next().unwrap_or_default();
            let (version, status, reason) = parse_status_line(status_line)?;
            let headers = lines.map(parse_header).collect::<Result<Vec<_>, _>>()?;

            // Interim responses precede the real one on the same connection.
            if (100..200).contains(&status) && status != 101 {
                self.head_start = body_start;
                self.scanned = body_start;
                continue;
            }

            let framing = framing_for(status, &headers, self.expects_body, body_start)?;
            self.head = Some(Head {
                version,
                status,
                reason,
                headers,
                body_start,
                framing,
            });
            return Ok(true);
        }
    }
}

fn early_close(raw: &[u8]) -> TransferFailure {
    TransferFailure::ClosedEarly {
        received: raw.len(),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_status_line(line: &str) -> Result<(String, u16, String), TransferFailure> {
    let malformed = || TransferFailure::Malformed(format!("invalid status line `{line}`"));

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().filter(|v| v.starts_with("HTTP/")).ok_or_else(malformed)?;
    let code = parts.next().ok_or_else(malformed)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let status = code.parse::<u16>().map_err(|_| malformed())?;
    if status < 100 {
        return Err(malformed());
    }
    let reason = parts.next().unwrap_or_default();

    Ok((version.to_string(), status, reason.to_string()))
}

fn parse_header(line: &str) -> Result<(String, String), TransferFailure> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| TransferFailure::Malformed(format!("invalid header line `{line}`")))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn framing_for(
    status: u16,
    headers: &[(String, String)],
    expects_body: bool,
    body_start: usize,
) -> Result<Framing, TransferFailure> {
    if !expects_body || status == 204 || status == 304 || (100..200).contains(&status) {
        return Ok(Framing::Empty);
    }

    let value_of = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    };

    if let Some(encoding) = value_of("transfer-encoding") {
        let last = encoding.rsplit(',').next().unwrap_or_default().trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(Framing::Chunked(ChunkedDecoder::new(body_start)));
        }
        return Ok(Framing::UntilClose);
    }

    match value_of("content-length") {
        Some(length) => length
            .parse::<usize>()
            .map(Framing::Length)
            .map_err(|_| TransferFailure::Malformed(format!("invalid Content-Length `{length}`"))),
        None => Ok(Framing::UntilClose),
    }
}

enum ChunkState {
    Size,
    Data(usize),
    Trailers,
}

/// De-chunks a body as its bytes arrive.
struct ChunkedDecoder {
    cursor: usize,
    body: Vec<u8>,
    state: ChunkState,
}

impl ChunkedDecoder {
    fn new(body_start: usize) -> Self {
        Self {
            cursor: body_start,
            body: Vec::new(),
            state: ChunkState::Size,
        }
    }

    /// Returns the payload once the terminating chunk and trailers have arrived.
    fn advance(&mut self, raw: &[u8]) -> Result<Option<Vec<u8>>, TransferFailure> {
        loop {
            let input = &raw[self.cursor..];
            match self.state {
                ChunkState::Size => {
                    let Some(line_end) = find(input, b"\r\n") else {
                        return Ok(None);
                    };
                    let size_line = std::str::from_utf8(&input[..line_end])
                        .map_err(|_| TransferFailure::Malformed("chunk size is not UTF-8".into()))?;
                    let size_text = size_line.split(';').next().unwrap_or_default().trim();
                    let size = usize::from_str_radix(size_text, 16).map_err(|_| {
                        TransferFailure::Malformed(format!("invalid chunk size `{size_text}`"))
                    })?;
                    self.cursor += line_end + 2;
                    self.state = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(size) => {
                    let framed = size.checked_add(2).ok_or_else(|| {
                        TransferFailure::Malformed(format!("chunk size {size:#x} is out of range"))
                    })?;
                    if input.len() < framed {
                        return Ok(None);
                    }
                    if &input[size..framed] != b"\r\n" {
                        return Err(TransferFailure::Malformed(
                            "chunk data is not followed by CRLF".into(),
                        ));
                    }
                    self.body.extend_from_slice(&input[..size]);
                    self.cursor += framed;
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let Some(trailer_end) = find(input, b"\r\n") else {
                        return Ok(None);
                    };
                    self.cursor += trailer_end + 2;
                    if trailer_end == 0 {
                        return Ok(Some(std::mem::take(&mut self.body)));
                    }
                }
            }
        }
    }
}

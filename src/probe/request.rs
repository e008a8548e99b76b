use hyper::Method;

pub const CRLF: &str = "\r\n";

/// The exact bytes a probe puts on the wire.
///
/// Nothing here validates framing: a request may declare a `Content-Length`
/// that disagrees with its body, omit `Host`, or not be HTTP at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    bytes: Vec<u8>,
}

impl ProbeRequest {
    /// Joins literal lines with CRLF. Pass an empty line to end the header
    /// block and a trailing empty line to terminate the last line.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        for (index, line) in lines.into_iter().enumerate() {
            if index > 0 {
                text.push_str(CRLF);
            }
            text.push_str(line.as_ref());
        }
        Self::from_bytes(text)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First token of the request line, if the payload has one.
    pub fn method(&self) -> Option<&str> {
        let line_end = self
            .bytes
            .iter()
            .position(|b| *b == b'\r' || *b == b'\n')
            .unwrap_or(self.bytes.len());
        let line = std::str::from_utf8(&self.bytes[..line_end]).ok()?;
        line.split(' ').next().filter(|m| !m.is_empty())
    }

    /// Responses to HEAD carry headers only.
    pub fn expects_response_body(&self) -> bool {
        !self
            .method()
            .is_some_and(|method| method.eq_ignore_ascii_case("HEAD"))
    }

    /// Bytes after the first blank line.
    pub fn body(&self) -> &[u8] {
        match self.bytes.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(end) => &self.bytes[end + 4..],
            None => &[],
        }
    }
}

impl From<&str> for ProbeRequest {
    fn from(text: &str) -> Self {
        Self::from_bytes(text)
    }
}

impl From<String> for ProbeRequest {
    fn from(text: String) -> Self {
        Self::from_bytes(text)
    }
}

impl From<Vec<u8>> for ProbeRequest {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Assembles a [`ProbeRequest`] from its parts so callers never maintain CRLF
/// joins by hand.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    version: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    declared_content_length: Option<usize>,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            declared_content_length: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn host(self, host: &str, port: u16) -> Self {
        self.header("Host", format!("{host}:{port}"))
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Emit `Content-Length: length` regardless of the actual body size.
    #[must_use]
    pub fn declared_content_length(mut self, length: usize) -> Self {
        self.declared_content_length = Some(length);
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    fn content_length(&self) -> Option<usize> {
        if self.has_header("content-length") {
            return None;
        }
        if self.declared_content_length.is_some() {
            return self.declared_content_length;
        }
        let method_carries_body = matches!(self.method, Method::POST | Method::PUT | Method::PATCH);
        (method_carries_body || !self.body.is_empty()).then_some(self.body.len())
    }

    pub fn build(self) -> ProbeRequest {
        let mut head = format!("{} {} {}{CRLF}", self.method, self.path, self.version);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}{CRLF}"));
        }
        if let Some(length) = self.content_length() {
            head.push_str(&format!("Content-Length: {length}{CRLF}"));
        }
        head.push_str(CRLF);

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        ProbeRequest::from_bytes(bytes)
    }
}

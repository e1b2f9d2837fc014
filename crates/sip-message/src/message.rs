//! SIP request / response model

use std::net::SocketAddr;

use crate::headers::Headers;
use crate::method::Method;

pub const SIP_VERSION: &str = "SIP/2.0";

/// Headers copied from a request into any response generated for it
const RESPONSE_COPIED_HEADERS: [&str; 5] = ["Via", "From", "To", "Call-ID", "CSeq"];

/// Request line or status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: Method,
        uri: String,
        version: String,
    },
    Response {
        status: u16,
        reason: String,
        version: String,
    },
}

/// A parsed SIP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub start_line: StartLine,
    pub headers: Headers,
    pub body: String,
    /// Transport address the message was received from, when known
    pub source: Option<SocketAddr>,
}

impl SipMessage {
    /// Create a request with no headers
    pub fn request(method: Method, uri: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Request {
                method,
                uri: uri.into(),
                version: SIP_VERSION.to_string(),
            },
            headers: Headers::new(),
            body: String::new(),
            source: None,
        }
    }

    /// Create a response with no headers
    pub fn response(status: u16, reason: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Response {
                status,
                reason: reason.into(),
                version: SIP_VERSION.to_string(),
            },
            headers: Headers::new(),
            body: String::new(),
            source: None,
        }
    }

    /// Build a response to `request`, copying Via, From, To, Call-ID and CSeq
    pub fn response_to(request: &SipMessage, status: u16, reason: impl Into<String>) -> Self {
        let mut response = Self::response(status, reason);
        for name in RESPONSE_COPIED_HEADERS {
            for value in request.headers.get_all(name) {
                response.headers.add(name, value);
            }
        }
        response
    }

    /// Builder-style header append
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn is_response(&self) -> bool {
        matches!(self.start_line, StartLine::Response { .. })
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    /// Whether this is a request with the given method
    pub fn is_method(&self, expected: &Method) -> bool {
        self.method() == Some(expected)
    }

    /// Request-URI, for requests
    pub fn uri(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { uri, .. } => Some(uri),
            StartLine::Response { .. } => None,
        }
    }

    /// Status code, for responses
    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Response { reason, .. } => Some(reason),
            StartLine::Request { .. } => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.add(name, value);
    }

    pub fn remove_header(&mut self, name: &str) -> usize {
        self.headers.remove(name)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.get("Call-ID")
    }
}

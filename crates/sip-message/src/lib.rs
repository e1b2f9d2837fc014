//! # Border SIP Message
//!
//! The structured SIP message handed to the border pipeline by the wire
//! parser. Parsing and serialization live outside this workspace; this crate
//! only models what the pipeline reads and rewrites:
//!
//! - a start line that is either a request or a response
//! - an ordered header multimap with case-insensitive lookup
//! - the raw body and the transport source address

pub mod headers;
pub mod message;
pub mod method;

pub use headers::{Header, Headers};
pub use message::{SipMessage, StartLine, SIP_VERSION};
pub use method::Method;

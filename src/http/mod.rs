//! HTTP/1.x protocol implementation.
//!
//! # Architecture
//!
//! - **`connection`**: the server-side request state machine with
//!   resumable reads and writes
//! - **`parser`**: incremental, offset-anchored parsing of request and
//!   response bytes
//! - **`request`**: parsed request representation handed to user logic
//! - **`response`**: response representation with builder pattern
//! - **`writer`**: resumable vectored serialization of responses
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Request state machine
//!
//! Each request on a connection moves linearly through:
//!
//! ```text
//! AWAIT_MIN_BYTES → READ_METHOD_LINE
//!     → (GET/HEAD)  AWAIT_HEADER_END
//!     → (POST/PUT)  AWAIT_HEADER_END → PARSE_CONTENT_LENGTH → AWAIT_BODY
//!     → DISPATCH → RESPOND → (persistent? RETURN_TO_IDLE : CLOSE)
//! ```
//!
//! Every state that needs more bytes than currently buffered suspends,
//! re-arms the connection's timeout-chain membership, and resumes when
//! the socket becomes readable again. Re-entering a state after a
//! partial read never corrupts already-parsed offsets because all scans
//! are anchored at stable buffer offsets.

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

//! RingFS node protocol
//!
//! One request per connection. The three exchanges are:
//!
//! ```text
//! ENUMERATE               -> OK, BLOB <name>*, END        | ERROR
//! STORE <len> <name>      -> OK, <len bytes>, SUCCESS     | ERROR | FAILED
//! FETCH <name>            -> DATA <len>, <len bytes>      | NOTFOUND | ERROR
//! ```
//!
//! For STORE the client sends the payload only after reading `OK`.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{ClientCodec, Frame, NodeCodec, ServerCodec, MAX_LINE_LENGTH, MAX_PAYLOAD_BLOCK};
pub use error::{ProtocolError, Result};
pub use message::{Message, Request, Response};

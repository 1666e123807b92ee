//! Request and response messages exchanged with a storage node.
//!
//! Every message is a single `\n`-terminated header line. `STORE` requests and
//! `DATA` responses announce a payload length; the payload follows the header
//! as raw bytes with no delimiter.

use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// A header line that can travel through [`crate::NodeCodec`]
pub trait Message: Sized {
    /// Parse a header line with the newline already stripped
    fn parse_line(line: &str) -> Result<Self>;

    /// Append the header line, newline included
    fn write_line(&self, dst: &mut BytesMut);

    /// Length of the raw payload that follows this header, if any
    fn payload_len(&self) -> Option<u64> {
        None
    }
}

/// Client to node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// List every blob the node holds
    Enumerate,
    /// Store `length` bytes under `name`
    Store { name: String, length: u64 },
    /// Read the blob `name`
    Fetch { name: String },
}

/// Node to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Listing follows, or a STORE header was accepted
    Ok,
    /// One entry of a listing
    Blob(String),
    /// End of a listing
    End,
    /// Blob contents follow
    Data { length: u64 },
    /// The requested blob does not exist
    NotFound,
    /// The stored payload was written completely
    Success,
    /// The stored payload was not written
    Failed,
    /// The request could not be served
    Error(String),
}

impl Message for Request {
    fn parse_line(line: &str) -> Result<Self> {
        let (keyword, rest) = split_keyword(line);
        match keyword {
            "ENUMERATE" => {
                expect_no_args(line, rest)?;
                Ok(Request::Enumerate)
            }
            "STORE" => {
                let rest =
                    rest.ok_or_else(|| ProtocolError::malformed(line, "missing length and name"))?;
                let (length, name) = rest
                    .split_once(' ')
                    .ok_or_else(|| ProtocolError::malformed(line, "missing name"))?;
                Ok(Request::Store {
                    name: parse_name(line, name)?,
                    length: parse_length(line, length)?,
                })
            }
            "FETCH" => {
                let name = rest.ok_or_else(|| ProtocolError::malformed(line, "missing name"))?;
                Ok(Request::Fetch {
                    name: parse_name(line, name)?,
                })
            }
            other => Err(ProtocolError::malformed(
                line,
                format!("unknown command {:?}", other),
            )),
        }
    }

    fn write_line(&self, dst: &mut BytesMut) {
        let line = match self {
            Request::Enumerate => "ENUMERATE".to_string(),
            Request::Store { name, length } => format!("STORE {} {}", length, name),
            Request::Fetch { name } => format!("FETCH {}", name),
        };
        put_line(dst, &line);
    }

    fn payload_len(&self) -> Option<u64> {
        match self {
            Request::Store { length, .. } => Some(*length),
            _ => None,
        }
    }
}

impl Message for Response {
    fn parse_line(line: &str) -> Result<Self> {
        let (keyword, rest) = split_keyword(line);
        match keyword {
            "OK" => expect_no_args(line, rest).map(|_| Response::Ok),
            "END" => expect_no_args(line, rest).map(|_| Response::End),
            "NOTFOUND" => expect_no_args(line, rest).map(|_| Response::NotFound),
            "SUCCESS" => expect_no_args(line, rest).map(|_| Response::Success),
            "FAILED" => expect_no_args(line, rest).map(|_| Response::Failed),
            "BLOB" => {
                let name = rest.ok_or_else(|| ProtocolError::malformed(line, "missing name"))?;
                Ok(Response::Blob(parse_name(line, name)?))
            }
            "DATA" => {
                let length = rest.ok_or_else(|| ProtocolError::malformed(line, "missing length"))?;
                Ok(Response::Data {
                    length: parse_length(line, length)?,
                })
            }
            "ERROR" => Ok(Response::Error(rest.unwrap_or_default().to_string())),
            other => Err(ProtocolError::malformed(
                line,
                format!("unknown response {:?}", other),
            )),
        }
    }

    fn write_line(&self, dst: &mut BytesMut) {
        match self {
            Response::Ok => put_line(dst, "OK"),
            Response::Blob(name) => put_line(dst, &format!("BLOB {}", name)),
            Response::End => put_line(dst, "END"),
            Response::Data { length } => put_line(dst, &format!("DATA {}", length)),
            Response::NotFound => put_line(dst, "NOTFOUND"),
            Response::Success => put_line(dst, "SUCCESS"),
            Response::Failed => put_line(dst, "FAILED"),
            Response::Error(message) if message.is_empty() => put_line(dst, "ERROR"),
            // Messages are free text; keep them on one line
            Response::Error(message) => {
                put_line(dst, &format!("ERROR {}", message.replace(&['\r', '\n'][..], " ")))
            }
        }
    }

    fn payload_len(&self) -> Option<u64> {
        match self {
            Response::Data { length } => Some(*length),
            _ => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Enumerate => write!(f, "ENUMERATE"),
            Request::Store { name, length } => write!(f, "STORE {} ({} bytes)", name, length),
            Request::Fetch { name } => write!(f, "FETCH {}", name),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Blob(name) => write!(f, "BLOB {}", name),
            Response::End => write!(f, "END"),
            Response::Data { length } => write!(f, "DATA {}", length),
            Response::NotFound => write!(f, "NOTFOUND"),
            Response::Success => write!(f, "SUCCESS"),
            Response::Failed => write!(f, "FAILED"),
            Response::Error(message) => write!(f, "ERROR {}", message),
        }
    }
}

fn split_keyword(line: &str) -> (&str, Option<&str>) {
    match line.split_once(' ') {
        Some((keyword, rest)) => (keyword, Some(rest)),
        None => (line, None),
    }
}

fn expect_no_args(line: &str, rest: Option<&str>) -> Result<()> {
    match rest {
        None => Ok(()),
        Some(_) => Err(ProtocolError::malformed(line, "unexpected arguments")),
    }
}

fn parse_length(line: &str, field: &str) -> Result<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::malformed(line, "length is not a decimal number"));
    }
    field
        .parse::<u64>()
        .map_err(|e| ProtocolError::malformed(line, format!("invalid length: {}", e)))
}

fn parse_name(line: &str, field: &str) -> Result<String> {
    if field.is_empty() {
        return Err(ProtocolError::malformed(line, "empty name"));
    }
    Ok(field.to_string())
}

fn put_line(dst: &mut BytesMut, line: &str) {
    dst.reserve(line.len() + 1);
    dst.put_slice(line.as_bytes());
    dst.put_u8(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render<M: Message>(message: &M) -> String {
        let mut buf = BytesMut::new();
        message.write_line(&mut buf);
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn test_request_grammar() {
        assert_eq!(render(&Request::Enumerate), "ENUMERATE\n");
        assert_eq!(
            render(&Request::Store { name: "report.txt.1".into(), length: 25 }),
            "STORE 25 report.txt.1\n"
        );
        assert_eq!(
            render(&Request::Fetch { name: "report.txt.3".into() }),
            "FETCH report.txt.3\n"
        );
    }

    #[test]
    fn test_store_name_may_contain_spaces() {
        let request = Request::parse_line("STORE 7 my file.txt.2").unwrap();
        assert_eq!(
            request,
            Request::Store { name: "my file.txt.2".into(), length: 7 }
        );
        assert_eq!(request.payload_len(), Some(7));
    }

    #[test]
    fn test_malformed_requests() {
        for line in [
            "",
            "LIST",
            "ENUMERATE now",
            "STORE",
            "STORE 10",
            "STORE ten name",
            "STORE -1 name",
            "STORE 10 ",
            "FETCH",
            "FETCH ",
        ] {
            assert!(
                matches!(Request::parse_line(line), Err(ProtocolError::Malformed { .. })),
                "{:?} should be rejected",
                line
            );
        }
    }

    #[test]
    fn test_response_grammar() {
        assert_eq!(Response::parse_line("OK").unwrap(), Response::Ok);
        assert_eq!(Response::parse_line("END").unwrap(), Response::End);
        assert_eq!(Response::parse_line("BLOB a.1").unwrap(), Response::Blob("a.1".into()));
        assert_eq!(Response::parse_line("DATA 12").unwrap(), Response::Data { length: 12 });
        assert_eq!(Response::parse_line("NOTFOUND").unwrap(), Response::NotFound);
        assert_eq!(Response::parse_line("ERROR").unwrap(), Response::Error(String::new()));
        assert_eq!(
            Response::parse_line("ERROR disk full").unwrap(),
            Response::Error("disk full".into())
        );
        assert!(Response::parse_line("DATA").is_err());
        assert!(Response::parse_line("HELLO").is_err());
    }

    #[test]
    fn test_error_message_stays_on_one_line() {
        let rendered = render(&Response::Error("bad\nthing".into()));
        assert_eq!(rendered, "ERROR bad thing\n");
    }
}

//! Client side of the node protocol.
//!
//! Every request opens its own connection, the way the node serves them:
//! one request per connection, closed once the response is complete.

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use ringfs_common::NodeInfo;
use ringfs_protocol::{ClientCodec, Frame, ProtocolError, Request, Response, MAX_PAYLOAD_BLOCK};

use crate::error::{ClientError, ClientResult};

type Connection = Framed<TcpStream, ClientCodec>;

/// Talks to a single storage node
#[derive(Debug, Clone)]
pub struct NodeClient {
    node: NodeInfo,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl NodeClient {
    pub fn new(node: NodeInfo, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            node,
            connect_timeout,
            io_timeout,
        }
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    /// Open a raw connection within the connect timeout
    pub async fn connect_stream(&self) -> ClientResult<TcpStream> {
        let address = self.node.address();
        match timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                trace!("Connected to {} at {}", self.node.name, address);
                Ok(stream)
            }
            Ok(Err(e)) => Err(self.unreachable(e.to_string())),
            Err(_) => Err(self.unreachable(format!(
                "connect timed out after {:?}",
                self.connect_timeout
            ))),
        }
    }

    /// List every blob name the node holds
    pub async fn enumerate(&self) -> ClientResult<Vec<String>> {
        let mut connection = self.connect().await?;
        self.send(&mut connection, Request::Enumerate).await?;

        match self.next_message(&mut connection, "listing").await? {
            Response::Ok => {}
            other => return Err(self.unexpected("listing", other)),
        }

        let mut names = Vec::new();
        loop {
            match self.next_message(&mut connection, "listing entry").await? {
                Response::Blob(name) => names.push(name),
                Response::End => break,
                other => return Err(self.unexpected("listing entry", other)),
            }
        }

        debug!("{} holds {} blobs", self.node.name, names.len());
        Ok(names)
    }

    /// Store `data` under the blob name `name`
    pub async fn store(&self, name: &str, data: Bytes) -> ClientResult<()> {
        let mut connection = self.connect().await?;
        self.send(
            &mut connection,
            Request::Store {
                name: name.to_string(),
                length: data.len() as u64,
            },
        )
        .await?;

        match self.next_message(&mut connection, "store acknowledgement").await? {
            Response::Ok => {}
            other => return Err(self.unexpected("store acknowledgement", other)),
        }

        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + MAX_PAYLOAD_BLOCK).min(data.len());
            let block = Frame::Payload(data.slice(offset..end));
            self.with_io_timeout("payload", connection.feed(block)).await?;
            offset = end;
        }
        self.with_io_timeout("payload", connection.flush()).await?;

        match self.next_message(&mut connection, "store result").await? {
            Response::Success => {
                debug!("Stored {} ({} bytes) on {}", name, data.len(), self.node.name);
                Ok(())
            }
            Response::Failed => Err(ClientError::Rejected {
                node: self.node.name.clone(),
                message: format!("store of {} failed", name),
            }),
            other => Err(self.unexpected("store result", other)),
        }
    }

    /// Fetch the blob `name`; `None` when the node does not have it
    pub async fn fetch(&self, name: &str) -> ClientResult<Option<Bytes>> {
        let mut connection = self.connect().await?;
        self.send(
            &mut connection,
            Request::Fetch {
                name: name.to_string(),
            },
        )
        .await?;

        let length = match self.next_message(&mut connection, "fetch result").await? {
            Response::Data { length } => length,
            Response::NotFound => {
                debug!("{} has no blob {}", self.node.name, name);
                return Ok(None);
            }
            other => return Err(self.unexpected("fetch result", other)),
        };

        let mut data = BytesMut::with_capacity(length.min(MAX_PAYLOAD_BLOCK as u64 * 16) as usize);
        while (data.len() as u64) < length {
            match self.next_frame(&mut connection, "blob data").await? {
                Frame::Payload(block) => data.extend_from_slice(&block),
                Frame::Message(message) => return Err(self.unexpected("blob data", message)),
            }
        }

        debug!("Fetched {} ({} bytes) from {}", name, length, self.node.name);
        Ok(Some(data.freeze()))
    }

    async fn connect(&self) -> ClientResult<Connection> {
        let stream = self.connect_stream().await?;
        Ok(Framed::new(stream, ClientCodec::new()))
    }

    async fn send(&self, connection: &mut Connection, request: Request) -> ClientResult<()> {
        trace!("-> {}: {}", self.node.name, request);
        self.with_io_timeout("request", connection.send(Frame::Message(request)))
            .await
    }

    async fn next_frame(
        &self,
        connection: &mut Connection,
        waiting_for: &'static str,
    ) -> ClientResult<Frame<Response>> {
        match timeout(self.io_timeout, connection.next()).await {
            Ok(Some(Ok(frame))) => Ok(frame),
            Ok(Some(Err(e))) => Err(self.protocol(e)),
            Ok(None) => Err(self.protocol(ProtocolError::Unexpected {
                expected: waiting_for,
                got: "end of stream".to_string(),
            })),
            Err(_) => Err(self.unreachable(format!(
                "timed out after {:?} waiting for {}",
                self.io_timeout, waiting_for
            ))),
        }
    }

    async fn next_message(
        &self,
        connection: &mut Connection,
        waiting_for: &'static str,
    ) -> ClientResult<Response> {
        match self.next_frame(connection, waiting_for).await? {
            Frame::Message(response) => {
                trace!("<- {}: {}", self.node.name, response);
                Ok(response)
            }
            Frame::Payload(block) => Err(self.protocol(ProtocolError::Unexpected {
                expected: waiting_for,
                got: format!("{} payload bytes", block.len()),
            })),
        }
    }

    async fn with_io_timeout<F>(&self, what: &'static str, operation: F) -> ClientResult<()>
    where
        F: std::future::Future<Output = Result<(), ProtocolError>>,
    {
        match timeout(self.io_timeout, operation).await {
            Ok(result) => result.map_err(|e| self.protocol(e)),
            Err(_) => Err(self.unreachable(format!(
                "timed out after {:?} sending {}",
                self.io_timeout, what
            ))),
        }
    }

    fn unexpected(&self, expected: &'static str, got: Response) -> ClientError {
        match got {
            Response::Error(message) => ClientError::Rejected {
                node: self.node.name.clone(),
                message,
            },
            other => self.protocol(ProtocolError::Unexpected {
                expected,
                got: other.to_string(),
            }),
        }
    }

    fn protocol(&self, source: ProtocolError) -> ClientError {
        ClientError::Protocol {
            node: self.node.name.clone(),
            source,
        }
    }

    fn unreachable(&self, reason: String) -> ClientError {
        ClientError::NodeUnreachable {
            node: self.node.name.clone(),
            reason,
        }
    }
}

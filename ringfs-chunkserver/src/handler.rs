//! Per-connection request handling.
//!
//! A connection carries exactly one request. The handler reads it, serves it
//! against the blob store and returns; dropping the stream closes the
//! connection whatever the outcome. Every read and write on the connection is
//! bounded by the I/O timeout, so a peer that stops reading or writing only
//! ties up its own connection.

use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use ringfs_protocol::{Frame, ProtocolError, Request, Response, ServerCodec, MAX_PAYLOAD_BLOCK};

use crate::error::{ChunkServerError, Result};
use crate::storage::{BlobStore, BlobWriter};

type ServerFramed<S> = Framed<S, ServerCodec>;

/// Serve the single request carried by `stream`
pub async fn handle_connection<S>(
    stream: S,
    store: &dyn BlobStore,
    io_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, ServerCodec::new());

    let request = match next_frame(&mut framed, io_timeout, "request").await {
        Ok(Frame::Message(request)) => request,
        Ok(Frame::Payload(_)) => {
            let err = ChunkServerError::Storage("payload received before any request".to_string());
            reply(&mut framed, err.to_response(), io_timeout).await;
            return Err(err);
        }
        // Availability probes connect and hang up without a request
        Err(ChunkServerError::ConnectionClosed(_)) => {
            debug!("Peer closed the connection without a request");
            return Ok(());
        }
        Err(err) => {
            reply(&mut framed, err.to_response(), io_timeout).await;
            return Err(err);
        }
    };

    debug!("Serving {}", request);
    match request {
        Request::Enumerate => enumerate(&mut framed, store, io_timeout).await,
        Request::Store { name, length } => {
            store_blob(&mut framed, store, &name, length, io_timeout).await
        }
        Request::Fetch { name } => fetch_blob(&mut framed, store, &name, io_timeout).await,
    }
}

async fn enumerate<S>(
    framed: &mut ServerFramed<S>,
    store: &dyn BlobStore,
    io_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let names = match store.list().await {
        Ok(names) => names,
        Err(err) => {
            reply(framed, err.to_response(), io_timeout).await;
            return Err(err);
        }
    };

    let listing = async {
        framed.feed(Frame::Message(Response::Ok)).await?;
        for name in &names {
            framed.feed(Frame::Message(Response::Blob(name.clone()))).await?;
        }
        framed.send(Frame::Message(Response::End)).await
    };
    bounded(io_timeout, "listing to be read", listing).await?;

    debug!("Listed {} blobs", names.len());
    Ok(())
}

async fn store_blob<S>(
    framed: &mut ServerFramed<S>,
    store: &dyn BlobStore,
    name: &str,
    length: u64,
    io_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut writer = match store.create(name).await {
        Ok(writer) => writer,
        Err(err) => {
            reply(framed, err.to_response(), io_timeout).await;
            return Err(err);
        }
    };

    let acknowledged = bounded(
        io_timeout,
        "acknowledgement to be read",
        framed.send(Frame::Message(Response::Ok)),
    )
    .await;
    if let Err(err) = acknowledged {
        writer.abort().await;
        return Err(err);
    }

    if let Err(err) = receive_payload(framed, writer.as_mut(), length, io_timeout).await {
        writer.abort().await;
        reply(framed, Response::Failed, io_timeout).await;
        return Err(err);
    }

    match writer.commit().await {
        Ok(written) => {
            info!("Stored {} ({} bytes)", name, written);
            bounded(
                io_timeout,
                "store result to be read",
                framed.send(Frame::Message(Response::Success)),
            )
            .await
        }
        Err(err) => {
            reply(framed, Response::Failed, io_timeout).await;
            Err(err)
        }
    }
}

async fn receive_payload<S>(
    framed: &mut ServerFramed<S>,
    writer: &mut dyn BlobWriter,
    length: u64,
    io_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut received = 0u64;
    while received < length {
        match next_frame(framed, io_timeout, "payload").await? {
            Frame::Payload(block) => {
                writer.write(&block).await?;
                received += block.len() as u64;
            }
            Frame::Message(message) => {
                return Err(ProtocolError::Unexpected {
                    expected: "payload",
                    got: message.to_string(),
                }
                .into())
            }
        }
    }
    Ok(())
}

async fn fetch_blob<S>(
    framed: &mut ServerFramed<S>,
    store: &dyn BlobStore,
    name: &str,
    io_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let blob = match store.open(name).await {
        Ok(blob) => blob,
        Err(err @ ChunkServerError::BlobNotFound { .. }) => {
            debug!("{}", err);
            return bounded(
                io_timeout,
                "fetch result to be read",
                framed.send(Frame::Message(Response::NotFound)),
            )
            .await;
        }
        Err(err) => {
            reply(framed, err.to_response(), io_timeout).await;
            return Err(err);
        }
    };

    let length = blob.length;
    bounded(
        io_timeout,
        "fetch result to be read",
        framed.send(Frame::Message(Response::Data { length })),
    )
    .await?;

    let mut blocks = ReaderStream::with_capacity(blob.reader.take(length), MAX_PAYLOAD_BLOCK);
    let mut sent = 0u64;
    while let Some(block) = blocks.next().await {
        let block = block?;
        sent += block.len() as u64;
        bounded(io_timeout, "blob data to be read", framed.feed(Frame::Payload(block))).await?;
    }
    bounded(io_timeout, "blob data to be read", framed.flush()).await?;

    if sent != length {
        // The peer sees a truncated payload when the connection closes
        return Err(ChunkServerError::Storage(format!(
            "{} shrank while being sent: {} of {} bytes",
            name, sent, length
        )));
    }

    debug!("Sent {} ({} bytes)", name, sent);
    Ok(())
}

async fn next_frame<S>(
    framed: &mut ServerFramed<S>,
    io_timeout: Duration,
    waiting_for: &'static str,
) -> Result<Frame<Request>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(io_timeout, framed.next()).await {
        Err(_) => Err(ChunkServerError::Timeout(waiting_for)),
        Ok(None) => Err(ChunkServerError::ConnectionClosed(waiting_for)),
        Ok(Some(frame)) => Ok(frame?),
    }
}

/// Run a write on the connection, giving up once `io_timeout` elapses
async fn bounded<F>(io_timeout: Duration, waiting_for: &'static str, write: F) -> Result<()>
where
    F: Future<Output = std::result::Result<(), ProtocolError>>,
{
    match timeout(io_timeout, write).await {
        Err(_) => Err(ChunkServerError::Timeout(waiting_for)),
        Ok(result) => Ok(result?),
    }
}

/// Best-effort final response; the peer may already be gone
async fn reply<S>(framed: &mut ServerFramed<S>, response: Response, io_timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sent = bounded(io_timeout, "response to be read", framed.send(Frame::Message(response)));
    if let Err(e) = sent.await {
        warn!("Failed to send response: {}", e);
    }
}

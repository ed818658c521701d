//! Line-by-line relay of a streamed backend response to the caller.
//!
//! The backend emits server-sent-event style lines. Each non-blank line is
//! forwarded as one chunk, byte for byte including its terminator, and flushed
//! before the next line is read. At most one line is held in memory.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

/// Caller-facing output of a relay.
#[async_trait]
pub trait ChunkSink: Send {
    /// Write one chunk.
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Push everything written so far to the peer.
    async fn flush(&mut self) -> io::Result<()>;

    /// Resolves once the peer is known to be gone.
    ///
    /// Sinks that cannot tell never resolve; they report disconnects through
    /// the next failed write instead.
    async fn closed(&mut self) {
        std::future::pending::<()>().await;
    }
}

/// How a relay finished when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The backend closed the stream.
    Exhausted,
    /// The source was shut down underneath us (timeout or cancellation).
    SourceClosed,
    /// The caller went away.
    PeerDisconnected,
}

/// Counters for one finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub end: RelayEnd,
    /// Lines forwarded.
    pub chunks: u64,
    /// Bytes forwarded.
    pub bytes: u64,
    /// Blank lines dropped.
    pub skipped: u64,
}

impl RelaySummary {
    const fn new() -> Self {
        Self {
            end: RelayEnd::Exhausted,
            chunks: 0,
            bytes: 0,
            skipped: 0,
        }
    }

    const fn finish(mut self, end: RelayEnd) -> Self {
        self.end = end;
        self
    }
}

/// An unexpected failure while relaying.
///
/// By the time this happens the response status is already sent, so the only
/// remedy is to log and end the stream.
#[derive(Debug, Error)]
pub enum RelayFault {
    #[error("stream read failed: {0}")]
    Read(#[source] io::Error),

    #[error("stream write failed: {0}")]
    Write(#[source] io::Error),
}

/// Relay `source` into `sink` until the source ends, fails, or the peer leaves.
///
/// Takes ownership of the source and releases it exactly once before
/// returning, however the loop ended.
///
/// # Arguments
///
/// * `source` - Open backend body, read one line at a time
/// * `sink` - Caller-facing output; each forwarded line is flushed before the next read
///
/// # Returns
///
/// Returns a [`RelaySummary`] for every benign ending (exhausted source,
/// timed-out source, departed caller), or a [`RelayFault`] for any other
/// read or write failure.
pub async fn relay_lines<R, S>(mut source: R, sink: &mut S) -> Result<RelaySummary, RelayFault>
where
    R: AsyncBufRead + Unpin,
    S: ChunkSink + ?Sized,
{
    let result = pump(&mut source, sink).await;
    drop(source);
    result
}

async fn pump<R, S>(source: &mut R, sink: &mut S) -> Result<RelaySummary, RelayFault>
where
    R: AsyncBufRead + Unpin,
    S: ChunkSink + ?Sized,
{
    let mut summary = RelaySummary::new();
    let mut line = Vec::new();

    loop {
        line.clear();

        let read = tokio::select! {
            biased;
            () = sink.closed() => return Ok(summary.finish(RelayEnd::PeerDisconnected)),
            read = source.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => return Ok(summary.finish(RelayEnd::Exhausted)),
            Ok(_) if line.last() != Some(&b'\n') => {
                debug!(bytes = line.len(), "Dropping unterminated trailing fragment");
                return Ok(summary.finish(RelayEnd::Exhausted));
            }
            Ok(_) => {}
            Err(e) if is_source_closed(&e) => {
                debug!("Backend stream closed: {e}");
                return Ok(summary.finish(RelayEnd::SourceClosed));
            }
            Err(e) => return Err(RelayFault::Read(e)),
        }

        // Keep-alive and event separator lines.
        if line.trim_ascii().is_empty() {
            summary.skipped += 1;
            continue;
        }

        let len = line.len() as u64;
        let chunk = Bytes::from(std::mem::take(&mut line));

        let written = match sink.write_chunk(chunk).await {
            Ok(()) => sink.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => {
                summary.chunks += 1;
                summary.bytes += len;
            }
            Err(e) if is_peer_disconnect(&e) => {
                return Ok(summary.finish(RelayEnd::PeerDisconnected));
            }
            Err(e) => return Err(RelayFault::Write(e)),
        }
    }
}

/// Read errors caused by the source being shut down while we were reading.
fn is_source_closed(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::ConnectionAborted
    ) {
        return true;
    }
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout)
}

/// Write errors meaning the caller has gone away.
fn is_peer_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

/// Log the end of a relay. Benign endings never log as errors.
pub fn log_relay_result(result: &Result<RelaySummary, RelayFault>) {
    match result {
        Ok(summary) => match summary.end {
            RelayEnd::Exhausted => debug!(
                chunks = summary.chunks,
                bytes = summary.bytes,
                skipped = summary.skipped,
                "Stream complete"
            ),
            RelayEnd::SourceClosed => debug!(chunks = summary.chunks, "Stream closed by backend side"),
            RelayEnd::PeerDisconnected => {
                debug!(chunks = summary.chunks, "Client disconnected mid-stream");
            }
        },
        Err(fault) => error!("Relay fault: {fault}"),
    }
}

// =============================================================================
// Sinks
// =============================================================================

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

/// Sink feeding an HTTP response body through a single-slot channel.
///
/// The receiving half becomes the body stream. Dropping it (the server does so
/// when the caller disconnects) makes every later operation fail with
/// `BrokenPipe` and resolves [`ChunkSink::closed`].
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl ChannelSink {
    /// Create a sink and the stream that drains it.
    pub fn new() -> (Self, ReceiverStream<io::Result<Bytes>>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, ReceiverStream::new(rx))
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx.send(Ok(chunk)).await.map_err(|_| disconnected())
    }

    /// Waits until the body has taken the pending chunk off the channel.
    async fn flush(&mut self) -> io::Result<()> {
        self.tx.reserve().await.map(drop).map_err(|_| disconnected())
    }

    async fn closed(&mut self) {
        self.tx.closed().await;
    }
}

/// Sink over any async writer, e.g. a raw socket.
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> ChunkSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.writer.write_all(&chunk).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

//! Component B — HTTP/1.1 client subset.
//!
//! Issues `HEAD` (size probe) and ranged `GET` requests, parses the
//! status line and headers with `httparse`, then streams the body
//! through either length-delimited or chunked decoding. A fresh
//! connection is opened per request (§6) — there is no keep-alive.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::transport::Transport;
use crate::uri::PackageUri;
use dwl_core::wire::UpdateResult;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const READ_CHUNK: usize = 8 * 1024;

/// Connect/read deadlines, sourced from `RetryConfig` (§4.J). A fresh
/// connection is opened per request, so `connect_ms` bounds each `head`/
/// `get_range` call's handshake and `read_ms` bounds each socket read
/// (head line, headers, and every body read alike).
#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub connect_ms: u64,
    pub read_ms: u64,
}

impl HttpTimeouts {
    pub fn from_retry_config(config: &dwl_core::config::RetryConfig) -> Self {
        Self { connect_ms: config.connect_timeout_ms, read_ms: config.read_timeout_ms }
    }

    fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("invalid request argument")]
    InvalidArg,
    #[error("connection error: {0}")]
    ConnectionError(#[from] crate::transport::TransportError),
    #[error("send error: {0}")]
    SendError(std::io::Error),
    #[error("receive error: {0}")]
    RecvError(std::io::Error),
    #[error("malformed response")]
    Malformed,
    #[error("request timed out")]
    Timeout,
    #[error("out of memory assembling response headers")]
    Memory,
    #[error("server returned HTTP {0}")]
    Error(u16),
    #[error("connection closed before Content-Length was satisfied")]
    Partial,
}

impl HttpError {
    /// Whether a size-probe attempt at this error is worth retrying with
    /// a fresh connection (§4.B retry policy).
    pub fn is_retriable_for_head(&self) -> bool {
        matches!(
            self,
            HttpError::ConnectionError(_)
                | HttpError::SendError(_)
                | HttpError::RecvError(_)
                | HttpError::Timeout
        )
    }

    /// Maps a terminal HTTP failure onto the update-result taxonomy used
    /// by the controller (§4.G step 1).
    pub fn classify(&self) -> UpdateResult {
        match self {
            HttpError::ConnectionError(_)
            | HttpError::SendError(_)
            | HttpError::RecvError(_)
            | HttpError::Timeout
            | HttpError::Partial => UpdateResult::ConnectionLost,
            HttpError::Error(status) if (400..500).contains(status) => UpdateResult::InvalidUri,
            HttpError::Error(_) => UpdateResult::ConnectionLost,
            HttpError::InvalidArg | HttpError::Malformed | HttpError::Memory => {
                UpdateResult::UpdateFailed
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub chunked: bool,
}

/// Issues `HEAD <path> HTTP/1.1`. Retries are the caller's
/// responsibility (the controller owns the N=3 policy).
pub async fn head(
    uri: &PackageUri,
    user_agent: &str,
    timeouts: HttpTimeouts,
) -> Result<HttpResponse, HttpError> {
    let mut transport = timeout(timeouts.connect(), crate::transport::connect(uri))
        .await
        .map_err(|_| HttpError::Timeout)??;
    let request = format!(
        "HEAD {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\n\r\n",
        uri.path, uri.host, user_agent
    );
    timeout(timeouts.read(), transport.write_all(request.as_bytes()))
        .await
        .map_err(|_| HttpError::Timeout)?
        .map_err(HttpError::SendError)?;
    let (response, _leftover) = read_response_head(&mut transport, timeouts).await?;
    if response.status >= 300 {
        return Err(HttpError::Error(response.status));
    }
    Ok(response)
}

/// Issues `GET <path> HTTP/1.1` with a `Range: bytes=<offset>-` header
/// and returns the parsed response head plus a body reader positioned
/// right after the headers.
pub async fn get_range(
    uri: &PackageUri,
    offset: u64,
    user_agent: &str,
    timeouts: HttpTimeouts,
) -> Result<(HttpResponse, BodyReader), HttpError> {
    let mut transport = timeout(timeouts.connect(), crate::transport::connect(uri))
        .await
        .map_err(|_| HttpError::Timeout)??;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nRange: bytes={}-\r\nUser-Agent: {}\r\n\r\n",
        uri.path, uri.host, offset, user_agent
    );
    timeout(timeouts.read(), transport.write_all(request.as_bytes()))
        .await
        .map_err(|_| HttpError::Timeout)?
        .map_err(HttpError::SendError)?;
    let (response, leftover) = read_response_head(&mut transport, timeouts).await?;
    if response.status >= 300 {
        return Err(HttpError::Error(response.status));
    }
    let reader = BodyReader::new(transport, &response, leftover, timeouts.read());
    Ok((response, reader))
}

/// Reads and parses the status line + headers, returning any body bytes
/// that were already read into the same TCP segment.
async fn read_response_head(
    transport: &mut Transport,
    timeouts: HttpTimeouts,
) -> Result<(HttpResponse, Vec<u8>), HttpError> {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        if buf.len() > MAX_HEADER_BYTES {
            return Err(HttpError::Memory);
        }
        let mut scratch = [0u8; READ_CHUNK];
        let n = timeout(timeouts.read(), transport.read(&mut scratch))
            .await
            .map_err(|_| HttpError::Timeout)?
            .map_err(HttpError::RecvError)?;
        if n == 0 {
            return Err(HttpError::Partial);
        }
        buf.extend_from_slice(&scratch[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut parsed = httparse::Response::new(&mut headers);
        match parsed.parse(&buf).map_err(|_| HttpError::Malformed)? {
            httparse::Status::Complete(consumed) => {
                let status = parsed.code.ok_or(HttpError::Malformed)?;
                let mut content_length = None;
                let mut chunked = false;
                for header in parsed.headers.iter() {
                    if header.name.eq_ignore_ascii_case("content-length") {
                        content_length = std::str::from_utf8(header.value)
                            .ok()
                            .and_then(|v| v.trim().parse().ok());
                    } else if header.name.eq_ignore_ascii_case("transfer-encoding")
                        && std::str::from_utf8(header.value)
                            .map(|v| v.to_ascii_lowercase().contains("chunked"))
                            .unwrap_or(false)
                    {
                        chunked = true;
                    }
                }
                let leftover = buf[consumed..].to_vec();
                return Ok((HttpResponse { status, content_length, chunked }, leftover));
            }
            httparse::Status::Partial => continue,
        }
    }
}

// ── Body decoding ─────────────────────────────────────────────────────────────

enum BodyMode {
    Length { remaining: u64 },
    Chunked(ChunkedDecoder),
}

/// Streams the HTTP response body, one read at a time, decoding either a
/// `Content-Length` or `Transfer-Encoding: chunked` body.
pub struct BodyReader {
    transport: Transport,
    mode: BodyMode,
    pending: BytesMut,
    read_timeout: Duration,
}

impl BodyReader {
    fn new(transport: Transport, response: &HttpResponse, leftover: Vec<u8>, read_timeout: Duration) -> Self {
        let mode = if response.chunked {
            BodyMode::Chunked(ChunkedDecoder::new())
        } else {
            BodyMode::Length { remaining: response.content_length.unwrap_or(u64::MAX) }
        };
        Self { transport, mode, pending: BytesMut::from(leftover.as_slice()), read_timeout }
    }

    /// Returns the next chunk of decoded body bytes, or `None` once the
    /// body is fully consumed.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        loop {
            match &mut self.mode {
                BodyMode::Length { remaining } => {
                    if *remaining == 0 {
                        return Ok(None);
                    }
                    if !self.pending.is_empty() {
                        let take = (self.pending.len() as u64).min(*remaining) as usize;
                        let out = self.pending.split_to(take);
                        *remaining -= take as u64;
                        return Ok(Some(out.freeze()));
                    }
                    let mut scratch = [0u8; READ_CHUNK];
                    let n = timeout(self.read_timeout, self.transport.read(&mut scratch))
                        .await
                        .map_err(|_| HttpError::Timeout)?
                        .map_err(HttpError::RecvError)?;
                    if n == 0 {
                        return Err(HttpError::Partial);
                    }
                    let take = (n as u64).min(*remaining) as usize;
                    *remaining -= take as u64;
                    return Ok(Some(Bytes::copy_from_slice(&scratch[..take])));
                }
                BodyMode::Chunked(decoder) => {
                    if decoder.is_done() {
                        return Ok(None);
                    }
                    if self.pending.is_empty() {
                        let mut scratch = [0u8; READ_CHUNK];
                        let n = timeout(self.read_timeout, self.transport.read(&mut scratch))
                            .await
                            .map_err(|_| HttpError::Timeout)?
                            .map_err(HttpError::RecvError)?;
                        if n == 0 {
                            return Err(HttpError::Partial);
                        }
                        self.pending.extend_from_slice(&scratch[..n]);
                    }
                    let mut out = Vec::new();
                    let consumed = decoder.feed(&self.pending, &mut out)?;
                    let _ = self.pending.split_to(consumed);
                    if !out.is_empty() {
                        return Ok(Some(Bytes::from(out)));
                    }
                    if decoder.is_done() {
                        return Ok(None);
                    }
                    // Consumed bytes but produced no payload (e.g. a
                    // size line); loop for more input.
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: usize },
    DataCrlf,
    Trailer,
    Done,
}

/// Hand-rolled RFC 7230 §4.1 chunked transfer-coding decoder. Kept as its
/// own small state machine (distinct from the length-delimited path)
/// since it has to tolerate arbitrary TCP segmentation of chunk-size
/// lines, chunk data, and trailers.
struct ChunkedDecoder {
    state: ChunkState,
}

impl ChunkedDecoder {
    fn new() -> Self {
        Self { state: ChunkState::Size }
    }

    fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Consumes as much of `input` as can be fully decoded, appending
    /// payload bytes to `out`. Returns the number of input bytes
    /// consumed; anything left over needs more bytes from the socket.
    fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize, HttpError> {
        let mut pos = 0;
        loop {
            match &mut self.state {
                ChunkState::Size => match find_crlf(&input[pos..]) {
                    Some(line_len) => {
                        let line = &input[pos..pos + line_len];
                        let text = std::str::from_utf8(line).map_err(|_| HttpError::Malformed)?;
                        let size_text = text.split(';').next().unwrap_or(text).trim();
                        let size = usize::from_str_radix(size_text, 16)
                            .map_err(|_| HttpError::Malformed)?;
                        pos += line_len + 2;
                        self.state = if size == 0 {
                            ChunkState::Trailer
                        } else {
                            ChunkState::Data { remaining: size }
                        };
                    }
                    None => return Ok(pos),
                },
                ChunkState::Data { remaining } => {
                    let available = input.len() - pos;
                    if available == 0 {
                        return Ok(pos);
                    }
                    let take = available.min(*remaining);
                    out.extend_from_slice(&input[pos..pos + take]);
                    pos += take;
                    *remaining -= take;
                    if *remaining == 0 {
                        self.state = ChunkState::DataCrlf;
                    } else {
                        return Ok(pos);
                    }
                }
                ChunkState::DataCrlf => {
                    if input.len() - pos < 2 {
                        return Ok(pos);
                    }
                    pos += 2;
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => match find_crlf(&input[pos..]) {
                    Some(0) => {
                        pos += 2;
                        self.state = ChunkState::Done;
                        return Ok(pos);
                    }
                    Some(line_len) => {
                        pos += line_len + 2;
                    }
                    None => return Ok(pos),
                },
                ChunkState::Done => return Ok(pos),
            }
        }
    }
}

fn find_crlf(input: &[u8]) -> Option<usize> {
    input.windows(2).position(|w| w == b"\r\n")
}

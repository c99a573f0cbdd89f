//! gRPC-Web wire format.
//!
//! This module provides:
//! - Request header and body construction for both wire encodings.
//! - [`FrameDecoder`]: a stream adapter that reassembles gRPC-Web frames
//!   from an arbitrarily chunked response body.
//! - Status and metadata derivation from response headers and trailers.

use std::pin::Pin;
use std::task::{Context, Poll};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::Stream;
use http::{HeaderMap, HeaderName, HeaderValue};
use pbweb_rpc::{Code, Metadata, MetadataValue, RpcError, RpcStatus, Timeout, is_binary_key};

/// Frame type byte preceding each length-delimited payload.
const DATA: u8 = 0x00;
const TRAILER: u8 = 0x80;

/// 1 type byte + 4 big-endian length bytes.
const FRAME_HEADER_SIZE: usize = 5;

/// Wire encoding of frames on the HTTP body.
///
/// `Text` wraps the binary frames in base64 for clients that cannot read
/// binary response bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GrpcWebFormat {
    /// Raw frames, `application/grpc-web+proto`.
    #[default]
    Binary,
    /// Base64-encoded frames, `application/grpc-web-text`.
    Text,
}

impl GrpcWebFormat {
    /// The request `Content-Type` announcing this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            GrpcWebFormat::Binary => "application/grpc-web+proto",
            GrpcWebFormat::Text => "application/grpc-web-text",
        }
    }
}

/// One frame read off a response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A length-delimited response message.
    Data(Bytes),
    /// The trailer block: every byte after the final frame header.
    Trailer(Bytes),
}

/// Build the HTTP request headers for a call.
///
/// Caller metadata goes in first; the protocol headers (`Content-Type`,
/// `Accept`, `X-Grpc-Web`, `X-User-Agent`, `grpc-timeout`) then overwrite
/// any metadata entry of the same name. Binary metadata values are
/// base64-encoded.
///
/// A timeout that already elapsed fails here with `DEADLINE_EXCEEDED`,
/// before any network traffic: `grpc-timeout` must be a positive integer.
pub fn write_request_headers(
    meta: &Metadata,
    format: GrpcWebFormat,
    timeout: Option<Timeout>,
    user_agent: Option<&str>,
) -> Result<HeaderMap, RpcError> {
    let mut headers = HeaderMap::new();
    for (key, value) in meta.iter() {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| RpcError::invalid_argument(format!("invalid metadata key: {key}")))?;
        let value = match value {
            MetadataValue::Ascii(text) => HeaderValue::from_str(text).map_err(|_| {
                RpcError::invalid_argument(format!("invalid metadata value under {key}"))
            })?,
            MetadataValue::Binary(raw) => HeaderValue::from_str(&STANDARD.encode(raw))
                .expect("base64 is a valid header value"),
        };
        headers.append(name, value);
    }

    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    if format == GrpcWebFormat::Text {
        headers.insert(
            http::header::ACCEPT,
            HeaderValue::from_static("application/grpc-web-text"),
        );
    }
    headers.insert(
        HeaderName::from_static("x-grpc-web"),
        HeaderValue::from_static("1"),
    );
    if let Some(agent) = user_agent {
        headers.insert(
            HeaderName::from_static("x-user-agent"),
            HeaderValue::from_str(agent)
                .map_err(|_| RpcError::invalid_argument("invalid user agent"))?,
        );
    }

    if let Some(timeout) = timeout {
        let ms = match timeout {
            Timeout::Duration(duration) => {
                if duration.is_zero() {
                    return Err(RpcError::deadline_exceeded(format!(
                        "timeout {} ms exceeded",
                        duration.as_millis()
                    )));
                }
                duration.as_millis().max(1)
            }
            Timeout::Deadline(at) => match timeout.remaining() {
                Some(left) => left.as_millis().max(1),
                None => {
                    return Err(RpcError::deadline_exceeded(format!(
                        "deadline {at:?} exceeded"
                    )));
                }
            },
        };
        headers.insert(
            HeaderName::from_static("grpc-timeout"),
            HeaderValue::from_str(&format!("{ms}m")).expect("integer milliseconds are ASCII"),
        );
    }

    Ok(headers)
}

/// Pack a serialized message into a single DATA frame.
///
/// In text format the whole frame, header included, is base64-encoded.
pub fn write_request_body(message: &[u8], format: GrpcWebFormat) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + message.len());
    frame.put_u8(DATA);
    frame.put_u32(message.len() as u32);
    frame.extend_from_slice(message);
    match format {
        GrpcWebFormat::Binary => frame.freeze(),
        GrpcWebFormat::Text => Bytes::from(STANDARD.encode(&frame)),
    }
}

/// Determine the body encoding from the response `Content-Type`.
///
/// A missing `+proto` suffix means proto, per the protocol's default.
pub fn parse_format(content_type: Option<&str>) -> Result<GrpcWebFormat, RpcError> {
    match content_type {
        Some("application/grpc-web-text") | Some("application/grpc-web-text+proto") => {
            Ok(GrpcWebFormat::Text)
        }
        Some("application/grpc-web") | Some("application/grpc-web+proto") => {
            Ok(GrpcWebFormat::Binary)
        }
        None => Err(RpcError::internal("missing response content type")),
        Some(other) => Err(RpcError::internal(format!(
            "unexpected response content type: {other}"
        ))),
    }
}

/// Parse `grpc-status` / `grpc-message` from response headers.
///
/// Either may be absent. A repeated `grpc-message`, or a repeated,
/// non-numeric or out-of-range `grpc-status`, yields an `INTERNAL`
/// substitute instead.
pub fn parse_status(headers: &HeaderMap) -> (Option<Code>, Option<String>) {
    parse_status_pairs(&header_pairs(headers))
}

/// Collect response metadata, skipping the protocol's own headers.
///
/// Repeated keys keep their order; `-bin` values decode from base64.
pub fn parse_metadata(headers: &HeaderMap) -> Metadata {
    parse_metadata_pairs(&header_pairs(headers))
}

/// Derive (code, message, metadata) from the header block of a response.
///
/// When the headers carry no error but the HTTP status is not 2xx, the
/// HTTP status substitutes: its gRPC mapping as the code, its canonical
/// reason as the message.
pub fn read_response_header(
    http_status: http::StatusCode,
    headers: &HeaderMap,
) -> (Option<Code>, Option<String>, Metadata) {
    let pairs = header_pairs(headers);
    let meta = parse_metadata_pairs(&pairs);
    let (mut code, mut message) = parse_status_pairs(&pairs);
    if matches!(code, None | Some(Code::Ok)) && !http_status.is_success() {
        code = Some(http_status_to_grpc(http_status.as_u16()));
        message = Some(
            http_status
                .canonical_reason()
                .unwrap_or_default()
                .to_owned(),
        );
    }
    (code, message, meta)
}

/// Derive the final status and trailer metadata from a TRAILER frame.
///
/// The payload is an ASCII header block: CRLF-separated `Key: value`
/// lines, values may themselves contain `:`. An absent `grpc-status`
/// means OK.
pub fn read_response_trailer(data: &[u8]) -> (RpcStatus, Metadata) {
    let pairs = parse_trailer(data);
    let (code, detail) = parse_status_pairs(&pairs);
    let meta = parse_metadata_pairs(&pairs);
    (
        RpcStatus::new(code.unwrap_or(Code::Ok), detail.unwrap_or_default()),
        meta,
    )
}

/// Map an HTTP status to the equivalent gRPC code.
pub fn http_status_to_grpc(http_status: u16) -> Code {
    match http_status {
        200 => Code::Ok,
        400 => Code::InvalidArgument,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::NotFound,
        409 => Code::Aborted,
        412 => Code::FailedPrecondition,
        429 => Code::ResourceExhausted,
        499 => Code::Cancelled,
        500 => Code::Unknown,
        501 => Code::Unimplemented,
        503 => Code::Unavailable,
        504 => Code::DeadlineExceeded,
        _ => Code::Unknown,
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

fn parse_status_pairs(pairs: &[(String, String)]) -> (Option<Code>, Option<String>) {
    let mut messages = pairs.iter().filter(|(k, _)| k == "grpc-message");
    let message = match (messages.next(), messages.next()) {
        (None, _) => None,
        (Some((_, m)), None) => Some(m.clone()),
        (Some(_), Some(_)) => {
            return (Some(Code::Internal), Some("invalid grpc-web message".to_owned()));
        }
    };
    let mut statuses = pairs.iter().filter(|(k, _)| k == "grpc-status");
    let code = match (statuses.next(), statuses.next()) {
        (None, _) => None,
        (Some((_, s)), None) => match s.trim().parse::<i32>().ok().and_then(Code::from_i32) {
            Some(code) => Some(code),
            None => {
                return (Some(Code::Internal), Some("invalid grpc-web status".to_owned()));
            }
        },
        (Some(_), Some(_)) => {
            return (Some(Code::Internal), Some("invalid grpc-web status".to_owned()));
        }
    };
    (code, message)
}

fn parse_metadata_pairs(pairs: &[(String, String)]) -> Metadata {
    let mut meta = Metadata::new();
    for (key, value) in pairs {
        if matches!(key.as_str(), "grpc-status" | "grpc-message" | "content-type") {
            continue;
        }
        if is_binary_key(key) {
            // servers may or may not pad -bin values
            match STANDARD_NO_PAD.decode(value.trim_end_matches('=')) {
                Ok(raw) => meta.append(key.as_str(), Bytes::from(raw)),
                Err(_) => meta.append(key.as_str(), value.as_str()),
            };
        } else {
            meta.append(key.as_str(), value.as_str());
        }
    }
    meta
}

fn parse_trailer(data: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(data);
    let mut pairs = Vec::new();
    for line in text.trim().split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').unwrap_or((line, ""));
        pairs.push((key.trim().to_ascii_lowercase(), value.trim().to_owned()));
    }
    pairs
}

/// Stream adapter that reassembles gRPC-Web frames from a response body.
///
/// Handles arbitrary chunk boundaries. In text format, base64 decodes
/// incrementally: only the longest multiple-of-four prefix of buffered
/// characters is decoded, the remainder waits for more data.
///
/// DATA frames are emitted as soon as their payload is complete. The
/// TRAILER frame is only emitted at end of input, carrying every byte
/// after its 5-byte header; its length field is not validated, matching
/// servers that put the whole trailer block in one frame. End of input
/// with a non-empty buffer that is not a trailer frame is `DATA_LOSS`
/// "premature EOF"; an empty buffer is a clean end (the status then comes
/// from the response headers).
pub struct FrameDecoder<S> {
    /// The underlying chunk stream.
    stream: S,
    format: GrpcWebFormat,
    /// Base64 characters waiting for a complete quad (text format only).
    base64: Vec<u8>,
    /// Decoded bytes not yet consumed by a frame.
    buffer: BytesMut,
    /// Whether the stream has finished (end of input or error).
    finished: bool,
}

impl<S> FrameDecoder<S> {
    pub fn new(stream: S, format: GrpcWebFormat) -> Self {
        Self {
            stream,
            format,
            base64: Vec::new(),
            buffer: BytesMut::new(),
            finished: false,
        }
    }

    /// Pop the next complete DATA frame off the buffer, if any.
    fn try_parse_data(&mut self) -> Option<Frame> {
        if self.buffer.len() < FRAME_HEADER_SIZE || self.buffer[0] != DATA {
            return None;
        }
        let length = u32::from_be_bytes([
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
            self.buffer[4],
        ]) as usize;
        if self.buffer.len() - FRAME_HEADER_SIZE < length {
            return None;
        }
        let mut frame = self.buffer.split_to(FRAME_HEADER_SIZE + length);
        frame.advance(FRAME_HEADER_SIZE);
        Some(Frame::Data(frame.freeze()))
    }

    fn absorb(&mut self, chunk: &[u8]) -> Result<(), RpcError> {
        match self.format {
            GrpcWebFormat::Binary => self.buffer.extend_from_slice(chunk),
            GrpcWebFormat::Text => {
                self.base64.extend_from_slice(chunk);
                let safe = self.base64.len() - self.base64.len() % 4;
                if safe == 0 {
                    return Ok(());
                }
                let decoded = STANDARD
                    .decode(&self.base64[..safe])
                    .map_err(|_| RpcError::data_loss("invalid base64 in response body"))?;
                self.buffer.extend_from_slice(&decoded);
                self.base64.drain(..safe);
            }
        }
        Ok(())
    }

    /// End of input: the leftover bytes must form exactly one trailer frame.
    fn take_trailer(&mut self) -> Result<Option<Frame>, RpcError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        if self.buffer[0] != TRAILER || self.buffer.len() < FRAME_HEADER_SIZE {
            return Err(RpcError::data_loss("premature EOF"));
        }
        let mut rest = self.buffer.split();
        rest.advance(FRAME_HEADER_SIZE);
        Ok(Some(Frame::Trailer(rest.freeze())))
    }
}

impl<S> Unpin for FrameDecoder<S> where S: Unpin {}

impl<S> Stream for FrameDecoder<S>
where
    S: Stream<Item = Result<Bytes, RpcError>> + Unpin,
{
    type Item = Result<Frame, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some(frame) = this.try_parse_data() {
                return Poll::Ready(Some(Ok(frame)));
            }

            match Pin::new(&mut this.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if let Err(err) = this.absorb(&chunk) {
                        this.finished = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    return match this.take_trailer() {
                        Ok(Some(frame)) => Poll::Ready(Some(Ok(frame))),
                        Ok(None) => Poll::Ready(None),
                        Err(err) => Poll::Ready(Some(Err(err))),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

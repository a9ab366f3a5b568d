use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::error::{Result, YurpcError};
use crate::protocol::{Request, Response};

/// Size of the big-endian length prefix in front of every frame
pub const LENGTH_FIELD_LEN: usize = 4;

/// Length-prefixed frame codec.
///
/// Each frame is a 4-byte big-endian payload length `N` followed by exactly
/// `N` bytes of UTF-8 text. Decoding is incremental: a frame is only emitted
/// once all of its bytes are buffered, and the length prefix of an incomplete
/// frame is left in the buffer so it is read again on the next attempt.
/// Consumed bytes are split off the buffer, so it only ever holds the
/// unfinished tail.
///
/// The codec has no size cap of its own. Transports that want one install it
/// with [`with_max_length`](Self::with_max_length).
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use yurpc_common::transport::FrameCodec;
///
/// let frame = FrameCodec::encode_frame("{\"id\":1}");
/// let mut codec = FrameCodec::new();
///
/// // Only part of the frame has arrived
/// let mut buf = BytesMut::from(&frame[..3]);
/// assert!(codec.decode_all(&mut buf).unwrap().is_empty());
///
/// // The rest arrives
/// buf.extend_from_slice(&frame[3..]);
/// assert_eq!(codec.decode_all(&mut buf).unwrap(), vec!["{\"id\":1}".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    max_length: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self { max_length: None }
    }

    /// Rejects frames whose declared payload length exceeds `max_length`.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Encodes one payload into a complete frame.
    pub fn encode_frame(payload: &str) -> Bytes {
        let mut dst = BytesMut::with_capacity(LENGTH_FIELD_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload.as_bytes());
        dst.freeze()
    }

    /// Decodes every complete frame currently in `src`.
    ///
    /// Returns an empty vector when no complete frame is buffered yet; any
    /// partial frame stays in `src` for the next call.
    pub fn decode_all(&mut self, src: &mut BytesMut) -> Result<Vec<String>> {
        let mut payloads = Vec::new();
        while let Some(payload) = self.decode(src)? {
            payloads.push(payload);
        }
        Ok(payloads)
    }

    fn check_length(&self, length: usize) -> Result<()> {
        match self.max_length {
            Some(max) if length > max => Err(YurpcError::FrameTooLarge { size: length, max }),
            _ => Ok(()),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = YurpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LENGTH_FIELD_LEN {
            return Ok(None);
        }

        // Peek at the length, don't consume it yet
        let mut length_bytes = [0u8; LENGTH_FIELD_LEN];
        length_bytes.copy_from_slice(&src[..LENGTH_FIELD_LEN]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        self.check_length(length)?;

        if src.len() - LENGTH_FIELD_LEN < length {
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_LEN);
        let payload = src.split_to(length);
        Ok(Some(String::from_utf8(payload.to_vec())?))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = YurpcError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.check_length(item.len())?;
        dst.reserve(LENGTH_FIELD_LEN + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

/// JSON envelope codec for the frame payload.
///
/// Requests and responses are serialized as JSON objects; the text is what
/// [`FrameCodec`] carries inside each frame.
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &Request) -> Result<String> {
        Ok(serde_json::to_string(request)?)
    }

    pub fn decode_request(data: &str) -> Result<Request> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn encode_response(response: &Response) -> Result<String> {
        Ok(serde_json::to_string(response)?)
    }

    pub fn decode_response(data: &str) -> Result<Response> {
        Ok(serde_json::from_str(data)?)
    }
}

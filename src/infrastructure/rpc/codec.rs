//! Binary wire format of the RPC transport.
//!
//! Every message is a frame:
//!
//! ```text
//! [u32 BE length] [payload]
//! ```
//!
//! Request payload is a method byte followed by its body:
//!
//! ```text
//! 1 UpdateMetric        metric
//! 2 BatchUpdateMetrics  u32 count, metric * count
//!
//! metric := u16 id_len, id, u8 kind (1 counter, 2 gauge),
//!           u8 flags (bit0 delta, bit1 value, bit2 hash),
//!           [i64 delta], [f64 value], [u16 hash_len, hash]
//! ```
//!
//! Response payload is `u8 status, u16 msg_len, msg`.

use crate::domain::errors::{InvalidReason, MetricError};
use crate::domain::metric::{Metric, MetricKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const METHOD_UPDATE: u8 = 1;
const METHOD_BATCH: u8 = 2;

const TAG_COUNTER: u8 = 1;
const TAG_GAUGE: u8 = 2;

const FLAG_DELTA: u8 = 0b001;
const FLAG_VALUE: u8 = 0b010;
const FLAG_HASH: u8 = 0b100;

#[derive(Debug, Clone, PartialEq)]
pub enum RpcRequest {
    UpdateMetric(Metric),
    BatchUpdateMetrics(Vec<Metric>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RpcStatus {
    Ok = 0,
    InvalidArgument = 1,
    Unimplemented = 2,
    Internal = 3,
}

impl RpcStatus {
    fn from_byte(byte: u8) -> Result<Self, MetricError> {
        match byte {
            0 => Ok(RpcStatus::Ok),
            1 => Ok(RpcStatus::InvalidArgument),
            2 => Ok(RpcStatus::Unimplemented),
            3 => Ok(RpcStatus::Internal),
            other => Err(MetricError::Decode(format!("unknown status {}", other))),
        }
    }
}

impl From<&MetricError> for RpcStatus {
    fn from(err: &MetricError) -> Self {
        match err {
            MetricError::InvalidMetric(_)
            | MetricError::SignatureMismatch { .. }
            | MetricError::NoValue
            | MetricError::Decode(_) => RpcStatus::InvalidArgument,
            MetricError::Unimplemented(_) => RpcStatus::Unimplemented,
            _ => RpcStatus::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub status: RpcStatus,
    pub message: String,
}

impl RpcResponse {
    pub fn ok() -> Self {
        Self {
            status: RpcStatus::Ok,
            message: String::new(),
        }
    }

    pub fn from_error(err: &MetricError) -> Self {
        Self {
            status: RpcStatus::from(err),
            message: err.to_string(),
        }
    }

    /// Turn a non-ok status back into an error on the client side.
    pub fn into_result(self) -> Result<(), MetricError> {
        match self.status {
            RpcStatus::Ok => Ok(()),
            RpcStatus::Unimplemented => Err(MetricError::Unimplemented("rpc method")),
            RpcStatus::InvalidArgument => Err(MetricError::Transport(format!(
                "invalid argument: {}",
                self.message
            ))),
            RpcStatus::Internal => Err(MetricError::Transport(format!(
                "internal: {}",
                self.message
            ))),
        }
    }
}

pub fn encode_request(request: &RpcRequest) -> Result<Vec<u8>, MetricError> {
    let mut buf = Vec::new();
    match request {
        RpcRequest::UpdateMetric(metric) => {
            buf.push(METHOD_UPDATE);
            encode_metric(&mut buf, metric)?;
        }
        RpcRequest::BatchUpdateMetrics(metrics) => {
            buf.push(METHOD_BATCH);
            let count = u32::try_from(metrics.len())
                .map_err(|_| MetricError::Decode("batch too large".to_string()))?;
            buf.extend_from_slice(&count.to_be_bytes());
            for metric in metrics {
                encode_metric(&mut buf, metric)?;
            }
        }
    }
    Ok(buf)
}

pub fn decode_request(payload: &[u8]) -> Result<RpcRequest, MetricError> {
    let mut reader = Reader::new(payload);
    let request = match reader.u8()? {
        METHOD_UPDATE => RpcRequest::UpdateMetric(decode_metric(&mut reader)?),
        METHOD_BATCH => {
            let count = reader.u32()? as usize;
            // Each metric takes at least 4 bytes, so a bogus count fails fast
            if count > reader.remaining() / 4 {
                return Err(MetricError::Decode(format!(
                    "batch count {} exceeds payload",
                    count
                )));
            }
            let mut metrics = Vec::with_capacity(count);
            for _ in 0..count {
                metrics.push(decode_metric(&mut reader)?);
            }
            RpcRequest::BatchUpdateMetrics(metrics)
        }
        _ => return Err(MetricError::Unimplemented("rpc method")),
    };
    reader.finish()?;
    Ok(request)
}

pub fn encode_response(response: &RpcResponse) -> Vec<u8> {
    let message = truncate_utf8(&response.message, u16::MAX as usize);
    let mut buf = Vec::with_capacity(3 + message.len());
    buf.push(response.status as u8);
    buf.extend_from_slice(&(message.len() as u16).to_be_bytes());
    buf.extend_from_slice(message.as_bytes());
    buf
}

pub fn decode_response(payload: &[u8]) -> Result<RpcResponse, MetricError> {
    let mut reader = Reader::new(payload);
    let status = RpcStatus::from_byte(reader.u8()?)?;
    let len = reader.u16()? as usize;
    let message = String::from_utf8_lossy(reader.bytes(len)?).into_owned();
    reader.finish()?;
    Ok(RpcResponse { status, message })
}

fn encode_metric(buf: &mut Vec<u8>, metric: &Metric) -> Result<(), MetricError> {
    let id_len = u16::try_from(metric.id.len())
        .map_err(|_| MetricError::Decode(format!("metric id too long: {}", metric.id.len())))?;
    buf.extend_from_slice(&id_len.to_be_bytes());
    buf.extend_from_slice(metric.id.as_bytes());
    buf.push(match metric.kind {
        MetricKind::Counter => TAG_COUNTER,
        MetricKind::Gauge => TAG_GAUGE,
    });

    let mut flags = 0;
    if metric.delta.is_some() {
        flags |= FLAG_DELTA;
    }
    if metric.value.is_some() {
        flags |= FLAG_VALUE;
    }
    if metric.hash.is_some() {
        flags |= FLAG_HASH;
    }
    buf.push(flags);

    if let Some(delta) = metric.delta {
        buf.extend_from_slice(&delta.to_be_bytes());
    }
    if let Some(value) = metric.value {
        buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }
    if let Some(hash) = &metric.hash {
        let hash_len = u16::try_from(hash.len())
            .map_err(|_| MetricError::Decode("hash too long".to_string()))?;
        buf.extend_from_slice(&hash_len.to_be_bytes());
        buf.extend_from_slice(hash.as_bytes());
    }
    Ok(())
}

fn decode_metric(reader: &mut Reader<'_>) -> Result<Metric, MetricError> {
    let id_len = reader.u16()? as usize;
    let id = reader.string(id_len)?;
    let kind = match reader.u8()? {
        TAG_COUNTER => MetricKind::Counter,
        TAG_GAUGE => MetricKind::Gauge,
        other => {
            return Err(InvalidReason::UnknownKind(format!("tag {}", other)).into());
        }
    };
    let flags = reader.u8()?;

    let delta = if flags & FLAG_DELTA != 0 {
        Some(reader.i64()?)
    } else {
        None
    };
    let value = if flags & FLAG_VALUE != 0 {
        Some(f64::from_bits(reader.u64()?))
    } else {
        None
    };
    let hash = if flags & FLAG_HASH != 0 {
        let len = reader.u16()? as usize;
        Some(reader.string(len)?)
    } else {
        None
    };

    Ok(Metric {
        id,
        kind,
        delta,
        value,
        hash,
    })
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], MetricError> {
        if self.remaining() < len {
            return Err(MetricError::Decode(format!(
                "truncated payload: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MetricError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MetricError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, MetricError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, MetricError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, MetricError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, MetricError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn string(&mut self, len: usize) -> Result<String, MetricError> {
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| MetricError::Decode(format!("invalid utf-8: {}", e)))
    }

    fn finish(&self) -> Result<(), MetricError> {
        if self.remaining() != 0 {
            return Err(MetricError::Decode(format!(
                "{} trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, MetricError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let read = reader
            .read(&mut len_buf[filled..])
            .await
            .map_err(|e| MetricError::Transport(format!("reading length prefix: {}", e)))?;
        if read == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(MetricError::Transport(format!(
                "connection closed after {} of 4 length prefix bytes",
                filled
            )));
        }
        filled += read;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(MetricError::Decode(format!(
            "frame too large: {} bytes (max {} bytes)",
            len, MAX_FRAME_LEN
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| MetricError::Transport(format!("reading frame: {}", e)))?;
    Ok(Some(buf))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), MetricError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(MetricError::Decode(format!(
            "frame too large: {} bytes (max {} bytes)",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    let len = payload.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| MetricError::Transport(format!("writing length prefix: {}", e)))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| MetricError::Transport(format!("writing frame: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| MetricError::Transport(format!("flushing stream: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_request_layout() {
        let mut signed = Metric::counter("PollCount", 7);
        signed.hash = Some("ab".to_string());
        let request = RpcRequest::BatchUpdateMetrics(vec![signed, Metric::gauge("Alloc", 0.5)]);

        let encoded = encode_request(&request).unwrap();
        assert_eq!(encoded[0], METHOD_BATCH);
        assert_eq!(&encoded[1..5], &2u32.to_be_bytes());
        // id_len, "PollCount", tag, flags
        assert_eq!(&encoded[5..7], &9u16.to_be_bytes());
        assert_eq!(encoded[16], TAG_COUNTER);
        assert_eq!(encoded[17], FLAG_DELTA | FLAG_HASH);

        assert_eq!(decode_request(&encoded).unwrap(), request);
    }

    #[test]
    fn test_unknown_kind_tag_is_invalid_metric() {
        let mut payload = vec![METHOD_UPDATE];
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload.push(b'x');
        payload.push(9);
        payload.push(0);

        let err = decode_request(&payload).unwrap_err();
        assert!(matches!(
            err,
            MetricError::InvalidMetric(InvalidReason::UnknownKind(_))
        ));
        assert_eq!(RpcStatus::from(&err), RpcStatus::InvalidArgument);
    }

    #[test]
    fn test_truncated_metric_is_decode_error() {
        let encoded = encode_request(&RpcRequest::UpdateMetric(Metric::counter("c", 1))).unwrap();
        let err = decode_request(&encoded[..encoded.len() - 3]).unwrap_err();
        assert!(matches!(err, MetricError::Decode(_)));
    }

    #[test]
    fn test_unknown_method_is_unimplemented() {
        let err = decode_request(&[42]).unwrap_err();
        assert_eq!(RpcStatus::from(&err), RpcStatus::Unimplemented);
    }

    #[test]
    fn test_response_maps_back_to_error() {
        let response = RpcResponse::from_error(&MetricError::SignatureMismatch {
            id: "Alloc".into(),
        });
        let decoded = decode_response(&encode_response(&response)).unwrap();
        assert_eq!(decoded.status, RpcStatus::InvalidArgument);
        assert!(decoded.message.contains("Alloc"));
        assert!(decoded.into_result().is_err());
        assert!(RpcResponse::ok().into_result().is_ok());
    }

    #[tokio::test]
    async fn test_frames_over_duplex_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            write_frame(&mut client, b"first").await.unwrap();
            write_frame(&mut client, b"").await.unwrap();
        });

        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), b"");
        writer.await.unwrap();
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_frame(&mut server).await,
            Err(MetricError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0, 0])
            .read(&[0, 4, b'p', b'i'])
            .read(b"ng")
            .build();
        assert_eq!(read_frame(&mut stream).await.unwrap().unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_transport_error() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0, 0, 0, 10, 1, 2])
            .build();
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(MetricError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_length_prefix_is_transport_error() {
        let mut stream = tokio_test::io::Builder::new().read(&[0, 0]).build();
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(MetricError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_eof_between_frames_is_clean_close() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0, 0, 0, 2, 7, 8])
            .build();
        assert_eq!(read_frame(&mut stream).await.unwrap(), Some(vec![7, 8]));
        assert_eq!(read_frame(&mut stream).await.unwrap(), None);
    }
}

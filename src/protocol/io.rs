//! Async frame reading and writing over any byte stream.
//!
//! Reads loop until every declared byte has arrived, so frames split across
//! many partial reads decode the same as frames read in one call. Writes go
//! out as a single vectored write in the common case and resume from the
//! exact byte offset after a partial write.
//!
//! End of stream before the first byte of a frame is a clean close and maps
//! to [`RpcError::ConnectionClosed`]. End of stream inside a frame is an
//! [`std::io::ErrorKind::UnexpectedEof`] I/O error.
//!
//! [`read_request`] and [`read_response`] are not cancel-safe: dropping them
//! part-way loses the bytes already read. [`read_request_buffered`] keeps
//! partial input in a caller-owned buffer and can be dropped at any await.

use std::io::IoSlice;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::frame::{RequestFrame, ResponseFrame};
use super::wire_format::{
    decode_length, encode_length, FrameLimits, ResponseHeader, LENGTH_PREFIX_SIZE,
};
use crate::error::{Result, RpcError};

/// Write a request frame and flush it.
pub async fn write_request<W>(writer: &mut W, frame: &RequestFrame, limits: &FrameLimits) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let name = frame.method().as_bytes();
    limits.check_method_name(name.len() as u64)?;
    limits.check_payload(frame.payload().len() as u64)?;

    let name_len = encode_length(name.len())?;
    let payload_len = encode_length(frame.payload().len())?;
    write_all_vectored(writer, &[&name_len, name, &payload_len, frame.payload()]).await
}

/// Read one request frame.
pub async fn read_request<R>(reader: &mut R, limits: &FrameLimits) -> Result<RequestFrame>
where
    R: AsyncRead + Unpin,
{
    let name_len = decode_length(read_prefix(reader, true).await?);
    limits.check_method_name(u64::from(name_len))?;
    let name = read_payload(reader, name_len).await?;
    let method = String::from_utf8(name.to_vec())
        .map_err(|_| RpcError::Protocol("Method name is not valid UTF-8".to_string()))?;

    let payload_len = decode_length(read_prefix(reader, false).await?);
    limits.check_payload(u64::from(payload_len))?;
    let payload = read_payload(reader, payload_len).await?;

    Ok(RequestFrame::new(method, payload))
}

/// Read one request, keeping partial input in `buf` between calls.
///
/// Bytes that arrive after the frame stay in `buf` for the next call.
pub async fn read_request_buffered<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    limits: &FrameLimits,
) -> Result<RequestFrame>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = take_request(buf, limits)? {
            return Ok(frame);
        }
        if reader.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Err(RpcError::ConnectionClosed);
            }
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream ended with {} bytes of a request buffered", buf.len()),
            )));
        }
    }
}

/// Split one complete request off the front of `buf`, if there is one.
fn take_request(buf: &mut BytesMut, limits: &FrameLimits) -> Result<Option<RequestFrame>> {
    let name_len = match peek_length(buf, 0) {
        Some(len) => len,
        None => return Ok(None),
    };
    limits.check_method_name(u64::from(name_len))?;

    let payload_at = LENGTH_PREFIX_SIZE + name_len as usize;
    let payload_len = match peek_length(buf, payload_at) {
        Some(len) => len,
        None => {
            reserve_to(buf, payload_at + LENGTH_PREFIX_SIZE);
            return Ok(None);
        }
    };
    limits.check_payload(u64::from(payload_len))?;

    let frame_len = payload_at + LENGTH_PREFIX_SIZE + payload_len as usize;
    if buf.len() < frame_len {
        reserve_to(buf, frame_len);
        return Ok(None);
    }

    let mut frame = buf.split_to(frame_len).freeze();
    frame.advance(LENGTH_PREFIX_SIZE);
    let name = frame.split_to(name_len as usize);
    frame.advance(LENGTH_PREFIX_SIZE);

    let method = std::str::from_utf8(&name)
        .map_err(|_| RpcError::Protocol("Method name is not valid UTF-8".to_string()))?;
    Ok(Some(RequestFrame::new(method, frame)))
}

fn peek_length(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + LENGTH_PREFIX_SIZE)?;
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(bytes);
    Some(decode_length(prefix))
}

fn reserve_to(buf: &mut BytesMut, len: usize) {
    if len > buf.len() {
        buf.reserve(len - buf.len());
    }
}

/// Write a response frame and flush it.
pub async fn write_response<W>(writer: &mut W, frame: &ResponseFrame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = frame.header()?.encode()?;
    write_all_vectored(writer, &[&header, frame.payload()]).await
}

/// Read one response frame.
pub async fn read_response<R>(reader: &mut R, limits: &FrameLimits) -> Result<ResponseFrame>
where
    R: AsyncRead + Unpin,
{
    let header = ResponseHeader::decode(read_prefix(reader, true).await?)?;
    limits.check_payload(u64::from(header.payload_length))?;
    let payload = read_payload(reader, header.payload_length).await?;
    Ok(ResponseFrame::from_header(header, payload))
}

async fn read_prefix<R>(reader: &mut R, frame_start: bool) -> Result<[u8; LENGTH_PREFIX_SIZE]>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; LENGTH_PREFIX_SIZE];
    fill_exact(reader, &mut buf, frame_start).await?;
    Ok(buf)
}

async fn read_payload<R>(reader: &mut R, len: u32) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    if len == 0 {
        return Ok(Bytes::new());
    }
    let mut buf = vec![0u8; len as usize];
    fill_exact(reader, &mut buf, false).await?;
    Ok(Bytes::from(buf))
}

/// Read until `buf` is full.
async fn fill_exact<R>(reader: &mut R, buf: &mut [u8], frame_start: bool) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if frame_start && filled == 0 {
                return Err(RpcError::ConnectionClosed);
            }
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream ended after {} of {} bytes", filled, buf.len()),
            )));
        }
        filled += n;
    }
    Ok(())
}

/// Write every segment, resuming after partial vectored writes, then flush.
async fn write_all_vectored<W>(writer: &mut W, segments: &[&[u8]]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = segments.iter().map(|s| s.len()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(segments, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Slices covering everything after the first `skip_bytes` bytes.
fn build_remaining_slices<'a>(segments: &[&'a [u8]], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(segments.len());
    let mut skipped = 0;

    for segment in segments {
        let start = skipped;
        let end = skipped + segment.len();
        if !segment.is_empty() && skip_bytes < end {
            let start_in_segment = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&segment[start_in_segment..]));
        }
        skipped = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::duplex;

    fn limits() -> FrameLimits {
        FrameLimits::default()
    }

    #[tokio::test]
    async fn test_request_bytes_on_wire() {
        let mut out = Vec::new();
        let frame = RequestFrame::new("ab", Bytes::from_static(&[7, 8, 9]));
        write_request(&mut out, &frame, &limits()).await.unwrap();
        assert_eq!(out, vec![2, 0, 0, 0, b'a', b'b', 3, 0, 0, 0, 7, 8, 9]);

        let decoded = read_request(&mut Cursor::new(out), &limits()).await.unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn test_empty_payload_request() {
        let mut out = Vec::new();
        let frame = RequestFrame::new("start", Bytes::new());
        write_request(&mut out, &frame, &limits()).await.unwrap();
        assert_eq!(&out[9..], &[0, 0, 0, 0]);

        let decoded = read_request(&mut Cursor::new(out), &limits()).await.unwrap();
        assert!(decoded.payload().is_empty());
    }

    #[tokio::test]
    async fn test_response_statuses_on_wire() {
        let mut out = Vec::new();
        write_response(&mut out, &ResponseFrame::void()).await.unwrap();
        assert_eq!(out, vec![0, 0, 0, 0]);

        let mut out = Vec::new();
        let frame = ResponseFrame::error(Bytes::from_static(b"xy")).unwrap();
        write_response(&mut out, &frame).await.unwrap();
        assert_eq!(&out[..4], &(-2i32).to_le_bytes());

        let decoded = read_response(&mut Cursor::new(out), &limits()).await.unwrap();
        assert!(decoded.is_error());
        assert_eq!(decoded.payload(), b"xy");
    }

    #[tokio::test]
    async fn test_partial_reads_and_writes() {
        // One-byte buffer forces every read and write to be partial.
        let (mut a, mut b) = duplex(1);
        let payload = Bytes::from((0..=255u8).cycle().take(1000).collect::<Vec<u8>>());
        let frame = RequestFrame::new("on_body_frame", payload);

        let sent = frame.clone();
        let writer = tokio::spawn(async move {
            write_request(&mut a, &sent, &FrameLimits::default()).await.unwrap();
        });

        let decoded = read_request(&mut b, &limits()).await.unwrap();
        writer.await.unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn test_eof_before_frame_is_closed() {
        let result = read_request(&mut Cursor::new(Vec::<u8>::new()), &limits()).await;
        assert!(matches!(result, Err(RpcError::ConnectionClosed)));

        let result = read_response(&mut Cursor::new(Vec::<u8>::new()), &limits()).await;
        assert!(matches!(result, Err(RpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_io_error() {
        // Prefix announces 10 bytes, only 3 follow.
        let bytes = vec![10, 0, 0, 0, 1, 2, 3];
        let result = read_response(&mut Cursor::new(bytes), &limits()).await;
        match result {
            Err(RpcError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }

        // Truncated prefix.
        let result = read_request(&mut Cursor::new(vec![1, 0]), &limits()).await;
        assert!(matches!(result, Err(RpcError::Io(_))));
    }

    #[tokio::test]
    async fn test_oversized_lengths_rejected_before_reading() {
        let small = FrameLimits {
            max_payload_size: 4,
            max_method_name_len: 4,
        };

        let bytes = vec![5, 0, 0, 0];
        let result = read_request(&mut Cursor::new(bytes), &small).await;
        assert!(matches!(result, Err(RpcError::Protocol(_))));

        let bytes = vec![5, 0, 0, 0];
        let result = read_response(&mut Cursor::new(bytes), &small).await;
        assert!(matches!(result, Err(RpcError::Protocol(_))));

        let mut out = Vec::new();
        let frame = RequestFrame::new("ok", Bytes::from_static(b"too long"));
        assert!(write_request(&mut out, &frame, &small).await.is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_name() {
        let bytes = vec![2, 0, 0, 0, 0xff, 0xfe, 0, 0, 0, 0];
        let result = read_request(&mut Cursor::new(bytes), &limits()).await;
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_i32_min_status_rejected() {
        let bytes = i32::MIN.to_le_bytes().to_vec();
        let result = read_response(&mut Cursor::new(bytes), &limits()).await;
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_read_survives_dropped_future() {
        let mut bytes = Vec::new();
        let frame = RequestFrame::new("ping", Bytes::from_static(&[0x91, 0x29]));
        write_request(&mut bytes, &frame, &limits()).await.unwrap();

        let (mut a, mut b) = duplex(1024);
        let mut buf = BytesMut::new();
        a.write_all(&bytes[..6]).await.unwrap();

        let first = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            read_request_buffered(&mut b, &mut buf, &limits()),
        )
        .await;
        assert!(first.is_err());
        assert_eq!(buf.len(), 6);

        a.write_all(&bytes[6..]).await.unwrap();
        let decoded = read_request_buffered(&mut b, &mut buf, &limits())
            .await
            .unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_buffered_read_keeps_following_frame() {
        let mut bytes = Vec::new();
        let first = RequestFrame::new("toggle", Bytes::new());
        let second = RequestFrame::new("brightness", Bytes::from_static(&[0x91, 0x05]));
        write_request(&mut bytes, &first, &limits()).await.unwrap();
        write_request(&mut bytes, &second, &limits()).await.unwrap();

        let mut reader = Cursor::new(bytes);
        let mut buf = BytesMut::new();
        assert_eq!(
            read_request_buffered(&mut reader, &mut buf, &limits()).await.unwrap(),
            first
        );
        assert_eq!(
            read_request_buffered(&mut reader, &mut buf, &limits()).await.unwrap(),
            second
        );
        assert!(matches!(
            read_request_buffered(&mut reader, &mut buf, &limits()).await,
            Err(RpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_buffered_read_limits_and_truncation() {
        let small = FrameLimits {
            max_payload_size: 4,
            max_method_name_len: 4,
        };
        let mut buf = BytesMut::new();
        let result =
            read_request_buffered(&mut Cursor::new(vec![5, 0, 0, 0]), &mut buf, &small).await;
        assert!(matches!(result, Err(RpcError::Protocol(_))));

        let mut buf = BytesMut::new();
        let result =
            read_request_buffered(&mut Cursor::new(vec![2, 0, 0, 0, b'o']), &mut buf, &limits())
                .await;
        match result {
            Err(RpcError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn test_build_remaining_slices_offsets() {
        let a: &[u8] = &[1, 2, 3, 4];
        let b: &[u8] = &[];
        let c: &[u8] = &[5, 6];
        let segments = [a, b, c];

        let all = build_remaining_slices(&segments, 0);
        assert_eq!(all.len(), 2);

        let mid = build_remaining_slices(&segments, 3);
        assert_eq!(mid.len(), 2);
        assert_eq!(&*mid[0], &[4]);
        assert_eq!(&*mid[1], &[5, 6]);

        let tail = build_remaining_slices(&segments, 5);
        assert_eq!(tail.len(), 1);
        assert_eq!(&*tail[0], &[6]);

        assert!(build_remaining_slices(&segments, 6).is_empty());
    }
}

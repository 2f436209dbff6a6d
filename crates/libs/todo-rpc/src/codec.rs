use std::io::{self, ErrorKind};

use rmp_serde::{from_slice, Serializer};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted on either side of a connection.
pub const MAX_FRAME_LEN: usize = 1 << 20;

pub fn encode_frame<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
    // Reserve 4 bytes for the length prefix and serialize directly into the output frame
    // to avoid building a temporary payload buffer.
    let mut framed = Vec::with_capacity(256);
    framed.extend_from_slice(&[0u8; 4]);
    msg.serialize(&mut Serializer::new(&mut framed).with_struct_map())
        .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
    let payload_len = framed
        .len()
        .checked_sub(4)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "missing frame payload"))?;
    if payload_len > MAX_FRAME_LEN {
        return Err(io::Error::new(ErrorKind::InvalidData, "frame too large"));
    }
    let len = u32::try_from(payload_len)
        .map_err(|_| io::Error::new(ErrorKind::InvalidData, "frame too large"))?;
    framed[..4].copy_from_slice(&len.to_be_bytes());
    Ok(framed)
}

pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<T> {
    if bytes.len() < 4 {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "missing frame header"));
    }
    let len = frame_len(&bytes[..4])?;
    if bytes.len() < 4 + len {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "incomplete frame"));
    }
    let payload = &bytes[4..4 + len];
    from_slice(payload).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

/// Read one frame. `Ok(None)` means the peer closed the stream between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = frame_len(&header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    from_slice(&payload)
        .map(Some)
        .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let framed = encode_frame(msg)?;
    writer.write_all(&framed).await?;
    writer.flush().await
}

fn frame_len(header: &[u8]) -> io::Result<usize> {
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&header[..4]);
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(ErrorKind::InvalidData, "frame too large"));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RpcRequest, ServerFrame};
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Probe {
        id: u32,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    }

    #[test]
    fn encode_frame_prefixes_payload_length() {
        let probe = Probe {
            id: 7,
            label: "ready".to_string(),
            note: None,
        };
        let encoded = encode_frame(&probe).expect("encode frame");
        assert!(encoded.len() > 4);

        let mut header = [0u8; 4];
        header.copy_from_slice(&encoded[..4]);
        let len = u32::from_be_bytes(header) as usize;
        assert_eq!(len + 4, encoded.len());

        let decoded: Probe = decode_frame(&encoded).expect("decode frame");
        assert_eq!(decoded, probe);
    }

    #[test]
    fn decode_frame_rejects_short_incomplete_or_oversized_frames() {
        let err = decode_frame::<Probe>(&[1, 2, 3]).expect_err("short header should fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut incomplete = vec![0, 0, 0, 8];
        incomplete.extend_from_slice(&[1, 2, 3, 4]);
        let err = decode_frame::<Probe>(&incomplete).expect_err("incomplete payload should fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let oversized = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let err = decode_frame::<Probe>(&oversized).expect_err("oversized frame should fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn stream_frames_end_cleanly_at_eof() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let probe = Probe {
            id: 1,
            label: "a".into(),
            note: Some("n".into()),
        };
        write_frame(&mut client, &probe).await.expect("write");
        drop(client);

        let first: Option<Probe> = read_frame(&mut server).await.expect("read");
        assert_eq!(first, Some(probe));
        let end: Option<Probe> = read_frame(&mut server).await.expect("eof");
        assert_eq!(end, None);
    }

    #[test]
    fn fuzz_smoke_frame_decoder_does_not_panic() {
        let mut seed = 0xA5A5_5A5A_1234_5678_u64;
        for _ in 0..4_000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let len = ((seed >> 16) as usize) % 512;
            let mut bytes = vec![0_u8; len];
            let mut stream = seed ^ 0x9E37_79B9_7F4A_7C15;
            for byte in &mut bytes {
                stream = stream.rotate_left(9).wrapping_mul(0xD134_2543_DE82_E285);
                *byte = (stream & 0xFF) as u8;
            }

            let _ = decode_frame::<RpcRequest>(&bytes);
            let _ = decode_frame::<ServerFrame>(&bytes);
        }
    }
}

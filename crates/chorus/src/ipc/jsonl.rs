use std::io;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on one frame. Chat histories are the largest payloads.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Writes one value as a single `\n`-terminated JSON line and flushes.
pub async fn write_jsonl<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut frame = serde_json::to_vec(value).map_err(invalid_data)?;
    frame.push(b'\n');
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Reads the next non-blank line and decodes it. `Ok(None)` means the peer
/// closed the connection cleanly.
pub async fn read_jsonl<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut frame = Vec::new();
    loop {
        frame.clear();
        let n = reader.read_until(b'\n', &mut frame).await?;
        if n == 0 {
            return Ok(None);
        }
        if frame.len() > MAX_FRAME_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame exceeds {MAX_FRAME_BYTES} bytes"),
            ));
        }
        if frame.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return serde_json::from_slice(&frame).map(Some).map_err(invalid_data);
    }
}

fn invalid_data(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_protocol::{Event, Request};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (mut tx, rx) = tokio::io::duplex(4096);
        let mut rx = BufReader::new(rx);

        let req = Request {
            r#type: "agent.list".to_owned(),
            id: "r-1".to_owned(),
            payload: serde_json::Value::Null,
        };
        write_jsonl(&mut tx, &req).await.unwrap();
        write_jsonl(&mut tx, &serde_json::json!({"type": "heartbeat", "payload": {"now_ms": 5}}))
            .await
            .unwrap();
        drop(tx);

        let got: Request = read_jsonl(&mut rx).await.unwrap().unwrap();
        assert_eq!(got, req);
        let evt: Event = read_jsonl(&mut rx).await.unwrap().unwrap();
        assert_eq!(evt.r#type, "heartbeat");
        assert_eq!(evt.payload["now_ms"], 5);
        assert!(read_jsonl::<_, Event>(&mut rx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut rx = BufReader::new(rx);
        tx.write_all(b"\n  \r\n{\"ok\":true}\n").await.unwrap();

        let value: serde_json::Value = read_jsonl(&mut rx).await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn garbage_is_invalid_data() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut rx = BufReader::new(rx);
        tx.write_all(b"not json\n").await.unwrap();

        let err = read_jsonl::<_, serde_json::Value>(&mut rx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn last_line_without_newline_is_read() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut rx = BufReader::new(rx);
        tx.write_all(b"{\"n\":1}").await.unwrap();
        drop(tx);

        let value: serde_json::Value = read_jsonl(&mut rx).await.unwrap().unwrap();
        assert_eq!(value["n"], 1);
    }
}

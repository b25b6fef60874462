//! Per-TCP-connection device session (§4.2): decodes inbound frames,
//! dispatches them to a `FrameHandler`, writes responses back in order, and
//! interleaves broadcast events from the rest of the core.

use crate::frame::{Frame, FrameParser};
use async_trait::async_trait;
use station_common::{CoreError, DeviceSessionInfo, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

/// Implemented by whatever owns `StationCore` to turn a decoded request
/// frame into an optional response frame. `None` means no reply is sent
/// (e.g. a malformed command the handler chooses to drop rather than
/// error on).
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle(&self, frame: &Frame, info: &mut DeviceSessionInfo) -> Option<Frame>;
}

/// Drive one device connection until it closes or the read timeout trips.
/// Response frames are written in the order their requests arrived;
/// broadcast events are written as they arrive, interleaved with responses
/// (§4.2: "events may be interleaved with responses").
pub async fn run_session<H: FrameHandler + 'static>(
    stream: TcpStream,
    handler: std::sync::Arc<H>,
    mut events: broadcast::Receiver<Frame>,
    read_timeout: Duration,
) -> Result<()> {
    let remote = stream
        .peer_addr()
        .map_err(|e| CoreError::Protocol(format!("peer_addr: {e}")))?;
    let (mut reader, mut writer) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(bytes) = frame.encode() else { continue };
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut info = DeviceSessionInfo {
        remote,
        connected_at: chrono::Utc::now(),
        last_rx: None,
        last_tx: None,
        sequence_counter: 0,
        crc_errors: 0,
        streaming: false,
    };

    let mut parser = FrameParser::new();
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            read_result = tokio::time::timeout(read_timeout, reader.read(&mut buf)) => {
                let n = match read_result {
                    Ok(Ok(0)) => break,
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(CoreError::Protocol(format!("read: {e}"))),
                    Err(_) => break,
                };
                info.last_rx = Some(chrono::Utc::now());
                for decoded in parser.feed_bytes(&buf[..n]) {
                    info.crc_errors = parser.crc_errors();
                    if let Some(response) = handler.handle(&decoded, &mut info).await {
                        info.last_tx = Some(chrono::Utc::now());
                        if tx.send(response).is_err() {
                            break;
                        }
                    }
                }
                info.crc_errors = parser.crc_errors();
            }
            event = events.recv() => {
                match event {
                    // Unsolicited METRICS_EVENT pushes are gated by the
                    // session's streaming flag (START_STREAM/STOP_STREAM);
                    // every other broadcast frame (e.g. a future alarm push)
                    // passes through regardless.
                    Ok(frame) if frame.message_type == crate::frame::MessageType::MetricsEvent && !info.streaming => {
                        continue;
                    }
                    Ok(frame) => {
                        info.last_tx = Some(chrono::Utc::now());
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {}
                }
            }
        }
    }

    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MessageType;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    struct EchoHandler {
        seen: AtomicU8,
    }

    #[async_trait]
    impl FrameHandler for EchoHandler {
        async fn handle(&self, frame: &Frame, _info: &mut DeviceSessionInfo) -> Option<Frame> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Some(Frame::new(MessageType::Pong, frame.seq, vec![]))
        }
    }

    #[tokio::test]
    async fn responds_to_ping_with_pong() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(EchoHandler { seen: AtomicU8::new(0) });
        let (_tx, rx) = broadcast::channel(8);

        let server = {
            let handler = handler.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                run_session(stream, handler, rx, Duration::from_secs(1)).await.unwrap();
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        let ping = Frame::new(MessageType::Ping, 1, vec![]).encode().unwrap();
        client.write_all(&ping).await.unwrap();

        let mut reply = [0u8; 9];
        client.read_exact(&mut reply).await.unwrap();
        let mut parser = FrameParser::new();
        let decoded = parser.feed_bytes(&reply);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].message_type, MessageType::Pong);
        assert_eq!(decoded[0].seq, 1);

        drop(client);
        let _ = server.await;
        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
    }

    struct StreamToggleHandler;

    #[async_trait]
    impl FrameHandler for StreamToggleHandler {
        async fn handle(&self, frame: &Frame, info: &mut DeviceSessionInfo) -> Option<Frame> {
            match frame.message_type {
                MessageType::StartStream => {
                    info.streaming = true;
                    None
                }
                MessageType::StopStream => {
                    info.streaming = false;
                    None
                }
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn metrics_event_is_only_forwarded_while_streaming() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(StreamToggleHandler);
        let (event_tx, rx) = broadcast::channel(8);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_session(stream, handler, rx, Duration::from_secs(1)).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Not streaming yet: a METRICS_EVENT push is dropped, not forwarded.
        event_tx.send(Frame::new(MessageType::MetricsEvent, 0, vec![])).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let start = Frame::new(MessageType::StartStream, 1, vec![]).encode().unwrap();
        client.write_all(&start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Now streaming: the next push is forwarded to the client.
        event_tx.send(Frame::new(MessageType::MetricsEvent, 2, vec![])).unwrap();

        let mut reply = [0u8; 9];
        client.read_exact(&mut reply).await.unwrap();
        let mut parser = FrameParser::new();
        let decoded = parser.feed_bytes(&reply);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].message_type, MessageType::MetricsEvent);
        assert_eq!(decoded[0].seq, 2);

        drop(client);
        let _ = server.await;
    }
}

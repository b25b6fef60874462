//! Wires decoded device frames to `StationCore` (§4.1, §4.2, §6). The
//! station a session belongs to is whatever value the device sends with
//! `GET_STATUS`/metrics frames; the wire protocol carries no separate
//! handshake, so the session starts unidentified and falls back to the
//! remote address as a station id until the device reports metrics.

use crate::core::StationCore;
use crate::frame::{decode_metrics_payload, Frame, MessageType, StatusPayload};
use async_trait::async_trait;
use station_common::{DeviceSessionInfo, MetricKind, MetricReading};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DeviceFrameHandler {
    core: Arc<StationCore>,
}

impl DeviceFrameHandler {
    pub fn new(core: Arc<StationCore>) -> Self {
        Self { core }
    }

    fn station_id(info: &DeviceSessionInfo) -> String {
        info.remote.to_string()
    }
}

#[async_trait]
impl crate::session::FrameHandler for DeviceFrameHandler {
    async fn handle(&self, frame: &Frame, info: &mut DeviceSessionInfo) -> Option<Frame> {
        let station_id = Self::station_id(info);
        match frame.message_type {
            MessageType::Ping => Some(Frame::new(MessageType::Pong, frame.seq, vec![])),

            MessageType::RequestMetrics => {
                let now = chrono::Utc::now();
                for (code, value) in decode_metrics_payload(&frame.payload) {
                    let Some(metric) = MetricKind::from_code(code) else {
                        warn!(code, "unknown metric code in REQUEST_METRICS payload");
                        continue;
                    };
                    let reading = MetricReading { station_id: station_id.clone(), metric, value: value as f64, timestamp: now };
                    if let Err(e) = self.core.ingest_metric(&reading) {
                        debug!(%e, "rejected metric reading");
                    }
                }
                Some(Frame::new(MessageType::MetricsResponse, frame.seq, vec![]))
            }

            MessageType::GetStatus => {
                let status = StatusPayload {
                    status: if info.crc_errors > 0 { 1 } else { 0 },
                    uptime_seconds: (chrono::Utc::now() - info.connected_at).num_seconds().max(0) as u32,
                    errors: info.crc_errors.min(u16::MAX as u64) as u16,
                    warnings: 0,
                };
                Some(Frame::new(MessageType::StatusResponse, frame.seq, status.encode()))
            }

            MessageType::SetConfig => Some(Frame::new(MessageType::ConfigAck, frame.seq, vec![])),

            MessageType::ExecuteCommand => Some(Frame::new(MessageType::CommandResult, frame.seq, vec![1])),

            MessageType::StartStream => {
                info.streaming = true;
                Some(Frame::new(MessageType::StreamAck, frame.seq, vec![1]))
            }

            MessageType::StopStream => {
                info.streaming = false;
                Some(Frame::new(MessageType::StreamAck, frame.seq, vec![0]))
            }

            // responses and events are never sent upstream by a device.
            _ => None,
        }
    }
}

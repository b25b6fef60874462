//! Device wire protocol (§4.1): `0xAA 0x55 | length(u16 BE) | type(u8) |
//! seq(u8) | payload | crc(u16 BE)`, CRC-16-CCITT over everything preceding
//! it. A byte-fed state machine so a single TCP read can straddle any number
//! of frames, and any number of garbage bytes resynchronize on the next
//! `0xAA 0x55`.

use station_common::metrics::FRAMES_TOTAL;
use station_common::{CoreError, Result};

pub const SYNC0: u8 = 0xAA;
pub const SYNC1: u8 = 0x55;
pub const MAX_PAYLOAD_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // requests
    Ping,
    RequestMetrics,
    GetStatus,
    SetConfig,
    ExecuteCommand,
    StartStream,
    StopStream,
    // responses
    Pong,
    MetricsResponse,
    StatusResponse,
    ConfigAck,
    CommandResult,
    StreamAck,
    // events
    MetricsEvent,
    ThresholdExceeded,
    DeviceStateChange,
    Error,
}

impl MessageType {
    pub fn code(self) -> u8 {
        use MessageType::*;
        match self {
            Ping => 0x01,
            RequestMetrics => 0x02,
            GetStatus => 0x03,
            SetConfig => 0x04,
            ExecuteCommand => 0x05,
            StartStream => 0x06,
            StopStream => 0x07,
            Pong => 0x81,
            MetricsResponse => 0x82,
            StatusResponse => 0x83,
            ConfigAck => 0x84,
            CommandResult => 0x85,
            StreamAck => 0x86,
            MetricsEvent => 0xC0,
            ThresholdExceeded => 0xC1,
            DeviceStateChange => 0xC2,
            Error => 0xFF,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use MessageType::*;
        Some(match code {
            0x01 => Ping,
            0x02 => RequestMetrics,
            0x03 => GetStatus,
            0x04 => SetConfig,
            0x05 => ExecuteCommand,
            0x06 => StartStream,
            0x07 => StopStream,
            0x81 => Pong,
            0x82 => MetricsResponse,
            0x83 => StatusResponse,
            0x84 => ConfigAck,
            0x85 => CommandResult,
            0x86 => StreamAck,
            0xC0 => MetricsEvent,
            0xC1 => ThresholdExceeded,
            0xC2 => DeviceStateChange,
            0xFF => Error,
            _ => return None,
        })
    }

    /// Requests expect a matched response carrying the same `seq`.
    pub fn is_request(self) -> bool {
        use MessageType::*;
        matches!(self, Ping | RequestMetrics | GetStatus | SetConfig | ExecuteCommand | StartStream | StopStream)
    }
}

/// A fully decoded frame, or one ready to be encoded onto the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub message_type: MessageType,
    pub seq: u8,
    pub payload: Vec<u8>,
}

/// CRC-16-CCITT, polynomial 0x1021, initial value 0xFFFF.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

impl Frame {
    pub fn new(message_type: MessageType, seq: u8, payload: Vec<u8>) -> Self {
        Self { message_type, seq, payload }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(CoreError::Protocol(format!(
                "payload of {} bytes exceeds max {}",
                self.payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        let mut buf = Vec::with_capacity(6 + self.payload.len() + 2);
        buf.push(SYNC0);
        buf.push(SYNC1);
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.push(self.message_type.code());
        buf.push(self.seq);
        buf.extend_from_slice(&self.payload);
        let crc = crc16_ccitt(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Idle,
    Header1,
    Length,
    Type,
    Sequence,
    Payload,
    Crc,
}

/// Byte-fed frame parser (§4.1). Feed bytes one at a time or in a batch via
/// `feed_bytes`; complete, CRC-valid frames are returned as they finish.
pub struct FrameParser {
    state: ParserState,
    length_buf: [u8; 2],
    length_idx: usize,
    message_type_code: u8,
    seq: u8,
    length: usize,
    payload: Vec<u8>,
    crc_buf: [u8; 2],
    crc_idx: usize,
    crc_errors: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            length_buf: [0; 2],
            length_idx: 0,
            message_type_code: 0,
            seq: 0,
            length: 0,
            payload: Vec::new(),
            crc_buf: [0; 2],
            crc_idx: 0,
            crc_errors: 0,
        }
    }

    pub fn crc_errors(&self) -> u64 {
        self.crc_errors
    }

    /// Feed one byte; returns `Some(Frame)` the moment a CRC-valid frame
    /// completes. A CRC mismatch, an unknown type, or an oversize length
    /// silently discards the in-progress frame and returns to `Idle`; the
    /// next `0xAA 0x55` resynchronizes (§8 invariant 2).
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            ParserState::Idle => {
                if byte == SYNC0 {
                    self.state = ParserState::Header1;
                }
            }
            ParserState::Header1 => {
                if byte == SYNC1 {
                    self.length_idx = 0;
                    self.state = ParserState::Length;
                } else if byte != SYNC0 {
                    self.state = ParserState::Idle;
                }
            }
            ParserState::Length => {
                self.length_buf[self.length_idx] = byte;
                self.length_idx += 1;
                if self.length_idx == 2 {
                    let len = u16::from_be_bytes(self.length_buf) as usize;
                    if len > MAX_PAYLOAD_LEN {
                        FRAMES_TOTAL.with_label_values(&["oversize"]).inc();
                        self.state = ParserState::Idle;
                    } else {
                        self.length = len;
                        self.payload = Vec::with_capacity(len);
                        self.state = ParserState::Type;
                    }
                }
            }
            ParserState::Type => {
                self.message_type_code = byte;
                self.state = ParserState::Sequence;
            }
            ParserState::Sequence => {
                self.seq = byte;
                self.state = if self.length == 0 { ParserState::Crc } else { ParserState::Payload };
                self.crc_idx = 0;
            }
            ParserState::Payload => {
                self.payload.push(byte);
                if self.payload.len() == self.length {
                    self.state = ParserState::Crc;
                    self.crc_idx = 0;
                }
            }
            ParserState::Crc => {
                self.crc_buf[self.crc_idx] = byte;
                self.crc_idx += 1;
                if self.crc_idx == 2 {
                    self.state = ParserState::Idle;
                    let received = u16::from_be_bytes(self.crc_buf);

                    let mut header = Vec::with_capacity(6 + self.payload.len());
                    header.push(SYNC0);
                    header.push(SYNC1);
                    header.extend_from_slice(&(self.length as u16).to_be_bytes());
                    header.push(self.message_type_code);
                    header.push(self.seq);
                    header.extend_from_slice(&self.payload);

                    if crc16_ccitt(&header) != received {
                        self.crc_errors += 1;
                        FRAMES_TOTAL.with_label_values(&["crc_error"]).inc();
                        return None;
                    }
                    let Some(message_type) = MessageType::from_code(self.message_type_code) else {
                        FRAMES_TOTAL.with_label_values(&["crc_error"]).inc();
                        return None;
                    };
                    FRAMES_TOTAL.with_label_values(&["ok"]).inc();
                    return Some(Frame {
                        message_type,
                        seq: self.seq,
                        payload: std::mem::take(&mut self.payload),
                    });
                }
            }
        }
        None
    }

    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics payload: a sequence of `(metric_type: u8, value: f32 BE)` tuples
/// with no count prefix; count is implied by `payload.len() / 5` (§4.1).
pub fn encode_metrics_payload(entries: &[(u8, f32)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * 5);
    for &(kind, value) in entries {
        buf.push(kind);
        buf.extend_from_slice(&value.to_be_bytes());
    }
    buf
}

pub fn decode_metrics_payload(payload: &[u8]) -> Vec<(u8, f32)> {
    payload
        .chunks_exact(5)
        .map(|c| (c[0], f32::from_be_bytes([c[1], c[2], c[3], c[4]])))
        .collect()
}

/// Status payload: `status:u8, uptime:u32, errors:u16, warnings:u16`, all
/// big-endian (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPayload {
    pub status: u8,
    pub uptime_seconds: u32,
    pub errors: u16,
    pub warnings: u16,
}

impl StatusPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        buf.push(self.status);
        buf.extend_from_slice(&self.uptime_seconds.to_be_bytes());
        buf.extend_from_slice(&self.errors.to_be_bytes());
        buf.extend_from_slice(&self.warnings.to_be_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != 9 {
            return None;
        }
        Some(Self {
            status: payload[0],
            uptime_seconds: u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]),
            errors: u16::from_be_bytes([payload[5], payload[6]]),
            warnings: u16::from_be_bytes([payload[7], payload[8]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 invariant 1: for every valid `(type, seq, payload)` with
    /// `|payload| ≤ 4096`, `parse(encode(m)) == m`.
    #[test]
    fn frame_round_trips() {
        let frame = Frame::new(MessageType::MetricsEvent, 7, encode_metrics_payload(&[(0x01, 42.5), (0x03, 21.0)]));
        let encoded = frame.encode().unwrap();
        let mut parser = FrameParser::new();
        let decoded: Vec<Frame> = parser.feed_bytes(&encoded);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], frame);
    }

    #[test]
    fn empty_payload_frame_round_trips() {
        let frame = Frame::new(MessageType::Ping, 0, vec![]);
        let encoded = frame.encode().unwrap();
        let mut parser = FrameParser::new();
        let decoded = parser.feed_bytes(&encoded);
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn oversize_payload_is_rejected_at_encode() {
        let frame = Frame::new(MessageType::MetricsEvent, 0, vec![0u8; MAX_PAYLOAD_LEN + 1]);
        assert!(frame.encode().is_err());
    }

    /// §8 invariant 1: single-byte corruption covered by CRC makes the
    /// parser reject the frame.
    #[test]
    fn corrupted_payload_byte_is_rejected() {
        let frame = Frame::new(MessageType::Pong, 3, vec![1, 2, 3, 4]);
        let mut encoded = frame.encode().unwrap();
        let payload_idx = 6; // after 2 sync + 2 length + type + seq
        encoded[payload_idx] ^= 0xFF;
        let mut parser = FrameParser::new();
        let decoded = parser.feed_bytes(&encoded);
        assert!(decoded.is_empty());
        assert_eq!(parser.crc_errors(), 1);
    }

    /// §8 invariant 2: after any number of injected garbage bytes, the
    /// parser decodes the next valid frame.
    #[test]
    fn resynchronizes_after_garbage_bytes() {
        let frame = Frame::new(MessageType::GetStatus, 9, vec![]);
        let encoded = frame.encode().unwrap();
        let mut stream = vec![0x00, 0xFF, 0x12, 0xAA, 0x00, SYNC0];
        stream.extend_from_slice(&encoded);

        let mut parser = FrameParser::new();
        let decoded = parser.feed_bytes(&stream);
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn oversize_length_is_discarded_and_resyncs() {
        let mut stream = vec![SYNC0, SYNC1, 0xFF, 0xFF]; // length 65535 > 4096
        let frame = Frame::new(MessageType::Ping, 1, vec![]);
        stream.extend_from_slice(&frame.encode().unwrap());

        let mut parser = FrameParser::new();
        let decoded = parser.feed_bytes(&stream);
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn metrics_payload_round_trips() {
        let entries = vec![(0x01u8, 12.5f32), (0x02, -3.25)];
        let encoded = encode_metrics_payload(&entries);
        let decoded = decode_metrics_payload(&encoded);
        assert_eq!(decoded, entries);
    }

    #[test]
    fn status_payload_round_trips() {
        let status = StatusPayload { status: 1, uptime_seconds: 86400, errors: 3, warnings: 12 };
        let encoded = status.encode();
        assert_eq!(encoded.len(), 9);
        assert_eq!(StatusPayload::decode(&encoded), Some(status));
    }
}

//! Device wire protocol, TCP sessions, and the Core API façade (§4.1, §4.2, §6).

pub mod core;
pub mod device;
pub mod frame;
pub mod session;

pub use core::StationCore;
pub use device::DeviceFrameHandler;
pub use frame::{crc16_ccitt, decode_metrics_payload, encode_metrics_payload, Frame, FrameParser, MessageType, StatusPayload};
pub use session::{run_session, FrameHandler};

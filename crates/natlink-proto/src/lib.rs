//! Wire-level types shared by the control and tunnel channels
//!
//! The control channel speaks length-prefixed JSON frames after a one-shot
//! text handshake; tunnel channels send the same style of handshake and then
//! carry raw bytes. This crate holds the frame codec, the control message
//! types, and the handshake header builders.

pub mod framing;
pub mod handshake;
pub mod messages;

pub use framing::{FrameCodec, FrameError};
pub use messages::{ControlMessage, TunnelSettings};

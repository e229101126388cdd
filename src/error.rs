//! Error kinds surfaced by the ingestion buffer, packet framer, and event store.
//!
//! Framing problems are not represented here: a mis-framed neighbor packet
//! still has to be emitted, so framing flags travel inside `SamplePacket::info`
//! instead of as a `Result::Err` (see `packet.rs`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("queue is full (capacity {capacity})")]
    Overflow { capacity: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("event exceeds max_packets ({max_packets})")]
    PacketOverflow { max_packets: usize },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, CollectorError>;

//! nalu_collector: a real-time event assembly pipeline for a UDP-streamed
//! digitizing instrument.
//!
//! ```text
//! socket -> IngressQueue -> PacketFramer -> EventAssembler -> EventStore -> consumer
//! ```

pub mod assembler;
pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod event_store;
pub mod framer;
pub mod ingress;
pub mod packet;
pub mod socket;
pub mod time_diff;

pub use assembler::{AssemblyContext, EventAssembler};
pub use collector::{Collector, TimingRecord};
pub use config::{CollectorConfig, EventBuilderConfig, UdpReceiverConfig};
pub use error::{CollectorError, Result};
pub use event::{Event, EventConfig, TriggerType};
pub use event_store::EventStore;
pub use framer::{FramerConfig, PacketFramer};
pub use ingress::{IngressPacket, IngressQueue};
pub use packet::SamplePacket;
pub use socket::UdpReceiver;
pub use time_diff::TimeDiff;

//! `Event`: a group of `SamplePacket`s correlated by trigger time, plus its
//! completion test and byte-exact wire format.

use std::time::Instant;

use crate::error::{CollectorError, Result};
use crate::packet::SamplePacket;

/// How an event's trigger was raised. Encoded in bits 4-5 of `Event::info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Unknown,
    External,
    Internal,
    Immediate,
}

impl TriggerType {
    fn bits(self) -> u8 {
        match self {
            TriggerType::Unknown => 0b00,
            TriggerType::External => 0b01,
            TriggerType::Internal => 0b10,
            TriggerType::Immediate => 0b11,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => TriggerType::External,
            0b10 => TriggerType::Internal,
            0b11 => TriggerType::Immediate,
            _ => TriggerType::Unknown,
        }
    }
}

/// Construction-time parameters for a new `Event`, shared across every event
/// an `EventAssembler` opens (the per-event fields that vary, `reference_time`
/// and `index`, are passed to `Event::new` directly).
#[derive(Debug, Clone)]
pub struct EventConfig {
    pub time_threshold: u32,
    pub clock_frequency: u32,
    pub num_windows: u8,
    pub channel_mask: u64,
    pub trigger_type: TriggerType,
    pub event_header: u16,
    pub event_trailer: u16,
}

impl EventConfig {
    /// `I7`: `num_windows * popcount(channel_mask) + 5`.
    pub fn max_packets(&self) -> usize {
        self.num_windows as usize * self.channel_mask.count_ones() as usize + 5
    }
}

/// One group of packets correlated by trigger-time proximity.
#[derive(Debug, Clone)]
pub struct Event {
    pub header: u16,
    pub info: u8,
    pub index: u32,
    pub reference_time: u32,
    pub time_threshold: u32,
    pub clock_frequency: u32,
    pub packet_size: u16,
    pub channel_mask: u64,
    pub num_windows: u8,
    pub num_packets: u16,
    pub packets: Vec<SamplePacket>,
    pub footer: u16,
    pub creation_timestamp: Instant,
    max_packets: usize,
}

impl Event {
    pub fn new(config: &EventConfig, reference_time: u32, index: u32, packet_size: u16) -> Self {
        let info = config.trigger_type.bits() << 4;
        Self {
            header: config.event_header,
            info,
            index,
            reference_time,
            time_threshold: config.time_threshold,
            clock_frequency: config.clock_frequency,
            packet_size,
            channel_mask: config.channel_mask,
            num_windows: config.num_windows,
            num_packets: 0,
            packets: Vec::with_capacity(config.max_packets()),
            footer: config.event_trailer,
            creation_timestamp: Instant::now(),
            max_packets: config.max_packets(),
        }
    }

    pub fn trigger_type(&self) -> TriggerType {
        TriggerType::from_bits(self.info >> 4)
    }

    pub fn error_code(&self) -> u8 {
        self.info & 0x0F
    }

    /// `I3`: rejects once `num_packets` would exceed `max_packets`.
    pub fn add_packet(&mut self, packet: SamplePacket) -> Result<()> {
        if self.packets.len() >= self.max_packets {
            return Err(CollectorError::PacketOverflow {
                max_packets: self.max_packets,
            });
        }
        self.packets.push(packet);
        self.num_packets = self.packets.len() as u16;
        Ok(())
    }

    /// Self-contained completion test (SPEC_FULL.md §9's resolved form):
    /// `Internal` triggers complete after `time_threshold` converted to a
    /// wall-clock duration via `clock_frequency`; every other trigger type
    /// completes once enough packets have arrived to fill every window on
    /// every channel.
    pub fn is_complete(&self) -> bool {
        match self.trigger_type() {
            TriggerType::Internal => {
                let max_wait_ns =
                    self.time_threshold as f64 * 1e9 / self.clock_frequency.max(1) as f64;
                self.creation_timestamp.elapsed().as_nanos() as f64 >= max_wait_ns
            }
            _ => {
                let expected = self.num_windows as u32 * self.channel_mask.count_ones();
                self.num_packets as u32 >= expected
            }
        }
    }

    /// Byte-exact header+packets+footer layout (SPEC_FULL.md §6/§9: native
    /// byte order, no padding, no canonical form).
    pub fn serialize_to_buffer(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            EVENT_HEADER_WIRE_SIZE
                + self.packets.len() * crate::packet::SAMPLE_PACKET_WIRE_SIZE
                + 2,
        );
        buf.extend_from_slice(&self.header.to_ne_bytes());
        buf.push(self.info);
        buf.extend_from_slice(&self.index.to_ne_bytes());
        buf.extend_from_slice(&self.reference_time.to_ne_bytes());
        buf.extend_from_slice(&self.time_threshold.to_ne_bytes());
        buf.extend_from_slice(&self.clock_frequency.to_ne_bytes());
        buf.extend_from_slice(&self.packet_size.to_ne_bytes());
        buf.extend_from_slice(&self.channel_mask.to_ne_bytes());
        buf.push(self.num_windows);
        buf.extend_from_slice(&self.num_packets.to_ne_bytes());
        for packet in &self.packets {
            packet.serialize_into(&mut buf);
        }
        buf.extend_from_slice(&self.footer.to_ne_bytes());
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < EVENT_HEADER_WIRE_SIZE + 2 {
            return Err(CollectorError::InvalidArgument(
                "buffer too short for an event header".into(),
            ));
        }
        let mut j = 0usize;
        let mut take = |n: usize| -> &[u8] {
            let slice = &buf[j..j + n];
            j += n;
            slice
        };

        let header = u16::from_ne_bytes(take(2).try_into().unwrap());
        let info = take(1)[0];
        let index = u32::from_ne_bytes(take(4).try_into().unwrap());
        let reference_time = u32::from_ne_bytes(take(4).try_into().unwrap());
        let time_threshold = u32::from_ne_bytes(take(4).try_into().unwrap());
        let clock_frequency = u32::from_ne_bytes(take(4).try_into().unwrap());
        let packet_size = u16::from_ne_bytes(take(2).try_into().unwrap());
        let channel_mask = u64::from_ne_bytes(take(8).try_into().unwrap());
        let num_windows = take(1)[0];
        let num_packets = u16::from_ne_bytes(take(2).try_into().unwrap());

        let mut packets = Vec::with_capacity(num_packets as usize);
        for _ in 0..num_packets {
            let remaining = &buf[j..];
            let p = SamplePacket::deserialize_from(remaining).ok_or_else(|| {
                CollectorError::InvalidArgument("truncated packet in event buffer".into())
            })?;
            j += crate::packet::SAMPLE_PACKET_WIRE_SIZE;
            packets.push(p);
        }

        if buf.len() < j + 2 {
            return Err(CollectorError::InvalidArgument(
                "buffer too short for an event footer".into(),
            ));
        }
        let footer = u16::from_ne_bytes(buf[j..j + 2].try_into().unwrap());

        Ok(Self {
            header,
            info,
            index,
            reference_time,
            time_threshold,
            clock_frequency,
            packet_size,
            channel_mask,
            num_windows,
            num_packets,
            max_packets: num_packets.max(1) as usize,
            packets,
            footer,
            creation_timestamp: Instant::now(),
        })
    }
}

/// Wire size of everything in `Event` up to (not including) the packet
/// records and the footer: `header+info+index+reference_time+time_threshold
/// +clock_frequency+packet_size+channel_mask+num_windows+num_packets`.
const EVENT_HEADER_WIRE_SIZE: usize = 2 + 1 + 4 + 4 + 4 + 4 + 2 + 8 + 1 + 2;

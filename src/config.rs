//! Plain configuration structs with `Default` impls holding the original
//! instrument's hardcoded defaults (SPEC_FULL.md §2's ambient config note).
//! There is no config-file parser: the CLI's `-b`/`-h` flags are the only
//! externally supplied knobs (spec.md §6).

use crate::event::TriggerType;
use crate::framer::FramerConfig;

/// Parameters for `EventAssembler` + the `Event`s it creates. Mirrors the
/// original `NaluEventBuilderParams`.
#[derive(Debug, Clone)]
pub struct EventBuilderConfig {
    pub channels: Vec<u8>,
    pub windows: u8,
    pub time_threshold: u32,
    pub max_events: usize,
    pub max_trigger_time: u32,
    pub max_lookback: usize,
    pub event_header: u16,
    pub event_trailer: u16,
    pub clock_frequency: u32,
    pub trigger_type: TriggerType,
}

impl Default for EventBuilderConfig {
    fn default() -> Self {
        Self {
            channels: (0..16).collect(),
            windows: 4,
            time_threshold: 5000,
            max_events: 1_000_000,
            max_trigger_time: 16_777_216,
            max_lookback: 2,
            event_header: 0xBBBB,
            event_trailer: 0xEEEE,
            clock_frequency: 1_000_000_000,
            trigger_type: TriggerType::External,
        }
    }
}

impl EventBuilderConfig {
    /// For each channel `c` in `channels`, sets bit `c` of the mask (spec.md
    /// §4.4).
    pub fn channel_mask(&self) -> u64 {
        self.channels.iter().fold(0u64, |mask, &c| mask | (1u64 << c))
    }
}

/// Parameters for the UDP receive loop. Mirrors the original
/// `NaluUdpReceiverParams`.
#[derive(Debug, Clone)]
pub struct UdpReceiverConfig {
    pub address: String,
    pub port: u16,
    pub buffer_size: usize,
    pub max_packet_size: usize,
    pub timeout_sec: u64,
}

impl Default for UdpReceiverConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 9000,
            buffer_size: 1024 * 1024 * 100,
            max_packet_size: 1040,
            timeout_sec: 10,
        }
    }
}

/// Top-level bundle handed to `Collector::new`. Mirrors the original
/// `NaluEventCollectorParams`.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub event_builder: EventBuilderConfig,
    pub udp_receiver: UdpReceiverConfig,
    pub framer: FramerConfig,
    /// `None` mirrors the original's `sleep_time_us = -1` sentinel: the
    /// processing loop paces itself instead of sleeping a fixed interval.
    pub sleep_time_us: Option<u64>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            event_builder: EventBuilderConfig::default(),
            udp_receiver: UdpReceiverConfig::default(),
            framer: FramerConfig::default(),
            sleep_time_us: None,
        }
    }
}

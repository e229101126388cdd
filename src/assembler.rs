//! Groups `SamplePacket`s into `Event`s by trigger-time proximity.

use crate::event::{Event, EventConfig};
use crate::event_store::EventStore;
use crate::packet::SamplePacket;
use crate::time_diff::TimeDiff;

/// Per-assembler running state, separate from the (shared, lockable)
/// `EventStore` so a single assembler thread can mutate it without locking.
#[derive(Debug, Clone, Default)]
pub struct AssemblyContext {
    pub in_safety_zone: bool,
    pub post_event_counter: usize,
    pub event_index: u32,
}

/// Correlates packets into events using `TimeDiff`-bounded proximity, with a
/// bounded lookback window guarded by a "safety zone" counter (GLOSSARY).
pub struct EventAssembler {
    time_diff: TimeDiff,
    max_lookback: usize,
    event_config: EventConfig,
    packet_size: u16,
    post_event_safety_buffer_counter_max: usize,
}

impl EventAssembler {
    pub fn new(time_diff: TimeDiff, max_lookback: usize, event_config: EventConfig, packet_size: u16) -> Self {
        let channels = event_config.channel_mask.count_ones() as f64;
        let windows = event_config.num_windows as f64;
        let post_event_safety_buffer_counter_max = (channels * windows * 0.10).ceil() as usize;
        Self {
            time_diff,
            max_lookback,
            event_config,
            packet_size,
            post_event_safety_buffer_counter_max,
        }
    }

    /// Attaches `p` to an existing event in the store, or opens a new one.
    /// See spec §4.4 for the lookback/safety-zone algorithm.
    pub fn ingest_packet(&self, p: SamplePacket, store: &EventStore, ctx: &mut AssemblyContext) {
        let depth = if ctx.in_safety_zone {
            self.max_lookback.min(store.len())
        } else {
            1usize.min(store.len())
        };

        let len = store.len();
        for back in 0..depth {
            let idx = len - 1 - back;
            let candidate = match store.at(idx) {
                Ok(e) => e,
                Err(_) => continue,
            };
            if self
                .time_diff
                .within_threshold(p.trigger_time, candidate.reference_time)
            {
                self.attach(idx, p, store);
                self.tick_safety_zone(ctx);
                return;
            }
        }

        let mut event = Event::new(
            &self.event_config,
            p.trigger_time,
            ctx.event_index,
            self.packet_size,
        );
        ctx.event_index = ctx.event_index.wrapping_add(1);
        // The packet that opened this event is always within threshold of
        // its own reference_time, so this can only fail on a genuine
        // PacketOverflow, which cannot happen on a freshly created event.
        let _ = event.add_packet(p);
        if store.push(event).is_ok() {
            ctx.in_safety_zone = true;
            ctx.post_event_counter = 0;
        }
        self.tick_safety_zone(ctx);
    }

    fn attach(&self, idx: usize, p: SamplePacket, store: &EventStore) {
        // `EventStore` hands out owned copies; mutate-and-replace is the
        // only way to append without exposing interior references across
        // the lock boundary (SPEC_FULL.md §9).
        if let Ok(mut event) = store.at(idx) {
            if event.add_packet(p).is_ok() {
                store.replace(idx, event);
            } else {
                log::error!("event {idx} rejected a packet: exceeds max_packets");
            }
        }
    }

    fn tick_safety_zone(&self, ctx: &mut AssemblyContext) {
        if ctx.in_safety_zone {
            ctx.post_event_counter += 1;
            if ctx.post_event_counter >= self.post_event_safety_buffer_counter_max {
                ctx.in_safety_zone = false;
                ctx.post_event_counter = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TriggerType;

    fn assembler(max_lookback: usize) -> EventAssembler {
        let time_diff = TimeDiff::new(16_777_216, 5000);
        let event_config = EventConfig {
            time_threshold: 5000,
            clock_frequency: 1_000_000_000,
            num_windows: 1,
            channel_mask: 0b11,
            trigger_type: TriggerType::External,
            event_header: 0xBBBB,
            event_trailer: 0xEEEE,
        };
        EventAssembler::new(time_diff, max_lookback, event_config, 74)
    }

    fn sample(channel: u8, trigger_time: u32) -> SamplePacket {
        SamplePacket {
            header: 0xAAAA,
            info: 0,
            channel,
            trigger_time,
            logical_position: 0,
            physical_position: 0,
            raw_samples: [0; 64],
            parser_index: 0,
            start_udp_packet_index: 0,
            end_udp_packet_index: 0,
            footer: 0xFFFF,
        }
    }

    #[test]
    fn s3_close_triggers_coalesce() {
        let assembler = assembler(2);
        let store = EventStore::new(16);
        let mut ctx = AssemblyContext::default();

        assembler.ingest_packet(sample(0, 1000), &store, &mut ctx);
        assembler.ingest_packet(sample(1, 1500), &store, &mut ctx);

        assert_eq!(store.len(), 1);
        assert_eq!(store.at(0).unwrap().num_packets, 2);
    }

    #[test]
    fn s4_far_triggers_split() {
        let assembler = assembler(2);
        let store = EventStore::new(16);
        let mut ctx = AssemblyContext::default();

        assembler.ingest_packet(sample(0, 1000), &store, &mut ctx);
        assembler.ingest_packet(sample(1, 10_000), &store, &mut ctx);

        assert_eq!(store.len(), 2);
        assert_eq!(store.at(0).unwrap().num_packets, 1);
        assert_eq!(store.at(1).unwrap().num_packets, 1);
    }

    #[test]
    fn s5_wrap_around_coalesces() {
        let assembler = assembler(2);
        let store = EventStore::new(16);
        let mut ctx = AssemblyContext::default();

        assembler.ingest_packet(sample(0, 16_777_200), &store, &mut ctx);
        assembler.ingest_packet(sample(1, 100), &store, &mut ctx);

        assert_eq!(store.len(), 1);
        assert_eq!(store.at(0).unwrap().num_packets, 2);
    }

    #[test]
    fn p4_every_packet_is_within_threshold_of_its_event() {
        let td = TimeDiff::new(16_777_216, 5000);
        let assembler = assembler(2);
        let store = EventStore::new(16);
        let mut ctx = AssemblyContext::default();

        for t in [1000, 1200, 1800, 50_000, 50_500] {
            assembler.ingest_packet(sample(0, t), &store, &mut ctx);
        }

        for i in 0..store.len() {
            let event = store.at(i).unwrap();
            for p in &event.packets {
                assert!(td.within_threshold(p.trigger_time, event.reference_time));
            }
        }
    }

    #[test]
    fn safety_zone_allows_a_stale_packet_to_attach_to_the_prior_event() {
        // A wider channel/window count keeps the safety zone open for more
        // than one packet, so a packet arriving right after a new event
        // opens can still reach back to the one before it.
        let time_diff = TimeDiff::new(16_777_216, 5000);
        let event_config = EventConfig {
            time_threshold: 5000,
            clock_frequency: 1_000_000_000,
            num_windows: 4,
            channel_mask: 0b1111,
            trigger_type: TriggerType::External,
            event_header: 0xBBBB,
            event_trailer: 0xEEEE,
        };
        let assembler = EventAssembler::new(time_diff, 2, event_config, 74);
        let store = EventStore::new(16);
        let mut ctx = AssemblyContext::default();

        assembler.ingest_packet(sample(0, 1000), &store, &mut ctx); // opens event 0
        assembler.ingest_packet(sample(1, 50_000), &store, &mut ctx); // opens event 1, safety zone active
        assembler.ingest_packet(sample(0, 1100), &store, &mut ctx); // belongs with event 0

        assert_eq!(store.len(), 2);
        assert_eq!(store.at(0).unwrap().num_packets, 2);
        assert_eq!(store.at(1).unwrap().num_packets, 1);
    }
}

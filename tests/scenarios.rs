//! End-to-end literal scenarios (S1-S6) and cross-module properties (P1-P9)
//! exercised against the public API, combining `IngressQueue`, `PacketFramer`,
//! `EventAssembler`, and `EventStore` the way `Collector::collect` wires them.

use nalu_collector::{
    AssemblyContext, CollectorError, Event, EventAssembler, EventConfig, EventStore, FramerConfig,
    IngressQueue, PacketFramer, TimeDiff, TriggerType,
};

const MAX_TRIGGER_TIME: u32 = 16_777_216;
const TIME_THRESHOLD: u32 = 5000;

fn make_packet_bytes(channel: u8, trigger_time: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 74];
    buf[0] = 0x0E;
    buf[1] = channel & 0x3F;
    let hi = (trigger_time >> 12) as u16;
    let lo = (trigger_time & 0xFFF) as u16;
    buf[2..4].copy_from_slice(&hi.to_be_bytes());
    buf[4..6].copy_from_slice(&lo.to_be_bytes());
    buf[72] = 0xFA;
    buf[73] = 0x5A;
    buf
}

fn datagram_with(payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 16];
    buf[0..2].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

struct Pipeline {
    framer: PacketFramer,
    assembler: EventAssembler,
    store: EventStore,
    ctx: AssemblyContext,
}

impl Pipeline {
    fn new(windows: u8, channels: &[u8]) -> Self {
        let channel_mask = channels.iter().fold(0u64, |m, &c| m | (1u64 << c));
        let event_config = EventConfig {
            time_threshold: TIME_THRESHOLD,
            clock_frequency: 1_000_000_000,
            num_windows: windows,
            channel_mask,
            trigger_type: TriggerType::External,
            event_header: 0xBBBB,
            event_trailer: 0xEEEE,
        };
        let time_diff = TimeDiff::new(MAX_TRIGGER_TIME, TIME_THRESHOLD);
        Self {
            framer: PacketFramer::new(FramerConfig::default()),
            assembler: EventAssembler::new(time_diff, 2, event_config, 74),
            store: EventStore::new(1_000_000),
            ctx: AssemblyContext::default(),
        }
    }

    fn run(&mut self, ingress: &IngressQueue) -> Vec<Event> {
        let batch = ingress.drain();
        let packets = self.framer.process(&batch);
        for p in packets {
            self.assembler.ingest_packet(p, &self.store, &mut self.ctx);
        }
        self.store.events_from_index(0)
    }
}

#[test]
fn s1_single_clean_packet() {
    let queue = IngressQueue::new(16);
    queue.append(make_packet_bytes(0, 1000)).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1]);
    let events = pipeline.run(&queue);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].num_packets, 1);
    assert_eq!(events[0].packets[0].info, 0);
    assert!(!events[0].is_complete());
}

#[test]
fn s2_straddle() {
    let queue = IngressQueue::new(16);
    let full_packet = make_packet_bytes(2, 42);
    queue.append(full_packet[0..40].to_vec()).unwrap();
    let mut second = full_packet[40..].to_vec();
    second.extend_from_slice(&make_packet_bytes(3, 99));
    queue.append(second).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1, 2, 3]);
    let batch = queue.drain();
    let emitted = pipeline.framer.process(&batch);

    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].start_udp_packet_index, 0);
    assert_eq!(emitted[0].end_udp_packet_index, 1);
    assert_eq!(emitted[1].start_udp_packet_index, 1);
    assert_eq!(emitted[1].end_udp_packet_index, 1);
}

#[test]
fn s3_close_triggers_coalesce() {
    let queue = IngressQueue::new(16);
    let mut payload = make_packet_bytes(0, 1000);
    payload.extend_from_slice(&make_packet_bytes(1, 1500));
    queue.append(payload).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1]);
    let events = pipeline.run(&queue);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].num_packets, 2);
    assert!(events[0].is_complete());
}

#[test]
fn s4_far_triggers_split() {
    let queue = IngressQueue::new(16);
    let mut payload = make_packet_bytes(0, 1000);
    payload.extend_from_slice(&make_packet_bytes(1, 10_000));
    queue.append(payload).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1]);
    let events = pipeline.run(&queue);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].num_packets, 1);
    assert_eq!(events[1].num_packets, 1);
}

#[test]
fn s5_wrap_around_coalesces() {
    let queue = IngressQueue::new(16);
    let mut payload = make_packet_bytes(0, 16_777_200);
    payload.extend_from_slice(&make_packet_bytes(1, 100));
    queue.append(payload).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1]);
    let events = pipeline.run(&queue);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].num_packets, 2);
}

#[test]
fn s6_overflow_fires_callback_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let queue = IngressQueue::new(4);
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = Arc::clone(&fired);
    queue.set_overflow_callback(move || {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });

    for _ in 0..4 {
        queue.append(vec![0xAB]).unwrap();
    }
    let err = queue.append(vec![0xCD]).unwrap_err();

    assert!(matches!(err, CollectorError::Overflow { capacity: 4 }));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(queue.len(), 4);
}

#[test]
fn p1_index_monotonicity_through_the_wire_prelude() {
    let queue = IngressQueue::new(32);
    for i in 0..10 {
        let datagram = datagram_with(&make_packet_bytes(0, 1000 + i as u32));
        let payload = &datagram[16..];
        queue.append(payload.to_vec()).unwrap();
    }
    let drained = queue.drain();
    for (k, p) in drained.iter().enumerate() {
        assert_eq!(p.index, k as u16);
    }
}

#[test]
fn p2_parser_index_continuity_across_calls() {
    let queue = IngressQueue::new(32);
    queue.append(make_packet_bytes(0, 1)).unwrap();
    let mut framer = PacketFramer::new(FramerConfig::default());
    let first = framer.process(&queue.drain());

    queue.append(make_packet_bytes(1, 2)).unwrap();
    let second = framer.process(&queue.drain());

    assert_eq!(
        second[0].parser_index,
        first[0].parser_index.wrapping_add(1)
    );
}

#[test]
fn p3_time_diff_symmetry_and_bound() {
    let td = TimeDiff::new(MAX_TRIGGER_TIME, TIME_THRESHOLD);
    for (a, b) in [(0u32, 0u32), (1000, 9000), (0, MAX_TRIGGER_TIME - 1), (8_388_608, 0)] {
        assert_eq!(td.distance(a, b), td.distance(b, a));
        assert!(td.distance(a, b) <= MAX_TRIGGER_TIME / 2);
    }
}

#[test]
fn p4_every_packet_in_an_event_is_within_threshold() {
    let queue = IngressQueue::new(32);
    let mut payload = make_packet_bytes(0, 1000);
    payload.extend_from_slice(&make_packet_bytes(1, 2000));
    queue.append(payload).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1]);
    let events = pipeline.run(&queue);
    let td = TimeDiff::new(MAX_TRIGGER_TIME, TIME_THRESHOLD);

    for event in &events {
        for p in &event.packets {
            assert!(td.within_threshold(p.trigger_time, event.reference_time));
        }
    }
}

#[test]
fn p5_store_ordering() {
    let queue = IngressQueue::new(32);
    let mut payload = Vec::new();
    for t in [1000u32, 50_000, 100_000] {
        payload.extend_from_slice(&make_packet_bytes(0, t));
    }
    queue.append(payload).unwrap();

    let mut pipeline = Pipeline::new(1, &[0]);
    let events = pipeline.run(&queue);

    for w in events.windows(2) {
        assert!(w[0].creation_timestamp <= w[1].creation_timestamp);
        assert!(w[0].index < w[1].index);
    }
}

#[test]
fn p6_straddling_packet_carries_both_origins_exactly_once() {
    let queue = IngressQueue::new(16);
    let full_packet = make_packet_bytes(5, 321);
    queue.append(full_packet[0..50].to_vec()).unwrap();
    queue.append(full_packet[50..].to_vec()).unwrap();

    let mut framer = PacketFramer::new(FramerConfig::default());
    let emitted = framer.process(&queue.drain());

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].start_udp_packet_index, 0);
    assert_eq!(emitted[0].end_udp_packet_index, 1);
}

#[test]
fn p7_overflow_isolation() {
    let queue = IngressQueue::new(3);
    for _ in 0..3 {
        queue.append(vec![1]).unwrap();
    }
    let before_len = queue.len();
    assert!(queue.append(vec![2]).is_err());
    assert_eq!(queue.len(), before_len);
}

#[test]
fn p8_event_round_trip_serialization() {
    let queue = IngressQueue::new(16);
    let mut payload = make_packet_bytes(0, 1000);
    payload.extend_from_slice(&make_packet_bytes(1, 1200));
    queue.append(payload).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1]);
    let events = pipeline.run(&queue);
    let original = &events[0];

    let buf = original.serialize_to_buffer();
    let restored = Event::deserialize(&buf).unwrap();

    assert_eq!(restored.index, original.index);
    assert_eq!(restored.reference_time, original.reference_time);
    assert_eq!(restored.num_packets, original.num_packets);
    for (a, b) in restored.packets.iter().zip(original.packets.iter()) {
        assert_eq!(a.trigger_time, b.trigger_time);
        assert_eq!(a.channel, b.channel);
    }
}

#[test]
fn p9_completion_is_monotonic() {
    let queue = IngressQueue::new(16);
    let mut payload = make_packet_bytes(0, 1000);
    payload.extend_from_slice(&make_packet_bytes(1, 1200));
    queue.append(payload).unwrap();

    let mut pipeline = Pipeline::new(1, &[0, 1]);
    let events = pipeline.run(&queue);
    assert!(events[0].is_complete());

    // Attaching one more packet to the same (already complete) event must
    // not flip completion back to false.
    let mut event = events[0].clone();
    let extra = {
        let mut framer = PacketFramer::new(FramerConfig::default());
        let queue2 = IngressQueue::new(4);
        queue2.append(make_packet_bytes(0, 1100)).unwrap();
        framer.process(&queue2.drain()).remove(0)
    };
    event.add_packet(extra).unwrap();
    assert!(event.is_complete());
}

//! Outer orchestration loop: drains the ingress queue, runs the framer and
//! assembler, and tracks rolling-average cycle timing. Named in spec.md §1
//! as outside the algorithmic core but carried here as the ambient glue a
//! runnable daemon needs (SPEC_FULL.md §2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::assembler::{AssemblyContext, EventAssembler};
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::event::{Event, EventConfig};
use crate::event_store::EventStore;
use crate::framer::PacketFramer;
use crate::ingress::IngressQueue;
use crate::socket::UdpReceiver;
use crate::time_diff::TimeDiff;

/// Per-cycle timing record (spec.md §6), emitted once per `collect()` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingRecord {
    pub cycle_index: u64,
    pub cycle_timestamp_ns: i64,
    pub udp_time_s: f64,
    pub parse_time_s: f64,
    pub event_time_s: f64,
    pub total_time_s: f64,
    pub data_processed_bytes: u64,
    pub data_rate_mib_s: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct RollingAverages {
    cycle_count: u64,
    avg_data_rate_mib_s: f64,
    avg_parse_time_s: f64,
    avg_event_time_s: f64,
    avg_udp_time_s: f64,
    avg_total_time_s: f64,
    avg_data_processed_bytes: f64,
}

impl RollingAverages {
    fn update(&mut self, record: &TimingRecord) {
        self.cycle_count += 1;
        let n = self.cycle_count as f64;
        self.avg_data_rate_mib_s += (record.data_rate_mib_s - self.avg_data_rate_mib_s) / n;
        self.avg_parse_time_s += (record.parse_time_s - self.avg_parse_time_s) / n;
        self.avg_event_time_s += (record.event_time_s - self.avg_event_time_s) / n;
        self.avg_udp_time_s += (record.udp_time_s - self.avg_udp_time_s) / n;
        self.avg_total_time_s += (record.total_time_s - self.avg_total_time_s) / n;
        self.avg_data_processed_bytes +=
            (record.data_processed_bytes as f64 - self.avg_data_processed_bytes) / n;
    }
}

struct Shared {
    timing: TimingRecord,
    averages: RollingAverages,
}

/// Orchestrates one `IngressQueue -> PacketFramer -> EventAssembler ->
/// EventStore` pull cycle, optionally on a dedicated background thread.
pub struct Collector {
    ingress: IngressQueue,
    store: Arc<EventStore>,
    framer: Mutex<PacketFramer>,
    assembler: EventAssembler,
    assembly_ctx: Mutex<AssemblyContext>,
    shared: Mutex<Shared>,
    start_instant: Instant,
    last_event_index: Mutex<usize>,
    receiver: Mutex<Option<UdpReceiver>>,
    running: Arc<AtomicBool>,
    background_thread: Mutex<Option<JoinHandle<()>>>,
    sleep_time_us: Option<u64>,
    udp_config: crate::config::UdpReceiverConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        let udp_config = config.udp_receiver.clone();
        let ingress = IngressQueue::new(config.udp_receiver.buffer_size / config.udp_receiver.max_packet_size.max(1));
        let store = Arc::new(EventStore::new(config.event_builder.max_events));
        let framer = Mutex::new(PacketFramer::new(config.framer.clone()));

        let time_diff = TimeDiff::new(
            config.event_builder.max_trigger_time,
            config.event_builder.time_threshold,
        );
        let event_config = EventConfig {
            time_threshold: config.event_builder.time_threshold,
            clock_frequency: config.event_builder.clock_frequency,
            num_windows: config.event_builder.windows,
            channel_mask: config.event_builder.channel_mask(),
            trigger_type: config.event_builder.trigger_type,
            event_header: config.event_builder.event_header,
            event_trailer: config.event_builder.event_trailer,
        };
        let assembler = EventAssembler::new(
            time_diff,
            config.event_builder.max_lookback,
            event_config,
            config.framer.packet_size as u16,
        );

        Self {
            ingress,
            store,
            framer,
            assembler,
            assembly_ctx: Mutex::new(AssemblyContext::default()),
            shared: Mutex::new(Shared {
                timing: TimingRecord::default(),
                averages: RollingAverages::default(),
            }),
            start_instant: Instant::now(),
            last_event_index: Mutex::new(0),
            receiver: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            background_thread: Mutex::new(None),
            sleep_time_us: config.sleep_time_us,
            udp_config,
        }
    }

    /// Starts the UDP receiver thread and, if requested, a background
    /// processing thread that calls `collect()` in a loop (the `-b` CLI
    /// flag, spec.md §6).
    pub fn start(self: &Arc<Self>, background: bool) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let receiver = UdpReceiver::start(self.udp_config.clone(), self.ingress.clone())?;
        *self.receiver.lock() = Some(receiver);

        if background {
            let this = Arc::clone(self);
            let handle = thread::spawn(move || {
                while this.running.load(Ordering::SeqCst) {
                    this.collect();
                    if let Some(us) = this.sleep_time_us {
                        if us > 0 {
                            std::thread::sleep(std::time::Duration::from_micros(us));
                        }
                    }
                }
            });
            *self.background_thread.lock() = Some(handle);
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut receiver) = self.receiver.lock().take() {
            receiver.stop();
        }
        if let Some(handle) = self.background_thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Runs exactly one pull cycle: drain ingress, frame, assemble, record
    /// timing. Ported from the original `collectionLoop`/`collect`.
    pub fn collect(&self) {
        let cycle_start = Instant::now();

        let udp_start = Instant::now();
        let batch = self.ingress.drain();
        let udp_time_s = udp_start.elapsed().as_secs_f64();

        if batch.is_empty() {
            log::debug!("no data received from the ingress queue this cycle");
            return;
        }

        let data_processed_bytes: u64 = batch.iter().map(|p| p.payload.len() as u64).sum();

        let parse_start = Instant::now();
        let packets = self.framer.lock().process(&batch);
        let parse_time_s = parse_start.elapsed().as_secs_f64();

        if packets.is_empty() {
            return;
        }

        let event_start = Instant::now();
        {
            let mut ctx = self.assembly_ctx.lock();
            for packet in packets {
                self.assembler.ingest_packet(packet, &self.store, &mut ctx);
            }
        }
        let event_time_s = event_start.elapsed().as_secs_f64();

        let total_time_s = cycle_start.elapsed().as_secs_f64();
        let data_rate_mib_s = if total_time_s > 0.0 {
            (data_processed_bytes as f64 / (1024.0 * 1024.0)) / total_time_s
        } else {
            0.0
        };

        let mut shared = self.shared.lock();
        let cycle_index = shared.averages.cycle_count;
        let record = TimingRecord {
            cycle_index,
            cycle_timestamp_ns: cycle_start.duration_since(self.start_instant).as_nanos() as i64,
            udp_time_s,
            parse_time_s,
            event_time_s,
            total_time_s,
            data_processed_bytes,
            data_rate_mib_s,
        };
        shared.averages.update(&record);
        shared.timing = record;
    }

    pub fn timing(&self) -> TimingRecord {
        self.shared.lock().timing
    }

    /// Complete events since the last call, following the original's
    /// `get_data`: events at-or-after `last_event_index` that report
    /// complete are returned, and the index only advances past them.
    pub fn new_events(&self) -> Vec<Event> {
        let mut last_index = self.last_event_index.lock();
        let candidates = self.store.events_from_index(*last_index);
        let complete: Vec<Event> = candidates.into_iter().filter(Event::is_complete).collect();
        *last_index += complete.len();
        complete
    }

    /// Drops events strictly before `last_event_index` (the original's
    /// `clear_events`).
    pub fn clear_events(&self) {
        let mut last_index = self.last_event_index.lock();
        if *last_index > 0 {
            let removed = self.store.remove_before_index(*last_index);
            *last_index -= removed;
        }
    }

    /// Reproduces the original's rolling-average console table.
    pub fn print_performance_stats(&self) {
        let shared = self.shared.lock();
        let avg = &shared.averages;
        println!("\nRolling Average ({}):", avg.cycle_count);
        println!(
            "+-------------------------+-------------------------+-------------------------+-------------------------+-------------------------+-------------------------+"
        );
        println!(
            "| {:>23} | {:>23} | {:>23} | {:>23} | {:>23} | {:>23} |",
            "Avg Data Rate (MiB/s)",
            "Avg Parse Time (us)",
            "Avg Event Time (us)",
            "Avg UDP Time (us)",
            "Avg Total Time (us)",
            "Avg Data Processed (KB)"
        );
        println!(
            "+-------------------------+-------------------------+-------------------------+-------------------------+-------------------------+-------------------------+"
        );
        println!(
            "| {:>23.6} | {:>23.6} | {:>23.6} | {:>23.6} | {:>23.6} | {:>23.6} |",
            avg.avg_data_rate_mib_s,
            avg.avg_parse_time_s * 1e6,
            avg.avg_event_time_s * 1e6,
            avg.avg_udp_time_s * 1e6,
            avg.avg_total_time_s * 1e6,
            avg.avg_data_processed_bytes / 1024.0
        );
        println!(
            "+-------------------------+-------------------------+-------------------------+-------------------------+-------------------------+-------------------------+"
        );
    }
}

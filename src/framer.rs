//! Stateful framer that resynchronizes on start/stop markers across UDP
//! boundaries and emits fixed-layout `SamplePacket`s.
//!
//! Ported from the original parser's `process_stream`/`process_packet`
//! segment-processing split, generalized to track which ingress datagram(s)
//! contributed to each emitted packet.

use crate::ingress::IngressPacket;
use crate::packet::{SamplePacket, FRAMING_ERR_START_MISSING, FRAMING_ERR_STOP_MISSING};

/// Fixed-per-run framer configuration.
#[derive(Debug, Clone)]
pub struct FramerConfig {
    pub packet_size: usize,
    pub start_marker: Vec<u8>,
    pub stop_marker: Vec<u8>,
    pub chan_mask: u8,
    pub chan_shift: u8,
    pub abs_wind_mask: u8,
    pub evt_wind_mask: u8,
    pub evt_wind_shift: u8,
    pub timing_mask: u16,
    pub timing_shift: u8,
    pub check_packet_integrity: bool,
    pub constructed_header: u16,
    pub constructed_footer: u16,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            packet_size: 74,
            start_marker: vec![0x0E],
            stop_marker: vec![0xFA, 0x5A],
            chan_mask: 0x3F,
            chan_shift: 0,
            abs_wind_mask: 0x3F,
            evt_wind_mask: 0x3F,
            evt_wind_shift: 6,
            timing_mask: 0xFFF,
            timing_shift: 12,
            check_packet_integrity: false,
            constructed_header: 0xAAAA,
            constructed_footer: 0xFFFF,
        }
    }
}

/// Cross-call state: leftover bytes from the previous datagram, the ingress
/// index they originated in, and a monotonic emitted-packet counter. Owned
/// by exactly one thread; no locking needed (SPEC_FULL.md §9).
pub struct PacketFramer {
    config: FramerConfig,
    leftovers: Vec<u8>,
    leftovers_origin_index: u16,
    parser_index: u16,
}

impl PacketFramer {
    pub fn new(config: FramerConfig) -> Self {
        Self {
            config,
            leftovers: Vec::new(),
            leftovers_origin_index: 0,
            parser_index: 0,
        }
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    /// Processes each ingress payload independently, in order, and returns
    /// every `SamplePacket` emitted across the whole batch.
    pub fn process(&mut self, ingress: &[IngressPacket]) -> Vec<SamplePacket> {
        let mut out = Vec::new();
        for packet in ingress {
            self.process_one(packet, &mut out);
        }
        out
    }

    fn process_one(&mut self, ingress: &IngressPacket, out: &mut Vec<SamplePacket>) {
        let u = ingress.index;
        let b = &ingress.payload;
        let n = b.len();
        let ps = self.config.packet_size;
        let mut i: usize = 0;

        // 1. Leftover completion.
        if !self.leftovers.is_empty() {
            let k = self.leftovers.len();
            let need = ps - k;
            if n < need {
                // Not enough bytes yet to complete the packet; keep waiting.
                self.leftovers.extend_from_slice(b);
                return;
            }

            let origin = self.leftovers_origin_index;
            let mut combined = std::mem::take(&mut self.leftovers);
            combined.extend_from_slice(&b[0..need]);

            let stop_len = self.config.stop_marker.len();
            if self.check_marker(&combined, 0, MarkerKind::Start)
                && self.check_marker(&combined, ps - stop_len, MarkerKind::Stop)
            {
                let mut p = self.decode_packet(&combined, 0, 0);
                p.start_udp_packet_index = origin;
                p.end_udp_packet_index = u;
                out.push(p);
            } else {
                log::warn!(
                    "leftover completion failed marker check (origin udp index {origin}, completed in {u})"
                );
            }
            i = need;
        }

        // Error flags accumulate (bitwise OR) across resync attempts within
        // one packet attempt and reset to 0 only on a clean (both-markers)
        // emission (spec.md §4.3).
        let mut error_code: u8 = 0;

        // 2. Resynchronization: always with strict marker checks, until the
        // first packet is successfully emitted within this payload.
        let emitted_before = out.len();
        while i + ps <= n {
            self.process_segment_with_checks(b, &mut i, &mut error_code, out, u);
            if out.len() > emitted_before {
                break;
            }
        }

        // 3. Bulk consumption, in the configured mode.
        while i + ps <= n {
            if self.config.check_packet_integrity {
                self.process_segment_with_checks(b, &mut i, &mut error_code, out, u);
            } else {
                self.process_segment_without_checks(b, &mut i, out, u);
            }
        }

        // 4. Store leftovers for the next call.
        if i < n {
            self.leftovers = b[i..].to_vec();
            self.leftovers_origin_index = u;
        }
    }

    fn process_segment_with_checks(
        &mut self,
        b: &[u8],
        i: &mut usize,
        error_code: &mut u8,
        out: &mut Vec<SamplePacket>,
        u: u16,
    ) {
        let ps = self.config.packet_size;
        let stop_len = self.config.stop_marker.len();
        let end_marker_pos = *i + ps - stop_len;

        if self.check_marker(b, end_marker_pos, MarkerKind::Stop) {
            let start_pos = *i;
            if self.check_marker(b, start_pos, MarkerKind::Start) {
                let mut p = self.decode_packet(b, start_pos, *error_code);
                p.start_udp_packet_index = u;
                p.end_udp_packet_index = u;
                out.push(p);
                *error_code = 0;
            } else {
                log::warn!("start marker not found at expected position (udp index {u})");
                *error_code |= FRAMING_ERR_START_MISSING;
                let mut p = self.decode_packet(b, start_pos, *error_code);
                p.start_udp_packet_index = u;
                p.end_udp_packet_index = u;
                out.push(p);
            }
            *i += ps;
        } else {
            *error_code |= FRAMING_ERR_STOP_MISSING;
            *i += 1;
        }
    }

    fn process_segment_without_checks(
        &mut self,
        b: &[u8],
        i: &mut usize,
        out: &mut Vec<SamplePacket>,
        u: u16,
    ) {
        let start_pos = *i;
        let mut p = self.decode_packet(b, start_pos, 0);
        p.start_udp_packet_index = u;
        p.end_udp_packet_index = u;
        out.push(p);
        *i += self.config.packet_size;
    }

    fn check_marker(&self, haystack: &[u8], index: usize, kind: MarkerKind) -> bool {
        let marker = match kind {
            MarkerKind::Start => &self.config.start_marker,
            MarkerKind::Stop => &self.config.stop_marker,
        };
        if index + marker.len() > haystack.len() {
            return false;
        }
        &haystack[index..index + marker.len()] == marker.as_slice()
    }

    /// Decodes one packet body at `start_index` (the position of the start
    /// marker) with the given `info` byte.
    fn decode_packet(&mut self, b: &[u8], start_index: usize, info: u8) -> SamplePacket {
        let cfg = &self.config;
        let mut j = start_index + cfg.start_marker.len();

        let channel = b[j] & cfg.chan_mask;
        j += 1;

        let hi = u16::from_be_bytes([b[j], b[j + 1]]);
        let lo = u16::from_be_bytes([b[j + 2], b[j + 3]]);
        let trigger_time = ((hi as u32) << cfg.timing_shift) | ((lo as u32) & cfg.timing_mask as u32);
        j += 4;

        let logical_position = (((b[j] & cfg.abs_wind_mask) as u16) << (8 - cfg.evt_wind_shift))
            | (((b[j + 1] >> cfg.evt_wind_shift) & cfg.evt_wind_mask) as u16);
        let physical_position = (b[j + 1] & cfg.abs_wind_mask) as u16;
        j += 2;

        let mut raw_samples = [0u8; 64];
        raw_samples.copy_from_slice(&b[j..j + 64]);

        let parser_index = self.parser_index;
        self.parser_index = self.parser_index.wrapping_add(1);

        SamplePacket {
            header: cfg.constructed_header,
            info,
            channel,
            trigger_time,
            logical_position,
            physical_position,
            raw_samples,
            parser_index,
            start_udp_packet_index: 0,
            end_udp_packet_index: 0,
            footer: cfg.constructed_footer,
        }
    }
}

enum MarkerKind {
    Start,
    Stop,
}

//! The fixed-layout packet emitted by the framer and stored (by value) inside
//! an `Event`.

/// One framed sample packet. Created by `PacketFramer`, copied into an
/// `Event`, never mutated thereafter.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SamplePacket {
    pub header: u16,
    /// High 4 bits: reserved. Low 4 bits: framing error code (`error_code()`).
    pub info: u8,
    pub channel: u8,
    pub trigger_time: u32,
    pub logical_position: u16,
    pub physical_position: u16,
    pub raw_samples: [u8; 64],
    pub parser_index: u16,
    pub start_udp_packet_index: u16,
    pub end_udp_packet_index: u16,
    pub footer: u16,
}

/// Bit 0 of `SamplePacket::info`: stop marker was not at the expected
/// position before resync kicked in.
pub const FRAMING_ERR_STOP_MISSING: u8 = 0b01;
/// Bit 1: start marker missing when a stop marker was present.
pub const FRAMING_ERR_START_MISSING: u8 = 0b10;

/// Byte-exact wire size of one serialized `SamplePacket` (no padding, per
/// SPEC_FULL.md §6).
pub const SAMPLE_PACKET_WIRE_SIZE: usize = 84;

impl SamplePacket {
    /// Low 4 bits of `info`: the framing error code.
    pub fn error_code(&self) -> u8 {
        self.info & 0x0F
    }

    pub fn has_framing_error(&self) -> bool {
        self.error_code() != 0
    }

    /// Appends this packet's wire representation to `buf`, field by field,
    /// in the host's native byte order. No `#[repr(C)]` memcpy is used here
    /// since struct alignment padding would break the "byte-exact, no
    /// padding" layout SPEC_FULL.md §6 requires.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.header.to_ne_bytes());
        buf.push(self.info);
        buf.push(self.channel);
        buf.extend_from_slice(&self.trigger_time.to_ne_bytes());
        buf.extend_from_slice(&self.logical_position.to_ne_bytes());
        buf.extend_from_slice(&self.physical_position.to_ne_bytes());
        buf.extend_from_slice(&self.raw_samples);
        buf.extend_from_slice(&self.parser_index.to_ne_bytes());
        buf.extend_from_slice(&self.start_udp_packet_index.to_ne_bytes());
        buf.extend_from_slice(&self.end_udp_packet_index.to_ne_bytes());
        buf.extend_from_slice(&self.footer.to_ne_bytes());
    }

    /// Reads one packet from the front of `buf`. Returns `None` if fewer
    /// than `SAMPLE_PACKET_WIRE_SIZE` bytes remain.
    pub fn deserialize_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < SAMPLE_PACKET_WIRE_SIZE {
            return None;
        }
        let mut j = 0usize;
        let mut take = |n: usize| -> &[u8] {
            let slice = &buf[j..j + n];
            j += n;
            slice
        };

        let header = u16::from_ne_bytes(take(2).try_into().unwrap());
        let info = take(1)[0];
        let channel = take(1)[0];
        let trigger_time = u32::from_ne_bytes(take(4).try_into().unwrap());
        let logical_position = u16::from_ne_bytes(take(2).try_into().unwrap());
        let physical_position = u16::from_ne_bytes(take(2).try_into().unwrap());
        let mut raw_samples = [0u8; 64];
        raw_samples.copy_from_slice(take(64));
        let parser_index = u16::from_ne_bytes(take(2).try_into().unwrap());
        let start_udp_packet_index = u16::from_ne_bytes(take(2).try_into().unwrap());
        let end_udp_packet_index = u16::from_ne_bytes(take(2).try_into().unwrap());
        let footer = u16::from_ne_bytes(take(2).try_into().unwrap());

        Some(Self {
            header,
            info,
            channel,
            trigger_time,
            logical_position,
            physical_position,
            raw_samples,
            parser_index,
            start_udp_packet_index,
            end_udp_packet_index,
            footer,
        })
    }
}

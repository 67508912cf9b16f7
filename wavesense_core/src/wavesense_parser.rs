//! The "PARSE" Engine - UART frame recovery
//!
//! Turns a noisy radar byte stream into validated [`DetectionFrame`]s:
//! - One state machine shape shared by both radar dialects
//! - Deterministic resync after corruption (whole frames dropped, never
//!   partial output)
//! - No blocking, no allocation; all failures are counters
//!
//! Two dialects are supported:
//! - **Tracking**: 40-byte frames carrying up to 3 target slots with
//!   position/speed/resolution words
//! - **Presence**: 39-byte engineering frames carrying a target state,
//!   distances and per-gate energies

use crate::types::{Detection, DetectionFrame, MAX_TARGETS, X_RANGE_MM, Y_RANGE_MM};
use serde::Serialize;

// ============================================================================
// WIRE CONSTANTS
// ============================================================================

/// Tracking dialect delimiters and layout.
///
/// A tracking frame is exactly [`TRACKING_FRAME_LEN`] bytes:
/// header (4) + 4 x 8-byte target slots (32) + checksum word (2) +
/// footer (2). The radar populates at most [`MAX_TARGETS`] slots; the
/// fourth slot is reserved and never reported.
pub const TRACKING_HEADER: [u8; 4] = [0xAA, 0xFF, 0x03, 0x00];
pub const TRACKING_FOOTER: [u8; 2] = [0x55, 0xCC];
pub const TRACKING_FRAME_LEN: usize = 40;

/// Wire slots per tracking frame (one more than the report capacity).
const WIRE_SLOTS: usize = 4;
const SLOT_LEN: usize = 8;
const SLOTS_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = SLOTS_OFFSET + WIRE_SLOTS * SLOT_LEN;

/// Sign-flag encoding sentinel: sign bit set, magnitude zero, on both
/// axes marks an empty slot.
const SLOT_EMPTY: u16 = 0x8000;

/// Presence dialect delimiters and layout.
///
/// A presence frame is exactly [`PRESENCE_FRAME_LEN`] bytes:
/// header (4) + length word (2) + 29-byte engineering payload + footer
/// (4). The payload is: type `0x01`, head `0xAA`, target state, moving
/// distance/energy, static distance/energy, detection distance, 8 moving
/// gate energies, 8 static gate energies, tail `55 00`.
pub const PRESENCE_HEADER: [u8; 4] = [0xF4, 0xF3, 0xF2, 0xF1];
pub const PRESENCE_FOOTER: [u8; 4] = [0xF8, 0xF7, 0xF6, 0xF5];
pub const PRESENCE_FRAME_LEN: usize = 39;

const PRESENCE_PAYLOAD_LEN: u16 = 29;
const PRESENCE_TYPE_ENGINEERING: u8 = 0x01;
const PRESENCE_HEAD: u8 = 0xAA;
const PRESENCE_TAIL: [u8; 2] = [0x55, 0x00];

/// Number of range gates in the presence dialect's energy arrays.
pub const PRESENCE_GATES: usize = 8;

/// Range-gate width of the presence dialect, used as the resolution hint
/// on derived detections.
pub const PRESENCE_GATE_MM: u16 = 750;

const MAX_FRAME_LEN: usize = TRACKING_FRAME_LEN;

// ============================================================================
// DIALECT
// ============================================================================

/// Which radar wire format this parser accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// 40-byte multi-target frames.
    Tracking,
    /// 39-byte engineering presence frames.
    Presence,
}

impl Dialect {
    fn header(self) -> &'static [u8] {
        match self {
            Dialect::Tracking => &TRACKING_HEADER,
            Dialect::Presence => &PRESENCE_HEADER,
        }
    }

    fn frame_len(self) -> usize {
        match self {
            Dialect::Tracking => TRACKING_FRAME_LEN,
            Dialect::Presence => PRESENCE_FRAME_LEN,
        }
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Parser health counters. All failures are soft; the embedding task
/// decides when a counter is worth logging.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ParserStats {
    /// Frames that validated and were emitted.
    pub frames_parsed: u32,

    /// Completed frames that failed validation and were dropped whole.
    pub frames_invalid: u32,

    /// Resync episodes (one per dropped frame).
    pub sync_lost: u32,

    /// Detections clamped into the radar's valid area.
    pub range_clipped: u32,

    /// Total bytes accepted by `feed`.
    pub bytes_consumed: u64,
}

// ============================================================================
// PRESENCE ENGINEERING READING
// ============================================================================

/// Decoded payload of one presence-dialect engineering frame.
///
/// Exposed for host diagnostics; the pipeline itself only consumes the
/// derived [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceReading {
    /// 0 = none, 1 = moving, 2 = static, 3 = both.
    pub target_state: u8,
    pub moving_dist_cm: u16,
    pub moving_energy: u8,
    pub static_dist_cm: u16,
    pub static_energy: u8,
    pub detect_dist_cm: u16,
    pub moving_gate_energy: [u8; PRESENCE_GATES],
    pub static_gate_energy: [u8; PRESENCE_GATES],
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Scanning for the dialect header; `matched` bytes seen so far.
    WaitHeader { matched: usize },
    /// Accumulating the fixed-length remainder; `fill` bytes buffered.
    ReceiveData { fill: usize },
}

/// Stream state machine turning UART bytes into [`DetectionFrame`]s.
///
/// `feed` never blocks and emits at most one frame per call; callers
/// loop until the input is drained. An invalid frame is discarded in
/// whole and the parser rescans for the next header.
pub struct FrameParser {
    dialect: Dialect,
    state: ParseState,
    buf: [u8; MAX_FRAME_LEN],
    stats: ParserStats,
    frame_seq: u32,
    last_presence: Option<PresenceReading>,
}

impl FrameParser {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: ParseState::WaitHeader { matched: 0 },
            buf: [0u8; MAX_FRAME_LEN],
            stats: ParserStats::default(),
            frame_seq: 0,
            last_presence: None,
        }
    }

    /// Consumes a prefix of `bytes` and produces zero or one frame.
    ///
    /// Returns `(consumed, frame)`. When a frame is returned, unconsumed
    /// bytes remain for the caller's next `feed`; the embedding task
    /// processes the frame to completion before feeding further bytes,
    /// which is what keeps tick ordering strict.
    pub fn feed(&mut self, bytes: &[u8], now_ms: u32) -> (usize, Option<DetectionFrame>) {
        let header = self.dialect.header();
        let frame_len = self.dialect.frame_len();

        for (i, &byte) in bytes.iter().enumerate() {
            self.stats.bytes_consumed += 1;
            match self.state {
                ParseState::WaitHeader { matched } => {
                    if byte == header[matched] {
                        let matched = matched + 1;
                        if matched == header.len() {
                            self.buf[..header.len()].copy_from_slice(header);
                            self.state = ParseState::ReceiveData {
                                fill: header.len(),
                            };
                        } else {
                            self.state = ParseState::WaitHeader { matched };
                        }
                    } else {
                        // Re-test the current byte against header[0] so a
                        // false prefix does not eat the next candidate.
                        let matched = if byte == header[0] { 1 } else { 0 };
                        self.state = ParseState::WaitHeader { matched };
                    }
                }
                ParseState::ReceiveData { fill } => {
                    self.buf[fill] = byte;
                    let fill = fill + 1;
                    if fill < frame_len {
                        self.state = ParseState::ReceiveData { fill };
                    } else {
                        self.state = ParseState::WaitHeader { matched: 0 };
                        if let Some(frame) = self.finalize(now_ms) {
                            return (i + 1, Some(frame));
                        }
                    }
                }
            }
        }
        (bytes.len(), None)
    }

    /// Validates the buffered frame; emits it or drops it whole.
    fn finalize(&mut self, now_ms: u32) -> Option<DetectionFrame> {
        let decoded = match self.dialect {
            Dialect::Tracking => self.decode_tracking(),
            Dialect::Presence => self.decode_presence(),
        };
        match decoded {
            Some(mut frame) => {
                frame.timestamp_ms = now_ms;
                frame.seq = self.frame_seq;
                self.frame_seq = self.frame_seq.wrapping_add(1);
                self.stats.frames_parsed += 1;
                Some(frame)
            }
            None => {
                self.stats.frames_invalid += 1;
                self.stats.sync_lost += 1;
                None
            }
        }
    }

    /// Read-only counters.
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Sequence number the next emitted frame will carry. Wraps at 2^32.
    pub fn frame_seq(&self) -> u32 {
        self.frame_seq
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Engineering payload of the most recent presence frame, if any.
    pub fn last_presence(&self) -> Option<&PresenceReading> {
        self.last_presence.as_ref()
    }

    // ------------------------------------------------------------------
    // Tracking dialect
    // ------------------------------------------------------------------

    fn decode_tracking(&mut self) -> Option<DetectionFrame> {
        let buf = &self.buf[..TRACKING_FRAME_LEN];
        if buf[TRACKING_FRAME_LEN - 2..] != TRACKING_FOOTER {
            return None;
        }
        if !tracking_checksum_ok(buf) {
            return None;
        }

        let mut frame = DetectionFrame::default();
        let mut count = 0u8;
        for slot in 0..MAX_TARGETS {
            let o = SLOTS_OFFSET + slot * SLOT_LEN;
            let x_raw = le16(buf[o], buf[o + 1]);
            let y_raw = le16(buf[o + 2], buf[o + 3]);
            let speed_raw = le16(buf[o + 4], buf[o + 5]);
            let resolution_mm = le16(buf[o + 6], buf[o + 7]);

            if x_raw == SLOT_EMPTY && y_raw == SLOT_EMPTY {
                continue;
            }

            let x_mm = decode_sign_flag(x_raw);
            let y_mm = decode_sign_flag(y_raw);
            let speed_cm_s = decode_sign_flag(speed_raw);
            let speed_mm_s =
                (speed_cm_s as i32 * 10).clamp(i16::MIN as i32, i16::MAX as i32) as i16;

            let (x_mm, y_mm, clipped) = clip_position(x_mm, y_mm);
            if clipped {
                self.stats.range_clipped += 1;
            }

            frame.detections[slot] = Detection {
                x_mm,
                y_mm,
                speed_mm_s,
                resolution_mm,
                quality: quality_from_resolution(resolution_mm),
                valid: true,
            };
            count += 1;
        }
        // slot 4 is reserved; parsed bytes are covered by the checksum
        // but carry no detection.
        frame.target_count = count;
        Some(frame)
    }

    // ------------------------------------------------------------------
    // Presence dialect
    // ------------------------------------------------------------------

    fn decode_presence(&mut self) -> Option<DetectionFrame> {
        let buf = &self.buf[..PRESENCE_FRAME_LEN];
        if buf[PRESENCE_FRAME_LEN - 4..] != PRESENCE_FOOTER {
            return None;
        }
        if le16(buf[4], buf[5]) != PRESENCE_PAYLOAD_LEN {
            return None;
        }
        if buf[6] != PRESENCE_TYPE_ENGINEERING || buf[7] != PRESENCE_HEAD {
            return None;
        }
        if buf[33..35] != PRESENCE_TAIL {
            return None;
        }

        let mut moving_gate_energy = [0u8; PRESENCE_GATES];
        moving_gate_energy.copy_from_slice(&buf[17..17 + PRESENCE_GATES]);
        let mut static_gate_energy = [0u8; PRESENCE_GATES];
        static_gate_energy.copy_from_slice(&buf[25..25 + PRESENCE_GATES]);

        let reading = PresenceReading {
            target_state: buf[8],
            moving_dist_cm: le16(buf[9], buf[10]),
            moving_energy: buf[11],
            static_dist_cm: le16(buf[12], buf[13]),
            static_energy: buf[14],
            detect_dist_cm: le16(buf[15], buf[16]),
            moving_gate_energy,
            static_gate_energy,
        };
        self.last_presence = Some(reading);

        let mut frame = DetectionFrame::default();
        if reading.target_state != 0 {
            let y_mm = (reading.detect_dist_cm as i32 * 10).min(Y_RANGE_MM.1) as i16;
            let energy = if reading.target_state & 0x01 != 0 {
                reading.moving_energy
            } else {
                reading.static_energy
            };
            frame.detections[0] = Detection {
                x_mm: 0,
                y_mm,
                speed_mm_s: 0,
                resolution_mm: PRESENCE_GATE_MM,
                quality: energy.min(100),
                valid: true,
            };
            frame.target_count = 1;
        }
        Some(frame)
    }
}

// ============================================================================
// WIRE HELPERS
// ============================================================================

fn le16(lo: u8, hi: u8) -> u16 {
    u16::from_le_bytes([lo, hi])
}

/// Sign-flag decoding: high bit 1 = positive, 0 = negative; the
/// remaining 15 bits are the magnitude.
fn decode_sign_flag(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        magnitude
    } else {
        -magnitude
    }
}

/// Sign-flag encoding, inverse of [`decode_sign_flag`]. Note that
/// `encode_sign_flag(0) == 0x8000`, which doubles as the empty-slot
/// sentinel; an "occupied slot at the exact origin" is not
/// representable, by radar convention.
fn encode_sign_flag(value: i16) -> u16 {
    if value >= 0 {
        0x8000 | value as u16
    } else {
        value.unsigned_abs()
    }
}

fn clip_position(x_mm: i16, y_mm: i16) -> (i16, i16, bool) {
    let cx = x_mm.clamp(X_RANGE_MM.0 as i16, X_RANGE_MM.1 as i16);
    let cy = y_mm.clamp(Y_RANGE_MM.0 as i16, Y_RANGE_MM.1 as i16);
    (cx, cy, cx != x_mm || cy != y_mm)
}

/// Signal quality from the sensor's distance-resolution hint: a finer
/// resolution means a cleaner return.
fn quality_from_resolution(resolution_mm: u16) -> u8 {
    (100 - (resolution_mm / 10).min(80)) as u8
}

/// Tracking checksum: 16-bit little-endian byte sum over header + slots.
///
/// Shipping firmware emits a zero placeholder in this word, so a zero
/// field is accepted as "checksum not enforced"; a non-zero field must
/// match the computed sum.
fn tracking_checksum_ok(buf: &[u8]) -> bool {
    let field = le16(buf[CHECKSUM_OFFSET], buf[CHECKSUM_OFFSET + 1]);
    field == 0 || field == tracking_checksum(&buf[..CHECKSUM_OFFSET])
}

fn tracking_checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

// ============================================================================
// ENCODERS (test harnesses and simulators)
// ============================================================================

/// Encodes up to [`MAX_TARGETS`] detections as one tracking frame.
///
/// Invalid or missing slots are written as the empty-slot sentinel; the
/// checksum word carries the computed byte sum.
pub fn encode_tracking_frame(detections: &[Detection]) -> [u8; TRACKING_FRAME_LEN] {
    let mut buf = [0u8; TRACKING_FRAME_LEN];
    buf[..4].copy_from_slice(&TRACKING_HEADER);

    for slot in 0..WIRE_SLOTS {
        let o = SLOTS_OFFSET + slot * SLOT_LEN;
        let det = detections.get(slot).filter(|d| d.valid && slot < MAX_TARGETS);
        match det {
            Some(d) => {
                let speed_cm_s = (d.speed_mm_s / 10).clamp(-0x7FFF, 0x7FFF);
                buf[o..o + 2].copy_from_slice(&encode_sign_flag(d.x_mm).to_le_bytes());
                buf[o + 2..o + 4].copy_from_slice(&encode_sign_flag(d.y_mm).to_le_bytes());
                buf[o + 4..o + 6].copy_from_slice(&encode_sign_flag(speed_cm_s).to_le_bytes());
                buf[o + 6..o + 8].copy_from_slice(&d.resolution_mm.to_le_bytes());
            }
            None => {
                buf[o..o + 2].copy_from_slice(&SLOT_EMPTY.to_le_bytes());
                buf[o + 2..o + 4].copy_from_slice(&SLOT_EMPTY.to_le_bytes());
                buf[o + 4..o + 6].copy_from_slice(&encode_sign_flag(0).to_le_bytes());
                buf[o + 6..o + 8].copy_from_slice(&0u16.to_le_bytes());
            }
        }
    }

    let sum = tracking_checksum(&buf[..CHECKSUM_OFFSET]);
    buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_le_bytes());
    buf[TRACKING_FRAME_LEN - 2..].copy_from_slice(&TRACKING_FOOTER);
    buf
}

/// Encodes one presence engineering frame.
pub fn encode_presence_frame(reading: &PresenceReading) -> [u8; PRESENCE_FRAME_LEN] {
    let mut buf = [0u8; PRESENCE_FRAME_LEN];
    buf[..4].copy_from_slice(&PRESENCE_HEADER);
    buf[4..6].copy_from_slice(&PRESENCE_PAYLOAD_LEN.to_le_bytes());
    buf[6] = PRESENCE_TYPE_ENGINEERING;
    buf[7] = PRESENCE_HEAD;
    buf[8] = reading.target_state;
    buf[9..11].copy_from_slice(&reading.moving_dist_cm.to_le_bytes());
    buf[11] = reading.moving_energy;
    buf[12..14].copy_from_slice(&reading.static_dist_cm.to_le_bytes());
    buf[14] = reading.static_energy;
    buf[15..17].copy_from_slice(&reading.detect_dist_cm.to_le_bytes());
    buf[17..17 + PRESENCE_GATES].copy_from_slice(&reading.moving_gate_energy);
    buf[25..25 + PRESENCE_GATES].copy_from_slice(&reading.static_gate_energy);
    buf[33..35].copy_from_slice(&PRESENCE_TAIL);
    buf[35..].copy_from_slice(&PRESENCE_FOOTER);
    buf
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn det(x_mm: i16, y_mm: i16, speed_mm_s: i16) -> Detection {
        Detection {
            x_mm,
            y_mm,
            speed_mm_s,
            resolution_mm: 100,
            quality: 0,
            valid: true,
        }
    }

    fn feed_all(parser: &mut FrameParser, mut bytes: &[u8]) -> Vec<DetectionFrame> {
        let mut frames = Vec::new();
        while !bytes.is_empty() {
            let (consumed, frame) = parser.feed(bytes, 1000);
            frames.extend(frame);
            bytes = &bytes[consumed..];
        }
        frames
    }

    #[test]
    fn parses_single_tracking_frame() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let frame_bytes = encode_tracking_frame(&[det(1000, 2000, -150)]);

        let frames = feed_all(&mut parser, &frame_bytes);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.target_count, 1);
        assert!(frame.detections[0].valid);
        assert_eq!(frame.detections[0].x_mm, 1000);
        assert_eq!(frame.detections[0].y_mm, 2000);
        assert_eq!(frame.detections[0].speed_mm_s, -150);
        assert!(!frame.detections[1].valid);

        let stats = parser.stats();
        assert_eq!(stats.frames_parsed, 1);
        assert_eq!(stats.frames_invalid, 0);
    }

    #[test]
    fn negative_coordinates_round_trip() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let frame_bytes = encode_tracking_frame(&[det(-2500, 1200, 340)]);

        let frames = feed_all(&mut parser, &frame_bytes);
        assert_eq!(frames[0].detections[0].x_mm, -2500);
        assert_eq!(frames[0].detections[0].speed_mm_s, 340);
    }

    #[test]
    fn garbage_prefix_never_counts_as_invalid() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        // 37 bytes that never complete a frame (no header run).
        let mut bytes: Vec<u8> = (0u8..37).map(|b| b.wrapping_mul(7)).collect();
        bytes.extend_from_slice(&encode_tracking_frame(&[det(500, 900, 0)]));

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(parser.stats().frames_parsed, 1);
        assert_eq!(parser.stats().frames_invalid, 0);
    }

    #[test]
    fn false_header_prefix_does_not_lose_next_header() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        // 0xAA then a real header: the mismatching second byte (0xAA)
        // must itself restart the match.
        let mut bytes = vec![0xAA];
        bytes.extend_from_slice(&encode_tracking_frame(&[det(100, 100, 0)]));

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn corrupt_footer_drops_whole_frame_and_resyncs() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let mut bad = encode_tracking_frame(&[det(100, 100, 0)]);
        bad[TRACKING_FRAME_LEN - 1] = 0x00;
        let good = encode_tracking_frame(&[det(700, 1400, 0)]);

        let mut bytes = bad.to_vec();
        bytes.extend_from_slice(&good);
        let frames = feed_all(&mut parser, &bytes);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].detections[0].x_mm, 700);
        let stats = parser.stats();
        assert_eq!(stats.frames_parsed, 1);
        assert_eq!(stats.frames_invalid, 1);
        assert_eq!(stats.sync_lost, 1);
    }

    #[test]
    fn zero_checksum_placeholder_is_accepted() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let mut bytes = encode_tracking_frame(&[det(100, 100, 0)]);
        bytes[CHECKSUM_OFFSET] = 0;
        bytes[CHECKSUM_OFFSET + 1] = 0;

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn wrong_checksum_is_rejected() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let mut bytes = encode_tracking_frame(&[det(100, 100, 0)]);
        bytes[CHECKSUM_OFFSET] ^= 0x5A;

        let frames = feed_all(&mut parser, &bytes);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().frames_invalid, 1);
    }

    #[test]
    fn empty_frame_has_zero_targets() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let bytes = encode_tracking_frame(&[]);

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].target_count, 0);
        assert!(frames[0].valid_detections().next().is_none());
    }

    #[test]
    fn target_count_counts_valid_slots_not_indices() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        // slot 0 empty, slot 1 occupied
        let empty = Detection::default();
        let bytes = encode_tracking_frame(&[empty, det(300, 800, 0)]);

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames[0].target_count, 1);
        assert!(!frames[0].detections[0].valid);
        assert!(frames[0].detections[1].valid);
    }

    #[test]
    fn out_of_range_positions_are_clamped_and_counted() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let bytes = encode_tracking_frame(&[det(6500, -100, 0)]);

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames[0].detections[0].x_mm, 6000);
        assert_eq!(frames[0].detections[0].y_mm, 0);
        assert_eq!(parser.stats().range_clipped, 1);
    }

    #[test]
    fn frame_seq_is_monotonic() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let bytes = encode_tracking_frame(&[det(100, 100, 0)]);
        let mut all = Vec::new();
        for _ in 0..3 {
            all.extend_from_slice(&bytes);
        }
        let frames = feed_all(&mut parser, &all);
        let seqs: Vec<u32> = frames.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn presence_frame_decodes_to_single_detection() {
        let mut parser = FrameParser::new(Dialect::Presence);
        let reading = PresenceReading {
            target_state: 1,
            moving_dist_cm: 180,
            moving_energy: 55,
            static_dist_cm: 0,
            static_energy: 0,
            detect_dist_cm: 180,
            moving_gate_energy: [10, 20, 55, 8, 0, 0, 0, 0],
            static_gate_energy: [0; PRESENCE_GATES],
        };
        let bytes = encode_presence_frame(&reading);

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].target_count, 1);
        assert_eq!(frames[0].detections[0].y_mm, 1800);
        assert_eq!(frames[0].detections[0].quality, 55);
        assert_eq!(parser.last_presence().unwrap().moving_dist_cm, 180);
    }

    #[test]
    fn presence_no_target_yields_empty_frame() {
        let mut parser = FrameParser::new(Dialect::Presence);
        let reading = PresenceReading {
            target_state: 0,
            moving_dist_cm: 0,
            moving_energy: 0,
            static_dist_cm: 0,
            static_energy: 0,
            detect_dist_cm: 0,
            moving_gate_energy: [0; PRESENCE_GATES],
            static_gate_energy: [0; PRESENCE_GATES],
        };
        let bytes = encode_presence_frame(&reading);

        let frames = feed_all(&mut parser, &bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].target_count, 0);
    }

    #[test]
    fn presence_bad_tail_is_rejected() {
        let mut parser = FrameParser::new(Dialect::Presence);
        let reading = PresenceReading {
            target_state: 2,
            moving_dist_cm: 0,
            moving_energy: 0,
            static_dist_cm: 220,
            static_energy: 40,
            detect_dist_cm: 220,
            moving_gate_energy: [0; PRESENCE_GATES],
            static_gate_energy: [0; PRESENCE_GATES],
        };
        let mut bytes = encode_presence_frame(&reading);
        bytes[33] = 0x00;

        let frames = feed_all(&mut parser, &bytes);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().frames_invalid, 1);
    }

    #[test]
    fn completion_accounting_has_no_phantom_frames() {
        let mut parser = FrameParser::new(Dialect::Tracking);
        let good = encode_tracking_frame(&[det(100, 100, 0)]);
        let mut bad = good;
        bad[CHECKSUM_OFFSET] ^= 1;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&good);
        bytes.extend_from_slice(&bad);
        bytes.extend_from_slice(&good);
        let frames = feed_all(&mut parser, &bytes);

        let stats = parser.stats();
        assert_eq!(frames.len() as u32, stats.frames_parsed);
        assert_eq!(stats.frames_parsed + stats.frames_invalid, 3);
    }

    proptest! {
        /// Byte-at-a-time and arbitrary chunking must produce identical
        /// frame sequences.
        #[test]
        fn chunking_determinism(
            garbage in proptest::collection::vec(any::<u8>(), 0..120),
            xs in proptest::collection::vec(-6000i16..6000, 1..4),
            chunk in 1usize..64,
        ) {
            let mut stream = garbage;
            for &x in &xs {
                stream.extend_from_slice(&encode_tracking_frame(&[det(x, 1500, 0)]));
            }

            let mut byte_wise = FrameParser::new(Dialect::Tracking);
            let mut chunked = FrameParser::new(Dialect::Tracking);

            let mut frames_a = Vec::new();
            for &b in &stream {
                frames_a.extend(feed_all(&mut byte_wise, &[b]));
            }
            let mut frames_b = Vec::new();
            for piece in stream.chunks(chunk) {
                frames_b.extend(feed_all(&mut chunked, piece));
            }

            prop_assert_eq!(frames_a.len(), frames_b.len());
            for (a, b) in frames_a.iter().zip(&frames_b) {
                prop_assert_eq!(a.target_count, b.target_count);
                prop_assert_eq!(a.detections, b.detections);
                prop_assert_eq!(a.seq, b.seq);
            }
            prop_assert_eq!(
                byte_wise.stats().frames_parsed,
                chunked.stats().frames_parsed
            );
            prop_assert_eq!(
                byte_wise.stats().frames_invalid,
                chunked.stats().frames_invalid
            );
        }
    }
}

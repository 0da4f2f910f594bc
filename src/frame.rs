//! Byte-stuffed, CRC-protected framing for the V3 bootloader protocol and the
//! application protocol exchanged with running firmware.
//!
//! Frames are delimited by a flag byte (`FLAG`). Any occurrence of `FLAG` or
//! the escape byte (`ESC`) inside the payload-plus-CRC is byte-stuffed the
//! same way SLIP does it. A 2-byte CRC-16/CCITT trailer protects the payload.

use crate::byteorder::{read_u16_le, write_u16_le};

const FLAG: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_FLAG: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Application-protocol write-parameter response opcode.
pub(crate) const APP_WRITE_PARAM_RESPONSE: u8 = 0x0B;
/// Parameter id for the watchdog timeout, used to trigger a UART reset.
pub(crate) const PARAM_WATCHDOG_TIMEOUT: u8 = 0x26;
/// Bootloader magic byte prefixing every V3 bootloader packet.
pub(crate) const BOOTLOADER_MAGIC: u8 = 0x81;

/// CRC-16/CCITT-FALSE, computed bit-by-bit (no lookup table: frames here are
/// at most a few hundred bytes and this runs once per frame, not per byte of
/// a flash image).
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Byte-stuffs `raw` in place, appending to `out`.
fn stuff(raw: &[u8], out: &mut Vec<u8>) {
    for &byte in raw {
        match byte {
            FLAG => out.extend_from_slice(&[ESC, ESC_FLAG]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(byte),
        }
    }
}

/// Encodes `payload` as a complete flag-delimited, CRC-protected frame ready
/// to write to the transport.
pub fn send_flagged(payload: &[u8]) -> Vec<u8> {
    let crc = crc16(payload);

    let mut body = Vec::with_capacity(payload.len() + 2);
    body.extend_from_slice(payload);
    write_u16_le(&mut body, crc);

    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(FLAG);
    stuff(&body, &mut out);
    out.push(FLAG);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Idle,
    InFrame,
    Escape,
    /// A framing error occurred; discard bytes until the next flag.
    Resync,
}

/// Streaming receiver for [`send_flagged`] frames.
///
/// Feed it arbitrary byte chunks with [`FrameDecoder::receive_flagged`]; it
/// invokes the callback exactly once per well-formed frame. Malformed frames
/// (bad CRC, a frame too short to hold a CRC, a bad escape sequence) are
/// silently dropped, and the decoder resynchronizes on the next flag byte.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            buf: Vec::with_capacity(256),
        }
    }

    /// Feeds `bytes` into the decoder, invoking `on_packet` once per
    /// completed, CRC-valid frame.
    pub fn receive_flagged(&mut self, bytes: &[u8], mut on_packet: impl FnMut(&[u8])) {
        for &byte in bytes {
            match self.state {
                DecodeState::Idle => {
                    if byte == FLAG {
                        self.buf.clear();
                        self.state = DecodeState::InFrame;
                    }
                }
                DecodeState::InFrame => match byte {
                    FLAG => self.finish_frame(&mut on_packet),
                    ESC => self.state = DecodeState::Escape,
                    _ => self.buf.push(byte),
                },
                DecodeState::Escape => match byte {
                    ESC_FLAG => {
                        self.buf.push(FLAG);
                        self.state = DecodeState::InFrame;
                    }
                    ESC_ESC => {
                        self.buf.push(ESC);
                        self.state = DecodeState::InFrame;
                    }
                    FLAG => {
                        // Bad escape sequence, but this byte is itself a
                        // fresh frame boundary.
                        self.buf.clear();
                        self.state = DecodeState::InFrame;
                    }
                    _ => self.state = DecodeState::Resync,
                },
                DecodeState::Resync => {
                    if byte == FLAG {
                        self.buf.clear();
                        self.state = DecodeState::InFrame;
                    }
                }
            }
        }
    }

    fn finish_frame(&mut self, on_packet: &mut impl FnMut(&[u8])) {
        if self.buf.len() >= 2 {
            let split = self.buf.len() - 2;
            let expected = read_u16_le(&self.buf[split..]);
            if crc16(&self.buf[..split]) == expected {
                on_packet(&self.buf[..split]);
            }
        }
        // Either way this flag also opens the next frame.
        self.buf.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of classifying a decoded frame payload, per the frame codec's
/// upcall rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedPacket {
    /// An application-protocol write-parameter response that acknowledges
    /// the watchdog-timeout write (parameter `0x26`).
    WatchdogTimeoutAck,
    /// Any other application-protocol write-parameter response.
    OtherWriteParamResponse,
    /// A V3 bootloader packet (payload still prefixed with the `0x81` magic).
    BootloaderData(Vec<u8>),
    /// A packet that matched none of the known shapes.
    Unrecognized,
}

/// Classifies a decoded frame payload.
///
/// Mirrors the frame-codec upcall: payloads starting with the
/// application-protocol write-parameter opcode are inspected for the
/// watchdog-timeout acknowledgement; payloads starting with the bootloader
/// magic byte are handed back verbatim for the engine to copy into its rx
/// buffer.
pub fn classify(payload: &[u8]) -> ClassifiedPacket {
    if payload.first() == Some(&APP_WRITE_PARAM_RESPONSE) && payload.len() >= 8 {
        if payload[7] == PARAM_WATCHDOG_TIMEOUT {
            ClassifiedPacket::WatchdogTimeoutAck
        } else {
            ClassifiedPacket::OtherWriteParamResponse
        }
    } else if payload.first() == Some(&BOOTLOADER_MAGIC) {
        ClassifiedPacket::BootloaderData(payload.to_vec())
    } else {
        ClassifiedPacket::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut dec = FrameDecoder::new();
        let mut packets = Vec::new();
        dec.receive_flagged(bytes, |p| packets.push(p.to_vec()));
        packets
    }

    #[test]
    fn round_trip_is_lossless() {
        let payload = vec![0x81, 0x02, 0x03, 0x04, 0x05];
        let framed = send_flagged(&payload);
        let packets = decode_all(&framed);
        assert_eq!(packets, vec![payload]);
    }

    #[test]
    fn round_trip_with_flag_and_escape_bytes_in_payload() {
        let payload = vec![0xC0, 0xDB, 0x00, 0xC0, 0xDB];
        let framed = send_flagged(&payload);
        let packets = decode_all(&framed);
        assert_eq!(packets, vec![payload]);
    }

    #[test]
    fn bad_crc_is_dropped_silently() {
        let payload = vec![1, 2, 3];
        let mut framed = send_flagged(&payload);
        // Flip a payload bit without touching the CRC trailer.
        let n = framed.len();
        framed[n - 3] ^= 0xFF;
        let packets = decode_all(&framed);
        assert!(packets.is_empty());
    }

    #[test]
    fn resyncs_after_garbage() {
        let payload = vec![9, 9, 9];
        let framed = send_flagged(&payload);
        let mut garbage = vec![0xDB, 0x01, 0x02]; // escape with invalid follower
        garbage.extend_from_slice(&framed);
        let packets = decode_all(&garbage);
        assert_eq!(packets, vec![payload]);
    }

    #[test]
    fn multiple_frames_split_across_feeds() {
        let a = vec![1, 2, 3];
        let b = vec![4, 5, 6, 7];
        let mut stream = send_flagged(&a);
        stream.extend(send_flagged(&b));

        let mut dec = FrameDecoder::new();
        let mut packets = Vec::new();
        for chunk in stream.chunks(3) {
            dec.receive_flagged(chunk, |p| packets.push(p.to_vec()));
        }
        assert_eq!(packets, vec![a, b]);
    }

    #[test]
    fn classifies_watchdog_ack() {
        let mut payload = vec![0x0B, 0, 0, 0, 0, 0, 0, 0x26];
        payload.resize(8, 0);
        payload[7] = 0x26;
        assert_eq!(classify(&payload), ClassifiedPacket::WatchdogTimeoutAck);
    }

    #[test]
    fn classifies_bootloader_data() {
        let payload = vec![0x81, 0x82, 1, 2, 3];
        assert_eq!(
            classify(&payload),
            ClassifiedPacket::BootloaderData(payload)
        );
    }
}

//! Gree (YBOFB remote) state frame and its IR timing sequence.

use std::fmt::Write as _;

use crate::state::{DeviceState, MIN_TEMP_C};

pub const GREE_STATE_LEN: usize = 8;
pub const GREE_CARRIER_KHZ: u32 = 38;

const HDR_MARK_US: u16 = 9_000;
const HDR_SPACE_US: u16 = 4_500;
const BIT_MARK_US: u16 = 620;
const ONE_SPACE_US: u16 = 1_600;
const ZERO_SPACE_US: u16 = 540;
const MSG_SPACE_US: u16 = 19_980;
const BLOCK_FOOTER: u8 = 0b010;
const BLOCK_FOOTER_BITS: u8 = 3;
const CHECKSUM_START: u8 = 10;

const SWING_V_AUTO: u8 = 1;
const UNKNOWN1: u8 = 0b0101;
const UNKNOWN2: u8 = 0b100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreeFrame([u8; GREE_STATE_LEN]);

impl GreeFrame {
    pub fn from_state(state: &DeviceState) -> Self {
        let mut bytes = [0_u8; GREE_STATE_LEN];
        let swing = state.swing();

        bytes[0] = state.mode().code() & 0b111
            | u8::from(state.power()) << 3
            | (state.fan().code() & 0b11) << 4
            | u8::from(swing.auto) << 6
            | u8::from(state.sleep()) << 7;
        bytes[1] = state.temperature().saturating_sub(MIN_TEMP_C) & 0b1111;
        bytes[2] = u8::from(state.turbo()) << 4
            | u8::from(state.light()) << 5
            | u8::from(state.x_fan()) << 7;
        bytes[3] = UNKNOWN1 << 4;
        bytes[4] = if swing.auto {
            SWING_V_AUTO
        } else {
            swing.position.code()
        };
        bytes[5] = UNKNOWN2 << 3;
        bytes[7] = u8::from(state.econo()) << 2;

        let mut frame = Self(bytes);
        frame.0[7] |= frame.checksum() << 4;
        frame
    }

    pub fn bytes(&self) -> &[u8; GREE_STATE_LEN] {
        &self.0
    }

    /// Low nibbles of the first block plus high nibbles of the second,
    /// excluding the checksum byte itself.
    pub fn checksum(&self) -> u8 {
        let low: u8 = self.0[..4]
            .iter()
            .fold(0_u8, |sum, byte| sum.wrapping_add(byte & 0b1111));
        let high: u8 = self.0[4..GREE_STATE_LEN - 1]
            .iter()
            .fold(0_u8, |sum, byte| sum.wrapping_add(byte >> 4));
        CHECKSUM_START.wrapping_add(low).wrapping_add(high) & 0b1111
    }

    pub fn has_valid_checksum(&self) -> bool {
        self.0[7] >> 4 == self.checksum()
    }

    /// Alternating mark/space durations in microseconds, starting with a mark.
    pub fn timings(&self) -> Vec<u16> {
        let mut raw = Vec::with_capacity(2 + GREE_STATE_LEN * 16 + 2 * BLOCK_FOOTER_BITS as usize + 4);
        raw.push(HDR_MARK_US);
        raw.push(HDR_SPACE_US);

        for byte in &self.0[..4] {
            push_bits(&mut raw, *byte, 8);
        }
        push_bits(&mut raw, BLOCK_FOOTER, BLOCK_FOOTER_BITS);
        raw.push(BIT_MARK_US);
        raw.push(MSG_SPACE_US);

        for byte in &self.0[4..] {
            push_bits(&mut raw, *byte, 8);
        }
        raw.push(BIT_MARK_US);
        raw.push(MSG_SPACE_US);
        raw
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(GREE_STATE_LEN * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02X}");
            out
        })
    }
}

fn push_bits(raw: &mut Vec<u16>, value: u8, bits: u8) {
    for bit in 0..bits {
        raw.push(BIT_MARK_US);
        raw.push(if value >> bit & 1 == 1 {
            ONE_SPACE_US
        } else {
            ZERO_SPACE_US
        });
    }
}

/// Hardware seam for emitting a frame.
pub trait IrSink {
    type Error;

    fn transmit(&mut self, frame: &GreeFrame) -> Result<(), Self::Error>;
}

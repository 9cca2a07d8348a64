//! Decoders for the 4x4 block-compressed pixel formats used by the texture
//! container format (8-byte color blocks and 16-byte color+alpha blocks).

use crate::array_ref;

pub const DXT1_BLOCK_SIZE: usize = 8;
pub const DXT3_BLOCK_SIZE: usize = 16;
pub const DXT5_BLOCK_SIZE: usize = 16;

pub type Rgba = [u8; 4];

/// Expands a 5:6:5 endpoint color to 8 bits per channel.
#[inline]
fn expand_565(c: u16) -> [u32; 3] {
    let c = c as u32;
    [
        ((c >> 11 & 0x1f) * 527 + 23) >> 6,
        ((c >> 5 & 0x3f) * 259 + 33) >> 6,
        ((c & 0x1f) * 527 + 23) >> 6,
    ]
}

/// Decodes the color half of a block into the 4-entry palette.
///
/// In 4-color mode (`c0 > c1`, or always for the 16-byte formats, which
/// carry alpha separately) the two middle entries are 2/3 and 1/3 blends.
/// In 3-color mode the middle entry is the average and the 4th entry is
/// transparent black.
fn color_palette(block: &[u8; 8], opaque_mode: bool) -> [Rgba; 4] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let e0 = expand_565(c0);
    let e1 = expand_565(c1);

    let mut palette = [[0u8; 4]; 4];
    palette[0] = [e0[0] as u8, e0[1] as u8, e0[2] as u8, 255];
    palette[1] = [e1[0] as u8, e1[1] as u8, e1[2] as u8, 255];
    if c0 > c1 || opaque_mode {
        for ch in 0..3 {
            palette[2][ch] = (((2 * e0[ch] + e1[ch] + 1) / 3) & 0xff) as u8;
            palette[3][ch] = (((e0[ch] + 2 * e1[ch] + 1) / 3) & 0xff) as u8;
        }
        palette[2][3] = 255;
        palette[3][3] = 255;
    } else {
        for ch in 0..3 {
            palette[2][ch] = (((e0[ch] + e1[ch] + 1) >> 1) & 0xff) as u8;
        }
        palette[2][3] = 255;
        palette[3] = [0, 0, 0, 0];
    }
    palette
}

fn color_block(block: &[u8; 8], opaque_mode: bool) -> [Rgba; 16] {
    let palette = color_palette(block, opaque_mode);
    let mut indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let mut out = [[0u8; 4]; 16];
    for texel in &mut out {
        *texel = palette[(indices & 0x3) as usize];
        indices >>= 2;
    }
    out
}

/// 8-byte block: two 5:6:5 endpoints, 2-bit palette indices, implicit or
/// 1-bit alpha via the 3-color mode's transparent entry.
pub fn decode_dxt1_block(block: &[u8; DXT1_BLOCK_SIZE]) -> [Rgba; 16] {
    color_block(block, false)
}

/// 16-byte block: 4-bit explicit alpha per texel, then an opaque-mode color
/// block.
pub fn decode_dxt3_block(block: &[u8; DXT3_BLOCK_SIZE]) -> [Rgba; 16] {
    let mut out = color_block(array_ref!(block, 8, 8), true);
    let alpha = u64::from_le_bytes(*array_ref!(block, 0, 8));
    for (i, texel) in out.iter_mut().enumerate() {
        texel[3] = (((alpha >> (4 * i)) & 0xf) * 17) as u8;
    }
    out
}

/// Builds the 8-level alpha ramp from the two stored endpoints.
///
/// Descending (or equal) endpoints select the 6-step ramp whose last two
/// entries are the hard constants 0 and 255, so fully-transparent and
/// fully-opaque texels survive even when the endpoints cannot express them.
pub fn alpha_ramp(a0: u8, a1: u8) -> [u8; 8] {
    let (a0, a1) = (a0 as u32, a1 as u32);
    let mut ramp = [0u8; 8];
    ramp[0] = a0 as u8;
    ramp[1] = a1 as u8;
    if a0 > a1 {
        for i in 2..8 {
            ramp[i] = (((8 - i as u32) * a0 + (i as u32 - 1) * a1 + 3) / 7) as u8;
        }
    } else {
        for i in 2..6 {
            ramp[i] = (((6 - i as u32) * a0 + (i as u32 - 1) * a1 + 2) / 5) as u8;
        }
        ramp[6] = 0;
        ramp[7] = 255;
    }
    ramp
}

/// 16-byte block: 8-level interpolated alpha (two endpoints + 3-bit codes),
/// then an opaque-mode color block.
pub fn decode_dxt5_block(block: &[u8; DXT5_BLOCK_SIZE]) -> [Rgba; 16] {
    let mut out = color_block(array_ref!(block, 8, 8), true);
    let ramp = alpha_ramp(block[0], block[1]);
    // 16 3-bit codes packed little-endian across 6 bytes.
    let mut codes = 0u64;
    for (i, &b) in block[2..8].iter().enumerate() {
        codes |= (b as u64) << (8 * i);
    }
    for (i, texel) in out.iter_mut().enumerate() {
        texel[3] = ramp[((codes >> (3 * i)) & 0x7) as usize];
    }
    out
}

//! Texture container format: a fixed header, an optional low-res thumbnail,
//! then the mip chain stored smallest-first with all frames of a mip
//! consecutive.

use binrw::binrw;
use image::{Rgba, RgbaImage};

use crate::{
    array_ref,
    format::FourCC,
    util::{
        dxt::{decode_dxt1_block, decode_dxt3_block, decode_dxt5_block},
        read::DataCursor,
    },
    DecodeError, Result,
};

pub const VTF_MAGIC: [u8; 4] = *b"VTF\0";
pub const VTF_VERSION: [u32; 2] = [7, 2];

#[binrw]
#[derive(Clone, Debug)]
pub struct VtfHeader {
    pub signature: [u8; 4],
    pub version: [u32; 2],
    pub header_size: u32,
    pub width: u16,
    pub height: u16,
    pub flags: u32,
    pub frames: u16,
    pub first_frame: u16,
    #[brw(pad_before = 4)]
    pub reflectivity: [f32; 3],
    #[brw(pad_before = 4)]
    pub bumpmap_scale: f32,
    pub high_res_format: i32,
    pub mip_count: u8,
    pub low_res_format: i32,
    pub low_res_width: u8,
    pub low_res_height: u8,
    pub depth: u16,
}

/// Pixel formats this decoder understands. Anything else surfaces as
/// [`DecodeError::UnsupportedPixelFormat`] carrying the raw value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Rgba8888,
    Abgr8888,
    Rgb888,
    Bgr888,
    Argb8888,
    Bgra8888,
    Bgrx8888,
    Dxt1,
    Dxt3,
    Dxt5,
}

impl PixelFormat {
    pub fn from_value(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::Rgba8888,
            1 => Self::Abgr8888,
            2 => Self::Rgb888,
            3 => Self::Bgr888,
            11 => Self::Argb8888,
            12 => Self::Bgra8888,
            13 => Self::Dxt1,
            14 => Self::Dxt3,
            15 => Self::Dxt5,
            16 => Self::Bgrx8888,
            _ => return None,
        })
    }

    pub fn is_block_compressed(self) -> bool {
        matches!(self, Self::Dxt1 | Self::Dxt3 | Self::Dxt5)
    }

    fn bytes_per_pixel(self) -> u64 {
        match self {
            Self::Rgb888 | Self::Bgr888 => 3,
            _ => 4,
        }
    }

    /// Stored byte size of one `width` x `height` image in this format.
    /// Block formats round dimensions up to whole 4x4 blocks.
    pub fn data_size(self, width: u32, height: u32) -> u64 {
        match self {
            Self::Dxt1 => block_count(width, height) * 8,
            Self::Dxt3 | Self::Dxt5 => block_count(width, height) * 16,
            _ => width as u64 * height as u64 * self.bytes_per_pixel(),
        }
    }
}

#[inline]
fn block_count(width: u32, height: u32) -> u64 {
    ((width as u64 + 3) / 4) * ((height as u64 + 3) / 4)
}

pub struct VtfFile<'a> {
    data: &'a [u8],
    pub header: VtfHeader,
}

impl<'a> VtfFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = DataCursor::new(data);
        let header: VtfHeader = cursor.read()?;
        if header.signature != VTF_MAGIC {
            return Err(DecodeError::MalformedHeader(format!(
                "bad texture magic {:?}",
                FourCC(header.signature)
            )));
        }
        if header.version != VTF_VERSION {
            return Err(DecodeError::MalformedHeader(format!(
                "unsupported texture version {}.{}",
                header.version[0], header.version[1]
            )));
        }
        Ok(Self { data, header })
    }

    pub fn width(&self) -> u32 { self.header.width as u32 }

    pub fn height(&self) -> u32 { self.header.height as u32 }

    pub fn format(&self) -> Result<PixelFormat> {
        PixelFormat::from_value(self.header.high_res_format)
            .ok_or(DecodeError::UnsupportedPixelFormat(self.header.high_res_format))
    }

    /// Decodes the first frame of the top mip to RGBA.
    pub fn decode(&self) -> Result<RgbaImage> {
        let format = self.format()?;
        let (width, height) = (self.width(), self.height());
        let offset = self.top_mip_offset(format)?;
        let data = DataCursor::new(self.data).slice(offset, format.data_size(width, height))?;
        decode_image(data, width, height, format)
    }

    /// Byte offset of the top mip's first frame: past the header, the
    /// thumbnail, and every smaller mip (each mip holds all frames).
    fn top_mip_offset(&self, format: PixelFormat) -> Result<u64> {
        let mut offset = self.header.header_size as u64;

        if self.header.low_res_format >= 0
            && self.header.low_res_width > 0
            && self.header.low_res_height > 0
        {
            let low_format = PixelFormat::from_value(self.header.low_res_format)
                .ok_or(DecodeError::UnsupportedPixelFormat(self.header.low_res_format))?;
            offset +=
                low_format.data_size(self.header.low_res_width as u32, self.header.low_res_height as u32);
        }

        let frames = self.header.frames.max(1) as u64;
        for mip in 1..self.header.mip_count as u32 {
            let width = (self.width() >> mip).max(1);
            let height = (self.height() >> mip).max(1);
            offset += frames * format.data_size(width, height);
        }
        Ok(offset)
    }
}

fn decode_image(data: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<RgbaImage> {
    if format.is_block_compressed() {
        return decode_blocks(data, width, height, format);
    }
    let bpp = format.bytes_per_pixel() as usize;
    let mut image = RgbaImage::new(width, height);
    for (i, pixel) in image.pixels_mut().enumerate() {
        let p = &data[i * bpp..(i + 1) * bpp];
        *pixel = Rgba(match format {
            PixelFormat::Rgba8888 => [p[0], p[1], p[2], p[3]],
            PixelFormat::Abgr8888 => [p[3], p[2], p[1], p[0]],
            PixelFormat::Rgb888 => [p[0], p[1], p[2], 255],
            PixelFormat::Bgr888 => [p[2], p[1], p[0], 255],
            PixelFormat::Argb8888 => [p[1], p[2], p[3], p[0]],
            PixelFormat::Bgra8888 => [p[2], p[1], p[0], p[3]],
            PixelFormat::Bgrx8888 => [p[2], p[1], p[0], 255],
            _ => unreachable!(),
        });
    }
    Ok(image)
}

fn decode_blocks(data: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<RgbaImage> {
    let block_size = match format {
        PixelFormat::Dxt1 => 8,
        _ => 16,
    };
    let blocks_x = (width + 3) / 4;
    let blocks_y = (height + 3) / 4;

    let mut image = RgbaImage::new(width, height);
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let start = (by * blocks_x + bx) as usize * block_size;
            let texels = match format {
                PixelFormat::Dxt1 => decode_dxt1_block(array_ref!(data, start, 8)),
                PixelFormat::Dxt3 => decode_dxt3_block(array_ref!(data, start, 16)),
                PixelFormat::Dxt5 => decode_dxt5_block(array_ref!(data, start, 16)),
                _ => unreachable!(),
            };
            for ty in 0..4 {
                for tx in 0..4 {
                    let (x, y) = (bx * 4 + tx, by * 4 + ty);
                    // Block padding past the true image edge is discarded.
                    if x < width && y < height {
                        image.put_pixel(x, y, Rgba(texels[(ty * 4 + tx) as usize]));
                    }
                }
            }
        }
    }
    Ok(image)
}

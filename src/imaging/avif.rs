//! AVIF decoding with avif-parse (container) and rav1d (AV1 bitstream).
//!
//! The `image` crate's `"avif"` feature only provides the rav1e encoder.
//! Its decoder needs the `"avif-native"` feature, which links the C library
//! dav1d, so decoding goes through `rav1d` (the pure Rust port) directly.

use super::codec::CodecError;
use image::{DynamicImage, RgbImage};
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib as dav1d;
use std::io::Cursor;
use std::ptr::NonNull;

fn parse(bytes: &[u8]) -> Result<avif_parse::AvifData, CodecError> {
    avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| CodecError::Decode(format!("failed to parse AVIF container: {e:?}")))
}

/// Decode the primary item of an AVIF file to RGB8.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    let avif = parse(bytes)?;
    let av1_bytes: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let Some(settings_ptr) = NonNull::new(settings.as_mut_ptr()) else {
        return Err(CodecError::Decode("rav1d settings pointer is null".into()));
    };
    unsafe { dav1d::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(CodecError::Decode(format!("rav1d open failed ({})", rc.0)));
    }

    let mut data = Dav1dData::default();
    let buf_ptr = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(CodecError::Decode("rav1d data_create failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(CodecError::Decode(format!(
            "rav1d send_data failed ({})",
            rc.0
        )));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(CodecError::Decode(format!(
            "rav1d get_picture failed ({})",
            rc.0
        )));
    }

    let rgb = picture_to_rgb(&pic);

    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }

    let (width, height, rgb) = rgb?;
    RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| CodecError::Decode("decoded AVIF planes do not fill the frame".into()))
}

/// Convert a decoded picture to interleaved RGB8. The picture is still owned
/// by the decoder; the caller unrefs it afterwards.
fn picture_to_rgb(pic: &Dav1dPicture) -> Result<(u32, u32, Vec<u8>), CodecError> {
    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let layout = pic.p.layout;
    let plane = |i: usize| {
        pic.data[i]
            .map(|p| p.as_ptr() as *const u8)
            .ok_or_else(|| CodecError::Decode(format!("AVIF picture is missing plane {i}")))
    };
    let y_ptr = plane(0)?;

    let planes = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride: pic.stride[0],
            uv_stride: 0,
            width,
            height,
            bpc: pic.p.bpc as u32,
            ss_x: false,
            ss_y: false,
            monochrome: true,
        }
    } else {
        let (ss_x, ss_y) = match layout {
            DAV1D_PIXEL_LAYOUT_I420 => (true, true),
            DAV1D_PIXEL_LAYOUT_I422 => (true, false),
            DAV1D_PIXEL_LAYOUT_I444 => (false, false),
            _ => {
                return Err(CodecError::Decode(format!(
                    "unsupported AVIF pixel layout: {layout}"
                )));
            }
        };
        YuvPlanes {
            y_ptr,
            u_ptr: plane(1)?,
            v_ptr: plane(2)?,
            y_stride: pic.stride[0],
            uv_stride: pic.stride[1],
            width,
            height,
            bpc: pic.p.bpc as u32,
            ss_x,
            ss_y,
            monochrome: false,
        }
    };
    Ok((width, height, planes.to_rgb()))
}

/// Borrowed YUV plane pointers from a decoded picture.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling, horizontal and vertical (I420 = true, true).
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// BT.601 YCbCr to interleaved RGB8.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = vec![0u8; (self.width * self.height * 3) as usize];
        for row in 0..self.height {
            for col in 0..self.width {
                let y = read_sample(self.y_ptr, self.y_stride, col, row, self.bpc);
                let (r, g, b) = if self.monochrome {
                    let v = (y * scale).clamp(0.0, 255.0);
                    (v, v, v)
                } else {
                    let u_col = if self.ss_x { col / 2 } else { col };
                    let u_row = if self.ss_y { row / 2 } else { row };
                    let cb = read_sample(self.u_ptr, self.uv_stride, u_col, u_row, self.bpc) - center;
                    let cr = read_sample(self.v_ptr, self.uv_stride, u_col, u_row, self.bpc) - center;
                    (
                        ((y + 1.402 * cr) * scale).clamp(0.0, 255.0),
                        ((y - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0),
                        ((y + 1.772 * cb) * scale).clamp(0.0, 255.0),
                    )
                };
                let idx = ((row * self.width + col) * 3) as usize;
                rgb[idx] = r as u8;
                rgb[idx + 1] = g as u8;
                rgb[idx + 2] = b as u8;
            }
        }
        rgb
    }
}

/// One plane sample; 10 and 12 bit depths are stored as u16.
#[inline]
fn read_sample(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { (ptr.offset(byte_offset) as *const u16).read_unaligned() }) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::avif::AvifEncoder;

    fn avif_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut buf, 8, 85))
            .unwrap();
        buf
    }

    #[test]
    fn decode_roundtrip_keeps_dimensions() {
        let decoded = decode(&avif_bytes(64, 48)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode(b"definitely not an avif file"),
            Err(CodecError::Decode(_))
        ));
    }
}

use pdf_writer::{Filter, Pdf, Ref};

use crate::error::Error;
use crate::model::{EmbeddedImage, ImageFormat};

/// Pixel size and component count from a JPEG's start-of-frame segment.
fn jpeg_frame(data: &[u8]) -> Option<(u32, u32, u8)> {
    let mut i = 2;
    while i + 4 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xD9 || marker == 0xDA {
            break;
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        // SOF0..SOF15, minus DHT (C4), JPG (C8) and DAC (CC)
        if (0xC0..=0xCF).contains(&marker)
            && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
            && i + 9 < data.len()
        {
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
            return Some((width, height, data[i + 9]));
        }
        i += 2 + len;
    }
    None
}

/// Write `img` as an image XObject (plus soft mask when it has alpha) and
/// return its reference.
pub(super) fn embed_image(
    pdf: &mut Pdf,
    alloc: &mut impl FnMut() -> Ref,
    img: &EmbeddedImage,
) -> Result<Ref, Error> {
    match img.format {
        ImageFormat::Jpeg => {
            let (w, h, components) = jpeg_frame(&img.data)
                .ok_or_else(|| Error::Image("JPEG without a frame header".into()))?;
            let xobj_ref = alloc();
            let mut xobj = pdf.image_xobject(xobj_ref, &img.data);
            xobj.filter(Filter::DctDecode);
            xobj.width(w as i32);
            xobj.height(h as i32);
            match components {
                1 => xobj.color_space().device_gray(),
                4 => xobj.color_space().device_cmyk(),
                _ => xobj.color_space().device_rgb(),
            };
            xobj.bits_per_component(8);
            Ok(xobj_ref)
        }
        ImageFormat::Raster => {
            let rgba = image::load_from_memory(&img.data)?.to_rgba8();
            let (w, h) = (rgba.width(), rgba.height());
            let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);

            let rgb_data: Vec<u8> = rgba
                .pixels()
                .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
                .collect();
            let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&rgb_data, 6);

            let smask_ref = if has_alpha {
                let alpha_data: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
                let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(&alpha_data, 6);
                let mask_ref = alloc();
                let mut mask = pdf.image_xobject(mask_ref, &compressed_alpha);
                mask.filter(Filter::FlateDecode);
                mask.width(w as i32);
                mask.height(h as i32);
                mask.color_space().device_gray();
                mask.bits_per_component(8);
                Some(mask_ref)
            } else {
                None
            };

            let xobj_ref = alloc();
            let mut xobj = pdf.image_xobject(xobj_ref, &compressed_rgb);
            xobj.filter(Filter::FlateDecode);
            xobj.width(w as i32);
            xobj.height(h as i32);
            xobj.color_space().device_rgb();
            xobj.bits_per_component(8);
            if let Some(mask_ref) = smask_ref {
                xobj.s_mask(mask_ref);
            }
            Ok(xobj_ref)
        }
    }
}

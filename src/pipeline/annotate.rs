//! Rendering of detections onto the uploaded image

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::io::Cursor;
use thiserror::Error;

use super::aggregate::DISEASED_LABEL;
use super::types::Detection;

const DISEASED_COLOR: Rgb<u8> = Rgb([220, 20, 60]);
const OTHER_COLOR: Rgb<u8> = Rgb([46, 204, 113]);
const CAPTION_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
const CAPTION_PADDING: u32 = 2;

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("no encoder for extension '{0}'")]
    UnsupportedFormat(String),
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
    #[error("caption font unusable: {0}")]
    Font(String),
    #[error("render task aborted: {0}")]
    Aborted(String),
}

/// Decode `source`, draw every box with its caption, and re-encode in the
/// format implied by `extension`
///
/// The EXIF orientation is applied first, so boxes land in the same upright
/// frame the model saw.
pub fn render(source: &[u8], detections: &[Detection], extension: &str) -> Result<Vec<u8>, AnnotateError> {
    let format = ImageFormat::from_extension(extension.trim_start_matches('.'))
        .ok_or_else(|| AnnotateError::UnsupportedFormat(extension.to_string()))?;
    let font = FontRef::try_from_slice(FONT_DATA).map_err(|e| AnnotateError::Font(e.to_string()))?;

    let mut canvas = decode_upright(source)?.to_rgb8();
    let scale = caption_scale(&canvas);
    for det in detections {
        let color = if det.label == DISEASED_LABEL {
            DISEASED_COLOR
        } else {
            OTHER_COLOR
        };
        if let Some((x, y)) = draw_box(&mut canvas, &det.bbox, color) {
            let caption = format!("{} {:.2}", det.label, det.confidence);
            draw_caption(&mut canvas, x, y, &caption, color, scale, &font);
        }
    }

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(canvas).write_to(&mut Cursor::new(&mut encoded), format)?;
    Ok(encoded)
}

fn decode_upright(source: &[u8]) -> Result<DynamicImage, image::ImageError> {
    let mut decoder = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .into_decoder()?;
    let orientation = decoder.orientation()?;

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn caption_scale(canvas: &RgbImage) -> PxScale {
    let longest = canvas.width().max(canvas.height()) as f32;
    PxScale::from((longest / 40.0).clamp(12.0, 40.0))
}

/// Draws a box clamped to the canvas and returns its top-left corner
///
/// Boxes with no visible extent are skipped.
fn draw_box(canvas: &mut RgbImage, bbox: &[f64; 4], color: Rgb<u8>) -> Option<(i32, i32)> {
    let (w, h) = (canvas.width() as f64, canvas.height() as f64);
    if w == 0.0 || h == 0.0 {
        return None;
    }

    let x1 = bbox[0].clamp(0.0, w - 1.0).floor() as i32;
    let y1 = bbox[1].clamp(0.0, h - 1.0).floor() as i32;
    let x2 = bbox[2].clamp(0.0, w - 1.0).ceil() as i32;
    let y2 = bbox[3].clamp(0.0, h - 1.0).ceil() as i32;
    if x2 - x1 < 1 || y2 - y1 < 1 {
        return None;
    }

    for inset in 0..BOX_THICKNESS {
        let width = x2 - x1 - 2 * inset + 1;
        let height = y2 - y1 - 2 * inset + 1;
        if width <= 1 || height <= 1 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
    Some((x1, y1))
}

/// Size of the label plate: text advance by full line height, plus padding
fn caption_plate(scale: PxScale, font: &FontRef<'_>, caption: &str) -> (u32, u32) {
    let (text_w, _) = text_size(scale, font, caption);
    let line_h = font.as_scaled(scale).height().ceil() as u32;
    (text_w + 2 * CAPTION_PADDING, line_h + 2 * CAPTION_PADDING)
}

/// Label plate in the box color, above the box when it fits and inside it otherwise
fn draw_caption(
    canvas: &mut RgbImage,
    x: i32,
    box_top: i32,
    caption: &str,
    color: Rgb<u8>,
    scale: PxScale,
    font: &FontRef<'_>,
) {
    let (plate_w, plate_h) = caption_plate(scale, font, caption);

    let top = if box_top >= plate_h as i32 {
        box_top - plate_h as i32
    } else {
        box_top
    };

    draw_filled_rect_mut(canvas, Rect::at(x, top).of_size(plate_w, plate_h), color);
    draw_text_mut(
        canvas,
        CAPTION_TEXT_COLOR,
        x + CAPTION_PADDING as i32,
        top + CAPTION_PADDING as i32,
        scale,
        font,
        caption,
    );
}

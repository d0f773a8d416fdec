//! Pixel operations backed by the `image` crate.
//!
//! Frames are resolved from `data:` URIs or fetched over HTTP(S). Results are
//! always re-encoded as PNG.

use std::io::Cursor;
use std::path::Path;

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use async_trait::async_trait;
use base64::Engine;
use editor_core::{EditFrame, FrameSize, PixelRect, TextLayer};
use image::{DynamicImage, GrayImage, ImageFormat, Rgba, RgbaImage};

use crate::backend::{BackendError, BackendResult, RasterImage, Rasterizer};

/// [`Rasterizer`] using `image` for decode/crop/encode and `ab_glyph` for text.
#[derive(Debug, Clone)]
pub struct ImageRasterizer {
    http: reqwest::Client,
    font: Option<FontArc>,
}

impl ImageRasterizer {
    /// Create a rasterizer without a font. Flattening non-empty text layers
    /// fails until a font is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> BackendResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("editor-session/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self { http, font: None })
    }

    /// Use `font` for text flattening.
    #[must_use]
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TTF/OTF font file for text flattening.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid font.
    pub fn with_font_file(self, path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| {
                BackendError::Image(format!("Failed to read font {}: {e}", path.display()))
            })?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| BackendError::Image(format!("Invalid font {}: {e}", path.display())))?;
        Ok(self.with_font(font))
    }

    async fn load(&self, frame: &EditFrame) -> BackendResult<DynamicImage> {
        let bytes = if frame.is_inline() {
            decode_data_uri(&frame.uri)?
        } else if frame.uri.starts_with("http://") || frame.uri.starts_with("https://") {
            self.fetch(&frame.uri).await?
        } else {
            return Err(BackendError::Unsupported(frame.uri.clone()));
        };
        image::load_from_memory(&bytes)
            .map_err(|e| BackendError::Image(format!("Failed to decode image: {e}")))
    }

    async fn fetch(&self, url: &str) -> BackendResult<Vec<u8>> {
        tracing::debug!(url, "Fetching frame");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Rasterizer for ImageRasterizer {
    async fn natural_size(&self, frame: &EditFrame) -> BackendResult<FrameSize> {
        let image = self.load(frame).await?;
        Ok(FrameSize::new(image.width(), image.height()))
    }

    async fn crop(&self, frame: &EditFrame, rect: PixelRect) -> BackendResult<RasterImage> {
        let image = self.load(frame).await?;
        let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        encode_png(&cropped)
    }

    async fn flatten_text(
        &self,
        frame: &EditFrame,
        layers: &[TextLayer],
    ) -> BackendResult<RasterImage> {
        let mut canvas = self.load(frame).await?.to_rgba8();
        let drawable: Vec<&TextLayer> = layers.iter().filter(|l| !l.text.is_empty()).collect();
        if !drawable.is_empty() {
            let font = self
                .font
                .as_ref()
                .ok_or_else(|| BackendError::Unsupported("no font configured".to_string()))?;
            for layer in drawable {
                draw_text_layer(&mut canvas, font, layer);
            }
        }
        encode_png(&DynamicImage::ImageRgba8(canvas))
    }

    async fn encode_mask(&self, coverage: &[u8], size: FrameSize) -> BackendResult<RasterImage> {
        let mask = GrayImage::from_raw(size.width, size.height, coverage.to_vec())
            .ok_or_else(|| BackendError::Image("Mask buffer does not match size".to_string()))?;
        encode_png(&DynamicImage::ImageLuma8(mask))
    }
}

/// Decode the payload of a `data:` URI.
///
/// # Errors
///
/// Returns an error if the URI is malformed or its base64 payload is invalid.
pub fn decode_data_uri(uri: &str) -> BackendResult<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| BackendError::Image("Not a data URI".to_string()))?;
    let (metadata, payload) = rest
        .split_once(',')
        .ok_or_else(|| BackendError::Image("Invalid data URI: missing comma".to_string()))?;

    if metadata.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| BackendError::Image(format!("Failed to decode base64: {e}")))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Encode an image as PNG.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_png(image: &DynamicImage) -> BackendResult<RasterImage> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| BackendError::Image(format!("Failed to encode PNG: {e}")))?;
    Ok(RasterImage {
        bytes: bytes.into_inner(),
        size: FrameSize::new(image.width(), image.height()),
    })
}

/// Parse `#rrggbb` or `#rrggbbaa`. Falls back to opaque white.
fn parse_color(hex: &str) -> Rgba<u8> {
    let digits = hex.trim_start_matches('#');
    let channel = |i: usize| {
        digits
            .get(i..i + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
    };
    match (digits.len(), channel(0), channel(2), channel(4)) {
        (6, Some(r), Some(g), Some(b)) => Rgba([r, g, b, 255]),
        (8, Some(r), Some(g), Some(b)) => Rgba([r, g, b, channel(6).unwrap_or(255)]),
        _ => Rgba([255, 255, 255, 255]),
    }
}

/// Draw one text layer centered on its anchor.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn draw_text_layer(canvas: &mut RgbaImage, font: &FontArc, layer: &TextLayer) {
    let (width, height) = canvas.dimensions();
    let scaled = font.as_scaled(layer.font_size);
    let color = parse_color(&layer.color);

    let mut glyphs: Vec<(GlyphId, f32)> = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last: Option<GlyphId> = None;
    for ch in layer.text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor_x += scaled.kern(prev, id);
        }
        glyphs.push((id, cursor_x));
        cursor_x += scaled.h_advance(id);
        last = Some(id);
    }

    let origin_x = layer.x / 100.0 * width as f32 - cursor_x / 2.0;
    let baseline = layer.y / 100.0 * height as f32 + (scaled.ascent() + scaled.descent()) / 2.0;

    for (id, gx) in glyphs {
        let glyph = id.with_scale_and_position(layer.font_size, point(origin_x + gx, baseline));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, coverage| {
            let x = bounds.min.x as i32 + px as i32;
            let y = bounds.min.y as i32 + py as i32;
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                return;
            }
            let alpha = coverage.clamp(0.0, 1.0) * f32::from(color[3]) / 255.0;
            let pixel = canvas.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                let blended = f32::from(color[c]) * alpha + f32::from(pixel[c]) * (1.0 - alpha);
                pixel[c] = blended.round() as u8;
            }
            let out_alpha = alpha * 255.0 + f32::from(pixel[3]) * (1.0 - alpha);
            pixel[3] = out_alpha.round() as u8;
        });
    }
}

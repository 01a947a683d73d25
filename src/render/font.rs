use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use font8x8::{UnicodeFonts, BASIC_FONTS, BLOCK_FONTS, BOX_FONTS, LATIN_FONTS};
use image::{Rgb as Pixel, RgbImage};

use super::palette::Rgb;

/// Monospace fonts tried after the configured ones.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu-sans-mono-fonts/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansMono-Regular.ttf",
    "/Library/Fonts/DejaVuSansMono.ttf",
];

const BITMAP_CELL: (u32, u32) = (8, 16);

enum Glyphs {
    Outline { font: FontVec, scale: PxScale },
    Bitmap,
}

/// A font with fixed cell metrics.
pub struct CellFont {
    glyphs: Glyphs,
    cell_w: u32,
    cell_h: u32,
    ascent: f32,
}

impl std::fmt::Debug for CellFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.glyphs {
            Glyphs::Outline { .. } => "outline",
            Glyphs::Bitmap => "bitmap",
        };
        f.debug_struct("CellFont")
            .field("kind", &kind)
            .field("cell_w", &self.cell_w)
            .field("cell_h", &self.cell_h)
            .finish()
    }
}

impl CellFont {
    /// First usable font among `paths` then the system list, else the
    /// built-in bitmap font.
    pub fn load(paths: &[PathBuf], size: f32) -> Self {
        let system = SYSTEM_FONTS.iter().map(Path::new);
        for path in paths.iter().map(PathBuf::as_path).chain(system) {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            match Self::from_bytes(bytes, size) {
                Some(font) => {
                    tracing::debug!(path = %path.display(), "loaded screenshot font");
                    return font;
                }
                None => tracing::warn!(path = %path.display(), "unusable font file"),
            }
        }
        tracing::debug!("no outline font found, using built-in bitmap font");
        Self::builtin()
    }

    pub fn from_bytes(bytes: Vec<u8>, size: f32) -> Option<Self> {
        let font = FontVec::try_from_vec(bytes).ok()?;
        let scale = PxScale::from(size);
        let scaled = font.as_scaled(scale);
        let cell_w = scaled.h_advance(font.glyph_id('M')).ceil() as u32;
        let ascent = scaled.ascent();
        let cell_h = (ascent - scaled.descent()).ceil() as u32 + 4;
        if cell_w == 0 || cell_h <= 4 {
            return None;
        }
        Some(Self {
            glyphs: Glyphs::Outline { font, scale },
            cell_w,
            cell_h,
            ascent,
        })
    }

    /// The 8x16 bitmap font compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            glyphs: Glyphs::Bitmap,
            cell_w: BITMAP_CELL.0,
            cell_h: BITMAP_CELL.1,
            ascent: 0.0,
        }
    }

    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_w, self.cell_h)
    }

    /// Draw `ch` into the cell whose top-left corner is (`x`, `y`).
    pub fn draw(&self, img: &mut RgbImage, x: u32, y: u32, ch: char, color: Rgb, bold: bool) {
        match &self.glyphs {
            Glyphs::Outline { font, scale } => {
                let glyph = font
                    .glyph_id(ch)
                    .with_scale_and_position(*scale, point(x as f32, y as f32 + 2.0 + self.ascent));
                let Some(outlined) = font.outline_glyph(glyph) else {
                    return;
                };
                let bounds = outlined.px_bounds();
                let passes: &[i64] = if bold { &[0, 1] } else { &[0] };
                for &dx in passes {
                    outlined.draw(|gx, gy, coverage| {
                        let px = bounds.min.x as i64 + gx as i64 + dx;
                        let py = bounds.min.y as i64 + gy as i64;
                        blend_pixel(img, px, py, color, coverage);
                    });
                }
            }
            Glyphs::Bitmap => {
                let Some(rows) = bitmap(ch) else {
                    return;
                };
                for (row, bits) in rows.iter().enumerate() {
                    for bit in 0..8u32 {
                        if bits & (1 << bit) == 0 {
                            continue;
                        }
                        let px = (x + bit) as i64;
                        for dy in 0..2u32 {
                            let py = (y + row as u32 * 2 + dy) as i64;
                            blend_pixel(img, px, py, color, 1.0);
                            if bold {
                                blend_pixel(img, px + 1, py, color, 1.0);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn bitmap(ch: char) -> Option<[u8; 8]> {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BOX_FONTS.get(ch))
        .or_else(|| BLOCK_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
}

fn blend_pixel(img: &mut RgbImage, x: i64, y: i64, color: Rgb, coverage: f32) {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return;
    }
    let a = coverage.clamp(0.0, 1.0);
    let px = img.get_pixel_mut(x as u32, y as u32);
    let Pixel(bg) = *px;
    let mix = |f: u8, b: u8| (f as f32 * a + b as f32 * (1.0 - a)).round() as u8;
    *px = Pixel([
        mix(color[0], bg[0]),
        mix(color[1], bg[1]),
        mix(color[2], bg[2]),
    ]);
}

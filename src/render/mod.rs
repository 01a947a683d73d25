//! Render captured terminal text (with ANSI escapes) to a PNG.

mod font;
pub mod palette;

use std::io::Cursor;

use image::{ImageFormat, Rgb as Pixel, RgbImage};
use thiserror::Error;

use crate::config::RenderConfig;

pub use font::CellFont;
use palette::{Rgb, DEFAULT_BG, DEFAULT_FG};

/// Upper bound on either screen dimension.
pub const MAX_DIMENSION: usize = 1000;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid screen size {cols}x{rows}")]
    InvalidSize { cols: usize, rows: usize },

    #[error("png encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Renders screens with a fixed font and colors.
#[derive(Debug)]
pub struct Renderer {
    font: CellFont,
    padding: u32,
    fg: Rgb,
    bg: Rgb,
}

impl Renderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self::with_font(config, CellFont::load(&config.font_paths, config.font_size))
    }

    pub fn with_font(config: &RenderConfig, font: CellFont) -> Self {
        Self {
            font,
            padding: config.padding,
            fg: palette::parse_color_or(&config.foreground, DEFAULT_FG),
            bg: palette::parse_color_or(&config.background, DEFAULT_BG),
        }
    }

    pub fn cell_size(&self) -> (u32, u32) {
        self.font.cell_size()
    }

    /// Image size in pixels for a `cols` x `rows` screen.
    pub fn image_size(&self, cols: usize, rows: usize) -> (u32, u32) {
        let (cw, ch) = self.font.cell_size();
        (
            cols as u32 * cw + 2 * self.padding,
            rows as u32 * ch + 2 * self.padding,
        )
    }

    /// Render `text` on a screen `cols` wide and as tall as its last
    /// non-blank line.
    pub fn render_png(&self, text: &str, cols: usize) -> Result<Vec<u8>, RenderError> {
        let lines = visible_lines(text);
        let rows = lines.len().max(1);
        if cols == 0 || cols > MAX_DIMENSION || rows > MAX_DIMENSION {
            return Err(RenderError::InvalidSize { cols, rows });
        }

        let mut vt = avt::Vt::builder().size(cols, rows).build();
        // A bare \n only moves down a row; pair every line break with a
        // carriage return. No break after the last row, or the screen scrolls.
        let _ = vt.feed_str(&lines.join("\r\n"));

        let (width, height) = self.image_size(cols, rows);
        let mut img = RgbImage::from_pixel(width, height, Pixel(self.bg));
        let (cw, ch) = self.font.cell_size();

        for (row, line) in vt.view().enumerate() {
            let y = self.padding + row as u32 * ch;
            for (col, cell) in line.cells().iter().enumerate().take(cols) {
                if cell.width() == 0 {
                    continue;
                }
                let pen = cell.pen();
                let mut fg = palette::resolve(pen.foreground(), self.fg);
                let mut bg = palette::resolve(pen.background(), self.bg);
                if pen.is_inverse() {
                    std::mem::swap(&mut fg, &mut bg);
                }
                let x = self.padding + col as u32 * cw;
                if bg != self.bg {
                    fill_cell(&mut img, x, y, cw * cell.width() as u32, ch, bg);
                }
                let c = cell.char();
                if c != ' ' && c != '\0' {
                    self.font.draw(&mut img, x, y, c, fg, pen.is_bold());
                }
            }
        }

        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }
}

/// Render with a font and colors taken from `config`.
pub fn render_png(text: &str, cols: usize, config: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    Renderer::new(config).render_png(text, cols)
}

/// Lines of `text` up to the last one with visible content.
fn visible_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    while lines.last().is_some_and(|l| is_blank(l)) {
        lines.pop();
    }
    lines
}

/// True if `line` shows nothing once escape sequences are removed.
fn is_blank(line: &str) -> bool {
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.next() {
                Some('[') => {
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    for c in chars.by_ref() {
                        if c == '\x07' {
                            break;
                        }
                    }
                }
                _ => {}
            },
            c if c.is_whitespace() || c.is_control() => {}
            _ => return false,
        }
    }
    true
}

fn fill_cell(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, Pixel(color));
        }
    }
}

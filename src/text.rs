// Glyph rendering. fontdue rasterises coverage bitmaps; blitting is done
// by hand in both paths so that indexed destinations receive the exact
// foreground palette index (alpha-blending an index would corrupt the
// neighbouring pixels' colours).

use std::env;
use std::fs;
use std::path::PathBuf;

use fontdue::{Font, FontSettings};
use log::warn;

use crate::vm::Vm;
use crate::{Result, VmError};

pub const DEFAULT_FONT_SIZE: u32 = 16;

// threshold for the 1-bit paths
const COVERAGE_ON: u8 = 128;

struct SizeEntry {
    size: u32,
    y_off: i32,
}

pub struct Text {
    font: Option<Font>,
    sizes: Vec<SizeEntry>,
    pub cur_size: u32,
    pub bold: bool,
}

impl Text {
    pub fn new() -> Text {
        Text { font: None, sizes: Vec::new(), cur_size: DEFAULT_FONT_SIZE, bold: false }
    }

    pub fn loaded(&self) -> bool {
        self.font.is_some()
    }

    fn y_off(&mut self, size: u32) -> i32 {
        if let Some(e) = self.sizes.iter().find(|e| e.size == size) {
            return e.y_off;
        }
        // Align the baseline so the cap height sits centred in the em
        // box. This is a bit hacky, but it works reasonably well for
        // most fonts.
        let y_off = match &self.font {
            Some(font) => {
                let m = font.metrics('A', size as f32);
                let cap = m.height as i32;
                ((size as i32 - cap) / 2).max(0)
            }
            None => 0,
        };
        self.sizes.push(SizeEntry { size, y_off });
        y_off
    }
}

impl Default for Text {
    fn default() -> Text {
        Text::new()
    }
}

fn font_search_paths(config_path: Option<&str>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = config_path {
        paths.push(PathBuf::from(p));
    }
    // compile-time data directory first, then the runtime override
    if let Some(dir) = option_env!("AI5_DATA_DIR") {
        paths.push(PathBuf::from(dir).join("fonts/DotGothic16-Regular.ttf"));
    }
    if let Ok(dir) = env::var("AI5_DATA_DIR") {
        paths.push(PathBuf::from(dir).join("fonts/DotGothic16-Regular.ttf"));
    }
    if cfg!(target_os = "windows") {
        paths.push(PathBuf::from("C:/Windows/Fonts/msgothic.ttc"));
    } else if cfg!(target_os = "macos") {
        paths.push(PathBuf::from("/System/Library/Fonts/Hiragino Sans GB.ttc"));
    } else {
        paths.push(PathBuf::from(
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        ));
        paths.push(PathBuf::from(
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        ));
    }
    paths
}

impl Vm {
    pub fn text_init(&mut self, config_path: Option<&str>) -> Result<()> {
        for path in font_search_paths(config_path) {
            let data = match fs::read(&path) {
                Ok(d) => d,
                Err(_) => continue,
            };
            match Font::from_bytes(data, FontSettings::default()) {
                Ok(font) => {
                    self.text.font = Some(font);
                    return Ok(());
                }
                Err(e) => warn!("Failed to load font \"{}\": {}", path.display(), e),
            }
        }
        Err(VmError::User(String::from("no usable font found")))
    }

    pub fn text_set_size(&mut self, size: u32, weight: u32) {
        self.text.cur_size = size.max(1);
        self.text.bold = weight != 0;
        self.gfx.text.size = self.text.cur_size;
    }

    /// Advance width of `ch` at the current size, before any per-title
    /// override.
    pub fn text_size_char(&self, ch: char) -> u32 {
        match &self.text.font {
            Some(font) => font.metrics(ch, self.text.cur_size as f32).advance_width.round() as u32,
            None => self.text.cur_size / 2,
        }
    }

    /// Draw one glyph; returns the advance in pixels.
    pub fn text_draw_glyph(&mut self, x: i32, y: i32, surface: usize, ch: char) -> Result<u32> {
        let size = self.text.cur_size;
        let y_off = self.text.y_off(size);
        let (metrics, coverage) = match &self.text.font {
            Some(font) => font.rasterize(ch, size as f32),
            None => return Ok(size / 2),
        };
        let gx = x + metrics.xmin;
        let gy = y + y_off + (size as i32 - metrics.height as i32 - metrics.ymin);
        let surface = self.gfx.surface_or_zero(surface);
        if self.gfx.bpp == 8 {
            self.glyph_blit_indexed(&coverage, metrics.width, metrics.height, gx, gy, surface);
        } else {
            // outline pass in the background colour, then the fill
            for (ox, oy) in
                [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)].iter()
            {
                self.glyph_blit_direct(
                    &coverage,
                    metrics.width,
                    metrics.height,
                    gx + ox,
                    gy + oy,
                    surface,
                    self.gfx.text.bg_color,
                );
            }
            self.glyph_blit_direct(
                &coverage,
                metrics.width,
                metrics.height,
                gx,
                gy,
                surface,
                self.gfx.text.fg_color,
            );
        }
        self.gfx.dirty(surface, gx, gy, metrics.width as i32 + 1, metrics.height as i32 + 1);
        Ok(metrics.advance_width.round().max(1.0) as u32)
    }

    fn glyph_blit_indexed(
        &mut self,
        coverage: &[u8],
        w: usize,
        h: usize,
        dst_x: i32,
        dst_y: i32,
        surface: usize,
    ) {
        let fg = self.gfx.text.fg as u8;
        let s = &mut self.gfx.surfaces[surface];
        for row in 0..h as i32 {
            let y = dst_y + row;
            if y < 0 || y >= s.h {
                continue;
            }
            for col in 0..w as i32 {
                let x = dst_x + col;
                if x < 0 || x >= s.w {
                    continue;
                }
                if coverage[(row * w as i32 + col) as usize] >= COVERAGE_ON {
                    let off = s.offset(x, y);
                    s.pixels[off] = fg;
                }
            }
        }
    }

    fn glyph_blit_direct(
        &mut self,
        coverage: &[u8],
        w: usize,
        h: usize,
        dst_x: i32,
        dst_y: i32,
        surface: usize,
        color: [u8; 3],
    ) {
        let threshold_only = self.game.no_antialias_text;
        let s = &mut self.gfx.surfaces[surface];
        for row in 0..h as i32 {
            let y = dst_y + row;
            if y < 0 || y >= s.h {
                continue;
            }
            for col in 0..w as i32 {
                let x = dst_x + col;
                if x < 0 || x >= s.w {
                    continue;
                }
                let a = coverage[(row * w as i32 + col) as usize] as u32;
                if a == 0 {
                    continue;
                }
                let off = s.offset(x, y);
                let dst = &mut s.pixels[off..off + 3];
                if threshold_only {
                    if a >= COVERAGE_ON as u32 {
                        dst.copy_from_slice(&color);
                    }
                } else {
                    for i in 0..3 {
                        dst[i] =
                            ((color[i] as u32 * a + dst[i] as u32 * (255 - a)) / 255) as u8;
                    }
                }
            }
        }
    }
}

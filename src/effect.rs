// Timed transition effects over the dither mask set. These run inside the
// VM's cooperative loop: every frame they mark damage, pump events and
// tick the frame timer, so animation streams and audio fades keep moving
// while an effect plays.

use log::warn;

use crate::gfx::{fill_clip, Rect};
use crate::vm::Vm;
use crate::Result;

pub const FADE_PATTERN_SIZE: usize = 4;

const X: u8 = 0xff;
const O: u8 = 0x00;

// 4x4 dither masks F1..F12; a set byte keeps the old pixel for that step.
pub const PATTERNS: [[u8; 16]; 12] = [
    [X, X, X, O, X, X, X, X, X, O, X, X, X, X, X, X],
    [X, X, X, O, X, X, X, X, X, O, X, O, X, X, X, X],
    [X, O, X, O, X, X, X, X, X, O, X, O, X, X, X, X],
    [X, O, X, O, X, X, X, X, X, O, X, O, O, X, X, X],
    [X, O, X, O, X, X, X, X, X, O, X, O, O, X, O, X],
    [X, O, X, O, O, X, O, X, X, O, X, O, O, X, O, X],
    [X, O, X, O, O, X, O, X, X, O, X, O, O, O, O, X],
    [X, O, X, O, O, X, O, O, X, O, X, O, O, O, O, O],
    [X, O, X, O, O, O, O, O, X, O, X, O, O, O, O, O],
    [X, O, O, O, O, O, O, O, X, O, X, O, O, O, O, O],
    [X, O, O, O, O, O, O, O, O, O, X, O, O, O, O, O],
    [X, O, O, O, O, O, O, O, O, O, O, O, O, O, O, O],
];

// how often each pattern repeats in the long fade tables
const REPEATS: [usize; 12] = [4, 4, 8, 4, 4, 8, 4, 4, 4, 4, 4, 4];

fn fade_size() -> usize {
    REPEATS.iter().sum::<usize>() * FADE_PATTERN_SIZE
}

/// Vertical fade table: pattern rows stacked top to bottom.
fn fade_pattern_vert() -> Vec<u8> {
    let mut out = Vec::with_capacity(fade_size() * FADE_PATTERN_SIZE);
    for (p, &rep) in PATTERNS.iter().zip(REPEATS.iter()) {
        for _ in 0..rep {
            out.extend_from_slice(p);
        }
    }
    out
}

/// Horizontal fade table: four rows, each the concatenation of every
/// pattern's matching row.
fn fade_pattern_hori() -> Vec<u8> {
    let size = fade_size();
    let mut out = vec![0u8; size * FADE_PATTERN_SIZE];
    for row in 0..FADE_PATTERN_SIZE {
        let mut col = 0;
        for (p, &rep) in PATTERNS.iter().zip(REPEATS.iter()) {
            for _ in 0..rep {
                for c in 0..FADE_PATTERN_SIZE {
                    out[row * size + col + c] = p[row * FADE_PATTERN_SIZE + c];
                }
                col += FADE_PATTERN_SIZE;
            }
        }
    }
    out
}

const EFFECT_FRAME_TIME: u32 = 10;
const FADE_FRAME_TIME: u32 = 16;

pub type FadeCallback = fn(&mut Vm) -> bool;

impl Vm {
    fn effect_rect(&self, i: usize, x: i32, y: i32, w: i32, h: i32) -> Option<Rect> {
        let s = &self.gfx.surfaces[i];
        let mut r = Rect::new(x, y, w, h);
        if !fill_clip(s.w, s.h, &mut r) {
            warn!("Invalid fade");
            return None;
        }
        Some(r)
    }

    /// Dithered replacement of the destination rect with the source rect
    /// over the twelve mask steps.
    pub fn pixel_crossfade(
        &mut self,
        src_x: i32,
        src_y: i32,
        w: i32,
        h: i32,
        src_i: usize,
        dst_x: i32,
        dst_y: i32,
        dst_i: usize,
        mask_color: Option<u32>,
    ) -> Result<()> {
        let src_i = self.gfx.surface_or_zero(src_i);
        let dst_i = self.gfx.surface_or_zero(dst_i);
        let r = match self.effect_rect(src_i, src_x, src_y, w, h) {
            Some(r) => r,
            None => return Ok(()),
        };
        let src = self.gfx.read_rect(src_i, r);
        let bytes_pp = self.gfx.surfaces[src_i].bytes_pp;
        let mask_px: Option<Vec<u8>> = match mask_color {
            Some(c) if bytes_pp == 1 => Some(vec![c as u8]),
            Some(c) => Some(self.gfx.decode_color(c)?.to_vec()),
            None => None,
        };
        let mut timer = self.timer_create();
        for step in 0..=PATTERNS.len() {
            {
                let d = &mut self.gfx.surfaces[dst_i];
                for row in 0..r.h {
                    for col in 0..r.w {
                        // the final step copies everything that's left
                        let hole = step == PATTERNS.len()
                            || PATTERNS[step][(row % 4 * 4 + col % 4) as usize] == O;
                        if !hole {
                            continue;
                        }
                        let sp = (row * r.w + col) as usize * bytes_pp;
                        let px = &src[sp..sp + bytes_pp];
                        if let Some(m) = &mask_px {
                            if px == &m[..] {
                                continue;
                            }
                        }
                        let off = d.offset(dst_x + col, dst_y + row);
                        if off + bytes_pp <= d.pixels.len() {
                            d.pixels[off..off + bytes_pp].copy_from_slice(px);
                        }
                    }
                }
            }
            self.gfx.dirty(dst_i, dst_x, dst_y, r.w, r.h);
            self.vm_peek()?;
            self.timer_tick(&mut timer, FADE_FRAME_TIME)?;
        }
        Ok(())
    }

    /// Reveal the destination one horizontal slab at a time.
    pub fn copy_progressive(
        &mut self,
        src_x: i32,
        src_y: i32,
        w: i32,
        h: i32,
        src_i: usize,
        dst_x: i32,
        dst_y: i32,
        dst_i: usize,
    ) -> Result<()> {
        const SLAB: i32 = 8;
        let frame_time = self.gfx.progressive_frame_time;
        let mut timer = self.timer_create();
        let mut row = 0;
        while row < h {
            let slab_h = SLAB.min(h - row);
            self.gfx.copy(src_x, src_y + row, w, slab_h, src_i, dst_x, dst_y + row, dst_i);
            row += SLAB;
            self.vm_peek()?;
            self.timer_tick(&mut timer, frame_time)?;
        }
        Ok(())
    }

    /// `copy_progressive` with a solid fill instead of a source.
    pub fn fade_progressive(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        dst_i: usize,
    ) -> Result<()> {
        const SLAB: i32 = 8;
        let frame_time = self.gfx.progressive_frame_time;
        let mut timer = self.timer_create();
        let mut row = 0;
        while row < h {
            let slab_h = SLAB.min(h - row);
            self.gfx.fill(x, y + row, w, slab_h, dst_i, 0);
            row += SLAB;
            self.vm_peek()?;
            self.timer_tick(&mut timer, frame_time)?;
        }
        Ok(())
    }

    /// Scroll a dither curtain down the rect, filling from the source
    /// surface (or black when there is none).
    pub fn fade_down(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        dst_i: usize,
        src_i: Option<usize>,
    ) -> Result<()> {
        let dst_i = self.gfx.surface_or_zero(dst_i);
        let r = match self.effect_rect(dst_i, x, y, w, h) {
            Some(r) => r,
            None => return Ok(()),
        };
        let pattern = fade_pattern_vert();
        let fade_size = fade_size() as i32;
        let bytes_pp = self.gfx.surfaces[dst_i].bytes_pp;
        let src = src_i.map(|i| self.gfx.read_rect(self.gfx.surface_or_zero(i), r));
        let mut timer = self.timer_create();
        let mut i = 0;
        while i < fade_size + r.h {
            {
                let d = &mut self.gfx.surfaces[dst_i];
                let mut row = 0;
                let mut fade_start = fade_size - i;
                // solid fill above the pattern
                while fade_start < 0 && row < r.h {
                    copy_row(d, &src, r, row, bytes_pp, None);
                    fade_start += 1;
                    row += 1;
                }
                // pattern band
                let mut fade_row = 0;
                while row < r.h && fade_row < fade_size - fade_start {
                    let p_off = ((fade_start + fade_row) as usize) * FADE_PATTERN_SIZE;
                    let mask = &pattern[p_off..p_off + FADE_PATTERN_SIZE];
                    copy_row(d, &src, r, row, bytes_pp, Some(mask));
                    fade_row += 1;
                    row += 1;
                }
            }
            self.gfx.dirty(dst_i, r.x, r.y, r.w, r.h);
            self.vm_peek()?;
            self.timer_tick(&mut timer, EFFECT_FRAME_TIME)?;
            i += FADE_PATTERN_SIZE as i32 * 2;
        }
        Ok(())
    }

    /// `fade_down` turned sideways.
    pub fn fade_right(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        dst_i: usize,
        src_i: Option<usize>,
    ) -> Result<()> {
        let dst_i = self.gfx.surface_or_zero(dst_i);
        let r = match self.effect_rect(dst_i, x, y, w, h) {
            Some(r) => r,
            None => return Ok(()),
        };
        let pattern = fade_pattern_hori();
        let fade_size = fade_size() as i32;
        let bytes_pp = self.gfx.surfaces[dst_i].bytes_pp;
        let src = src_i.map(|i| self.gfx.read_rect(self.gfx.surface_or_zero(i), r));
        let mut timer = self.timer_create();
        let mut i = 0;
        while i < fade_size + r.w {
            {
                let d = &mut self.gfx.surfaces[dst_i];
                for row in 0..r.h {
                    let fade_start = (fade_size - i).max(0);
                    let solid_cols = (i - fade_size).max(0).min(r.w);
                    for col in 0..r.w {
                        let replace = if col < solid_cols {
                            true
                        } else {
                            let fade_col = col - solid_cols + fade_start;
                            if fade_col >= fade_size {
                                false
                            } else {
                                let p_row = (row % FADE_PATTERN_SIZE as i32) as usize;
                                pattern[p_row * fade_size as usize + fade_col as usize] != O
                            }
                        };
                        if replace {
                            copy_px(d, &src, r, row, col, bytes_pp);
                        }
                    }
                }
            }
            self.gfx.dirty(dst_i, r.x, r.y, r.w, r.h);
            self.vm_peek()?;
            self.timer_tick(&mut timer, EFFECT_FRAME_TIME)?;
            i += FADE_PATTERN_SIZE as i32 * 2;
        }
        Ok(())
    }

    /// Dither the rect to black, then restore it, stepping the masks
    /// forwards and backwards.
    pub fn blink_fade(&mut self, x: i32, y: i32, w: i32, h: i32, dst_i: usize) -> Result<()> {
        let dst_i = self.gfx.surface_or_zero(dst_i);
        let r = match self.effect_rect(dst_i, x, y, w, h) {
            Some(r) => r,
            None => return Ok(()),
        };
        let snapshot = self.gfx.read_rect(dst_i, r);
        let bytes_pp = self.gfx.surfaces[dst_i].bytes_pp;
        let mut timer = self.timer_create();
        let steps: Vec<usize> =
            (0..PATTERNS.len()).chain((0..PATTERNS.len()).rev()).collect();
        for (k, &step) in steps.iter().enumerate() {
            let restoring = k >= PATTERNS.len();
            {
                let d = &mut self.gfx.surfaces[dst_i];
                for row in 0..r.h {
                    for col in 0..r.w {
                        let masked =
                            PATTERNS[step][(row % 4 * 4 + col % 4) as usize] == O;
                        if !masked {
                            continue;
                        }
                        let off = d.offset(r.x + col, r.y + row);
                        if restoring {
                            let sp = (row * r.w + col) as usize * bytes_pp;
                            d.pixels[off..off + bytes_pp]
                                .copy_from_slice(&snapshot[sp..sp + bytes_pp]);
                        } else {
                            for b in &mut d.pixels[off..off + bytes_pp] {
                                *b = 0;
                            }
                        }
                    }
                }
            }
            self.gfx.dirty(dst_i, r.x, r.y, r.w, r.h);
            self.vm_peek()?;
            self.timer_tick(&mut timer, FADE_FRAME_TIME)?;
        }
        // make sure nothing of the blink is left behind
        let d = &mut self.gfx.surfaces[dst_i];
        let row_len = r.w as usize * bytes_pp;
        for row in 0..r.h {
            let off = d.offset(r.x, r.y + row);
            d.pixels[off..off + row_len]
                .copy_from_slice(&snapshot[row as usize * row_len..][..row_len]);
        }
        self.gfx.dirty(dst_i, r.x, r.y, r.w, r.h);
        Ok(())
    }

    /// Mosaic the rect at the given magnification.
    pub fn pixelate(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        dst_i: usize,
        mag: u32,
    ) -> Result<()> {
        let dst_i = self.gfx.surface_or_zero(dst_i);
        let r = match self.effect_rect(dst_i, x, y, w, h) {
            Some(r) => r,
            None => return Ok(()),
        };
        let mag = mag.max(1) as i32;
        let bytes_pp = self.gfx.surfaces[dst_i].bytes_pp;
        let d = &mut self.gfx.surfaces[dst_i];
        let mut by = 0;
        while by < r.h {
            let mut bx = 0;
            while bx < r.w {
                let base = d.offset(r.x + bx, r.y + by);
                let mut px = [0u8; 3];
                px[..bytes_pp].copy_from_slice(&d.pixels[base..base + bytes_pp]);
                for row in 0..mag.min(r.h - by) {
                    for col in 0..mag.min(r.w - bx) {
                        let off = d.offset(r.x + bx + col, r.y + by + row);
                        d.pixels[off..off + bytes_pp].copy_from_slice(&px[..bytes_pp]);
                    }
                }
                bx += mag;
            }
            by += mag;
        }
        self.gfx.dirty(dst_i, r.x, r.y, r.w, r.h);
        Ok(())
    }

    /// Horizontal rescale of the whole surface around its centre line.
    pub fn scale_h(&mut self, i: usize, mag: i32) -> Result<()> {
        let i = self.gfx.surface_or_zero(i);
        let (w, h) = (self.gfx.surfaces[i].w, self.gfx.surfaces[i].h);
        let bytes_pp = self.gfx.surfaces[i].bytes_pp;
        let snapshot = self.gfx.read_rect(i, Rect::new(0, 0, w, h));
        let scale = 256 + mag.max(-255);
        let s = &mut self.gfx.surfaces[i];
        for row in 0..h {
            for col in 0..w {
                let centered = col - w / 2;
                let src_col = (centered * 256 / scale) + w / 2;
                let off = s.offset(col, row);
                if src_col < 0 || src_col >= w {
                    for b in &mut s.pixels[off..off + bytes_pp] {
                        *b = 0;
                    }
                } else {
                    let sp = (row * w + src_col) as usize * bytes_pp;
                    s.pixels[off..off + bytes_pp].copy_from_slice(&snapshot[sp..sp + bytes_pp]);
                }
            }
        }
        self.gfx.dirty(i, 0, 0, w, h);
        Ok(())
    }

    /// Grow the source rect to fill the destination surface over `ms`.
    pub fn zoom(
        &mut self,
        src_x: i32,
        src_y: i32,
        w: i32,
        h: i32,
        src_i: usize,
        dst_i: usize,
        ms: u32,
    ) -> Result<()> {
        let src_i = self.gfx.surface_or_zero(src_i);
        let dst_i = self.gfx.surface_or_zero(dst_i);
        let r = match self.effect_rect(src_i, src_x, src_y, w, h) {
            Some(r) => r,
            None => return Ok(()),
        };
        let src = self.gfx.read_rect(src_i, r);
        let bytes_pp = self.gfx.surfaces[src_i].bytes_pp;
        let (dw, dh) = (self.gfx.surfaces[dst_i].w, self.gfx.surfaces[dst_i].h);
        let steps = (ms / FADE_FRAME_TIME).max(1);
        let mut timer = self.timer_create();
        for step in 1..=steps {
            let cur_w = r.w + (dw - r.w) * step as i32 / steps as i32;
            let cur_h = r.h + (dh - r.h) * step as i32 / steps as i32;
            let x0 = (dw - cur_w) / 2;
            let y0 = (dh - cur_h) / 2;
            {
                let d = &mut self.gfx.surfaces[dst_i];
                for row in 0..cur_h {
                    let sy = (row * r.h / cur_h).min(r.h - 1);
                    for col in 0..cur_w {
                        let sx = (col * r.w / cur_w).min(r.w - 1);
                        let sp = (sy * r.w + sx) as usize * bytes_pp;
                        let off = d.offset(x0 + col, y0 + row);
                        d.pixels[off..off + bytes_pp].copy_from_slice(&src[sp..sp + bytes_pp]);
                    }
                }
            }
            self.gfx.dirty(dst_i, 0, 0, dw, dh);
            self.vm_peek()?;
            self.timer_tick(&mut timer, FADE_FRAME_TIME)?;
        }
        Ok(())
    }

    // -- display-level fades ------------------------------------------

    pub fn display_fade_out(
        &mut self,
        vm_color: u32,
        ms: u32,
        cb: Option<FadeCallback>,
    ) -> Result<()> {
        if self.gfx.hidden {
            return Ok(());
        }
        self.gfx.compose_display();
        let target = if self.gfx.bpp == 8 {
            self.gfx.palette[(vm_color & 0xff) as usize]
        } else {
            self.gfx.decode_color(vm_color)?
        };
        let ms = (ms as f32 * self.config.transition_speed) as u32;
        let step = (256 * FADE_FRAME_TIME / ms.max(FADE_FRAME_TIME)).max(1);
        let base = self.gfx.display.clone();
        let mut timer = self.timer_create();
        let mut alpha = 0u32;
        while alpha < 256 {
            self.fade_frame(&base, target, alpha)?;
            self.vm_peek()?;
            self.timer_tick(&mut timer, FADE_FRAME_TIME)?;
            if let Some(cb) = cb {
                if !cb(self) {
                    break;
                }
            }
            alpha += step;
        }
        self.fade_frame(&base, target, 256)?;
        self.gfx.fade_color = target;
        self.gfx.hidden = true;
        Ok(())
    }

    pub fn display_fade_in(&mut self, ms: u32, cb: Option<FadeCallback>) -> Result<()> {
        self.gfx.hidden = false;
        self.gfx.screen_dirty();
        self.gfx.compose_display();
        // fade from whatever the last hide/fade-out left on screen
        let target = self.gfx.fade_color;
        let ms = (ms as f32 * self.config.transition_speed) as u32;
        let step = (256 * FADE_FRAME_TIME / ms.max(FADE_FRAME_TIME)).max(1);
        let base = self.gfx.display.clone();
        let mut timer = self.timer_create();
        let mut alpha = 256i32;
        while alpha > 0 {
            self.fade_frame(&base, target, alpha as u32)?;
            self.vm_peek()?;
            self.timer_tick(&mut timer, FADE_FRAME_TIME)?;
            if let Some(cb) = cb {
                if !cb(self) {
                    break;
                }
            }
            alpha -= step as i32;
        }
        self.fade_frame(&base, target, 0)?;
        self.gfx.screen_dirty();
        Ok(())
    }

    fn fade_frame(&mut self, base: &[u32], target: [u8; 3], alpha: u32) -> Result<()> {
        let a = alpha.min(256);
        let inv = 256 - a;
        let host = match &mut self.host {
            Some(h) => h,
            None => return Ok(()),
        };
        let (w, h) = (self.gfx.view_w as usize, self.gfx.view_h as usize);
        let mut frame = vec![0u32; base.len()];
        for (out, &px) in frame.iter_mut().zip(base.iter()) {
            let r = ((px >> 16 & 0xff) * inv + target[0] as u32 * a) >> 8;
            let g = ((px >> 8 & 0xff) * inv + target[1] as u32 * a) >> 8;
            let b = ((px & 0xff) * inv + target[2] as u32 * a) >> 8;
            *out = (r << 16) | (g << 8) | b;
        }
        host.flip(&frame, w, h)
    }

    // -- palette fades ------------------------------------------------

    pub fn palette_crossfade(&mut self, data: &[u8], ms: u32) -> Result<()> {
        let mut target = [[0u8; 3]; 256];
        for i in 0..256 {
            target[i] = [data[i * 4 + 2], data[i * 4 + 1], data[i * 4]];
        }
        self.palette_crossfade_to_colors(target, ms)
    }

    pub fn palette_crossfade_to(&mut self, r: u8, g: u8, b: u8, ms: u32) -> Result<()> {
        self.palette_crossfade_to_colors([[r, g, b]; 256], ms)
    }

    fn palette_crossfade_to_colors(&mut self, target: [[u8; 3]; 256], ms: u32) -> Result<()> {
        let old = self.gfx.palette;
        let fading: Vec<usize> = (0..256).filter(|&i| old[i] != target[i]).collect();
        if fading.is_empty() {
            return Ok(());
        }
        let ms = ((ms as f32 * self.config.transition_speed) as u32).max(1);
        let start_t = self.ticks();
        loop {
            let t = self.ticks().wrapping_sub(start_t);
            if t >= ms {
                break;
            }
            let rate = t as f32 / ms as f32;
            for &i in &fading {
                for c in 0..3 {
                    let d = target[i][c] as f32 - old[i][c] as f32;
                    self.gfx.palette[i][c] = (old[i][c] as f32 + d * rate) as u8;
                }
            }
            self.gfx.screen_dirty();
            self.vm_peek()?;
            self.vm_delay(FADE_FRAME_TIME)?;
        }
        for &i in &fading {
            self.gfx.palette[i] = target[i];
        }
        self.gfx.screen_dirty();
        Ok(())
    }
}

fn copy_row(
    d: &mut crate::gfx::Surface,
    src: &Option<Vec<u8>>,
    r: Rect,
    row: i32,
    bytes_pp: usize,
    mask: Option<&[u8]>,
) {
    let row_len = r.w as usize * bytes_pp;
    let off = d.offset(r.x, r.y + row);
    match mask {
        None => match src {
            Some(s) => d.pixels[off..off + row_len]
                .copy_from_slice(&s[row as usize * row_len..][..row_len]),
            None => {
                for b in &mut d.pixels[off..off + row_len] {
                    *b = 0;
                }
            }
        },
        Some(mask) => {
            for col in 0..r.w {
                if mask[(col % FADE_PATTERN_SIZE as i32) as usize] == O {
                    continue;
                }
                let po = off + col as usize * bytes_pp;
                match src {
                    Some(s) => {
                        let sp = (row * r.w + col) as usize * bytes_pp;
                        d.pixels[po..po + bytes_pp].copy_from_slice(&s[sp..sp + bytes_pp]);
                    }
                    None => {
                        for b in &mut d.pixels[po..po + bytes_pp] {
                            *b = 0;
                        }
                    }
                }
            }
        }
    }
}

fn copy_px(
    d: &mut crate::gfx::Surface,
    src: &Option<Vec<u8>>,
    r: Rect,
    row: i32,
    col: i32,
    bytes_pp: usize,
) {
    let off = d.offset(r.x + col, r.y + row);
    match src {
        Some(s) => {
            let sp = (row * r.w + col) as usize * bytes_pp;
            d.pixels[off..off + bytes_pp].copy_from_slice(&s[sp..sp + bytes_pp]);
        }
        None => {
            for b in &mut d.pixels[off..off + bytes_pp] {
                *b = 0;
            }
        }
    }
}

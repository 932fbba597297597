// Host window: a minifb window holding the final 0RGB frame, plus the
// keyboard/mouse state the input module samples from. The VM never talks
// to minifb directly; everything goes through this narrow surface.

use std::fs;
use std::io::Write;
use std::time::Instant;

use log::{info, warn};
use minifb::{Key, MouseButton, MouseMode, Window, WindowOptions};

use crate::{Result, VmError};

pub struct Host {
    window: Window,
    pub width: usize,
    pub height: usize,
    start: Instant,
    last_frame: Vec<u32>,
    fullscreen: bool,
    prev_f11: bool,
    prev_f12: bool,
}

impl Host {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Host> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions { resize: true, ..WindowOptions::default() },
        )
        .map_err(|e| VmError::User(format!("failed to open window: {}", e)))?;
        Ok(Host {
            window,
            width,
            height,
            start: Instant::now(),
            last_frame: vec![0; width * height],
            fullscreen: false,
            prev_f11: false,
            prev_f12: false,
        })
    }

    pub fn ticks(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    /// Process pending window events without redrawing, handling the
    /// window-level hotkeys.
    pub fn pump(&mut self) {
        self.window.update();
        let f11 = self.window.is_key_down(Key::F11);
        if f11 && !self.prev_f11 {
            self.toggle_fullscreen();
        }
        self.prev_f11 = f11;
        let f12 = self.window.is_key_down(Key::F12);
        if f12 && !self.prev_f12 {
            if let Err(e) = self.screenshot() {
                warn!("Failed to save screenshot: {}", e);
            }
        }
        self.prev_f12 = f12;
    }

    pub fn flip(&mut self, buffer: &[u32], w: usize, h: usize) -> Result<()> {
        self.last_frame.clear();
        self.last_frame.extend_from_slice(buffer);
        self.width = w;
        self.height = h;
        self.window
            .update_with_buffer(buffer, w, h)
            .map_err(|e| VmError::User(format!("failed to update window: {}", e)))?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.window.is_key_down(key)
    }

    pub fn mouse_down(&self) -> bool {
        self.window.get_mouse_down(MouseButton::Left)
    }

    pub fn mouse_pos(&self) -> Option<(u32, u32)> {
        self.window
            .get_mouse_pos(MouseMode::Clamp)
            .map(|(x, y)| (x.max(0.0) as u32, y.max(0.0) as u32))
    }

    pub fn set_cursor_visible(&mut self, visible: bool) {
        self.window.set_cursor_visibility(visible);
    }

    // minifb has no fullscreen toggle; remember the request so titles that
    // query the state stay consistent.
    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
        warn!("Fullscreen toggle not supported by the window backend");
    }

    pub fn screenshot(&self) -> Result<()> {
        fs::create_dir_all("Screenshots")?;
        let name = format!("Screenshots/ai5vm_{:010}.ppm", self.ticks());
        let mut f = fs::File::create(&name)?;
        write!(f, "P6\n{} {}\n255\n", self.width, self.height)?;
        let mut row = Vec::with_capacity(self.width * 3);
        for y in 0..self.height {
            row.clear();
            for x in 0..self.width {
                let px = self.last_frame[y * self.width + x];
                row.push((px >> 16) as u8);
                row.push((px >> 8) as u8);
                row.push(px as u8);
            }
            f.write_all(&row)?;
        }
        info!("Saved screenshot to \"{}\"", name);
        Ok(())
    }

    /// Modal dialogs are out of reach for a plain framebuffer window; the
    /// message still has to reach the user before the process exits.
    pub fn error_message(&self, message: &str) {
        eprintln!("Fatal Error - ai5vm: {}", message);
    }

    pub fn confirm_quit(&self) -> bool {
        true
    }
}

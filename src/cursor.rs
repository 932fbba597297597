// Cursor state. The host mouse is authoritative for position when a
// window exists; the logical position is kept so that scripts that warp
// the cursor read back what they wrote (the framebuffer backend cannot
// warp the real pointer).

use log::warn;

use crate::vm::Vm;

pub struct CursorState {
    pub visible: bool,
    pub x: u32,
    pub y: u32,
    pub loaded: Option<u32>,
}

impl CursorState {
    pub fn new() -> CursorState {
        CursorState { visible: true, x: 0, y: 0, loaded: None }
    }
}

impl Default for CursorState {
    fn default() -> CursorState {
        CursorState::new()
    }
}

impl Vm {
    pub fn cursor_get_pos(&self) -> (u32, u32) {
        if let Some(host) = &self.host {
            if let Some(pos) = host.mouse_pos() {
                return pos;
            }
        }
        (self.cursor.x, self.cursor.y)
    }

    pub fn cursor_set_pos(&mut self, x: u32, y: u32) {
        self.cursor.x = x;
        self.cursor.y = y;
    }

    pub fn cursor_show(&mut self) {
        self.cursor.visible = true;
        if let Some(host) = &mut self.host {
            host.set_cursor_visible(true);
        }
    }

    pub fn cursor_hide(&mut self) {
        self.cursor.visible = false;
        if let Some(host) = &mut self.host {
            host.set_cursor_visible(false);
        }
    }

    /// Cursor graphics live in the executable's resources, which aren't
    /// mounted here; remember the index so reload works.
    pub fn cursor_load(&mut self, no: u32) {
        self.cursor.loaded = Some(no);
    }

    pub fn cursor_unload(&mut self) {
        self.cursor.loaded = None;
    }

    pub fn cursor_reload(&mut self) {
        if self.cursor.loaded.is_none() {
            warn!("Cursor.reload with no cursor loaded");
        }
    }
}

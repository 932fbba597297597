// Button-level input model. The host window reports raw key state; this
// module tracks per-button levels, generates discrete key-up events for
// keywait, and owns the monotonic tick counter so that a headless runtime
// (tests) still has a clock.

use std::collections::VecDeque;
use std::time::Instant;

use minifb::Key;

use crate::host::Host;

pub const NR_BUTTONS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Button {
    Activate,
    Cancel,
    Ctrl,
    Shift,
    Up,
    Down,
    Left,
    Right,
    Backspace,
}

pub const ALL_BUTTONS: [Button; NR_BUTTONS] = [
    Button::Activate,
    Button::Cancel,
    Button::Ctrl,
    Button::Shift,
    Button::Up,
    Button::Down,
    Button::Left,
    Button::Right,
    Button::Backspace,
];

impl Button {
    pub fn from_index(i: u32) -> Option<Button> {
        ALL_BUTTONS.get(i as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyUp(Button),
    MouseUp,
}

pub struct Input {
    start: Instant,
    down: [bool; NR_BUTTONS],
    mouse_down: bool,
    pub queue: VecDeque<InputEvent>,
    pub quit: bool,
}

fn button_keys(b: Button) -> &'static [Key] {
    match b {
        Button::Activate => &[Key::Enter, Key::Space],
        Button::Cancel => &[Key::Escape],
        Button::Ctrl => &[Key::LeftCtrl, Key::RightCtrl],
        Button::Shift => &[Key::LeftShift, Key::RightShift],
        Button::Up => &[Key::Up],
        Button::Down => &[Key::Down],
        Button::Left => &[Key::Left],
        Button::Right => &[Key::Right],
        Button::Backspace => &[Key::Backspace],
    }
}

impl Input {
    pub fn new() -> Input {
        Input {
            start: Instant::now(),
            down: [false; NR_BUTTONS],
            mouse_down: false,
            queue: VecDeque::new(),
            quit: false,
        }
    }

    pub fn ticks(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    /// Sample the host's key state, queueing an event for every
    /// down-to-up transition.
    pub fn poll(&mut self, host: &Host) {
        if !host.is_open() {
            self.quit = true;
        }
        for (i, &b) in ALL_BUTTONS.iter().enumerate() {
            let now = button_keys(b).iter().any(|&k| host.key_down(k))
                || (b == Button::Activate && host.mouse_down());
            if self.down[i] && !now {
                self.queue.push_back(InputEvent::KeyUp(b));
            }
            self.down[i] = now;
        }
        let mouse = host.mouse_down();
        if self.mouse_down && !mouse {
            self.queue.push_back(InputEvent::MouseUp);
        }
        self.mouse_down = mouse;
    }

    pub fn is_down(&self, b: Button) -> bool {
        self.down[b as usize]
    }

    pub fn pop_event(&mut self) -> Option<InputEvent> {
        self.queue.pop_front()
    }

    pub fn clear_events(&mut self) {
        self.queue.clear();
    }

    /// Test hook: fake a button transition without a window.
    pub fn inject(&mut self, event: InputEvent) {
        self.queue.push_back(event);
    }
    pub fn set_down(&mut self, b: Button, v: bool) {
        self.down[b as usize] = v;
    }
}

impl Default for Input {
    fn default() -> Input {
        Input::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_queue_in_order() {
        let mut input = Input::new();
        input.inject(InputEvent::KeyUp(Button::Activate));
        input.inject(InputEvent::KeyUp(Button::Cancel));
        assert_eq!(input.pop_event(), Some(InputEvent::KeyUp(Button::Activate)));
        assert_eq!(input.pop_event(), Some(InputEvent::KeyUp(Button::Cancel)));
        assert_eq!(input.pop_event(), None);
    }

    #[test]
    fn ticks_are_monotonic() {
        let input = Input::new();
        let a = input.ticks();
        let b = input.ticks();
        assert!(b >= a);
    }
}

// Message history. Entry text is stored inside the memory image so that
// scripts can read it back through pointer expressions; the ring metadata
// lives outside because it is not part of the save format.
//
// `head == tail` is a valid non-empty state in this ring; a boolean
// distinguishes the actually-empty case.

use log::warn;

use crate::game::Flag;
use crate::memory::{BACKLOG_DATA_SIZE, BACKLOG_NR_ENTRIES};
use crate::vm::Vm;
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    ptr: u32,
    present: bool,
    has_voice: bool,
}

pub struct Backlog {
    entries: [Entry; BACKLOG_NR_ENTRIES as usize],
    head: usize,
    tail: usize,
    empty: bool,
}

impl Backlog {
    pub fn new() -> Backlog {
        Backlog {
            entries: [Entry::default(); BACKLOG_NR_ENTRIES as usize],
            head: 0,
            tail: 0,
            empty: true,
        }
    }

    fn translate(&self, no: usize) -> usize {
        (self.tail + no) % BACKLOG_NR_ENTRIES as usize
    }
}

impl Default for Backlog {
    fn default() -> Backlog {
        Backlog::new()
    }
}

impl Vm {
    pub fn backlog_clear(&mut self) -> Result<()> {
        self.backlog = Backlog::new();
        let off = self.memory.backlog_off();
        self.memory.fill_bytes(off, BACKLOG_NR_ENTRIES * BACKLOG_DATA_SIZE, 0)
    }

    /// Open a new entry unless one is already being written.
    pub fn backlog_prepare(&mut self) {
        if !self.flag_is_on(Flag::LogEnable) || self.flag_is_on(Flag::LogText) {
            return;
        }
        let log = &mut self.backlog;
        if log.head == log.tail && !log.empty {
            log.tail = (log.tail + 1) % BACKLOG_NR_ENTRIES as usize;
        }
        log.entries[log.head] = Entry::default();
        self.flag_on(Flag::LogText);
    }

    pub fn backlog_commit(&mut self) {
        if !self.flag_is_on(Flag::LogEnable) || !self.flag_is_on(Flag::LogText) {
            return;
        }
        let log = &mut self.backlog;
        log.entries[log.head].present = true;
        log.head = (log.head + 1) % BACKLOG_NR_ENTRIES as usize;
        log.empty = false;
        self.flag_off(Flag::LogText);
    }

    pub fn backlog_count(&self) -> u32 {
        let log = &self.backlog;
        if log.empty || !log.entries[log.tail].present {
            return 0;
        }
        let mut count = 0;
        let mut i = log.tail;
        loop {
            count += 1;
            i = (i + 1) % BACKLOG_NR_ENTRIES as usize;
            if i == log.tail || !log.entries[i].present {
                break;
            }
        }
        count
    }

    /// Image offset of entry `no`'s text, or 0 when absent.
    pub fn backlog_get_pointer(&self, no: u32) -> u32 {
        if no >= BACKLOG_NR_ENTRIES {
            warn!("Invalid backlog index: {}", no);
            return 0;
        }
        let i = self.backlog.translate(no as usize);
        if !self.backlog.entries[i].present {
            return 0;
        }
        self.memory.backlog_off() + i as u32 * BACKLOG_DATA_SIZE
    }

    pub fn backlog_has_voice(&self, no: u32) -> bool {
        if no >= BACKLOG_NR_ENTRIES {
            warn!("Invalid backlog index: {}", no);
            return false;
        }
        let i = self.backlog.translate(no as usize);
        self.backlog.entries[i].present && self.backlog.entries[i].has_voice
    }

    pub fn backlog_set_has_voice(&mut self) {
        let head = self.backlog.head;
        self.backlog.entries[head].has_voice = true;
    }

    pub fn backlog_push_byte(&mut self, b: u8) -> Result<()> {
        let head = self.backlog.head;
        let ptr = self.backlog.entries[head].ptr;
        if ptr >= BACKLOG_DATA_SIZE - 1 {
            warn!("Backlog entry full, dropping text");
            return Ok(());
        }
        let off = self.memory.backlog_off() + head as u32 * BACKLOG_DATA_SIZE + ptr;
        self.memory.write_u8(off, b)?;
        self.memory.write_u8(off + 1, 0)?;
        self.backlog.entries[head].ptr = ptr + 1;
        Ok(())
    }

    pub fn backlog_push_text(&mut self, text: &str) -> Result<()> {
        if !self.flag_is_on(Flag::LogEnable) || !self.flag_is_on(Flag::LogText) {
            return Ok(());
        }
        for b in text.bytes() {
            self.backlog_push_byte(b)?;
        }
        Ok(())
    }
}

// Script-defined menus. MENUI records entry number and body address into
// the image's parallel arrays (so saves capture menu state); MENUS runs a
// selection loop and executes the chosen body as a nested scope. Bodies
// that want the menu re-presented set the MENU_RETURN flag.

use log::warn;

use crate::game::Flag;
use crate::input::{Button, InputEvent};
use crate::memory::NR_MENU_ENTRIES;
use crate::vm::{Vm, VmPointer};
use crate::Result;

pub struct MenuState {
    pub nr_entries: u32,
}

impl MenuState {
    pub fn new() -> MenuState {
        MenuState { nr_entries: 0 }
    }
}

impl Default for MenuState {
    fn default() -> MenuState {
        MenuState::new()
    }
}

impl Vm {
    pub fn menu_define(&mut self, no: u32, body: u32, body_empty: bool) -> Result<()> {
        if body_empty {
            return Ok(());
        }
        let i = self.menu.nr_entries;
        if i >= NR_MENU_ENTRIES {
            warn!("Too many menu entries, ignoring entry {}", no);
            return Ok(());
        }
        let addr_off = self.memory.menu_entry_addr_off() + i * 4;
        let num_off = self.memory.menu_entry_num_off() + i * 4;
        self.memory.write_u32(addr_off, body)?;
        self.memory.write_u32(num_off, no)?;
        self.menu.nr_entries = i + 1;
        Ok(())
    }

    pub fn menu_clear(&mut self) {
        self.menu.nr_entries = 0;
    }

    fn menu_entry(&self, i: u32) -> Result<(u32, u32)> {
        let addr = self.memory.read_u32(self.memory.menu_entry_addr_off() + i * 4)?;
        let num = self.memory.read_u32(self.memory.menu_entry_num_off() + i * 4)?;
        Ok((num, addr))
    }

    /// Look up an entry index by its entry number; 0xffff when absent.
    pub fn menu_get_no(&mut self, no: u32) -> Result<()> {
        for i in 0..self.menu.nr_entries {
            let (num, _) = self.menu_entry(i)?;
            if num == no {
                return self.memory.set_var16(18, i as u16);
            }
        }
        self.memory.set_var16(18, 0xffff)
    }

    fn menu_choose(&mut self) -> Result<Option<u32>> {
        let count = self.menu.nr_entries;
        if self.host.is_none() {
            // headless: first entry, so scripted tests can drive menus
            return Ok(Some(0));
        }
        let mut selected = 0u32;
        self.input.clear_events();
        loop {
            self.vm_peek()?;
            match self.input.pop_event() {
                Some(InputEvent::KeyUp(Button::Up)) => {
                    selected = (selected + count - 1) % count;
                }
                Some(InputEvent::KeyUp(Button::Down)) => {
                    selected = (selected + 1) % count;
                }
                Some(InputEvent::KeyUp(Button::Activate)) | Some(InputEvent::MouseUp) => {
                    return Ok(Some(selected));
                }
                Some(InputEvent::KeyUp(Button::Cancel)) => {
                    return Ok(None);
                }
                _ => {}
            }
            self.vm_delay(16)?;
        }
    }

    /// The MENUS statement: present until a body runs without requesting
    /// re-presentation.
    pub fn menu_exec(&mut self) -> Result<()> {
        if self.menu.nr_entries == 0 {
            warn!("MENUS with no defined entries");
            return Ok(());
        }
        loop {
            let chosen = match self.menu_choose()? {
                Some(i) => i,
                None => break,
            };
            let (num, addr) = self.menu_entry(chosen)?;
            self.memory.set_var16(18, num as u16)?;
            let saved_ip = self.ip;
            self.ip = VmPointer { ptr: addr, base: self.memory.file_data_off() };
            self.exec()?;
            self.ip = saved_ip;
            if self.flag_is_on(Flag::MenuReturn) {
                self.flag_off(Flag::MenuReturn);
                continue;
            }
            break;
        }
        self.menu_clear();
        Ok(())
    }
}

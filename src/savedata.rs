// Save files. A save is the first mem16_size bytes of the memory image,
// written verbatim; the image being little-endian everywhere makes the
// files portable across hosts. Missing saves are created zero-filled, as
// the stock engine ships pre-made FLAG files.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::warn;

use crate::game::Flag;
use crate::memory::MES_NAME_SIZE;
use crate::vm::Vm;
use crate::{Result, VmError};

pub fn save_name(save_no: u32) -> Result<String> {
    if save_no > 99 {
        return Err(VmError::BadSaveNumber(save_no));
    }
    Ok(format!("FLAG{:02}", save_no))
}

fn locate(dir: &std::path::Path, name: &str) -> PathBuf {
    // saves live next to the INI; match case-insensitively like assets
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
                return entry.path();
            }
        }
    }
    dir.join(name)
}

impl Vm {
    fn save_size(&self) -> u32 {
        self.memory.mem16_size()
    }

    fn open_save(&self, name: &str, write: bool) -> Option<fs::File> {
        let path = locate(&self.config.save_dir, name);
        if !path.is_file() {
            warn!("Save file \"{}\" doesn't exist", name);
            let zeroes = vec![0u8; self.save_size() as usize];
            if let Err(e) = fs::write(&path, &zeroes) {
                warn!("Failed to create save file \"{}\": {}", name, e);
                return None;
            }
        }
        let result = fs::OpenOptions::new().read(true).write(write).open(&path);
        match result {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("Failed to open save file \"{}\": {}", name, e);
                None
            }
        }
    }

    /// Read `len` bytes at `off` from the save into the same offset of
    /// the memory image.
    fn read_save(&mut self, name: &str, off: u32, len: u32) {
        let mut f = match self.open_save(name, false) {
            Some(f) => f,
            None => return,
        };
        let mut buf = vec![0u8; len as usize];
        let ok = f
            .seek(SeekFrom::Start(off as u64))
            .and_then(|_| f.read_exact(&mut buf))
            .is_ok();
        if !ok {
            warn!("Short read from save file \"{}\"", name);
            return;
        }
        if let Err(e) = self.memory.write_bytes(off, &buf) {
            warn!("Save range outside memory image: {}", e);
        }
    }

    fn write_save(&mut self, name: &str, off: u32, len: u32) {
        let data = match self.memory.read_bytes(off, len) {
            Ok(d) => d.to_vec(),
            Err(e) => {
                warn!("Save range outside memory image: {}", e);
                return;
            }
        };
        let mut f = match self.open_save(name, true) {
            Some(f) => f,
            None => return,
        };
        let ok = f
            .seek(SeekFrom::Start(off as u64))
            .and_then(|_| f.write_all(&data))
            .is_ok();
        if !ok {
            warn!("Short write to save file \"{}\"", name);
        }
    }

    /// Full resume: restore the image, re-seed the offset pointers, and
    /// arrange for the saved MES to run from the top.
    pub fn savedata_resume_load(&mut self, name: &str) -> Result<()> {
        let size = self.save_size();
        self.read_save(name, 0, size);
        (self.game.mem_restore)(self);
        let mes = self.memory.mes_name();
        self.load_mes(&mes)?;
        self.flag_on(Flag::Return);
        Ok(())
    }

    pub fn savedata_resume_save(&mut self, name: &str) {
        let size = self.save_size();
        self.write_save(name, 0, size);
    }

    /// Load / save everything except the MES name.
    pub fn savedata_load(&mut self, name: &str) {
        let size = self.save_size();
        self.read_save(name, MES_NAME_SIZE, size - MES_NAME_SIZE);
        (self.game.mem_restore)(self);
    }

    pub fn savedata_save(&mut self, name: &str) {
        let size = self.save_size();
        self.write_save(name, MES_NAME_SIZE, size - MES_NAME_SIZE);
    }

    pub fn savedata_load_var4(&mut self, name: &str) {
        let off = self.memory.var4_off();
        let len = self.memory.var4_size();
        self.read_save(name, off, len);
    }

    pub fn savedata_save_var4(&mut self, name: &str) {
        let off = self.memory.var4_off();
        let len = self.memory.var4_size();
        self.write_save(name, off, len);
    }

    /// OR the live var4 region into the save, preserving set flags from
    /// both; used by clear-game bookkeeping.
    pub fn savedata_save_union_var4(&mut self, name: &str) {
        let off = self.memory.var4_off();
        let len = self.memory.var4_size();
        let mut f = match self.open_save(name, true) {
            Some(f) => f,
            None => return,
        };
        let mut buf = vec![0u8; len as usize];
        let ok = f
            .seek(SeekFrom::Start(off as u64))
            .and_then(|_| f.read_exact(&mut buf))
            .is_ok();
        if !ok {
            warn!("Short read from save file \"{}\"", name);
            return;
        }
        let live = match self.memory.read_bytes(off, len) {
            Ok(d) => d,
            Err(_) => return,
        };
        for (b, l) in buf.iter_mut().zip(live.iter()) {
            *b |= l;
        }
        let ok = f
            .seek(SeekFrom::Start(off as u64))
            .and_then(|_| f.write_all(&buf))
            .is_ok();
        if !ok {
            warn!("Short write to save file \"{}\"", name);
        }
    }

    /// Byte slice [from, to] of the packed var4 array.
    pub fn savedata_load_var4_slice(&mut self, name: &str, from: u32, to: u32) {
        if from > to || to >= self.memory.var4_size() {
            warn!("Invalid var4 slice: {}..{}", from, to);
            return;
        }
        let off = self.memory.var4_off();
        self.read_save(name, off + from, (to + 1) - from);
    }

    pub fn savedata_save_var4_slice(&mut self, name: &str, from: u32, to: u32) {
        if from > to || to >= self.memory.var4_size() {
            warn!("Invalid var4 slice: {}..{}", from, to);
            return;
        }
        let off = self.memory.var4_off();
        self.write_save(name, off + from, (to + 1) - from);
    }

    pub fn savedata_copy(&mut self, src: &str, dst: &str) {
        let mut f = match self.open_save(src, false) {
            Some(f) => f,
            None => return,
        };
        let mut buf = vec![0u8; self.save_size() as usize];
        if f.read_exact(&mut buf).is_err() {
            warn!("Short read from save file \"{}\"", src);
            return;
        }
        let mut out = match self.open_save(dst, true) {
            Some(f) => f,
            None => return,
        };
        if out.write_all(&buf).is_err() {
            warn!("Short write to save file \"{}\"", dst);
        }
    }

    /// Partial resume used by the title menus: restore the MES name and a
    /// fixed subset of var4 bytes, then resume.
    pub fn savedata_load_partial(&mut self, name: &str) -> Result<()> {
        let mut f = match self.open_save(name, false) {
            Some(f) => f,
            None => return Ok(()),
        };
        let var4_end = self.memory.var4_off() + self.memory.var4_size();
        let mut buf = vec![0u8; var4_end as usize];
        if f.read_exact(&mut buf).is_err() {
            warn!("Short read from save file \"{}\"", name);
            return Ok(());
        }
        self.memory.write_bytes(0, &buf[..MES_NAME_SIZE as usize])?;
        let var4 = &buf[self.memory.var4_off() as usize..];
        for i in partial_var4_bytes(self.memory.var4_size()) {
            self.memory.write_u8(self.memory.var4_off() + i, var4[i as usize])?;
        }
        (self.game.mem_restore)(self);
        let mes = self.memory.mes_name();
        self.load_mes(&mes)?;
        self.flag_on(Flag::Return);
        Ok(())
    }

    /// Counterpart of `savedata_load_partial`: merge the same subset of
    /// the live var4 bytes into the save under the stashed MES name.
    pub fn savedata_save_partial(&mut self, name: &str) -> Result<()> {
        let stashed = match &self.stashed_mes_name {
            Some(n) => n.clone(),
            None => self.memory.mes_name(),
        };
        let mut mes = [0u8; MES_NAME_SIZE as usize];
        for (i, b) in stashed.bytes().take(mes.len() - 1).enumerate() {
            mes[i] = b;
        }
        let var4_off = self.memory.var4_off();
        let mut f = match self.open_save(name, true) {
            Some(f) => f,
            None => return Ok(()),
        };
        if f.write_all(&mes).is_err() {
            warn!("Short write to save file \"{}\"", name);
            return Ok(());
        }
        for i in partial_var4_bytes(self.memory.var4_size()) {
            let b = self.memory.read_u8(var4_off + i)?;
            let ok = f
                .seek(SeekFrom::Start((var4_off + i) as u64))
                .and_then(|_| f.write_all(&[b]))
                .is_ok();
            if !ok {
                warn!("Short write to save file \"{}\"", name);
                return Ok(());
            }
        }
        Ok(())
    }

    pub fn savedata_stash_name(&mut self) {
        self.stashed_mes_name = Some(self.memory.mes_name());
    }

    pub fn savedata_set_mes_name(&mut self, name: &str, mes_name: &str) {
        let path = locate(&self.config.save_dir, name);
        if !path.is_file() {
            let zeroes = vec![0u8; self.save_size() as usize];
            if fs::write(&path, &zeroes).is_err() {
                warn!("Failed to create save file \"{}\"", name);
                return;
            }
        }
        let mut f = match fs::OpenOptions::new().write(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to open save file \"{}\": {}", name, e);
                return;
            }
        };
        let mut buf = mes_name.as_bytes().to_vec();
        buf.push(0);
        if f.write_all(&buf).is_err() {
            warn!("Short write to save file \"{}\"", name);
        }
    }
}

// The subset of var4 bytes the partial save/load operations touch, per
// the stock engine's tables (cleared-route and bookkeeping flags).
fn partial_var4_bytes(var4_size: u32) -> impl Iterator<Item = u32> {
    let cap = var4_size;
    [18u32, 21, 29]
        .iter()
        .copied()
        .chain(50..90)
        .chain(96..2000)
        .filter(move |&i| i < cap)
}

// The MES interpreter: expression evaluator, statement dispatch and the
// cooperative execution loop. All runtime state hangs off one Vm value
// that is threaded through every syscall handler; suspension only happens
// inside vm_delay/vm_peek and the wait helpers, where host events are
// pumped, animation streams tick, audio envelopes advance and a frame is
// presented if anything is dirty.

use std::thread;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::asset::Assets;
use crate::audio::{Audio, Channel};
use crate::backlog::Backlog;
use crate::cursor::CursorState;
use crate::game::{Flag, Game};
use crate::gfx::Gfx;
use crate::host::Host;
use crate::ini::Config;
use crate::input::{Button, Input, InputEvent};
use crate::memory::{sysvar16, sysvar32, Memory, FILE_DATA_SIZE};
use crate::menu::MenuState;
use crate::opcodes::{
    ExprOp, Param, ParamList, StmtOp, MAX_PARAMS, PARAM_EXPRESSION, STRING_PARAM_SIZE,
};
use crate::text::Text;
use crate::{anim::Anim, Result, VmError};

pub const STACK_SIZE: usize = 1024;
pub const MAX_PROCEDURES: usize = 150;
pub const MES_CALL_STACK_SIZE: usize = 128;

/// Code location: an offset relative to a base offset into the memory
/// image. Code normally executes out of file_data; farcalls rebase.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VmPointer {
    pub ptr: u32,
    pub base: u32,
}

struct MesFrame {
    ip: VmPointer,
    mes_name: String,
    procedures: [Option<VmPointer>; MAX_PROCEDURES],
}

pub struct Vm {
    pub game: Game,
    pub config: Config,
    pub memory: Memory,
    pub gfx: Gfx,
    pub text: Text,
    pub anim: Anim,
    pub audio: Audio,
    pub input: Input,
    pub cursor: CursorState,
    pub assets: Assets,
    pub backlog: Backlog,
    pub menu: MenuState,
    pub host: Option<Host>,
    pub ip: VmPointer,
    pub procedures: [Option<VmPointer>; MAX_PROCEDURES],
    pub stashed_mes_name: Option<String>,
    pub saved_cg_name: Option<String>,
    pub saved_data_name: Option<String>,
    pub saved_anim_running: Vec<bool>,
    /// Scratch slots for per-title hook state.
    pub title_scratch: [u32; 8],
    scope_counter: u32,
    stack: Vec<u32>,
    call_stack: Vec<MesFrame>,
}

impl Vm {
    pub fn new(game: Game, config: Config, host: Option<Host>) -> Vm {
        let memory = Memory::new(game.var4_size, game.mem16_size);
        let gfx = Gfx::new(&game.surface_sizes, game.bpp);
        let anim = Anim::new(game.nr_anim_streams, game.anim_frame_time);
        let mut audio = Audio::new(host.is_some() && config.sound);
        audio.set_initial_volume(Channel::Bgm, config.volume_music as u8, config.mute_music);
        for i in 0..crate::audio::NR_SE_CHANNELS {
            audio.set_initial_volume(Channel::Se(i), config.volume_se as u8, config.mute_effect);
        }
        for i in 0..crate::audio::NR_VOICE_CHANNELS {
            audio.set_initial_volume(
                Channel::Voice(i),
                config.volume_voice as u8,
                config.mute_voice,
            );
        }
        let assets = Assets::new(&config);
        let file_data = memory.file_data_off();
        let mut vm = Vm {
            game,
            config,
            memory,
            gfx,
            text: Text::new(),
            anim,
            audio,
            input: Input::new(),
            cursor: CursorState::new(),
            assets,
            backlog: Backlog::new(),
            menu: MenuState::new(),
            host,
            ip: VmPointer { ptr: 0, base: file_data },
            procedures: [None; MAX_PROCEDURES],
            stashed_mes_name: None,
            saved_cg_name: None,
            saved_data_name: None,
            saved_anim_running: Vec::new(),
            title_scratch: [0; 8],
            scope_counter: 0,
            stack: Vec::with_capacity(STACK_SIZE),
            call_stack: Vec::new(),
        };
        (vm.game.mem_init)(&mut vm);
        vm
    }

    /// Windowless runtime for tests and tooling.
    pub fn new_headless(game: Game) -> Vm {
        Vm::new(game, Config::default(), None)
    }

    // -- diagnostics --------------------------------------------------

    pub fn print_state(&self) {
        eprintln!(
            "ip = {:08x} (base {:08x}) in \"{}\"",
            self.ip.ptr,
            self.ip.base,
            self.memory.mes_name()
        );
        for frame in self.call_stack.iter().rev() {
            eprintln!("  called from \"{}\" at {:08x}", frame.mes_name, frame.ip.ptr);
        }
    }

    // -- code fetch ---------------------------------------------------

    fn read_byte(&mut self) -> Result<u8> {
        let b = self.memory.read_u8(self.ip.base + self.ip.ptr)?;
        self.ip.ptr += 1;
        Ok(b)
    }

    fn peek_byte(&self) -> Result<u8> {
        self.memory.read_u8(self.ip.base + self.ip.ptr)
    }

    fn rewind_byte(&mut self) {
        self.ip.ptr -= 1;
    }

    fn read_word(&mut self) -> Result<u16> {
        let v = self.memory.read_u16(self.ip.base + self.ip.ptr)?;
        self.ip.ptr += 2;
        Ok(v)
    }

    fn read_dword(&mut self) -> Result<u32> {
        let v = self.memory.read_u32(self.ip.base + self.ip.ptr)?;
        self.ip.ptr += 4;
        Ok(v)
    }

    // -- expression stack ---------------------------------------------

    fn stack_push(&mut self, val: u32) -> Result<()> {
        if self.stack.len() >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(val);
        Ok(())
    }

    fn stack_pop(&mut self) -> Result<u32> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    // -- flags --------------------------------------------------------

    pub fn flag_is_on(&self, flag: Flag) -> bool {
        let mask = self.game.flag_mask(flag);
        match mask {
            0 => false,
            crate::game::FLAG_ALWAYS_ON => true,
            mask => {
                let flags = self.memory.get_sysvar16(sysvar16::FLAGS).unwrap_or(0);
                flags & mask == mask
            }
        }
    }

    pub fn flag_on(&mut self, flag: Flag) {
        let mask = self.game.flag_mask(flag);
        if mask == 0 || mask == crate::game::FLAG_ALWAYS_ON {
            return;
        }
        if let Ok(flags) = self.memory.get_sysvar16(sysvar16::FLAGS) {
            let _ = self.memory.set_sysvar16(sysvar16::FLAGS, flags | mask);
        }
    }

    pub fn flag_off(&mut self, flag: Flag) {
        let mask = self.game.flag_mask(flag);
        if mask == 0 || mask == crate::game::FLAG_ALWAYS_ON {
            return;
        }
        if let Ok(flags) = self.memory.get_sysvar16(sysvar16::FLAGS) {
            let _ = self.memory.set_sysvar16(sysvar16::FLAGS, flags & !mask);
        }
    }

    // -- loading ------------------------------------------------------

    pub fn load_mes(&mut self, name: &str) -> Result<()> {
        let data = self.assets.mes_load(name)?;
        if data.len() as u32 > FILE_DATA_SIZE {
            return Err(VmError::MesLoad(name.to_string()));
        }
        self.memory.set_mes_name(name);
        self.memory.write_bytes(self.memory.file_data_off(), &data)?;
        Ok(())
    }

    /// System.File.read: copy a data file into file_data at `offset`.
    pub fn load_data_file(&mut self, name: &str, offset: u32) -> Result<()> {
        let data = match self.assets.data_load(name) {
            Some(d) => d,
            None => {
                warn!("Failed to read data file \"{}\"", name);
                return Ok(());
            }
        };
        if offset + data.len() as u32 > FILE_DATA_SIZE {
            warn!("Tried to read file beyond end of buffer");
            return Ok(());
        }
        self.memory.write_bytes(self.memory.file_data_off() + offset, &data)?;
        Ok(())
    }

    /// Shared System.load_image: stash the raw CG at the CG offset, draw
    /// it, and optionally take over its palette.
    pub fn load_image(&mut self, name: &str, surface: usize) -> Result<()> {
        let raw = match self.assets.cg_load_raw(name) {
            Some(d) => d,
            None => {
                warn!("Failed to load CG \"{}\"", name);
                return Ok(());
            }
        };
        let off = self.memory.get_sysvar32(sysvar32::CG_OFFSET)?;
        if off + raw.len() as u32 > FILE_DATA_SIZE {
            warn!("CG data would exceed buffer size");
            return Ok(());
        }
        self.memory.write_bytes(self.memory.file_data_off() + off, &raw)?;
        let cg = match crate::asset::decode_cg(&raw) {
            Some(cg) => cg,
            None => {
                warn!("Failed to decode CG \"{}\"", name);
                return Ok(());
            }
        };
        let x_mult = self.game.x_mult.max(1) as u32;
        if !self.flag_is_on(Flag::PaletteOnly) {
            self.memory.set_sysvar16(sysvar16::CG_X, (cg.x / x_mult) as u16)?;
            self.memory.set_sysvar16(sysvar16::CG_Y, cg.y as u16)?;
            self.memory.set_sysvar16(sysvar16::CG_W, (cg.w / x_mult) as u16)?;
            self.memory.set_sysvar16(sysvar16::CG_H, cg.h as u16)?;
            self.gfx.draw_cg(surface, &cg)?;
        }
        if let Some(palette) = &cg.palette {
            if self.flag_is_on(Flag::LoadPalette) {
                self.memory.write_bytes(self.memory.palette_off(), palette)?;
            }
        }
        Ok(())
    }

    // -- expression language ------------------------------------------

    pub fn eval(&mut self) -> Result<u32> {
        loop {
            let op = self.read_byte()?;
            let decoded = self.game.expr_op[op as usize];
            match decoded {
                Some(ExprOp::Imm) => self.stack_push(op as u32)?,
                Some(ExprOp::Imm16) => {
                    let v = self.read_word()? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Imm32) => {
                    let v = self.read_dword()?;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Var16) => {
                    let i = self.read_byte()? as u32;
                    let v = self.memory.get_var16(i)? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Var32) => {
                    let i = self.read_byte()? as u32;
                    let v = self.memory.get_var32(i)?;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Array16Get16) => {
                    let i = self.stack_pop()?;
                    let var = self.read_byte()? as u32;
                    let base = if var == 0 {
                        self.memory.sysvar16_bank()?
                    } else {
                        self.memory.get_var16(var - 1)? as u32
                    };
                    let v = self.memory.read_u16(base + i * 2)? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Array16Get8) => {
                    let i = self.stack_pop()?;
                    let var = self.read_byte()? as u32;
                    let base = self.memory.get_var16(var)? as u32;
                    let v = self.memory.read_u8(base + i)? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Array32Get32) => {
                    let i = self.stack_pop()?;
                    let var = self.read_byte()? as u32;
                    let base = if var == 0 {
                        self.memory.sysvar32_off()
                    } else {
                        self.memory.get_var32(var - 1)?
                    };
                    let v = self.memory.read_u32(base + i * 4)?;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Array32Get16) => {
                    let i = self.stack_pop()?;
                    let var = self.read_byte()? as u32;
                    if var == 0 {
                        warn!("Array32Get16 through var 0");
                        self.stack_push(0)?;
                        continue;
                    }
                    let base = self.memory.get_var32(var - 1)?;
                    let v = self.memory.read_u16(base + i * 2)? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Array32Get8) => {
                    let i = self.stack_pop()?;
                    let var = self.read_byte()? as u32;
                    if var == 0 {
                        warn!("Array32Get8 through var 0");
                        self.stack_push(0)?;
                        continue;
                    }
                    let base = self.memory.get_var32(var - 1)?;
                    let v = self.memory.read_u8(base + i)? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Var4Get16) => {
                    let i = self.read_word()? as u32;
                    let v = self.memory.get_var4(i)? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Var4Get8) => {
                    let i = self.stack_pop()?;
                    let v = self.memory.get_var4(i)? as u32;
                    self.stack_push(v)?;
                }
                Some(ExprOp::Plus) => self.binary_op(|a, b| a.wrapping_add(b))?,
                Some(ExprOp::Minus) => self.binary_op(|a, b| a.wrapping_sub(b))?,
                Some(ExprOp::Mul) => self.binary_op(|a, b| a.wrapping_mul(b))?,
                Some(ExprOp::Div) => self.binary_op(|a, b| {
                    if b == 0 {
                        warn!("Division by zero in expression");
                        0
                    } else {
                        a / b
                    }
                })?,
                Some(ExprOp::Mod) => self.binary_op(|a, b| {
                    if b == 0 {
                        warn!("Division by zero in expression");
                        0
                    } else {
                        a % b
                    }
                })?,
                Some(ExprOp::Rand) => {
                    let range = self.stack_pop()?;
                    let v = if range == 0 { 0 } else { rand::thread_rng().gen_range(0..range) };
                    self.stack_push(v)?;
                }
                Some(ExprOp::RandImm) => {
                    let range = self.read_word()? as u32;
                    let v = if range == 0 { 0 } else { rand::thread_rng().gen_range(0..range) };
                    self.stack_push(v)?;
                }
                Some(ExprOp::LogAnd) => self.binary_op(|a, b| (a != 0 && b != 0) as u32)?,
                Some(ExprOp::LogOr) => self.binary_op(|a, b| (a != 0 || b != 0) as u32)?,
                Some(ExprOp::BitAnd) => self.binary_op(|a, b| a & b)?,
                Some(ExprOp::BitIor) => self.binary_op(|a, b| a | b)?,
                Some(ExprOp::BitXor) => self.binary_op(|a, b| a ^ b)?,
                Some(ExprOp::Lt) => self.binary_op(|a, b| (a < b) as u32)?,
                Some(ExprOp::Gt) => self.binary_op(|a, b| (a > b) as u32)?,
                Some(ExprOp::Lte) => self.binary_op(|a, b| (a <= b) as u32)?,
                Some(ExprOp::Gte) => self.binary_op(|a, b| (a >= b) as u32)?,
                Some(ExprOp::Eq) => self.binary_op(|a, b| (a == b) as u32)?,
                Some(ExprOp::Neq) => self.binary_op(|a, b| (a != b) as u32)?,
                Some(ExprOp::End) => {
                    let r = self.stack_pop()?;
                    if !self.stack.is_empty() {
                        return Err(VmError::StackNotEmpty);
                    }
                    return Ok(r);
                }
                None => {
                    warn!("Unknown expression opcode: {:#04x}", op);
                    self.stack_push(0)?;
                }
            }
        }
    }

    fn binary_op(&mut self, f: impl Fn(u32, u32) -> u32) -> Result<()> {
        let b = self.stack_pop()?;
        let a = self.stack_pop()?;
        self.stack_push(f(a, b))
    }

    // -- parameters ---------------------------------------------------

    pub fn read_params(&mut self) -> Result<ParamList> {
        let mut params = ParamList::default();
        loop {
            let tag = self.read_byte()?;
            if tag == 0 {
                return Ok(params);
            }
            if params.params.len() >= MAX_PARAMS {
                return Err(VmError::TooManyParams);
            }
            if tag == PARAM_EXPRESSION {
                let v = self.eval()?;
                params.params.push(Param::Expression(v));
            } else {
                params.params.push(Param::Str(self.read_string_param()?));
            }
        }
    }

    fn read_string_param(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        loop {
            let c = self.read_byte()?;
            if c == 0 {
                break;
            }
            if buf.len() >= STRING_PARAM_SIZE {
                return Err(VmError::StringParamOverflow);
            }
            buf.push(c);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    // -- text ---------------------------------------------------------

    fn stmt_txt(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            let c = self.peek_byte()?;
            if c == 0 {
                self.read_byte()?;
                break;
            }
            if c < 0x80 {
                warn!("Invalid byte in TXT statement: {:#04x}", c);
                break;
            }
            buf.push(self.read_byte()?);
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        self.draw_text(&text)
    }

    fn stmt_str(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            let c = self.peek_byte()?;
            if c == 0 {
                self.read_byte()?;
                break;
            }
            if c >= 0x80 {
                warn!("Invalid byte in STR statement: {:#04x}", c);
                break;
            }
            buf.push(self.read_byte()?);
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        self.draw_text(&text)
    }

    /// Glyph advance in pixels, honouring the title override.
    pub fn glyph_advance(&self, ch: char) -> u32 {
        if let Some(f) = self.game.text_advance {
            if let Some(adv) = f(self, ch) {
                return adv;
            }
        }
        self.text_size_char(ch)
    }

    /// Draw a string at the text cursor, wrapping in x_mult column units
    /// against the text area sysvars.
    pub fn draw_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if let Some(hook) = self.game.custom_text {
            return hook(self, text);
        }
        if self.flag_is_on(Flag::Strlen) {
            let units: u32 = text.chars().map(|c| if c as u32 > 0xff { 2 } else { 1 }).sum();
            let var = self.game.farcall_strlen_retvar;
            let cur = self.memory.get_var32(var)?;
            self.memory.set_var32(var, cur.wrapping_add(units))?;
            return Ok(());
        }
        self.backlog_prepare();
        self.backlog_push_text(text)?;
        let x_mult = self.game.x_mult.max(1) as i32;
        let char_space = self.memory.get_sysvar16(sysvar16::CHAR_SPACE)?;
        let surface = self.memory.get_sysvar16(sysvar16::DST_SURFACE)? as usize;
        let end_x = self.memory.get_sysvar16(sysvar16::TEXT_END_X)?;
        for ch in text.chars() {
            let zenkaku = ch as u32 > 0xff;
            let adv = if zenkaku { char_space / 8 } else { char_space / 16 }.max(1);
            let mut x = self.memory.get_sysvar16(sysvar16::TEXT_CURSOR_X)?;
            let mut y = self.memory.get_sysvar16(sysvar16::TEXT_CURSOR_Y)?;
            if x + adv > end_x {
                y = y.wrapping_add(self.memory.get_sysvar16(sysvar16::LINE_SPACE)?);
                x = self.memory.get_sysvar16(sysvar16::TEXT_START_X)?;
            }
            self.text_draw_glyph(x as i32 * x_mult, y as i32, surface, ch)?;
            self.memory.set_sysvar16(sysvar16::TEXT_CURSOR_X, x + adv)?;
            self.memory.set_sysvar16(sysvar16::TEXT_CURSOR_Y, y)?;
        }
        Ok(())
    }

    // -- assignment statements ----------------------------------------

    fn stmt_setrbc(&mut self) -> Result<()> {
        let mut i = self.read_word()? as u32;
        loop {
            let v = self.eval()?;
            self.memory.set_var4(i, (v & 0xf) as u8)?;
            i += 1;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_setv(&mut self) -> Result<()> {
        let mut i = self.read_byte()? as u32;
        loop {
            let v = self.eval()?;
            self.memory.set_var16(i, v as u16)?;
            i += 1;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_setrbe(&mut self) -> Result<()> {
        let mut i = self.eval()?;
        loop {
            let v = self.eval()?;
            self.memory.set_var4(i, (v & 0xf) as u8)?;
            i += 1;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_setrd(&mut self) -> Result<()> {
        let mut i = self.read_byte()? as u32;
        loop {
            let v = self.eval()?;
            self.memory.set_var32(i, v)?;
            i += 1;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_setac(&mut self) -> Result<()> {
        let i = self.eval()?;
        let var = self.read_byte()? as u32;
        let mut dst = self.memory.get_var4(var)? as u32 + i;
        loop {
            let v = self.eval()?;
            self.memory.write_u8(dst, v as u8)?;
            dst += 1;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_seta_at(&mut self) -> Result<()> {
        let i = self.eval()?;
        let var = self.read_byte()? as u32;
        let base = if var == 0 {
            self.memory.sysvar16_bank()?
        } else {
            self.memory.get_var16(var - 1)? as u32
        };
        let mut dst = base + i * 2;
        loop {
            let v = self.eval()?;
            self.memory.write_u16(dst, v as u16)?;
            dst += 2;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_setad(&mut self) -> Result<()> {
        let i = self.eval()?;
        let var = self.read_byte()? as u32;
        let base = if var == 0 {
            self.memory.sysvar32_off()
        } else {
            self.memory.get_var32(var - 1)?
        };
        let mut dst = base + i * 4;
        loop {
            let v = self.eval()?;
            self.memory.write_u32(dst, v)?;
            dst += 4;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_setaw(&mut self) -> Result<()> {
        let i = self.eval()?;
        let var = self.read_byte()? as u32;
        if var == 0 {
            warn!("SETAW through var 0");
        }
        let base = self.memory.get_var32(var.max(1) - 1)?;
        let mut dst = base + i * 2;
        loop {
            let v = self.eval()?;
            self.memory.write_u16(dst, v as u16)?;
            dst += 2;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    fn stmt_setab(&mut self) -> Result<()> {
        let i = self.eval()?;
        let var = self.read_byte()? as u32;
        if var == 0 {
            warn!("SETAB through var 0");
        }
        let base = self.memory.get_var32(var.max(1) - 1)?;
        let mut dst = base + i;
        loop {
            let v = self.eval()?;
            self.memory.write_u8(dst, v as u8)?;
            dst += 1;
            if self.read_byte()? == 0 {
                return Ok(());
            }
        }
    }

    // -- control flow -------------------------------------------------

    fn stmt_jz(&mut self) -> Result<()> {
        let val = self.eval()?;
        let ptr = self.read_dword()?;
        if val == 1 {
            return Ok(());
        }
        self.ip.ptr = ptr;
        Ok(())
    }

    fn stmt_jmp(&mut self) -> Result<()> {
        self.ip.ptr = self.memory.read_u32(self.ip.base + self.ip.ptr)?;
        Ok(())
    }

    fn stmt_sys(&mut self) -> Result<()> {
        let no = self.eval()?;
        let params = self.read_params()?;
        let handler = self.game.sys.get(no as usize).copied().flatten();
        match handler {
            Some(f) => f(self, &params),
            None => {
                warn!("System.function[{}] not implemented", no);
                Ok(())
            }
        }
    }

    fn stmt_util(&mut self) -> Result<()> {
        let params = self.read_params()?;
        let no = params.expr(0)?;
        let handler = self.game.util.get(no as usize).copied().flatten();
        match handler {
            Some(f) => f(self, &params),
            None => {
                warn!("Util.function[{}] not implemented", no);
                Ok(())
            }
        }
    }

    fn stmt_goto(&mut self) -> Result<()> {
        let params = self.read_params()?;
        let name = params.string(0)?.to_string();
        self.load_mes(&name)?;
        self.flag_on(Flag::Return);
        Ok(())
    }

    fn stmt_call(&mut self) -> Result<()> {
        let params = self.read_params()?;
        let name = params.string(0)?.to_string();

        if self.call_stack.len() >= MES_CALL_STACK_SIZE {
            return Err(VmError::CallStackOverflow);
        }
        self.call_stack.push(MesFrame {
            ip: self.ip,
            mes_name: self.memory.mes_name(),
            procedures: self.procedures,
        });
        self.procedures = [None; MAX_PROCEDURES];

        self.ip = VmPointer { ptr: 0, base: self.memory.file_data_off() };
        self.load_mes(&name)?;
        let result = self.exec();

        // Restore the caller on any unwind; the RETURN flag, when set,
        // additionally restarts the caller from the top in the outer
        // loop.
        let frame = self.call_stack.pop().expect("call stack imbalance");
        self.ip = frame.ip;
        if self.game.call_saves_procedures {
            self.procedures = frame.procedures;
        }
        self.load_mes(&frame.mes_name)?;
        result
    }

    fn stmt_menui(&mut self) -> Result<()> {
        let params = self.read_params()?;
        let no = params.expr(0)?;
        let addr = self.read_dword()?;
        let body = self.ip.ptr;
        self.menu_define(no, body, addr == body + 1)?;
        self.ip.ptr = addr;
        Ok(())
    }

    fn stmt_proc(&mut self) -> Result<()> {
        let params = self.read_params()?;
        let no = params.expr(0)?;
        if self.game.proc_clears_flag {
            let was_on = self.flag_is_on(Flag::ProcClear);
            self.flag_off(Flag::ProcClear);
            let r = self.call_procedure(no);
            if was_on {
                self.flag_on(Flag::ProcClear);
            }
            r
        } else {
            self.call_procedure(no)
        }
    }

    fn stmt_procd(&mut self) -> Result<()> {
        let i = self.eval()?;
        if i as usize >= MAX_PROCEDURES {
            return Err(VmError::BadProcedure(i));
        }
        self.procedures[i as usize] =
            Some(VmPointer { ptr: self.ip.ptr + 4, base: self.ip.base });
        self.ip.ptr = self.read_dword()?;
        Ok(())
    }

    fn stmt_line(&mut self) -> Result<()> {
        if self.read_byte()? != 0 {
            return Ok(());
        }
        let start_x = self.memory.get_sysvar16(sysvar16::TEXT_START_X)?;
        let y = self.memory.get_sysvar16(sysvar16::TEXT_CURSOR_Y)?;
        let line_space = self.memory.get_sysvar16(sysvar16::LINE_SPACE)?;
        self.memory.set_sysvar16(sysvar16::TEXT_CURSOR_X, start_x)?;
        self.memory.set_sysvar16(sysvar16::TEXT_CURSOR_Y, y.wrapping_add(line_space))?;
        Ok(())
    }

    /// Run a procedure defined by PROCD, restoring the caller's IP.
    pub fn call_procedure(&mut self, no: u32) -> Result<()> {
        if no as usize >= MAX_PROCEDURES {
            return Err(VmError::BadProcedure(no));
        }
        let proc = self.procedures[no as usize].ok_or(VmError::UndefinedProcedure(no))?;
        let saved = self.ip;
        self.ip = proc;
        let r = self.exec();
        self.ip = saved;
        r
    }

    pub fn procedure_defined(&self, no: u32) -> bool {
        (no as usize) < MAX_PROCEDURES && self.procedures[no as usize].is_some()
    }

    /// Execute a code block at an arbitrary image offset.
    pub fn farcall(&mut self, addr: u32) -> Result<()> {
        if addr >= self.memory.size() {
            return Err(VmError::BadFarcall(addr));
        }
        let saved = self.ip;
        self.ip = VmPointer { ptr: 0, base: addr };
        let r = self.exec();
        self.ip = saved;
        r
    }

    // -- execution loop -----------------------------------------------

    pub fn exec_statement(&mut self) -> Result<bool> {
        let op = self.read_byte()?;
        match self.game.stmt_op[op as usize] {
            Some(StmtOp::End) => return Ok(false),
            Some(StmtOp::Txt) => self.stmt_txt()?,
            Some(StmtOp::Str) => self.stmt_str()?,
            Some(StmtOp::SetRbc) => self.stmt_setrbc()?,
            Some(StmtOp::SetV) => self.stmt_setv()?,
            Some(StmtOp::SetRbe) => self.stmt_setrbe()?,
            Some(StmtOp::SetAc) => self.stmt_setac()?,
            Some(StmtOp::SetAAt) => self.stmt_seta_at()?,
            Some(StmtOp::SetAd) => self.stmt_setad()?,
            Some(StmtOp::SetAw) => self.stmt_setaw()?,
            Some(StmtOp::SetAb) => self.stmt_setab()?,
            Some(StmtOp::Jz) => self.stmt_jz()?,
            Some(StmtOp::Jmp) => self.stmt_jmp()?,
            Some(StmtOp::Sys) => self.stmt_sys()?,
            Some(StmtOp::Goto) => self.stmt_goto()?,
            Some(StmtOp::Call) => self.stmt_call()?,
            Some(StmtOp::Menui) => self.stmt_menui()?,
            Some(StmtOp::Proc) => self.stmt_proc()?,
            Some(StmtOp::Util) => self.stmt_util()?,
            Some(StmtOp::Line) => self.stmt_line()?,
            Some(StmtOp::Procd) => self.stmt_procd()?,
            Some(StmtOp::Menus) => self.menu_exec()?,
            Some(StmtOp::SetRd) => self.stmt_setrd()?,
            None => {
                // probably unprefixed text
                self.rewind_byte();
                warn!("Unprefixed text: {:#04x} (possibly unhandled statement)", op);
                if op < 0x80 {
                    self.stmt_str()?;
                } else {
                    self.stmt_txt()?;
                }
            }
        }
        Ok(true)
    }

    pub fn exec(&mut self) -> Result<()> {
        self.scope_counter += 1;
        let r = self.exec_inner();
        self.scope_counter -= 1;
        r
    }

    fn exec_inner(&mut self) -> Result<()> {
        loop {
            self.gfx_update()?;
            if self.flag_is_on(Flag::Return) {
                if self.scope_counter != 1 {
                    return Ok(());
                }
                self.flag_off(Flag::Return);
                self.ip.ptr = 0;
            }
            if !self.exec_statement()? {
                return Ok(());
            }
            self.vm_peek()?;
        }
    }

    /// Driver entry point: run the start MES to completion.
    pub fn run(&mut self, start_mes: &str) -> Result<()> {
        if let Some(init) = self.game.init {
            init(self)?;
        }
        self.load_mes(start_mes)?;
        self.exec()
    }

    // -- timing & pumping ---------------------------------------------

    pub fn ticks(&self) -> u32 {
        self.input.ticks()
    }

    pub fn timer_create(&self) -> u32 {
        self.ticks()
    }

    /// Sleep off the remainder of `ms` since the previous tick of this
    /// timer, pumping while waiting.
    pub fn timer_tick(&mut self, timer: &mut u32, ms: u32) -> Result<()> {
        let t = self.ticks();
        let delta = t.wrapping_sub(*timer);
        *timer = t;
        if delta < ms {
            self.vm_delay(ms - delta)?;
        }
        Ok(())
    }

    /// One non-blocking pump: host events, animation, audio envelopes,
    /// present.
    pub fn vm_peek(&mut self) -> Result<()> {
        if let Some(host) = &mut self.host {
            host.pump();
        }
        let had_events = {
            let Vm { input, host, .. } = self;
            if let Some(host) = host {
                input.poll(host);
            }
            !input.queue.is_empty()
        };
        if had_events {
            if let Some(handle_event) = self.game.handle_event {
                handle_event(self)?;
            }
        }
        if self.input.quit {
            let confirmed = self.host.as_ref().map(|h| h.confirm_quit()).unwrap_or(true);
            if confirmed {
                return Err(VmError::Quit);
            }
            self.input.quit = false;
        }
        self.anim_execute()?;
        let now = self.ticks();
        self.audio.update(now);
        self.gfx_update()?;
        if let Some(update) = self.game.update {
            update(self)?;
        }
        Ok(())
    }

    pub fn vm_delay(&mut self, ms: u32) -> Result<()> {
        let target = self.ticks().wrapping_add(ms);
        loop {
            self.vm_peek()?;
            let now = self.ticks();
            let remaining = target.wrapping_sub(now);
            if remaining == 0 || remaining > ms {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(remaining.min(4) as u64));
        }
    }

    pub fn gfx_update(&mut self) -> Result<()> {
        let Vm { gfx, host, .. } = self;
        if let Some(host) = host {
            gfx.update(host)?;
        } else {
            gfx.compose_display();
        }
        Ok(())
    }

    // -- input helpers ------------------------------------------------

    pub fn input_down(&self, b: Button) -> bool {
        self.input.is_down(b)
    }

    pub fn input_wait_until_up(&mut self, b: Button) -> Result<()> {
        while self.input.is_down(b) {
            self.vm_peek()?;
            self.vm_delay(8)?;
        }
        Ok(())
    }

    /// Block until a discrete input event arrives. Headless runtimes get
    /// an immediate ACTIVATE so scripted tests don't hang.
    pub fn input_keywait(&mut self) -> Result<InputEvent> {
        loop {
            if let Some(ev) = self.input.pop_event() {
                return Ok(ev);
            }
            if self.host.is_none() {
                return Ok(InputEvent::KeyUp(Button::Activate));
            }
            self.vm_peek()?;
            self.vm_delay(8)?;
        }
    }

    // -- audio helpers ------------------------------------------------

    pub fn audio_play(&mut self, ch: Channel, name: &str, check_playing: bool) {
        let Vm { audio, assets, .. } = self;
        audio.play(ch, assets, name, check_playing);
    }

    pub fn audio_fade(
        &mut self,
        ch: Channel,
        vol: u8,
        ms: u32,
        stop: bool,
        sync: bool,
    ) -> Result<()> {
        let now = self.ticks();
        self.audio.fade(ch, vol, ms, stop, now);
        if sync {
            while self.audio.is_fading(ch) {
                self.vm_peek()?;
                self.vm_delay(16)?;
            }
        }
        Ok(())
    }
}

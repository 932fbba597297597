// S4 animation streams. Each stream owns a pointer (image offset) to its
// S4 file and bytecode, an IP, stall counter, two loop frames and a draw
// offset. External code sets a command; the stream transitions its own
// state at well-defined points. One instruction per un-halted stream per
// scheduler tick, with the tick gated to the title's frame time.

use log::warn;

use crate::game::Flag;
use crate::memory::{sysvar16, sysvar32};
use crate::vm::Vm;
use crate::{Result, VmError};

pub const DRAW_CALL_SIZE: u32 = 15;

// stream bytecode ops; anything >= 20 is a draw-call index
pub const OP_NOOP: u8 = 0;
pub const OP_CHECK_STOP: u8 = 1;
pub const OP_STALL: u8 = 2;
pub const OP_RESET: u8 = 3;
pub const OP_HALT: u8 = 4;
pub const OP_LOOP_START: u8 = 5;
pub const OP_LOOP_END: u8 = 6;
pub const OP_LOOP2_START: u8 = 7;
pub const OP_LOOP2_END: u8 = 8;
pub const OP_DRAW_BASE: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Halted,
    Run,
    /// Halt at the next CHECK_STOP instruction.
    Stop,
    /// Halt after the next instruction.
    HaltNext,
}

#[derive(Debug, Clone, Copy)]
struct Loop {
    start: u32,
    count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Stream {
    pub cmd: Command,
    /// Image offset of the S4 file.
    file_data: u32,
    /// Image offset of this stream's bytecode.
    bytecode: u32,
    ip: u32,
    stall_count: u32,
    loop1: Loop,
    loop2: Loop,
    pub off_x: i32,
    pub off_y: i32,
}

impl Stream {
    fn new() -> Stream {
        Stream {
            cmd: Command::Halted,
            file_data: 0,
            bytecode: 0,
            ip: 0,
            stall_count: 0,
            loop1: Loop { start: 0, count: 0 },
            loop2: Loop { start: 0, count: 0 },
            off_x: 0,
            off_y: 0,
        }
    }
}

pub struct Anim {
    pub streams: Vec<Stream>,
    pub frame_time: u32,
    prev_frame_t: u32,
}

impl Anim {
    pub fn new(nr_streams: usize, frame_time: u32) -> Anim {
        Anim {
            streams: vec![Stream::new(); nr_streams],
            frame_time,
            prev_frame_t: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
    Fill,
    Copy,
    CopyMasked,
    Swap,
    Compose,
    SetColor,
    SetPalette,
}

#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub op: DrawOp,
    pub src_i: usize,
    pub src_x: i32,
    pub src_y: i32,
    pub w: i32,
    pub h: i32,
    pub dst_i: usize,
    pub dst_x: i32,
    pub dst_y: i32,
}

impl Vm {
    fn check_stream_index(&self, i: u32) -> Result<usize> {
        if (i as usize) < self.anim.streams.len() {
            Ok(i as usize)
        } else {
            Err(VmError::BadAnimStream(i))
        }
    }

    /// Point stream `stream` at sub-program `no` of the S4 file currently
    /// loaded at the data offset.
    pub fn anim_init_stream(&mut self, stream: u32, no: u32) -> Result<()> {
        let i = self.check_stream_index(stream)?;
        let file_data =
            self.memory.file_data_off() + self.memory.get_sysvar32(sysvar32::DATA_OFFSET)?;
        let entry = self.memory.read_u16(file_data + 1 + no * 2)? as u32;
        let s = &mut self.anim.streams[i];
        *s = Stream::new();
        s.file_data = file_data;
        s.bytecode = file_data + entry;
        Ok(())
    }

    pub fn anim_start(&mut self, stream: u32) -> Result<()> {
        let i = self.check_stream_index(stream)?;
        self.anim.streams[i].cmd = Command::Run;
        self.anim.streams[i].ip = 0;
        Ok(())
    }

    pub fn anim_stop(&mut self, stream: u32) -> Result<()> {
        let i = self.check_stream_index(stream)?;
        self.anim.streams[i].cmd = Command::Stop;
        Ok(())
    }

    pub fn anim_halt(&mut self, stream: u32) -> Result<()> {
        let i = self.check_stream_index(stream)?;
        self.anim.streams[i].cmd = Command::Halted;
        Ok(())
    }

    pub fn anim_stop_all(&mut self) {
        for s in &mut self.anim.streams {
            if s.cmd != Command::Halted {
                s.cmd = Command::Stop;
            }
        }
    }

    pub fn anim_halt_all(&mut self) {
        for s in &mut self.anim.streams {
            s.cmd = Command::Halted;
        }
    }

    pub fn anim_set_offset(&mut self, stream: u32, x: i32, y: i32) -> Result<()> {
        let i = self.check_stream_index(stream)?;
        self.anim.streams[i].off_x = x;
        self.anim.streams[i].off_y = y;
        Ok(())
    }

    pub fn anim_stream_running(&self, stream: u32) -> bool {
        match self.anim.streams.get(stream as usize) {
            Some(s) => s.cmd != Command::Halted,
            None => false,
        }
    }

    pub fn anim_running(&self) -> bool {
        self.anim.streams.iter().any(|s| s.cmd != Command::Halted)
    }

    /// Spin the event loop until the stream halts.
    pub fn anim_wait(&mut self, stream: u32) -> Result<()> {
        self.check_stream_index(stream)?;
        while self.anim_stream_running(stream) {
            self.vm_peek()?;
            self.vm_delay(8)?;
        }
        Ok(())
    }

    fn parse_draw_call(&self, s: &Stream, index: u8) -> Result<Option<DrawCall>> {
        let nr_streams = self.memory.read_u8(s.file_data)? as u32;
        let off =
            s.file_data + 1 + nr_streams * 2 + (index - OP_DRAW_BASE) as u32 * DRAW_CALL_SIZE;
        let rec = self.memory.read_bytes(off, DRAW_CALL_SIZE)?;
        let op = match rec[0] {
            0 => DrawOp::Fill,
            1 => DrawOp::Copy,
            2 => DrawOp::CopyMasked,
            3 => DrawOp::Swap,
            4 => DrawOp::Compose,
            5 => DrawOp::SetColor,
            6 => DrawOp::SetPalette,
            other => {
                warn!("Failed to parse draw call {}: bad op {}", index, other);
                return Ok(None);
            }
        };
        let le16 = |i: usize| u16::from_le_bytes([rec[i], rec[i + 1]]) as i32;
        Ok(Some(DrawCall {
            op,
            src_i: rec[1] as usize,
            src_x: le16(2),
            src_y: le16(4),
            w: le16(6),
            h: le16(8),
            dst_i: rec[10] as usize,
            dst_x: le16(11),
            dst_y: le16(13),
        }))
    }

    fn anim_stream_draw(&mut self, i: usize, index: u8) -> Result<()> {
        if index < OP_DRAW_BASE {
            warn!("Invalid draw call index: {}", index);
            return Ok(());
        }
        let s = self.anim.streams[i];
        let mut call = match self.parse_draw_call(&s, index)? {
            Some(c) => c,
            None => return Ok(()),
        };
        call.dst_x += s.off_x;
        call.dst_y += s.off_y;
        let mask = self.memory.get_sysvar16(sysvar16::MASK_COLOR)? as u32;
        match call.op {
            DrawOp::Fill => {
                self.gfx.fill(call.dst_x, call.dst_y, call.w, call.h, call.dst_i, 8);
            }
            DrawOp::Copy => {
                self.gfx.copy(
                    call.src_x, call.src_y, call.w, call.h, call.src_i, call.dst_x, call.dst_y,
                    call.dst_i,
                );
            }
            DrawOp::CopyMasked => {
                self.gfx.copy_masked(
                    call.src_x, call.src_y, call.w, call.h, call.src_i, call.dst_x, call.dst_y,
                    call.dst_i, mask,
                );
            }
            DrawOp::Swap => {
                self.gfx.copy_swap(
                    call.src_x, call.src_y, call.w, call.h, call.src_i, call.dst_x, call.dst_y,
                    call.dst_i,
                );
            }
            DrawOp::Compose => {
                self.gfx.compose(
                    call.src_x, call.src_y, call.w, call.h, call.src_i, call.dst_x, call.dst_y,
                    call.dst_i, call.dst_x, call.dst_y, call.dst_i, mask,
                );
            }
            DrawOp::SetColor | DrawOp::SetPalette => {}
        }
        if let Some(hook) = self.game.after_anim_draw {
            hook(self, &call)?;
        }
        Ok(())
    }

    fn anim_stream_execute(&mut self, i: usize) -> Result<()> {
        {
            let s = &mut self.anim.streams[i];
            if s.stall_count > 0 {
                s.stall_count -= 1;
                return Ok(());
            }
        }
        let op = {
            let s = &self.anim.streams[i];
            self.memory.read_u8(s.bytecode + s.ip)?
        };
        self.anim.streams[i].ip += 1;
        match op {
            OP_NOOP => {}
            OP_CHECK_STOP => {
                let s = &mut self.anim.streams[i];
                if s.cmd == Command::Stop {
                    s.cmd = Command::Halted;
                }
            }
            OP_STALL => {
                let s = &self.anim.streams[i];
                let n = self.memory.read_u8(s.bytecode + s.ip)? as u32;
                let s = &mut self.anim.streams[i];
                s.ip += 1;
                // the STALL dispatch itself consumes one of the n frames
                s.stall_count = n.saturating_sub(1);
            }
            OP_RESET => {
                self.anim.streams[i].ip = 0;
            }
            OP_HALT => {
                self.anim.streams[i].cmd = Command::Halted;
            }
            OP_LOOP_START => {
                let s = &self.anim.streams[i];
                let n = self.memory.read_u8(s.bytecode + s.ip)? as u32;
                let s = &mut self.anim.streams[i];
                s.ip += 1;
                s.loop1 = Loop { start: s.ip, count: n };
            }
            OP_LOOP_END => {
                let s = &mut self.anim.streams[i];
                if s.loop1.count > 0 {
                    s.loop1.count -= 1;
                    if s.loop1.count > 0 {
                        s.ip = s.loop1.start;
                    }
                }
            }
            OP_LOOP2_START => {
                let s = &self.anim.streams[i];
                let n = self.memory.read_u8(s.bytecode + s.ip)? as u32;
                let s = &mut self.anim.streams[i];
                s.ip += 1;
                s.loop2 = Loop { start: s.ip, count: n };
            }
            OP_LOOP2_END => {
                let s = &mut self.anim.streams[i];
                if s.loop2.count > 0 {
                    s.loop2.count -= 1;
                    if s.loop2.count > 0 {
                        s.ip = s.loop2.start;
                    }
                }
            }
            draw => self.anim_stream_draw(i, draw)?,
        }
        if self.anim.streams[i].cmd == Command::HaltNext {
            self.anim.streams[i].cmd = Command::Halted;
        }
        Ok(())
    }

    /// One ungated scheduler round: each un-halted stream executes one
    /// instruction.
    pub fn anim_tick(&mut self) -> Result<()> {
        for i in 0..self.anim.streams.len() {
            if self.anim.streams[i].cmd == Command::Halted {
                continue;
            }
            self.anim_stream_execute(i)?;
        }
        Ok(())
    }

    /// The per-frame entry point: rate-limited so streams advance at a
    /// bounded rate regardless of how often the pump runs.
    pub fn anim_execute(&mut self) -> Result<()> {
        if !self.flag_is_on(Flag::AnimEnable) {
            return Ok(());
        }
        let t = self.ticks();
        if t.wrapping_sub(self.anim.prev_frame_t) < self.anim.frame_time {
            return Ok(());
        }
        self.anim.prev_frame_t = t;
        self.anim_tick()
    }

    /// Narrow poke for titles that change the frame rate at runtime.
    pub fn set_anim_frame_time(&mut self, ms: u32) {
        self.anim.frame_time = ms.max(1);
    }
}

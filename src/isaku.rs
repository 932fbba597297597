// Title record for Isaku Renewal: 16-bit direct colour (BGR555 script
// colours over RGB24 surfaces), no column multiplier, procedure table
// cleared around PROC calls.

use log::warn;

use crate::audio::Channel;
use crate::game::{Flag, Game};
use crate::memory::sysvar32;
use crate::opcodes::ParamList;
use crate::sys;
use crate::util;
use crate::vm::Vm;
use crate::Result;

const VAR4_SIZE: u32 = 4096;
const MEM16_SIZE: u32 = 8192;

fn mem_init(vm: &mut Vm) {
    sys::shared_mem_init(vm);
    // direct-colour default: white text over black
    vm.gfx.text_set_colors(0, 0x7fff);
}

fn mem_restore(vm: &mut Vm) {
    sys::shared_mem_restore(vm);
}

fn voice(vm: &mut Vm, params: &ParamList) -> Result<()> {
    if !vm.flag_is_on(Flag::VoiceEnable) {
        return Ok(());
    }
    match params.expr(0)? {
        0 => {
            let name = params.string(1)?.to_string();
            vm.audio_play(Channel::Voice(0), &name, false);
        }
        1 => vm.audio.stop(Channel::Voice(0)),
        2 => {
            let playing = vm.audio.is_playing(Channel::Voice(0));
            vm.memory.set_var32(18, playing as u32)?;
        }
        cmd => warn!("System.Voice.function[{}] not implemented", cmd),
    }
    Ok(())
}

/// Direct-colour graphics group: masks come from the 32-bit mask var.
fn graphics(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => sys::sys_graphics_copy(vm, params),
        1 => sys::sys_graphics_copy_masked24(vm, params),
        2 => sys::sys_graphics_fill_bg(vm, params),
        3 => sys::sys_graphics_copy_swap(vm, params),
        4 => sys::sys_graphics_swap_bg_fg(vm, params),
        5 => sys::sys_graphics_compose(vm, params),
        7 => sys::sys_graphics_blend(vm, params),
        8 => sys::sys_graphics_blend_masked(vm, params),
        9 => sys::sys_graphics_copy_progressive(vm, params),
        10 => sys::sys_graphics_pixel_crossfade(vm, params),
        cmd => {
            warn!("System.Graphics.function[{}] not implemented", cmd);
            Ok(())
        }
    }
}

fn graphics_fill(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    let i = params.expr(5)? as usize;
    let c = params.expr_or(6, 0);
    vm.gfx.fill(x, y, w, h, i, c);
    Ok(())
}

fn graphics_blend_fill(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    let i = params.expr(5)? as usize;
    let c = params.expr(6)?;
    let rate = params.expr(7)? as u8;
    vm.gfx.blend_fill(x, y, w, h, i, c, rate)
}

fn swap_colors(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    let i = params.expr(5)? as usize;
    vm.gfx.swap_colors(x, y, w, h, i, params.expr(6)?, params.expr(7)?);
    Ok(())
}

fn strlen(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let off = vm.memory.get_sysvar32(sysvar32::FILE_DATA)? + params.expr(0)?;
    let s = vm.memory.cstring(off)?;
    vm.memory.set_var32(18, s.len() as u32)
}

pub fn game() -> Game {
    let mut g = Game::base("isaku");
    g.surface_sizes = [
        (640, 480),
        (1000, 1750),
        (640, 480),
        (640, 480),
        (640, 480),
        (640, 480),
        (352, 32),
        (320, 32),
        (640, 480),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
    ];
    g.bpp = 16;
    g.x_mult = 1;
    g.proc_clears_flag = true;
    g.no_antialias_text = true;
    g.var4_size = VAR4_SIZE;
    g.mem16_size = MEM16_SIZE;
    g.nr_anim_streams = 20;
    g.mem_init = mem_init;
    g.mem_restore = mem_restore;

    g.sys[0] = Some(sys::sys_set_font_size);
    g.sys[1] = Some(sys::sys_display_number);
    g.sys[2] = Some(sys::classics_cursor);
    g.sys[3] = Some(sys::classics_anim);
    g.sys[4] = Some(sys::classics_savedata);
    g.sys[5] = Some(sys::classics_audio);
    g.sys[6] = Some(voice);
    g.sys[7] = Some(sys::sys_load_file);
    g.sys[8] = Some(sys::sys_load_image);
    g.sys[9] = Some(sys::sys_display);
    g.sys[10] = Some(graphics);
    g.sys[11] = Some(sys::sys_wait);
    g.sys[12] = Some(sys::sys_set_text_colors_direct);
    g.sys[13] = Some(sys::sys_farcall);
    g.sys[14] = Some(sys::sys_get_cursor_segment);
    g.sys[15] = Some(sys::sys_menu_get_no);
    g.sys[18] = Some(sys::sys_check_input);
    g.sys[20] = Some(graphics_fill);
    g.sys[21] = Some(graphics_blend_fill);
    g.sys[22] = Some(swap_colors);
    g.sys[24] = Some(strlen);
    g.sys[28] = Some(sys::sys_get_time);
    g.sys[29] = Some(sys::sys_backlog);

    g.util[2] = Some(util::util_warn_unimplemented);
    g.util[7] = Some(util::util_delay);
    g.util[11] = Some(util::util_warn_unimplemented);
    g.util[12] = Some(util::util_warn_unimplemented);

    g.flags[Flag::AnimEnable as usize] = 0x0004;
    g.flags[Flag::MenuReturn as usize] = 0x0008;
    g.flags[Flag::Return as usize] = 0x0010;
    g.flags[Flag::ProcClear as usize] = 0x0040;
    g.flags[Flag::LogEnable as usize] = 0x0080;
    g.flags[Flag::LogText as usize] = 0x0020;
    g.flags[Flag::VoiceEnable as usize] = 0x0100;
    g.flags[Flag::AudioEnable as usize] = 0x0200;
    g.flags[Flag::Strlen as usize] = 0x0400;
    g.flags[Flag::WaitKeyup as usize] = 0x0800;
    g
}

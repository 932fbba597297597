// Common System call implementations shared between titles. Calls that
// take a command parameter tend to differ subtly between games, so each
// title wires the grouped dispatchers it actually matches; the "classics"
// groupings below are the ones the early indexed titles share.

use chrono::{Datelike, Local, Timelike};
use log::warn;

use crate::audio::Channel;
use crate::game::Flag;
use crate::input::Button;
use crate::memory::{sysvar16, sysvar32};
use crate::opcodes::ParamList;
use crate::savedata::save_name;
use crate::vm::Vm;
use crate::{Result, VmError};

pub fn shared_mem_init(vm: &mut Vm) {
    let view_w = vm.gfx.view_w as u16;
    let view_h = vm.gfx.view_h as u16;
    let m = &mut vm.memory;
    let _ = m.set_sysvar16(sysvar16::FLAGS, 0x260d);
    let _ = m.set_sysvar16(sysvar16::DST_SURFACE, 0);
    let _ = m.set_sysvar16(sysvar16::TEXT_START_X, 0);
    let _ = m.set_sysvar16(sysvar16::TEXT_START_Y, 0);
    let _ = m.set_sysvar16(sysvar16::TEXT_END_X, view_w);
    let _ = m.set_sysvar16(sysvar16::TEXT_END_Y, view_h);
    let _ = m.set_sysvar16(sysvar16::FONT_WIDTH, crate::text::DEFAULT_FONT_SIZE as u16);
    let _ = m.set_sysvar16(sysvar16::FONT_HEIGHT, crate::text::DEFAULT_FONT_SIZE as u16);
    let _ = m.set_sysvar16(sysvar16::CHAR_SPACE, crate::text::DEFAULT_FONT_SIZE as u16);
    let _ = m.set_sysvar16(sysvar16::LINE_SPACE, crate::text::DEFAULT_FONT_SIZE as u16);
    let _ = m.set_sysvar16(sysvar16::MASK_COLOR, 0);
    let _ = m.set_sysvar32(sysvar32::CG_OFFSET, 0x20000);
    let _ = m.set_sysvar32(sysvar32::DATA_OFFSET, 0x30000);
    shared_mem_restore(vm);
}

/// Re-seed the pointers stored inside the image. These are image offsets
/// rather than host pointers, so a restored save needs them refreshed for
/// the running layout.
pub fn shared_mem_restore(vm: &mut Vm) {
    let m = &mut vm.memory;
    let sysvar16_off = m.sysvar16_off();
    let _ = m.set_sysvar16_bank(sysvar16_off);
    let _ = m.set_sysvar32(sysvar32::MEMORY, 0);
    let _ = m.set_sysvar32(sysvar32::PALETTE, m.palette_off());
    let _ = m.set_sysvar32(sysvar32::FILE_DATA, m.file_data_off());
    let _ = m.set_sysvar32(sysvar32::MENU_ENTRY_ADDRESSES, m.menu_entry_addr_off());
    let _ = m.set_sysvar32(sysvar32::MENU_ENTRY_NUMBERS, m.menu_entry_num_off());
}

// -- simple calls -----------------------------------------------------

pub fn sys_set_font_size(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let size = vm.memory.get_sysvar16(sysvar16::FONT_HEIGHT)? as u32;
    let weight = vm.memory.get_sysvar16(sysvar16::FONT_WEIGHT)? as u32;
    vm.text_set_size(size, weight);
    Ok(())
}

const MAX_DIGITS: u32 = 10;

pub fn sys_display_number(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let flags = vm.memory.get_sysvar16(sysvar16::DISPLAY_NUMBER_FLAGS)?;
    let mut display_digits = ((flags & 0xff) as u32).min(MAX_DIGITS);
    let halfwidth = flags & 0x100 != 0;

    let mut n = params.expr(0)?;
    let mut digits = [0u8; MAX_DIGITS as usize];
    let mut nr_digits = 0;
    for i in (0..MAX_DIGITS as usize).rev() {
        if n == 0 {
            break;
        }
        digits[i] = (n % 10) as u8;
        n /= 10;
        nr_digits += 1;
    }
    if display_digits == 0 {
        display_digits = nr_digits.max(1);
    }

    let mut text = String::new();
    for i in (MAX_DIGITS - display_digits) as usize..MAX_DIGITS as usize {
        if halfwidth {
            text.push((b'0' + digits[i]) as char);
        } else {
            // full-width digit block
            text.push(std::char::from_u32(0xff10 + digits[i] as u32).unwrap_or('0'));
        }
    }

    if flags & 0x400 != 0 {
        return vm.memory.set_var32(18, text.chars().count() as u32);
    }
    vm.draw_text(&text)
}

pub fn sys_cursor_save_pos(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let (x, y) = vm.cursor_get_pos();
    vm.memory.set_sysvar16(sysvar16::CURSOR_X, x as u16)?;
    vm.memory.set_sysvar16(sysvar16::CURSOR_Y, y as u16)?;
    Ok(())
}

pub fn sys_file(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => vm.load_data_file(params.string(1)?.to_string().as_str(), params.expr(2)?),
        cmd => {
            warn!("System.File.function[{}] not implemented", cmd);
            Ok(())
        }
    }
}

pub fn sys_load_file(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let name = params.string(0)?.to_string();
    vm.load_data_file(&name, params.expr(1)?)
}

pub fn sys_load_image(vm: &mut Vm, params: &ParamList) -> Result<()> {
    vm.anim_halt_all();
    let name = params.string(0)?.to_string();
    let surface = vm.memory.get_sysvar16(sysvar16::DST_SURFACE)? as usize;
    vm.load_image(&name, surface)
}

pub fn sys_wait(vm: &mut Vm, params: &ParamList) -> Result<()> {
    vm.backlog_commit();
    if params.is_empty() || params.expr(0)? == 0 {
        loop {
            if vm.input_down(Button::Ctrl) {
                vm.vm_peek()?;
                let delay = vm.config.msg_skip_delay;
                vm.vm_delay(delay)?;
                return Ok(());
            }
            if vm.input_down(Button::Activate) {
                if vm.flag_is_on(Flag::WaitKeyup) {
                    vm.input_wait_until_up(Button::Activate)?;
                }
                return Ok(());
            }
            if vm.host.is_none() {
                // headless runs have nobody to wait for
                return Ok(());
            }
            vm.vm_peek()?;
            vm.vm_delay(16)?;
        }
    }
    let mut timer = vm.timer_create();
    let target = timer + (params.expr(0)? / 4) * 15;
    while timer < target && !vm.input_down(Button::Shift) {
        vm.vm_peek()?;
        let step = (target - timer).min(15);
        vm.timer_tick(&mut timer, step)?;
    }
    Ok(())
}

pub fn sys_set_text_colors_indexed(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let colors = params.expr(0)?;
    vm.gfx.text_set_colors((colors >> 4) & 0xf, colors & 0xf);
    Ok(())
}

pub fn sys_set_text_colors_direct(vm: &mut Vm, params: &ParamList) -> Result<()> {
    vm.gfx.text_set_colors(params.expr(0)?, params.expr(1)?);
    Ok(())
}

pub fn sys_farcall(vm: &mut Vm, params: &ParamList) -> Result<()> {
    vm.farcall(params.expr(0)?)
}

/// Array lookup keyed on cursor position: scans id/rect records at the
/// a6 offset and stores the matching id (0xffff when none) in var16[18].
pub fn get_cursor_segment(vm: &mut Vm, x: u32, y: u32, off: u32) -> Result<()> {
    if x >= vm.gfx.view_w as u32 || y >= vm.gfx.view_h as u32 {
        warn!("Invalid argument to System.get_cursor_segment: ({},{})", x, y);
        return Ok(());
    }
    let mut a = vm.memory.file_data_off() + off;
    let end = vm.memory.file_data_off() + crate::memory::FILE_DATA_SIZE - 10;
    while a < end {
        let id = vm.memory.read_u16(a)?;
        if id == 0xffff {
            return vm.memory.set_var16(18, 0xffff);
        }
        let x_left = vm.memory.read_u16(a + 2)? as u32;
        let y_top = vm.memory.read_u16(a + 4)? as u32;
        let x_right = vm.memory.read_u16(a + 6)? as u32;
        let y_bot = vm.memory.read_u16(a + 8)? as u32;
        if x >= x_left && x <= x_right && y >= y_top && y <= y_bot {
            return vm.memory.set_var16(18, id);
        }
        a += 10;
    }
    warn!("Read past end of buffer in System.get_cursor_segment");
    vm.memory.set_var16(18, 0)
}

pub fn sys_get_cursor_segment(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let off = vm.memory.get_sysvar32(sysvar32::A6_OFFSET)?;
    get_cursor_segment(vm, params.expr(0)?, params.expr(1)?, off)
}

pub fn sys_menu_get_no(vm: &mut Vm, params: &ParamList) -> Result<()> {
    vm.menu_get_no(params.expr(0)?)
}

pub fn sys_check_input(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let input = params.expr(0)?;
    let value = params.expr(1)? != 0;
    let button = match Button::from_index(input) {
        Some(b) => b,
        None => {
            warn!("Invalid input number: {}", input);
            return vm.memory.set_var32(18, 0);
        }
    };
    let is_down = vm.input_down(button);
    vm.memory.set_var32(18, (value == is_down) as u32)
}

pub fn sys_strlen(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let ptr = params.expr(0)?;
    if ptr >= vm.memory.size() {
        return Err(VmError::OutOfBounds { offset: ptr, len: 1 });
    }
    let s = vm.memory.cstring(ptr)?;
    vm.memory.set_var32(18, s.len() as u32)
}

pub fn sys_get_time(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let now = Local::now();
    vm.memory.set_var16(0, now.year() as u16)?;
    vm.memory.set_var16(1, now.month() as u16)?;
    vm.memory.set_var16(2, now.weekday().num_days_from_sunday() as u16)?;
    vm.memory.set_var16(3, now.day() as u16)?;
    vm.memory.set_var16(4, now.hour() as u16)?;
    vm.memory.set_var16(5, now.minute() as u16)?;
    vm.memory.set_var16(6, now.second().min(59) as u16)?;
    Ok(())
}

pub fn sys_set_screen_surface(vm: &mut Vm, params: &ParamList) -> Result<()> {
    vm.gfx.set_screen_surface(params.expr(0)? as usize)
}

/// History-log queries for the titles that render a backlog screen.
pub fn sys_backlog(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => vm.backlog_clear()?,
        1 => {
            let count = vm.backlog_count();
            vm.memory.set_var32(18, count)?;
        }
        2 => {
            let ptr = vm.backlog_get_pointer(params.expr(1)?);
            vm.memory.set_var32(18, ptr)?;
        }
        3 => {
            let has = vm.backlog_has_voice(params.expr(1)?);
            vm.memory.set_var32(18, has as u32)?;
        }
        cmd => warn!("System.Backlog.function[{}] not implemented", cmd),
    }
    Ok(())
}

/// Display show/hide/fade group for the direct-colour titles.
pub fn sys_display(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => {
            let color = params.expr_or(1, 0);
            let Vm { gfx, host, .. } = vm;
            gfx.display_hide(color, host.as_mut())?;
        }
        1 => vm.gfx.display_unhide(),
        2 => vm.display_fade_out(params.expr_or(1, 0), params.expr_or(2, 1000), None)?,
        3 => vm.display_fade_in(params.expr_or(1, 1000), None)?,
        4 => vm.gfx.display_freeze(),
        5 => vm.gfx.display_unfreeze(),
        cmd => warn!("System.Display.function[{}] not implemented", cmd),
    }
    Ok(())
}

// -- classics groupings -----------------------------------------------

pub fn classics_cursor(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => vm.cursor_reload(),
        1 => vm.cursor_unload(),
        2 => return sys_cursor_save_pos(vm, params),
        3 => vm.cursor_set_pos(params.expr(1)?, params.expr(2)?),
        4 => vm.cursor_load(params.expr(1)?),
        5 => vm.cursor_show(),
        6 => vm.cursor_hide(),
        cmd => warn!("System.Cursor.function[{}] not implemented", cmd),
    }
    Ok(())
}

pub fn classics_anim(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => vm.anim_init_stream(params.expr(1)?, params.expr(2)?)?,
        1 => vm.anim_start(params.expr(1)?)?,
        2 => vm.anim_stop(params.expr(1)?)?,
        3 => vm.anim_halt(params.expr(1)?)?,
        4 => vm.anim_wait(params.expr(1)?)?,
        5 => vm.anim_stop_all(),
        6 => vm.anim_halt_all(),
        20 => {
            let x_mult = vm.game.x_mult.max(1) as i32;
            vm.anim_set_offset(
                params.expr(1)?,
                params.expr(2)? as i32 * x_mult,
                params.expr(3)? as i32,
            )?;
        }
        cmd => warn!("System.Anim.function[{}] not implemented", cmd),
    }
    Ok(())
}

pub fn classics_savedata(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let name = save_name(params.expr(1)?)?;
    match params.expr(0)? {
        0 => vm.savedata_resume_load(&name)?,
        1 => vm.savedata_resume_save(&name),
        2 => vm.savedata_load(&name),
        3 => vm.savedata_save(&name),
        4 => vm.savedata_load_var4(&name),
        5 => vm.savedata_save_var4(&name),
        6 => vm.savedata_save_union_var4(&name),
        7 => vm.savedata_load_var4_slice(&name, params.expr(2)?, params.expr(3)?),
        8 => vm.savedata_save_var4_slice(&name, params.expr(2)?, params.expr(3)?),
        9 => {
            let dst = save_name(params.expr(2)?)?;
            vm.savedata_copy(&name, &dst);
        }
        11 => vm.savedata_load_partial(&name)?,
        12 => vm.savedata_save_partial(&name)?,
        13 => vm.savedata_set_mes_name(&name, params.string(2)?),
        cmd => warn!("System.SaveData.function[{}] not implemented", cmd),
    }
    Ok(())
}

pub fn classics_audio(vm: &mut Vm, params: &ParamList) -> Result<()> {
    if !vm.flag_is_on(Flag::AudioEnable) {
        return Ok(());
    }
    match params.expr(0)? {
        0 => {
            let name = params.string(1)?.to_string();
            vm.audio_play(Channel::Bgm, &name, true);
        }
        2 => vm.audio.stop(Channel::Bgm),
        3 => {
            let name = params.string(1)?.to_string();
            vm.audio_play(Channel::Se(0), &name, false);
        }
        4 => vm.audio_fade(
            Channel::Bgm,
            params.expr(1)? as u8,
            params.expr(2)?,
            params.expr_or(3, 0) != 0,
            true,
        )?,
        5 => vm.audio.set_volume(Channel::Bgm, params.expr(1)? as u8),
        7 => vm.audio_fade(
            Channel::Bgm,
            params.expr(1)? as u8,
            params.expr(2)?,
            params.expr_or(3, 0) != 0,
            false,
        )?,
        9 => vm.audio_fade(Channel::Bgm, 0, params.expr(1)?, true, true)?,
        10 => vm.audio_fade(Channel::Bgm, 0, params.expr(2)?, true, false)?,
        12 => vm.audio.stop(Channel::Se(0)),
        18 => vm.audio.restore_volume(Channel::Bgm),
        cmd => warn!("System.Audio.function[{}] not implemented", cmd),
    }
    Ok(())
}

pub fn classics_palette(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => {
            let data =
                vm.memory.read_bytes(vm.memory.palette_off(), crate::memory::PALETTE_SIZE)?.to_vec();
            vm.gfx.palette_set(&data);
        }
        1 => {
            let c = params.expr(1)?;
            vm.gfx.palette_set_color(
                c as u8,
                params.expr(2)? as u8,
                params.expr(3)? as u8,
                params.expr(4)? as u8,
            );
        }
        2 => {
            // t is 0-15 over the interval [0, 3600] in 240ms increments
            let t = (params.expr(1)? & 0xf) * 240;
            if params.len() > 2 {
                let c = params.expr(2)?;
                let r = ((c >> 4) & 0xf) as u8 * 17;
                let g = ((c >> 8) & 0xf) as u8 * 17;
                let b = (c & 0xf) as u8 * 17;
                vm.palette_crossfade_to(r, g, b, t)?;
            } else {
                let data = vm
                    .memory
                    .read_bytes(vm.memory.palette_off(), crate::memory::PALETTE_SIZE)?
                    .to_vec();
                vm.palette_crossfade(&data, t)?;
            }
        }
        cmd => warn!("System.Palette.function[{}] not implemented", cmd),
    }
    Ok(())
}

// graphics parameters arrive as top-left / bottom-right corner pairs
fn rect_params(params: &ParamList, at: usize) -> Result<(i32, i32, i32, i32)> {
    let x = params.expr(at)? as i32;
    let y = params.expr(at + 1)? as i32;
    let w = params.expr(at + 2)? as i32 - x + 1;
    let h = params.expr(at + 3)? as i32 - y + 1;
    Ok((x, y, w, h))
}

pub fn sys_graphics_copy(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    vm.gfx.copy(x, y, w, h, src_i, dst_x, dst_y, dst_i);
    Ok(())
}

pub fn sys_graphics_copy_masked(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    let mask = vm.memory.get_sysvar16(sysvar16::MASK_COLOR)? as u32;
    vm.gfx.copy_masked(x, y, w, h, src_i, dst_x, dst_y, dst_i, mask);
    Ok(())
}

pub fn sys_graphics_copy_masked24(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    let mask = vm.memory.get_sysvar32(sysvar32::MASK_COLOR)?;
    vm.gfx.copy_masked(x, y, w, h, src_i, dst_x, dst_y, dst_i, mask);
    Ok(())
}

pub fn sys_graphics_copy_swap(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    vm.gfx.copy_swap(x, y, w, h, src_i, dst_x, dst_y, dst_i);
    Ok(())
}

pub fn sys_graphics_compose(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let fg_i = params.expr(5)? as usize;
    let bg_x = params.expr(6)? as i32;
    let bg_y = params.expr(7)? as i32;
    let bg_i = params.expr(8)? as usize;
    let dst_x = params.expr(9)? as i32;
    let dst_y = params.expr(10)? as i32;
    let dst_i = params.expr(11)? as usize;
    let mask = vm.memory.get_sysvar16(sysvar16::MASK_COLOR)? as u32;
    vm.gfx.compose(x, y, w, h, fg_i, bg_x, bg_y, bg_i, dst_x, dst_y, dst_i, mask);
    Ok(())
}

pub fn sys_graphics_blend(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    let alpha = params.expr(9)?;
    if alpha < 1 {
        return Ok(());
    }
    if alpha > 15 {
        vm.gfx.copy(x, y, w, h, src_i, dst_x, dst_y, dst_i);
    } else {
        vm.gfx.blend(x, y, w, h, src_i, dst_x, dst_y, dst_i, (alpha * 16 - 8) as u8)?;
    }
    Ok(())
}

pub fn sys_graphics_blend_masked(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    // skip the 4-byte header in front of the mask data
    let ptr = params.expr(9)? + 4;
    if !vm.memory.ptr_valid(ptr, (w * h) as u32) {
        return Err(VmError::BadMaskPointer);
    }
    let mask = vm.memory.read_bytes(ptr, (w * h) as u32)?.to_vec();
    vm.gfx.blend_masked(x, y, w, h, src_i, dst_x, dst_y, dst_i, &mask)
}

pub fn sys_graphics_invert_colors(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let i = vm.memory.get_sysvar16(sysvar16::DST_SURFACE)? as usize;
    vm.gfx.invert_colors(x, y, w, h, i)
}

pub fn sys_graphics_fill_bg(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let i = vm.memory.get_sysvar16(sysvar16::DST_SURFACE)? as usize;
    vm.gfx.text_fill(x, y, w, h, i);
    Ok(())
}

pub fn sys_graphics_swap_bg_fg(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let i = vm.memory.get_sysvar16(sysvar16::DST_SURFACE)? as usize;
    vm.gfx.text_swap_colors(x, y, w, h, i);
    Ok(())
}

pub fn sys_graphics_copy_progressive(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    vm.copy_progressive(x, y, w, h, src_i, dst_x, dst_y, dst_i)
}

pub fn sys_graphics_pixel_crossfade(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    vm.pixel_crossfade(x, y, w, h, src_i, dst_x, dst_y, dst_i, None)
}

pub fn sys_graphics_pixel_crossfade_masked(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let (x, y, w, h) = rect_params(params, 1)?;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    let mask = vm.memory.get_sysvar16(sysvar16::MASK_COLOR)? as u32;
    vm.pixel_crossfade(x, y, w, h, src_i, dst_x, dst_y, dst_i, Some(mask))
}

/// The classics System.Graphics command dispatcher.
pub fn classics_graphics(vm: &mut Vm, params: &ParamList) -> Result<()> {
    match params.expr(0)? {
        0 => sys_graphics_copy(vm, params),
        1 => sys_graphics_copy_masked(vm, params),
        2 => sys_graphics_fill_bg(vm, params),
        3 => sys_graphics_copy_swap(vm, params),
        4 => sys_graphics_swap_bg_fg(vm, params),
        5 => sys_graphics_compose(vm, params),
        6 => sys_graphics_invert_colors(vm, params),
        8 => sys_graphics_copy_progressive(vm, params),
        9 => sys_graphics_pixel_crossfade(vm, params),
        10 => sys_graphics_pixel_crossfade_masked(vm, params),
        cmd => {
            warn!("System.Graphics.function[{}] not implemented", cmd);
            Ok(())
        }
    }
}

pub fn classics_get_cursor_segment(vm: &mut Vm, params: &ParamList) -> Result<()> {
    sys_get_cursor_segment(vm, params)
}

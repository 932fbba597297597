// Shared Util call implementations. Util numbering is sparse and very
// title-specific; these are the handlers the shipped titles have in
// common. Unlisted slots warn and continue.

use log::warn;

use crate::audio::Channel;
use crate::input::Button;
use crate::memory::sysvar32;
use crate::opcodes::ParamList;
use crate::vm::Vm;
use crate::{Result, VmError};

pub fn util_warn_unimplemented(_vm: &mut Vm, params: &ParamList) -> Result<()> {
    warn!("Util.function[{}] not implemented", params.expr_or(0, 0));
    Ok(())
}

pub fn util_noop(_vm: &mut Vm, _params: &ParamList) -> Result<()> {
    Ok(())
}

pub fn util_get_text_colors(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let (bg, fg) = vm.gfx.text_get_colors();
    vm.memory.set_var32(18, (bg << 4) | fg)
}

pub fn util_blink_fade(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    vm.blink_fade(64, 0, 512, 288, 0)
}

pub fn util_scale_h(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let mag = params.expr(1)? as u16 as i16 as i32;
    let i = vm.gfx.current_surface();
    vm.scale_h(i, mag)
}

pub fn util_invert_colors(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    vm.gfx.invert_colors(x, y, w, h, 0)
}

pub fn util_fade(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x_mult = vm.game.x_mult.max(1) as i32;
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    let dst_i = params.expr(5)? as usize;
    let down = params.expr(6)? == 1;
    let src_i = if params.expr(7)? == 0 { None } else { Some(2) };
    if down {
        vm.fade_down(x * x_mult, y, w * x_mult, h, dst_i, src_i)
    } else {
        vm.fade_right(x * x_mult, y, w * x_mult, h, dst_i, src_i)
    }
}

pub fn util_savedata_stash_name(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    vm.savedata_stash_name();
    Ok(())
}

pub fn util_pixelate(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x_mult = vm.game.x_mult.max(1) as i32;
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    let dst_i = params.expr(5)? as usize;
    let mag = params.expr(6)?;
    vm.pixelate(x * x_mult, y, w * x_mult, h, dst_i, mag)
}

pub fn util_zoom(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    let src_i = params.expr(5)? as usize;
    let dst_i = params.expr(6)? as usize;
    let ms = params.expr_or(7, 500);
    vm.zoom(x, y, w, h, src_i, dst_i, ms)
}

// elapsed play time, as hours/minutes/seconds in var16[7/12/18]
pub fn util_get_time(vm: &mut Vm, params: &ParamList) -> Result<()> {
    if params.expr(1)? == 0 {
        vm.title_scratch[3] = vm.ticks();
        return Ok(());
    }
    let elapsed = vm.ticks().wrapping_sub(vm.title_scratch[3]) / 1000;
    vm.memory.set_var16(7, (elapsed / 3600) as u16)?;
    vm.memory.set_var16(12, ((elapsed % 3600) / 60) as u16)?;
    vm.memory.set_var16(18, (elapsed % 60) as u16)?;
    Ok(())
}

/// Wait for the cursor to rest in place for a given interval; var16[18]
/// reports whether it did.
pub fn util_check_cursor(vm: &mut Vm, params: &ParamList) -> Result<()> {
    if params.expr(1)? == 0 {
        let (x, y) = vm.cursor_get_pos();
        vm.title_scratch[4] = vm.ticks();
        vm.title_scratch[5] = params.expr(2)?;
        vm.title_scratch[6] = x;
        vm.title_scratch[7] = y;
        return Ok(());
    }
    let start_t = vm.title_scratch[4];
    let wait_t = vm.title_scratch[5];
    vm.memory.set_var16(18, 0)?;
    let current_t = vm.ticks();
    if current_t < start_t.wrapping_add(wait_t) {
        return Ok(());
    }
    let (x, y) = vm.cursor_get_pos();
    if x == vm.title_scratch[6] && y == vm.title_scratch[7] {
        return vm.memory.set_var16(18, 1);
    }
    vm.title_scratch[4] = current_t;
    vm.title_scratch[6] = x;
    vm.title_scratch[7] = y;
    Ok(())
}

pub fn util_delay(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let nr_ticks = params.expr(1)?;
    let mut timer = vm.timer_create();
    let target = timer + nr_ticks * 15;
    while timer < target {
        vm.vm_peek()?;
        let step = (target - timer).min(15);
        vm.timer_tick(&mut timer, step)?;
    }
    Ok(())
}

pub fn util_save_animation(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    vm.saved_cg_name = vm.assets.cg_name.clone();
    vm.saved_data_name = vm.assets.data_name.clone();
    Ok(())
}

pub fn util_restore_animation(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let (cg, data) = match (vm.saved_cg_name.clone(), vm.saved_data_name.clone()) {
        (Some(cg), Some(data)) => (cg, data),
        _ => {
            return Err(VmError::User(String::from(
                "no saved animation in Util.restore_animation",
            )))
        }
    };
    vm.load_image(&cg, 1)?;
    let off = vm.memory.get_sysvar32(sysvar32::DATA_OFFSET)?;
    vm.load_data_file(&data, off)?;
    for i in 0..vm.anim.streams.len() as u32 {
        if vm.saved_anim_running.get(i as usize).copied().unwrap_or(false) {
            vm.anim_init_stream(i, i)?;
            vm.anim_start(i)?;
        }
    }
    Ok(())
}

pub fn util_anim_save_running(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let mut running = false;
    vm.saved_anim_running.clear();
    for i in 0..vm.anim.streams.len() as u32 {
        let r = vm.anim_stream_running(i);
        vm.saved_anim_running.push(r);
        running |= r;
    }
    vm.memory.set_var16(18, running as u16)
}

pub fn util_copy_progressive(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let dst_i = params.expr(1)? as usize;
    vm.copy_progressive(64, 0, 512, 288, 2, 64, 0, dst_i)
}

pub fn util_fade_progressive(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let dst_i = params.expr(1)? as usize;
    vm.fade_progressive(64, 0, 512, 288, dst_i)
}

pub fn util_anim_running(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let running = vm.anim_running();
    vm.memory.set_var16(18, running as u16)
}

pub fn util_copy(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let x = params.expr(1)? as i32;
    let y = params.expr(2)? as i32;
    let w = params.expr(3)? as i32 - x + 1;
    let h = params.expr(4)? as i32 - y + 1;
    let src_i = params.expr(5)? as usize;
    let dst_x = params.expr(6)? as i32;
    let dst_y = params.expr(7)? as i32;
    let dst_i = params.expr(8)? as usize;
    vm.gfx.copy(x, y, w, h, src_i, dst_x, dst_y, dst_i);
    Ok(())
}

pub fn util_bgm_play(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let name = params.string(1)?.to_string();
    vm.audio_play(Channel::Bgm, &name, false);
    Ok(())
}

pub fn util_bgm_is_playing(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let playing = vm.audio.is_playing(Channel::Bgm);
    vm.memory.set_var16(18, playing as u16)
}

pub fn util_se_is_playing(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let playing = vm.audio.is_playing(Channel::Se(0));
    vm.memory.set_var16(18, playing as u16)
}

pub fn util_bgm_is_fading(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let fading = vm.audio.is_fading(Channel::Bgm);
    vm.memory.set_var32(13, fading as u32)
}

pub fn util_get_ticks(vm: &mut Vm, _params: &ParamList) -> Result<()> {
    let t = vm.ticks();
    vm.memory.set_var32(16, t)
}

/// Wait until the given tick count, running procedure 110 on ACTIVATE or
/// 111 on CANCEL.
pub fn util_wait_until(vm: &mut Vm, params: &ParamList) -> Result<()> {
    if !vm.procedure_defined(110) || !vm.procedure_defined(111) {
        return Err(VmError::UndefinedProcedure(110));
    }
    let stop_t = params.expr(1)?;
    let mut t = vm.timer_create();
    loop {
        vm.vm_peek()?;
        if vm.input_down(Button::Activate) {
            return vm.call_procedure(110);
        }
        if vm.input_down(Button::Cancel) {
            return vm.call_procedure(111);
        }
        vm.timer_tick(&mut t, 16)?;
        if t >= stop_t {
            return Ok(());
        }
    }
}

pub fn util_wait_until2(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let stop_t = params.expr(1)?;
    let mut t = vm.timer_create();
    while t < stop_t {
        vm.vm_peek()?;
        vm.timer_tick(&mut t, 16)?;
    }
    Ok(())
}

// Title record for YU-NO: 8-bit indexed, X addressed in 8-pixel columns.
// The English-patch variant swaps the column-based text renderer for a
// proportional one driven by a per-glyph advance table.

use crate::game::{Flag, Game, FLAG_ALWAYS_ON};
use crate::memory::sysvar16;
use crate::opcodes::ParamList;
use crate::sys;
use crate::util;
use crate::vm::Vm;
use crate::Result;

const VAR4_SIZE: u32 = 4096;
const MEM16_SIZE: u32 = 8192;

fn mem_init(vm: &mut Vm) {
    sys::shared_mem_init(vm);
}

fn mem_restore(vm: &mut Vm) {
    sys::shared_mem_restore(vm);
}

// animations keep running while an image loads in this title
fn load_image(vm: &mut Vm, params: &ParamList) -> Result<()> {
    let name = params.string(0)?.to_string();
    let surface = vm.memory.get_sysvar16(sysvar16::DST_SURFACE)? as usize;
    vm.load_image(&name, surface)
}

fn set_screen_surface(vm: &mut Vm, params: &ParamList) -> Result<()> {
    vm.gfx.set_screen_surface(params.expr(0)? as usize)
}

fn sys_22(_vm: &mut Vm, _params: &ParamList) -> Result<()> {
    log::warn!("System.function[22] not implemented");
    Ok(())
}

pub fn game(eng: bool) -> Game {
    let mut g = Game::base(if eng { "yuno-eng" } else { "yuno" });
    g.surface_sizes = [
        (640, 400),
        (640, 400),
        (640, 768),
        (640, 768),
        (1696, 720),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
        (0, 0),
    ];
    g.bpp = 8;
    g.x_mult = 8;
    g.use_effect_arc = true;
    g.call_saves_procedures = true;
    g.proc_clears_flag = false;
    g.var4_size = VAR4_SIZE;
    g.mem16_size = MEM16_SIZE;
    g.nr_anim_streams = 10;
    g.mem_init = mem_init;
    g.mem_restore = mem_restore;
    if eng {
        g.custom_text = Some(eng_draw_text);
        g.text_advance = Some(eng_advance);
    }

    g.sys[0] = Some(sys::sys_set_font_size);
    g.sys[1] = Some(sys::sys_display_number);
    g.sys[2] = Some(sys::classics_cursor);
    g.sys[3] = Some(sys::classics_anim);
    g.sys[4] = Some(sys::classics_savedata);
    g.sys[5] = Some(sys::classics_audio);
    g.sys[7] = Some(sys::sys_file);
    g.sys[8] = Some(load_image);
    g.sys[9] = Some(sys::classics_palette);
    g.sys[10] = Some(sys::classics_graphics);
    g.sys[11] = Some(sys::sys_wait);
    g.sys[12] = Some(sys::sys_set_text_colors_indexed);
    g.sys[13] = Some(sys::sys_farcall);
    g.sys[14] = Some(sys::classics_get_cursor_segment);
    g.sys[15] = Some(sys::sys_menu_get_no);
    g.sys[18] = Some(sys::sys_check_input);
    g.sys[21] = Some(sys::sys_strlen);
    g.sys[22] = Some(sys_22);
    g.sys[23] = Some(set_screen_surface);

    g.util[1] = Some(util::util_get_text_colors);
    g.util[3] = Some(util::util_noop);
    g.util[5] = Some(util::util_blink_fade);
    g.util[6] = Some(util::util_scale_h);
    g.util[8] = Some(util::util_invert_colors);
    g.util[10] = Some(util::util_fade);
    g.util[11] = Some(util::util_savedata_stash_name);
    g.util[12] = Some(util::util_pixelate);
    g.util[13] = Some(util::util_zoom);
    g.util[14] = Some(util::util_get_time);
    g.util[15] = Some(util::util_check_cursor);
    g.util[16] = Some(util::util_delay);
    g.util[17] = Some(util::util_save_animation);
    g.util[18] = Some(util::util_restore_animation);
    g.util[19] = Some(util::util_anim_save_running);
    g.util[20] = Some(util::util_copy_progressive);
    g.util[21] = Some(util::util_fade_progressive);
    g.util[22] = Some(util::util_anim_running);
    g.util[26] = Some(util::util_warn_unimplemented);
    g.util[27] = Some(util::util_warn_unimplemented);
    g.util[100] = Some(util::util_warn_unimplemented);
    g.util[101] = Some(util::util_warn_unimplemented);
    g.util[200] = Some(util::util_copy);
    g.util[201] = Some(util::util_bgm_play);
    g.util[202] = Some(util::util_bgm_is_playing);
    g.util[203] = Some(util::util_se_is_playing);
    g.util[210] = Some(util::util_get_ticks);
    g.util[211] = Some(util::util_wait_until);
    g.util[212] = Some(util::util_wait_until2);
    g.util[213] = Some(util::util_warn_unimplemented);
    g.util[214] = Some(util::util_bgm_is_fading);

    g.flags[Flag::Reflector as usize] = 0x0002;
    g.flags[Flag::AnimEnable as usize] = 0x0004;
    g.flags[Flag::MenuReturn as usize] = 0x0008;
    g.flags[Flag::Return as usize] = 0x0010;
    g.flags[Flag::Log as usize] = 0x0080;
    g.flags[Flag::VoiceEnable as usize] = 0x0100;
    g.flags[Flag::AudioEnable as usize] = FLAG_ALWAYS_ON;
    g.flags[Flag::LoadPalette as usize] = 0x2000;
    g.flags[Flag::WaitKeyup as usize] = FLAG_ALWAYS_ON;
    g.flags[Flag::SkipKeyup as usize] = 0x4000;
    g.flags[Flag::PaletteOnly as usize] = 0x8000;
    g
}

// character advances for the proportional English font at size 16
const CHAR_SIZE_P: [u8; 128] = {
    let mut t = [0u8; 128];
    t[b' ' as usize] = 6;
    t[b'!' as usize] = 5;
    t[b'"' as usize] = 9;
    t[b'#' as usize] = 9;
    t[b'$' as usize] = 9;
    t[b'%' as usize] = 9;
    t[b'&' as usize] = 11;
    t[b'\'' as usize] = 4;
    t[b'(' as usize] = 6;
    t[b')' as usize] = 6;
    t[b'*' as usize] = 9;
    t[b'+' as usize] = 9;
    t[b',' as usize] = 4;
    t[b'-' as usize] = 9;
    t[b'.' as usize] = 4;
    t[b'/' as usize] = 9;
    let mut d = b'0';
    while d <= b'9' {
        t[d as usize] = 9;
        d += 1;
    }
    t[b':' as usize] = 4;
    t[b';' as usize] = 4;
    t[b'<' as usize] = 9;
    t[b'=' as usize] = 9;
    t[b'>' as usize] = 9;
    t[b'?' as usize] = 8;
    t[b'@' as usize] = 12;
    t[b'A' as usize] = 11;
    t[b'B' as usize] = 11;
    t[b'C' as usize] = 12;
    t[b'D' as usize] = 11;
    t[b'E' as usize] = 10;
    t[b'F' as usize] = 10;
    t[b'G' as usize] = 12;
    t[b'H' as usize] = 11;
    t[b'I' as usize] = 5;
    t[b'J' as usize] = 10;
    t[b'K' as usize] = 11;
    t[b'L' as usize] = 10;
    t[b'M' as usize] = 13;
    t[b'N' as usize] = 11;
    t[b'O' as usize] = 12;
    t[b'P' as usize] = 11;
    t[b'Q' as usize] = 12;
    t[b'R' as usize] = 11;
    t[b'S' as usize] = 11;
    t[b'T' as usize] = 10;
    t[b'U' as usize] = 11;
    t[b'V' as usize] = 11;
    t[b'W' as usize] = 13;
    t[b'X' as usize] = 11;
    t[b'Y' as usize] = 10;
    t[b'Z' as usize] = 10;
    t[b'[' as usize] = 6;
    t[b'\\' as usize] = 9;
    t[b']' as usize] = 6;
    t[b'^' as usize] = 8;
    t[b'_' as usize] = 6;
    t[b'`' as usize] = 8;
    t[b'a' as usize] = 9;
    t[b'b' as usize] = 9;
    t[b'c' as usize] = 9;
    t[b'd' as usize] = 9;
    t[b'e' as usize] = 9;
    t[b'f' as usize] = 6;
    t[b'g' as usize] = 8;
    t[b'h' as usize] = 9;
    t[b'i' as usize] = 4;
    t[b'j' as usize] = 5;
    t[b'k' as usize] = 8;
    t[b'l' as usize] = 4;
    t[b'm' as usize] = 13;
    t[b'n' as usize] = 9;
    t[b'o' as usize] = 9;
    t[b'p' as usize] = 9;
    t[b'q' as usize] = 9;
    t[b'r' as usize] = 7;
    t[b's' as usize] = 8;
    t[b't' as usize] = 7;
    t[b'u' as usize] = 9;
    t[b'v' as usize] = 9;
    t[b'w' as usize] = 11;
    t[b'x' as usize] = 8;
    t[b'y' as usize] = 9;
    t[b'z' as usize] = 8;
    t[b'{' as usize] = 5;
    t[b'|' as usize] = 5;
    t[b'}' as usize] = 5;
    t[b'~' as usize] = 8;
    t
};

fn eng_advance(vm: &Vm, ch: char) -> Option<u32> {
    if vm.gfx.text.size != 16 {
        return None;
    }
    let c = ch as u32;
    if c < 128 && CHAR_SIZE_P[c as usize] != 0 {
        return Some(CHAR_SIZE_P[c as usize] as u32);
    }
    // full-width ':' and full-width space
    if c == 0xff1a {
        return Some(9);
    }
    if c == 0x3000 {
        return Some(12);
    }
    None
}

// The column-based cursor only stores x as a multiple of 8, but the
// proportional renderer continues from the precise pixel position when
// drawing runs back to back. Hence the scratch slots.
fn eng_draw_text(vm: &mut Vm, text: &str) -> Result<()> {
    let x_col = vm.memory.get_sysvar16(sysvar16::TEXT_CURSOR_X)?;
    let y = vm.memory.get_sysvar16(sysvar16::TEXT_CURSOR_Y)?;
    let mut x = if x_col as u32 == vm.title_scratch[1] && y as u32 == vm.title_scratch[2] {
        vm.title_scratch[0]
    } else {
        x_col as u32 * vm.game.x_mult as u32
    };
    let surface = vm.memory.get_sysvar16(sysvar16::DST_SURFACE)? as usize;
    for ch in text.chars() {
        vm.text_draw_glyph(x as i32, y as i32, surface, ch)?;
        x += vm.glyph_advance(ch);
    }
    let x_col = (x + 7) / 8;
    vm.title_scratch[0] = x;
    vm.title_scratch[1] = x_col;
    vm.title_scratch[2] = y as u32;
    vm.memory.set_sysvar16(sysvar16::TEXT_CURSOR_X, x_col as u16)?;
    vm.memory.set_sysvar16(sysvar16::TEXT_CURSOR_Y, y)?;
    Ok(())
}

// The per-title record. It plays the role of a vtable: two dense dispatch
// vectors for System and Util calls, the per-title opcode tables, the
// behavioural switches, and the mapping from logical flags to the title's
// actual bit masks. The active title is selected once at startup.

use crate::anim::DrawCall;
use crate::opcodes::{ExprOp, ParamList, StmtOp};
use crate::vm::Vm;
use crate::Result;

pub const MAX_SYS: usize = 256;
pub const MAX_UTIL: usize = 601;

pub type SysFn = fn(&mut Vm, &ParamList) -> Result<()>;
pub type HookFn = fn(&mut Vm) -> Result<()>;
pub type MemHookFn = fn(&mut Vm);
pub type TextHookFn = fn(&mut Vm, &str) -> Result<()>;
pub type AnimDrawHookFn = fn(&mut Vm, &DrawCall) -> Result<()>;
pub type TextAdvanceFn = fn(&Vm, char) -> Option<u32>;

/// Logical flag names; the per-title `flags` array maps each to a bit
/// mask in sysvar16[flags] (0 = absent, 0xffff = always on).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flag {
    Reflector,
    AnimEnable,
    MenuReturn,
    Return,
    ProcClear,
    LogEnable,
    LogText,
    Log,
    LogSys,
    LoadPalette,
    VoiceEnable,
    AudioEnable,
    Strlen,
    WaitKeyup,
    SkipKeyup,
    PaletteOnly,
}

pub const NR_FLAGS: usize = Flag::PaletteOnly as usize + 1;
pub const FLAG_ALWAYS_ON: u16 = 0xffff;

pub struct Game {
    pub id: &'static str,
    pub surface_sizes: [(u16, u16); crate::gfx::NR_SURFACES],
    pub bpp: u32,
    pub x_mult: u16,
    pub use_effect_arc: bool,
    pub call_saves_procedures: bool,
    pub proc_clears_flag: bool,
    pub no_antialias_text: bool,
    pub farcall_strlen_retvar: u32,
    pub var4_size: u32,
    pub mem16_size: u32,
    pub anim_frame_time: u32,
    pub nr_anim_streams: usize,
    pub expr_op: [Option<ExprOp>; 256],
    pub stmt_op: [Option<StmtOp>; 256],
    pub init: Option<HookFn>,
    pub update: Option<HookFn>,
    /// Runs whenever the pump drained at least one discrete input event.
    pub handle_event: Option<HookFn>,
    pub mem_init: MemHookFn,
    pub mem_restore: MemHookFn,
    pub custom_text: Option<TextHookFn>,
    pub after_anim_draw: Option<AnimDrawHookFn>,
    /// Per-glyph advance override (the YU-NO English patch).
    pub text_advance: Option<TextAdvanceFn>,
    pub sys: [Option<SysFn>; MAX_SYS],
    pub util: [Option<SysFn>; MAX_UTIL],
    pub flags: [u16; NR_FLAGS],
}

fn default_mem_init(vm: &mut Vm) {
    crate::sys::shared_mem_init(vm);
}

fn default_mem_restore(vm: &mut Vm) {
    crate::sys::shared_mem_restore(vm);
}

impl Game {
    /// A record with everything defaulted; title constructors fill in the
    /// parts they override.
    pub fn base(id: &'static str) -> Game {
        Game {
            id,
            surface_sizes: [(640, 400); crate::gfx::NR_SURFACES],
            bpp: 8,
            x_mult: 1,
            use_effect_arc: false,
            call_saves_procedures: false,
            proc_clears_flag: false,
            no_antialias_text: false,
            farcall_strlen_retvar: 18,
            var4_size: 4096,
            mem16_size: 8192,
            anim_frame_time: 16,
            nr_anim_streams: 10,
            expr_op: crate::opcodes::default_expr_table(),
            stmt_op: crate::opcodes::default_stmt_table(),
            init: None,
            update: None,
            handle_event: None,
            mem_init: default_mem_init,
            mem_restore: default_mem_restore,
            custom_text: None,
            after_anim_draw: None,
            text_advance: None,
            sys: [None; MAX_SYS],
            util: [None; MAX_UTIL],
            flags: [0; NR_FLAGS],
        }
    }

    pub fn flag_mask(&self, flag: Flag) -> u16 {
        self.flags[flag as usize]
    }
}

/// Title registry for the command line.
pub const GAME_IDS: [(&str, &str); 3] = [
    ("yuno", "Kono Yo no Hate de Koi wo Utau Shoujo YU-NO"),
    ("yuno-eng", "English translation of YU-NO"),
    ("isaku", "Isaku Renewal"),
];

pub fn lookup(id: &str) -> Option<Game> {
    match id {
        "yuno" => Some(crate::yuno::game(false)),
        "yuno-eng" => Some(crate::yuno::game(true)),
        "isaku" => Some(crate::isaku::game()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_ids_resolve() {
        for (id, _) in GAME_IDS.iter() {
            assert!(lookup(id).is_some(), "no game record for {}", id);
        }
        assert!(lookup("nonsense").is_none());
    }

    #[test]
    fn flag_masks_default_to_absent() {
        let game = Game::base("test");
        assert_eq!(game.flag_mask(Flag::Strlen), 0);
    }
}

// End-to-end interpreter scenarios on a headless runtime: bytecode is
// written straight into the file_data region and executed, with MES and
// save files staged in a temporary directory where needed.

use ai5vm::asset::AssetType;
use ai5vm::game::Flag;
use ai5vm::memory::{sysvar16, sysvar32};
use ai5vm::vm::VmPointer;
use ai5vm::{yuno, Vm};

fn headless_yuno() -> Vm {
    Vm::new_headless(yuno::game(false))
}

fn write_code(vm: &mut Vm, offset: u32, code: &[u8]) {
    let base = vm.memory.file_data_off();
    vm.memory.write_bytes(base + offset, code).unwrap();
    vm.ip = VmPointer { ptr: offset, base };
}

// opcode bytes from the default tables
const OP_END: u8 = 0x00;
const OP_SETV: u8 = 0x04;
const OP_JZ: u8 = 0x0b;
const OP_SYS: u8 = 0x0d;
const OP_CALL: u8 = 0x0f;
const OP_MENUI: u8 = 0x10;
const OP_PROCD: u8 = 0x14;
const EXPR_PLUS: u8 = 0x83;
const EXPR_END: u8 = 0xff;
const PARAM_EXPR: u8 = 0x02;
const PARAM_STR: u8 = 0x03;

#[test]
fn eval_push_pop_arithmetic() {
    let mut vm = headless_yuno();
    write_code(&mut vm, 0, &[0x03, 0x04, EXPR_PLUS, EXPR_END]);
    assert_eq!(vm.eval().unwrap(), 7);
}

#[test]
fn eval_immediates_and_comparison() {
    let mut vm = headless_yuno();
    // 1000 < 70000 (32-bit immediate)
    write_code(
        &mut vm,
        0,
        &[0x94, 0xe8, 0x03, 0x95, 0x70, 0x11, 0x01, 0x00, 0x8e, EXPR_END],
    );
    assert_eq!(vm.eval().unwrap(), 1);
}

#[test]
fn jz_jumps_on_zero_and_falls_through_on_one() {
    let mut vm = headless_yuno();
    write_code(&mut vm, 0, &[OP_JZ, 0x00, EXPR_END, 0x00, 0x01, 0x00, 0x00]);
    assert!(vm.exec_statement().unwrap());
    assert_eq!(vm.ip.ptr, 0x100);

    let mut vm = headless_yuno();
    write_code(&mut vm, 0, &[OP_JZ, 0x01, EXPR_END, 0x00, 0x01, 0x00, 0x00]);
    assert!(vm.exec_statement().unwrap());
    assert_eq!(vm.ip.ptr, 7);
}

#[test]
fn setv_assigns_consecutive_vars() {
    let mut vm = headless_yuno();
    // var16[3] = 5, var16[4] = 6
    write_code(&mut vm, 0, &[OP_SETV, 0x03, 0x05, EXPR_END, 0x01, 0x06, EXPR_END, 0x00]);
    assert!(vm.exec_statement().unwrap());
    assert_eq!(vm.memory.get_var16(3).unwrap(), 5);
    assert_eq!(vm.memory.get_var16(4).unwrap(), 6);
}

#[test]
fn var4_set_does_not_disturb_sibling() {
    let mut vm = headless_yuno();
    for i in 0..32 {
        vm.memory.set_var4(i, (i % 16) as u8).unwrap();
    }
    vm.memory.set_var4(7, 0xe).unwrap();
    assert_eq!(vm.memory.get_var4(6).unwrap(), 6);
    assert_eq!(vm.memory.get_var4(7).unwrap(), 0xe);
    assert_eq!(vm.memory.get_var4(8).unwrap(), 8);
}

#[test]
fn var32_round_trip_above_2_31() {
    let mut vm = headless_yuno();
    vm.memory.set_var32(9, 0xfedc_ba98).unwrap();
    assert_eq!(vm.memory.get_var32(9).unwrap(), 0xfedc_ba98);
}

#[test]
fn procd_records_body_and_skips_it() {
    let mut vm = headless_yuno();
    // PROCD 5 with a one-byte body (END) at offset 7, jumping to 8
    write_code(
        &mut vm,
        0,
        &[OP_PROCD, 0x05, EXPR_END, 0x08, 0x00, 0x00, 0x00, OP_END, OP_END],
    );
    assert!(vm.exec_statement().unwrap());
    assert_eq!(vm.ip.ptr, 8);
    assert!(vm.procedure_defined(5));
    vm.call_procedure(5).unwrap();
}

#[test]
fn call_returns_to_caller_with_procedures_intact() {
    let dir = tempfile::tempdir().unwrap();

    // A: PROCD 5 (empty body), CALL "B.MES", var16[0] = 42, END
    let mut a = vec![OP_PROCD, 0x05, EXPR_END, 0x08, 0x00, 0x00, 0x00, OP_END];
    a.extend_from_slice(&[OP_CALL, PARAM_STR]);
    a.extend_from_slice(b"B.MES\0");
    a.push(0x00);
    a.extend_from_slice(&[OP_SETV, 0x00, 0x2a, EXPR_END, 0x00]);
    a.push(OP_END);
    std::fs::write(dir.path().join("A.MES"), &a).unwrap();
    std::fs::write(dir.path().join("B.MES"), &[OP_END]).unwrap();

    let mut vm = headless_yuno();
    vm.assets.set_dir(AssetType::Mes, dir.path().to_path_buf());
    vm.load_mes("A.MES").unwrap();
    vm.ip = VmPointer { ptr: 0, base: vm.memory.file_data_off() };
    vm.exec().unwrap();

    assert_eq!(vm.memory.get_var16(0).unwrap(), 42);
    assert!(vm.procedure_defined(5));
    assert_eq!(vm.memory.mes_name(), "A.MES");
}

#[test]
fn absent_sys_slot_warns_and_continues() {
    let mut vm = headless_yuno();
    // System.function[40] is unmapped; execution must continue
    let mut code = vec![OP_SYS, 0x28, EXPR_END, 0x00];
    code.extend_from_slice(&[OP_SETV, 0x01, 0x09, EXPR_END, 0x00]);
    code.push(OP_END);
    write_code(&mut vm, 0, &code);
    vm.exec().unwrap();
    assert_eq!(vm.memory.get_var16(1).unwrap(), 9);
}

#[test]
fn menui_records_entry_and_skips_body() {
    let mut vm = headless_yuno();
    // MENUI 7 with a body from offset 9 to 13
    let code = [
        OP_MENUI, PARAM_EXPR, 0x07, EXPR_END, 0x00, 0x0d, 0x00, 0x00, 0x00, OP_END, 0x00, 0x00,
        0x00, OP_END,
    ];
    write_code(&mut vm, 0, &code);
    assert!(vm.exec_statement().unwrap());
    assert_eq!(vm.ip.ptr, 0x0d);
    assert_eq!(vm.menu.nr_entries, 1);
    let addr = vm.memory.read_u32(vm.memory.menu_entry_addr_off()).unwrap();
    let num = vm.memory.read_u32(vm.memory.menu_entry_num_off()).unwrap();
    assert_eq!(addr, 9);
    assert_eq!(num, 7);
    vm.menu_get_no(7).unwrap();
    assert_eq!(vm.memory.get_var16(18).unwrap(), 0);
}

#[test]
fn copy_masked_with_full_mask_is_a_noop() {
    let mut vm = headless_yuno();
    vm.gfx.fill(0, 0, 640, 400, 0, 5);
    vm.gfx.fill(0, 0, 640, 400, 1, 0);
    let before = vm.gfx.surfaces[1].pixels.clone();
    vm.gfx.copy_masked(0, 0, 640, 400, 0, 0, 0, 1, 5);
    assert_eq!(vm.gfx.surfaces[1].pixels, before);
}

#[test]
fn copy_swap_twice_is_identity_across_surfaces() {
    let mut vm = headless_yuno();
    vm.gfx.fill(0, 0, 640, 400, 0, 3);
    vm.gfx.fill(0, 0, 640, 400, 1, 12);
    let a = vm.gfx.surfaces[0].pixels.clone();
    let b = vm.gfx.surfaces[1].pixels.clone();
    vm.gfx.copy_swap(10, 10, 100, 100, 0, 10, 10, 1);
    vm.gfx.copy_swap(10, 10, 100, 100, 0, 10, 10, 1);
    assert_eq!(vm.gfx.surfaces[0].pixels, a);
    assert_eq!(vm.gfx.surfaces[1].pixels, b);
}

#[test]
fn palette_set_get_round_trip() {
    let mut vm = headless_yuno();
    let mut pal = vec![0u8; 0x400];
    for i in 0..256 {
        pal[i * 4] = (i * 3) as u8;
        pal[i * 4 + 1] = (i * 5) as u8;
        pal[i * 4 + 2] = (i * 7) as u8;
    }
    vm.gfx.palette_set(&pal);
    assert_eq!(vm.gfx.palette_get(), pal);
}

#[test]
fn anim_stall_then_halt_within_three_ticks() {
    let mut vm = headless_yuno();
    let data_off = 0x1000;
    vm.memory.set_sysvar32(sysvar32::DATA_OFFSET, data_off).unwrap();
    // one stream whose bytecode is STALL 2, HALT
    let s4 = [0x01, 0x03, 0x00, 0x02, 0x02, 0x04];
    let base = vm.memory.file_data_off();
    vm.memory.write_bytes(base + data_off, &s4).unwrap();

    vm.anim_init_stream(0, 0).unwrap();
    vm.anim_start(0).unwrap();
    assert!(vm.anim_stream_running(0));
    vm.anim_tick().unwrap();
    assert!(vm.anim_stream_running(0));
    vm.anim_tick().unwrap();
    vm.anim_tick().unwrap();
    assert!(!vm.anim_stream_running(0));
    // and waiting on a halted stream returns immediately
    vm.anim_wait(0).unwrap();
}

#[test]
fn anim_loop_repeats_draw_section() {
    let mut vm = headless_yuno();
    let data_off = 0x2000;
    vm.memory.set_sysvar32(sysvar32::DATA_OFFSET, data_off).unwrap();
    // LOOP_START 3, NOOP, LOOP_END, HALT
    let s4 = [0x01, 0x03, 0x00, 0x05, 0x03, 0x00, 0x06, 0x04];
    let base = vm.memory.file_data_off();
    vm.memory.write_bytes(base + data_off, &s4).unwrap();
    vm.anim_init_stream(0, 0).unwrap();
    vm.anim_start(0).unwrap();
    for _ in 0..16 {
        if !vm.anim_stream_running(0) {
            break;
        }
        vm.anim_tick().unwrap();
    }
    assert!(!vm.anim_stream_running(0));
}

#[test]
fn save_resume_round_trip_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("START.MES"), &[OP_END]).unwrap();

    let mut vm = headless_yuno();
    vm.config.save_dir = dir.path().to_path_buf();
    vm.assets.set_dir(AssetType::Mes, dir.path().to_path_buf());
    vm.load_mes("START.MES").unwrap();

    for i in 0..100 {
        vm.memory.set_var4(i, (i % 16) as u8).unwrap();
    }
    vm.memory.set_var16(3, 1234).unwrap();
    vm.memory.set_var32(7, 0xcafe_babe).unwrap();
    vm.savedata_resume_save("FLAG07");

    let snapshot = vm.memory.read_bytes(0, vm.memory.mem16_size()).unwrap().to_vec();

    // scramble live state
    for i in 0..100 {
        vm.memory.set_var4(i, 0xf).unwrap();
    }
    vm.memory.set_var16(3, 0).unwrap();
    vm.memory.set_var32(7, 0).unwrap();
    vm.memory.set_mes_name("OTHER.MES");

    vm.savedata_resume_load("FLAG07").unwrap();
    assert!(vm.flag_is_on(Flag::Return));
    // the resume itself raises the RETURN bit; clear it to compare the
    // restored image against the pre-scramble snapshot
    vm.flag_off(Flag::Return);
    let restored = vm.memory.read_bytes(0, vm.memory.mem16_size()).unwrap().to_vec();
    assert_eq!(restored, snapshot);
    assert_eq!(vm.memory.mes_name(), "START.MES");
}

#[test]
fn savedata_copy_duplicates_save(){
    let dir = tempfile::tempdir().unwrap();
    let mut vm = headless_yuno();
    vm.config.save_dir = dir.path().to_path_buf();
    vm.memory.set_var16(5, 777).unwrap();
    vm.savedata_resume_save("FLAG01");
    vm.savedata_copy("FLAG01", "FLAG02");
    let a = std::fs::read(dir.path().join("FLAG01")).unwrap();
    let b = std::fs::read(dir.path().join("FLAG02")).unwrap();
    assert_eq!(a, b);
}

#[test]
fn load_mes_reload_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let x: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
    let y = vec![0xaa; 300];
    std::fs::write(dir.path().join("X.MES"), &x).unwrap();
    std::fs::write(dir.path().join("Y.MES"), &y).unwrap();

    let mut vm = headless_yuno();
    vm.assets.set_dir(AssetType::Mes, dir.path().to_path_buf());
    let base = vm.memory.file_data_off();

    vm.load_mes("X.MES").unwrap();
    let first = vm.memory.read_bytes(base, x.len() as u32).unwrap().to_vec();
    vm.load_mes("Y.MES").unwrap();
    vm.load_mes("X.MES").unwrap();
    let second = vm.memory.read_bytes(base, x.len() as u32).unwrap().to_vec();
    assert_eq!(first, second);
}

#[test]
fn unprefixed_text_is_skipped_with_warning() {
    let mut vm = headless_yuno();
    // an unmapped statement byte in the half-width range falls back to
    // STR handling and execution continues
    let code = [0x41, 0x42, 0x00, OP_SETV, 0x02, 0x07, EXPR_END, 0x00, OP_END];
    write_code(&mut vm, 0, &code);
    vm.exec().unwrap();
    assert_eq!(vm.memory.get_var16(2).unwrap(), 7);
}

#[test]
fn strlen_counts_text_instead_of_drawing() {
    let mut vm = headless_yuno();
    // yuno has no STRLEN flag mapped, so force one for the test
    vm.game.flags[Flag::Strlen as usize] = 0x0001;
    let flags = vm.memory.get_sysvar16(sysvar16::FLAGS).unwrap();
    vm.memory.set_sysvar16(sysvar16::FLAGS, flags | 1).unwrap();
    vm.memory.set_var32(18, 0).unwrap();
    vm.draw_text("abc").unwrap();
    assert_eq!(vm.memory.get_var32(18).unwrap(), 3);
}

#[test]
fn farcall_executes_and_returns() {
    let mut vm = headless_yuno();
    // farcall target sets var16[6] = 3 then ends
    let target = vm.memory.file_data_off() + 0x400;
    vm.memory
        .write_bytes(target, &[OP_SETV, 0x06, 0x03, EXPR_END, 0x00, OP_END])
        .unwrap();
    let saved_ip = vm.ip;
    vm.farcall(target).unwrap();
    assert_eq!(vm.memory.get_var16(6).unwrap(), 3);
    assert_eq!(vm.ip, saved_ip);
}

#[test]
fn farcall_out_of_bounds_is_fatal() {
    let mut vm = headless_yuno();
    assert!(vm.farcall(vm.memory.size() + 10).is_err());
}

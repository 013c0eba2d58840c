use super::program_rom;

use crate::cpu::{instructions, CpuRegisters, ExecutionMode};
use crate::memory::{AddressSpace, Cartridge};
use crate::ppu::{PpuMode, PpuState};

// Runs the program and returns the cycle cost of each executed instruction.
// Conditional control flow costs are evaluated against the pre-execution
// flags, exactly as the step loop does it.
fn collect_cycles(program_hex: &str) -> Vec<u32> {
    let rom = program_rom(program_hex);
    let rom_len = rom.len() as u16;

    let mut address_space = AddressSpace::new(
        Cartridge::new(rom, None).expect("synthesized test ROM should be valid"),
        ExecutionMode::GameBoy,
    );
    let mut ppu_state = PpuState::new(ExecutionMode::GameBoy);
    ppu_state.set_mode_for_test(PpuMode::VBlank);
    let mut cpu_registers = CpuRegisters::new(ExecutionMode::GameBoy);

    // Skip the NOP and the JP to the program start
    let mut cycles = Vec::new();
    let mut executed_prelude = 0;
    while cpu_registers.pc < rom_len {
        let (instruction, pc) =
            instructions::parse_next_instruction(&address_space, cpu_registers.pc, &ppu_state)
                .expect("all instructions in program should be valid");
        cpu_registers.pc = pc;

        let instruction_cycles = instruction.cycles_required(&cpu_registers);
        instruction.execute(&mut address_space, &mut cpu_registers, &ppu_state);

        if executed_prelude < 2 {
            executed_prelude += 1;
        } else {
            cycles.push(instruction_cycles);
        }
    }

    cycles
}

#[test]
fn loads() {
    // LD B, C; LD B, (HL); LD (HL), 0x00; LD A, (0xC000)
    assert_eq!(vec![4, 8, 12, 16], collect_cycles("41463600FA00C0"));

    // LDH (0x80), A; LDH A, (0x80); LD (C), A
    assert_eq!(vec![12, 12, 8], collect_cycles("E080F080E2"));

    // LD BC, 0x0000; LD (0xC000), SP; LD SP, HL; LD HL, SP+1
    assert_eq!(vec![12, 20, 8, 12], collect_cycles("0100000800C0F9F801"));
}

#[test]
fn arithmetic() {
    // ADD B; ADD 0x01; ADD (HL) with HL pointed at working RAM
    assert_eq!(vec![12, 4, 8, 8], collect_cycles("2100C080C60186"));

    // INC B; DEC B; INC (HL); ADD HL, BC; INC BC; ADD SP, 1
    assert_eq!(vec![12, 4, 4, 12, 8, 8, 16], collect_cycles("2100C00405340903E801"));
}

#[test]
fn stack_ops() {
    // PUSH BC; POP BC
    assert_eq!(vec![16, 12], collect_cycles("C5C1"));
}

#[test]
fn cb_prefixed() {
    // RLC B; RLC (HL); BIT 0, B; BIT 0, (HL); SET 0, B; SET 0, (HL)
    assert_eq!(
        vec![12, 8, 16, 8, 12, 8, 16],
        collect_cycles("2100C0CB00CB06CB40CB46CBC0CBC6")
    );
}

#[test]
fn unconditional_control_flow() {
    // JP 0x0153; LD HL, 0x0157; JP (HL)
    assert_eq!(vec![16, 12, 4], collect_cycles("C35301215701E9"));
}

#[test]
fn conditional_jumps_cost_depends_on_branch() {
    // XOR A; JR Z, +0 (taken)
    assert_eq!(vec![4, 12], collect_cycles("AF2800"));

    // XOR A; JR NZ, +0 (not taken)
    assert_eq!(vec![4, 8], collect_cycles("AF2000"));

    // XOR A; JP Z, 0x0154 (taken)
    assert_eq!(vec![4, 16], collect_cycles("AFCA5401"));

    // XOR A; JP NZ, 0x0154 (not taken)
    assert_eq!(vec![4, 12], collect_cycles("AFC25401"));
}

#[test]
fn conditional_calls_and_returns_cost_depends_on_branch() {
    // XOR A; CALL Z, 0x0154 (taken, target is the end of the program)
    assert_eq!(vec![4, 24], collect_cycles("AFCC5401"));

    // XOR A; CALL NZ, 0x0154 (not taken)
    assert_eq!(vec![4, 12], collect_cycles("AFC45401"));

    // LD BC, 0x0156; PUSH BC; XOR A; RET Z (taken, returns to the end)
    assert_eq!(vec![12, 16, 4, 20], collect_cycles("015601C5AFC8"));

    // XOR A; RET C (not taken)
    assert_eq!(vec![4, 8], collect_cycles("AFD8"));
}

#[test]
fn call_and_return() {
    // CALL 0x0156; JP 0x0157; <subroutine>: RET
    assert_eq!(vec![24, 16, 16], collect_cycles("CD5601C35701C9"));
}

#[test]
fn misc() {
    // NOP; DAA; CPL; SCF; CCF; DI; EI
    assert_eq!(vec![4, 4, 4, 4, 4, 4, 4], collect_cycles("00272F373FF3FB"));

    // RLCA; RLA; RRCA; RRA
    assert_eq!(vec![4, 4, 4, 4], collect_cycles("07170F1F"));
}

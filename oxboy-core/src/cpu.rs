pub(crate) mod instructions;
mod registers;

#[cfg(test)]
mod tests;

use crate::memory::ioregisters::IoRegister;
use crate::memory::AddressSpace;
use crate::ppu::PpuState;

pub use instructions::ParseError;
pub use registers::{CpuRegister, CpuRegisterPair, CpuRegisters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    GameBoy,
    GameBoyColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptType {
    VBlank,
    LcdStatus,
    Timer,
    Serial,
    Joypad,
}

impl InterruptType {
    /// Bit index of this interrupt in the IF and IE registers. Dispatch
    /// priority is lowest bit first.
    pub fn bit(self) -> u8 {
        match self {
            Self::VBlank => 0,
            Self::LcdStatus => 1,
            Self::Timer => 2,
            Self::Serial => 3,
            Self::Joypad => 4,
        }
    }

    pub fn handler_address(self) -> u16 {
        match self {
            Self::VBlank => 0x0040,
            Self::LcdStatus => 0x0048,
            Self::Timer => 0x0050,
            Self::Serial => 0x0058,
            Self::Joypad => 0x0060,
        }
    }

    fn from_pending_mask(pending: u8) -> Option<Self> {
        [Self::VBlank, Self::LcdStatus, Self::Timer, Self::Serial, Self::Joypad]
            .into_iter()
            .find(|interrupt_type| pending & (1 << interrupt_type.bit()) != 0)
    }
}

// A halted CPU burns NOPs while waiting for an interrupt
const HALT_WAIT_CYCLES: u32 = 4;

/// Fetch, decode, and execute one instruction at PC, returning the number of
/// dot-clock cycles consumed. While halted the CPU consumes the NOP cost and
/// executes nothing.
///
/// # Errors
///
/// Returns an error if the byte at PC is not a valid opcode.
pub fn step(
    address_space: &mut AddressSpace,
    cpu_registers: &mut CpuRegisters,
    ppu_state: &PpuState,
) -> Result<u32, ParseError> {
    if cpu_registers.halted {
        return Ok(HALT_WAIT_CYCLES);
    }

    let (instruction, pc) =
        instructions::parse_next_instruction(address_space, cpu_registers.pc, ppu_state)?;

    log::trace!("Updating PC from {:04X} to {pc:04X}", cpu_registers.pc);
    cpu_registers.pc = pc;

    // Conditional control flow costs depend on the pre-execution flags
    let cycles_required = instruction.cycles_required(cpu_registers);

    log::trace!("Executing instruction {instruction:02X?}, will take {cycles_required} cycles");
    instruction.execute(address_space, cpu_registers, ppu_state);

    Ok(cycles_required)
}

/// Dispatch the highest-priority pending interrupt, if any. Runs at the end
/// of every machine step; also promotes the one-shot EI latch into IME.
///
/// Returns the number of extra cycles to charge the step, which is always 0:
/// the dispatch overhead is folded into the surrounding instruction costs.
pub fn service_interrupts(
    cpu_registers: &mut CpuRegisters,
    address_space: &mut AddressSpace,
    ppu_state: &PpuState,
) -> u32 {
    let interrupt_flags = address_space.get_io_registers().read_register(IoRegister::IF);
    let pending = interrupt_flags & address_space.get_ie_register() & 0x1F;

    if cpu_registers.ime {
        if let Some(interrupt_type) = InterruptType::from_pending_mask(pending) {
            log::trace!(
                "Dispatching {interrupt_type:?} interrupt, pushing PC {:04X}",
                cpu_registers.pc
            );

            cpu_registers.halted = false;
            // Prevent cascading interrupts until the handler runs RETI/EI
            cpu_registers.ime = false;
            address_space.get_io_registers_mut().interrupt_flags().clear(interrupt_type);

            cpu_registers.sp = cpu_registers.sp.wrapping_sub(2);
            address_space.write_address_u16(cpu_registers.sp, cpu_registers.pc, ppu_state);
            cpu_registers.pc = interrupt_type.handler_address();
        }
    } else if cpu_registers.halted && pending != 0 {
        // With IME clear a pending enabled interrupt still ends HALT;
        // execution resumes at the instruction after it
        cpu_registers.halted = false;
    }

    // EI enables interrupts one instruction late: the latch set while
    // executing EI is promoted here, after the dispatch check for this step
    if cpu_registers.ei_pending {
        cpu_registers.ime = true;
        cpu_registers.ei_pending = false;
    }

    0
}

use crate::apu::ApuState;
use crate::cpu::{self, CpuRegisters, ExecutionMode, ParseError};
use crate::joypad::{self, JoypadState};
use crate::memory::{AddressSpace, Cartridge, CartridgeLoadError};
use crate::ppu::{self, FrameBuffer, PpuState};
use crate::timer::{self, TimerCounter};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("error decoding instruction: {source}")]
    InstructionDecode {
        #[from]
        source: ParseError,
    },
}

/// The assembled machine: CPU, address space, PPU, timer, joypad, and the
/// audio clock, advanced one instruction at a time.
pub struct GameBoy {
    address_space: AddressSpace,
    cpu_registers: CpuRegisters,
    ppu_state: PpuState,
    apu_state: ApuState,
    timer_counter: TimerCounter,
    joypad_state: JoypadState,
}

impl GameBoy {
    /// Build a machine around the given ROM image. The execution mode is
    /// detected from the cartridge header's CGB flag unless `force_dmg` is
    /// set. If `sav_path` is provided, battery-backed cartridge RAM is loaded
    /// from and persisted to that file.
    ///
    /// # Errors
    ///
    /// Returns an error if the cartridge header is invalid or names an
    /// unsupported mapper.
    pub fn new(
        rom: Vec<u8>,
        sav_path: Option<PathBuf>,
        force_dmg: bool,
    ) -> Result<Self, CartridgeLoadError> {
        let cartridge = Cartridge::new(rom, sav_path)?;

        let execution_mode = if !force_dmg && cartridge.supports_cgb_mode() {
            ExecutionMode::GameBoyColor
        } else {
            ExecutionMode::GameBoy
        };
        log::info!("Running in {execution_mode:?} mode");

        Ok(Self {
            address_space: AddressSpace::new(cartridge, execution_mode),
            cpu_registers: CpuRegisters::new(execution_mode),
            ppu_state: PpuState::new(execution_mode),
            apu_state: ApuState::new(),
            timer_counter: TimerCounter::new(),
            joypad_state: JoypadState::new(),
        })
    }

    /// Install a 256-byte boot ROM and reset the CPU to execute it from
    /// address 0x0000. The blob shadows 0x0000-0x00FF until the guest writes
    /// a non-zero value to 0xFF50.
    pub fn with_boot_rom(mut self, boot_rom: [u8; 256]) -> Self {
        self.address_space.set_boot_rom(boot_rom);
        self.cpu_registers.pc = 0x0000;
        self
    }

    /// Execute one instruction and advance every peripheral by the cycles it
    /// consumed, then dispatch pending interrupts. Returns the total number
    /// of dot-clock cycles the step took.
    ///
    /// # Errors
    ///
    /// Returns an error if the CPU hits an invalid opcode.
    pub fn step(&mut self) -> Result<u32, StepError> {
        joypad::update_joyp_register(&self.joypad_state, self.address_space.get_io_registers_mut());

        // Snapshot TMA so that a same-step write does not feed a same-step
        // reload
        let timer_modulo = timer::read_timer_modulo(self.address_space.get_io_registers());

        let cycles = cpu::step(&mut self.address_space, &mut self.cpu_registers, &self.ppu_state)?;

        ppu::tick(&mut self.ppu_state, &mut self.address_space, cycles);
        timer::tick(
            self.address_space.get_io_registers_mut(),
            &mut self.timer_counter,
            timer_modulo,
            cycles,
        );
        self.apu_state.tick(cycles);

        let interrupt_cycles =
            cpu::service_interrupts(&mut self.cpu_registers, &mut self.address_space, &self.ppu_state);

        Ok(cycles + interrupt_cycles)
    }

    /// Latch the host's button state; bit layout per [`JoypadState`].
    pub fn set_input(&mut self, action: u8, direction: u8) {
        self.joypad_state.set_input(action, direction);
    }

    /// If a frame has completed since the last call, return it. The host
    /// must copy the buffer before the next `step`.
    pub fn poll_frame(&mut self) -> Option<&FrameBuffer> {
        self.ppu_state.take_frame()
    }

    pub fn cartridge(&self) -> &Cartridge {
        self.address_space.cartridge()
    }

    /// Total dots elapsed on the audio clock; the host audio backend paces
    /// its sample generation against this.
    pub fn audio_sample_clock(&self) -> u64 {
        self.apu_state.sample_clock()
    }

    /// When set to false, the VRAM/OAM mode gates and the OAM DMA write
    /// blackout are not enforced. Intended for test ROM development against
    /// under-specified hardware behavior.
    pub fn set_respect_illegal_reads_writes(&mut self, respect: bool) {
        self.address_space.set_respect_illegal_reads_writes(respect);
    }

    /// Flush battery-backed cartridge RAM to the sav file if it changed.
    pub fn persist_cartridge_ram(&mut self) -> Result<(), io::Error> {
        self.address_space.persist_cartridge_ram()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::InterruptType;
    use crate::memory::ioregisters::IoRegister;

    fn rom_with_program(program: &[u8]) -> Vec<u8> {
        let mut rom = vec![0x00; 0x8000];
        // JP 0x0150
        rom[0x0100..0x0104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
        rom[0x0150..0x0150 + program.len()].copy_from_slice(program);
        rom
    }

    fn game_boy_with_program(program: &[u8]) -> GameBoy {
        let mut game_boy = GameBoy::new(rom_with_program(program), None, false).unwrap();
        // JP to the program start
        game_boy.step().unwrap();
        game_boy.step().unwrap();
        assert_eq!(0x0150, game_boy.cpu_registers.pc);
        game_boy
    }

    #[test]
    fn halt_wakes_into_interrupt_handler() {
        // LD A, 0x04; LD (0xFFFF), A; EI; HALT
        let mut game_boy = game_boy_with_program(&[0x3E, 0x04, 0xEA, 0xFF, 0xFF, 0xFB, 0x76]);

        for _ in 0..4 {
            game_boy.step().unwrap();
        }
        assert!(game_boy.cpu_registers.halted);
        assert!(game_boy.cpu_registers.ime);
        let halt_pc = game_boy.cpu_registers.pc;

        // Stays halted while nothing is pending
        game_boy.step().unwrap();
        assert!(game_boy.cpu_registers.halted);

        game_boy.address_space.get_io_registers_mut().interrupt_flags().set(InterruptType::Timer);
        game_boy.step().unwrap();

        // The handler runs with the address after HALT on the stack
        assert!(!game_boy.cpu_registers.halted);
        assert!(!game_boy.cpu_registers.ime);
        assert_eq!(0x0050, game_boy.cpu_registers.pc);
        let pushed = game_boy
            .address_space
            .read_address_u16(game_boy.cpu_registers.sp, &game_boy.ppu_state);
        assert_eq!(halt_pc, pushed);

        // The serviced bit is cleared
        assert!(!game_boy
            .address_space
            .get_io_registers_mut()
            .interrupt_flags()
            .get(InterruptType::Timer));
    }

    #[test]
    fn halt_resumes_without_dispatch_when_ime_clear() {
        // LD A, 0x04; LD (0xFFFF), A; HALT; INC B
        let mut game_boy = game_boy_with_program(&[0x3E, 0x04, 0xEA, 0xFF, 0xFF, 0x76, 0x04]);

        for _ in 0..3 {
            game_boy.step().unwrap();
        }
        assert!(game_boy.cpu_registers.halted);
        let resume_pc = game_boy.cpu_registers.pc;

        game_boy.address_space.get_io_registers_mut().interrupt_flags().set(InterruptType::Timer);
        game_boy.step().unwrap();

        // Woken but not dispatched: execution continues after HALT
        assert!(!game_boy.cpu_registers.halted);
        assert_eq!(resume_pc, game_boy.cpu_registers.pc);

        game_boy.step().unwrap();
        assert_eq!(0x01, game_boy.cpu_registers.b);
    }

    #[test]
    fn ei_enables_one_instruction_late() {
        // LD A, 0x04; LD (0xFFFF), A; EI; NOP; NOP
        let mut game_boy = game_boy_with_program(&[0x3E, 0x04, 0xEA, 0xFF, 0xFF, 0xFB, 0x00, 0x00]);

        game_boy.step().unwrap();
        game_boy.step().unwrap();
        game_boy.address_space.get_io_registers_mut().interrupt_flags().set(InterruptType::Timer);

        // EI: no dispatch during this step even though an interrupt is pending
        game_boy.step().unwrap();
        assert!(game_boy.cpu_registers.ime);
        assert_ne!(0x0050, game_boy.cpu_registers.pc);

        // The following instruction executes, then the dispatch happens
        game_boy.step().unwrap();
        assert_eq!(0x0050, game_boy.cpu_registers.pc);
    }

    #[test]
    fn ei_di_leaves_interrupts_disabled() {
        // EI; DI
        let mut game_boy = game_boy_with_program(&[0xFB, 0xF3, 0x00]);

        game_boy.step().unwrap();
        assert!(game_boy.cpu_registers.ime);

        game_boy.step().unwrap();
        assert!(!game_boy.cpu_registers.ime);
        assert!(!game_boy.cpu_registers.ei_pending);
    }

    #[test]
    fn boot_rom_hand_off() {
        let mut rom = rom_with_program(&[]);
        rom[0x0000] = 0x76;
        rom[0x0134..0x0138].copy_from_slice(b"TEST");

        // Boot blob: LD A, 0x01; LDH (0x50), A; then NOPs
        let mut boot_rom = [0x00; 256];
        boot_rom[0..4].copy_from_slice(&[0x3E, 0x01, 0xE0, 0x50]);

        let mut game_boy =
            GameBoy::new(rom, None, false).unwrap().with_boot_rom(boot_rom);

        assert_eq!(0x0000, game_boy.cpu_registers.pc);
        assert_eq!(
            0x3E,
            game_boy.address_space.read_address_u8(0x0000, &game_boy.ppu_state)
        );

        game_boy.step().unwrap();
        game_boy.step().unwrap();

        // After the 0xFF50 write the cartridge owns the low window
        assert_eq!(
            0x76,
            game_boy.address_space.read_address_u8(0x0000, &game_boy.ppu_state)
        );
        assert_eq!("TEST", game_boy.cartridge().title());
    }

    #[test]
    fn timer_overflow_scenario() {
        // TAC = 0x05 (enabled, /16), TIMA = 0xFE, TMA = 0x42, then NOPs
        let mut game_boy = game_boy_with_program(&[0x00; 0x40]);
        {
            let io_registers = game_boy.address_space.get_io_registers_mut();
            io_registers.write_register(IoRegister::TAC, 0x05);
            io_registers.write_register(IoRegister::TIMA, 0xFE);
            io_registers.write_register(IoRegister::TMA, 0x42);
            io_registers.interrupt_flags().clear(InterruptType::Timer);
        }

        // 40 dots of NOPs: the overflow edge is at 32 dots
        for _ in 0..10 {
            game_boy.step().unwrap();
        }
        let io_registers = game_boy.address_space.get_io_registers_mut();
        assert_eq!(0x00, io_registers.read_register(IoRegister::TIMA));
        assert!(io_registers.interrupt_flags().get(InterruptType::Timer));

        // The reload from TMA lands on the next edge
        game_boy.step().unwrap();
        game_boy.step().unwrap();
        assert_eq!(
            0x42,
            game_boy.address_space.get_io_registers().read_register(IoRegister::TIMA)
        );
    }

    #[test]
    fn reti_restores_ime_with_delay() {
        // Handler at 0x50 contains RETI; main program enables the timer
        // interrupt then spins
        let mut rom = rom_with_program(&[0x3E, 0x04, 0xEA, 0xFF, 0xFF, 0xFB, 0x00, 0x00, 0x00]);
        rom[0x0050] = 0xD9;

        let mut game_boy = GameBoy::new(rom, None, false).unwrap();
        game_boy.step().unwrap();
        game_boy.step().unwrap();
        for _ in 0..3 {
            game_boy.step().unwrap();
        }
        assert!(game_boy.cpu_registers.ime);

        game_boy.address_space.get_io_registers_mut().interrupt_flags().set(InterruptType::Timer);

        // The step runs one NOP and then dispatches, pushing the address of
        // the instruction after it
        let return_pc = game_boy.cpu_registers.pc + 1;
        game_boy.step().unwrap();
        assert_eq!(0x0050, game_boy.cpu_registers.pc);
        assert!(!game_boy.cpu_registers.ime);

        // RETI pops the return address and re-enables interrupts
        game_boy.step().unwrap();
        assert_eq!(return_pc, game_boy.cpu_registers.pc);
        assert!(game_boy.cpu_registers.ime);
    }

    #[test]
    fn frames_are_paced_by_the_scheduler() {
        let mut game_boy = game_boy_with_program(&[0x18, 0xFE]); // JR -2

        let mut cycles: u64 = 0;
        while game_boy.poll_frame().is_none() {
            cycles += u64::from(game_boy.step().unwrap());
        }

        // The first frame completes within one frame's worth of dots of the
        // start (the JP steps already consumed a few)
        assert!(cycles <= 70224);

        // From wrap to wrap is exactly one frame
        let mut cycles: u64 = 0;
        while game_boy.poll_frame().is_none() {
            cycles += u64::from(game_boy.step().unwrap());
        }
        assert_eq!(70224, cycles);
    }
}

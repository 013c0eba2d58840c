use crate::cpu::InterruptType;
use crate::memory::ioregisters::{IoRegister, IoRegisters};

const DIV_UPDATE_FREQUENCY: u64 = 256;

/// Internal timer state: the free-running dot counter behind DIV and TIMA,
/// plus the one-period latch between a TIMA overflow and the TMA reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerCounter {
    dots: u64,
    overflow_pending: bool,
}

impl TimerCounter {
    pub fn new() -> Self {
        Self { dots: 0, overflow_pending: false }
    }
}

impl Default for TimerCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot TMA before the instruction executes: a reload triggered in the
/// same step uses the value from before any TMA write the instruction made.
pub fn read_timer_modulo(io_registers: &IoRegisters) -> u8 {
    io_registers.read_register(IoRegister::TMA)
}

/// Advance the timer by the given number of dots: DIV increments every 256
/// dots, TIMA at the TAC-selected rate. On TIMA overflow the TIMER interrupt
/// is requested, TIMA reads 0x00 for one period, and the reload from TMA
/// lands on the following edge.
pub fn tick(
    io_registers: &mut IoRegisters,
    counter: &mut TimerCounter,
    timer_modulo: u8,
    cycles: u32,
) {
    let cycles = u64::from(cycles);
    assert!(cycles <= DIV_UPDATE_FREQUENCY, "cycles must be <= {DIV_UPDATE_FREQUENCY}, was {cycles}");

    let old_dots = counter.dots;
    let new_dots = old_dots + cycles;
    counter.dots = new_dots;

    if old_dots / DIV_UPDATE_FREQUENCY != new_dots / DIV_UPDATE_FREQUENCY {
        let old_div = io_registers.read_register(IoRegister::DIV);
        io_registers.privileged_set_div(old_div.wrapping_add(1));
    }

    let timer_control = io_registers.read_register(IoRegister::TAC);
    if timer_control & 0x04 == 0 {
        // TIMA updates are disabled
        return;
    }

    let tima_frequency_bits = match timer_control & 0x03 {
        0x00 => 10, // 1024
        0x01 => 4,  // 16
        0x02 => 6,  // 64
        0x03 => 8,  // 256
        _ => unreachable!("value & 0x03 is always <= 0x03"),
    };

    let tima_edges = (new_dots >> tima_frequency_bits) - (old_dots >> tima_frequency_bits);

    // The cycle cap above means this loop runs at most a handful of times
    for _ in 0..tima_edges {
        if counter.overflow_pending {
            io_registers.privileged_set_tima(timer_modulo);
            counter.overflow_pending = false;
            continue;
        }

        let old_tima = io_registers.read_register(IoRegister::TIMA);
        match old_tima.overflowing_add(1) {
            (new_tima, false) => {
                io_registers.privileged_set_tima(new_tima);
            }
            (_, true) => {
                io_registers.privileged_set_tima(0x00);
                io_registers.interrupt_flags().set(InterruptType::Timer);
                counter.overflow_pending = true;
            }
        }
    }
}

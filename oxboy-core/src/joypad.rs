use crate::cpu::InterruptType;
use crate::memory::ioregisters::{IoRegister, IoRegisters};

/// Host-latched button state. Mask bits follow the JOYP low-nibble layout:
/// bit 0 = A / Right, bit 1 = B / Left, bit 2 = Select / Up,
/// bit 3 = Start / Down; a set bit means pressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoypadState {
    action: u8,
    direction: u8,
}

impl JoypadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&mut self, action: u8, direction: u8) {
        self.action = action & 0x0F;
        self.direction = direction & 0x0F;
    }
}

/// Refresh the low nibble of JOYP from the current button state and the
/// select bits, requesting the JOYPAD interrupt on any 1-to-0 edge.
pub fn update_joyp_register(joypad_state: &JoypadState, io_registers: &mut IoRegisters) {
    let joyp = io_registers.read_register(IoRegister::JOYP);
    let actions_selected = joyp & 0x20 == 0;
    let directions_selected = joyp & 0x10 == 0;

    let mut pressed = 0x00;
    if actions_selected {
        pressed |= joypad_state.action;
    }
    if directions_selected {
        pressed |= joypad_state.direction;
    }

    // Pressed buttons read as 0
    let new_joyp = (joyp & 0xF0) | (!pressed & 0x0F);
    io_registers.privileged_set_joyp(new_joyp);

    if joyp & !new_joyp & 0x0F != 0 {
        io_registers.interrupt_flags().set(InterruptType::Joypad);
    }
}

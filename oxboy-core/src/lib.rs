//! Game Boy / Game Boy Color emulation core.
//!
//! The host constructs a [`GameBoy`] from a ROM image, calls
//! [`GameBoy::step`] in a loop, presents the frame buffer whenever
//! [`GameBoy::poll_frame`] returns one, and feeds button state in through
//! [`GameBoy::set_input`].

mod apu;
mod cpu;
mod emulator;
mod joypad;
mod memory;
mod ppu;
mod timer;

pub use cpu::ExecutionMode;
pub use emulator::{GameBoy, StepError};
pub use memory::{Cartridge, CartridgeLoadError};
pub use ppu::{FrameBuffer, SCREEN_HEIGHT, SCREEN_WIDTH};

pub mod address;
pub mod ioregisters;
mod mapper;

use crate::cpu::ExecutionMode;
use crate::memory::ioregisters::IoRegisters;
use crate::memory::mapper::{Mapper, MapperFeatures, MapperType};
use crate::ppu::{PpuMode, PpuState};
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartridgeLoadError {
    #[error("header should be at least 336 bytes, was {header_len} bytes")]
    HeaderTooShort { header_len: usize },
    #[error("invalid or unsupported mapper byte in cartridge header: {mapper_byte:02X}")]
    InvalidMapper { mapper_byte: u8 },
    #[error("invalid RAM size code, expected 0-5: {ram_size_code}")]
    InvalidRamSize { ram_size_code: u8 },
    #[error("error reading data from {file_path}: {source}")]
    FileReadError {
        file_path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
struct FsRamBattery {
    dirty: bool,
    sav_path: PathBuf,
}

impl FsRamBattery {
    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn persist_ram(&mut self, ram: &[u8]) -> Result<(), io::Error> {
        if !self.dirty {
            return Ok(());
        }

        let tmp_file = self.sav_path.with_extension("sav.tmp");
        fs::write(&tmp_file, ram)?;
        fs::rename(&tmp_file, &self.sav_path)?;

        self.dirty = false;

        Ok(())
    }
}

fn load_sav_file<P>(sav_file: P) -> Result<Option<Vec<u8>>, CartridgeLoadError>
where
    P: AsRef<Path>,
{
    let ram = if fs::metadata(sav_file.as_ref()).map(|metadata| metadata.is_file()).unwrap_or(false)
    {
        Some(fs::read(sav_file.as_ref()).map_err(|err| CartridgeLoadError::FileReadError {
            file_path: sav_file.as_ref().to_str().unwrap_or("").into(),
            source: err,
        })?)
    } else {
        None
    };

    if ram.is_some() {
        log::info!("Loaded external RAM from {}", sav_file.as_ref().display());
    }

    Ok(ram)
}

pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    mapper: Mapper,
    mapper_type: MapperType,
    mapper_features: MapperFeatures,
    title: String,
    ram_battery: Option<FsRamBattery>,
}

impl Cartridge {
    /// Create a new Cartridge value from the given ROM image.
    ///
    /// If `sav_path` is provided and the mapper has a battery, external RAM is
    /// seeded from that file (when it exists) and later persisted back to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM is shorter than the cartridge header, if
    /// the mapper byte names a chip that is not supported, or if the RAM size
    /// code is invalid.
    pub fn new(rom: Vec<u8>, sav_path: Option<PathBuf>) -> Result<Self, CartridgeLoadError> {
        log::info!("Initializing cartridge using {} bytes of data", rom.len());

        if rom.len() < 0x0150 {
            return Err(CartridgeLoadError::HeaderTooShort { header_len: rom.len() });
        }

        let mapper_byte = rom[address::MAPPER as usize];
        let Some((mapper_type, mapper_features)) = mapper::parse_byte(mapper_byte) else {
            return Err(CartridgeLoadError::InvalidMapper { mapper_byte });
        };

        log::info!("Detected mapper type {mapper_type} (byte: {mapper_byte:02X})");
        log::info!("Mapper features: {mapper_features}");

        let ram_size_code = rom[address::RAM_SIZE as usize];
        let ram_size: usize = match ram_size_code {
            0x00 | 0x01 => 0,
            0x02 => 8 * 1024,
            0x03 => 32 * 1024,
            0x04 => 128 * 1024,
            0x05 => 64 * 1024,
            _ => return Err(CartridgeLoadError::InvalidRamSize { ram_size_code }),
        };

        let loaded_ram = match (&sav_path, mapper_features.has_battery) {
            (Some(sav_path), true) => load_sav_file(sav_path)?,
            _ => None,
        };

        let ram = match loaded_ram {
            Some(mut ram) => {
                if ram.len() != ram_size {
                    log::warn!(
                        "sav file length {} does not match cartridge RAM size {ram_size}, resizing",
                        ram.len()
                    );
                    ram.resize(ram_size, 0xFF);
                }
                ram
            }
            // Uninitialized external RAM reads out as all-ones
            None => vec![0xFF; ram_size],
        };

        let ram_battery = match (mapper_features.has_battery, sav_path) {
            (true, Some(sav_path)) => {
                log::info!("Persisting external RAM to {}", sav_path.display());
                Some(FsRamBattery { dirty: false, sav_path })
            }
            _ => None,
        };

        let title = parse_title(&rom);
        log::info!("Cartridge title: '{title}'");
        log::info!("Cartridge has {} bytes of external RAM", ram.len());

        let mapper = Mapper::new(mapper_type, rom.len() as u32, ram.len() as u32);

        Ok(Self { rom, ram, mapper, mapper_type, mapper_features, title, ram_battery })
    }

    /// Read a value from the given ROM address.
    ///
    /// # Panics
    ///
    /// This method will panic if the address is outside \[0x0000, 0x7FFF\].
    pub fn read_rom_address(&self, address: u16) -> u8 {
        let mapped_address = self.mapper.map_rom_address(address);
        self.rom.get(mapped_address as usize).copied().unwrap_or(0xFF)
    }

    /// Write a value to the given ROM address, which in reality sets a mapper
    /// banking register.
    pub fn write_rom_address(&mut self, address: u16, value: u8) {
        self.mapper.write_rom_address(address, value);
    }

    /// Read a value from the given external RAM address. Returns 0xFF if RAM
    /// is disabled or the address does not map to RAM.
    pub fn read_ram_address(&self, address: u16) -> u8 {
        match self.mapper.map_ram_address(address) {
            Some(mapped_address) => {
                self.ram.get(mapped_address as usize).copied().unwrap_or(0xFF)
            }
            None => {
                log::warn!("read of disabled external RAM at {address:04X}, returning 0xFF");
                0xFF
            }
        }
    }

    /// Write a value to the given external RAM address. Does nothing if RAM
    /// is disabled or the address does not map to RAM.
    pub fn write_ram_address(&mut self, address: u16, value: u8) {
        match self.mapper.map_ram_address(address) {
            Some(mapped_address) => {
                if let Some(ram_value) = self.ram.get_mut(mapped_address as usize) {
                    *ram_value = value;
                    if let Some(ram_battery) = &mut self.ram_battery {
                        ram_battery.mark_dirty();
                    }
                }
            }
            None => {
                log::warn!("dropping write of {value:02X} to disabled external RAM at {address:04X}");
            }
        }
    }

    /// If this cartridge is battery-backed, save external RAM to disk if it
    /// has been modified since the last time this method was called.
    pub fn persist_external_ram(&mut self) -> Result<(), io::Error> {
        match &mut self.ram_battery {
            Some(ram_battery) => ram_battery.persist_ram(&self.ram),
            None => Ok(()),
        }
    }

    /// Whether this cartridge supports CGB enhancements (or requires CGB).
    pub fn supports_cgb_mode(&self) -> bool {
        self.rom[address::CGB_SUPPORT as usize] & 0x80 != 0
    }

    /// The game title parsed from the cartridge header.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Human-readable mapper tag, e.g. "MBC1+RAM+BATTERY".
    pub fn mapper_description(&self) -> String {
        let mut description = self.mapper_type.to_string();
        if self.mapper_features.has_ram {
            description.push_str("+RAM");
        }
        if self.mapper_features.has_battery {
            description.push_str("+BATTERY");
        }
        description
    }
}

fn parse_title(rom: &[u8]) -> String {
    rom[address::TITLE_START as usize..address::TITLE_END as usize]
        .iter()
        .copied()
        .take_while(|&b| b != 0x00)
        .filter(u8::is_ascii)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VramBank {
    Bank0,
    Bank1,
}

/// The guest's 16-bit address space: dispatches reads and writes by address
/// band to the cartridge, VRAM, work RAM, OAM, the I/O register file, HRAM,
/// and the IE register, applying the PPU/DMA access gates along the way.
pub struct AddressSpace {
    execution_mode: ExecutionMode,
    cartridge: Cartridge,
    vram: [u8; 16384],
    working_ram: [u8; 32768],
    oam: [u8; 160],
    io_registers: IoRegisters,
    hram: [u8; 127],
    ie_register: u8,
    boot_rom: Option<Box<[u8; 256]>>,
    boot_rom_mapped: bool,
    respect_illegal_reads_writes: bool,
}

impl AddressSpace {
    pub fn new(cartridge: Cartridge, execution_mode: ExecutionMode) -> Self {
        Self {
            execution_mode,
            cartridge,
            vram: [0; 16384],
            working_ram: [0; 32768],
            oam: [0; 160],
            io_registers: IoRegisters::new(execution_mode),
            hram: [0; 127],
            ie_register: 0,
            boot_rom: None,
            boot_rom_mapped: false,
            respect_illegal_reads_writes: true,
        }
    }

    /// Install a boot ROM blob; reads of 0x0000-0x00FF will return its bytes
    /// until the guest writes a non-zero value to 0xFF50.
    pub fn set_boot_rom(&mut self, boot_rom: [u8; 256]) {
        self.boot_rom = Some(Box::new(boot_rom));
        self.boot_rom_mapped = true;
    }

    /// When set to false, the VRAM/OAM mode gates and the OAM DMA write
    /// blackout are not enforced. Intended for test ROM development against
    /// under-specified hardware behavior.
    pub fn set_respect_illegal_reads_writes(&mut self, respect: bool) {
        self.respect_illegal_reads_writes = respect;
    }

    fn lcd_enabled(&self) -> bool {
        self.io_registers.read_register(ioregisters::IoRegister::LCDC) & 0x80 != 0
    }

    fn is_ppu_contended(&self, address: u16, ppu_state: &PpuState) -> bool {
        if !self.lcd_enabled() {
            return false;
        }

        match address {
            address::VRAM_START..=address::VRAM_END => {
                ppu_state.mode() == PpuMode::RenderingScanline
            }
            address::OAM_START..=address::OAM_END => {
                matches!(ppu_state.mode(), PpuMode::ScanningOAM | PpuMode::RenderingScanline)
            }
            _ => false,
        }
    }

    /// Read the value at the given address from the perspective of the CPU.
    /// Returns 0xFF if the PPU currently owns the addressed memory.
    pub fn read_address_u8(&self, address: u16, ppu_state: &PpuState) -> u8 {
        if self.respect_illegal_reads_writes && self.is_ppu_contended(address, ppu_state) {
            log::warn!("read of {address:04X} while the PPU owns it, returning 0xFF");
            return 0xFF;
        }

        self.read_address_u8_no_access_check(address)
    }

    fn map_vram_address(&self, address: u16) -> usize {
        match self.execution_mode {
            ExecutionMode::GameBoy => (address - address::VRAM_START) as usize,
            ExecutionMode::GameBoyColor => {
                (self.io_registers.get_cgb_vram_bank() << 13)
                    + (address - address::VRAM_START) as usize
            }
        }
    }

    fn map_working_ram_address(&self, address: u16) -> usize {
        match self.execution_mode {
            ExecutionMode::GameBoy => (address - address::WORKING_RAM_START) as usize,
            ExecutionMode::GameBoyColor => match address {
                address @ address::WORKING_RAM_START..=address::CGB_BANK_0_WORKING_RAM_END => {
                    (address - address::WORKING_RAM_START) as usize
                }
                _ => {
                    let ram_bank_number = self.io_registers.get_cgb_working_ram_bank();
                    (ram_bank_number << 12)
                        + (address - address::CGB_BANKED_WORKING_RAM_START) as usize
                }
            },
        }
    }

    fn read_address_u8_no_access_check(&self, address: u16) -> u8 {
        match address {
            address @ address::ROM_START..=address::BOOT_ROM_END if self.boot_rom_mapped => {
                match &self.boot_rom {
                    Some(boot_rom) => boot_rom[address as usize],
                    None => self.cartridge.read_rom_address(address),
                }
            }
            address @ address::ROM_START..=address::ROM_END => {
                self.cartridge.read_rom_address(address)
            }
            address @ address::VRAM_START..=address::VRAM_END => {
                self.vram[self.map_vram_address(address)]
            }
            address @ address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                self.cartridge.read_ram_address(address)
            }
            address @ address::WORKING_RAM_START..=address::WORKING_RAM_END => {
                self.working_ram[self.map_working_ram_address(address)]
            }
            address @ address::ECHO_RAM_START..=address::ECHO_RAM_END => {
                self.working_ram[self.map_working_ram_address(
                    address - address::ECHO_RAM_START + address::WORKING_RAM_START,
                )]
            }
            address @ address::OAM_START..=address::OAM_END => {
                self.oam[(address - address::OAM_START) as usize]
            }
            address @ address::UNUSABLE_START..=address::UNUSABLE_END => {
                log::warn!("read of unusable address {address:04X}, returning 0xFF");
                0xFF
            }
            address @ address::IO_REGISTERS_START..=address::IO_REGISTERS_END => {
                self.io_registers.read_address(address)
            }
            address @ address::HRAM_START..=address::HRAM_END => {
                self.hram[(address - address::HRAM_START) as usize]
            }
            address::IE_REGISTER => self.ie_register,
        }
    }

    /// Read the value at the given address and the following address as a
    /// little-endian 16-bit value.
    pub fn read_address_u16(&self, address: u16, ppu_state: &PpuState) -> u16 {
        let lsb = self.read_address_u8(address, ppu_state);
        let msb = self.read_address_u8(address.wrapping_add(1), ppu_state);
        u16::from_le_bytes([lsb, msb])
    }

    /// Assign a value to the given address from the perspective of the CPU.
    /// The write is dropped if the PPU owns the addressed memory or an OAM
    /// DMA transfer is in progress and the address is outside HRAM.
    ///
    /// # Panics
    ///
    /// Writes to the echo RAM region (0xE000-0xFDFF) are prohibited and
    /// panic.
    pub fn write_address_u8(&mut self, address: u16, value: u8, ppu_state: &PpuState) {
        if self.respect_illegal_reads_writes {
            // Non-HRAM writes are dropped while an OAM DMA transfer is running
            if ppu_state.oam_dma_in_progress()
                && !(address::HRAM_START..=address::HRAM_END).contains(&address)
            {
                log::warn!(
                    "dropping write of {value:02X} to {address:04X} during OAM DMA transfer"
                );
                return;
            }

            if self.is_ppu_contended(address, ppu_state) {
                log::warn!(
                    "dropping write of {value:02X} to {address:04X} while the PPU owns it"
                );
                return;
            }
        }

        self.write_address_u8_no_access_check(address, value);
    }

    fn write_address_u8_no_access_check(&mut self, address: u16, value: u8) {
        match address {
            address @ address::ROM_START..=address::ROM_END => {
                self.cartridge.write_rom_address(address, value);
            }
            address @ address::VRAM_START..=address::VRAM_END => {
                self.vram[self.map_vram_address(address)] = value;
            }
            address @ address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                self.cartridge.write_ram_address(address, value);
            }
            address @ address::WORKING_RAM_START..=address::WORKING_RAM_END => {
                self.working_ram[self.map_working_ram_address(address)] = value;
            }
            address @ address::ECHO_RAM_START..=address::ECHO_RAM_END => {
                panic!("write of {value:02X} to prohibited echo RAM address {address:04X}");
            }
            address @ address::OAM_START..=address::OAM_END => {
                self.oam[(address - address::OAM_START) as usize] = value;
            }
            address @ address::UNUSABLE_START..=address::UNUSABLE_END => {
                log::warn!("dropping write of {value:02X} to unusable address {address:04X}");
            }
            address::BOOT_ROM_DISABLE => {
                if self.boot_rom_mapped && value != 0 {
                    log::info!("Boot ROM unmapped, cartridge now owns 0x0000-0x00FF");
                    self.boot_rom_mapped = false;
                }
            }
            address @ address::IO_REGISTERS_START..=address::IO_REGISTERS_END => {
                self.io_registers.write_address(address, value);
            }
            address @ address::HRAM_START..=address::HRAM_END => {
                self.hram[(address - address::HRAM_START) as usize] = value;
            }
            address::IE_REGISTER => {
                self.ie_register = value;
            }
        }
    }

    /// Assign a 16-bit value to the given address and the following address,
    /// little-endian.
    pub fn write_address_u16(&mut self, address: u16, value: u16, ppu_state: &PpuState) {
        let [lsb, msb] = value.to_le_bytes();
        self.write_address_u8(address, lsb, ppu_state);
        self.write_address_u8(address.wrapping_add(1), msb, ppu_state);
    }

    pub fn get_io_registers(&self) -> &IoRegisters {
        &self.io_registers
    }

    pub fn get_io_registers_mut(&mut self) -> &mut IoRegisters {
        &mut self.io_registers
    }

    /// Read a byte directly from VRAM using the given address+bank, bypassing
    /// the CPU access gates. This should only be called by the PPU.
    ///
    /// # Panics
    ///
    /// Panics if the address is not a VRAM address.
    pub fn read_vram_direct(&self, address: u16, vram_bank: VramBank) -> u8 {
        assert!(
            (address::VRAM_START..=address::VRAM_END).contains(&address),
            "read_vram_direct called with a non-VRAM address: {address:04X}"
        );

        match vram_bank {
            VramBank::Bank0 => self.vram[(address - address::VRAM_START) as usize],
            VramBank::Bank1 => self.vram[8192 + (address - address::VRAM_START) as usize],
        }
    }

    /// Read a byte from OAM, bypassing the CPU access gates. This should only
    /// be called by the PPU.
    ///
    /// # Panics
    ///
    /// Panics if the address is not an OAM address.
    pub fn ppu_read_oam(&self, address: u16) -> u8 {
        assert!(
            (address::OAM_START..=address::OAM_END).contains(&address),
            "ppu_read_oam called with a non-OAM address: {address:04X}"
        );

        self.oam[(address - address::OAM_START) as usize]
    }

    /// Copy a byte from the given source address to the given destination
    /// address, bypassing access checks. Intended for use by the DMA engines.
    pub fn copy_byte(&mut self, src_address: u16, dst_address: u16) {
        let byte = self.read_address_u8_no_access_check(src_address);
        self.write_address_u8_no_access_check(dst_address, byte);
    }

    /// Retrieve the current value of the IE register (interrupts enabled).
    pub fn get_ie_register(&self) -> u8 {
        self.ie_register
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub fn persist_cartridge_ram(&mut self) -> Result<(), io::Error> {
        self.cartridge.persist_external_ram()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ioregisters::IoRegister;

    fn test_rom(mapper_byte: u8, ram_size_code: u8) -> Vec<u8> {
        let mut rom = vec![0; 0x8000];
        rom[address::MAPPER as usize] = mapper_byte;
        rom[address::ROM_SIZE as usize] = 0x00;
        rom[address::RAM_SIZE as usize] = ram_size_code;
        rom
    }

    fn test_cartridge() -> Cartridge {
        Cartridge::new(test_rom(0x00, 0x00), None).unwrap()
    }

    fn cgb_test_cartridge() -> Cartridge {
        let mut rom = test_rom(0x00, 0x00);
        rom[address::CGB_SUPPORT as usize] = 0x80;
        Cartridge::new(rom, None).unwrap()
    }

    fn vblank_ppu_state(execution_mode: ExecutionMode) -> PpuState {
        let mut ppu_state = PpuState::new(execution_mode);
        ppu_state.set_mode_for_test(PpuMode::VBlank);
        ppu_state
    }

    #[test]
    fn echo_ram_reads_alias_working_ram() {
        let mut address_space = AddressSpace::new(test_cartridge(), ExecutionMode::GameBoy);
        let ppu_state = vblank_ppu_state(ExecutionMode::GameBoy);

        address_space.write_address_u8(0xC123, 0x45, &ppu_state);
        assert_eq!(0x45, address_space.read_address_u8(0xE123, &ppu_state));

        address_space.write_address_u8(0xDDFF, 0x88, &ppu_state);
        assert_eq!(0x88, address_space.read_address_u8(0xFDFF, &ppu_state));
    }

    #[test]
    #[should_panic(expected = "echo RAM")]
    fn echo_ram_writes_prohibited() {
        let mut address_space = AddressSpace::new(test_cartridge(), ExecutionMode::GameBoy);
        let ppu_state = vblank_ppu_state(ExecutionMode::GameBoy);

        address_space.write_address_u8(0xE000, 0x01, &ppu_state);
    }

    #[test]
    fn unusable_region() {
        let mut address_space = AddressSpace::new(test_cartridge(), ExecutionMode::GameBoy);
        let ppu_state = vblank_ppu_state(ExecutionMode::GameBoy);

        address_space.write_address_u8(0xFEA0, 0x12, &ppu_state);
        assert_eq!(0xFF, address_space.read_address_u8(0xFEA0, &ppu_state));
        assert_eq!(0xFF, address_space.read_address_u8(0xFEFF, &ppu_state));
    }

    #[test]
    fn boot_rom_shadowing_and_handoff() {
        let mut rom = test_rom(0x00, 0x00);
        rom[0] = 0x76;
        let mut address_space =
            AddressSpace::new(Cartridge::new(rom, None).unwrap(), ExecutionMode::GameBoy);
        let ppu_state = vblank_ppu_state(ExecutionMode::GameBoy);

        let mut boot_rom = [0; 256];
        boot_rom[0] = 0x31;
        boot_rom[255] = 0x50;
        address_space.set_boot_rom(boot_rom);

        assert_eq!(0x31, address_space.read_address_u8(0x0000, &ppu_state));
        assert_eq!(0x50, address_space.read_address_u8(0x00FF, &ppu_state));
        // The window past the boot ROM always reads from the cartridge
        assert_eq!(0x00, address_space.read_address_u8(0x0100, &ppu_state));

        // A zero write leaves the boot ROM mapped
        address_space.write_address_u8(0xFF50, 0x00, &ppu_state);
        assert_eq!(0x31, address_space.read_address_u8(0x0000, &ppu_state));

        address_space.write_address_u8(0xFF50, 0x01, &ppu_state);
        assert_eq!(0x76, address_space.read_address_u8(0x0000, &ppu_state));

        // The handoff is permanent
        address_space.write_address_u8(0xFF50, 0x00, &ppu_state);
        assert_eq!(0x76, address_space.read_address_u8(0x0000, &ppu_state));
    }

    #[test]
    fn mbc1_bank_switch_read() {
        // 128KB ROM with a marker byte at the start of bank 2
        let mut rom = vec![0; 0x20000];
        rom[address::MAPPER as usize] = 0x01;
        rom[address::ROM_SIZE as usize] = 0x02;
        rom[0x8000] = 0xAA;

        let mut cartridge = Cartridge::new(rom, None).unwrap();

        cartridge.write_rom_address(0x2100, 0x02);
        assert_eq!(0xAA, cartridge.read_rom_address(0x4000));
    }

    #[test]
    fn disabled_external_ram() {
        let mut cartridge = Cartridge::new(test_rom(0x02, 0x02), None).unwrap();

        cartridge.write_ram_address(0xA000, 0x55);
        assert_eq!(0xFF, cartridge.read_ram_address(0xA000));

        cartridge.write_rom_address(0x0000, 0x0A);
        cartridge.write_ram_address(0xA000, 0x55);
        assert_eq!(0x55, cartridge.read_ram_address(0xA000));

        cartridge.write_rom_address(0x0000, 0x00);
        assert_eq!(0xFF, cartridge.read_ram_address(0xA000));
    }

    #[test]
    fn battery_ram_round_trip() {
        let sav_path = std::env::temp_dir()
            .join(format!("oxboy-battery-round-trip-{}.sav", std::process::id()));
        let _ = fs::remove_file(&sav_path);

        let rom = test_rom(0x03, 0x02);

        {
            let mut cartridge = Cartridge::new(rom.clone(), Some(sav_path.clone())).unwrap();
            cartridge.write_rom_address(0x0000, 0x0A);
            cartridge.write_ram_address(0xA000, 0x13);
            cartridge.write_ram_address(0xBFFF, 0x37);
            cartridge.persist_external_ram().unwrap();
        }

        let mut cartridge = Cartridge::new(rom, Some(sav_path.clone())).unwrap();
        cartridge.write_rom_address(0x0000, 0x0A);
        assert_eq!(0x13, cartridge.read_ram_address(0xA000));
        assert_eq!(0x37, cartridge.read_ram_address(0xBFFF));

        let _ = fs::remove_file(&sav_path);
    }

    #[test]
    fn missing_sav_file_initializes_ram_to_ff() {
        let sav_path =
            std::env::temp_dir().join(format!("oxboy-missing-sav-{}.sav", std::process::id()));
        let _ = fs::remove_file(&sav_path);

        let mut cartridge = Cartridge::new(test_rom(0x03, 0x02), Some(sav_path)).unwrap();
        cartridge.write_rom_address(0x0000, 0x0A);
        assert_eq!(0xFF, cartridge.read_ram_address(0xA000));
    }

    #[test]
    fn unsupported_mapper_byte() {
        let result = Cartridge::new(test_rom(0x20, 0x00), None);
        assert!(matches!(result, Err(CartridgeLoadError::InvalidMapper { mapper_byte: 0x20 })));
    }

    #[test]
    fn cartridge_title_and_mapper_description() {
        let mut rom = test_rom(0x03, 0x02);
        rom[address::TITLE_START as usize..address::TITLE_START as usize + 4]
            .copy_from_slice(b"TEST");

        let cartridge = Cartridge::new(rom, None).unwrap();
        assert_eq!("TEST", cartridge.title());
        assert_eq!("MBC1+RAM+BATTERY", cartridge.mapper_description());
    }

    #[test]
    fn cgb_vram_banks() {
        let mut address_space =
            AddressSpace::new(cgb_test_cartridge(), ExecutionMode::GameBoyColor);
        let ppu_state = vblank_ppu_state(ExecutionMode::GameBoyColor);

        address_space.get_io_registers_mut().write_register(IoRegister::VBK, 0x00);

        address_space.write_address_u8(0x8500, 0xCD, &ppu_state);
        assert_eq!(0xCD, address_space.read_address_u8(0x8500, &ppu_state));

        address_space.get_io_registers_mut().write_register(IoRegister::VBK, 0x01);

        assert_eq!(0x00, address_space.read_address_u8(0x8500, &ppu_state));
        address_space.write_address_u8(0x8500, 0xEF, &ppu_state);
        assert_eq!(0xEF, address_space.read_address_u8(0x8500, &ppu_state));

        // Only bit 0 of VBK is significant
        address_space.get_io_registers_mut().write_register(IoRegister::VBK, 0xFE);
        assert_eq!(0xCD, address_space.read_address_u8(0x8500, &ppu_state));

        // The PPU sees both banks regardless of VBK
        assert_eq!(0xCD, address_space.read_vram_direct(0x8500, VramBank::Bank0));
        assert_eq!(0xEF, address_space.read_vram_direct(0x8500, VramBank::Bank1));
    }

    #[test]
    fn cgb_working_ram_banks() {
        let mut address_space =
            AddressSpace::new(cgb_test_cartridge(), ExecutionMode::GameBoyColor);
        let ppu_state = vblank_ppu_state(ExecutionMode::GameBoyColor);

        address_space.get_io_registers_mut().write_register(IoRegister::SVBK, 0x00);

        address_space.write_address_u8(0xC500, 0xDE, &ppu_state);
        address_space.write_address_u8(0xD500, 0xCF, &ppu_state);

        // Bank 1 behaves the same as bank 0
        address_space.get_io_registers_mut().write_register(IoRegister::SVBK, 0x01);
        assert_eq!(0xCF, address_space.read_address_u8(0xD500, &ppu_state));
        assert_eq!(0xDE, address_space.read_address_u8(0xC500, &ppu_state));

        address_space.get_io_registers_mut().write_register(IoRegister::SVBK, 0x04);
        assert_eq!(0x00, address_space.read_address_u8(0xD500, &ppu_state));
        address_space.write_address_u8(0xD500, 0x57, &ppu_state);
        assert_eq!(0x57, address_space.read_address_u8(0xD500, &ppu_state));

        // 0xC000-0xCFFF is not banked
        assert_eq!(0xDE, address_space.read_address_u8(0xC500, &ppu_state));

        // Only the low 3 bits of SVBK are used
        address_space.get_io_registers_mut().write_register(IoRegister::SVBK, 0xF9);
        assert_eq!(0xCF, address_space.read_address_u8(0xD500, &ppu_state));
    }

    #[test]
    fn vram_blocked_during_rendering() {
        let mut address_space = AddressSpace::new(test_cartridge(), ExecutionMode::GameBoy);
        let mut ppu_state = PpuState::new(ExecutionMode::GameBoy);
        ppu_state.set_mode_for_test(PpuMode::RenderingScanline);

        address_space.write_address_u8(0x8000, 0x12, &ppu_state);
        assert_eq!(0xFF, address_space.read_address_u8(0x8000, &ppu_state));

        ppu_state.set_mode_for_test(PpuMode::HBlank);
        assert_eq!(0x00, address_space.read_address_u8(0x8000, &ppu_state));

        // The gates can be relaxed for test ROM development
        ppu_state.set_mode_for_test(PpuMode::RenderingScanline);
        address_space.set_respect_illegal_reads_writes(false);
        address_space.write_address_u8(0x8000, 0x12, &ppu_state);
        assert_eq!(0x12, address_space.read_address_u8(0x8000, &ppu_state));
    }
}

use crate::memory::address;
use std::fmt::Formatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperType {
    None,
    MBC1,
    MBC3,
    MBC5,
}

impl std::fmt::Display for MapperType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "ROM only",
            Self::MBC1 => "MBC1",
            Self::MBC3 => "MBC3",
            Self::MBC5 => "MBC5",
        };
        write!(f, "{s}")
    }
}

/// On-cartridge banking chip state. ROM-area writes land in the banking
/// registers here; the mapper then turns guest addresses into offsets into
/// the raw ROM/RAM arrays.
#[derive(Debug, Clone)]
pub enum Mapper {
    None,
    MBC1 {
        rom_bank_bit_mask: u8,
        ram_bank_bit_mask: u8,
        ram_enable: u8,
        rom_bank_number: u8,
        ram_bank_number: u8,
        banking_mode_select: u8,
    },
    MBC3 {
        rom_bank_bit_mask: u8,
        ram_enable: u8,
        rom_bank_number: u8,
        ram_bank_number: u8,
    },
    MBC5 {
        rom_bank_bit_mask: u16,
        ram_bank_bit_mask: u8,
        ram_enable: u8,
        rom_bank_number: u16,
        ram_bank_number: u8,
    },
}

impl Mapper {
    pub(crate) fn new(mapper_type: MapperType, rom_size: u32, ram_size: u32) -> Self {
        let rom_bank_bit_mask =
            if rom_size >= 1 << 14 { ((rom_size >> 14) - 1) as u16 } else { 0 };
        let ram_bank_bit_mask = if ram_size >= 1 << 13 { ((ram_size >> 13) - 1) as u8 } else { 0 };

        log::debug!("setting ROM bank bit mask to {rom_bank_bit_mask:03X} for size {rom_size}");
        log::debug!("setting RAM bank bit mask to {ram_bank_bit_mask:02X} for size {ram_size}");

        match mapper_type {
            MapperType::None => Self::None,
            MapperType::MBC1 => Self::MBC1 {
                rom_bank_bit_mask: rom_bank_bit_mask as u8,
                ram_bank_bit_mask,
                ram_enable: 0x00,
                rom_bank_number: 0x00,
                ram_bank_number: 0x00,
                banking_mode_select: 0x00,
            },
            MapperType::MBC3 => Self::MBC3 {
                rom_bank_bit_mask: rom_bank_bit_mask as u8,
                ram_enable: 0x00,
                rom_bank_number: 0x00,
                ram_bank_number: 0x00,
            },
            MapperType::MBC5 => Self::MBC5 {
                rom_bank_bit_mask,
                ram_bank_bit_mask,
                ram_enable: 0x00,
                rom_bank_number: 0x01,
                ram_bank_number: 0x00,
            },
        }
    }

    pub(crate) fn map_rom_address(&self, address: u16) -> u32 {
        match self {
            Self::None => u32::from(address),
            &Self::MBC1 {
                rom_bank_bit_mask,
                rom_bank_number,
                ram_bank_number,
                banking_mode_select,
                ..
            } => {
                // Bank 0 cannot be selected into the switchable window
                let rom_bank_number =
                    if rom_bank_number == 0x00 { 0x01 } else { rom_bank_number };

                match address {
                    address @ 0x0000..=0x3FFF => {
                        if banking_mode_select == 0x00 {
                            u32::from(address)
                        } else {
                            let bank_number = (ram_bank_number << 5) & rom_bank_bit_mask;
                            u32::from(address) + (u32::from(bank_number) << 14)
                        }
                    }
                    address @ 0x4000..=0x7FFF => {
                        let bank_number =
                            (rom_bank_number | (ram_bank_number << 5)) & rom_bank_bit_mask;
                        u32::from(address - 0x4000) + (u32::from(bank_number) << 14)
                    }
                    _ => panic!(
                        "mapper called for address outside of cartridge address range: {address:04X}"
                    ),
                }
            }
            &Self::MBC3 { rom_bank_bit_mask, rom_bank_number, .. } => {
                let rom_bank_number =
                    if rom_bank_number == 0x00 { 0x01 } else { rom_bank_number };

                match address {
                    address @ 0x0000..=0x3FFF => u32::from(address),
                    address @ 0x4000..=0x7FFF => {
                        let bank_number = rom_bank_number & rom_bank_bit_mask;
                        u32::from(address - 0x4000) + (u32::from(bank_number) << 14)
                    }
                    _ => panic!(
                        "mapper called for address outside of cartridge address range: {address:04X}"
                    ),
                }
            }
            &Self::MBC5 { rom_bank_bit_mask, rom_bank_number, .. } => {
                // Unlike MBC1/MBC3, bank 0 is selectable on MBC5
                match address {
                    address @ 0x0000..=0x3FFF => u32::from(address),
                    address @ 0x4000..=0x7FFF => {
                        let bank_number = rom_bank_number & rom_bank_bit_mask;
                        u32::from(address - 0x4000) + (u32::from(bank_number) << 14)
                    }
                    _ => panic!(
                        "mapper called for address outside of cartridge address range: {address:04X}"
                    ),
                }
            }
        }
    }

    // ROM writes don't modify the ROM, they set banking registers
    pub(crate) fn write_rom_address(&mut self, address: u16, value: u8) {
        match self {
            Self::None => {}
            Self::MBC1 {
                ram_enable,
                rom_bank_number,
                ram_bank_number,
                banking_mode_select,
                ..
            } => match address {
                _address @ 0x0000..=0x1FFF => {
                    log::trace!("MBC1 ram_enable changed to {value:02X}");
                    *ram_enable = value;
                }
                _address @ 0x2000..=0x3FFF => {
                    log::trace!("MBC1 rom_bank_number changed to {value:02X}");
                    *rom_bank_number = value & 0x1F;
                }
                _address @ 0x4000..=0x5FFF => {
                    log::trace!("MBC1 ram_bank_number changed to {value:02X}");
                    *ram_bank_number = value & 0x03;
                }
                _address @ 0x6000..=0x7FFF => {
                    log::trace!("MBC1 banking_mode_select changed to {value:02X}");
                    *banking_mode_select = value & 0x01;
                }
                _ => panic!("invalid ROM write address in MBC1 mapper: {address:04X}"),
            },
            Self::MBC3 { ram_enable, rom_bank_number, ram_bank_number, .. } => match address {
                _address @ 0x0000..=0x1FFF => {
                    *ram_enable = value;
                }
                _address @ 0x2000..=0x3FFF => {
                    *rom_bank_number = value & 0x7F;
                }
                _address @ 0x4000..=0x5FFF => {
                    *ram_bank_number = value;
                }
                _address @ 0x6000..=0x7FFF => {
                    // RTC latch register on carts with a clock; not emulated
                }
                _ => panic!("invalid ROM write address in MBC3 mapper: {address:04X}"),
            },
            Self::MBC5 { ram_enable, rom_bank_number, ram_bank_number, .. } => match address {
                _address @ 0x0000..=0x1FFF => {
                    *ram_enable = value;
                }
                _address @ 0x2000..=0x2FFF => {
                    *rom_bank_number = (*rom_bank_number & 0xFF00) | u16::from(value);
                }
                _address @ 0x3000..=0x3FFF => {
                    *rom_bank_number = (u16::from(value & 0x01) << 8) | (*rom_bank_number & 0x00FF);
                }
                _address @ 0x4000..=0x5FFF => {
                    *ram_bank_number = value & 0x0F;
                }
                _address @ 0x6000..=0x7FFF => {}
                _ => panic!("invalid ROM write address in MBC5 mapper: {address:04X}"),
            },
        }
    }

    /// Map an external RAM address (0xA000-0xBFFF) to an offset into the full
    /// RAM array. Returns None if RAM is disabled or the selected bank does
    /// not address RAM.
    pub(crate) fn map_ram_address(&self, address: u16) -> Option<u32> {
        let relative_address = address - address::EXTERNAL_RAM_START;

        match self {
            Self::None => Some(u32::from(relative_address)),
            &Self::MBC1 {
                ram_bank_bit_mask,
                ram_enable,
                ram_bank_number,
                banking_mode_select,
                ..
            } => {
                if ram_enable & 0x0A != 0x0A {
                    return None;
                }

                if banking_mode_select == 0x00 {
                    Some(u32::from(relative_address))
                } else {
                    let bank_number = ram_bank_number & ram_bank_bit_mask;
                    Some(u32::from(relative_address) + (u32::from(bank_number) << 13))
                }
            }
            &Self::MBC3 { ram_enable, ram_bank_number, .. } => {
                if ram_enable & 0x0A != 0x0A {
                    return None;
                }

                match ram_bank_number {
                    ram_bank_number @ 0x00..=0x03 => {
                        Some(u32::from(relative_address) + (u32::from(ram_bank_number) << 13))
                    }
                    // 0x08-0x0C select the RTC registers on carts that have
                    // one; the clock is not emulated
                    _ => None,
                }
            }
            &Self::MBC5 { ram_bank_bit_mask, ram_enable, ram_bank_number, .. } => {
                if ram_enable & 0x0A != 0x0A {
                    return None;
                }

                let bank_number = ram_bank_number & ram_bank_bit_mask;
                Some(u32::from(relative_address) + (u32::from(bank_number) << 13))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MapperFeatures {
    pub(crate) has_ram: bool,
    pub(crate) has_battery: bool,
}

impl std::fmt::Display for MapperFeatures {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "has_ram={}, has_battery={}", self.has_ram, self.has_battery)
    }
}

pub(crate) fn parse_byte(mapper_byte: u8) -> Option<(MapperType, MapperFeatures)> {
    let (mapper_type, has_ram, has_battery) = match mapper_byte {
        0x00 => (MapperType::None, false, false),
        0x01 => (MapperType::MBC1, false, false),
        0x02 => (MapperType::MBC1, true, false),
        0x03 => (MapperType::MBC1, true, true),
        // 0x0F/0x10 have a real-time clock chip; banking behaves like plain MBC3
        0x0F => (MapperType::MBC3, false, true),
        0x10 | 0x13 => (MapperType::MBC3, true, true),
        0x11 => (MapperType::MBC3, false, false),
        0x12 => (MapperType::MBC3, true, false),
        // 0x19-0x1B without rumble, 0x1C-0x1E with; the rumble motor is ignored
        0x19 | 0x1C => (MapperType::MBC5, false, false),
        0x1A | 0x1D => (MapperType::MBC5, true, false),
        0x1B | 0x1E => (MapperType::MBC5, true, true),
        _ => return None,
    };

    let features = MapperFeatures { has_ram, has_battery };
    Some((mapper_type, features))
}

use clap::Parser;
use oxboy_core::{GameBoy, SCREEN_HEIGHT, SCREEN_WIDTH};
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(about = "Game Boy / Game Boy Color emulator")]
struct Cli {
    /// Path to the ROM image; battery saves go to the same path with a .sav
    /// extension
    rom_path: String,

    /// Optional 256-byte boot ROM image; when given, execution starts at
    /// 0x0000 with the blob mapped over the cartridge
    #[arg(long = "boot-rom")]
    boot_rom: Option<String>,

    /// Integer window scale factor
    #[arg(short = 's', long = "scale", default_value_t = 4)]
    scale: u32,

    /// Run in original Game Boy mode even for color-capable cartridges
    #[arg(long = "force-dmg", default_value_t = false)]
    force_dmg: bool,
}

// 70224 dots per frame at 4.194304 MHz, ~59.73 Hz
const FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 * 70_224 / 4_194_304);

#[derive(Debug, Clone, Copy)]
enum Button {
    Action(u8),
    Direction(u8),
}

fn button_for_keycode(keycode: Keycode) -> Option<Button> {
    let button = match keycode {
        Keycode::Z => Button::Action(0x01),      // A
        Keycode::X => Button::Action(0x02),      // B
        Keycode::RShift => Button::Action(0x04), // Select
        Keycode::Return => Button::Action(0x08), // Start
        Keycode::Right => Button::Direction(0x01),
        Keycode::Left => Button::Direction(0x02),
        Keycode::Up => Button::Direction(0x04),
        Keycode::Down => Button::Direction(0x08),
        _ => return None,
    };
    Some(button)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Cli::parse();

    let rom = fs::read(&args.rom_path)?;
    let sav_path = Path::new(&args.rom_path).with_extension("sav");

    let mut game_boy = GameBoy::new(rom, Some(sav_path), args.force_dmg)?;

    if let Some(boot_rom_path) = &args.boot_rom {
        let boot_rom_bytes = fs::read(boot_rom_path)?;
        let boot_rom: [u8; 256] =
            boot_rom_bytes.try_into().map_err(|_| "boot ROM must be exactly 256 bytes")?;
        game_boy = game_boy.with_boot_rom(boot_rom);
    }

    let window_title = format!(
        "oxboy - {} ({})",
        game_boy.cartridge().title(),
        game_boy.cartridge().mapper_description()
    );

    let sdl = sdl2::init()?;
    let video = sdl.video()?;

    let window = video
        .window(
            &window_title,
            SCREEN_WIDTH as u32 * args.scale,
            SCREEN_HEIGHT as u32 * args.scale,
        )
        .position_centered()
        .build()?;

    let mut canvas = window.into_canvas().build()?;
    let texture_creator = canvas.texture_creator();
    let mut texture = texture_creator.create_texture_streaming(
        PixelFormatEnum::ARGB8888,
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    )?;

    let mut event_pump = sdl.event_pump()?;

    let mut action_mask: u8 = 0x00;
    let mut direction_mask: u8 = 0x00;

    let mut rendered_frames: u64 = 0;
    let mut next_frame_time = Instant::now() + FRAME_DURATION;

    'running: loop {
        game_boy.step()?;

        let Some(frame) = game_boy.poll_frame() else { continue };

        texture.with_lock(None, |pixels, pitch| {
            for (row_index, row) in frame.iter().enumerate() {
                for (col_index, &argb) in row.iter().enumerate() {
                    let start = row_index * pitch + 4 * col_index;
                    pixels[start..start + 4].copy_from_slice(&argb.to_ne_bytes());
                }
            }
        })?;

        canvas.clear();
        canvas.copy(&texture, None, None)?;
        canvas.present();

        rendered_frames += 1;
        if rendered_frames % 60 == 0 {
            if let Err(err) = game_boy.persist_cartridge_ram() {
                log::error!("error writing cartridge RAM to sav file: {err}");
            }
        }

        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } | Event::KeyDown { keycode: Some(Keycode::Escape), .. } => {
                    break 'running;
                }
                Event::KeyDown { keycode: Some(keycode), .. } => {
                    match button_for_keycode(keycode) {
                        Some(Button::Action(bit)) => action_mask |= bit,
                        Some(Button::Direction(bit)) => direction_mask |= bit,
                        None => {}
                    }
                    game_boy.set_input(action_mask, direction_mask);
                }
                Event::KeyUp { keycode: Some(keycode), .. } => {
                    match button_for_keycode(keycode) {
                        Some(Button::Action(bit)) => action_mask &= !bit,
                        Some(Button::Direction(bit)) => direction_mask &= !bit,
                        None => {}
                    }
                    game_boy.set_input(action_mask, direction_mask);
                }
                _ => {}
            }
        }

        let now = Instant::now();
        if next_frame_time > now {
            std::thread::sleep(next_frame_time - now);
        }
        next_frame_time += FRAME_DURATION;
    }

    game_boy.persist_cartridge_ram()?;

    Ok(())
}

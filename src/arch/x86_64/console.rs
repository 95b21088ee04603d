//! Legacy VGA text-mode console (§6 external interface): 0xB8000, 80x25,
//! 16-color attribute byte. This is the kernel's visible screen output;
//! [`crate::klog`]/serial remain the durable log, this is for the
//! panic banner and early boot messages a human watching the VM sees.

use spin::Mutex;
use volatile::Volatile;

const VGA_WIDTH: usize = 80;
const VGA_HEIGHT: usize = 25;
const VGA_BUFFER_ADDR: usize = 0xB8000;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attribute(u8);

impl Attribute {
    const fn new(fg: Color, bg: Color) -> Self {
        Self((bg as u8) << 4 | (fg as u8))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Glyph {
    ascii: u8,
    attribute: u8,
}

#[repr(transparent)]
struct Buffer {
    chars: [[Volatile<Glyph>; VGA_WIDTH]; VGA_HEIGHT],
}

struct Writer {
    column: usize,
    row: usize,
    attribute: Attribute,
    buffer: &'static mut Buffer,
}

impl Writer {
    fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.newline(),
            byte => {
                if self.column >= VGA_WIDTH {
                    self.newline();
                }
                let glyph = Glyph { ascii: byte, attribute: self.attribute.0 };
                self.buffer.chars[self.row][self.column].write(glyph);
                self.column += 1;
            }
        }
    }

    fn newline(&mut self) {
        self.column = 0;
        if self.row + 1 < VGA_HEIGHT {
            self.row += 1;
        } else {
            self.scroll();
        }
    }

    fn scroll(&mut self) {
        for row in 1..VGA_HEIGHT {
            for col in 0..VGA_WIDTH {
                let glyph = self.buffer.chars[row][col].read();
                self.buffer.chars[row - 1][col].write(glyph);
            }
        }
        self.clear_row(VGA_HEIGHT - 1);
    }

    fn clear_row(&mut self, row: usize) {
        let blank = Glyph { ascii: b' ', attribute: self.attribute.0 };
        for col in 0..VGA_WIDTH {
            self.buffer.chars[row][col].write(blank);
        }
    }

    fn clear_screen(&mut self) {
        for row in 0..VGA_HEIGHT {
            self.clear_row(row);
        }
        self.row = 0;
        self.column = 0;
    }

    fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }
    }
}

impl core::fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        Writer::write_str(self, s);
        Ok(())
    }
}

// SAFETY: constructed once, guarded behind CONSOLE's mutex; the VGA
// buffer's address and geometry are fixed by the platform.
unsafe fn make_writer() -> Writer {
    Writer {
        column: 0,
        row: 0,
        attribute: Attribute::new(Color::LightGray, Color::Black),
        buffer: unsafe { &mut *(VGA_BUFFER_ADDR as *mut Buffer) },
    }
}

static CONSOLE: Mutex<Option<Writer>> = Mutex::new(None);

/// Initializes the console and clears the screen. Safe to call more than
/// once (e.g. from the panic path forcing a fresh writer).
pub fn init() {
    let mut guard = CONSOLE.lock();
    // SAFETY: see `make_writer`.
    let mut writer = unsafe { make_writer() };
    writer.clear_screen();
    *guard = Some(writer);
}

pub fn print(s: &str) {
    let mut guard = CONSOLE.lock();
    if guard.is_none() {
        // SAFETY: see `make_writer`.
        *guard = Some(unsafe { make_writer() });
    }
    if let Some(writer) = guard.as_mut() {
        writer.write_str(s);
    }
}

/// Forcibly releases the console lock. Used only by the panic handler
/// (§7): a panic inside a held console lock must not deadlock the
/// banner it is trying to print.
///
/// # Safety
/// Must only be called when the caller is certain no other context is
/// concurrently using the console (i.e. we are already fatally panicking
/// and interrupts are disabled).
pub unsafe fn force_unlock() {
    // SAFETY: forwarded to caller.
    unsafe { CONSOLE.force_unlock() };
}

#[macro_export]
macro_rules! console_print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut s: heapless::String<256> = heapless::String::new();
        let _ = write!(s, $($arg)*);
        $crate::arch::x86_64::console::print(&s);
    }};
}

#[macro_export]
macro_rules! console_println {
    () => { $crate::console_print!("\n") };
    ($fmt:expr $(, $arg:tt)*) => { $crate::console_print!(concat!($fmt, "\n") $(, $arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_packs_fg_and_bg_nibbles() {
        let attr = Attribute::new(Color::White, Color::Blue);
        assert_eq!(attr.0, (1u8 << 4) | 15);
    }

    #[test]
    fn colors_span_the_full_16_color_palette() {
        assert_eq!(Color::Black as u8, 0);
        assert_eq!(Color::White as u8, 15);
    }
}

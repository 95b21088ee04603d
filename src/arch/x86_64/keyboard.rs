//! PS/2 keyboard driver (§6 external interface): IRQ 1, data port 0x60,
//! scancode set 1. Decodes make/break codes into ASCII where possible and
//! feeds a fixed-size ring buffer that [`read_char`] drains.

use heapless::spsc::Queue;
use spin::Mutex;

use super::port::Port;

const DATA_PORT: u16 = 0x60;
const RING_CAPACITY: usize = 256;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const CAPS  = 1 << 2;
    }
}

struct KeyboardState {
    modifiers: Modifiers,
    ring: Queue<u8, RING_CAPACITY>,
}

impl KeyboardState {
    const fn new() -> Self {
        Self { modifiers: Modifiers::empty(), ring: Queue::new() }
    }
}

static STATE: Mutex<KeyboardState> = Mutex::new(KeyboardState::new());

/// Scancode set 1, unshifted, printable range (0x02..0x3A). `0` means
/// "no printable mapping" (function keys, modifiers, etc.).
const SCANCODE_SET1: [u8; 0x3A] = {
    let mut table = [0u8; 0x3A];
    let row1: &[(usize, u8)] = &[
        (0x02, b'1'), (0x03, b'2'), (0x04, b'3'), (0x05, b'4'), (0x06, b'5'),
        (0x07, b'6'), (0x08, b'7'), (0x09, b'8'), (0x0A, b'9'), (0x0B, b'0'),
        (0x0C, b'-'), (0x0D, b'='),
        (0x10, b'q'), (0x11, b'w'), (0x12, b'e'), (0x13, b'r'), (0x14, b't'),
        (0x15, b'y'), (0x16, b'u'), (0x17, b'i'), (0x18, b'o'), (0x19, b'p'),
        (0x1E, b'a'), (0x1F, b's'), (0x20, b'd'), (0x21, b'f'), (0x22, b'g'),
        (0x23, b'h'), (0x24, b'j'), (0x25, b'k'), (0x26, b'l'),
        (0x2C, b'z'), (0x2D, b'x'), (0x2E, b'c'), (0x2F, b'v'), (0x30, b'b'),
        (0x31, b'n'), (0x32, b'm'),
        (0x39, b' '), (0x1C, b'\n'),
    ];
    let mut i = 0;
    while i < row1.len() {
        let (code, ch) = row1[i];
        table[code] = ch;
        i += 1;
    }
    table
};

const SHIFT_PRESS: u8 = 0x2A;
const SHIFT_RELEASE: u8 = 0xAA;
const RSHIFT_PRESS: u8 = 0x36;
const RSHIFT_RELEASE: u8 = 0xB6;
const CTRL_PRESS: u8 = 0x1D;
const CTRL_RELEASE: u8 = 0x9D;
const CAPSLOCK_PRESS: u8 = 0x3A;
const BREAK_BIT: u8 = 0x80;

/// Reads and decodes one scancode from IRQ 1 context, pushing any
/// printable result onto the ring buffer. Called from the IRQ 1 handler.
pub fn on_irq() {
    let mut port: Port<u8> = Port::new(DATA_PORT);
    // SAFETY: called only from the IRQ 1 handler, after the controller
    // has signaled data is ready.
    let scancode = unsafe { port.read() };

    let mut state = STATE.lock();
    match scancode {
        SHIFT_PRESS | RSHIFT_PRESS => state.modifiers.insert(Modifiers::SHIFT),
        SHIFT_RELEASE | RSHIFT_RELEASE => state.modifiers.remove(Modifiers::SHIFT),
        CTRL_PRESS => state.modifiers.insert(Modifiers::CTRL),
        CTRL_RELEASE => state.modifiers.remove(Modifiers::CTRL),
        CAPSLOCK_PRESS => state.modifiers.toggle(Modifiers::CAPS),
        code if code & BREAK_BIT == 0 => {
            if let Some(ch) = decode(code, state.modifiers) {
                let _ = state.ring.enqueue(ch);
            }
        }
        _ => {}
    }
}

fn decode(scancode: u8, modifiers: Modifiers) -> Option<u8> {
    let base = *SCANCODE_SET1.get(scancode as usize)?;
    if base == 0 {
        return None;
    }
    let upper = modifiers.contains(Modifiers::SHIFT) ^ modifiers.contains(Modifiers::CAPS);
    if upper && base.is_ascii_lowercase() {
        Some(base.to_ascii_uppercase())
    } else {
        Some(base)
    }
}

/// Pops the oldest buffered character, if any.
pub fn read_char() -> Option<u8> {
    STATE.lock().ring.dequeue()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lowercase_letter_without_modifiers() {
        assert_eq!(decode(0x1E, Modifiers::empty()), Some(b'a'));
    }

    #[test]
    fn shift_uppercases_letters() {
        assert_eq!(decode(0x1E, Modifiers::SHIFT), Some(b'A'));
    }

    #[test]
    fn caps_lock_alone_uppercases_letters() {
        assert_eq!(decode(0x1E, Modifiers::CAPS), Some(b'A'));
    }

    #[test]
    fn shift_and_caps_together_cancel_out() {
        assert_eq!(decode(0x1E, Modifiers::SHIFT | Modifiers::CAPS), Some(b'a'));
    }

    #[test]
    fn digit_row_ignores_modifiers_in_this_minimal_table() {
        assert_eq!(decode(0x02, Modifiers::empty()), Some(b'1'));
    }

    #[test]
    fn unmapped_scancode_yields_none() {
        assert_eq!(decode(0x01, Modifiers::empty()), None); // Escape
    }
}

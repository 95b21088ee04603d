//! Programmable Interval Timer (component H / §6 Timer). Drives IRQ 0 at
//! a configured frequency; `sched_tick` is called from the IRQ 0 handler
//! once it is registered by the scheduler (see [`crate::task::scheduler`]).

use super::port::Port;

const PIT_FREQUENCY_HZ: u32 = 1_193_182;
const CHANNEL0_DATA: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 2 (rate generator), binary.
const COMMAND_CHANNEL0_SQUARE_WAVE: u8 = 0b0011_0100;

/// Programs channel 0 to fire at `freq_hz`. A request for 0 Hz is clamped
/// to the minimum representable rate (~18.2 Hz, divisor 0 meaning the
/// full 65536 count, per §6/§8 boundary behavior).
pub fn init(freq_hz: u32) {
    let divisor = divisor_for(freq_hz);

    let mut cmd: Port<u8> = Port::new(COMMAND);
    let mut data: Port<u8> = Port::new(CHANNEL0_DATA);

    // SAFETY: standard PIT programming sequence, ports are fixed.
    unsafe {
        cmd.write(COMMAND_CHANNEL0_SQUARE_WAVE);
        data.write((divisor & 0xFF) as u8);
        data.write((divisor >> 8) as u8);
    }
}

/// Computes the 16-bit reload divisor for a requested frequency. A
/// request of 0 is treated as "use the lowest rate", which is the
/// divisor value 0 (interpreted by the PIT as 65536).
fn divisor_for(freq_hz: u32) -> u16 {
    if freq_hz == 0 {
        return 0;
    }
    let divisor = PIT_FREQUENCY_HZ / freq_hz;
    if divisor == 0 {
        1
    } else {
        divisor.min(u16::MAX as u32) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_zero_clamps_to_full_count_divisor() {
        assert_eq!(divisor_for(0), 0);
    }

    #[test]
    fn hundred_hz_divisor_matches_spec_formula() {
        assert_eq!(divisor_for(100), PIT_FREQUENCY_HZ / 100);
    }

    #[test]
    fn minimum_pit_rate_is_about_18_hz() {
        // 1193182 / 65536 ~= 18.2 Hz; a divisor of 0 (== 65536) yields it.
        let rate = PIT_FREQUENCY_HZ as f64 / 65536.0;
        assert!((rate - 18.2).abs() < 0.1);
    }
}

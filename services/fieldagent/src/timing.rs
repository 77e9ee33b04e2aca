//! Field-side RTU timing (spec.md §4.10, §5): the two-stage read
//! timeout used to frame a reply with no explicit length prefix.

use std::time::Duration;

/// Default wait for the first byte of a reply.
pub const FIRST_BYTE_TIMEOUT: Duration = Duration::from_millis(500);

/// Inter-symbol (3.5-character) silence that ends a frame, derived
/// from the UART's byte shape. Floors at 1 ms per spec.md §4.10.
pub fn inter_symbol_timeout(baud: u32, data_bits: u8, parity_bit: bool, stop_bits: u8) -> Duration {
    let bits = data_bits as u64 + u64::from(parity_bit) + stop_bits as u64;
    let millis = (1500 * bits).div_ceil(baud as u64).max(1);
    Duration::from_millis(millis)
}

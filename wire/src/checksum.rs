//! The Internet checksum (RFC 1071) used by the IPv4 and ICMP headers.

/// Compute the Internet checksum over `data`.
///
/// The covered bytes are read as big-endian 16-bit words, an odd trailing
/// byte acting as the high half of a zero-padded word.  Carries are folded
/// back into the low 16 bits and the result is complemented.
///
/// The checksum slot inside `data` must already be zeroed when computing a
/// value to store.  Recomputing over a buffer whose checksum slot is filled
/// in returns `0` iff the buffer verifies.
pub fn internet_checksum(data: &[u8]) -> u16 {
    // A 64-bit accumulator cannot overflow for any frame-sized input, so the
    // carries only need folding once at the end.
    let mut acc: u64 = 0;
    for pair in data.chunks(2) {
        let lo = pair.get(1).copied().unwrap_or(0);
        acc += u64::from(u16::from_be_bytes([pair[0], lo]));
    }
    while acc > 0xFFFF {
        acc = (acc & 0xFFFF) + (acc >> 16);
    }
    !(acc as u16)
}

/// `true` if `data` (checksum slot in place) sums to the fixed point.
#[inline]
pub fn verifies(data: &[u8]) -> bool {
    internet_checksum(data) == 0
}

//! CRC-8 as used on the wire.
//!
//! Polynomial 0x07, initial value 0x00, no reflection, no final XOR
//! (the "CRC-8" entry of the common CRC catalogues).

const POLY: u8 = 0x07;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Continue a CRC-8 computation from `seed` over `bytes`.
///
/// Start with a seed of 0. Feeding data in pieces gives the same result as
/// feeding it all at once: `crc8(crc8(0, a), b) == crc8(0, a ++ b)`.
pub fn crc8(seed: u8, bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(seed, |crc, &byte| TABLE[usize::from(crc ^ byte)])
}

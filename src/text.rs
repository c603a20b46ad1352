//! Z-string codec: packed 5-bit characters under three alphabets, with
//! abbreviation expansion on the decode side and the fixed 4-byte
//! encoding used for dictionary lookup on the encode side.

use log::trace;

use crate::error::RuntimeError;
use crate::io::ZOutput;
use crate::memory::Memory;

/// The three v3 alphabets, indexed by z-char minus 6.
pub const ALPHABET_A0: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
pub const ALPHABET_A1: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const ALPHABET_A2: &[u8] = b" \n0123456789.,!?_#'\"/\\-:()";

const PAD: u8 = 5;

/// Decode the Z-string starting at `addr`, feeding each character to
/// `out`. Abbreviation references decode their target inline. Returns
/// the address just past the word with the stop bit.
pub fn decode_string(
    mem: &Memory,
    addr: u32,
    abbrev_table: u32,
    out: &mut dyn ZOutput,
) -> Result<u32, RuntimeError> {
    let mut zchars = Vec::new();
    let mut at = addr;
    loop {
        let word = mem.read_word(at)?;
        at += 2;
        zchars.push(((word >> 10) & 0x1F) as u8);
        zchars.push(((word >> 5) & 0x1F) as u8);
        zchars.push((word & 0x1F) as u8);
        if word & 0x8000 != 0 {
            break;
        }
    }
    trace!("z-string at {addr:05x}: {} z-chars", zchars.len());

    let mut alphabet = 0;
    let mut i = 0;
    while i < zchars.len() {
        let zc = zchars[i];
        i += 1;
        match zc {
            0 => out.write_zscii(32),
            1..=3 => {
                // Abbreviation: the next z-char picks the entry within
                // the bank. A padded-out escape at the very end of the
                // string has no index and is ignored.
                if i >= zchars.len() {
                    break;
                }
                let index = zchars[i];
                i += 1;
                let entry = abbrev_table + 2 * (32 * (zc as u32 - 1) + index as u32);
                let packed = mem.read_word(entry)?;
                decode_string(mem, packed as u32 * 2, abbrev_table, out)?;
                alphabet = 0;
            }
            4 => alphabet = 1,
            5 => alphabet = 2,
            6 if alphabet == 2 => {
                // Ten-bit ZSCII escape: top five bits, then bottom five.
                if i + 1 >= zchars.len() {
                    break;
                }
                let code = ((zchars[i] as u16) << 5) | zchars[i + 1] as u16;
                i += 2;
                out.write_zscii(code);
                alphabet = 0;
            }
            7 if alphabet == 2 => {
                out.write_zscii(13);
                alphabet = 0;
            }
            _ => {
                let table = match alphabet {
                    1 => ALPHABET_A1,
                    2 => ALPHABET_A2,
                    _ => ALPHABET_A0,
                };
                out.write_zscii(table[(zc - 6) as usize] as u16);
                alphabet = 0;
            }
        }
    }

    Ok(at)
}

fn alphabet_index(c: u8) -> Option<(usize, u8)> {
    for (alphabet, table) in [ALPHABET_A0, ALPHABET_A1, ALPHABET_A2].iter().enumerate() {
        if let Some(pos) = table.iter().position(|&b| b == c) {
            return Some((alphabet, pos as u8));
        }
    }
    None
}

/// Encode `word` as exactly 6 z-chars for dictionary search, padding
/// with 5s and silently truncating overlong input. The result is the
/// two 16-bit words concatenated, with the stop bit set on the second.
/// Abbreviations are never used on this path.
pub fn encode_word(word: &[u8]) -> u32 {
    // A shift or ZSCII chord started near slot 5 may spill past the
    // six slots; the scratch array absorbs it and packing drops the rest.
    let mut chars = [PAD; 12];
    let mut i = 0;
    let mut j = 0;
    while i < 6 {
        if j < word.len() {
            let c = word[j];
            j += 1;
            match alphabet_index(c) {
                Some((0, index)) => {
                    chars[i] = index + 6;
                    i += 1;
                }
                Some((alphabet, index)) => {
                    chars[i] = alphabet as u8 + 3;
                    chars[i + 1] = index + 6;
                    i += 2;
                }
                None => {
                    chars[i] = 5;
                    chars[i + 1] = 6;
                    chars[i + 2] = c >> 5;
                    chars[i + 3] = c & 0x1F;
                    i += 4;
                }
            }
        } else {
            chars[i] = PAD;
            i += 1;
        }
    }

    let w0 = ((chars[0] as u32) << 10) | ((chars[1] as u32) << 5) | chars[2] as u32;
    let w1 = ((chars[3] as u32) << 10) | ((chars[4] as u32) << 5) | chars[5] as u32 | 0x8000;
    (w0 << 16) | w1
}

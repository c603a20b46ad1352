use log::debug;

use crate::error::RuntimeError;
use crate::memory::Memory;

/// The story vocabulary: a small header (word separators, entry size,
/// entry count) followed by entries sorted on their 4-byte encoded key.
#[derive(Debug, Clone)]
pub struct Dictionary {
    pub separators: Vec<u8>,
    pub entry_length: u8,
    pub entry_count: u16,
    entries: u32,
}

impl Dictionary {
    pub fn new(mem: &Memory, addr: u32) -> Result<Dictionary, RuntimeError> {
        let n = mem.read_byte(addr)? as u32;
        let mut separators = Vec::with_capacity(n as usize);
        for i in 0..n {
            separators.push(mem.read_byte(addr + 1 + i)?);
        }
        let entry_length = mem.read_byte(addr + 1 + n)?;
        let entry_count = mem.read_word(addr + 2 + n)?;
        Ok(Dictionary {
            separators,
            entry_length,
            entry_count,
            entries: addr + 4 + n,
        })
    }

    /// Binary search on the sorted keys. Returns the byte address of
    /// the matching entry, or 0 when the word is not in the vocabulary.
    pub fn lookup(&self, mem: &Memory, encoded: u32) -> Result<u16, RuntimeError> {
        let mut lower: i32 = 0;
        let mut upper: i32 = self.entry_count as i32 - 1;
        while lower <= upper {
            let current = lower + (upper - lower) / 2;
            let at = self.entries + current as u32 * self.entry_length as u32;
            let key = mem.read_dword(at)?;
            if encoded < key {
                upper = current - 1;
            } else if encoded > key {
                lower = current + 1;
            } else {
                return Ok(at as u16);
            }
        }
        debug!("dictionary miss for key {encoded:08x}");
        Ok(0)
    }
}

/// Split an input line into words, returned as (offset, length) pairs.
/// Spaces delimit words; each dictionary separator is a word of its own.
pub fn tokenize(line: &[u8], separators: &[u8]) -> Vec<(usize, usize)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &c) in line.iter().enumerate() {
        if c == b' ' {
            if let Some(s) = start.take() {
                words.push((s, i - s));
            }
        } else if separators.contains(&c) {
            if let Some(s) = start.take() {
                words.push((s, i - s));
            }
            words.push((i, 1));
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push((s, line.len() - s));
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text;

    /// Lay a dictionary out in memory from a word list and hand back
    /// (memory, dictionary address).
    fn build(words: &[&str]) -> (Memory, u32) {
        let addr = 0x200usize;
        let mut image = vec![0u8; 0x800];
        image[0x0E] = 0x07; // everything writable while we build

        let mut keys: Vec<u32> = words.iter().map(|w| text::encode_word(w.as_bytes())).collect();
        keys.sort_unstable();

        image[addr] = 2;
        image[addr + 1] = b',';
        image[addr + 2] = b'.';
        image[addr + 3] = 7; // entry length: 4-byte key + 3 data bytes
        image[addr + 4] = 0;
        image[addr + 5] = keys.len() as u8;
        let mut at = addr + 6;
        for key in &keys {
            image[at..at + 4].copy_from_slice(&key.to_be_bytes());
            at += 7;
        }
        (Memory::new(image), addr as u32)
    }

    #[test]
    fn parses_the_header() {
        let (mem, addr) = build(&["look", "take", "west"]);
        let dict = Dictionary::new(&mem, addr).unwrap();
        assert_eq!(dict.separators, vec![b',', b'.']);
        assert_eq!(dict.entry_length, 7);
        assert_eq!(dict.entry_count, 3);
    }

    #[test]
    fn lookup_agrees_with_linear_scan() {
        let words = ["go", "lamp", "look", "mailbox", "take", "west", "xyzzy"];
        let (mem, addr) = build(&words);
        let dict = Dictionary::new(&mem, addr).unwrap();

        for probe in ["go", "lamp", "look", "mailbox", "take", "west", "xyzzy", "grue"] {
            let key = text::encode_word(probe.as_bytes());
            let found = dict.lookup(&mem, key).unwrap();

            let mut expected = 0u16;
            for i in 0..dict.entry_count {
                let at = addr + 6 + i as u32 * 7;
                if mem.read_dword(at).unwrap() == key {
                    expected = at as u16;
                    break;
                }
            }
            assert_eq!(found, expected, "probe {probe}");
        }
    }

    #[test]
    fn miss_returns_zero() {
        let (mem, addr) = build(&["look"]);
        let dict = Dictionary::new(&mem, addr).unwrap();
        let key = text::encode_word(b"grue");
        assert_eq!(dict.lookup(&mem, key).unwrap(), 0);
    }

    #[test]
    fn empty_dictionary_never_matches() {
        let (mem, addr) = build(&[]);
        let dict = Dictionary::new(&mem, addr).unwrap();
        assert_eq!(dict.lookup(&mem, 0).unwrap(), 0);
    }

    #[test]
    fn tokenize_splits_on_spaces() {
        let words = tokenize(b"go  north", &[]);
        assert_eq!(words, vec![(0, 2), (4, 5)]);
    }

    #[test]
    fn tokenize_makes_separators_their_own_words() {
        let words = tokenize(b"take all, lamp", &[b',']);
        assert_eq!(words, vec![(0, 4), (5, 3), (8, 1), (10, 4)]);
    }

    #[test]
    fn tokenize_handles_edges() {
        assert!(tokenize(b"", &[]).is_empty());
        assert!(tokenize(b"   ", &[]).is_empty());
        assert_eq!(tokenize(b",", &[b',']), vec![(0, 1)]);
        assert_eq!(tokenize(b"look", &[]), vec![(0, 4)]);
    }
}

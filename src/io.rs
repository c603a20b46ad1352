//! Input and output collaborators. The machine never talks to the
//! terminal directly; it goes through these traits so tests can swap in
//! scripted lines and a capture buffer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use crate::error::{ErrorCode, RuntimeError};

/// Sink for story output, one ZSCII code at a time. 13 is newline,
/// 32..=126 are ASCII literals, everything else is dropped.
pub trait ZOutput {
    fn write_zscii(&mut self, ch: u16);
}

/// Blocking line input. Implementations strip any trailing CR/LF;
/// lowercasing is the machine's job.
pub trait ZInput {
    fn read_line(&mut self) -> Result<String, RuntimeError>;
}

pub struct StdoutOutput;

impl ZOutput for StdoutOutput {
    fn write_zscii(&mut self, ch: u16) {
        match ch {
            13 => println!(),
            32..=126 => print!("{}", (ch as u8) as char),
            _ => {}
        }
    }
}

pub struct StdinInput;

impl ZInput for StdinInput {
    fn read_line(&mut self) -> Result<String, RuntimeError> {
        // Make sure any pending prompt text is visible before blocking.
        io::stdout().flush().ok();

        let mut line = String::new();
        let n = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| RuntimeError::new(ErrorCode::Io, format!("stdin: {e}")))?;
        if n == 0 {
            return Err(RuntimeError::new(ErrorCode::Io, "end of input"));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}

/// Test sink that shares its buffer with the test that created it.
pub struct CaptureOutput {
    buffer: Rc<RefCell<String>>,
}

impl CaptureOutput {
    pub fn new() -> (CaptureOutput, Rc<RefCell<String>>) {
        let buffer = Rc::new(RefCell::new(String::new()));
        (
            CaptureOutput {
                buffer: Rc::clone(&buffer),
            },
            buffer,
        )
    }
}

impl ZOutput for CaptureOutput {
    fn write_zscii(&mut self, ch: u16) {
        match ch {
            13 => self.buffer.borrow_mut().push('\n'),
            32..=126 => self.buffer.borrow_mut().push((ch as u8) as char),
            _ => {}
        }
    }
}

/// Canned input lines for driving `sread` in tests.
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new(lines: &[&str]) -> ScriptedInput {
        ScriptedInput {
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ZInput for ScriptedInput {
    fn read_line(&mut self) -> Result<String, RuntimeError> {
        self.lines
            .pop_front()
            .ok_or_else(|| RuntimeError::new(ErrorCode::Io, "scripted input exhausted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_filters_zscii() {
        let (mut out, buffer) = CaptureOutput::new();
        for &ch in &[72u16, 105, 13, 7, 1000, 33] {
            out.write_zscii(ch);
        }
        assert_eq!(*buffer.borrow(), "Hi\n!");
    }

    #[test]
    fn scripted_input_drains_then_fails() {
        let mut input = ScriptedInput::new(&["look", "quit"]);
        assert_eq!(input.read_line().unwrap(), "look");
        assert_eq!(input.read_line().unwrap(), "quit");
        assert_eq!(input.read_line().unwrap_err().code(), ErrorCode::Io);
    }
}

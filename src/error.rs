use std::fmt;

/// Classification of unrecoverable interpreter failures. Anything a
/// running story can observe (dictionary miss, missing property read,
/// call to address 0) is handled inline and never reaches this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AccessViolation,
    StackOverflow,
    StackUnderflow,
    InvalidGlobal,
    InvalidObject,
    AttributeOutOfBounds,
    IllegalOpcode,
    DivideByZero,
    BadPropertyWidth,
    PropertyNotFound,
    UnsupportedVersion,
    Io,
}

/// A fatal error. The machine stamps the address of the failing
/// instruction on the way out so the diagnostic names a PC.
pub struct RuntimeError {
    code: ErrorCode,
    message: String,
    pc: Option<u32>,
}

impl RuntimeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            code,
            message: message.into(),
            pc: None,
        }
    }

    /// Attach the failing PC unless an inner call already did.
    pub fn at(mut self, pc: u32) -> RuntimeError {
        if self.pc.is_none() {
            self.pc = Some(pc);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:?}) {}", self.code, self.message)?;
        if let Some(pc) = self.pc {
            write!(f, " at pc {pc:05x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RuntimeError {{ code: {:?}, message: {}, pc: {:?} }}",
            self.code, self.message, self.pc
        )
    }
}

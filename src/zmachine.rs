use log::{debug, info};

use crate::dictionary::{self, Dictionary};
use crate::error::{ErrorCode, RuntimeError};
use crate::header::Header;
use crate::io::{ZInput, ZOutput};
use crate::memory::Memory;
use crate::stack::Stack;
use crate::text;
use crate::zrand::ZRand;

// Operand type tags, two bits each in the encoding.
const OPERAND_LARGE: u8 = 0x0;
const OPERAND_SMALL: u8 = 0x1;
const OPERAND_VARIABLE: u8 = 0x2;
const OPERAND_OMITTED: u8 = 0x3;

/// The Z-machine proper: the story image, the unified stack, the
/// program counter and the collaborators the story talks through.
/// Instructions are decoded in place; every fetch advances `pc`.
pub struct ZMachine {
    pub mem: Memory,
    pub header: Header,
    pub stack: Stack,
    pub rng: ZRand,
    pub input: Box<dyn ZInput>,
    pub output: Box<dyn ZOutput>,
    pub pc: u32,
    pub done: bool,
}

impl ZMachine {
    pub fn new(
        bytes: Vec<u8>,
        rng: ZRand,
        input: Box<dyn ZInput>,
        output: Box<dyn ZOutput>,
    ) -> Result<ZMachine, RuntimeError> {
        let header = Header::new(&bytes)?;
        let pc = header.initial_pc as u32;
        Ok(ZMachine {
            mem: Memory::new(bytes),
            header,
            stack: Stack::new(),
            rng,
            input,
            output,
            pc,
            done: false,
        })
    }

    /// Run until the story executes `quit` or something fatal happens.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.run_with_limit(None)
    }

    pub fn run_with_limit(&mut self, max_instructions: Option<u64>) -> Result<(), RuntimeError> {
        info!("starting execution at pc {:05x}", self.pc);
        let mut executed: u64 = 0;
        while !self.done {
            self.step()?;
            executed += 1;
            if let Some(limit) = max_instructions {
                if executed >= limit {
                    info!("stopping after {executed} instructions");
                    break;
                }
            }
        }
        Ok(())
    }

    /// One fetch + decode + execute. Fatal errors get stamped with the
    /// address of the instruction that raised them.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        let start = self.pc;
        self.dispatch().map_err(|e| e.at(start))
    }

    fn dispatch(&mut self) -> Result<(), RuntimeError> {
        // The top two bits of the opcode byte pick the form.
        let opcode = self.mem.read_byte(self.pc)?;
        match (opcode >> 6) & 0x3 {
            0x2 => self.interpret_short(),
            0x3 => self.interpret_variable(),
            _ => self.interpret_long(),
        }
    }

    // ---- instruction fetch ----

    fn fetch_byte(&mut self) -> Result<u8, RuntimeError> {
        let value = self.mem.read_byte(self.pc)?;
        self.pc += 1;
        Ok(value)
    }

    fn fetch_word(&mut self) -> Result<u16, RuntimeError> {
        let value = self.mem.read_word(self.pc)?;
        self.pc += 2;
        Ok(value)
    }

    /// Short form: bits 4-5 hold the single operand type; `omitted`
    /// makes it a 0OP. Opcode number in the low 4 bits.
    fn interpret_short(&mut self) -> Result<(), RuntimeError> {
        let opcode = self.fetch_byte()?;
        let op_type = (opcode >> 4) & 0x3;
        let number = opcode & 0x0F;
        if op_type == OPERAND_OMITTED {
            self.exec_0op(number)
        } else {
            let value = self.operand(op_type)?;
            self.exec_1op(number, value)
        }
    }

    /// Long form: always 2OP. Bit 6 types operand 0, bit 5 operand 1;
    /// clear means small constant, set means variable.
    fn interpret_long(&mut self) -> Result<(), RuntimeError> {
        let opcode = self.fetch_byte()?;
        let number = opcode & 0x1F;
        let type0 = ((opcode >> 6) & 0x1) + 1;
        let type1 = ((opcode >> 5) & 0x1) + 1;
        let mut args = [0u16; 4];
        args[0] = self.operand(type0)?;
        args[1] = self.operand(type1)?;
        self.exec_2op(number, &args, 2)
    }

    /// Variable form: bit 5 splits 2OP from VAR, then a byte of four
    /// 2-bit operand types, most significant pair first.
    fn interpret_variable(&mut self) -> Result<(), RuntimeError> {
        let opcode = self.fetch_byte()?;
        let number = opcode & 0x1F;
        let two_op = (opcode >> 5) & 0x1 == 0;
        let types = self.fetch_byte()?;
        let mut args = [0u16; 4];
        let count = self.gather_operands(types, &mut args)?;
        if two_op {
            self.exec_2op(number, &args, count)
        } else {
            self.exec_var(number, &args, count)
        }
    }

    /// Materialize operands until an `omitted` type appears.
    fn gather_operands(
        &mut self,
        types: u8,
        args: &mut [u16; 4],
    ) -> Result<usize, RuntimeError> {
        let mut count = 0;
        for slot in 0..4 {
            let op_type = (types >> (6 - 2 * slot)) & 0x3;
            if op_type == OPERAND_OMITTED {
                break;
            }
            args[count] = self.operand(op_type)?;
            count += 1;
        }
        Ok(count)
    }

    fn operand(&mut self, op_type: u8) -> Result<u16, RuntimeError> {
        match op_type {
            OPERAND_LARGE => self.fetch_word(),
            OPERAND_SMALL => Ok(self.fetch_byte()? as u16),
            OPERAND_VARIABLE => {
                let var = self.fetch_byte()?;
                self.variable_value(var)
            }
            _ => Err(RuntimeError::new(
                ErrorCode::IllegalOpcode,
                "cannot materialize an omitted operand",
            )),
        }
    }

    // ---- the variable namespace ----

    /// Variable 0 is the stack top (reading pops), 1..=15 the locals of
    /// the current frame, 16..=255 the globals.
    fn variable_value(&mut self, var: u8) -> Result<u16, RuntimeError> {
        match var {
            0x00 => self.stack.pop(),
            0x01..=0x0F => self.stack.local((var - 1) as usize),
            _ => self.read_global(var),
        }
    }

    /// Writing variable 0 pushes.
    fn store_variable(&mut self, var: u8, value: u16) -> Result<(), RuntimeError> {
        match var {
            0x00 => self.stack.push(value),
            0x01..=0x0F => self.stack.set_local((var - 1) as usize, value),
            _ => self.write_global(var, value),
        }
    }

    pub fn read_global(&self, var: u8) -> Result<u16, RuntimeError> {
        if var < 0x10 {
            return Err(RuntimeError::new(
                ErrorCode::InvalidGlobal,
                format!("variable {var:02x} is not a global"),
            ));
        }
        let addr = self.header.global_variables as u32 + 2 * (var as u32 - 0x10);
        self.mem.read_word(addr)
    }

    pub fn write_global(&mut self, var: u8, value: u16) -> Result<(), RuntimeError> {
        if var < 0x10 {
            return Err(RuntimeError::new(
                ErrorCode::InvalidGlobal,
                format!("variable {var:02x} is not a global"),
            ));
        }
        let addr = self.header.global_variables as u32 + 2 * (var as u32 - 0x10);
        self.mem.write_word(addr, value)
    }

    /// In-place adjust for `inc`, `dec`, `inc_chk`, `dec_chk`. Aimed at
    /// variable 0 it rewrites the stack top rather than pop/push.
    fn add_to_variable(&mut self, var: u16, delta: i16) -> Result<u16, RuntimeError> {
        match var {
            0 => self.stack.add_to_top(delta),
            1..=0x0F => {
                let index = (var - 1) as usize;
                let value = self.stack.local(index)?.wrapping_add(delta as u16);
                self.stack.set_local(index, value)?;
                Ok(value)
            }
            _ => {
                let value = self.read_global(var as u8)?.wrapping_add(delta as u16);
                self.write_global(var as u8, value)?;
                Ok(value)
            }
        }
    }

    // ---- store, branch, call, return ----

    /// Store-result opcodes consume one more byte naming the
    /// destination variable.
    fn store_result(&mut self, value: u16) -> Result<(), RuntimeError> {
        let var = self.fetch_byte()?;
        self.store_variable(var, value)
    }

    /// Return from the current routine. The caller's store byte sits at
    /// the restored PC and receives the return value.
    fn do_return(&mut self, value: u16) -> Result<(), RuntimeError> {
        self.pc = self.stack.restore_frame()?;
        self.store_result(value)
    }

    /// Resolve a branch descriptor and take the branch if `condition`
    /// matches its polarity. Short-form offsets 0 and 1 mean "return
    /// false" and "return true" instead of jumping.
    fn branch(&mut self, condition: bool) -> Result<(), RuntimeError> {
        let first = self.fetch_byte()?;
        let branch_on_true = first & 0x80 != 0;

        let mut return_value = None;
        let offset: i32 = if first & 0x40 != 0 {
            let offset = (first & 0x3F) as i32;
            if offset <= 1 {
                return_value = Some(offset as u16);
            }
            offset
        } else {
            let second = self.fetch_byte()? as u16;
            let mut high = (first & 0x3F) as u16;
            // Sign-extend the 14-bit offset.
            if high & 0x20 != 0 {
                high |= 0xC0;
            }
            ((high << 8) | second) as i16 as i32
        };

        if condition == branch_on_true {
            match return_value {
                Some(value) => self.do_return(value)?,
                None => self.pc = (self.pc as i64 + offset as i64 - 2) as u32,
            }
        }
        Ok(())
    }

    /// `call routine arg...`. The return PC is pushed high half first
    /// so that restoring pops low then high. Locals take their values
    /// from the routine header, then the leading ones are overwritten
    /// by whatever arguments were supplied.
    fn do_call(&mut self, args: &[u16; 4], count: usize) -> Result<(), RuntimeError> {
        if count == 0 {
            return Err(RuntimeError::new(
                ErrorCode::IllegalOpcode,
                "call without a routine operand",
            ));
        }
        self.stack.push((self.pc >> 16) as u16)?;
        self.stack.push((self.pc & 0xFFFF) as u16)?;
        self.pc = args[0] as u32 * 2;
        self.stack.save_frame()?;

        // A call to packed address 0 just returns false; going through
        // the normal return path consumes the store byte.
        if self.pc == 0 {
            return self.do_return(0);
        }
        debug!("call {:05x} with {} args", self.pc, count - 1);

        let num_locals = self.fetch_byte()?;
        let mut remaining = count - 1;
        for i in 0..num_locals as usize {
            let mut value = self.fetch_word()?;
            if remaining > 0 {
                value = args[i + 1];
                remaining -= 1;
            }
            self.stack.push(value)?;
        }
        Ok(())
    }

    // ---- the opcode tables ----

    fn exec_0op(&mut self, number: u8) -> Result<(), RuntimeError> {
        match number {
            0x00 => self.do_return(1), // rtrue
            0x01 => self.do_return(0), // rfalse
            0x02 => {
                // print: the Z-string is inline, pc skips past it
                self.pc = text::decode_string(
                    &self.mem,
                    self.pc,
                    self.header.abbrev_table as u32,
                    &mut *self.output,
                )?;
                Ok(())
            }
            0x03 => {
                // print_ret: print, newline, return true
                self.pc = text::decode_string(
                    &self.mem,
                    self.pc,
                    self.header.abbrev_table as u32,
                    &mut *self.output,
                )?;
                self.output.write_zscii(13);
                self.do_return(1)
            }
            0x08 => {
                // ret_popped
                let value = self.stack.pop()?;
                self.do_return(value)
            }
            0x09 => {
                // pop
                self.stack.pop()?;
                Ok(())
            }
            0x0A => {
                // quit
                info!("story executed quit");
                self.done = true;
                Ok(())
            }
            0x0B => {
                // new_line
                self.output.write_zscii(13);
                Ok(())
            }
            _ => Err(illegal("0OP", number)),
        }
    }

    fn exec_1op(&mut self, number: u8, arg: u16) -> Result<(), RuntimeError> {
        match number {
            0x00 => self.branch(arg == 0), // jz
            0x01 => {
                // get_sibling: store, branch when non-zero
                let sibling = self.sibling_of(arg)?;
                self.store_result(sibling)?;
                self.branch(sibling != 0)
            }
            0x02 => {
                // get_child: store, branch when non-zero
                let child = self.child_of(arg)?;
                self.store_result(child)?;
                self.branch(child != 0)
            }
            0x03 => {
                let parent = self.parent_of(arg)?;
                self.store_result(parent)
            }
            0x04 => {
                // get_prop_len: the size byte sits just before the data
                let len = if arg == 0 {
                    0
                } else {
                    (self.mem.read_byte(arg as u32 - 1)? >> 5) as u16 + 1
                };
                self.store_result(len)
            }
            0x05 => {
                // inc
                self.add_to_variable(arg, 1)?;
                Ok(())
            }
            0x06 => {
                // dec
                self.add_to_variable(arg, -1)?;
                Ok(())
            }
            0x07 => {
                // print_addr
                text::decode_string(
                    &self.mem,
                    arg as u32,
                    self.header.abbrev_table as u32,
                    &mut *self.output,
                )?;
                Ok(())
            }
            0x09 => self.unlink_object(arg), // remove_obj
            0x0A => {
                // print_obj: the short name lives in the property block
                let addr = self.object_name_addr(arg)?;
                text::decode_string(
                    &self.mem,
                    addr,
                    self.header.abbrev_table as u32,
                    &mut *self.output,
                )?;
                Ok(())
            }
            0x0B => self.do_return(arg), // ret
            0x0C => {
                // jmp: unconditional, same minus-2 bias as branches
                self.pc = (self.pc as i64 + (arg as i16) as i64 - 2) as u32;
                Ok(())
            }
            0x0D => {
                // print_paddr
                text::decode_string(
                    &self.mem,
                    arg as u32 * 2,
                    self.header.abbrev_table as u32,
                    &mut *self.output,
                )?;
                Ok(())
            }
            0x0E => self.store_result(arg), // load
            _ => Err(illegal("1OP", number)),
        }
    }

    fn exec_2op(&mut self, number: u8, args: &[u16; 4], count: usize) -> Result<(), RuntimeError> {
        match number {
            0x01 => {
                // je: equal to any of up to three comparands
                let cond = args[0] == args[1]
                    || (count > 2 && args[0] == args[2])
                    || (count > 3 && args[0] == args[3]);
                self.branch(cond)
            }
            0x02 => self.branch((args[0] as i16) < (args[1] as i16)), // jl
            0x03 => self.branch((args[0] as i16) > (args[1] as i16)), // jg
            0x04 => {
                // dec_chk: decrement, branch when now less
                let value = self.add_to_variable(args[0], -1)? as i16;
                self.branch(value < args[1] as i16)
            }
            0x05 => {
                // inc_chk: increment, branch when now greater
                let value = self.add_to_variable(args[0], 1)? as i16;
                self.branch(value > args[1] as i16)
            }
            0x06 => {
                // jin: is args[0] a direct child of args[1]
                let parent = self.parent_of(args[0])?;
                self.branch(parent == args[1])
            }
            0x07 => self.branch(args[0] & args[1] == args[1]), // test
            0x08 => {
                let value = args[0] | args[1];
                self.store_result(value)
            }
            0x09 => {
                let value = args[0] & args[1];
                self.store_result(value)
            }
            0x0A => {
                let set = self.test_attr(args[0], args[1])?;
                self.branch(set)
            }
            0x0B => self.set_attr(args[0], args[1]),
            0x0C => self.clear_attr(args[0], args[1]),
            0x0D => self.store_variable(args[0] as u8, args[1]), // store
            0x0E => self.insert_object(args[0], args[1]),
            0x0F => {
                // loadw
                let addr = args[0].wrapping_add(args[1].wrapping_mul(2)) as u32;
                let value = self.mem.read_word(addr)?;
                self.store_result(value)
            }
            0x10 => {
                // loadb
                let addr = args[0].wrapping_add(args[1]) as u32;
                let value = self.mem.read_byte(addr)? as u16;
                self.store_result(value)
            }
            0x11 => {
                let value = self.get_property(args[0], args[1])?;
                self.store_result(value)
            }
            0x12 => {
                let addr = self.property_addr(args[0], args[1])?;
                self.store_result(addr)
            }
            0x13 => {
                let next = self.next_property(args[0], args[1])?;
                self.store_result(next)
            }
            0x14 => {
                let value = (args[0] as i16).wrapping_add(args[1] as i16) as u16;
                self.store_result(value)
            }
            0x15 => {
                let value = (args[0] as i16).wrapping_sub(args[1] as i16) as u16;
                self.store_result(value)
            }
            0x16 => {
                let value = (args[0] as i16).wrapping_mul(args[1] as i16) as u16;
                self.store_result(value)
            }
            0x17 => {
                // div: truncating, like the hardware the games assume
                if args[1] == 0 {
                    return Err(RuntimeError::new(ErrorCode::DivideByZero, "division by zero"));
                }
                let value = (args[0] as i16).wrapping_div(args[1] as i16) as u16;
                self.store_result(value)
            }
            0x18 => {
                if args[1] == 0 {
                    return Err(RuntimeError::new(
                        ErrorCode::DivideByZero,
                        "division by zero (mod)",
                    ));
                }
                let value = (args[0] as i16).wrapping_rem(args[1] as i16) as u16;
                self.store_result(value)
            }
            _ => Err(illegal("2OP", number)),
        }
    }

    fn exec_var(&mut self, number: u8, args: &[u16; 4], count: usize) -> Result<(), RuntimeError> {
        match number {
            0x00 => self.do_call(args, count),
            0x01 => {
                // storew
                let addr = args[0].wrapping_add(args[1].wrapping_mul(2)) as u32;
                self.mem.write_word(addr, args[2])
            }
            0x02 => {
                // storeb
                let addr = args[0].wrapping_add(args[1]) as u32;
                self.mem.write_byte(addr, args[2] as u8)
            }
            0x03 => self.put_property(args[0], args[1], args[2]),
            0x04 => self.do_sread(args),
            0x05 => {
                // print_char
                self.output.write_zscii(args[0]);
                Ok(())
            }
            0x06 => {
                self.print_signed(args[0] as i16);
                Ok(())
            }
            0x07 => self.do_random(args[0]),
            0x08 => self.stack.push(args[0]),
            0x09 => {
                // pull
                let value = self.stack.pop()?;
                self.store_variable(args[0] as u8, value)
            }
            _ => Err(illegal("VAR", number)),
        }
    }

    // ---- the bigger handlers ----

    fn print_signed(&mut self, value: i16) {
        for b in value.to_string().bytes() {
            self.output.write_zscii(b as u16);
        }
    }

    /// `random r`: positive stores a roll in [1, r]; negative seeds
    /// with |r| and stores 0; zero seeds from the clock and stores 0.
    fn do_random(&mut self, range: u16) -> Result<(), RuntimeError> {
        let range = range as i16;
        let value = if range > 0 {
            self.rng.next(range as u16) + 1
        } else if range < 0 {
            debug!("rng seeded with {}", -(range as i32));
            self.rng.seed(-(range as i64) as u64);
            0
        } else {
            debug!("rng seeded from clock");
            self.rng.seed_from_clock();
            0
        };
        self.store_result(value)
    }

    /// `sread text parse`: block for a line, lowercase it into the text
    /// buffer, then tokenize against the dictionary into the parse
    /// buffer as 4-byte blocks of (entry address, length, offset).
    fn do_sread(&mut self, args: &[u16; 4]) -> Result<(), RuntimeError> {
        let text_buf = args[0] as u32;
        let parse_buf = args[1] as u32;

        let capacity = self.mem.read_byte(text_buf)? as usize;
        if capacity == 0 {
            return Err(RuntimeError::new(
                ErrorCode::AccessViolation,
                format!("text buffer at {text_buf:04x} has zero capacity"),
            ));
        }

        let line = self.input.read_line()?.to_lowercase();
        let bytes = line.as_bytes();
        let len = bytes.len().min(capacity - 1);
        for (i, &b) in bytes[..len].iter().enumerate() {
            self.mem.write_byte(text_buf + 1 + i as u32, b)?;
        }
        self.mem.write_byte(text_buf + 1 + len as u32, 0)?;

        let dict = Dictionary::new(&self.mem, self.header.dictionary as u32)?;
        let words = dictionary::tokenize(&bytes[..len], &dict.separators);

        let max_tokens = self.mem.read_byte(parse_buf)? as usize;
        let tokens = words.len().min(max_tokens);
        self.mem.write_byte(parse_buf + 1, tokens as u8)?;

        let mut at = parse_buf + 2;
        for &(start, word_len) in words.iter().take(tokens) {
            let key = text::encode_word(&bytes[start..start + word_len]);
            let entry = dict.lookup(&self.mem, key)?;
            debug!(
                "token {:?} -> {entry:04x}",
                String::from_utf8_lossy(&bytes[start..start + word_len])
            );
            self.mem.write_word(at, entry)?;
            self.mem.write_byte(at + 2, word_len as u8)?;
            self.mem.write_byte(at + 3, (start + 1) as u8)?;
            at += 4;
        }
        Ok(())
    }
}

fn illegal(class: &str, number: u8) -> RuntimeError {
    RuntimeError::new(
        ErrorCode::IllegalOpcode,
        format!("unassigned {class} opcode {number:#04x}"),
    )
}

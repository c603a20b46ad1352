//! The object tree. Objects are 9-byte records packed into dynamic
//! memory: a 32-bit attribute field, parent/sibling/child indices and a
//! pointer to the property block. Everything here mutates the image in
//! place; object numbers are 1-based and 0 is the null object.

use log::debug;

use crate::error::{ErrorCode, RuntimeError};
use crate::zmachine::ZMachine;

const OBJECT_ENTRY_SIZE: u32 = 9;
const OBJECT_PARENT: u32 = 4;
const OBJECT_SIBLING: u32 = 5;
const OBJECT_CHILD: u32 = 6;
const OBJECT_PROPERTIES: u32 = 7;

/// Default-property words precede the object entries.
const DEFAULT_PROPERTY_WORDS: u32 = 31;
const MAX_OBJECT: u16 = 255;

impl ZMachine {
    /// Address of object `index`'s entry. Index 0 and anything past the
    /// v3 limit are fatal.
    pub fn object_addr(&self, index: u16) -> Result<u32, RuntimeError> {
        if index == 0 || index > MAX_OBJECT {
            return Err(RuntimeError::new(
                ErrorCode::InvalidObject,
                format!("invalid object index {index}"),
            ));
        }
        Ok(self.header.object_table as u32
            + DEFAULT_PROPERTY_WORDS * 2
            + (index as u32 - 1) * OBJECT_ENTRY_SIZE)
    }

    fn attr_location(&self, object: u16, attr: u16) -> Result<(u32, u8), RuntimeError> {
        if attr > 31 {
            return Err(RuntimeError::new(
                ErrorCode::AttributeOutOfBounds,
                format!("attribute {attr} out of bounds"),
            ));
        }
        let addr = self.object_addr(object)? + (attr >> 3) as u32;
        // Attribute 0 is the top bit of the first byte.
        let bit = 7 - (attr & 0x7) as u8;
        Ok((addr, bit))
    }

    pub fn test_attr(&self, object: u16, attr: u16) -> Result<bool, RuntimeError> {
        let (addr, bit) = self.attr_location(object, attr)?;
        Ok(self.mem.read_byte(addr)? & (1 << bit) != 0)
    }

    pub fn set_attr(&mut self, object: u16, attr: u16) -> Result<(), RuntimeError> {
        let (addr, bit) = self.attr_location(object, attr)?;
        let value = self.mem.read_byte(addr)? | (1 << bit);
        self.mem.write_byte(addr, value)
    }

    pub fn clear_attr(&mut self, object: u16, attr: u16) -> Result<(), RuntimeError> {
        let (addr, bit) = self.attr_location(object, attr)?;
        let value = self.mem.read_byte(addr)? & !(1 << bit);
        self.mem.write_byte(addr, value)
    }

    // ---- tree links ----

    pub fn parent_of(&self, object: u16) -> Result<u16, RuntimeError> {
        Ok(self.mem.read_byte(self.object_addr(object)? + OBJECT_PARENT)? as u16)
    }

    pub fn sibling_of(&self, object: u16) -> Result<u16, RuntimeError> {
        Ok(self.mem.read_byte(self.object_addr(object)? + OBJECT_SIBLING)? as u16)
    }

    pub fn child_of(&self, object: u16) -> Result<u16, RuntimeError> {
        Ok(self.mem.read_byte(self.object_addr(object)? + OBJECT_CHILD)? as u16)
    }

    fn set_parent(&mut self, object: u16, parent: u16) -> Result<(), RuntimeError> {
        let addr = self.object_addr(object)? + OBJECT_PARENT;
        self.mem.write_byte(addr, parent as u8)
    }

    fn set_sibling(&mut self, object: u16, sibling: u16) -> Result<(), RuntimeError> {
        let addr = self.object_addr(object)? + OBJECT_SIBLING;
        self.mem.write_byte(addr, sibling as u8)
    }

    fn set_child(&mut self, object: u16, child: u16) -> Result<(), RuntimeError> {
        let addr = self.object_addr(object)? + OBJECT_CHILD;
        self.mem.write_byte(addr, child as u8)
    }

    /// Detach `object` from its parent, repairing the sibling chain.
    /// The object keeps its old sibling link; nothing reads it until
    /// the next insert overwrites it.
    pub fn unlink_object(&mut self, object: u16) -> Result<(), RuntimeError> {
        let parent = self.parent_of(object)?;
        if parent == 0 {
            return Ok(());
        }

        let first_child = self.child_of(parent)?;
        if first_child == object {
            let next = self.sibling_of(object)?;
            self.set_child(parent, next)?;
        } else {
            let mut prev = first_child;
            loop {
                if prev == 0 {
                    return Err(RuntimeError::new(
                        ErrorCode::InvalidObject,
                        format!("object {object} missing from child chain of {parent}"),
                    ));
                }
                let next = self.sibling_of(prev)?;
                if next == object {
                    break;
                }
                prev = next;
            }
            let sibling = self.sibling_of(object)?;
            self.set_sibling(prev, sibling)?;
        }
        self.set_parent(object, 0)
    }

    /// Make `object` the first child of `dest`; the old first child
    /// becomes its sibling.
    pub fn insert_object(&mut self, object: u16, dest: u16) -> Result<(), RuntimeError> {
        if self.parent_of(object)? == dest {
            return Ok(());
        }
        debug!("insert_obj {object} into {dest}");
        self.unlink_object(object)?;

        let old_child = self.child_of(dest)?;
        self.set_sibling(object, old_child)?;
        self.set_child(dest, object)?;
        self.set_parent(object, dest)
    }

    // ---- properties ----

    /// Address of the first property's size byte, past the short name.
    fn first_property_addr(&self, object: u16) -> Result<u32, RuntimeError> {
        let entry = self.object_addr(object)?;
        let block = self.mem.read_word(entry + OBJECT_PROPERTIES)? as u32;
        let name_words = self.mem.read_byte(block)? as u32;
        Ok(block + 1 + name_words * 2)
    }

    /// Where the object's Z-encoded short name starts.
    pub fn object_name_addr(&self, object: u16) -> Result<u32, RuntimeError> {
        let entry = self.object_addr(object)?;
        let block = self.mem.read_word(entry + OBJECT_PROPERTIES)? as u32;
        Ok(block + 1)
    }

    /// Walk the property list for `prop`. Properties are sorted by
    /// descending number, so the walk stops early on a smaller one.
    /// Returns (data address, length) or None when absent.
    fn property_info(&self, object: u16, prop: u16) -> Result<Option<(u32, u16)>, RuntimeError> {
        let mut at = self.first_property_addr(object)?;
        loop {
            let size_byte = self.mem.read_byte(at)?;
            if size_byte == 0 {
                return Ok(None);
            }
            let number = (size_byte & 0x1F) as u16;
            if number < prop {
                return Ok(None);
            }
            let len = ((size_byte >> 5) + 1) as u16;
            if number == prop {
                return Ok(Some((at + 1, len)));
            }
            at += 1 + len as u32;
        }
    }

    /// Value of property `prop`, falling back to the global default
    /// table when the object does not carry it. Only 1- and 2-byte
    /// properties can be read as values.
    pub fn get_property(&self, object: u16, prop: u16) -> Result<u16, RuntimeError> {
        match self.property_info(object, prop)? {
            Some((addr, 1)) => Ok(self.mem.read_byte(addr)? as u16),
            Some((addr, 2)) => self.mem.read_word(addr),
            Some((_, len)) => Err(RuntimeError::new(
                ErrorCode::BadPropertyWidth,
                format!("property {prop} of object {object} is {len} bytes wide"),
            )),
            None => {
                let value = self.property_default(prop)?;
                debug!("default property {prop} = {value:#06x}");
                Ok(value)
            }
        }
    }

    pub fn put_property(&mut self, object: u16, prop: u16, value: u16) -> Result<(), RuntimeError> {
        match self.property_info(object, prop)? {
            Some((addr, 1)) => self.mem.write_byte(addr, value as u8),
            Some((addr, 2)) => self.mem.write_word(addr, value),
            Some((_, len)) => Err(RuntimeError::new(
                ErrorCode::BadPropertyWidth,
                format!("property {prop} of object {object} is {len} bytes wide"),
            )),
            None => Err(RuntimeError::new(
                ErrorCode::PropertyNotFound,
                format!("object {object} has no property {prop}"),
            )),
        }
    }

    /// Address of the property data, or 0 when the object lacks it.
    pub fn property_addr(&self, object: u16, prop: u16) -> Result<u16, RuntimeError> {
        match self.property_info(object, prop)? {
            Some((addr, _)) => Ok(addr as u16),
            None => Ok(0),
        }
    }

    /// Property number following `prop`, with 0 meaning "first" on the
    /// way in and "end of list" on the way out. Asking about a property
    /// the object does not have is fatal.
    pub fn next_property(&self, object: u16, prop: u16) -> Result<u16, RuntimeError> {
        let next_size_byte = if prop == 0 {
            let at = self.first_property_addr(object)?;
            self.mem.read_byte(at)?
        } else {
            match self.property_info(object, prop)? {
                Some((addr, len)) => self.mem.read_byte(addr + len as u32)?,
                None => {
                    return Err(RuntimeError::new(
                        ErrorCode::PropertyNotFound,
                        format!("object {object} has no property {prop}"),
                    ))
                }
            }
        };
        Ok((next_size_byte & 0x1F) as u16)
    }

    /// Entry from the 31-word default table ahead of the object entries.
    pub fn property_default(&self, prop: u16) -> Result<u16, RuntimeError> {
        if prop == 0 || prop > DEFAULT_PROPERTY_WORDS as u16 {
            return Err(RuntimeError::new(
                ErrorCode::PropertyNotFound,
                format!("no default for property {prop}"),
            ));
        }
        let addr = self.header.object_table as u32 + (prop as u32 - 1) * 2;
        self.mem.read_word(addr)
    }
}

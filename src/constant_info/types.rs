use std::collections::HashMap;
use std::io::Cursor;

use binrw::{binrw, BinWrite};

use crate::compile::CompileError;

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub enum ConstantInfo {
    #[brw(magic = 1u8)]
    Utf8(Utf8Constant),
    #[brw(magic = 3u8)]
    Integer(IntegerConstant),
    #[brw(magic = 4u8)]
    Float(FloatConstant),
    #[brw(magic = 5u8)]
    Long(LongConstant),
    #[brw(magic = 6u8)]
    Double(DoubleConstant),
    #[brw(magic = 7u8)]
    Class(ClassConstant),
    #[brw(magic = 8u8)]
    String(StringConstant),
    #[brw(magic = 9u8)]
    FieldRef(FieldRefConstant),
    #[brw(magic = 10u8)]
    MethodRef(MethodRefConstant),
    #[brw(magic = 11u8)]
    InterfaceMethodRef(InterfaceMethodRefConstant),
    #[brw(magic = 12u8)]
    NameAndType(NameAndTypeConstant),
    /// Placeholder occupying the second slot of a long or double entry.
    #[brw(magic = 0u8)]
    Unusable,
}

#[binrw]
#[derive(Clone, Debug, PartialEq)]
#[brw(big)]
pub struct Utf8Constant {
    #[bw(calc = bytes.len() as u16)]
    length: u16,
    #[br(count = length)]
    pub bytes: Vec<u8>,
}

impl Utf8Constant {
    pub fn new(text: &str) -> Self {
        Utf8Constant {
            bytes: text.as_bytes().to_vec(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ClassConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct StringConstant {
    pub string_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct FieldRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct MethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct InterfaceMethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

/// Structural key used to intern entries. Floats are keyed by their bit pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

/// An interning constant pool. Index 0 is reserved, so the first entry added
/// gets index 1; long and double entries take two indices.
#[derive(Clone, Debug, Default)]
pub struct ConstPool {
    entries: Vec<ConstantInfo>,
    index: HashMap<PoolKey, u16>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indices in use, including the reserved slot 0.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16 + 1
    }

    pub fn get(&self, index: u16) -> Option<&ConstantInfo> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    pub fn utf8_at(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantInfo::Utf8(c) => c.as_str(),
            _ => None,
        }
    }

    /// Internal name of the class entry at `index`.
    pub fn class_name_at(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantInfo::Class(c) => self.utf8_at(c.name_index),
            _ => None,
        }
    }

    /// `(class, name, descriptor)` of a field or method reference.
    pub fn member_ref_at(&self, index: u16) -> Option<(&str, &str, &str)> {
        let (class_index, nat_index) = match self.get(index)? {
            ConstantInfo::FieldRef(r) => (r.class_index, r.name_and_type_index),
            ConstantInfo::MethodRef(r) => (r.class_index, r.name_and_type_index),
            ConstantInfo::InterfaceMethodRef(r) => (r.class_index, r.name_and_type_index),
            _ => return None,
        };
        let nat = match self.get(nat_index)? {
            ConstantInfo::NameAndType(nat) => nat,
            _ => return None,
        };
        Some((
            self.class_name_at(class_index)?,
            self.utf8_at(nat.name_index)?,
            self.utf8_at(nat.descriptor_index)?,
        ))
    }

    fn intern(&mut self, key: PoolKey, info: ConstantInfo) -> u16 {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let wide = matches!(info, ConstantInfo::Long(_) | ConstantInfo::Double(_));
        let idx = self.count();
        self.entries.push(info);
        if wide {
            self.entries.push(ConstantInfo::Unusable);
        }
        self.index.insert(key, idx);
        idx
    }

    pub fn get_or_add_utf8(&mut self, text: &str) -> u16 {
        self.intern(
            PoolKey::Utf8(text.to_string()),
            ConstantInfo::Utf8(Utf8Constant::new(text)),
        )
    }

    pub fn get_or_add_class(&mut self, internal_name: &str) -> u16 {
        let name_index = self.get_or_add_utf8(internal_name);
        self.intern(
            PoolKey::Class(name_index),
            ConstantInfo::Class(ClassConstant { name_index }),
        )
    }

    pub fn get_or_add_string(&mut self, text: &str) -> u16 {
        let string_index = self.get_or_add_utf8(text);
        self.intern(
            PoolKey::String(string_index),
            ConstantInfo::String(StringConstant { string_index }),
        )
    }

    pub fn get_or_add_integer(&mut self, value: i32) -> u16 {
        self.intern(
            PoolKey::Integer(value),
            ConstantInfo::Integer(IntegerConstant { value }),
        )
    }

    pub fn get_or_add_float(&mut self, value: f32) -> u16 {
        self.intern(
            PoolKey::Float(value.to_bits()),
            ConstantInfo::Float(FloatConstant { value }),
        )
    }

    pub fn get_or_add_long(&mut self, value: i64) -> u16 {
        self.intern(PoolKey::Long(value), ConstantInfo::Long(LongConstant { value }))
    }

    pub fn get_or_add_double(&mut self, value: f64) -> u16 {
        self.intern(
            PoolKey::Double(value.to_bits()),
            ConstantInfo::Double(DoubleConstant { value }),
        )
    }

    pub fn get_or_add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.get_or_add_utf8(name);
        let descriptor_index = self.get_or_add_utf8(descriptor);
        self.intern(
            PoolKey::NameAndType(name_index, descriptor_index),
            ConstantInfo::NameAndType(NameAndTypeConstant {
                name_index,
                descriptor_index,
            }),
        )
    }

    pub fn get_or_add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.get_or_add_class(class);
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor);
        self.intern(
            PoolKey::FieldRef(class_index, name_and_type_index),
            ConstantInfo::FieldRef(FieldRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn get_or_add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.get_or_add_class(class);
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor);
        self.intern(
            PoolKey::MethodRef(class_index, name_and_type_index),
            ConstantInfo::MethodRef(MethodRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    pub fn get_or_add_interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let class_index = self.get_or_add_class(class);
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor);
        self.intern(
            PoolKey::InterfaceMethodRef(class_index, name_and_type_index),
            ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
                class_index,
                name_and_type_index,
            }),
        )
    }

    /// Encodes the entries in class-file order, without the leading count.
    /// Placeholder slots after long/double entries produce no bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CompileError> {
        let mut out = Cursor::new(Vec::new());
        for entry in self.entries.iter().filter(|e| **e != ConstantInfo::Unusable) {
            entry
                .write(&mut out)
                .map_err(|e| CompileError::Fatal(format!("encoding constant pool: {}", e)))?;
        }
        Ok(out.into_inner())
    }
}

//! Synthetic accessors that let a nested class reach private members of its
//! enclosing class.

use std::collections::HashMap;

use log::debug;

use super::{ClassModel, FieldModel, MethodModel};
use crate::code_attribute::{Bytecode, InvokeKind, MethodCode};
use crate::compile::CompileError;
use crate::constant_info::ConstPool;
use crate::descriptor::{parse_method_descriptor, JType};
use crate::types::MethodAccessFlags;

/// Name prefix of synthetic accessor methods.
pub const ACCESSOR_PREFIX: &str = "access$";

/// Trailing parameter type that distinguishes a shadow constructor from the
/// private one it forwards to.
pub const CONSTRUCTOR_MARKER: &str = "compiler/runtime/Inner";

/// What a synthetic accessor does when called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessorBody {
    GetField { name: String, descriptor: String, is_static: bool },
    SetField { name: String, descriptor: String, is_static: bool },
    Forward { name: String, descriptor: String, is_static: bool },
    ShadowConstructor { descriptor: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticMethod {
    pub name: String,
    pub descriptor: String,
    pub access: MethodAccessFlags,
    pub body: AccessorBody,
}

impl SyntheticMethod {
    /// Generates the accessor's code against `owner`, the class it lives in.
    pub fn emit_body(&self, owner: &str, pool: &mut ConstPool) -> Result<MethodCode, CompileError> {
        let (params, ret) = parse_method_descriptor(&self.descriptor)
            .ok_or_else(|| CompileError::Fatal(format!("bad accessor descriptor {}", self.descriptor)))?;
        let is_ctor = matches!(self.body, AccessorBody::ShadowConstructor { .. });
        let receiver_slots = if is_ctor { 1 } else { 0 };
        let mut code = Bytecode::with_locals(receiver_slots + params.iter().map(JType::slot_size).sum::<u16>());

        if is_ctor {
            code.emit_load(&JType::class(owner), 0);
        }
        let mut slot = receiver_slots;
        // the marker argument of a shadow constructor is never forwarded
        let forwarded = if is_ctor { params.len().saturating_sub(1) } else { params.len() };
        for param in &params[..forwarded] {
            code.emit_load(param, slot);
            slot += param.slot_size();
        }

        match &self.body {
            AccessorBody::GetField { name, descriptor, is_static } => {
                let ty = field_type(descriptor)?;
                let index = pool.get_or_add_field_ref(owner, name, descriptor);
                code.emit_field_access(index, &ty, *is_static, false);
            }
            AccessorBody::SetField { name, descriptor, is_static } => {
                let ty = field_type(descriptor)?;
                let index = pool.get_or_add_field_ref(owner, name, descriptor);
                code.emit_field_access(index, &ty, *is_static, true);
            }
            AccessorBody::Forward { name, descriptor, is_static } => {
                let index = pool.get_or_add_method_ref(owner, name, descriptor);
                let kind = if *is_static { InvokeKind::Static } else { InvokeKind::Special };
                code.emit_invoke(kind, index, descriptor)?;
            }
            AccessorBody::ShadowConstructor { descriptor } => {
                let index = pool.get_or_add_method_ref(owner, "<init>", descriptor);
                code.emit_invoke(InvokeKind::Special, index, descriptor)?;
            }
        }
        code.emit_return(&ret);
        code.finish()
    }
}

fn field_type(descriptor: &str) -> Result<JType, CompileError> {
    JType::from_descriptor(descriptor)
        .ok_or_else(|| CompileError::Fatal(format!("bad field descriptor {}", descriptor)))
}

/// Per-class accessor state: the memo table, the name counter and the
/// synthesized methods themselves.
#[derive(Debug, Default)]
pub struct AccessorTable {
    cache: HashMap<String, usize>,
    counter: u32,
    methods: Vec<SyntheticMethod>,
}

impl AccessorTable {
    pub fn methods(&self) -> &[SyntheticMethod] {
        &self.methods
    }

    fn next_name(&mut self) -> String {
        let name = format!("{}{}", ACCESSOR_PREFIX, self.counter);
        self.counter += 1;
        name
    }

    fn get_or_create(
        &mut self,
        key: String,
        make: impl FnOnce(&mut Self) -> SyntheticMethod,
    ) -> SyntheticMethod {
        if let Some(&idx) = self.cache.get(&key) {
            return self.methods[idx].clone();
        }
        let method = make(self);
        debug!("synthesized accessor {}{} for {}", method.name, method.descriptor, key);
        self.cache.insert(key, self.methods.len());
        self.methods.push(method.clone());
        method
    }
}

fn accessor_access() -> MethodAccessFlags {
    MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC
}

impl ClassModel {
    fn receiver_prefix(&self, is_static: bool) -> String {
        if is_static {
            String::new()
        } else {
            format!("L{};", self.name)
        }
    }

    /// Static `access$N` returning the value of `field`.
    pub fn field_getter(&self, field: &FieldModel) -> Result<SyntheticMethod, CompileError> {
        let is_static = field.is_static();
        let descriptor = format!("({}){}", self.receiver_prefix(is_static), field.descriptor);
        let key = format!("get:{}:{}", field.name, field.descriptor);
        let mut table = self.accessor_table()?;
        Ok(table.get_or_create(key, |t| SyntheticMethod {
            name: t.next_name(),
            descriptor,
            access: accessor_access(),
            body: AccessorBody::GetField {
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
                is_static,
            },
        }))
    }

    /// Static `access$N` storing its last argument into `field`.
    pub fn field_setter(&self, field: &FieldModel) -> Result<SyntheticMethod, CompileError> {
        let is_static = field.is_static();
        let descriptor = format!("({}{})V", self.receiver_prefix(is_static), field.descriptor);
        let key = format!("set:{}:{}", field.name, field.descriptor);
        let mut table = self.accessor_table()?;
        Ok(table.get_or_create(key, |t| SyntheticMethod {
            name: t.next_name(),
            descriptor,
            access: accessor_access(),
            body: AccessorBody::SetField {
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
                is_static,
            },
        }))
    }

    /// Static `access$N` forwarding to the private `method`. Instance methods
    /// take the receiver as an extra leading parameter.
    pub fn method_accessor(&self, method: &MethodModel) -> Result<SyntheticMethod, CompileError> {
        let is_static = method.is_static();
        let descriptor = format!("({}{}", self.receiver_prefix(is_static), &method.descriptor[1..]);
        let key = format!("call:{}:{}", method.name, method.descriptor);
        let mut table = self.accessor_table()?;
        Ok(table.get_or_create(key, |t| SyntheticMethod {
            name: t.next_name(),
            descriptor,
            access: accessor_access(),
            body: AccessorBody::Forward {
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                is_static,
            },
        }))
    }

    /// Package-visible constructor taking the parameters of the private
    /// constructor `ctor` plus a trailing [`CONSTRUCTOR_MARKER`] argument.
    pub fn constructor_accessor(&self, ctor: &MethodModel) -> Result<SyntheticMethod, CompileError> {
        let close = ctor.descriptor.find(')').ok_or_else(|| {
            CompileError::Fatal(format!("bad constructor descriptor {}", ctor.descriptor))
        })?;
        let descriptor = format!(
            "{}L{};{}",
            &ctor.descriptor[..close],
            CONSTRUCTOR_MARKER,
            &ctor.descriptor[close..]
        );
        let key = format!("new:{}", ctor.descriptor);
        let mut table = self.accessor_table()?;
        Ok(table.get_or_create(key, |_| SyntheticMethod {
            name: "<init>".to_string(),
            descriptor,
            access: MethodAccessFlags::SYNTHETIC,
            body: AccessorBody::ShadowConstructor {
                descriptor: ctor.descriptor.clone(),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::Instruction;
    use crate::types::FieldAccessFlags;

    fn outer() -> ClassModel {
        ClassModel::new("demo/Outer")
            .with_field("count", "I", FieldAccessFlags::PRIVATE)
            .with_method("secret", "(J)Ljava/lang/String;", MethodAccessFlags::PRIVATE)
            .with_method("<init>", "(I)V", MethodAccessFlags::PRIVATE)
    }

    #[test]
    fn test_getter_is_memoized() {
        let model = outer();
        let field = model.field("count").unwrap().clone();
        let a = model.field_getter(&field).unwrap();
        let b = model.field_getter(&field).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "access$0");
        assert_eq!(a.descriptor, "(Ldemo/Outer;)I");
        assert_eq!(model.synthetic_methods().unwrap().len(), 1);

        let setter = model.field_setter(&field).unwrap();
        assert_eq!(setter.name, "access$1");
        assert_eq!(setter.descriptor, "(Ldemo/Outer;I)V");
    }

    #[test]
    fn test_method_accessor_takes_receiver_first() {
        let model = outer();
        let method = model.methods_named("secret").next().unwrap().clone();
        let acc = model.method_accessor(&method).unwrap();
        assert_eq!(acc.descriptor, "(Ldemo/Outer;J)Ljava/lang/String;");

        let mut pool = ConstPool::new();
        let body = acc.emit_body("demo/Outer", &mut pool).unwrap();
        let ops: Vec<_> = body.instructions().unwrap().into_iter().map(|(_, i)| i).collect();
        assert!(matches!(ops[..], [
            Instruction::Aload0,
            Instruction::Lload1,
            Instruction::Invokespecial(_),
            Instruction::Areturn
        ]));
        assert_eq!(body.max_locals, 3);
        assert_eq!(body.max_stack, 3);
    }

    #[test]
    fn test_shadow_constructor_appends_marker() {
        let model = outer();
        let ctor = model.methods_named("<init>").next().unwrap().clone();
        let acc = model.constructor_accessor(&ctor).unwrap();
        assert_eq!(acc.name, "<init>");
        assert_eq!(acc.descriptor, "(ILcompiler/runtime/Inner;)V");

        let mut pool = ConstPool::new();
        let body = acc.emit_body("demo/Outer", &mut pool).unwrap();
        let ops: Vec<_> = body.instructions().unwrap().into_iter().map(|(_, i)| i).collect();
        assert!(matches!(ops[..], [
            Instruction::Aload0,
            Instruction::Iload1,
            Instruction::Invokespecial(_),
            Instruction::Return
        ]));
    }
}

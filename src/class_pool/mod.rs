//! Class models consumed by the compiler: a lookup seam plus an in-memory pool.

mod accessors;
mod jdk;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::compile::CompileError;
use crate::descriptor::JType;
use crate::types::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};

pub use self::accessors::*;

/// Compile-time constant carried by a `static final` field.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldModel {
    pub name: String,
    pub descriptor: String,
    pub access: FieldAccessFlags,
    pub constant: Option<ConstValue>,
}

impl FieldModel {
    pub fn new(name: &str, descriptor: &str, access: FieldAccessFlags) -> Self {
        FieldModel {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
            constant: None,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccessFlags::STATIC)
    }

    pub fn field_type(&self) -> Result<JType, CompileError> {
        JType::from_descriptor(&self.descriptor).ok_or_else(|| {
            CompileError::Fatal(format!("bad descriptor for field {}", self.name))
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodModel {
    pub name: String,
    pub descriptor: String,
    pub access: MethodAccessFlags,
    pub exceptions: Vec<String>,
}

impl MethodModel {
    pub fn new(name: &str, descriptor: &str, access: MethodAccessFlags) -> Self {
        MethodModel {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
            exceptions: Vec::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_private(&self) -> bool {
        self.access.contains(MethodAccessFlags::PRIVATE)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

/// Everything the compiler needs to know about one class.
#[derive(Debug)]
pub struct ClassModel {
    pub name: String,
    pub access: ClassAccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldModel>,
    pub methods: Vec<MethodModel>,
    /// Lexically enclosing class, for nested classes.
    pub outer: Option<String>,
    accessors: Mutex<AccessorTable>,
}

impl ClassModel {
    pub fn new(name: &str) -> Self {
        ClassModel {
            name: name.to_string(),
            access: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            outer: None,
            accessors: Mutex::new(AccessorTable::default()),
        }
    }

    pub fn interface(name: &str) -> Self {
        let mut model = ClassModel::new(name);
        model.access = ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;
        model
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn nested_in(mut self, outer: &str) -> Self {
        self.outer = Some(outer.to_string());
        self
    }

    pub fn with_field(mut self, name: &str, descriptor: &str, access: FieldAccessFlags) -> Self {
        self.fields.push(FieldModel::new(name, descriptor, access));
        self
    }

    pub fn with_constant(mut self, name: &str, descriptor: &str, value: ConstValue) -> Self {
        let mut field = FieldModel::new(
            name,
            descriptor,
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        );
        field.constant = Some(value);
        self.fields.push(field);
        self
    }

    pub fn with_method(mut self, name: &str, descriptor: &str, access: MethodAccessFlags) -> Self {
        self.methods.push(MethodModel::new(name, descriptor, access));
        self
    }

    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn methods_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s MethodModel> + 's {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Locks the accessor table. A poisoned lock is reported as a fatal error.
    pub(crate) fn accessor_table(&self) -> Result<MutexGuard<'_, AccessorTable>, CompileError> {
        self.accessors
            .lock()
            .map_err(|_| CompileError::Fatal(format!("accessor table of {} poisoned", self.name)))
    }

    /// Synthetic accessor methods created so far, in creation order.
    pub fn synthetic_methods(&self) -> Result<Vec<SyntheticMethod>, CompileError> {
        Ok(self.accessor_table()?.methods().to_vec())
    }
}

/// Resolves internal class names to class models.
pub trait ClassLookup: Send + Sync {
    fn lookup(&self, internal_name: &str) -> Option<Arc<ClassModel>>;
}

/// A map-backed [`ClassLookup`].
#[derive(Debug, Default)]
pub struct ClassPool {
    classes: HashMap<String, Arc<ClassModel>>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool preloaded with the JDK classes snippets usually touch.
    pub fn with_jdk() -> Self {
        let mut pool = ClassPool::new();
        for model in jdk::classes() {
            pool.insert(model);
        }
        pool
    }

    pub fn insert(&mut self, model: ClassModel) -> Arc<ClassModel> {
        let model = Arc::new(model);
        self.classes.insert(model.name.clone(), Arc::clone(&model));
        model
    }

    pub fn get(&self, internal_name: &str) -> Option<Arc<ClassModel>> {
        self.classes.get(internal_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassLookup for ClassPool {
    fn lookup(&self, internal_name: &str) -> Option<Arc<ClassModel>> {
        self.get(internal_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jdk_pool_has_core_classes() {
        let pool = ClassPool::with_jdk();
        let string = pool.lookup("java/lang/String").unwrap();
        assert_eq!(string.super_name.as_deref(), Some("java/lang/Object"));
        assert!(string.methods_named("length").next().is_some());
        let out = pool.lookup("java/lang/System").unwrap();
        assert!(out.field("out").unwrap().is_static());
        assert!(pool.lookup("java/lang/Object").unwrap().super_name.is_none());
    }

    #[test]
    fn test_builder_sets_members() {
        let model = ClassModel::new("demo/Point")
            .with_field("x", "I", FieldAccessFlags::PRIVATE)
            .with_method("len", "()D", MethodAccessFlags::PUBLIC)
            .nested_in("demo/Outer");
        assert_eq!(model.field("x").unwrap().field_type().unwrap(), JType::INT);
        assert_eq!(model.outer.as_deref(), Some("demo/Outer"));
        assert!(!model.is_interface());
    }
}

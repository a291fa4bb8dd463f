//! Class, field and method lookup against a [`ClassLookup`].

use std::sync::Arc;

use log::trace;

use super::ast::TypeName;
use super::types::is_primitive_widening;
use super::CompileError;
use crate::class_pool::{ClassLookup, ClassModel, FieldModel, MethodModel};
use crate::descriptor::{
    package_name, parse_method_descriptor, simple_class_name, source_to_internal_name, JType, TypeKind,
};

pub const OBJECT: &str = "java/lang/Object";

/// A method picked by overload resolution.
#[derive(Clone, Debug)]
pub struct ResolvedMethod {
    pub declaring: Arc<ClassModel>,
    pub method: MethodModel,
    /// 0 when every argument matches its parameter exactly.
    pub distance: u32,
}

impl ResolvedMethod {
    pub fn param_types(&self) -> Result<Vec<JType>, CompileError> {
        Ok(self.signature()?.0)
    }

    pub fn return_type(&self) -> Result<JType, CompileError> {
        Ok(self.signature()?.1)
    }

    fn signature(&self) -> Result<(Vec<JType>, JType), CompileError> {
        parse_method_descriptor(&self.method.descriptor).ok_or_else(|| {
            CompileError::Fatal(format!(
                "bad descriptor {} for {}.{}",
                self.method.descriptor, self.declaring.name, self.method.name
            ))
        })
    }
}

/// Resolves names as seen from the code of one class.
pub struct Resolver<'a> {
    lookup: &'a dyn ClassLookup,
    this_class: String,
    imports: Vec<String>,
    /// The method being compiled, visible to itself before it is installed.
    in_progress: Option<MethodModel>,
}

impl<'a> Resolver<'a> {
    pub fn new(lookup: &'a dyn ClassLookup, this_class: &str, imported_packages: &[String]) -> Self {
        Resolver {
            lookup,
            this_class: this_class.to_string(),
            imports: imported_packages.iter().map(|p| source_to_internal_name(p)).collect(),
            in_progress: None,
        }
    }

    pub fn this_class(&self) -> &str {
        &self.this_class
    }

    pub fn set_in_progress(&mut self, method: Option<MethodModel>) {
        self.in_progress = method;
    }

    pub fn get_class(&self, internal_name: &str) -> Result<Arc<ClassModel>, CompileError> {
        self.lookup.lookup(internal_name).ok_or_else(|| CompileError::NoSuchClass {
            name: internal_name.replace('/', "."),
        })
    }

    pub fn this_model(&self) -> Result<Arc<ClassModel>, CompileError> {
        self.get_class(&self.this_class)
    }

    fn exists(&self, internal_name: &str) -> bool {
        self.lookup.lookup(internal_name).is_some()
    }

    /// Resolves a simple or dotted source class name to an internal name, or
    /// `None` when no such class is known.
    pub fn find_class(&self, name: &str) -> Option<String> {
        if let Some((prefix, last)) = name.rsplit_once('.') {
            let full = source_to_internal_name(name);
            if self.exists(&full) {
                return Some(full);
            }
            // `Outer.Inner` names the nested class `Outer$Inner`
            let outer = self.find_class(prefix)?;
            let nested = format!("{}${}", outer, last);
            return self.exists(&nested).then_some(nested);
        }

        let mut enclosing = Some(self.this_class.clone());
        while let Some(class) = enclosing {
            if simple_class_name(&class) == name {
                return Some(class);
            }
            let nested = format!("{}${}", class, name);
            if self.exists(&nested) {
                return Some(nested);
            }
            enclosing = self.lookup.lookup(&class).and_then(|m| m.outer.clone());
        }

        let same_package = match package_name(&self.this_class) {
            Some(pkg) => format!("{}/{}", pkg, name),
            None => name.to_string(),
        };
        std::iter::once(same_package)
            .chain(self.imports.iter().map(|pkg| format!("{}/{}", pkg, name)))
            .find(|candidate| self.exists(candidate))
    }

    pub fn resolve_class_name(&self, name: &str) -> Result<String, CompileError> {
        let found = self.find_class(name).ok_or_else(|| CompileError::NoSuchClass {
            name: name.to_string(),
        })?;
        trace!("class name {} resolved to {}", name, found);
        Ok(found)
    }

    /// Converts a written type into a type triple, resolving class names.
    pub fn resolve_type(&self, ty: &TypeName) -> Result<JType, CompileError> {
        let (base, dim) = ty.split();
        let base = match base {
            TypeName::Primitive(kind) => JType::prim(*kind),
            TypeName::Class(name) => JType::class(self.resolve_class_name(name)?),
            TypeName::Array(_) => return Err(CompileError::Fatal("unsplit array type".into())),
        };
        if dim > 0 && base.is_void() {
            return Err(CompileError::type_error("array of void"));
        }
        Ok(base.array_of(dim))
    }

    /// True when class `sub` is `sup` or extends or implements it.
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT {
            return true;
        }
        let Some(model) = self.lookup.lookup(sub) else {
            return false;
        };
        model.super_name.as_deref().is_some_and(|s| self.is_subclass(s, sup))
            || model.interfaces.iter().any(|i| self.is_subclass(i, sup))
    }

    /// Assignment compatibility between two type triples. Widening is implicit
    /// for primitives; references follow the class hierarchy, with array
    /// dimensions required to match exactly.
    pub fn is_assignable(&self, from: &JType, to: &JType) -> bool {
        if from == to {
            return true;
        }
        if to.is_void() || from.is_void() {
            return false;
        }
        if !from.is_reference() || !to.is_reference() {
            return from.dim == 0
                && to.dim == 0
                && !from.is_reference()
                && !to.is_reference()
                && is_primitive_widening(from.kind, to.kind);
        }
        if from.is_null() || to.is_object() {
            return true;
        }
        if from.dim != to.dim {
            return false;
        }
        match (&from.class_name, &to.class_name) {
            (Some(f), Some(t)) => self.is_subclass(f, t),
            _ => from.kind == to.kind,
        }
    }

    /// Finds field `name` in `class`, its superclasses or its interfaces.
    pub fn lookup_field(
        &self,
        class: &str,
        name: &str,
    ) -> Result<(Arc<ClassModel>, FieldModel), CompileError> {
        self.find_field(class, name).ok_or_else(|| CompileError::NoSuchField {
            name: format!("{}.{}", class.replace('/', "."), name),
        })
    }

    pub fn find_field(&self, class: &str, name: &str) -> Option<(Arc<ClassModel>, FieldModel)> {
        let model = self.lookup.lookup(class)?;
        if let Some(field) = model.field(name) {
            return Some((Arc::clone(&model), field.clone()));
        }
        if let Some(found) = model
            .super_name
            .as_deref()
            .and_then(|s| self.find_field(s, name))
        {
            return Some(found);
        }
        model.interfaces.iter().find_map(|i| self.find_field(i, name))
    }

    /// Overload resolution. The candidate with the smallest distance wins; on a
    /// tie the first one found is kept.
    pub fn lookup_method(
        &self,
        class: &str,
        name: &str,
        args: &[JType],
    ) -> Result<ResolvedMethod, CompileError> {
        let mut best: Option<ResolvedMethod> = None;
        let model = self.get_class(class)?;

        if class == self.this_class {
            if let Some(current) = self.in_progress.as_ref().filter(|m| m.name == name) {
                self.consider(&mut best, &model, current, args);
            }
        }
        self.search(&mut best, &model, name, args);
        if model.is_interface() {
            if let Some(object) = self.lookup.lookup(OBJECT) {
                self.search(&mut best, &object, name, args);
            }
        }

        match best {
            Some(found) => {
                trace!(
                    "{}.{} resolved to {}{} in {} (distance {})",
                    class,
                    name,
                    found.method.name,
                    found.method.descriptor,
                    found.declaring.name,
                    found.distance
                );
                Ok(found)
            }
            None => {
                let args: Vec<String> = args.iter().map(JType::to_string).collect();
                Err(CompileError::MethodNotFound {
                    name: format!("{}.{}({})", class.replace('/', "."), name, args.join(", ")),
                })
            }
        }
    }

    fn search(&self, best: &mut Option<ResolvedMethod>, model: &Arc<ClassModel>, name: &str, args: &[JType]) {
        for method in model.methods_named(name) {
            self.consider(best, model, method, args);
        }
        // constructors are not inherited
        if name == "<init>" {
            return;
        }
        if let Some(sup) = model.super_name.as_deref().and_then(|s| self.lookup.lookup(s)) {
            self.search(best, &sup, name, args);
        }
        if model.is_interface() || model.is_abstract() {
            for interface in &model.interfaces {
                if let Some(iface) = self.lookup.lookup(interface) {
                    self.search(best, &iface, name, args);
                }
            }
        }
    }

    fn consider(
        &self,
        best: &mut Option<ResolvedMethod>,
        model: &Arc<ClassModel>,
        method: &MethodModel,
        args: &[JType],
    ) {
        let Some((params, _)) = parse_method_descriptor(&method.descriptor) else {
            return;
        };
        let Some(distance) = self.signature_distance(&params, args) else {
            return;
        };
        if best.as_ref().map_or(true, |b| distance < b.distance) {
            *best = Some(ResolvedMethod {
                declaring: Arc::clone(model),
                method: method.clone(),
                distance,
            });
        }
    }

    /// Structural distance of `args` from `params`, `None` when they do not match.
    pub fn signature_distance(&self, params: &[JType], args: &[JType]) -> Option<u32> {
        if params.len() != args.len() {
            return None;
        }
        params
            .iter()
            .zip(args)
            .map(|(param, arg)| self.argument_distance(param, arg))
            .sum()
    }

    fn argument_distance(&self, param: &JType, arg: &JType) -> Option<u32> {
        if param == arg {
            return Some(0);
        }
        if arg.is_null() {
            return param.is_reference().then_some(1);
        }
        if param.is_reference() && arg.is_reference() {
            if param.is_object() {
                return Some(1);
            }
            if param.dim != arg.dim {
                return None;
            }
            return match (&arg.class_name, &param.class_name) {
                (Some(a), Some(p)) if self.is_subclass(a, p) => Some(1),
                _ => None,
            };
        }
        if param.dim == 0 && param.kind == TypeKind::Int && arg.is_int_family() {
            return Some(1);
        }
        None
    }

    /// Whether code in this class must reach `member_class`'s private member
    /// through a synthetic accessor: the member is private and declared by a
    /// class lexically enclosing this one.
    pub fn needs_accessor(&self, member_class: &ClassModel, is_private: bool) -> bool {
        if !is_private || member_class.name == self.this_class {
            return false;
        }
        let mut outer = self.lookup.lookup(&self.this_class).and_then(|m| m.outer.clone());
        while let Some(name) = outer {
            if name == member_class.name {
                return true;
            }
            outer = self.lookup.lookup(&name).and_then(|m| m.outer.clone());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_pool::ClassPool;
    use crate::types::{FieldAccessFlags, MethodAccessFlags};

    fn pool() -> ClassPool {
        let mut pool = ClassPool::with_jdk();
        pool.insert(
            ClassModel::new("demo/Outer")
                .with_field("secret", "I", FieldAccessFlags::PRIVATE)
                .with_method("f", "(I)V", MethodAccessFlags::PUBLIC)
                .with_method("f", "(J)V", MethodAccessFlags::PUBLIC)
                .with_method("g", "(Ljava/lang/Object;)V", MethodAccessFlags::PUBLIC)
                .with_method("g", "(Ljava/lang/String;)V", MethodAccessFlags::PUBLIC),
        );
        pool.insert(ClassModel::new("demo/Outer$Inner").nested_in("demo/Outer"));
        pool.insert(ClassModel::new("demo/Sub").extends("demo/Outer"));
        pool
    }

    fn resolver<'a>(pool: &'a ClassPool, class: &str) -> Resolver<'a> {
        Resolver::new(pool, class, &["java.lang".to_string()])
    }

    #[test]
    fn test_class_names() {
        let pool = pool();
        let r = resolver(&pool, "demo/Outer$Inner");
        assert_eq!(r.find_class("String").as_deref(), Some("java/lang/String"));
        assert_eq!(r.find_class("java.lang.String").as_deref(), Some("java/lang/String"));
        assert_eq!(r.find_class("Inner").as_deref(), Some("demo/Outer$Inner"));
        assert_eq!(r.find_class("Outer").as_deref(), Some("demo/Outer"));
        assert_eq!(r.find_class("demo.Outer.Inner").as_deref(), Some("demo/Outer$Inner"));
        assert_eq!(r.find_class("Sub").as_deref(), Some("demo/Sub"));
        assert!(matches!(
            r.resolve_class_name("Nope"),
            Err(CompileError::NoSuchClass { .. })
        ));
    }

    #[test]
    fn test_exact_match_beats_widening() {
        let pool = pool();
        let r = resolver(&pool, "demo/Sub");
        let m = r.lookup_method("demo/Sub", "f", &[JType::INT]).unwrap();
        assert_eq!(m.method.descriptor, "(I)V");
        assert_eq!(m.distance, 0);
        assert_eq!(m.declaring.name, "demo/Outer");

        let m = r.lookup_method("demo/Sub", "f", &[JType::CHAR]).unwrap();
        assert_eq!(m.method.descriptor, "(I)V");
        assert_eq!(m.distance, 1);

        let m = r.lookup_method("demo/Sub", "g", &[JType::string()]).unwrap();
        assert_eq!(m.method.descriptor, "(Ljava/lang/String;)V");
    }

    #[test]
    fn test_ties_keep_first_found() {
        let pool = pool();
        let r = resolver(&pool, "demo/Outer");
        let m = r.lookup_method("demo/Outer", "g", &[JType::NULL]).unwrap();
        assert_eq!(m.method.descriptor, "(Ljava/lang/Object;)V");
    }

    #[test]
    fn test_mismatches_are_rejected() {
        let pool = pool();
        let r = resolver(&pool, "demo/Outer");
        assert!(matches!(
            r.lookup_method("demo/Outer", "f", &[JType::DOUBLE]),
            Err(CompileError::MethodNotFound { .. })
        ));
        assert!(r.lookup_method("demo/Outer", "f", &[]).is_err());
    }

    #[test]
    fn test_in_progress_method_is_visible() {
        let pool = pool();
        let mut r = resolver(&pool, "demo/Outer");
        r.set_in_progress(Some(MethodModel::new("fact", "(I)I", MethodAccessFlags::STATIC)));
        let m = r.lookup_method("demo/Outer", "fact", &[JType::INT]).unwrap();
        assert_eq!(m.method.descriptor, "(I)I");
    }

    #[test]
    fn test_assignability() {
        let pool = pool();
        let r = resolver(&pool, "demo/Outer");
        assert!(r.is_assignable(&JType::INT, &JType::LONG));
        assert!(!r.is_assignable(&JType::LONG, &JType::INT));
        assert!(r.is_assignable(&JType::NULL, &JType::INT.array_of(1)));
        assert!(r.is_assignable(&JType::INT.array_of(2), &JType::object()));
        assert!(!r.is_assignable(&JType::INT.array_of(2), &JType::INT.array_of(1)));
        assert!(r.is_assignable(&JType::class("demo/Sub"), &JType::class("demo/Outer")));
        assert!(!r.is_assignable(&JType::class("demo/Outer"), &JType::class("demo/Sub")));
        assert!(r.is_assignable(&JType::string(), &JType::class("java/lang/CharSequence")));
    }

    #[test]
    fn test_accessor_need() {
        let pool = pool();
        let inner = resolver(&pool, "demo/Outer$Inner");
        let outer = pool.get("demo/Outer").unwrap();
        assert!(inner.needs_accessor(&outer, true));
        assert!(!inner.needs_accessor(&outer, false));
        let sub = resolver(&pool, "demo/Sub");
        assert!(!sub.needs_accessor(&outer, true));
    }
}

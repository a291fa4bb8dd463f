//! Pseudo-variables and hooks available to snippets spliced into an existing
//! method: `$0..$n`, `$args`, `$$`, `$sig`, `$type`, `$class`, `$r`, `$w`,
//! `$_`, `$proceed` and `$cflow`.

use std::collections::HashMap;
use std::rc::Rc;

use super::ast::{Declarator, Expr};
use super::checker::Checker;
use super::codegen::CodeGen;
use super::CompileError;
use crate::descriptor::{JType, TypeKind};

pub const PROCEED: &str = "$proceed";
pub const CFLOW: &str = "$cflow";
pub const RESULT: &str = "$_";
pub const ARGS: &str = "$args";
pub const SPLICED_ARGS: &str = "$$";
pub const SIG: &str = "$sig";
pub const TYPE: &str = "$type";
pub const CLASS: &str = "$class";
pub const RETURN_CAST: &str = "$r";
pub const BOX_CAST: &str = "$w";

/// Runtime class holding a control-flow depth counter.
pub const CFLOW_CLASS: &str = "compiler/runtime/Cflow";

/// Decides what `$proceed(...)` means. The arguments reach the handler with
/// `$$` already expanded.
pub trait ProceedHandler {
    fn result_type(&self, checker: &Checker<'_, '_>, args: &[Expr]) -> Result<JType, CompileError>;

    /// Emits the call, leaving its result (if any) on the stack.
    fn emit(&self, gen: &mut CodeGen<'_, '_>, args: &[Expr]) -> Result<JType, CompileError>;
}

/// `$proceed(...)` forwarding to an ordinary method call, optionally on a
/// target expression such as `$0` or a class name.
#[derive(Debug)]
pub struct ForwardProceed {
    pub target: Option<Expr>,
    pub method: String,
}

impl ForwardProceed {
    fn call(&self, args: &[Expr]) -> Expr {
        Expr::Call {
            target: self.target.clone().map(Box::new),
            name: self.method.clone(),
            args: args.to_vec(),
        }
    }
}

impl ProceedHandler for ForwardProceed {
    fn result_type(&self, checker: &Checker<'_, '_>, args: &[Expr]) -> Result<JType, CompileError> {
        checker.type_of(&self.call(args))
    }

    fn emit(&self, gen: &mut CodeGen<'_, '_>, args: &[Expr]) -> Result<JType, CompileError> {
        gen.gen_expr(&self.call(args))
    }
}

/// Parameters of the method a snippet is spliced into.
#[derive(Debug, Clone)]
pub struct ParamBinding {
    /// `$1..$n`, in order.
    pub decls: Vec<Rc<Declarator>>,
    pub types: Vec<JType>,
    /// Internal name of the class declaring the method.
    pub declaring: String,
    pub is_static: bool,
}

/// Field holding the counter behind a `$cflow(name)` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CflowField {
    pub class: String,
    pub field: String,
}

#[derive(Default)]
pub struct SpliceBindings {
    params: Option<ParamBinding>,
    return_type: Option<JType>,
    dollar_type: Option<JType>,
    proceed: Option<Box<dyn ProceedHandler>>,
    cflow: HashMap<String, CflowField>,
}

impl SpliceBindings {
    pub fn set_params(&mut self, params: ParamBinding) {
        self.params = Some(params);
    }

    pub fn set_return_type(&mut self, ty: JType) {
        self.return_type = Some(ty);
    }

    pub fn set_dollar_type(&mut self, ty: JType) {
        self.dollar_type = Some(ty);
    }

    pub fn set_proceed(&mut self, handler: Box<dyn ProceedHandler>) {
        self.proceed = Some(handler);
    }

    pub fn add_cflow(&mut self, name: &str, field: CflowField) {
        self.cflow.insert(name.to_string(), field);
    }

    pub fn params(&self) -> Result<&ParamBinding, CompileError> {
        self.params
            .as_ref()
            .ok_or_else(|| CompileError::codegen("no parameters are bound in this context"))
    }

    pub fn return_type(&self) -> Option<&JType> {
        self.return_type.as_ref()
    }

    /// The type `$type` denotes: the recorded type, else the return type.
    pub fn dollar_type(&self) -> JType {
        self.dollar_type
            .clone()
            .or_else(|| self.return_type.clone())
            .unwrap_or(JType::VOID)
    }

    /// Target type of a `($r)` cast.
    pub fn return_cast_type(&self) -> JType {
        self.return_type.clone().unwrap_or(JType::VOID)
    }

    pub fn proceed(&self) -> Result<&dyn ProceedHandler, CompileError> {
        self.proceed
            .as_deref()
            .ok_or_else(|| CompileError::type_error(format!("{} is not available here", PROCEED)))
    }

    /// The counter field named by the single argument of `$cflow(name)`.
    pub fn cflow_field(&self, args: &[Expr]) -> Result<&CflowField, CompileError> {
        let name = match args {
            [arg] => arg.dotted_name(),
            _ => None,
        }
        .ok_or_else(|| CompileError::type_error(format!("{} takes a single name", CFLOW)))?;
        self.cflow
            .get(&name)
            .ok_or_else(|| CompileError::type_error(format!("no cflow counter named {}", name)))
    }

    pub fn is_pseudo_name(name: &str) -> bool {
        matches!(name, ARGS | SPLICED_ARGS | SIG | TYPE | CLASS)
    }

    /// Type of a pseudo-variable written as a bare name, `None` for ordinary names.
    pub fn name_type(&self, name: &str) -> Option<Result<JType, CompileError>> {
        let class = JType::class("java/lang/Class");
        Some(match name {
            ARGS => Ok(JType::object().array_of(1)),
            SIG => Ok(class.array_of(1)),
            TYPE | CLASS => Ok(class),
            SPLICED_ARGS => Err(CompileError::type_error(format!(
                "{} may only appear in an argument list",
                SPLICED_ARGS
            ))),
            _ => return None,
        })
    }
}

/// Wrapper class and unboxing method for a primitive kind.
pub fn wrapper_class(kind: TypeKind) -> Option<(&'static str, &'static str)> {
    Some(match kind {
        TypeKind::Boolean => ("java/lang/Boolean", "booleanValue"),
        TypeKind::Byte => ("java/lang/Byte", "byteValue"),
        TypeKind::Char => ("java/lang/Character", "charValue"),
        TypeKind::Short => ("java/lang/Short", "shortValue"),
        TypeKind::Int => ("java/lang/Integer", "intValue"),
        TypeKind::Long => ("java/lang/Long", "longValue"),
        TypeKind::Float => ("java/lang/Float", "floatValue"),
        TypeKind::Double => ("java/lang/Double", "doubleValue"),
        _ => return None,
    })
}

/// Result type of a `($w)` cast: primitives become their wrapper, void becomes
/// `Object`, references are unchanged.
pub fn boxed_type(ty: &JType) -> JType {
    if ty.is_void() {
        return JType::object();
    }
    match (ty.dim, wrapper_class(ty.kind)) {
        (0, Some((class, _))) => JType::class(class),
        _ => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxing_types() {
        assert_eq!(boxed_type(&JType::INT), JType::class("java/lang/Integer"));
        assert_eq!(boxed_type(&JType::VOID), JType::object());
        assert_eq!(boxed_type(&JType::INT.array_of(1)), JType::INT.array_of(1));
        assert_eq!(boxed_type(&JType::string()), JType::string());
    }

    #[test]
    fn test_dollar_type_falls_back_to_return_type() {
        let mut bindings = SpliceBindings::default();
        assert_eq!(bindings.dollar_type(), JType::VOID);
        bindings.set_return_type(JType::LONG);
        assert_eq!(bindings.dollar_type(), JType::LONG);
        bindings.set_dollar_type(JType::string());
        assert_eq!(bindings.dollar_type(), JType::string());
    }

    #[test]
    fn test_cflow_names_must_be_recorded() {
        let mut bindings = SpliceBindings::default();
        bindings.add_cflow(
            "outer",
            CflowField {
                class: "demo/Hooks".into(),
                field: "_cflow$0".into(),
            },
        );
        let field = bindings.cflow_field(&[Expr::Name("outer".into())]).unwrap();
        assert_eq!(field.field, "_cflow$0");
        assert!(bindings.cflow_field(&[Expr::Name("inner".into())]).is_err());
        assert!(bindings.cflow_field(&[]).is_err());
    }

    #[test]
    fn test_pseudo_names() {
        let bindings = SpliceBindings::default();
        assert!(SpliceBindings::is_pseudo_name(ARGS));
        assert!(!SpliceBindings::is_pseudo_name("$1"));
        assert!(bindings.name_type(SPLICED_ARGS).unwrap().is_err());
        assert!(bindings.name_type("x").is_none());
        assert!(bindings.proceed().is_err());
    }
}

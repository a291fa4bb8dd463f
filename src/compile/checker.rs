//! Type inference and checking over the syntax tree.
//!
//! [`Checker::type_of`] computes the type of an expression without touching
//! it; the code generator calls it whenever it needs a type. The mutating pass
//! ([`Checker::check_expr`], [`Checker::check_stmt`]) additionally folds
//! constants, turns string `+` chains into [`Expr::Concat`] and makes numeric
//! promotion in conditionals explicit.

use std::borrow::Cow;
use std::sync::Arc;

use super::ast::*;
use super::resolver::{ResolvedMethod, Resolver, OBJECT};
use super::splice::{self, SpliceBindings};
use super::types::{binary_promotion, format_double, format_float, int_constant_fits, numeric_rank, unary_promotion};
use super::CompileError;
use crate::class_pool::{ClassModel, ConstValue, FieldModel};
use crate::code_attribute::InvokeKind;
use crate::descriptor::{JType, TypeKind};
use crate::types::FieldAccessFlags;

const THROWABLE: &str = "java/lang/Throwable";

/// What a name or a dotted prefix denotes while resolving `a.b.c` chains.
#[derive(Clone, Debug, PartialEq)]
pub enum Probe {
    Value(JType),
    Class(String),
    Package(String),
}

/// A resolved field access.
#[derive(Clone, Debug)]
pub enum FieldTarget<'e> {
    ArrayLength(&'e Expr),
    Static {
        owner: Arc<ClassModel>,
        field: FieldModel,
    },
    /// `receiver` is `None` for an implicit `this`.
    Instance {
        receiver: Option<&'e Expr>,
        owner: Arc<ClassModel>,
        field: FieldModel,
    },
}

/// Where the receiver of a call comes from.
#[derive(Clone, Copy, Debug)]
pub enum Receiver<'e> {
    Static,
    This,
    Value(&'e Expr),
}

#[derive(Clone, Debug)]
pub struct CallTarget<'e> {
    pub receiver: Receiver<'e>,
    pub resolved: ResolvedMethod,
    pub kind: InvokeKind,
    /// Class named in the method reference.
    pub owner: String,
}

/// A compile-time constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Const {
    /// Value of an int-family constant and its kind.
    Int(i32, TypeKind),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
}

impl Const {
    fn kind(&self) -> TypeKind {
        match self {
            Const::Int(_, kind) => *kind,
            Const::Long(_) => TypeKind::Long,
            Const::Float(_) => TypeKind::Float,
            Const::Double(_) => TypeKind::Double,
            Const::Bool(_) => TypeKind::Boolean,
            Const::Str(_) => TypeKind::Class,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Const::Int(v, _) => *v as f64,
            Const::Long(v) => *v as f64,
            Const::Float(v) => *v as f64,
            Const::Double(v) => *v,
            _ => return None,
        })
    }

    fn as_i64(&self) -> Option<i64> {
        Some(match self {
            Const::Int(v, _) => *v as i64,
            Const::Long(v) => *v,
            Const::Float(v) => *v as i64,
            Const::Double(v) => *v as i64,
            _ => return None,
        })
    }

    /// Primitive conversion with Java semantics.
    fn convert(&self, to: TypeKind) -> Option<Const> {
        if let Const::Bool(b) = self {
            return (to == TypeKind::Boolean).then_some(Const::Bool(*b));
        }
        // float to int goes through int (saturating), like d2i / f2i
        let as_int = || -> Option<i32> {
            match self {
                Const::Int(v, _) => Some(*v),
                Const::Long(v) => Some(*v as i32),
                Const::Float(v) => Some(*v as i32),
                Const::Double(v) => Some(*v as i32),
                _ => None,
            }
        };
        Some(match to {
            TypeKind::Byte => Const::Int(as_int()? as i8 as i32, to),
            TypeKind::Short => Const::Int(as_int()? as i16 as i32, to),
            TypeKind::Char => Const::Int(as_int()? as u16 as i32, to),
            TypeKind::Int => Const::Int(as_int()?, to),
            TypeKind::Long => Const::Long(self.as_i64()?),
            TypeKind::Float => match self {
                Const::Long(v) => Const::Float(*v as f32),
                Const::Double(v) => Const::Float(*v as f32),
                other => Const::Float(other.as_f64()? as f32),
            },
            TypeKind::Double => Const::Double(self.as_f64()?),
            _ => return None,
        })
    }

    /// `String.valueOf` of the constant.
    fn to_java_string(&self) -> String {
        match self {
            Const::Int(v, TypeKind::Char) => char::from_u32(*v as u32).map(String::from).unwrap_or_default(),
            Const::Int(v, _) => v.to_string(),
            Const::Long(v) => v.to_string(),
            Const::Float(v) => format_float(*v),
            Const::Double(v) => format_double(*v),
            Const::Bool(b) => b.to_string(),
            Const::Str(s) => s.clone(),
        }
    }

    pub fn into_expr(self) -> Expr {
        match self {
            Const::Int(v, kind) => Expr::IntConst(v as i64, kind),
            Const::Long(v) => Expr::IntConst(v, TypeKind::Long),
            Const::Float(v) => Expr::DoubleConst(v as f64, TypeKind::Float),
            Const::Double(v) => Expr::DoubleConst(v, TypeKind::Double),
            Const::Bool(b) => Expr::boolean(b),
            Const::Str(s) => Expr::StringL(s),
        }
    }

    fn from_field(value: &ConstValue, ty: &JType) -> Const {
        match value {
            ConstValue::Int(v) if ty.is_boolean() => Const::Bool(*v != 0),
            ConstValue::Int(v) if ty.is_int_family() => Const::Int(*v, ty.kind),
            ConstValue::Int(v) => Const::Int(*v, TypeKind::Int),
            ConstValue::Long(v) => Const::Long(*v),
            ConstValue::Float(v) => Const::Float(*v),
            ConstValue::Double(v) => Const::Double(*v),
            ConstValue::String(s) => Const::Str(s.clone()),
        }
    }
}

fn fold_int(op: BinOp, l: i32, r: i32) -> Option<i32> {
    Some(match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div if r != 0 => l.wrapping_div(r),
        BinOp::Rem if r != 0 => l.wrapping_rem(r),
        BinOp::BitAnd => l & r,
        BinOp::BitOr => l | r,
        BinOp::BitXor => l ^ r,
        _ => return None,
    })
}

fn fold_long(op: BinOp, l: i64, r: i64) -> Option<i64> {
    Some(match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div if r != 0 => l.wrapping_div(r),
        BinOp::Rem if r != 0 => l.wrapping_rem(r),
        BinOp::BitAnd => l & r,
        BinOp::BitOr => l | r,
        BinOp::BitXor => l ^ r,
        _ => return None,
    })
}

fn fold_float(op: BinOp, l: f64, r: f64) -> Option<f64> {
    Some(match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::Rem => l % r,
        _ => return None,
    })
}

fn fold_binary(op: BinOp, l: &Const, r: &Const) -> Option<Const> {
    if op == BinOp::Add && (matches!(l, Const::Str(_)) || matches!(r, Const::Str(_))) {
        return Some(Const::Str(l.to_java_string() + &r.to_java_string()));
    }
    if let (Const::Bool(a), Const::Bool(b)) = (l, r) {
        return Some(Const::Bool(match op {
            BinOp::BitAnd => a & b,
            BinOp::BitOr => a | b,
            BinOp::BitXor => a ^ b,
            _ => return None,
        }));
    }
    if op.is_shift() {
        let count = r.as_i64()?;
        return match unary_promotion(&JType::prim(l.kind()))?.kind {
            TypeKind::Int => {
                let v = l.convert(TypeKind::Int)?.as_i64()? as i32;
                let n = (count & 31) as u32;
                Some(Const::Int(
                    match op {
                        BinOp::Shl => v.wrapping_shl(n),
                        BinOp::Shr => v >> n,
                        _ => ((v as u32) >> n) as i32,
                    },
                    TypeKind::Int,
                ))
            }
            TypeKind::Long => {
                let v = l.as_i64()?;
                let n = (count & 63) as u32;
                Some(Const::Long(match op {
                    BinOp::Shl => v.wrapping_shl(n),
                    BinOp::Shr => v >> n,
                    _ => ((v as u64) >> n) as i64,
                }))
            }
            _ => None,
        };
    }
    let kind = binary_promotion(&JType::prim(l.kind()), &JType::prim(r.kind()))?.kind;
    let (l, r) = (l.convert(kind)?, r.convert(kind)?);
    match (l, r) {
        (Const::Int(a, _), Const::Int(b, _)) => fold_int(op, a, b).map(|v| Const::Int(v, TypeKind::Int)),
        (Const::Long(a), Const::Long(b)) => fold_long(op, a, b).map(Const::Long),
        (Const::Float(a), Const::Float(b)) => {
            fold_float(op, a as f64, b as f64).map(|v| Const::Float(v as f32))
        }
        (Const::Double(a), Const::Double(b)) => fold_float(op, a, b).map(Const::Double),
        _ => None,
    }
}

fn fold_compare(op: CompareOp, l: &Const, r: &Const) -> Option<bool> {
    use std::cmp::Ordering;
    if let (Const::Bool(a), Const::Bool(b)) = (l, r) {
        return match op {
            CompareOp::Eq => Some(a == b),
            CompareOp::Ne => Some(a != b),
            _ => None,
        };
    }
    let kind = binary_promotion(&JType::prim(l.kind()), &JType::prim(r.kind()))?.kind;
    let ordering = match (l.convert(kind)?, r.convert(kind)?) {
        (Const::Int(a, _), Const::Int(b, _)) => Some(a.cmp(&b)),
        (Const::Long(a), Const::Long(b)) => Some(a.cmp(&b)),
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    };
    // NaN compares unequal to everything
    Some(match ordering {
        None => op == CompareOp::Ne,
        Some(ord) => match op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        },
    })
}

/// Appends the parts of a string concatenation, flattening nested ones and
/// merging neighbouring constants.
fn push_concat_part(parts: &mut Vec<Expr>, part: Expr) {
    let part_const = |e: &Expr| match e {
        Expr::StringL(s) => Some(s.clone()),
        Expr::IntConst(v, TypeKind::Char) => char::from_u32(*v as u32).map(String::from),
        Expr::IntConst(v, _) => Some(v.to_string()),
        Expr::DoubleConst(v, TypeKind::Float) => Some(format_float(*v as f32)),
        Expr::DoubleConst(v, _) => Some(format_double(*v)),
        other => other.as_bool_literal().map(|b| b.to_string()),
    };
    match (parts.last().and_then(part_const), part_const(&part)) {
        (Some(prev), Some(next)) => {
            if let Some(last) = parts.last_mut() {
                *last = Expr::StringL(prev + &next);
            }
        }
        _ => parts.push(part),
    }
}

pub struct Checker<'j, 'a> {
    resolver: &'j Resolver<'a>,
    bindings: &'j SpliceBindings,
    is_static: bool,
    return_type: JType,
}

impl<'j, 'a> Checker<'j, 'a> {
    pub fn new(
        resolver: &'j Resolver<'a>,
        bindings: &'j SpliceBindings,
        is_static: bool,
        return_type: JType,
    ) -> Self {
        Checker {
            resolver,
            bindings,
            is_static,
            return_type,
        }
    }

    pub fn resolver(&self) -> &'j Resolver<'a> {
        self.resolver
    }

    pub fn bindings(&self) -> &'j SpliceBindings {
        self.bindings
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn return_type(&self) -> &JType {
        &self.return_type
    }

    /// Type of a local, resolving its written type on first use.
    pub fn var_type(&self, decl: &Declarator) -> Result<JType, CompileError> {
        if let Some(ty) = decl.resolved_type() {
            return Ok(ty.clone());
        }
        let ty = self.resolver.resolve_type(&decl.type_name)?;
        if ty.is_void() {
            return Err(CompileError::type_error(format!("variable {} declared void", decl.name)));
        }
        decl.set_resolved_type(ty.clone());
        Ok(ty)
    }

    fn this_type(&self) -> Result<JType, CompileError> {
        if self.is_static {
            return Err(CompileError::type_error("this is not available in a static context"));
        }
        Ok(JType::class(self.resolver.this_class()))
    }

    fn super_name(&self) -> Result<String, CompileError> {
        self.resolver
            .this_model()?
            .super_name
            .clone()
            .ok_or_else(|| CompileError::type_error(format!("{} has no superclass", self.resolver.this_class())))
    }

    fn keyword_type(&self, keyword: Keyword) -> Result<JType, CompileError> {
        Ok(match keyword {
            Keyword::This => self.this_type()?,
            Keyword::Super => {
                self.this_type()?;
                JType::class(self.super_name()?)
            }
            Keyword::Null => JType::NULL,
            Keyword::True | Keyword::False => JType::BOOLEAN,
        })
    }

    /// Computes the type of `expr`, reporting any type error in it.
    pub fn type_of(&self, expr: &Expr) -> Result<JType, CompileError> {
        match expr {
            Expr::IntConst(_, kind) | Expr::DoubleConst(_, kind) => Ok(JType::prim(*kind)),
            Expr::StringL(_) | Expr::Concat(_) => Ok(JType::string()),
            Expr::Keyword(k) => self.keyword_type(*k),
            Expr::Variable(decl) => self.var_type(decl),
            Expr::Name(_) | Expr::Field(..) => match self.probe(expr)? {
                Probe::Value(ty) => Ok(ty),
                Probe::Class(_) | Probe::Package(_) => {
                    Err(CompileError::type_error(format!("{} is not a value", expr)))
                }
            },
            Expr::Unary(op, operand) => {
                let ty = self.type_of(operand)?;
                let promoted = unary_promotion(&ty)
                    .filter(|p| *op != UnaryOp::BitNot || matches!(p.kind, TypeKind::Int | TypeKind::Long));
                promoted.ok_or_else(|| CompileError::type_error(format!("bad operand type {} in {}", ty, expr)))
            }
            Expr::Binary(op, l, r) => {
                let (lt, rt) = (self.type_of(l)?, self.type_of(r)?);
                self.binary_type(*op, &lt, &rt)
                    .ok_or_else(|| CompileError::type_error(format!("bad operand types {} and {} in {}", lt, rt, expr)))
            }
            Expr::Compare(op, l, r) => {
                let (lt, rt) = (self.type_of(l)?, self.type_of(r)?);
                let ok = match op {
                    CompareOp::Eq | CompareOp::Ne => {
                        (lt.is_numeric() && rt.is_numeric())
                            || (lt.is_boolean() && rt.is_boolean())
                            || (lt.is_reference()
                                && rt.is_reference()
                                && (self.resolver.is_assignable(&lt, &rt) || self.resolver.is_assignable(&rt, &lt)))
                    }
                    _ => lt.is_numeric() && rt.is_numeric(),
                };
                if !ok {
                    return Err(CompileError::type_error(format!("incomparable types {} and {} in {}", lt, rt, expr)));
                }
                Ok(JType::BOOLEAN)
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                self.check_boolean(l)?;
                self.check_boolean(r)?;
                Ok(JType::BOOLEAN)
            }
            Expr::Not(operand) => {
                self.check_boolean(operand)?;
                Ok(JType::BOOLEAN)
            }
            Expr::Instanceof(operand, ty) => {
                let from = self.type_of(operand)?;
                let to = self.resolver.resolve_type(ty)?;
                if !from.is_reference() || !to.is_reference() {
                    return Err(CompileError::type_error(format!("bad instanceof in {}", expr)));
                }
                Ok(JType::BOOLEAN)
            }
            Expr::Cast(ty, operand) => self.cast_type(ty, operand, expr),
            Expr::Conditional(cond, a, b) => {
                self.check_boolean(cond)?;
                let (at, bt) = (self.type_of(a)?, self.type_of(b)?);
                self.conditional_type(&at, &bt)
                    .ok_or_else(|| CompileError::type_error(format!("incompatible branches {} and {} in {}", at, bt, expr)))
            }
            Expr::Assign { op, target, value } => {
                let tt = self.lvalue_type(target)?;
                if let Expr::ArrayInit(items) = value.as_ref() {
                    if op.is_none() {
                        self.check_array_items(items, &tt)?;
                        return Ok(tt);
                    }
                }
                let vt = self.type_of(value)?;
                match op {
                    None => self.check_assignable(value, &vt, &tt)?,
                    Some(BinOp::Add) if tt.is_string() => {}
                    Some(op) => {
                        let result = self.binary_type(*op, &tt, &vt);
                        if !result.is_some_and(|r| r.is_numeric() || r.is_boolean()) || !(tt.is_numeric() || tt.is_boolean()) {
                            return Err(CompileError::type_error(format!("bad operand types {} and {} in {}", tt, vt, expr)));
                        }
                    }
                }
                Ok(tt)
            }
            Expr::IncDec { target, .. } => {
                let tt = self.lvalue_type(target)?;
                if !tt.is_numeric() {
                    return Err(CompileError::type_error(format!("bad operand type {} in {}", tt, expr)));
                }
                Ok(tt)
            }
            Expr::ClassLit(ty) => {
                self.resolver.resolve_type(ty)?;
                Ok(JType::class("java/lang/Class"))
            }
            Expr::Index(array, index) => {
                let at = self.type_of(array)?;
                let it = self.type_of(index)?;
                if unary_promotion(&it) != Some(JType::INT) {
                    return Err(CompileError::type_error(format!("array index of type {} in {}", it, expr)));
                }
                at.element()
                    .ok_or_else(|| CompileError::type_error(format!("{} is not an array in {}", at, expr)))
            }
            Expr::Call { target, name, args } => self.call_type(target.as_deref(), name, args),
            Expr::New { class, args } => {
                let ty = self.resolver.resolve_type(class)?;
                let name = ty.class_name.clone().unwrap_or_default();
                let model = self.resolver.get_class(&name)?;
                if model.is_interface() || model.is_abstract() {
                    return Err(CompileError::type_error(format!("{} is abstract; cannot be instantiated", ty)));
                }
                let args = self.expand_args(args)?;
                self.resolver.lookup_method(&name, "<init>", &self.arg_types(&args)?)?;
                Ok(ty)
            }
            Expr::NewArray {
                elem,
                dims,
                extra_dims,
                init,
            } => {
                let base = self.resolver.resolve_type(elem)?;
                for dim in dims {
                    let dt = self.type_of(dim)?;
                    if unary_promotion(&dt) != Some(JType::INT) {
                        return Err(CompileError::type_error(format!("array dimension of type {} in {}", dt, expr)));
                    }
                }
                let ty = base.array_of(dims.len() as u8 + extra_dims);
                if let Some(items) = init {
                    self.check_array_items(items, &ty)?;
                }
                Ok(ty)
            }
            Expr::ArrayInit(_) => Err(CompileError::type_error(
                "array initializer is only allowed with a declared array type",
            )),
        }
    }

    fn check_boolean(&self, expr: &Expr) -> Result<(), CompileError> {
        let ty = self.type_of(expr)?;
        if !ty.is_boolean() {
            return Err(CompileError::type_error(format!("{} is {}, not boolean", expr, ty)));
        }
        Ok(())
    }

    /// Result type of `l op r`, `None` when the operands do not fit the operator.
    pub fn binary_type(&self, op: BinOp, l: &JType, r: &JType) -> Option<JType> {
        if op == BinOp::Add && (l.is_string() || r.is_string()) {
            return (!l.is_void() && !r.is_void()).then(JType::string);
        }
        if op.is_bitwise() && l.is_boolean() && r.is_boolean() {
            return Some(JType::BOOLEAN);
        }
        if op.is_shift() || op.is_bitwise() {
            let integral = |t: &JType| unary_promotion(t).is_some_and(|p| matches!(p.kind, TypeKind::Int | TypeKind::Long));
            if !integral(l) || !integral(r) {
                return None;
            }
            if op.is_shift() {
                return unary_promotion(l);
            }
        }
        binary_promotion(l, r)
    }

    fn conditional_type(&self, a: &JType, b: &JType) -> Option<JType> {
        if a == b {
            return Some(a.clone());
        }
        if a.is_numeric() && b.is_numeric() {
            return binary_promotion(a, b);
        }
        if !a.is_reference() || !b.is_reference() {
            return None;
        }
        if a.is_null() {
            return Some(b.clone());
        }
        if b.is_null() || self.resolver.is_assignable(b, a) {
            return Some(a.clone());
        }
        if self.resolver.is_assignable(a, b) {
            return Some(b.clone());
        }
        Some(JType::object())
    }

    fn cast_type(&self, ty: &TypeName, operand: &Expr, expr: &Expr) -> Result<JType, CompileError> {
        let from = self.type_of(operand)?;
        if ty.is_splice_marker(splice::RETURN_CAST) {
            return Ok(self.bindings.return_cast_type());
        }
        if ty.is_splice_marker(splice::BOX_CAST) {
            return Ok(splice::boxed_type(&from));
        }
        let to = self.resolver.resolve_type(ty)?;
        let ok = if from.is_reference() && to.is_reference() {
            true
        } else if from.is_numeric() && to.is_numeric() {
            true
        } else {
            from.is_boolean() && to.is_boolean()
        };
        if !ok {
            return Err(CompileError::type_error(format!("cannot cast {} to {} in {}", from, to, expr)));
        }
        Ok(to)
    }

    /// Type of an assignment target, rejecting anything not assignable.
    fn lvalue_type(&self, target: &Expr) -> Result<JType, CompileError> {
        match target {
            Expr::Variable(decl) => self.var_type(decl),
            Expr::Index(..) => self.type_of(target),
            Expr::Name(name) if SpliceBindings::is_pseudo_name(name) => {
                Err(CompileError::type_error(format!("cannot assign to {}", name)))
            }
            Expr::Name(_) | Expr::Field(..) => match self.field_target(target)? {
                Some(FieldTarget::ArrayLength(_)) | None => {
                    Err(CompileError::type_error(format!("cannot assign to {}", target)))
                }
                Some(FieldTarget::Static { field, .. }) | Some(FieldTarget::Instance { field, .. }) => {
                    field.field_type()
                }
            },
            other => Err(CompileError::type_error(format!("{} is not assignable", other))),
        }
    }

    /// Accepts an assignment of `value` (of type `from`) to a `to` location.
    /// Int constants that fit may narrow to byte, short or char.
    pub fn check_assignable(&self, value: &Expr, from: &JType, to: &JType) -> Result<(), CompileError> {
        if self.resolver.is_assignable(from, to) {
            return Ok(());
        }
        if to.dim == 0 && matches!(to.kind, TypeKind::Byte | TypeKind::Short | TypeKind::Char) {
            if let Some(Const::Int(v, _)) = self.constant_value(value) {
                if from.is_int_family() && int_constant_fits(v as i64, to.kind) {
                    return Ok(());
                }
            }
        }
        Err(CompileError::type_error(format!(
            "incompatible types: {} cannot be converted to {} in {}",
            from, to, value
        )))
    }

    fn check_array_items(&self, items: &[Expr], array: &JType) -> Result<(), CompileError> {
        let elem = array
            .element()
            .ok_or_else(|| CompileError::type_error(format!("array initializer for non-array type {}", array)))?;
        for item in items {
            match item {
                Expr::ArrayInit(inner) => self.check_array_items(inner, &elem)?,
                other => {
                    let ty = self.type_of(other)?;
                    self.check_assignable(other, &ty, &elem)?;
                }
            }
        }
        Ok(())
    }

    /// Classifies a name or dotted prefix, trying fields first, then classes,
    /// then packages.
    pub fn probe(&self, expr: &Expr) -> Result<Probe, CompileError> {
        match expr {
            Expr::Name(name) => {
                if let Some(ty) = self.bindings.name_type(name) {
                    return ty.map(Probe::Value);
                }
                if let Some(target) = self.field_target(expr)? {
                    return Ok(Probe::Value(self.field_target_type(&target)?));
                }
                Ok(match self.resolver.find_class(name) {
                    Some(class) => Probe::Class(class),
                    None => Probe::Package(name.clone()),
                })
            }
            Expr::Field(inner, name) => match self.probe(inner)? {
                Probe::Value(_) => match self.field_target(expr)? {
                    Some(target) => Ok(Probe::Value(self.field_target_type(&target)?)),
                    None => Err(CompileError::NoSuchField { name: expr.to_string() }),
                },
                Probe::Class(class) => match self.field_target(expr)? {
                    Some(target) => Ok(Probe::Value(self.field_target_type(&target)?)),
                    None => Ok(Probe::Class(format!("{}${}", class, name))),
                },
                Probe::Package(prefix) => {
                    let dotted = format!("{}.{}", prefix, name);
                    Ok(match self.resolver.find_class(&dotted) {
                        Some(class) => Probe::Class(class),
                        None => Probe::Package(dotted),
                    })
                }
            },
            other => self.type_of(other).map(Probe::Value),
        }
    }

    fn field_target_type(&self, target: &FieldTarget<'_>) -> Result<JType, CompileError> {
        match target {
            FieldTarget::ArrayLength(_) => Ok(JType::INT),
            FieldTarget::Static { field, .. } | FieldTarget::Instance { field, .. } => field.field_type(),
        }
    }

    /// Resolves a field access. `Ok(None)` means `expr` names no field, which
    /// lets [`Checker::probe`] retry it as a class or package.
    pub fn field_target<'e>(&self, expr: &'e Expr) -> Result<Option<FieldTarget<'e>>, CompileError> {
        match expr {
            Expr::Name(name) => {
                if SpliceBindings::is_pseudo_name(name) {
                    return Ok(None);
                }
                let this_class = self.resolver.this_class();
                if let Some((owner, field)) = self.resolver.find_field(this_class, name) {
                    if field.is_static() {
                        return Ok(Some(FieldTarget::Static { owner, field }));
                    }
                    if self.is_static {
                        return Err(CompileError::type_error(format!(
                            "non-static field {} referenced from a static context",
                            name
                        )));
                    }
                    return Ok(Some(FieldTarget::Instance {
                        receiver: None,
                        owner,
                        field,
                    }));
                }
                // static fields of lexically enclosing classes
                let mut outer = self.resolver.this_model().ok().and_then(|m| m.outer.clone());
                while let Some(class) = outer {
                    if let Some((owner, field)) = self.resolver.find_field(&class, name) {
                        if field.is_static() {
                            return Ok(Some(FieldTarget::Static { owner, field }));
                        }
                    }
                    outer = self.resolver.get_class(&class).ok().and_then(|m| m.outer.clone());
                }
                Ok(None)
            }
            Expr::Field(inner, name) => match self.probe(inner)? {
                Probe::Value(ty) => {
                    if ty.is_array() {
                        if name == "length" {
                            return Ok(Some(FieldTarget::ArrayLength(inner)));
                        }
                        return Err(CompileError::NoSuchField { name: expr.to_string() });
                    }
                    let class = match (&ty.class_name, ty.kind) {
                        (Some(class), TypeKind::Class) => class.clone(),
                        _ => {
                            return Err(CompileError::type_error(format!("{} of type {} has no fields", inner, ty)))
                        }
                    };
                    let (owner, field) = self.resolver.lookup_field(&class, name)?;
                    if field.is_static() {
                        return Ok(Some(FieldTarget::Static { owner, field }));
                    }
                    Ok(Some(FieldTarget::Instance {
                        receiver: Some(inner),
                        owner,
                        field,
                    }))
                }
                Probe::Class(class) => match self.resolver.find_field(&class, name) {
                    Some((owner, field)) if field.is_static() => Ok(Some(FieldTarget::Static { owner, field })),
                    Some(_) => Err(CompileError::type_error(format!(
                        "non-static field {} referenced from a static context",
                        expr
                    ))),
                    None => {
                        // `Outer.Inner` is a class, not a field
                        let nested = format!("{}${}", class, name);
                        if self.resolver.get_class(&nested).is_ok() {
                            return Ok(None);
                        }
                        Err(CompileError::NoSuchField { name: expr.to_string() })
                    }
                },
                Probe::Package(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Replaces `$$` in an argument list with the bound parameters.
    pub fn expand_args<'e>(&self, args: &'e [Expr]) -> Result<Cow<'e, [Expr]>, CompileError> {
        let spliced = |e: &Expr| matches!(e, Expr::Name(n) if n == splice::SPLICED_ARGS);
        if !args.iter().any(spliced) {
            return Ok(Cow::Borrowed(args));
        }
        let params = self.bindings.params()?;
        let mut out = Vec::with_capacity(args.len() + params.decls.len());
        for arg in args {
            if spliced(arg) {
                out.extend(params.decls.iter().map(|d| Expr::Variable(d.clone())));
            } else {
                out.push(arg.clone());
            }
        }
        Ok(Cow::Owned(out))
    }

    pub fn arg_types(&self, args: &[Expr]) -> Result<Vec<JType>, CompileError> {
        args.iter().map(|a| self.type_of(a)).collect()
    }

    fn call_type(&self, target: Option<&Expr>, name: &str, args: &[Expr]) -> Result<JType, CompileError> {
        if target.is_none() {
            match name {
                splice::PROCEED => {
                    let args = self.expand_args(args)?;
                    return self.bindings.proceed()?.result_type(self, &args);
                }
                splice::CFLOW => {
                    self.bindings.cflow_field(args)?;
                    return Ok(JType::INT);
                }
                _ => {}
            }
        }
        let args = self.expand_args(args)?;
        let arg_types = self.arg_types(&args)?;
        self.call_target(target, name, &arg_types)?.resolved.return_type()
    }

    fn invoke_kind(&self, owner: &ClassModel, method: &ResolvedMethod) -> InvokeKind {
        if method.method.is_static() {
            InvokeKind::Static
        } else if method.method.is_private() && method.declaring.name == self.resolver.this_class() {
            InvokeKind::Special
        } else if owner.is_interface() {
            InvokeKind::Interface
        } else {
            InvokeKind::Virtual
        }
    }

    /// Resolves the method a call refers to and how it is invoked.
    pub fn call_target<'e>(
        &self,
        target: Option<&'e Expr>,
        name: &str,
        arg_types: &[JType],
    ) -> Result<CallTarget<'e>, CompileError> {
        match target {
            // this(...) and super(...)
            Some(Expr::Keyword(keyword @ (Keyword::This | Keyword::Super))) if name == "<init>" => {
                self.this_type()?;
                let owner = match keyword {
                    Keyword::This => self.resolver.this_class().to_string(),
                    _ => self.super_name()?,
                };
                let resolved = self.resolver.lookup_method(&owner, name, arg_types)?;
                Ok(CallTarget {
                    receiver: Receiver::This,
                    resolved,
                    kind: InvokeKind::Special,
                    owner,
                })
            }
            Some(Expr::Keyword(Keyword::Super)) => {
                self.this_type()?;
                let owner = self.super_name()?;
                let resolved = self.resolver.lookup_method(&owner, name, arg_types)?;
                if resolved.method.is_static() {
                    return Ok(CallTarget {
                        receiver: Receiver::Static,
                        kind: InvokeKind::Static,
                        resolved,
                        owner,
                    });
                }
                Ok(CallTarget {
                    receiver: Receiver::This,
                    resolved,
                    kind: InvokeKind::Special,
                    owner,
                })
            }
            None => self.unqualified_call(name, arg_types),
            Some(target) => match self.probe(target)? {
                Probe::Value(ty) => {
                    let (lookup_class, owner) = if ty.is_array() {
                        (OBJECT.to_string(), ty.class_ref_name())
                    } else if let (TypeKind::Class, Some(class)) = (ty.kind, &ty.class_name) {
                        (class.clone(), class.clone())
                    } else {
                        return Err(CompileError::type_error(format!(
                            "cannot call {} on {} of type {}",
                            name, target, ty
                        )));
                    };
                    let resolved = self.resolver.lookup_method(&lookup_class, name, arg_types)?;
                    let model = self.resolver.get_class(&lookup_class)?;
                    let kind = self.invoke_kind(&model, &resolved);
                    let receiver = if kind == InvokeKind::Static {
                        Receiver::Static
                    } else {
                        Receiver::Value(target)
                    };
                    Ok(CallTarget {
                        receiver,
                        resolved,
                        kind,
                        owner,
                    })
                }
                Probe::Class(class) => {
                    let resolved = self.resolver.lookup_method(&class, name, arg_types)?;
                    if !resolved.method.is_static() {
                        return Err(CompileError::type_error(format!(
                            "non-static method {} cannot be referenced from a static context",
                            name
                        )));
                    }
                    Ok(CallTarget {
                        receiver: Receiver::Static,
                        resolved,
                        kind: InvokeKind::Static,
                        owner: class,
                    })
                }
                Probe::Package(package) => Err(CompileError::NoSuchClass { name: package }),
            },
        }
    }

    fn unqualified_call<'e>(&self, name: &str, arg_types: &[JType]) -> Result<CallTarget<'e>, CompileError> {
        let this_class = self.resolver.this_class().to_string();
        let first_error = match self.resolver.lookup_method(&this_class, name, arg_types) {
            Ok(resolved) => {
                let model = self.resolver.this_model()?;
                let kind = self.invoke_kind(&model, &resolved);
                let receiver = if kind == InvokeKind::Static {
                    Receiver::Static
                } else if self.is_static {
                    return Err(CompileError::type_error(format!(
                        "non-static method {} cannot be referenced from a static context",
                        name
                    )));
                } else {
                    Receiver::This
                };
                return Ok(CallTarget {
                    receiver,
                    resolved,
                    kind,
                    owner: this_class,
                });
            }
            Err(e) => e,
        };
        // static methods of lexically enclosing classes
        let mut outer = self.resolver.this_model()?.outer.clone();
        while let Some(class) = outer {
            if let Ok(resolved) = self.resolver.lookup_method(&class, name, arg_types) {
                if resolved.method.is_static() {
                    return Ok(CallTarget {
                        receiver: Receiver::Static,
                        resolved,
                        kind: InvokeKind::Static,
                        owner: class,
                    });
                }
            }
            outer = self.resolver.get_class(&class)?.outer.clone();
        }
        Err(first_error)
    }

    /// The compile-time value of `expr`, if it has one.
    pub fn constant_value(&self, expr: &Expr) -> Option<Const> {
        match expr {
            Expr::IntConst(v, TypeKind::Long) => Some(Const::Long(*v)),
            Expr::IntConst(v, kind) => Some(Const::Int(*v as i32, *kind)),
            Expr::DoubleConst(v, TypeKind::Float) => Some(Const::Float(*v as f32)),
            Expr::DoubleConst(v, _) => Some(Const::Double(*v)),
            Expr::StringL(s) => Some(Const::Str(s.clone())),
            Expr::Keyword(Keyword::True) => Some(Const::Bool(true)),
            Expr::Keyword(Keyword::False) => Some(Const::Bool(false)),
            Expr::Name(_) | Expr::Field(..) => match self.field_target(expr).ok()?? {
                FieldTarget::Static { field, .. } if field.access.contains(FieldAccessFlags::FINAL) => {
                    let ty = field.field_type().ok()?;
                    field.constant.as_ref().map(|c| Const::from_field(c, &ty))
                }
                _ => None,
            },
            Expr::Unary(op, operand) => {
                let c = self.constant_value(operand)?;
                let kind = unary_promotion(&JType::prim(c.kind()))?.kind;
                match (op, c.convert(kind)?) {
                    (UnaryOp::Plus, c) => Some(c),
                    (UnaryOp::Neg, Const::Int(v, k)) => Some(Const::Int(v.wrapping_neg(), k)),
                    (UnaryOp::Neg, Const::Long(v)) => Some(Const::Long(v.wrapping_neg())),
                    (UnaryOp::Neg, Const::Float(v)) => Some(Const::Float(-v)),
                    (UnaryOp::Neg, Const::Double(v)) => Some(Const::Double(-v)),
                    (UnaryOp::BitNot, Const::Int(v, k)) => Some(Const::Int(!v, k)),
                    (UnaryOp::BitNot, Const::Long(v)) => Some(Const::Long(!v)),
                    _ => None,
                }
            }
            Expr::Binary(op, l, r) => fold_binary(*op, &self.constant_value(l)?, &self.constant_value(r)?),
            Expr::Compare(op, l, r) => {
                fold_compare(*op, &self.constant_value(l)?, &self.constant_value(r)?).map(Const::Bool)
            }
            Expr::And(l, r) | Expr::Or(l, r) => match (self.constant_value(l)?, self.constant_value(r)?) {
                (Const::Bool(a), Const::Bool(b)) => {
                    Some(Const::Bool(if matches!(expr, Expr::And(..)) { a && b } else { a || b }))
                }
                _ => None,
            },
            Expr::Not(operand) => match self.constant_value(operand)? {
                Const::Bool(b) => Some(Const::Bool(!b)),
                _ => None,
            },
            Expr::Cast(ty, operand) => {
                let c = self.constant_value(operand)?;
                match ty {
                    TypeName::Primitive(kind) => c.convert(*kind),
                    TypeName::Class(_) if matches!(c, Const::Str(_)) => {
                        let to = self.resolver.resolve_type(ty).ok()?;
                        to.is_string().then_some(c)
                    }
                    _ => None,
                }
            }
            Expr::Conditional(cond, a, b) => {
                let Const::Bool(pick) = self.constant_value(cond)? else {
                    return None;
                };
                let (a, b) = (self.constant_value(a)?, self.constant_value(b)?);
                let ty = self.type_of(expr).ok()?;
                let chosen = if pick { a } else { b };
                if ty.is_numeric() {
                    chosen.convert(ty.kind)
                } else {
                    Some(chosen)
                }
            }
            _ => None,
        }
    }

    /// Checks children of an assignment target without folding the target.
    fn check_lvalue(&self, target: &mut Expr) -> Result<(), CompileError> {
        match target {
            Expr::Index(array, index) => {
                self.check_expr(array)?;
                self.check_expr(index)?;
            }
            Expr::Field(inner, _) => {
                if matches!(self.probe(inner)?, Probe::Value(_)) {
                    self.check_expr(inner)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_args(&self, args: &mut [Expr]) -> Result<(), CompileError> {
        for arg in args {
            if !matches!(arg, Expr::Name(n) if n == splice::SPLICED_ARGS) {
                self.check_expr(arg)?;
            }
        }
        Ok(())
    }

    /// Checks `expr`, rewriting it in place, and returns its type.
    pub fn check_expr(&self, expr: &mut Expr) -> Result<JType, CompileError> {
        match expr {
            Expr::Unary(_, a) | Expr::Not(a) | Expr::Cast(_, a) | Expr::Instanceof(a, _) => {
                self.check_expr(a)?;
            }
            Expr::Binary(_, l, r) | Expr::Compare(_, l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
                self.check_expr(l)?;
                self.check_expr(r)?;
            }
            Expr::Conditional(cond, a, b) => {
                self.check_expr(cond)?;
                self.check_expr(a)?;
                self.check_expr(b)?;
            }
            Expr::Assign { target, value, .. } => {
                self.check_lvalue(target)?;
                if let Expr::ArrayInit(items) = value.as_mut() {
                    for item in items {
                        self.check_expr(item)?;
                    }
                } else {
                    self.check_expr(value)?;
                }
            }
            Expr::IncDec { target, .. } => self.check_lvalue(target)?,
            Expr::Field(inner, _) => {
                if matches!(self.probe(inner)?, Probe::Value(_)) {
                    self.check_expr(inner)?;
                }
            }
            Expr::Index(array, index) => {
                self.check_expr(array)?;
                self.check_expr(index)?;
            }
            Expr::Call { target, name, args } => {
                if let Some(target) = target {
                    if !matches!(&**target, Expr::Keyword(_)) && matches!(self.probe(target)?, Probe::Value(_)) {
                        self.check_expr(target)?;
                    }
                }
                // the argument of $cflow is a name, not a value
                if !(target.is_none() && name == splice::CFLOW) {
                    self.check_args(args)?;
                }
            }
            Expr::New { args, .. } => self.check_args(args)?,
            Expr::NewArray { dims, init, .. } => {
                for dim in dims {
                    self.check_expr(dim)?;
                }
                for item in init.iter_mut().flatten() {
                    self.check_expr(item)?;
                }
            }
            Expr::ArrayInit(items) | Expr::Concat(items) => {
                for item in items {
                    self.check_expr(item)?;
                }
            }
            _ => {}
        }

        let ty = self.type_of(expr)?;
        let is_literal = matches!(
            expr,
            Expr::IntConst(..) | Expr::DoubleConst(..) | Expr::StringL(_) | Expr::Keyword(_)
        );
        if !is_literal {
            if let Some(folded) = self.constant_value(expr) {
                *expr = folded.into_expr();
                return Ok(ty);
            }
        }

        match expr {
            Expr::Binary(BinOp::Add, l, r) if ty.is_string() => {
                let mut parts = Vec::new();
                for side in [l.as_mut(), r.as_mut()] {
                    match std::mem::replace(side, Expr::Keyword(Keyword::Null)) {
                        Expr::Concat(inner) => inner.into_iter().for_each(|p| push_concat_part(&mut parts, p)),
                        other => push_concat_part(&mut parts, other),
                    }
                }
                let single = matches!(parts.as_slice(), [Expr::StringL(_)]);
                *expr = if single { parts.remove(0) } else { Expr::Concat(parts) };
            }
            Expr::Conditional(_, a, b) if ty.is_numeric() => {
                for branch in [a, b] {
                    let bt = self.type_of(branch)?;
                    if numeric_rank(bt.kind) != numeric_rank(ty.kind) {
                        let inner = std::mem::replace(branch.as_mut(), Expr::Keyword(Keyword::Null));
                        **branch = Expr::Cast(TypeName::Primitive(ty.kind), Box::new(inner));
                    }
                }
            }
            _ => {}
        }
        Ok(ty)
    }

    /// Checks a loop or `if` condition.
    pub fn check_condition(&self, cond: &mut Expr) -> Result<(), CompileError> {
        let ty = self.check_expr(cond)?;
        if !ty.is_boolean() {
            return Err(CompileError::type_error(format!("condition {} is {}, not boolean", cond, ty)));
        }
        Ok(())
    }

    /// Checks a local's initializer against its declared type.
    pub fn check_init(&self, decl: &Declarator, init: &mut Expr) -> Result<(), CompileError> {
        let to = self.var_type(decl)?;
        if let Expr::ArrayInit(items) = init {
            for item in items.iter_mut() {
                self.check_expr(item)?;
            }
            return self.check_array_items(items, &to);
        }
        let from = self.check_expr(init)?;
        self.check_assignable(init, &from, &to)
    }

    fn check_throwable(&self, ty: &JType, what: &str) -> Result<(), CompileError> {
        let ok = match (&ty.class_name, ty.dim) {
            (Some(class), 0) => self.resolver.is_subclass(class, THROWABLE),
            _ => ty.is_null(),
        };
        if !ok {
            return Err(CompileError::type_error(format!("{} {} is not a Throwable", what, ty)));
        }
        Ok(())
    }

    fn check_block(&self, stmts: &mut [Stmt]) -> Result<(), CompileError> {
        stmts.iter_mut().try_for_each(|s| self.check_stmt(s))
    }

    pub fn check_stmt(&self, stmt: &mut Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Block(stmts) => self.check_block(stmts),
            Stmt::Decl(vars) => {
                for var in vars {
                    match &mut var.init {
                        Some(init) => self.check_init(&var.decl, init)?,
                        None => {
                            self.var_type(&var.decl)?;
                        }
                    }
                }
                Ok(())
            }
            Stmt::Expr(expr) => {
                if !matches!(
                    expr,
                    Expr::Assign { .. } | Expr::IncDec { .. } | Expr::Call { .. } | Expr::New { .. } | Expr::Cast(..)
                ) {
                    return Err(CompileError::type_error(format!("{} is not a statement", expr)));
                }
                self.check_expr(expr).map(|_| ())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_condition(cond)?;
                self.check_stmt(then_branch)?;
                match else_branch {
                    Some(e) => self.check_stmt(e),
                    None => Ok(()),
                }
            }
            Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => {
                self.check_condition(cond)?;
                self.check_stmt(body)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                self.check_block(init)?;
                if let Some(cond) = cond {
                    self.check_condition(cond)?;
                }
                for u in update {
                    self.check_expr(u)?;
                }
                self.check_stmt(body)
            }
            Stmt::Switch { selector, cases } => {
                let ty = self.check_expr(selector)?;
                if unary_promotion(&ty) != Some(JType::INT) {
                    return Err(CompileError::type_error(format!("cannot switch on {} of type {}", selector, ty)));
                }
                for case in cases {
                    for label in &mut case.labels {
                        let lt = self.check_expr(label)?;
                        if !matches!(label, Expr::IntConst(..)) || unary_promotion(&lt) != Some(JType::INT) {
                            return Err(CompileError::type_error(format!(
                                "case label {} is not an int constant",
                                label
                            )));
                        }
                    }
                    self.check_block(&mut case.body)?;
                }
                Ok(())
            }
            Stmt::Try {
                body,
                catches,
                finally,
            } => {
                self.check_block(body)?;
                for clause in catches {
                    let ty = self.var_type(&clause.param)?;
                    self.check_throwable(&ty, "catch type")?;
                    self.check_block(&mut clause.body)?;
                }
                match finally {
                    Some(f) => self.check_block(f),
                    None => Ok(()),
                }
            }
            Stmt::Synchronized { lock, body } => {
                let ty = self.check_expr(lock)?;
                if !ty.is_reference() || ty.is_null() {
                    return Err(CompileError::type_error(format!("cannot synchronize on {} of type {}", lock, ty)));
                }
                self.check_block(body)
            }
            Stmt::Return(value) => self.check_return(value.as_mut()),
            Stmt::Throw(value) => {
                let ty = self.check_expr(value)?;
                self.check_throwable(&ty, "thrown value")
            }
            Stmt::Labeled(_, inner) => self.check_stmt(inner),
            Stmt::Break(_) | Stmt::Continue(_) | Stmt::Empty => Ok(()),
        }
    }

    fn check_return(&self, value: Option<&mut Expr>) -> Result<(), CompileError> {
        match value {
            None if self.return_type.is_void() => Ok(()),
            None => Err(CompileError::type_error(format!("missing return value of type {}", self.return_type))),
            Some(value) => {
                let ty = self.check_expr(value)?;
                if self.return_type.is_void() {
                    // `return ($r) x;` in a void context discards x
                    if matches!(value, Expr::Cast(t, _) if t.is_splice_marker(splice::RETURN_CAST)) {
                        return Ok(());
                    }
                    return Err(CompileError::type_error(format!("cannot return {} from a void method", value)));
                }
                self.check_assignable(value, &ty, &self.return_type)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_pool::ClassPool;
    use crate::compile::lexer::Lexer;
    use crate::compile::parser::Parser;
    use crate::compile::symtab::SymbolTable;

    fn parse(src: &str, scope: SymbolTable) -> Expr {
        let mut parser = Parser::new(Lexer::new(src).tokenize(), scope);
        parser.parse_standalone_expression().unwrap()
    }

    fn check(src: &str) -> Result<(Expr, JType), CompileError> {
        let pool = ClassPool::with_jdk();
        let resolver = Resolver::new(&pool, "java/lang/Object", &["java.lang".to_string()]);
        let bindings = SpliceBindings::default();
        let checker = Checker::new(&resolver, &bindings, true, JType::VOID);
        let mut expr = parse(src, SymbolTable::new());
        let ty = checker.check_expr(&mut expr)?;
        Ok((expr, ty))
    }

    #[test]
    fn test_literal_kinds() {
        assert_eq!(check("1").unwrap().1, JType::INT);
        assert_eq!(check("1L").unwrap().1, JType::LONG);
        assert_eq!(check("1.5f").unwrap().1, JType::FLOAT);
        assert_eq!(check("1.5").unwrap().1, JType::DOUBLE);
        assert_eq!(check("'c'").unwrap().1, JType::CHAR);
        assert_eq!(check("\"s\"").unwrap().1, JType::string());
    }

    #[test]
    fn test_arithmetic_folds_with_promotion() {
        assert_eq!(check("1 + 2 * 3").unwrap().0, Expr::int(7));
        assert_eq!(check("1 + 2L").unwrap().0, Expr::IntConst(3, TypeKind::Long));
        assert_eq!(check("'a' + 1").unwrap().0, Expr::int(98));
        assert_eq!(check("7 / 2.0").unwrap().0, Expr::DoubleConst(3.5, TypeKind::Double));
        assert_eq!(check("2147483647 + 1").unwrap().0, Expr::int(i32::MIN));
        assert_eq!(check("1 << 33").unwrap().0, Expr::int(2));
        assert_eq!(check("-1 >>> 28").unwrap().0, Expr::int(15));
        assert_eq!(check("(byte) 200").unwrap().0, Expr::IntConst(-56, TypeKind::Byte));
    }

    #[test]
    fn test_division_by_zero_is_left_alone() {
        let (expr, ty) = check("1 / 0").unwrap();
        assert_eq!(ty, JType::INT);
        assert!(matches!(expr, Expr::Binary(BinOp::Div, ..)));
    }

    #[test]
    fn test_string_concatenation_folds() {
        assert_eq!(check("\"a\" + 1 + 1.0").unwrap().0, Expr::StringL("a11.0".into()));
        assert_eq!(check("1 + 2 + \"x\"").unwrap().0, Expr::StringL("3x".into()));
        assert_eq!(check("\"v\" + true + 'c'").unwrap().0, Expr::StringL("vtruec".into()));
    }

    #[test]
    fn test_constant_fields_fold() {
        assert_eq!(check("Integer.MAX_VALUE").unwrap().0, Expr::int(i32::MAX));
        assert_eq!(check("java.lang.Long.MAX_VALUE").unwrap().0, Expr::IntConst(i64::MAX, TypeKind::Long));
    }

    #[test]
    fn test_comparisons_and_logic_fold() {
        assert_eq!(check("1 < 2").unwrap().0, Expr::boolean(true));
        assert_eq!(check("!(1.0 == 1.0) || false").unwrap().0, Expr::boolean(false));
        assert_eq!(check("true ? 1 : 2.0").unwrap().0, Expr::DoubleConst(1.0, TypeKind::Double));
    }

    #[test]
    fn test_type_errors_name_the_expression() {
        let err = check("1 + true").unwrap_err();
        assert!(matches!(&err, CompileError::TypeError { message } if message.contains("(1 + true)")));
        assert!(check("!1").is_err());
        assert!(check("\"s\" - 1").is_err());
        assert!(check("(String) 1").is_err());
        assert!(check("1.5 & 2").is_err());
    }

    #[test]
    fn test_static_method_calls_resolve() {
        assert_eq!(check("Math.max(1, 2)").unwrap().1, JType::INT);
        assert_eq!(check("Math.max(1L, 2L)").unwrap().1, JType::LONG);
        assert_eq!(check("String.valueOf(3)").unwrap().1, JType::string());
        assert!(matches!(
            check("Math.nope(1)").unwrap_err(),
            CompileError::MethodNotFound { .. }
        ));
    }

    #[test]
    fn test_conditionals_get_promotion_casts() {
        let pool = ClassPool::with_jdk();
        let resolver = Resolver::new(&pool, "java/lang/Object", &["java.lang".to_string()]);
        let bindings = SpliceBindings::default();
        let checker = Checker::new(&resolver, &bindings, true, JType::VOID);
        let mut scope = SymbolTable::new();
        scope.declare(Declarator::bound(JType::BOOLEAN, "b", 0));
        scope.declare(Declarator::bound(JType::INT, "i", 1));
        scope.declare(Declarator::bound(JType::LONG, "l", 2));
        let mut expr = parse("b ? i : l", scope);
        assert_eq!(checker.check_expr(&mut expr).unwrap(), JType::LONG);
        let Expr::Conditional(_, a, b) = expr else {
            panic!("not a conditional");
        };
        assert!(matches!(*a, Expr::Cast(TypeName::Primitive(TypeKind::Long), _)));
        assert!(matches!(*b, Expr::Variable(_)));
    }

    #[test]
    fn test_narrowing_constants_fit() {
        let pool = ClassPool::with_jdk();
        let resolver = Resolver::new(&pool, "java/lang/Object", &[]);
        let bindings = SpliceBindings::default();
        let checker = Checker::new(&resolver, &bindings, true, JType::VOID);
        assert!(checker.check_assignable(&Expr::int(100), &JType::INT, &JType::BYTE).is_ok());
        assert!(checker.check_assignable(&Expr::int(300), &JType::INT, &JType::BYTE).is_err());
        let long = Expr::IntConst(1, TypeKind::Long);
        assert!(checker.check_assignable(&long, &JType::LONG, &JType::INT).is_err());
    }
}

//! Stack-machine code generation.
//!
//! Branches are emitted with placeholder offsets and their instruction indices
//! collected in fixup lists; each construct patches its lists before it
//! returns. `break`, `continue` and `return` travel through an explicit
//! [`Flow`] that records the enclosing loop targets and the chain of
//! `finally` / `synchronized` hooks they must run through on the way out.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use log::trace;

use super::ast::*;
use super::checker::{Checker, Const, FieldTarget, Receiver};
use super::splice::{self, SpliceBindings};
use super::types::{binary_promotion, conversion_ops, unary_promotion};
use super::CompileError;
use crate::class_pool::{ClassModel, FieldModel};
use crate::code_attribute::{Bytecode, Instruction, InvokeKind};
use crate::constant_info::ConstPool;
use crate::descriptor::{JType, TypeKind};
use crate::types::FieldAccessFlags;

const STRING_BUILDER: &str = "java/lang/StringBuilder";

/// A loop or switch that `break`/`continue` can jump to.
#[derive(Clone, Copy)]
struct Target<'p> {
    sites: &'p RefCell<Vec<usize>>,
    /// Hook depth at the loop; hooks deeper than this are crossed by the jump.
    depth: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Exit {
    Break,
    Continue,
    Return,
}

/// Jumps out of a `try` with a `finally`, waiting for their tail copies.
#[derive(Default)]
struct FinallyFrame {
    exits: RefCell<Vec<(Exit, usize)>>,
    /// Where a pending return value is parked while the finally body runs.
    ret_slot: Cell<Option<u16>>,
}

enum HookKind<'p> {
    Monitor { slot: u16 },
    Finally(&'p FinallyFrame),
}

struct Hook<'p> {
    kind: HookKind<'p>,
    next: Option<&'p Hook<'p>>,
    depth: usize,
}

/// Control-flow context of the statement being generated.
#[derive(Clone, Copy, Default)]
pub struct Flow<'p> {
    hooks: Option<&'p Hook<'p>>,
    break_to: Option<Target<'p>>,
    continue_to: Option<Target<'p>>,
}

impl<'p> Flow<'p> {
    fn depth(&self) -> usize {
        self.hooks.map_or(0, |h| h.depth)
    }

    fn with_hook<'q>(self, hook: &'q Hook<'q>) -> Flow<'q>
    where
        'p: 'q,
    {
        Flow {
            hooks: Some(hook),
            break_to: self.break_to,
            continue_to: self.continue_to,
        }
    }

    /// A flow for a loop body (`continues` given) or a switch body.
    fn with_loop<'q>(
        self,
        breaks: &'q RefCell<Vec<usize>>,
        continues: Option<&'q RefCell<Vec<usize>>>,
    ) -> Flow<'q>
    where
        'p: 'q,
    {
        let depth = self.depth();
        Flow {
            hooks: self.hooks,
            break_to: Some(Target { sites: breaks, depth }),
            continue_to: continues
                .map(|sites| Target { sites, depth })
                .or(self.continue_to),
        }
    }
}

/// An assignable location. The receiver words it needs are pushed when it is
/// built.
enum LValue {
    Local { slot: u16, ty: JType },
    Field { owner: Arc<ClassModel>, field: FieldModel, ty: JType },
    Element { ty: JType },
}

impl LValue {
    fn ty(&self) -> &JType {
        match self {
            LValue::Local { ty, .. } | LValue::Field { ty, .. } | LValue::Element { ty } => ty,
        }
    }

    fn receiver_words(&self) -> u8 {
        match self {
            LValue::Local { .. } => 0,
            LValue::Field { field, .. } if field.is_static() => 0,
            LValue::Field { .. } => 1,
            LValue::Element { .. } => 2,
        }
    }
}

fn if_zero(op: CompareOp) -> fn(i16) -> Instruction {
    match op {
        CompareOp::Eq => Instruction::Ifeq,
        CompareOp::Ne => Instruction::Ifne,
        CompareOp::Lt => Instruction::Iflt,
        CompareOp::Le => Instruction::Ifle,
        CompareOp::Gt => Instruction::Ifgt,
        CompareOp::Ge => Instruction::Ifge,
    }
}

fn if_icmp(op: CompareOp) -> fn(i16) -> Instruction {
    match op {
        CompareOp::Eq => Instruction::IfIcmpeq,
        CompareOp::Ne => Instruction::IfIcmpne,
        CompareOp::Lt => Instruction::IfIcmplt,
        CompareOp::Le => Instruction::IfIcmple,
        CompareOp::Gt => Instruction::IfIcmpgt,
        CompareOp::Ge => Instruction::IfIcmpge,
    }
}

fn array_load(elem: &JType) -> Instruction {
    use Instruction::*;
    if elem.is_reference() {
        return Aaload;
    }
    match elem.kind {
        TypeKind::Boolean | TypeKind::Byte => Baload,
        TypeKind::Char => Caload,
        TypeKind::Short => Saload,
        TypeKind::Long => Laload,
        TypeKind::Float => Faload,
        TypeKind::Double => Daload,
        _ => Iaload,
    }
}

fn array_store(elem: &JType) -> Instruction {
    use Instruction::*;
    if elem.is_reference() {
        return Aastore;
    }
    match elem.kind {
        TypeKind::Boolean | TypeKind::Byte => Bastore,
        TypeKind::Char => Castore,
        TypeKind::Short => Sastore,
        TypeKind::Long => Lastore,
        TypeKind::Float => Fastore,
        TypeKind::Double => Dastore,
        _ => Iastore,
    }
}

fn arith(op: BinOp, kind: TypeKind) -> Result<Instruction, CompileError> {
    use Instruction::*;
    use TypeKind::{Double, Float, Long};
    Ok(match (op, kind) {
        (BinOp::Add, Long) => Ladd,
        (BinOp::Add, Float) => Fadd,
        (BinOp::Add, Double) => Dadd,
        (BinOp::Add, _) => Iadd,
        (BinOp::Sub, Long) => Lsub,
        (BinOp::Sub, Float) => Fsub,
        (BinOp::Sub, Double) => Dsub,
        (BinOp::Sub, _) => Isub,
        (BinOp::Mul, Long) => Lmul,
        (BinOp::Mul, Float) => Fmul,
        (BinOp::Mul, Double) => Dmul,
        (BinOp::Mul, _) => Imul,
        (BinOp::Div, Long) => Ldiv,
        (BinOp::Div, Float) => Fdiv,
        (BinOp::Div, Double) => Ddiv,
        (BinOp::Div, _) => Idiv,
        (BinOp::Rem, Long) => Lrem,
        (BinOp::Rem, Float) => Frem,
        (BinOp::Rem, Double) => Drem,
        (BinOp::Rem, _) => Irem,
        (_, Float | Double) => {
            return Err(CompileError::Fatal(format!("{} on a floating type", op.symbol())))
        }
        (BinOp::Shl, Long) => Lshl,
        (BinOp::Shl, _) => Ishl,
        (BinOp::Shr, Long) => Lshr,
        (BinOp::Shr, _) => Ishr,
        (BinOp::Ushr, Long) => Lushr,
        (BinOp::Ushr, _) => Iushr,
        (BinOp::BitAnd, Long) => Land,
        (BinOp::BitAnd, _) => Iand,
        (BinOp::BitOr, Long) => Lor,
        (BinOp::BitOr, _) => Ior,
        (BinOp::BitXor, Long) => Lxor,
        (BinOp::BitXor, _) => Ixor,
    })
}

/// `StringBuilder.append` parameter descriptor for a value of type `ty`.
fn append_descriptor(ty: &JType) -> Result<&'static str, CompileError> {
    if ty.is_string() {
        return Ok("Ljava/lang/String;");
    }
    if ty.is_reference() {
        return Ok("Ljava/lang/Object;");
    }
    Ok(match ty.kind {
        TypeKind::Boolean => "Z",
        TypeKind::Char => "C",
        TypeKind::Byte | TypeKind::Short | TypeKind::Int => "I",
        TypeKind::Long => "J",
        TypeKind::Float => "F",
        TypeKind::Double => "D",
        _ => return Err(CompileError::type_error("void value in string concatenation")),
    })
}

fn is_int_zero(expr: &Expr) -> bool {
    matches!(expr, Expr::IntConst(0, kind) if *kind != TypeKind::Long)
}

pub struct CodeGen<'j, 'a> {
    checker: Checker<'j, 'a>,
    pool: &'j mut ConstPool,
    code: &'j mut Bytecode,
}

impl<'j, 'a> CodeGen<'j, 'a> {
    pub fn new(checker: Checker<'j, 'a>, pool: &'j mut ConstPool, code: &'j mut Bytecode) -> Self {
        CodeGen { checker, pool, code }
    }

    pub fn checker(&self) -> &Checker<'j, 'a> {
        &self.checker
    }

    pub fn bytecode(&mut self) -> &mut Bytecode {
        self.code
    }

    pub fn const_pool(&mut self) -> &mut ConstPool {
        self.pool
    }

    /// Generates a statement sequence outside any loop or handler. Returns
    /// whether control can fall off its end.
    pub fn gen_statements(&mut self, stmts: &[Stmt]) -> Result<bool, CompileError> {
        self.gen_block(stmts, Flow::default())
    }

    /// `aload_0; invokespecial super.<init>()V` for constructors without an
    /// explicit `this(...)` or `super(...)` call.
    pub fn gen_implicit_super(&mut self) -> Result<(), CompileError> {
        let resolver = self.checker.resolver();
        let super_name = resolver.this_model()?.super_name.clone().ok_or_else(|| {
            CompileError::type_error(format!("{} has no superclass", resolver.this_class()))
        })?;
        let ctor = resolver.lookup_method(&super_name, "<init>", &[])?;
        self.code.emit(Instruction::Aload0);
        let index = self.pool.get_or_add_method_ref(&super_name, "<init>", &ctor.method.descriptor);
        self.code.emit_invoke(InvokeKind::Special, index, &ctor.method.descriptor)
    }

    /// Stores `value` into field `name` of the class being compiled, as a
    /// field initializer does.
    pub fn gen_field_store(&mut self, name: &str, ty: &JType, is_static: bool, value: &Expr) -> Result<(), CompileError> {
        if !is_static {
            self.code.emit(Instruction::Aload0);
        }
        self.gen_value_as(value, ty)?;
        let owner = self.checker.resolver().this_class();
        let index = self.pool.get_or_add_field_ref(owner, name, &ty.descriptor());
        self.code.emit_field_access(index, ty, is_static, true);
        Ok(())
    }

    fn local_slot(&mut self, decl: &Declarator) -> Result<u16, CompileError> {
        if let Some(slot) = decl.slot() {
            return Ok(slot);
        }
        let ty = self.checker.var_type(decl)?;
        let slot = self.code.alloc_local(ty.slot_size())?;
        trace!("local {} ({}) assigned slot {}", decl.name, ty, slot);
        decl.set_slot(slot);
        Ok(slot)
    }

    fn goto(&mut self) -> usize {
        self.code.emit_branch(Instruction::Goto)
    }

    fn pop(&mut self, ty: &JType) {
        match ty.slot_size() {
            0 => {}
            1 => {
                self.code.emit(Instruction::Pop);
            }
            _ => {
                self.code.emit(Instruction::Pop2);
            }
        }
    }

    fn ldc(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(short) => self.code.emit(Instruction::Ldc(short)),
            Err(_) => self.code.emit(Instruction::LdcW(index)),
        };
    }

    fn push_int(&mut self, value: i32) {
        use Instruction::*;
        let instr = match value {
            -1 => Iconstm1,
            0 => Iconst0,
            1 => Iconst1,
            2 => Iconst2,
            3 => Iconst3,
            4 => Iconst4,
            5 => Iconst5,
            v if i8::try_from(v).is_ok() => Bipush(v as i8),
            v if i16::try_from(v).is_ok() => Sipush(v as i16),
            v => {
                let index = self.pool.get_or_add_integer(v);
                return self.ldc(index);
            }
        };
        self.code.emit(instr);
    }

    fn push_long(&mut self, value: i64) {
        let instr = match value {
            0 => Instruction::Lconst0,
            1 => Instruction::Lconst1,
            v => Instruction::Ldc2W(self.pool.get_or_add_long(v)),
        };
        self.code.emit(instr);
    }

    fn push_float(&mut self, value: f32) {
        let instr = match value.to_bits() {
            0 => Instruction::Fconst0,
            bits if bits == 1.0f32.to_bits() => Instruction::Fconst1,
            bits if bits == 2.0f32.to_bits() => Instruction::Fconst2,
            _ => {
                let index = self.pool.get_or_add_float(value);
                return self.ldc(index);
            }
        };
        self.code.emit(instr);
    }

    fn push_double(&mut self, value: f64) {
        let instr = match value.to_bits() {
            0 => Instruction::Dconst0,
            bits if bits == 1.0f64.to_bits() => Instruction::Dconst1,
            _ => Instruction::Ldc2W(self.pool.get_or_add_double(value)),
        };
        self.code.emit(instr);
    }

    fn push_one(&mut self, kind: TypeKind) {
        let instr = match kind {
            TypeKind::Long => Instruction::Lconst1,
            TypeKind::Float => Instruction::Fconst1,
            TypeKind::Double => Instruction::Dconst1,
            _ => Instruction::Iconst1,
        };
        self.code.emit(instr);
    }

    /// Pushes the zero value of `ty`.
    fn push_default(&mut self, ty: &JType) {
        if ty.is_reference() {
            self.code.emit(Instruction::Aconstnull);
            return;
        }
        match ty.kind {
            TypeKind::Long => self.push_long(0),
            TypeKind::Float => self.push_float(0.0),
            TypeKind::Double => self.push_double(0.0),
            TypeKind::Void => {}
            _ => self.push_int(0),
        }
    }

    /// Primitive conversion of the value on top of the stack.
    fn coerce(&mut self, from: &JType, to: &JType) {
        if from.is_reference() || to.is_reference() || from.is_void() || to.is_void() {
            return;
        }
        for instr in conversion_ops(from.kind, to.kind) {
            self.code.emit(instr);
        }
    }

    fn class_index(&mut self, ty: &JType) -> u16 {
        self.pool.get_or_add_class(&ty.class_ref_name())
    }

    fn checkcast(&mut self, ty: &JType) {
        let index = self.class_index(ty);
        self.code.emit(Instruction::Checkcast(index));
    }

    fn invoke(&mut self, kind: InvokeKind, class: &str, name: &str, descriptor: &str) -> Result<(), CompileError> {
        let index = match kind {
            InvokeKind::Interface => self.pool.get_or_add_interface_method_ref(class, name, descriptor),
            _ => self.pool.get_or_add_method_ref(class, name, descriptor),
        };
        self.code.emit_invoke(kind, index, descriptor)
    }

    /// Generates `expr` and converts it to `to`. Int constants that fit a
    /// narrower target are stored as they are.
    fn gen_value_as(&mut self, expr: &Expr, to: &JType) -> Result<(), CompileError> {
        if let Expr::ArrayInit(items) = expr {
            self.gen_array_init(to, items)?;
            return Ok(());
        }
        let from = self.gen_expr(expr)?;
        let fitting_constant = matches!(expr, Expr::IntConst(_, kind) if *kind != TypeKind::Long)
            && to.is_int_family();
        if !fitting_constant {
            self.coerce(&from, to);
        }
        Ok(())
    }

    fn box_value(&mut self, ty: &JType) -> Result<(), CompileError> {
        if ty.is_void() {
            self.code.emit(Instruction::Aconstnull);
            return Ok(());
        }
        if ty.is_reference() {
            return Ok(());
        }
        let (class, _) = splice::wrapper_class(ty.kind)
            .ok_or_else(|| CompileError::Fatal(format!("no wrapper for {}", ty)))?;
        let descriptor = format!("({})L{};", ty.descriptor(), class);
        self.invoke(InvokeKind::Static, class, "valueOf", &descriptor)
    }

    fn unbox_value(&mut self, to: &JType) -> Result<(), CompileError> {
        let (class, method) = splice::wrapper_class(to.kind)
            .ok_or_else(|| CompileError::Fatal(format!("no wrapper for {}", to)))?;
        self.checkcast(&JType::class(class));
        self.invoke(InvokeKind::Virtual, class, method, &format!("(){}", to.descriptor()))
    }

    fn gen_class_literal(&mut self, ty: &JType) -> Result<JType, CompileError> {
        if ty.dim == 0 && ty.kind != TypeKind::Class {
            let wrapper = match splice::wrapper_class(ty.kind) {
                Some((class, _)) => class,
                None if ty.is_void() => "java/lang/Void",
                None => return Err(CompileError::Fatal(format!("no class literal for {}", ty))),
            };
            let index = self.pool.get_or_add_field_ref(wrapper, "TYPE", "Ljava/lang/Class;");
            self.code.emit_field_access(index, &JType::class("java/lang/Class"), true, false);
        } else {
            let index = self.class_index(ty);
            self.ldc(index);
        }
        Ok(JType::class("java/lang/Class"))
    }

    fn emit_new_array(&mut self, array: &JType) -> Result<(), CompileError> {
        let elem = array
            .element()
            .ok_or_else(|| CompileError::Fatal(format!("{} is not an array type", array)))?;
        match elem.kind.newarray_code().filter(|_| elem.dim == 0) {
            Some(code) => self.code.emit(Instruction::Newarray(code)),
            None => {
                let index = self.class_index(&elem);
                self.code.emit(Instruction::Anewarray(index))
            }
        };
        Ok(())
    }

    fn gen_array_init(&mut self, array: &JType, items: &[Expr]) -> Result<JType, CompileError> {
        let elem = array
            .element()
            .ok_or_else(|| CompileError::type_error(format!("array initializer for non-array type {}", array)))?;
        self.push_int(items.len() as i32);
        self.emit_new_array(array)?;
        for (i, item) in items.iter().enumerate() {
            self.code.emit(Instruction::Dup);
            self.push_int(i as i32);
            self.gen_value_as(item, &elem)?;
            self.code.emit(array_store(&elem));
        }
        Ok(array.clone())
    }

    fn gen_concat(&mut self, parts: &[&Expr]) -> Result<JType, CompileError> {
        let index = self.pool.get_or_add_class(STRING_BUILDER);
        self.code.emit(Instruction::New(index));
        self.code.emit(Instruction::Dup);
        self.invoke(InvokeKind::Special, STRING_BUILDER, "<init>", "()V")?;
        for part in parts {
            let ty = self.gen_expr(part)?;
            let descriptor = format!("({})L{};", append_descriptor(&ty)?, STRING_BUILDER);
            self.invoke(InvokeKind::Virtual, STRING_BUILDER, "append", &descriptor)?;
        }
        self.invoke(InvokeKind::Virtual, STRING_BUILDER, "toString", "()Ljava/lang/String;")?;
        Ok(JType::string())
    }

    /// Operands of a left-leaning string `+` chain that has not been rewritten
    /// by the checker.
    fn concat_parts<'e>(&self, expr: &'e Expr, out: &mut Vec<&'e Expr>) -> Result<(), CompileError> {
        if let Expr::Binary(BinOp::Add, l, r) = expr {
            if self.checker.type_of(expr)?.is_string() {
                self.concat_parts(l, out)?;
                out.push(r);
                return Ok(());
            }
        }
        out.push(expr);
        Ok(())
    }

    fn field_access(&mut self, owner: &ClassModel, field: &FieldModel, ty: &JType, put: bool) -> Result<(), CompileError> {
        let private = field.access.contains(FieldAccessFlags::PRIVATE);
        if self.checker.resolver().needs_accessor(owner, private) {
            let accessor = if put {
                owner.field_setter(field)?
            } else {
                owner.field_getter(field)?
            };
            return self.invoke(InvokeKind::Static, &owner.name, &accessor.name, &accessor.descriptor);
        }
        let index = self.pool.get_or_add_field_ref(&owner.name, &field.name, &field.descriptor);
        self.code.emit_field_access(index, ty, field.is_static(), put);
        Ok(())
    }

    fn gen_field_get(&mut self, target: FieldTarget<'_>) -> Result<JType, CompileError> {
        match target {
            FieldTarget::ArrayLength(array) => {
                self.gen_expr(array)?;
                self.code.emit(Instruction::Arraylength);
                Ok(JType::INT)
            }
            FieldTarget::Static { owner, field } => {
                let ty = field.field_type()?;
                self.field_access(&owner, &field, &ty, false)?;
                Ok(ty)
            }
            FieldTarget::Instance { receiver, owner, field } => {
                match receiver {
                    Some(receiver) => {
                        self.gen_expr(receiver)?;
                    }
                    None => {
                        self.code.emit(Instruction::Aload0);
                    }
                }
                let ty = field.field_type()?;
                self.field_access(&owner, &field, &ty, false)?;
                Ok(ty)
            }
        }
    }

    fn gen_pseudo(&mut self, name: &str) -> Result<JType, CompileError> {
        let bindings = self.checker.bindings();
        match name {
            splice::ARGS => {
                let params = bindings.params()?;
                self.push_int(params.decls.len() as i32);
                let index = self.pool.get_or_add_class("java/lang/Object");
                self.code.emit(Instruction::Anewarray(index));
                for (i, (decl, ty)) in params.decls.iter().zip(&params.types).enumerate() {
                    self.code.emit(Instruction::Dup);
                    self.push_int(i as i32);
                    let slot = self.local_slot(decl)?;
                    self.code.emit_load(ty, slot);
                    self.box_value(ty)?;
                    self.code.emit(Instruction::Aastore);
                }
                Ok(JType::object().array_of(1))
            }
            splice::SIG => {
                let params = bindings.params()?;
                self.push_int(params.types.len() as i32);
                let index = self.pool.get_or_add_class("java/lang/Class");
                self.code.emit(Instruction::Anewarray(index));
                for (i, ty) in params.types.iter().enumerate() {
                    self.code.emit(Instruction::Dup);
                    self.push_int(i as i32);
                    self.gen_class_literal(ty)?;
                    self.code.emit(Instruction::Aastore);
                }
                Ok(JType::class("java/lang/Class").array_of(1))
            }
            splice::TYPE => self.gen_class_literal(&bindings.dollar_type()),
            splice::CLASS => {
                let declaring = match bindings.params() {
                    Ok(params) => params.declaring.clone(),
                    Err(_) => self.checker.resolver().this_class().to_string(),
                };
                self.gen_class_literal(&JType::class(declaring))
            }
            other => Err(CompileError::type_error(format!(
                "{} may only appear in an argument list",
                other
            ))),
        }
    }

    /// `($r) e`: converts to the return type, boxing or unboxing as needed.
    fn gen_return_cast(&mut self, operand: &Expr) -> Result<JType, CompileError> {
        let ret = self.checker.bindings().return_cast_type();
        let from = self.gen_expr(operand)?;
        if ret.is_void() {
            self.pop(&from);
            return Ok(JType::VOID);
        }
        if from.is_void() {
            self.push_default(&ret);
        } else if !ret.is_reference() {
            if from.is_reference() {
                self.unbox_value(&ret)?;
            } else {
                self.coerce(&from, &ret);
            }
        } else {
            let boxed = splice::boxed_type(&from);
            self.box_value(&from)?;
            if !self.checker.resolver().is_assignable(&boxed, &ret) {
                self.checkcast(&ret);
            }
        }
        Ok(ret)
    }

    fn gen_boolean_value(&mut self, expr: &Expr) -> Result<JType, CompileError> {
        let depth = self.code.stack_depth();
        let false_sites = self.gen_cond(expr, false)?;
        self.code.emit(Instruction::Iconst1);
        if false_sites.is_empty() {
            return Ok(JType::BOOLEAN);
        }
        let end = self.goto();
        let here = self.code.pc();
        self.code.patch_all(&false_sites, here)?;
        self.code.set_stack_depth(depth);
        self.code.emit(Instruction::Iconst0);
        let here = self.code.pc();
        self.code.patch_branch(end, here)?;
        Ok(JType::BOOLEAN)
    }

    /// Generates the value of `expr` and returns its type.
    pub fn gen_expr(&mut self, expr: &Expr) -> Result<JType, CompileError> {
        match expr {
            Expr::IntConst(v, TypeKind::Long) => {
                self.push_long(*v);
                Ok(JType::LONG)
            }
            Expr::IntConst(v, kind) => {
                self.push_int(*v as i32);
                Ok(JType::prim(*kind))
            }
            Expr::DoubleConst(v, TypeKind::Float) => {
                self.push_float(*v as f32);
                Ok(JType::FLOAT)
            }
            Expr::DoubleConst(v, _) => {
                self.push_double(*v);
                Ok(JType::DOUBLE)
            }
            Expr::StringL(s) => {
                let index = self.pool.get_or_add_string(s);
                self.ldc(index);
                Ok(JType::string())
            }
            Expr::Keyword(keyword) => {
                let ty = self.checker.type_of(expr)?;
                let instr = match keyword {
                    Keyword::This | Keyword::Super => Instruction::Aload0,
                    Keyword::Null => Instruction::Aconstnull,
                    Keyword::True => Instruction::Iconst1,
                    Keyword::False => Instruction::Iconst0,
                };
                self.code.emit(instr);
                Ok(ty)
            }
            Expr::Name(name) if SpliceBindings::is_pseudo_name(name) => self.gen_pseudo(name),
            Expr::Name(_) | Expr::Field(..) => match self.checker.field_target(expr)? {
                Some(target) => self.gen_field_get(target),
                None => Err(CompileError::type_error(format!("cannot find symbol {}", expr))),
            },
            Expr::Variable(decl) => {
                let ty = self.checker.var_type(decl)?;
                let slot = self.local_slot(decl)?;
                self.code.emit_load(&ty, slot);
                Ok(ty)
            }
            Expr::Unary(op, operand) => {
                let ty = self.checker.type_of(expr)?;
                let from = self.gen_expr(operand)?;
                self.coerce(&from, &ty);
                match (op, ty.kind) {
                    (UnaryOp::Plus, _) => {}
                    (UnaryOp::Neg, TypeKind::Long) => {
                        self.code.emit(Instruction::Lneg);
                    }
                    (UnaryOp::Neg, TypeKind::Float) => {
                        self.code.emit(Instruction::Fneg);
                    }
                    (UnaryOp::Neg, TypeKind::Double) => {
                        self.code.emit(Instruction::Dneg);
                    }
                    (UnaryOp::Neg, _) => {
                        self.code.emit(Instruction::Ineg);
                    }
                    (UnaryOp::BitNot, TypeKind::Long) => {
                        self.push_long(-1);
                        self.code.emit(Instruction::Lxor);
                    }
                    (UnaryOp::BitNot, _) => {
                        self.code.emit(Instruction::Iconstm1);
                        self.code.emit(Instruction::Ixor);
                    }
                }
                Ok(ty)
            }
            Expr::Binary(op, l, r) => {
                let ty = self.checker.type_of(expr)?;
                if ty.is_string() {
                    let mut parts = Vec::new();
                    self.concat_parts(expr, &mut parts)?;
                    return self.gen_concat(&parts);
                }
                let lt = self.gen_expr(l)?;
                self.coerce(&lt, &ty);
                let rt = self.gen_expr(r)?;
                let right_ty = if op.is_shift() { JType::INT } else { ty.clone() };
                self.coerce(&rt, &right_ty);
                self.code.emit(arith(*op, ty.kind)?);
                Ok(ty)
            }
            Expr::Compare(..) | Expr::And(..) | Expr::Or(..) | Expr::Not(_) => self.gen_boolean_value(expr),
            Expr::Instanceof(operand, ty) => {
                self.gen_expr(operand)?;
                let ty = self.checker.resolver().resolve_type(ty)?;
                let index = self.class_index(&ty);
                self.code.emit(Instruction::Instanceof(index));
                Ok(JType::BOOLEAN)
            }
            Expr::Cast(ty, operand) => {
                if ty.is_splice_marker(splice::RETURN_CAST) {
                    return self.gen_return_cast(operand);
                }
                if ty.is_splice_marker(splice::BOX_CAST) {
                    let from = self.gen_expr(operand)?;
                    self.box_value(&from)?;
                    return Ok(splice::boxed_type(&from));
                }
                let to = self.checker.resolver().resolve_type(ty)?;
                let from = self.gen_expr(operand)?;
                if to.is_reference() {
                    if !self.checker.resolver().is_assignable(&from, &to) {
                        self.checkcast(&to);
                    }
                } else {
                    self.coerce(&from, &to);
                }
                Ok(to)
            }
            Expr::Conditional(cond, a, b) => {
                let ty = self.checker.type_of(expr)?;
                let depth = self.code.stack_depth();
                let else_sites = self.gen_cond(cond, false)?;
                let at = self.gen_expr(a)?;
                self.coerce(&at, &ty);
                let end = self.goto();
                let here = self.code.pc();
                self.code.patch_all(&else_sites, here)?;
                self.code.set_stack_depth(depth);
                let bt = self.gen_expr(b)?;
                self.coerce(&bt, &ty);
                let here = self.code.pc();
                self.code.patch_branch(end, here)?;
                Ok(ty)
            }
            Expr::Assign { op, target, value } => self.gen_assign(*op, target, value, true),
            Expr::IncDec {
                increment,
                prefix,
                target,
            } => self.gen_incdec(*increment, *prefix, target, true),
            Expr::ClassLit(ty) => {
                let ty = self.checker.resolver().resolve_type(ty)?;
                self.gen_class_literal(&ty)
            }
            Expr::Index(array, index) => {
                let at = self.gen_expr(array)?;
                let it = self.gen_expr(index)?;
                self.coerce(&it, &JType::INT);
                let elem = at
                    .element()
                    .ok_or_else(|| CompileError::type_error(format!("{} is not an array", array)))?;
                self.code.emit(array_load(&elem));
                Ok(elem)
            }
            Expr::Call { target, name, args } => self.gen_call(target.as_deref(), name, args),
            Expr::New { class, args } => self.gen_new(class, args),
            Expr::NewArray {
                elem,
                dims,
                extra_dims,
                init,
            } => {
                let base = self.checker.resolver().resolve_type(elem)?;
                let ty = base.array_of(dims.len() as u8 + extra_dims);
                if let Some(items) = init {
                    return self.gen_array_init(&ty, items);
                }
                for dim in dims {
                    let dt = self.gen_expr(dim)?;
                    self.coerce(&dt, &JType::INT);
                }
                match dims.len() {
                    0 => return Err(CompileError::codegen(format!("array creation {} without a size", expr))),
                    1 => self.emit_new_array(&ty)?,
                    n => {
                        let index = self.class_index(&ty);
                        self.code.emit_multianewarray(index, n as u8);
                    }
                }
                Ok(ty)
            }
            Expr::ArrayInit(_) => Err(CompileError::type_error(
                "array initializer is only allowed with a declared array type",
            )),
            Expr::Concat(parts) => {
                let parts: Vec<&Expr> = parts.iter().collect();
                self.gen_concat(&parts)
            }
        }
    }

    fn gen_call(&mut self, target: Option<&Expr>, name: &str, args: &[Expr]) -> Result<JType, CompileError> {
        let bindings = self.checker.bindings();
        if target.is_none() && name == splice::PROCEED {
            let args = self.checker.expand_args(args)?;
            return bindings.proceed()?.emit(self, &args);
        }
        if target.is_none() && name == splice::CFLOW {
            let field = bindings.cflow_field(args)?;
            let descriptor = format!("L{};", splice::CFLOW_CLASS);
            let index = self.pool.get_or_add_field_ref(&field.class, &field.field, &descriptor);
            self.code
                .emit_field_access(index, &JType::class(splice::CFLOW_CLASS), true, false);
            self.invoke(InvokeKind::Virtual, splice::CFLOW_CLASS, "value", "()I")?;
            return Ok(JType::INT);
        }

        let args = self.checker.expand_args(args)?;
        let arg_types = self.checker.arg_types(&args)?;
        let call = self.checker.call_target(target, name, &arg_types)?;
        let params = call.resolved.param_types()?;
        let ret = call.resolved.return_type()?;
        let declaring = Arc::clone(&call.resolved.declaring);
        let method = &call.resolved.method;
        let accessor = if self.checker.resolver().needs_accessor(&declaring, method.is_private()) {
            Some(declaring.method_accessor(method)?)
        } else {
            None
        };

        match call.receiver {
            Receiver::Static => {}
            Receiver::This => {
                self.code.emit(Instruction::Aload0);
            }
            Receiver::Value(receiver) => {
                self.gen_expr(receiver)?;
            }
        }
        for (arg, param) in args.iter().zip(&params) {
            self.gen_value_as(arg, param)?;
        }
        match accessor {
            Some(accessor) => self.invoke(InvokeKind::Static, &declaring.name, &accessor.name, &accessor.descriptor)?,
            None => self.invoke(call.kind, &call.owner, &method.name, &method.descriptor)?,
        }
        Ok(ret)
    }

    fn gen_new(&mut self, class: &TypeName, args: &[Expr]) -> Result<JType, CompileError> {
        let resolver = self.checker.resolver();
        let ty = resolver.resolve_type(class)?;
        let class_name = ty.class_ref_name();
        let args = self.checker.expand_args(args)?;
        let arg_types = self.checker.arg_types(&args)?;
        let ctor = resolver.lookup_method(&class_name, "<init>", &arg_types)?;
        let params = ctor.param_types()?;
        let accessor = if resolver.needs_accessor(&ctor.declaring, ctor.method.is_private()) {
            Some(ctor.declaring.constructor_accessor(&ctor.method)?)
        } else {
            None
        };

        let index = self.pool.get_or_add_class(&class_name);
        self.code.emit(Instruction::New(index));
        self.code.emit(Instruction::Dup);
        for (arg, param) in args.iter().zip(&params) {
            self.gen_value_as(arg, param)?;
        }
        match accessor {
            Some(accessor) => {
                // the marker argument only selects the shadow constructor
                self.code.emit(Instruction::Aconstnull);
                self.invoke(InvokeKind::Special, &class_name, "<init>", &accessor.descriptor)?;
            }
            None => self.invoke(InvokeKind::Special, &class_name, "<init>", &ctor.method.descriptor)?,
        }
        Ok(ty)
    }

    /// Builds an assignable location, pushing its receiver words.
    fn lvalue(&mut self, target: &Expr) -> Result<LValue, CompileError> {
        match target {
            Expr::Variable(decl) => Ok(LValue::Local {
                ty: self.checker.var_type(decl)?,
                slot: self.local_slot(decl)?,
            }),
            Expr::Index(array, index) => {
                let at = self.gen_expr(array)?;
                let it = self.gen_expr(index)?;
                self.coerce(&it, &JType::INT);
                let ty = at
                    .element()
                    .ok_or_else(|| CompileError::type_error(format!("{} is not an array", array)))?;
                Ok(LValue::Element { ty })
            }
            Expr::Name(name) if SpliceBindings::is_pseudo_name(name) => {
                Err(CompileError::type_error(format!("cannot assign to {}", name)))
            }
            Expr::Name(_) | Expr::Field(..) => match self.checker.field_target(target)? {
                Some(FieldTarget::Static { owner, field }) => Ok(LValue::Field {
                    ty: field.field_type()?,
                    owner,
                    field,
                }),
                Some(FieldTarget::Instance { receiver, owner, field }) => {
                    match receiver {
                        Some(receiver) => {
                            self.gen_expr(receiver)?;
                        }
                        None => {
                            self.code.emit(Instruction::Aload0);
                        }
                    }
                    Ok(LValue::Field {
                        ty: field.field_type()?,
                        owner,
                        field,
                    })
                }
                _ => Err(CompileError::type_error(format!("cannot assign to {}", target))),
            },
            other => Err(CompileError::type_error(format!("{} is not assignable", other))),
        }
    }

    fn load_lvalue(&mut self, lv: &LValue) -> Result<(), CompileError> {
        match lv {
            LValue::Local { slot, ty } => self.code.emit_load(ty, *slot),
            LValue::Field { owner, field, ty } => self.field_access(owner, field, ty, false)?,
            LValue::Element { ty } => {
                self.code.emit(array_load(ty));
            }
        }
        Ok(())
    }

    fn store_lvalue(&mut self, lv: &LValue) -> Result<(), CompileError> {
        match lv {
            LValue::Local { slot, ty } => self.code.emit_store(ty, *slot),
            LValue::Field { owner, field, ty } => self.field_access(owner, field, ty, true)?,
            LValue::Element { ty } => {
                self.code.emit(array_store(ty));
            }
        }
        Ok(())
    }

    fn dup_receiver(&mut self, lv: &LValue) {
        match lv.receiver_words() {
            0 => {}
            1 => {
                self.code.emit(Instruction::Dup);
            }
            _ => {
                self.code.emit(Instruction::Dup2);
            }
        }
    }

    /// Copies the value on top of the stack below the location's receiver.
    fn dup_result(&mut self, lv: &LValue) {
        let wide = lv.ty().slot_size() == 2;
        let instr = match (lv.receiver_words(), wide) {
            (0, false) => Instruction::Dup,
            (0, true) => Instruction::Dup2,
            (1, false) => Instruction::Dupx1,
            (1, true) => Instruction::Dup2x1,
            (_, false) => Instruction::Dupx2,
            (_, true) => Instruction::Dup2x2,
        };
        self.code.emit(instr);
    }

    /// `iinc` operand for `local op= value`, when it applies.
    fn iinc_delta(op: BinOp, ty: &JType, value: &Expr) -> Option<i16> {
        let Expr::IntConst(v, kind) = value else {
            return None;
        };
        if *ty != JType::INT || *kind == TypeKind::Long {
            return None;
        }
        let delta = match op {
            BinOp::Add => *v,
            BinOp::Sub => v.checked_neg()?,
            _ => return None,
        };
        i16::try_from(delta).ok()
    }

    fn gen_assign(&mut self, op: Option<BinOp>, target: &Expr, value: &Expr, want: bool) -> Result<JType, CompileError> {
        let lv = self.lvalue(target)?;
        let ty = lv.ty().clone();
        let result = if want { ty.clone() } else { JType::VOID };
        match op {
            None => self.gen_value_as(value, &ty)?,
            Some(op) => {
                if let LValue::Local { slot, .. } = lv {
                    if let Some(delta) = Self::iinc_delta(op, &ty, value) {
                        self.code.emit_iinc(slot, delta);
                        if want {
                            self.code.emit_load(&ty, slot);
                        }
                        return Ok(result);
                    }
                }
                self.dup_receiver(&lv);
                self.load_lvalue(&lv)?;
                if op == BinOp::Add && ty.is_string() {
                    self.gen_string_append(value)?;
                } else {
                    let vt = self.checker.type_of(value)?;
                    let promoted = self.checker.binary_type(op, &ty, &vt).ok_or_else(|| {
                        CompileError::type_error(format!("bad operand types {} and {} for {}=", ty, vt, op.symbol()))
                    })?;
                    self.coerce(&ty, &promoted);
                    let vt = self.gen_expr(value)?;
                    let right_ty = if op.is_shift() { JType::INT } else { promoted.clone() };
                    self.coerce(&vt, &right_ty);
                    self.code.emit(arith(op, promoted.kind)?);
                    self.coerce(&promoted, &ty);
                }
            }
        }
        if want {
            self.dup_result(&lv);
        }
        self.store_lvalue(&lv)?;
        Ok(result)
    }

    /// Replaces the string on top of the stack with itself plus `value`.
    fn gen_string_append(&mut self, value: &Expr) -> Result<(), CompileError> {
        self.invoke(
            InvokeKind::Static,
            "java/lang/String",
            "valueOf",
            "(Ljava/lang/Object;)Ljava/lang/String;",
        )?;
        let index = self.pool.get_or_add_class(STRING_BUILDER);
        self.code.emit(Instruction::New(index));
        self.code.emit(Instruction::Dupx1);
        self.code.emit(Instruction::Swap);
        self.invoke(InvokeKind::Special, STRING_BUILDER, "<init>", "(Ljava/lang/String;)V")?;
        let ty = self.gen_expr(value)?;
        let descriptor = format!("({})L{};", append_descriptor(&ty)?, STRING_BUILDER);
        self.invoke(InvokeKind::Virtual, STRING_BUILDER, "append", &descriptor)?;
        self.invoke(InvokeKind::Virtual, STRING_BUILDER, "toString", "()Ljava/lang/String;")
    }

    fn gen_incdec(&mut self, increment: bool, prefix: bool, target: &Expr, want: bool) -> Result<JType, CompileError> {
        let lv = self.lvalue(target)?;
        let ty = lv.ty().clone();
        let result = if want { ty.clone() } else { JType::VOID };
        if let LValue::Local { slot, .. } = lv {
            if ty == JType::INT {
                if want && !prefix {
                    self.code.emit_load(&ty, slot);
                }
                self.code.emit_iinc(slot, if increment { 1 } else { -1 });
                if want && prefix {
                    self.code.emit_load(&ty, slot);
                }
                return Ok(result);
            }
        }
        let promoted = unary_promotion(&ty)
            .ok_or_else(|| CompileError::type_error(format!("bad operand type {} in {}", ty, target)))?;
        self.dup_receiver(&lv);
        self.load_lvalue(&lv)?;
        if want && !prefix {
            self.dup_result(&lv);
        }
        self.coerce(&ty, &promoted);
        self.push_one(promoted.kind);
        let op = if increment { BinOp::Add } else { BinOp::Sub };
        self.code.emit(arith(op, promoted.kind)?);
        self.coerce(&promoted, &ty);
        if want && prefix {
            self.dup_result(&lv);
        }
        self.store_lvalue(&lv)?;
        Ok(result)
    }

    /// Evaluates `expr` for its side effects only.
    fn gen_discard(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Assign { op, target, value } => {
                self.gen_assign(*op, target, value, false)?;
            }
            Expr::IncDec {
                increment,
                prefix,
                target,
            } => {
                self.gen_incdec(*increment, *prefix, target, false)?;
            }
            other => {
                let ty = self.gen_expr(other)?;
                self.pop(&ty);
            }
        }
        Ok(())
    }

    fn literal_bool(&self, expr: &Expr) -> Option<bool> {
        expr.as_bool_literal().or_else(|| match self.checker.constant_value(expr) {
            Some(Const::Bool(b)) => Some(b),
            _ => None,
        })
    }

    /// Emits a test of `expr` that jumps when it evaluates to `jump_if`, and
    /// returns the unpatched branch sites. Control falls through otherwise.
    pub fn gen_cond(&mut self, expr: &Expr, jump_if: bool) -> Result<Vec<usize>, CompileError> {
        if let Some(value) = self.literal_bool(expr) {
            return Ok(if value == jump_if { vec![self.goto()] } else { Vec::new() });
        }
        match expr {
            Expr::Not(operand) => self.gen_cond(operand, !jump_if),
            Expr::And(l, r) => match self.literal_bool(l) {
                Some(false) => self.gen_cond(&Expr::boolean(false), jump_if),
                Some(true) => self.gen_cond(r, jump_if),
                None if jump_if => {
                    let skip = self.gen_cond(l, false)?;
                    let sites = self.gen_cond(r, true)?;
                    let here = self.code.pc();
                    self.code.patch_all(&skip, here)?;
                    Ok(sites)
                }
                None => {
                    let mut sites = self.gen_cond(l, false)?;
                    sites.extend(self.gen_cond(r, false)?);
                    Ok(sites)
                }
            },
            Expr::Or(l, r) => match self.literal_bool(l) {
                Some(true) => self.gen_cond(&Expr::boolean(true), jump_if),
                Some(false) => self.gen_cond(r, jump_if),
                None if jump_if => {
                    let mut sites = self.gen_cond(l, true)?;
                    sites.extend(self.gen_cond(r, true)?);
                    Ok(sites)
                }
                None => {
                    let skip = self.gen_cond(l, true)?;
                    let sites = self.gen_cond(r, false)?;
                    let here = self.code.pc();
                    self.code.patch_all(&skip, here)?;
                    Ok(sites)
                }
            },
            Expr::Compare(op, l, r) => self.gen_compare(*op, l, r, jump_if).map(|site| vec![site]),
            other => {
                let ty = self.gen_expr(other)?;
                if !ty.is_boolean() {
                    return Err(CompileError::type_error(format!("{} is {}, not boolean", other, ty)));
                }
                let make = if jump_if { Instruction::Ifne } else { Instruction::Ifeq };
                Ok(vec![self.code.emit_branch(make)])
            }
        }
    }

    fn gen_compare(&mut self, op: CompareOp, l: &Expr, r: &Expr, jump_if: bool) -> Result<usize, CompileError> {
        let effective = if jump_if { op } else { op.negate() };
        let (lt, rt) = (self.checker.type_of(l)?, self.checker.type_of(r)?);

        if lt.is_numeric() && rt.is_numeric() {
            let promoted = binary_promotion(&lt, &rt)
                .ok_or_else(|| CompileError::Fatal(format!("no promotion for {} and {}", lt, rt)))?;
            if promoted.kind == TypeKind::Int && is_int_zero(r) {
                let t = self.gen_expr(l)?;
                self.coerce(&t, &promoted);
                return Ok(self.code.emit_branch(if_zero(effective)));
            }
            let t = self.gen_expr(l)?;
            self.coerce(&t, &promoted);
            let t = self.gen_expr(r)?;
            self.coerce(&t, &promoted);
            // NaN must make the comparison false: g variants for < and <=
            let nan_high = matches!(op, CompareOp::Lt | CompareOp::Le);
            let compare = match promoted.kind {
                TypeKind::Int => return Ok(self.code.emit_branch(if_icmp(effective))),
                TypeKind::Long => Instruction::Lcmp,
                TypeKind::Float if nan_high => Instruction::Fcmpg,
                TypeKind::Float => Instruction::Fcmpl,
                _ if nan_high => Instruction::Dcmpg,
                _ => Instruction::Dcmpl,
            };
            self.code.emit(compare);
            return Ok(self.code.emit_branch(if_zero(effective)));
        }

        if !matches!(effective, CompareOp::Eq | CompareOp::Ne) {
            return Err(CompileError::type_error(format!(
                "operator {} on {} and {}",
                op.symbol(),
                lt,
                rt
            )));
        }
        let equal = effective == CompareOp::Eq;
        if lt.is_reference() && rt.is_reference() {
            let null_test = match (l, r) {
                (value, Expr::Keyword(Keyword::Null)) | (Expr::Keyword(Keyword::Null), value) => Some(value),
                _ => None,
            };
            if let Some(value) = null_test {
                self.gen_expr(value)?;
                let make = if equal { Instruction::Ifnull } else { Instruction::Ifnonnull };
                return Ok(self.code.emit_branch(make));
            }
            self.gen_expr(l)?;
            self.gen_expr(r)?;
            let make = if equal { Instruction::IfAcmpeq } else { Instruction::IfAcmpne };
            return Ok(self.code.emit_branch(make));
        }
        self.gen_expr(l)?;
        self.gen_expr(r)?;
        Ok(self.code.emit_branch(if_icmp(effective)))
    }

    fn gen_block(&mut self, stmts: &[Stmt], flow: Flow<'_>) -> Result<bool, CompileError> {
        let mut falls = true;
        for stmt in stmts {
            let completes = self.gen_stmt(stmt, flow)?;
            falls = falls && completes;
        }
        Ok(falls)
    }

    /// Generates `stmt`; returns whether control can continue after it.
    fn gen_stmt(&mut self, stmt: &Stmt, flow: Flow<'_>) -> Result<bool, CompileError> {
        match stmt {
            Stmt::Block(stmts) => self.gen_block(stmts, flow),
            Stmt::Empty => Ok(true),
            Stmt::Decl(vars) => {
                for var in vars {
                    let ty = self.checker.var_type(&var.decl)?;
                    let slot = self.local_slot(&var.decl)?;
                    if let Some(init) = &var.init {
                        self.gen_value_as(init, &ty)?;
                        self.code.emit_store(&ty, slot);
                    }
                }
                Ok(true)
            }
            Stmt::Expr(expr) => {
                self.gen_discard(expr)?;
                Ok(true)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let else_sites = self.gen_cond(cond, false)?;
                let then_falls = self.gen_stmt(then_branch, flow)?;
                let Some(else_branch) = else_branch else {
                    let here = self.code.pc();
                    self.code.patch_all(&else_sites, here)?;
                    // completes normally even when the condition is constant true
                    return Ok(true);
                };
                let end = then_falls.then(|| self.goto());
                let here = self.code.pc();
                self.code.patch_all(&else_sites, here)?;
                self.code.set_stack_depth(0);
                let else_falls = self.gen_stmt(else_branch, flow)?;
                if let Some(end) = end {
                    let here = self.code.pc();
                    self.code.patch_branch(end, here)?;
                }
                Ok(then_falls || (!else_sites.is_empty() && else_falls))
            }
            Stmt::While { cond, body } => self.gen_while(cond, body, flow),
            Stmt::DoWhile { body, cond } => self.gen_do_while(body, cond, flow),
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.gen_for(init, cond.as_ref(), update, body, flow),
            Stmt::Switch { selector, cases } => self.gen_switch(selector, cases, flow),
            Stmt::Try {
                body,
                catches,
                finally,
            } => self.gen_try(body, catches, finally.as_deref(), flow),
            Stmt::Synchronized { lock, body } => self.gen_synchronized(lock, body, flow),
            Stmt::Return(value) => {
                self.gen_return(value.as_ref(), flow)?;
                Ok(false)
            }
            Stmt::Throw(value) => {
                self.gen_expr(value)?;
                self.code.emit(Instruction::Athrow);
                self.code.set_stack_depth(0);
                Ok(false)
            }
            Stmt::Break(None) => {
                self.jump_out(flow, Exit::Break)?;
                Ok(false)
            }
            Stmt::Continue(None) => {
                self.jump_out(flow, Exit::Continue)?;
                Ok(false)
            }
            Stmt::Break(Some(label)) => Err(CompileError::Unsupported(format!("labeled break {}", label))),
            Stmt::Continue(Some(label)) => Err(CompileError::Unsupported(format!("labeled continue {}", label))),
            Stmt::Labeled(_, inner) => self.gen_stmt(inner, flow),
        }
    }

    fn gen_while(&mut self, cond: &Expr, body: &Stmt, flow: Flow<'_>) -> Result<bool, CompileError> {
        let breaks = RefCell::new(Vec::new());
        let continues = RefCell::new(Vec::new());
        let inner = flow.with_loop(&breaks, Some(&continues));

        let top = self.code.pc();
        let exits = self.gen_cond(cond, false)?;
        if self.gen_stmt(body, inner)? {
            self.code.emit_goto_to(top)?;
        }
        self.code.patch_all(&continues.borrow(), top)?;
        let end = self.code.pc();
        self.code.patch_all(&exits, end)?;
        self.code.patch_all(&breaks.borrow(), end)?;
        self.code.set_stack_depth(0);
        let falls = !exits.is_empty() || !breaks.borrow().is_empty();
        Ok(falls)
    }

    fn gen_do_while(&mut self, body: &Stmt, cond: &Expr, flow: Flow<'_>) -> Result<bool, CompileError> {
        let breaks = RefCell::new(Vec::new());
        let continues = RefCell::new(Vec::new());
        let inner = flow.with_loop(&breaks, Some(&continues));

        let top = self.code.pc();
        let body_falls = self.gen_stmt(body, inner)?;
        let test = self.code.pc();
        self.code.patch_all(&continues.borrow(), test)?;
        let reaches_test = body_falls || !continues.borrow().is_empty();
        if reaches_test {
            let back = self.gen_cond(cond, true)?;
            self.code.patch_all(&back, top)?;
        }
        let end = self.code.pc();
        self.code.patch_all(&breaks.borrow(), end)?;
        self.code.set_stack_depth(0);
        let always = self.literal_bool(cond) == Some(true);
        let falls = (reaches_test && !always) || !breaks.borrow().is_empty();
        Ok(falls)
    }

    fn gen_for(
        &mut self,
        init: &[Stmt],
        cond: Option<&Expr>,
        update: &[Expr],
        body: &Stmt,
        flow: Flow<'_>,
    ) -> Result<bool, CompileError> {
        for stmt in init {
            self.gen_stmt(stmt, flow)?;
        }
        let breaks = RefCell::new(Vec::new());
        let continues = RefCell::new(Vec::new());
        let inner = flow.with_loop(&breaks, Some(&continues));

        let top = self.code.pc();
        let exits = match cond {
            Some(cond) => self.gen_cond(cond, false)?,
            None => Vec::new(),
        };
        let body_falls = self.gen_stmt(body, inner)?;
        let next = self.code.pc();
        self.code.patch_all(&continues.borrow(), next)?;
        if body_falls || !continues.borrow().is_empty() {
            for expr in update {
                self.gen_discard(expr)?;
            }
            self.code.emit_goto_to(top)?;
        }
        let end = self.code.pc();
        self.code.patch_all(&exits, end)?;
        self.code.patch_all(&breaks.borrow(), end)?;
        self.code.set_stack_depth(0);
        let falls = !exits.is_empty() || !breaks.borrow().is_empty();
        Ok(falls)
    }

    fn case_key(&self, label: &Expr) -> Result<i32, CompileError> {
        let value = match label {
            Expr::IntConst(v, kind) if *kind != TypeKind::Long => i32::try_from(*v).ok(),
            other => match self.checker.constant_value(other) {
                Some(Const::Int(v, _)) => Some(v),
                _ => None,
            },
        };
        value.ok_or_else(|| CompileError::codegen(format!("case label {} is not an int constant", label)))
    }

    fn gen_switch(&mut self, selector: &Expr, cases: &[SwitchCase], flow: Flow<'_>) -> Result<bool, CompileError> {
        let ty = self.gen_expr(selector)?;
        self.coerce(&ty, &JType::INT);

        // (key, case index), sorted by key
        let mut keyed: Vec<(i32, usize)> = Vec::new();
        for (i, case) in cases.iter().enumerate() {
            for label in &case.labels {
                let key = self.case_key(label)?;
                if keyed.iter().any(|(k, _)| *k == key) {
                    return Err(CompileError::codegen(format!("duplicate case label {}", key)));
                }
                keyed.push((key, i));
            }
        }
        keyed.sort_by_key(|(k, _)| *k);
        let keys: Vec<i32> = keyed.iter().map(|(k, _)| *k).collect();
        let switch = self.code.emit_lookupswitch(&keys);
        self.code.set_stack_depth(0);

        let breaks = RefCell::new(Vec::new());
        let inner = flow.with_loop(&breaks, None);
        let mut case_pcs = Vec::with_capacity(cases.len());
        let mut default_pc = None;
        let mut last_falls = true;
        for case in cases {
            let pc = self.code.pc();
            case_pcs.push(pc);
            if case.is_default {
                default_pc = Some(pc);
            }
            last_falls = self.gen_block(&case.body, inner)?;
        }
        let end = self.code.pc();
        let targets: Vec<u32> = keyed.iter().map(|(_, i)| case_pcs[*i]).collect();
        self.code.patch_switch(switch, default_pc.unwrap_or(end), &targets)?;
        self.code.patch_all(&breaks.borrow(), end)?;
        self.code.set_stack_depth(0);
        let falls = last_falls || default_pc.is_none() || !breaks.borrow().is_empty();
        Ok(falls)
    }

    /// Leaves the innermost loop or switch, running any `finally` bodies in
    /// between through the try statement's tail code.
    fn jump_out(&mut self, flow: Flow<'_>, exit: Exit) -> Result<(), CompileError> {
        let target = match exit {
            Exit::Break => flow
                .break_to
                .ok_or_else(|| CompileError::codegen("break outside switch or loop"))?,
            Exit::Continue => flow
                .continue_to
                .ok_or_else(|| CompileError::codegen("continue outside of loop"))?,
            Exit::Return => return Err(CompileError::Fatal("return is not a jump".into())),
        };
        let mut hook = flow.hooks;
        while let Some(h) = hook {
            if h.depth <= target.depth {
                break;
            }
            match h.kind {
                HookKind::Monitor { .. } => {
                    return Err(CompileError::Unsupported(
                        "break or continue out of a synchronized block".into(),
                    ))
                }
                HookKind::Finally(frame) => {
                    let site = self.goto();
                    frame.exits.borrow_mut().push((exit, site));
                    self.code.set_stack_depth(0);
                    return Ok(());
                }
            }
            hook = h.next;
        }
        let site = self.goto();
        target.sites.borrow_mut().push(site);
        self.code.set_stack_depth(0);
        Ok(())
    }

    fn gen_return(&mut self, value: Option<&Expr>, flow: Flow<'_>) -> Result<(), CompileError> {
        let ret = self.checker.return_type().clone();
        match value {
            Some(value) => {
                let ty = self.gen_expr(value)?;
                if ret.is_void() {
                    self.pop(&ty);
                } else {
                    self.coerce(&ty, &ret);
                }
            }
            None if !ret.is_void() => {
                return Err(CompileError::codegen(format!("missing return value of type {}", ret)))
            }
            None => {}
        }
        self.return_through(flow.hooks, &ret)
    }

    /// Emits a return of the value on the stack, unlocking monitors on the
    /// way and deferring to the nearest `finally`.
    fn return_through(&mut self, hooks: Option<&Hook<'_>>, ret: &JType) -> Result<(), CompileError> {
        let mut hook = hooks;
        while let Some(h) = hook {
            match h.kind {
                HookKind::Monitor { slot } => {
                    self.code.emit_load(&JType::object(), slot);
                    self.code.emit(Instruction::Monitorexit);
                }
                HookKind::Finally(frame) => {
                    if !ret.is_void() {
                        let slot = match frame.ret_slot.get() {
                            Some(slot) => slot,
                            None => {
                                let slot = self.code.alloc_local(ret.slot_size())?;
                                frame.ret_slot.set(Some(slot));
                                slot
                            }
                        };
                        self.code.emit_store(ret, slot);
                    }
                    let site = self.goto();
                    frame.exits.borrow_mut().push((Exit::Return, site));
                    self.code.set_stack_depth(0);
                    return Ok(());
                }
            }
            hook = h.next;
        }
        self.code.emit_return(ret);
        self.code.set_stack_depth(0);
        Ok(())
    }

    /// Runs the finally body (if any) after a protected region completes
    /// normally and jumps to the end of the try statement.
    fn leave_protected(
        &mut self,
        finally: Option<&[Stmt]>,
        flow: Flow<'_>,
        end_sites: &mut Vec<usize>,
    ) -> Result<(), CompileError> {
        let falls = match finally {
            Some(body) => self.gen_block(body, flow)?,
            None => true,
        };
        if falls {
            end_sites.push(self.goto());
        }
        self.code.set_stack_depth(0);
        Ok(())
    }

    fn gen_try(
        &mut self,
        body: &[Stmt],
        catches: &[CatchClause],
        finally: Option<&[Stmt]>,
        flow: Flow<'_>,
    ) -> Result<bool, CompileError> {
        let frame = FinallyFrame::default();
        let hook = Hook {
            kind: HookKind::Finally(&frame),
            next: flow.hooks,
            depth: flow.depth() + 1,
        };
        let inner = if finally.is_some() { flow.with_hook(&hook) } else { flow };

        let start = self.code.pc();
        let body_falls = self.gen_block(body, inner)?;
        let end = self.code.pc();
        if start == end {
            return Err(CompileError::codegen("empty try block"));
        }
        let mut end_sites = Vec::new();
        if body_falls {
            self.leave_protected(finally, flow, &mut end_sites)?;
        }

        let mut covered = vec![(start, end)];
        for clause in catches {
            let ty = self.checker.var_type(&clause.param)?;
            let class = self.class_index(&ty);
            let handler = self.code.pc();
            self.code.add_exception_handler(start, end, handler, class)?;
            self.code.set_stack_depth(1);
            let slot = self.local_slot(&clause.param)?;
            self.code.emit_store(&ty, slot);
            let falls = self.gen_block(&clause.body, inner)?;
            covered.push((handler, self.code.pc()));
            if falls {
                self.leave_protected(finally, flow, &mut end_sites)?;
            }
        }

        if let Some(finally) = finally {
            let handler = self.code.pc();
            for &(from, to) in covered.iter().filter(|(from, to)| from < to) {
                self.code.add_exception_handler(from, to, handler, 0)?;
            }
            self.code.set_stack_depth(1);
            let saved = self.code.alloc_local(1)?;
            self.code.emit_store(&JType::object(), saved);
            if self.gen_block(finally, flow)? {
                self.code.emit_load(&JType::object(), saved);
                self.code.emit(Instruction::Athrow);
            }
            self.code.set_stack_depth(0);
            self.gen_finally_tails(&frame, finally, flow)?;
        }

        let after = self.code.pc();
        self.code.patch_all(&end_sites, after)?;
        self.code.set_stack_depth(0);
        Ok(!end_sites.is_empty())
    }

    /// One finally copy per kind of pending exit, each finishing that exit
    /// in the enclosing flow.
    fn gen_finally_tails(&mut self, frame: &FinallyFrame, finally: &[Stmt], flow: Flow<'_>) -> Result<(), CompileError> {
        let exits = frame.exits.take();
        let ret = self.checker.return_type().clone();
        for exit in [Exit::Break, Exit::Continue, Exit::Return] {
            let sites: Vec<usize> = exits.iter().filter(|(e, _)| *e == exit).map(|(_, s)| *s).collect();
            if sites.is_empty() {
                continue;
            }
            let here = self.code.pc();
            self.code.patch_all(&sites, here)?;
            self.code.set_stack_depth(0);
            if !self.gen_block(finally, flow)? {
                continue;
            }
            match exit {
                Exit::Return => {
                    if let Some(slot) = frame.ret_slot.get() {
                        self.code.emit_load(&ret, slot);
                    }
                    self.return_through(flow.hooks, &ret)?;
                }
                jump => self.jump_out(flow, jump)?,
            }
        }
        Ok(())
    }

    fn gen_synchronized(&mut self, lock: &Expr, body: &[Stmt], flow: Flow<'_>) -> Result<bool, CompileError> {
        let ty = self.gen_expr(lock)?;
        if !ty.is_reference() {
            return Err(CompileError::type_error(format!("cannot synchronize on {} of type {}", lock, ty)));
        }
        let object = JType::object();
        let slot = self.code.alloc_local(1)?;
        self.code.emit(Instruction::Dup);
        self.code.emit_store(&object, slot);
        self.code.emit(Instruction::Monitorenter);

        let hook = Hook {
            kind: HookKind::Monitor { slot },
            next: flow.hooks,
            depth: flow.depth() + 1,
        };
        let inner = flow.with_hook(&hook);
        let start = self.code.pc();
        let falls = self.gen_block(body, inner)?;
        if falls {
            self.code.emit_load(&object, slot);
            self.code.emit(Instruction::Monitorexit);
        }
        let end = self.code.pc();
        let exit = falls.then(|| self.goto());

        let handler = self.code.pc();
        self.code.set_stack_depth(1);
        let saved = self.code.alloc_local(1)?;
        self.code.emit_store(&object, saved);
        self.code.emit_load(&object, slot);
        self.code.emit(Instruction::Monitorexit);
        self.code.emit_load(&object, saved);
        self.code.emit(Instruction::Athrow);
        if start < end {
            self.code.add_exception_handler(start, end, handler, 0)?;
        }
        self.code.set_stack_depth(0);
        if let Some(exit) = exit {
            let here = self.code.pc();
            self.code.patch_branch(exit, here)?;
        }
        Ok(falls)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::class_pool::ClassPool;
    use crate::compile::resolver::Resolver;

    fn generate(f: impl FnOnce(&mut CodeGen<'_, '_>)) -> Vec<Instruction> {
        let classes = ClassPool::with_jdk();
        let resolver = Resolver::new(&classes, "java/lang/Object", &["java.lang".to_string()]);
        let bindings = SpliceBindings::default();
        let mut pool = ConstPool::new();
        let mut code = Bytecode::new();
        let checker = Checker::new(&resolver, &bindings, true, JType::VOID);
        f(&mut CodeGen::new(checker, &mut pool, &mut code));
        code.instructions().to_vec()
    }

    fn var(ty: JType, name: &str, slot: u16) -> Expr {
        Expr::Variable(Declarator::bound(ty, name, slot))
    }

    #[test]
    fn test_int_constants_use_shortest_form() {
        let code = generate(|gen| {
            for v in [-1, 5, 100, 1000, 100_000] {
                gen.push_int(v);
            }
        });
        use Instruction::*;
        assert_eq!(&code[..4], &[Iconstm1, Iconst5, Bipush(100), Sipush(1000)]);
        assert!(matches!(code[4], Ldc(_)));
    }

    #[test]
    fn test_compare_with_zero_tests_one_operand() {
        let x = var(JType::INT, "x", 0);
        let cond = Expr::Compare(CompareOp::Lt, Box::new(x), Box::new(Expr::int(0)));
        let code = generate(|gen| {
            gen.gen_cond(&cond, false).unwrap();
        });
        assert_eq!(code, vec![Instruction::Iload0, Instruction::Ifge(0)]);
    }

    #[test]
    fn test_float_compare_treats_nan_as_false() {
        let f = var(JType::FLOAT, "f", 0);
        let g = var(JType::FLOAT, "g", 1);
        let lt = Expr::Compare(CompareOp::Lt, Box::new(f.clone()), Box::new(g.clone()));
        let gt = Expr::Compare(CompareOp::Gt, Box::new(f), Box::new(g));
        let code = generate(|gen| {
            gen.gen_cond(&lt, true).unwrap();
            gen.gen_cond(&gt, true).unwrap();
        });
        assert!(code.contains(&Instruction::Fcmpg));
        assert!(code.contains(&Instruction::Fcmpl));
    }

    #[test]
    fn test_constant_false_and_skips_right_operand() {
        let division = Expr::Binary(BinOp::Div, Box::new(Expr::int(1)), Box::new(var(JType::INT, "z", 0)));
        let right = Expr::Compare(CompareOp::Eq, Box::new(division), Box::new(Expr::int(0)));
        let expr = Expr::And(Box::new(Expr::boolean(false)), Box::new(right));
        let code = generate(|gen| {
            gen.gen_expr(&expr).unwrap();
        });
        assert!(!code.contains(&Instruction::Idiv));
    }

    #[test]
    fn test_int_local_increment_uses_iinc() {
        let decl = Declarator::bound(JType::INT, "i", 2);
        let stmt = Stmt::Expr(Expr::IncDec {
            increment: true,
            prefix: false,
            target: Box::new(Expr::Variable(Rc::clone(&decl))),
        });
        let code = generate(|gen| {
            gen.gen_statements(&[stmt]).unwrap();
        });
        assert_eq!(code.len(), 1);
    }

    #[test]
    fn test_jumps_need_an_enclosing_loop() {
        let mut result = Ok(true);
        generate(|gen| result = gen.gen_statements(&[Stmt::Break(None)]));
        assert!(matches!(result, Err(CompileError::CodegenError { .. })));

        let mut result = Ok(true);
        let labeled = Stmt::While {
            cond: Expr::boolean(true),
            body: Box::new(Stmt::Break(Some("outer".into()))),
        };
        generate(|gen| result = gen.gen_statements(&[labeled]));
        assert!(matches!(result, Err(CompileError::Unsupported(_))));
    }

    #[test]
    fn test_append_descriptors() {
        assert_eq!(append_descriptor(&JType::string()).unwrap(), "Ljava/lang/String;");
        assert_eq!(append_descriptor(&JType::INT.array_of(1)).unwrap(), "Ljava/lang/Object;");
        assert_eq!(append_descriptor(&JType::SHORT).unwrap(), "I");
        assert_eq!(append_descriptor(&JType::CHAR).unwrap(), "C");
        assert!(append_descriptor(&JType::VOID).is_err());
    }
}

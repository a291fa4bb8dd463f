//! The compiler driver: parses source fragments against one target class and
//! produces member definitions or appends code to an open buffer.

use std::mem;
use std::rc::Rc;

use log::debug;

use super::ast::{Declarator, Expr, FieldDecl, Keyword, Member, MethodDecl, Stmt};
use super::checker::{Checker, Const};
use super::codegen::CodeGen;
use super::lexer::Lexer;
use super::parser::Parser;
use super::resolver::Resolver;
use super::splice::{CflowField, ForwardProceed, ParamBinding, ProceedHandler, SpliceBindings, RESULT};
use super::symtab::SymbolTable;
use super::{CompileError, CompileOptions};
use crate::class_pool::{ClassLookup, ConstValue, MethodModel};
use crate::code_attribute::{Bytecode, MethodCode};
use crate::constant_info::ConstPool;
use crate::descriptor::{method_descriptor, parse_method_descriptor, JType};
use crate::types::{FieldAccessFlags, MethodAccessFlags};

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledField {
    pub name: String,
    pub descriptor: String,
    pub access: FieldAccessFlags,
    /// `ConstantValue` of a static final field with a constant initializer.
    pub constant: Option<ConstValue>,
    /// Code storing the initial value, to be placed in `<init>` or `<clinit>`.
    pub initializer: Option<MethodCode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledMethod {
    pub name: String,
    pub descriptor: String,
    pub access: MethodAccessFlags,
    /// Internal names from the `throws` clause.
    pub exceptions: Vec<String>,
    /// `None` for abstract and native methods.
    pub code: Option<MethodCode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompiledMember {
    Field(CompiledField),
    Method(CompiledMethod),
}

fn field_constant(value: Const) -> Option<ConstValue> {
    Some(match value {
        Const::Int(v, _) => ConstValue::Int(v),
        Const::Bool(b) => ConstValue::Int(b as i32),
        Const::Long(v) => ConstValue::Long(v),
        Const::Float(v) => ConstValue::Float(v),
        Const::Double(v) => ConstValue::Double(v),
        Const::Str(s) => ConstValue::String(s),
    })
}

/// True when a constructor body opens with `this(...)` or `super(...)`.
fn calls_other_constructor(body: &[Stmt]) -> bool {
    match body.first() {
        Some(Stmt::Expr(Expr::Call {
            target: Some(target),
            name,
            ..
        })) => name == "<init>" && matches!(**target, Expr::Keyword(Keyword::This | Keyword::Super)),
        _ => false,
    }
}

/// Compiles source fragments in the context of one class.
///
/// Statements and expressions go into an open buffer that stays with the
/// driver until [`Javac::finish_code`]; locals declared by one
/// `compile_stmnt` call remain visible to the next.
pub struct Javac<'a> {
    resolver: Resolver<'a>,
    pool: &'a mut ConstPool,
    bytecode: Bytecode,
    symbols: SymbolTable,
    bindings: SpliceBindings,
    options: CompileOptions,
    is_static: bool,
}

impl<'a> Javac<'a> {
    pub fn new(lookup: &'a dyn ClassLookup, pool: &'a mut ConstPool, this_class: &str) -> Self {
        Self::with_options(lookup, pool, this_class, CompileOptions::default())
    }

    pub fn with_options(
        lookup: &'a dyn ClassLookup,
        pool: &'a mut ConstPool,
        this_class: &str,
        options: CompileOptions,
    ) -> Self {
        Javac {
            resolver: Resolver::new(lookup, this_class, &options.imported_packages),
            pool,
            bytecode: Bytecode::new(),
            symbols: SymbolTable::new(),
            bindings: SpliceBindings::default(),
            options,
            is_static: false,
        }
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    pub fn bytecode_mut(&mut self) -> &mut Bytecode {
        &mut self.bytecode
    }

    /// Takes the open buffer, leaving an empty one with the same locals.
    pub fn finish_code(&mut self) -> Result<MethodCode, CompileError> {
        let locals = self.bytecode.max_locals();
        mem::replace(&mut self.bytecode, Bytecode::with_locals(locals)).finish()
    }

    fn parse<T>(&mut self, src: &str, f: impl FnOnce(&mut Parser) -> Result<T, CompileError>) -> Result<T, CompileError> {
        let tokens = Lexer::new(src).tokenize();
        let mut parser = Parser::new(tokens, mem::take(&mut self.symbols));
        let result = f(&mut parser);
        self.symbols = parser.into_scope();
        result
    }

    fn return_type(&self) -> JType {
        self.bindings.return_type().cloned().unwrap_or(JType::VOID)
    }

    /// Compiles a field or method declaration.
    pub fn compile(&mut self, src: &str) -> Result<CompiledMember, CompileError> {
        debug!("compiling member of {}", self.resolver.this_class());
        match self.parse(src, Parser::parse_member)? {
            Member::Field(field) => self.compile_field(field).map(CompiledMember::Field),
            Member::Method(method) => self.compile_method(method).map(CompiledMember::Method),
        }
    }

    fn compile_field(&mut self, decl: FieldDecl) -> Result<CompiledField, CompileError> {
        let ty = self.resolver.resolve_type(&decl.ty)?;
        let access = decl.modifiers.to_field_flags();
        let is_static = access.contains(FieldAccessFlags::STATIC);
        let mut field = CompiledField {
            name: decl.name.clone(),
            descriptor: ty.descriptor(),
            access,
            constant: None,
            initializer: None,
        };
        let Some(mut init) = decl.init else {
            return Ok(field);
        };

        let holder = Declarator::bound(ty.clone(), &decl.name, 0);
        let checker = Checker::new(&self.resolver, &self.bindings, is_static, JType::VOID);
        if self.options.type_check {
            checker.check_init(&holder, &mut init)?;
        }
        if access.contains(FieldAccessFlags::STATIC | FieldAccessFlags::FINAL) {
            field.constant = checker.constant_value(&init).and_then(field_constant);
            if field.constant.is_some() {
                return Ok(field);
            }
        }
        let mut code = Bytecode::with_locals(if is_static { 0 } else { 1 });
        CodeGen::new(checker, &mut *self.pool, &mut code).gen_field_store(&decl.name, &ty, is_static, &init)?;
        field.initializer = Some(code.finish()?);
        Ok(field)
    }

    fn compile_method(&mut self, decl: MethodDecl) -> Result<CompiledMethod, CompileError> {
        let ret = self.resolver.resolve_type(&decl.return_type)?;
        let params = decl
            .params
            .iter()
            .map(|p| self.resolver.resolve_type(&p.type_name))
            .collect::<Result<Vec<_>, _>>()?;
        let descriptor = method_descriptor(&params, &ret);
        let access = decl.modifiers.to_method_flags();
        let exceptions = decl
            .throws
            .iter()
            .map(|t| self.resolver.resolve_type(t).map(|t| t.class_ref_name()))
            .collect::<Result<Vec<_>, _>>()?;
        let bodiless = access.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE);
        debug!("compiling method {}{}", decl.name, descriptor);

        let code = match (&decl.body, bodiless) {
            (None, true) => None,
            (None, false) => return Err(CompileError::type_error(format!("missing method body in {}", decl.name))),
            (Some(_), true) => {
                return Err(CompileError::type_error(format!(
                    "abstract or native method {} cannot have a body",
                    decl.name
                )))
            }
            (Some(_), false) => {
                self.resolver
                    .set_in_progress(Some(MethodModel::new(&decl.name, &descriptor, access)));
                let code = self.compile_body(&decl, &params, &ret, access);
                self.resolver.set_in_progress(None);
                Some(code?)
            }
        };
        Ok(CompiledMethod {
            name: decl.name,
            descriptor,
            access,
            exceptions,
            code,
        })
    }

    fn compile_body(
        &mut self,
        decl: &MethodDecl,
        params: &[JType],
        ret: &JType,
        access: MethodAccessFlags,
    ) -> Result<MethodCode, CompileError> {
        let is_static = access.contains(MethodAccessFlags::STATIC);
        let mut body = decl.body.clone().unwrap_or_default();
        let mut slot = if is_static { 0 } else { 1 };
        for (param, ty) in decl.params.iter().zip(params) {
            param.set_resolved_type(ty.clone());
            param.set_slot(slot);
            slot += ty.slot_size();
        }
        let mut code = Bytecode::with_locals(slot);

        let checker = Checker::new(&self.resolver, &self.bindings, is_static, ret.clone());
        if self.options.type_check {
            for stmt in body.iter_mut() {
                checker.check_stmt(stmt)?;
            }
        }
        let mut gen = CodeGen::new(checker, &mut *self.pool, &mut code);
        if decl.is_constructor() && !calls_other_constructor(&body) {
            gen.gen_implicit_super()?;
        }
        if gen.gen_statements(&body)? {
            if !ret.is_void() {
                return Err(CompileError::type_error(format!("missing return statement in {}", decl.name)));
            }
            if self.options.append_void_return {
                code.emit_return(ret);
            }
        }
        code.finish()
    }

    /// Compiles statements into the open buffer.
    pub fn compile_stmnt(&mut self, src: &str) -> Result<(), CompileError> {
        debug!("compiling statements into {}", self.resolver.this_class());
        let mut stmts = self.parse(src, Parser::parse_statements)?;
        let checker = Checker::new(&self.resolver, &self.bindings, self.is_static, self.return_type());
        if self.options.type_check {
            for stmt in stmts.iter_mut() {
                checker.check_stmt(stmt)?;
            }
        }
        CodeGen::new(checker, &mut *self.pool, &mut self.bytecode).gen_statements(&stmts)?;
        Ok(())
    }

    /// Compiles an expression into the open buffer, leaving its value on the
    /// stack, and returns its type.
    pub fn compile_expr(&mut self, src: &str) -> Result<JType, CompileError> {
        debug!("compiling expression into {}", self.resolver.this_class());
        let mut expr = self.parse(src, Parser::parse_standalone_expression)?;
        let checker = Checker::new(&self.resolver, &self.bindings, self.is_static, self.return_type());
        if self.options.type_check {
            checker.check_expr(&mut expr)?;
        }
        CodeGen::new(checker, &mut *self.pool, &mut self.bytecode).gen_expr(&expr)
    }

    /// Binds `$0` (unless static) and `$1..$n` to the leading local slots and
    /// returns the first free slot.
    pub fn record_params(&mut self, params: &[JType], is_static: bool) -> Result<u16, CompileError> {
        let declaring = self.resolver.this_class().to_string();
        self.is_static = is_static;
        let mut slot: u16 = 0;
        if !is_static {
            self.symbols.declare(Declarator::bound(JType::class(declaring.as_str()), "$0", 0));
            slot = 1;
        }
        let mut decls = Vec::with_capacity(params.len());
        for (i, ty) in params.iter().enumerate() {
            let decl = Declarator::bound(ty.clone(), &format!("${}", i + 1), slot);
            self.symbols.declare(Rc::clone(&decl));
            decls.push(decl);
            slot = slot
                .checked_add(ty.slot_size())
                .ok_or_else(|| CompileError::Fatal("too many parameter slots".into()))?;
        }
        self.bytecode.ensure_locals(slot);
        self.bindings.set_params(ParamBinding {
            decls,
            types: params.to_vec(),
            declaring,
            is_static,
        });
        Ok(slot)
    }

    /// Binds parameters and the return type from a method descriptor.
    pub fn record_params_descriptor(&mut self, descriptor: &str, is_static: bool) -> Result<u16, CompileError> {
        let (params, ret) = parse_method_descriptor(descriptor)
            .ok_or_else(|| CompileError::Fatal(format!("bad method descriptor {}", descriptor)))?;
        let slot = self.record_params(&params, is_static)?;
        self.record_return_type(ret, false)?;
        Ok(slot)
    }

    /// Sets the type `return` and `($r)` convert to. With `with_result_var`,
    /// also declares `$_` for a non-void type and returns its slot.
    pub fn record_return_type(&mut self, ty: JType, with_result_var: bool) -> Result<Option<u16>, CompileError> {
        self.bindings.set_return_type(ty.clone());
        if with_result_var && !ty.is_void() {
            self.record_variable(ty, RESULT).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Sets the type `$type` denotes.
    pub fn record_type(&mut self, ty: JType) {
        self.bindings.set_dollar_type(ty);
    }

    pub fn record_proceed(&mut self, handler: Box<dyn ProceedHandler>) {
        self.bindings.set_proceed(handler);
    }

    /// Makes `$proceed(...)` call `method` on `target`, a source expression
    /// such as `$0` or a class name; without a target the call is unqualified.
    pub fn record_proceed_call(&mut self, target: Option<&str>, method: &str) -> Result<(), CompileError> {
        let target = match target {
            Some(src) => Some(self.parse(src, Parser::parse_standalone_expression)?),
            None => None,
        };
        self.record_proceed(Box::new(ForwardProceed {
            target,
            method: method.to_string(),
        }));
        Ok(())
    }

    /// Binds `$cflow(name)` to the counter in static field `class.field`.
    pub fn record_cflow(&mut self, name: &str, class: &str, field: &str) {
        self.bindings.add_cflow(
            name,
            CflowField {
                class: class.to_string(),
                field: field.to_string(),
            },
        );
    }

    /// Declares a local visible to later snippets and returns its slot.
    pub fn record_variable(&mut self, ty: JType, name: &str) -> Result<u16, CompileError> {
        let slot = self.bytecode.alloc_local(ty.slot_size())?;
        self.symbols.declare(Declarator::bound(ty, name, slot));
        Ok(slot)
    }
}

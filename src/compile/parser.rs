use std::mem;
use std::rc::Rc;

use super::ast::*;
use super::lexer::{SpannedToken, Token};
use super::symtab::SymbolTable;
use super::CompileError;
use crate::descriptor::TypeKind;
use crate::types::Modifiers;

/// Binary operators as they appear in the precedence table.
#[derive(Clone, Copy)]
enum Infix {
    Or,
    And,
    Arith(BinOp),
    Compare(CompareOp),
    Instanceof,
}

/// Precedence of a binary operator token, lowest first.
fn infix_op(token: &Token) -> Option<(u8, Infix)> {
    Some(match token {
        Token::PipePipe => (1, Infix::Or),
        Token::AmpAmp => (2, Infix::And),
        Token::Pipe => (3, Infix::Arith(BinOp::BitOr)),
        Token::Caret => (4, Infix::Arith(BinOp::BitXor)),
        Token::Amp => (5, Infix::Arith(BinOp::BitAnd)),
        Token::EqEq => (6, Infix::Compare(CompareOp::Eq)),
        Token::BangEq => (6, Infix::Compare(CompareOp::Ne)),
        Token::Lt => (7, Infix::Compare(CompareOp::Lt)),
        Token::LtEq => (7, Infix::Compare(CompareOp::Le)),
        Token::Gt => (7, Infix::Compare(CompareOp::Gt)),
        Token::GtEq => (7, Infix::Compare(CompareOp::Ge)),
        Token::Instanceof => (7, Infix::Instanceof),
        Token::LtLt => (8, Infix::Arith(BinOp::Shl)),
        Token::GtGt => (8, Infix::Arith(BinOp::Shr)),
        Token::GtGtGt => (8, Infix::Arith(BinOp::Ushr)),
        Token::Plus => (9, Infix::Arith(BinOp::Add)),
        Token::Minus => (9, Infix::Arith(BinOp::Sub)),
        Token::Star => (10, Infix::Arith(BinOp::Mul)),
        Token::Slash => (10, Infix::Arith(BinOp::Div)),
        Token::Percent => (10, Infix::Arith(BinOp::Rem)),
        _ => return None,
    })
}

fn assign_op(token: &Token) -> Option<Option<BinOp>> {
    Some(match token {
        Token::Eq => None,
        Token::PlusEq => Some(BinOp::Add),
        Token::MinusEq => Some(BinOp::Sub),
        Token::StarEq => Some(BinOp::Mul),
        Token::SlashEq => Some(BinOp::Div),
        Token::PercentEq => Some(BinOp::Rem),
        Token::AmpEq => Some(BinOp::BitAnd),
        Token::PipeEq => Some(BinOp::BitOr),
        Token::CaretEq => Some(BinOp::BitXor),
        Token::LtLtEq => Some(BinOp::Shl),
        Token::GtGtEq => Some(BinOp::Shr),
        Token::GtGtGtEq => Some(BinOp::Ushr),
        _ => return None,
    })
}

fn primitive_kind(token: &Token) -> Option<TypeKind> {
    Some(match token {
        Token::KwInt => TypeKind::Int,
        Token::KwLong => TypeKind::Long,
        Token::KwFloat => TypeKind::Float,
        Token::KwDouble => TypeKind::Double,
        Token::KwBoolean => TypeKind::Boolean,
        Token::KwByte => TypeKind::Byte,
        Token::KwChar => TypeKind::Char,
        Token::KwShort => TypeKind::Short,
        Token::KwVoid => TypeKind::Void,
        _ => return None,
    })
}

fn is_lvalue(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Variable(_) | Expr::Name(_) | Expr::Field(..) | Expr::Index(..)
    )
}

/// Recursive-descent parser. Identifiers declared while parsing are entered into
/// the symbol table, so references to locals come out as [`Expr::Variable`].
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    scope: SymbolTable,
    depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<SpannedToken>, scope: SymbolTable) -> Self {
        if tokens.is_empty() {
            tokens.push(SpannedToken {
                token: Token::Eof,
                line: 1,
                column: 1,
            });
        }
        Parser {
            tokens,
            pos: 0,
            scope,
            depth: 0,
        }
    }

    /// Gives back the scope the parser was created with, closing any scope left
    /// open by an aborted parse.
    pub fn into_scope(mut self) -> SymbolTable {
        while self.depth > 0 {
            self.exit_scope();
        }
        self.scope
    }

    pub fn at_end(&self) -> bool {
        self.at(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, k: usize) -> &Token {
        self.tokens
            .get(self.pos + k)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CompileError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, got {:?}", expected, self.peek())))
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let span = &self.tokens[self.pos];
        let message = match &span.token {
            Token::Bad(reason) => reason.clone(),
            _ => message.into(),
        };
        CompileError::ParseError {
            line: span.line,
            column: span.column,
            message,
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        if let Token::Ident(name) = self.peek().clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.error(format!("expected identifier, got {:?}", self.peek())))
        }
    }

    fn enter_scope(&mut self) {
        let outer = mem::take(&mut self.scope);
        self.scope = SymbolTable::with_parent(outer);
        self.depth += 1;
    }

    fn exit_scope(&mut self) {
        let inner = mem::take(&mut self.scope);
        self.scope = inner.into_parent();
        self.depth -= 1;
    }

    fn declare(&mut self, type_name: TypeName, name: &str) -> Result<Rc<Declarator>, CompileError> {
        if self.scope.declares(name) {
            return Err(self.error(format!("variable {} is already defined", name)));
        }
        let decl = Declarator::new(type_name, name);
        self.scope.declare(Rc::clone(&decl));
        Ok(decl)
    }

    fn expect_end(&self) -> Result<(), CompileError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected {:?} after end of input", self.peek())))
        }
    }

    // --- Members ---

    /// Parses one field or method declaration spanning the whole input.
    pub fn parse_member(&mut self) -> Result<Member, CompileError> {
        let modifiers = self.parse_modifiers();
        let ty = self.parse_type_name()?;

        let member = if self.at(&Token::LParen) {
            // constructor: the type name is the class name
            if !matches!(ty, TypeName::Class(_)) {
                return Err(self.error("expected member name"));
            }
            Member::Method(self.parse_method_rest(modifiers, TypeName::Primitive(TypeKind::Void), "<init>")?)
        } else {
            let name = self.expect_ident()?;
            if self.at(&Token::LParen) {
                Member::Method(self.parse_method_rest(modifiers, ty, &name)?)
            } else {
                let ty = self.parse_dims_after_name(ty);
                let init = if self.eat(&Token::Eq) {
                    Some(self.parse_var_init()?)
                } else {
                    None
                };
                self.expect(&Token::Semicolon)?;
                Member::Field(FieldDecl {
                    modifiers,
                    ty,
                    name,
                    init,
                })
            }
        };
        self.expect_end()?;
        Ok(member)
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::empty();
        loop {
            match self.peek() {
                Token::Modifier(m) => {
                    modifiers |= *m;
                    self.advance();
                }
                Token::Synchronized if self.peek_at(1) != &Token::LParen => {
                    modifiers |= Modifiers::SYNCHRONIZED;
                    self.advance();
                }
                _ => return modifiers,
            }
        }
    }

    fn parse_method_rest(
        &mut self,
        modifiers: Modifiers,
        return_type: TypeName,
        name: &str,
    ) -> Result<MethodDecl, CompileError> {
        self.enter_scope();
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                self.parse_modifiers();
                let ty = self.parse_type_name()?;
                let pname = self.expect_ident()?;
                let ty = self.parse_dims_after_name(ty);
                params.push(self.declare(ty, &pname)?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;

        let mut throws = Vec::new();
        if self.eat(&Token::Throws) {
            loop {
                throws.push(self.parse_type_name()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        let body = if self.eat(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_block_body()?)
        };
        self.exit_scope();
        Ok(MethodDecl {
            modifiers,
            return_type,
            name: name.to_string(),
            params,
            throws,
            body,
        })
    }

    /// `int a[]` style brackets after a declarator name.
    fn parse_dims_after_name(&mut self, mut ty: TypeName) -> TypeName {
        while self.at(&Token::LBracket) && self.peek_at(1) == &Token::RBracket {
            self.advance();
            self.advance();
            ty = TypeName::Array(Box::new(ty));
        }
        ty
    }

    // --- Statements ---

    /// Parses statements until the end of input.
    pub fn parse_statements(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while !self.at_end() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    /// Parses a single expression spanning the whole input.
    pub fn parse_standalone_expression(&mut self) -> Result<Expr, CompileError> {
        let expr = self.parse_expression()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// "{" statement* "}" in a fresh scope.
    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect(&Token::LBrace)?;
        self.enter_scope();
        let mut stmts = Vec::new();
        while !self.at(&Token::RBrace) && !self.at_end() {
            stmts.push(self.parse_statement()?);
        }
        self.expect(&Token::RBrace)?;
        self.exit_scope();
        Ok(stmts)
    }

    /// A loop or branch body. Declarations inside it do not leak out.
    fn parse_sub_statement(&mut self) -> Result<Stmt, CompileError> {
        self.enter_scope();
        let stmt = self.parse_statement()?;
        self.exit_scope();
        Ok(stmt)
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            Token::LBrace => Ok(Stmt::Block(self.parse_block_body()?)),
            Token::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::Do => self.parse_do_while(),
            Token::For => self.parse_for(),
            Token::Switch => self.parse_switch(),
            Token::Synchronized => self.parse_synchronized(),
            Token::Try => self.parse_try_catch(),
            Token::Return => {
                self.advance();
                let value = if self.at(&Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Return(value))
            }
            Token::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Throw(value))
            }
            Token::Break | Token::Continue => {
                let is_break = self.advance() == Token::Break;
                let label = match self.peek() {
                    Token::Ident(_) => Some(self.expect_ident()?),
                    _ => None,
                };
                self.expect(&Token::Semicolon)?;
                Ok(if is_break {
                    Stmt::Break(label)
                } else {
                    Stmt::Continue(label)
                })
            }
            Token::Modifier(_) => {
                self.parse_modifiers();
                self.parse_local_decl()
            }
            Token::Ident(_) if self.peek_at(1) == &Token::Colon => {
                let label = self.expect_ident()?;
                self.advance();
                let body = self.parse_sub_statement()?;
                Ok(Stmt::Labeled(label, Box::new(body)))
            }
            token if primitive_kind(token).is_some() && self.peek_at(1) != &Token::Dot => {
                self.parse_local_decl()
            }
            Token::Ident(_) if self.is_local_decl_start() => self.parse_local_decl(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// Ident ("." Ident)* ("[" "]")* Ident
    fn is_local_decl_start(&self) -> bool {
        let mut i = 0;
        if !matches!(self.peek_at(i), Token::Ident(_)) {
            return false;
        }
        i += 1;
        while self.peek_at(i) == &Token::Dot && matches!(self.peek_at(i + 1), Token::Ident(_)) {
            i += 2;
        }
        while self.peek_at(i) == &Token::LBracket && self.peek_at(i + 1) == &Token::RBracket {
            i += 2;
        }
        matches!(self.peek_at(i), Token::Ident(_))
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::If)?;
        let cond = self.parse_paren_expression()?;
        let then_branch = Box::new(self.parse_sub_statement()?);
        let else_branch = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_sub_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::While)?;
        let cond = self.parse_paren_expression()?;
        let body = Box::new(self.parse_sub_statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::Do)?;
        let body = Box::new(self.parse_sub_statement()?);
        self.expect(&Token::While)?;
        let cond = self.parse_paren_expression()?;
        self.expect(&Token::Semicolon)?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::For)?;
        self.expect(&Token::LParen)?;
        self.enter_scope();

        let mut init = Vec::new();
        if !self.at(&Token::Semicolon) {
            let is_decl = primitive_kind(self.peek()).is_some()
                || matches!(self.peek(), Token::Modifier(_))
                || self.is_local_decl_start();
            if is_decl {
                self.parse_modifiers();
                init.push(self.parse_local_decl_no_semi()?);
            } else {
                loop {
                    init.push(Stmt::Expr(self.parse_expression()?));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
        }
        self.expect(&Token::Semicolon)?;

        let cond = if self.at(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&Token::Semicolon)?;

        let mut update = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                update.push(self.parse_expression()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        let body = Box::new(self.parse_sub_statement()?);
        self.exit_scope();
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::Switch)?;
        let selector = self.parse_paren_expression()?;
        self.expect(&Token::LBrace)?;
        self.enter_scope();

        let mut cases: Vec<SwitchCase> = Vec::new();
        while !self.at(&Token::RBrace) && !self.at_end() {
            // consecutive labels share one body
            let mut labels = Vec::new();
            let mut is_default = false;
            loop {
                if self.eat(&Token::Case) {
                    labels.push(self.parse_ternary()?);
                    self.expect(&Token::Colon)?;
                } else if self.eat(&Token::Default) {
                    if is_default || cases.iter().any(|c| c.is_default) {
                        return Err(self.error("duplicate default label"));
                    }
                    is_default = true;
                    self.expect(&Token::Colon)?;
                } else {
                    break;
                }
            }
            if labels.is_empty() && !is_default {
                return Err(self.error("statement outside case/default in switch"));
            }
            let mut body = Vec::new();
            while !matches!(self.peek(), Token::RBrace | Token::Case | Token::Default | Token::Eof) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase {
                labels,
                is_default,
                body,
            });
        }
        self.expect(&Token::RBrace)?;
        self.exit_scope();
        Ok(Stmt::Switch { selector, cases })
    }

    fn parse_try_catch(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::Try)?;
        let body = self.parse_block_body()?;

        let mut catches = Vec::new();
        while self.eat(&Token::Catch) {
            self.expect(&Token::LParen)?;
            self.enter_scope();
            self.parse_modifiers();
            let exception_type = self.parse_type_name()?;
            if self.at(&Token::Pipe) {
                return Err(CompileError::Unsupported("multi-catch".into()));
            }
            let name = self.expect_ident()?;
            let param = self.declare(exception_type.clone(), &name)?;
            self.expect(&Token::RParen)?;
            let body = self.parse_block_body()?;
            self.exit_scope();
            catches.push(CatchClause {
                exception_type,
                param,
                body,
            });
        }

        let finally = if self.eat(&Token::Finally) {
            Some(self.parse_block_body()?)
        } else {
            None
        };

        if catches.is_empty() && finally.is_none() {
            return Err(self.error("try requires at least one catch or finally block"));
        }
        Ok(Stmt::Try {
            body,
            catches,
            finally,
        })
    }

    fn parse_synchronized(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::Synchronized)?;
        let lock = self.parse_paren_expression()?;
        let body = self.parse_block_body()?;
        Ok(Stmt::Synchronized { lock, body })
    }

    fn parse_local_decl(&mut self) -> Result<Stmt, CompileError> {
        let stmt = self.parse_local_decl_no_semi()?;
        self.expect(&Token::Semicolon)?;
        Ok(stmt)
    }

    fn parse_local_decl_no_semi(&mut self) -> Result<Stmt, CompileError> {
        let base = self.parse_type_name()?;
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let ty = self.parse_dims_after_name(base.clone());
            let decl = self.declare(ty, &name)?;
            let init = if self.eat(&Token::Eq) {
                Some(self.parse_var_init()?)
            } else {
                None
            };
            decls.push(VarDecl { decl, init });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::Decl(decls))
    }

    fn parse_var_init(&mut self) -> Result<Expr, CompileError> {
        if self.at(&Token::LBrace) {
            self.parse_array_init()
        } else {
            self.parse_expression()
        }
    }

    /// "{" (init ("," init)* ","?)? "}"
    fn parse_array_init(&mut self) -> Result<Expr, CompileError> {
        self.expect(&Token::LBrace)?;
        let mut items = Vec::new();
        while !self.at(&Token::RBrace) {
            items.push(self.parse_var_init()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::ArrayInit(items))
    }

    fn parse_type_name(&mut self) -> Result<TypeName, CompileError> {
        let base = if let Some(kind) = primitive_kind(self.peek()) {
            self.advance();
            TypeName::Primitive(kind)
        } else if let Token::Ident(_) = self.peek() {
            let mut name = self.expect_ident()?;
            while self.at(&Token::Dot) && matches!(self.peek_at(1), Token::Ident(_)) {
                self.advance();
                name.push('.');
                name.push_str(&self.expect_ident()?);
            }
            TypeName::Class(name)
        } else {
            return Err(self.error(format!("expected type name, got {:?}", self.peek())));
        };
        Ok(self.parse_dims_after_name(base))
    }

    // --- Expressions ---

    fn parse_paren_expression(&mut self) -> Result<Expr, CompileError> {
        self.expect(&Token::LParen)?;
        let expr = self.parse_expression()?;
        self.expect(&Token::RParen)?;
        Ok(expr)
    }

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        let target = self.parse_ternary()?;
        let Some(op) = assign_op(self.peek()) else {
            return Ok(target);
        };
        if !is_lvalue(&target) {
            return Err(self.error(format!("invalid assignment target: {}", target)));
        }
        self.advance();
        let value = self.parse_expression()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr, CompileError> {
        let cond = self.parse_binary(1)?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then_value = self.parse_expression()?;
        self.expect(&Token::Colon)?;
        let else_value = self.parse_ternary()?;
        Ok(Expr::Conditional(
            Box::new(cond),
            Box::new(then_value),
            Box::new(else_value),
        ))
    }

    /// Precedence climbing over [`infix_op`]; all binary operators are left
    /// associative.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        while let Some((prec, op)) = infix_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let left = Box::new(lhs);
            lhs = match op {
                Infix::Instanceof => Expr::Instanceof(left, self.parse_type_name()?),
                Infix::Or => Expr::Or(left, Box::new(self.parse_binary(prec + 1)?)),
                Infix::And => Expr::And(left, Box::new(self.parse_binary(prec + 1)?)),
                Infix::Arith(op) => Expr::Binary(op, left, Box::new(self.parse_binary(prec + 1)?)),
                Infix::Compare(op) => Expr::Compare(op, left, Box::new(self.parse_binary(prec + 1)?)),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                // fold the sign into literals so MIN_VALUE can be written
                match self.peek().clone() {
                    Token::IntLiteral(v) => {
                        self.advance();
                        Ok(Expr::IntConst(-v, TypeKind::Int))
                    }
                    Token::LongLiteral(v) => {
                        self.advance();
                        Ok(Expr::IntConst(v.wrapping_neg(), TypeKind::Long))
                    }
                    Token::FloatLiteral(v) => {
                        self.advance();
                        Ok(Expr::DoubleConst(-v, TypeKind::Float))
                    }
                    Token::DoubleLiteral(v) => {
                        self.advance();
                        Ok(Expr::DoubleConst(-v, TypeKind::Double))
                    }
                    _ => Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?))),
                }
            }
            Token::Plus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.parse_unary()?)))
            }
            Token::Tilde => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::BitNot, Box::new(self.parse_unary()?)))
            }
            Token::Bang => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Token::PlusPlus | Token::MinusMinus => {
                let increment = self.advance() == Token::PlusPlus;
                let target = self.parse_unary()?;
                if !is_lvalue(&target) {
                    return Err(self.error(format!("invalid increment target: {}", target)));
                }
                Ok(Expr::IncDec {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                })
            }
            Token::LParen if self.is_cast() => {
                self.advance();
                let ty = self.parse_type_name()?;
                self.expect(&Token::RParen)?;
                let operand = self.parse_unary()?;
                Ok(Expr::Cast(ty, Box::new(operand)))
            }
            _ => self.parse_postfix(),
        }
    }

    /// "(" primitive-type ")" is always a cast. "(" Name ")" is a cast only when
    /// the next token starts a term; "(" Name "[" "]" ")" always is.
    fn is_cast(&self) -> bool {
        let mut i = 1;
        let primitive = primitive_kind(self.peek_at(i)).is_some();
        if primitive {
            i += 1;
        } else if matches!(self.peek_at(i), Token::Ident(_)) {
            i += 1;
            while self.peek_at(i) == &Token::Dot && matches!(self.peek_at(i + 1), Token::Ident(_)) {
                i += 2;
            }
        } else {
            return false;
        }
        let mut array = false;
        while self.peek_at(i) == &Token::LBracket && self.peek_at(i + 1) == &Token::RBracket {
            i += 2;
            array = true;
        }
        if self.peek_at(i) != &Token::RParen {
            return false;
        }
        primitive || array || self.peek_at(i + 1).starts_term()
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    if self.eat(&Token::Class) {
                        let ty = match expr.dotted_name() {
                            Some(name) => TypeName::Class(name),
                            None => return Err(self.error(format!("{} is not a type", expr))),
                        };
                        expr = Expr::ClassLit(ty);
                        continue;
                    }
                    let name = self.expect_ident()?;
                    expr = if self.at(&Token::LParen) {
                        Expr::Call {
                            target: Some(Box::new(expr)),
                            name,
                            args: self.parse_args()?,
                        }
                    } else {
                        Expr::Field(Box::new(expr), name)
                    };
                }
                // `String[].class`
                Token::LBracket if self.peek_at(1) == &Token::RBracket => {
                    let ty = match expr.dotted_name() {
                        Some(name) => self.parse_dims_after_name(TypeName::Class(name)),
                        None => return Err(self.error(format!("{} is not a type", expr))),
                    };
                    self.expect(&Token::Dot)?;
                    self.expect(&Token::Class)?;
                    expr = Expr::ClassLit(ty);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::PlusPlus | Token::MinusMinus => {
                    if !is_lvalue(&expr) {
                        return Err(self.error(format!("invalid increment target: {}", expr)));
                    }
                    let increment = self.advance() == Token::PlusPlus;
                    expr = Expr::IncDec {
                        increment,
                        prefix: false,
                        target: Box::new(expr),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let expr = match self.peek().clone() {
            Token::IntLiteral(v) => {
                if v > i32::MAX as i64 {
                    return Err(self.error(format!("integer number too large: {}", v)));
                }
                Expr::IntConst(v, TypeKind::Int)
            }
            Token::LongLiteral(v) => Expr::IntConst(v, TypeKind::Long),
            Token::CharLiteral(c) => Expr::IntConst(c as i64, TypeKind::Char),
            Token::FloatLiteral(v) => Expr::DoubleConst(v, TypeKind::Float),
            Token::DoubleLiteral(v) => Expr::DoubleConst(v, TypeKind::Double),
            Token::StringLiteral(s) => Expr::StringL(s),
            Token::True => Expr::Keyword(Keyword::True),
            Token::False => Expr::Keyword(Keyword::False),
            Token::Null => Expr::Keyword(Keyword::Null),
            Token::This | Token::Super => {
                let keyword = if self.advance() == Token::This {
                    Keyword::This
                } else {
                    Keyword::Super
                };
                let target = Expr::Keyword(keyword);
                return Ok(if self.at(&Token::LParen) {
                    Expr::Call {
                        target: Some(Box::new(target)),
                        name: "<init>".into(),
                        args: self.parse_args()?,
                    }
                } else {
                    target
                });
            }
            Token::New => return self.parse_new(),
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                return Ok(expr);
            }
            Token::Ident(name) => {
                self.advance();
                if self.at(&Token::LParen) {
                    return Ok(Expr::Call {
                        target: None,
                        name,
                        args: self.parse_args()?,
                    });
                }
                return Ok(match self.scope.lookup(&name) {
                    Some(decl) => Expr::Variable(decl),
                    None => Expr::Name(name),
                });
            }
            // `int.class`, `int[].class`
            token if primitive_kind(&token).is_some() => {
                let ty = self.parse_type_name()?;
                self.expect(&Token::Dot)?;
                self.expect(&Token::Class)?;
                return Ok(Expr::ClassLit(ty));
            }
            _ => return Err(self.error(format!("unexpected token: {:?}", self.peek()))),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, CompileError> {
        self.expect(&Token::New)?;
        let ty = self.parse_type_name()?;
        let (elem, declared_dims) = ty.split();
        let elem = elem.clone();

        if declared_dims > 0 {
            // new T[] { ... }
            let Expr::ArrayInit(items) = self.parse_array_init()? else {
                return Err(CompileError::Fatal("array initializer expected".into()));
            };
            return Ok(Expr::NewArray {
                elem,
                dims: Vec::new(),
                extra_dims: declared_dims,
                init: Some(items),
            });
        }

        if self.at(&Token::LParen) {
            if !matches!(ty, TypeName::Class(_)) {
                return Err(self.error(format!("cannot instantiate {}", ty)));
            }
            let args = self.parse_args()?;
            return Ok(Expr::New { class: ty, args });
        }

        if !self.at(&Token::LBracket) {
            return Err(self.error("expected '(' or '[' after 'new Type'"));
        }
        let mut dims = Vec::new();
        while self.at(&Token::LBracket) && self.peek_at(1) != &Token::RBracket {
            self.advance();
            dims.push(self.parse_expression()?);
            self.expect(&Token::RBracket)?;
        }
        let mut extra_dims = 0u8;
        while self.at(&Token::LBracket) && self.peek_at(1) == &Token::RBracket {
            self.advance();
            self.advance();
            extra_dims += 1;
        }
        Ok(Expr::NewArray {
            elem,
            dims,
            extra_dims,
            init: None,
        })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.at(&Token::RParen) {
            args.push(self.parse_expression()?);
            while self.eat(&Token::Comma) {
                args.push(self.parse_expression()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::lexer::Lexer;

    fn parser(src: &str) -> Parser {
        Parser::new(Lexer::new(src).tokenize(), SymbolTable::new())
    }

    fn parse(src: &str) -> Vec<Stmt> {
        parser(src).parse_statements().unwrap()
    }

    fn expr(src: &str) -> Expr {
        parser(src).parse_standalone_expression().unwrap()
    }

    #[test]
    fn test_return_literal() {
        let stmts = parse("{ return 42; }");
        assert_eq!(stmts, vec![Stmt::Block(vec![Stmt::Return(Some(Expr::int(42)))])]);
    }

    #[test]
    fn test_local_decl_resolves_later_uses() {
        let stmts = parse("int x = 10, y[] = {1, 2}; x = y[0];");
        let Stmt::Decl(decls) = &stmts[0] else { panic!("{:?}", stmts[0]) };
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].decl.type_name, TypeName::Primitive(TypeKind::Int).array_of(1));
        match &stmts[1] {
            Stmt::Expr(Expr::Assign { target, value, .. }) => {
                assert!(matches!(target.as_ref(), Expr::Variable(d) if d.name == "x"));
                assert!(matches!(value.as_ref(), Expr::Index(..)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_block_scope_ends() {
        let stmts = parse("{ int x = 1; } x = 2;");
        match &stmts[1] {
            Stmt::Expr(Expr::Assign { target, .. }) => {
                assert_eq!(target.as_ref(), &Expr::Name("x".into()))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(expr("a + b * c").to_string(), "(a + (b * c))");
        assert_eq!(expr("a - b - c").to_string(), "((a - b) - c)");
        assert_eq!(expr("a || b && c | d").to_string(), "(a || (b && (c | d)))");
        assert_eq!(expr("a << 1 < b == c").to_string(), "(((a << 1) < b) == c)");
        assert_eq!(expr("x instanceof String == true").to_string(), "((x instanceof String) == true)");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let e = expr("a = b += 2");
        match e {
            Expr::Assign { op: None, value, .. } => {
                assert!(matches!(*value, Expr::Assign { op: Some(BinOp::Add), .. }))
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(parser("1 = 2").parse_standalone_expression().is_err());
    }

    #[test]
    fn test_ternary() {
        assert_eq!(expr("x > 0 ? 1 : y ? 2 : 3").to_string(), "((x > 0) ? 1 : (y ? 2 : 3))");
    }

    #[test]
    fn test_cast_disambiguation() {
        assert!(matches!(expr("(long) y"), Expr::Cast(TypeName::Primitive(TypeKind::Long), _)));
        assert!(matches!(expr("(int) -y"), Expr::Cast(..)));
        assert!(matches!(expr("(String) x"), Expr::Cast(..)));
        assert!(matches!(expr("(a) - b"), Expr::Binary(BinOp::Sub, ..)));
        assert!(matches!(expr("(a) + 1"), Expr::Binary(BinOp::Add, ..)));
        assert!(matches!(expr("(String[]) o"), Expr::Cast(TypeName::Array(_), _)));
        assert!(matches!(expr("($r) $_"), Expr::Cast(ref t, _) if t.is_splice_marker("$r")));
    }

    #[test]
    fn test_negative_literals() {
        assert_eq!(expr("-2147483648"), Expr::int(i32::MIN));
        assert_eq!(expr("-9223372036854775808L"), Expr::IntConst(i64::MIN, TypeKind::Long));
        assert!(parser("2147483648").parse_standalone_expression().is_err());
        assert_eq!(expr("'a'"), Expr::IntConst(97, TypeKind::Char));
    }

    #[test]
    fn test_postfix_chain() {
        let e = expr("System.out.println(a[i].length)");
        assert_eq!(e.to_string(), "System.out.println(a[i].length)");
        assert!(matches!(expr("String.class"), Expr::ClassLit(TypeName::Class(ref n)) if n == "String"));
        assert!(matches!(expr("int[].class"), Expr::ClassLit(TypeName::Array(_))));
        assert!(matches!(expr("i++"), Expr::IncDec { increment: true, prefix: false, .. }));
        assert!(matches!(expr("super(1)"), Expr::Call { ref name, .. } if name == "<init>"));
    }

    #[test]
    fn test_new_forms() {
        assert!(matches!(expr("new StringBuilder()"), Expr::New { .. }));
        match expr("new int[3][]") {
            Expr::NewArray { dims, extra_dims, init, .. } => {
                assert_eq!(dims.len(), 1);
                assert_eq!(extra_dims, 1);
                assert!(init.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
        match expr("new String[] {\"a\", \"b\",}") {
            Expr::NewArray { extra_dims: 1, init: Some(items), .. } => assert_eq!(items.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(parser("new int(1)").parse_standalone_expression().is_err());
    }

    #[test]
    fn test_switch_groups_labels() {
        let stmts = parse("switch (x) { case 1: case 2: y = 1; break; default: y = 0; }");
        let Stmt::Switch { cases, .. } = &stmts[0] else { panic!() };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].labels.len(), 2);
        assert!(cases[1].is_default);
    }

    #[test]
    fn test_try_catch_finally() {
        let stmts = parse("try { f(); } catch (Exception e) { g(e); } finally { h(); }");
        let Stmt::Try { catches, finally, .. } = &stmts[0] else { panic!() };
        assert_eq!(catches.len(), 1);
        assert!(finally.is_some());
        assert!(matches!(
            &catches[0].body[0],
            Stmt::Expr(Expr::Call { args, .. }) if matches!(args[0], Expr::Variable(_))
        ));
        assert!(matches!(
            parser("try { } catch (A | B e) { }").parse_statements(),
            Err(CompileError::Unsupported(_))
        ));
    }

    #[test]
    fn test_labeled_break_parses() {
        let stmts = parse("foo: while (true) { break foo; }");
        assert!(matches!(&stmts[0], Stmt::Labeled(l, _) if l == "foo"));
    }

    #[test]
    fn test_labeled_body_has_own_scope() {
        let stmts = parse("l: int x = 1; x = 2;");
        match &stmts[1] {
            Stmt::Expr(Expr::Assign { target, .. }) => {
                assert_eq!(target.as_ref(), &Expr::Name("x".into()))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_member_declarations() {
        let m = parser("public static int add(int a, int b) throws Exception { return a + b; }")
            .parse_member()
            .unwrap();
        let Member::Method(method) = m else { panic!() };
        assert_eq!(method.name, "add");
        assert_eq!(method.params.len(), 2);
        assert_eq!(method.throws.len(), 1);
        assert!(method.modifiers.contains(Modifiers::STATIC));
        assert!(matches!(
            &method.body.as_ref().unwrap()[0],
            Stmt::Return(Some(Expr::Binary(BinOp::Add, l, _))) if matches!(l.as_ref(), Expr::Variable(_))
        ));

        let ctor = parser("Point(int x) { this.x = x; }").parse_member().unwrap();
        assert!(matches!(ctor, Member::Method(ref m) if m.is_constructor()));

        let field = parser("private static final long N = 3L;").parse_member().unwrap();
        assert!(matches!(field, Member::Field(ref f) if f.name == "N" && f.init.is_some()));

        let abs = parser("abstract void run();").parse_member().unwrap();
        assert!(matches!(abs, Member::Method(ref m) if m.body.is_none()));
    }

    #[test]
    fn test_errors_carry_position() {
        match parser("int x = ;").parse_statements() {
            Err(CompileError::ParseError { line: 1, column: 9, .. }) => {}
            other => panic!("unexpected: {:?}", other),
        }
        match parser("String s = \"abc").parse_statements() {
            Err(CompileError::ParseError { message, .. }) => {
                assert!(message.contains("unterminated"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}

//! Syntax tree produced by the parser and consumed by the checker and code generator.

use std::cell::{Cell, OnceCell};
use std::fmt;
use std::rc::Rc;

use crate::descriptor::{JType, TypeKind};
use crate::types::Modifiers;

/// A type as written in the source, resolved against the class pool later.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeName {
    Primitive(TypeKind),
    /// Simple or dotted class name as written (`String`, `java.util.List`).
    Class(String),
    Array(Box<TypeName>),
}

impl TypeName {
    pub fn array_of(self, dims: u8) -> TypeName {
        (0..dims).fold(self, |t, _| TypeName::Array(Box::new(t)))
    }

    /// Innermost element type and array depth.
    pub fn split(&self) -> (&TypeName, u8) {
        match self {
            TypeName::Array(inner) => {
                let (base, dim) = inner.split();
                (base, dim + 1)
            }
            other => (other, 0),
        }
    }

    /// True for the `$r` / `$w` cast markers.
    pub fn is_splice_marker(&self, marker: &str) -> bool {
        matches!(self, TypeName::Class(name) if name == marker)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Primitive(kind) => write!(f, "{}", kind.keyword()),
            TypeName::Class(name) => write!(f, "{}", name),
            TypeName::Array(inner) => write!(f, "{}[]", inner),
        }
    }
}

/// A declared local variable or parameter. Shared between the symbol table and
/// every [`Expr::Variable`] that refers to it.
#[derive(Debug)]
pub struct Declarator {
    pub name: String,
    pub type_name: TypeName,
    ty: OnceCell<JType>,
    slot: Cell<Option<u16>>,
}

impl Declarator {
    pub fn new(type_name: TypeName, name: &str) -> Rc<Self> {
        Rc::new(Declarator {
            name: name.to_string(),
            type_name,
            ty: OnceCell::new(),
            slot: Cell::new(None),
        })
    }

    /// A declarator whose type and slot are already known, as for bound parameters.
    pub fn bound(ty: JType, name: &str, slot: u16) -> Rc<Self> {
        let type_name = match &ty.class_name {
            Some(class) => TypeName::Class(class.replace('/', ".")),
            None => TypeName::Primitive(ty.kind),
        }
        .array_of(ty.dim);
        let cell = OnceCell::new();
        let _ = cell.set(ty);
        Rc::new(Declarator {
            name: name.to_string(),
            type_name,
            ty: cell,
            slot: Cell::new(Some(slot)),
        })
    }

    pub fn resolved_type(&self) -> Option<&JType> {
        self.ty.get()
    }

    pub fn set_resolved_type(&self, ty: JType) {
        let _ = self.ty.set(ty);
    }

    pub fn slot(&self) -> Option<u16> {
        self.slot.get()
    }

    pub fn set_slot(&self, slot: u16) {
        self.slot.set(Some(slot));
    }
}

impl PartialEq for Declarator {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    This,
    Super,
    Null,
    True,
    False,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr | BinOp::Ushr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// The comparison that holds exactly when `self` does not.
    pub fn negate(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    BitNot,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Integral constant; kind is `Int`, `Long` or `Char` from the parser and
    /// may also be `Byte` or `Short` after folding.
    IntConst(i64, TypeKind),
    /// Floating literal; kind is `Float` or `Double`.
    DoubleConst(f64, TypeKind),
    StringL(String),
    Keyword(Keyword),
    /// An identifier not declared as a local: a field, class or package fragment.
    Name(String),
    Variable(Rc<Declarator>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Instanceof(Box<Expr>, TypeName),
    Cast(TypeName, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    IncDec {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Field(Box<Expr>, String),
    ClassLit(TypeName),
    Index(Box<Expr>, Box<Expr>),
    /// Method call. `this(...)` and `super(...)` use the keyword as target and
    /// `<init>` as name.
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    New {
        class: TypeName,
        args: Vec<Expr>,
    },
    NewArray {
        elem: TypeName,
        dims: Vec<Expr>,
        extra_dims: u8,
        init: Option<Vec<Expr>>,
    },
    /// `{a, b}` in a declaration initializer.
    ArrayInit(Vec<Expr>),
    /// String concatenation, built by the checker from `+` chains.
    Concat(Vec<Expr>),
}

impl Expr {
    pub fn int(value: i32) -> Expr {
        Expr::IntConst(value as i64, TypeKind::Int)
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Keyword(if value { Keyword::True } else { Keyword::False })
    }

    /// The literal boolean value, if this is `true` or `false`.
    pub fn as_bool_literal(&self) -> Option<bool> {
        match self {
            Expr::Keyword(Keyword::True) => Some(true),
            Expr::Keyword(Keyword::False) => Some(false),
            _ => None,
        }
    }

    /// Dotted form of a `Name` / `Field` chain such as `java.lang.System`.
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Name(name) => Some(name.clone()),
            Expr::Field(inner, name) => Some(format!("{}.{}", inner.dotted_name()?, name)),
            _ => None,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntConst(v, TypeKind::Long) => write!(f, "{}L", v),
            Expr::IntConst(v, TypeKind::Char) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "'{}'", c.escape_default()),
                None => write!(f, "'\\u{:04x}'", v),
            },
            Expr::IntConst(v, _) => write!(f, "{}", v),
            Expr::DoubleConst(v, TypeKind::Float) => write!(f, "{}f", v),
            Expr::DoubleConst(v, _) => write!(f, "{}", v),
            Expr::StringL(s) => write!(f, "\"{}\"", s.escape_default()),
            Expr::Keyword(k) => write!(
                f,
                "{}",
                match k {
                    Keyword::This => "this",
                    Keyword::Super => "super",
                    Keyword::Null => "null",
                    Keyword::True => "true",
                    Keyword::False => "false",
                }
            ),
            Expr::Name(n) => write!(f, "{}", n),
            Expr::Variable(d) => write!(f, "{}", d.name),
            Expr::Unary(op, e) => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::BitNot => "~",
                };
                write!(f, "{}{}", sym, e)
            }
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::Compare(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::And(l, r) => write!(f, "({} && {})", l, r),
            Expr::Or(l, r) => write!(f, "({} || {})", l, r),
            Expr::Not(e) => write!(f, "!{}", e),
            Expr::Instanceof(e, t) => write!(f, "({} instanceof {})", e, t),
            Expr::Cast(t, e) => write!(f, "(({}) {})", t, e),
            Expr::Conditional(c, a, b) => write!(f, "({} ? {} : {})", c, a, b),
            Expr::Assign { op, target, value } => {
                write!(f, "{} {}= {}", target, op.map(BinOp::symbol).unwrap_or(""), value)
            }
            Expr::IncDec {
                increment,
                prefix,
                target,
            } => {
                let sym = if *increment { "++" } else { "--" };
                if *prefix {
                    write!(f, "{}{}", sym, target)
                } else {
                    write!(f, "{}{}", target, sym)
                }
            }
            Expr::Field(e, name) => write!(f, "{}.{}", e, name),
            Expr::ClassLit(t) => write!(f, "{}.class", t),
            Expr::Index(a, i) => write!(f, "{}[{}]", a, i),
            Expr::Call { target, name, args } => {
                if let Some(target) = target {
                    if name == "<init>" {
                        write!(f, "{}(", target)?;
                    } else {
                        write!(f, "{}.{}(", target, name)?;
                    }
                } else {
                    write!(f, "{}(", name)?;
                }
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::New { class, args } => {
                write!(f, "new {}(", class)?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::NewArray {
                elem,
                dims,
                extra_dims,
                ..
            } => {
                write!(f, "new {}", elem)?;
                for d in dims {
                    write!(f, "[{}]", d)?;
                }
                for _ in 0..*extra_dims {
                    write!(f, "[]")?;
                }
                Ok(())
            }
            Expr::ArrayInit(items) => {
                write!(f, "{{")?;
                write_list(f, items, ", ")?;
                write!(f, "}}")
            }
            Expr::Concat(parts) => write_list(f, parts, " + "),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub decl: Rc<Declarator>,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    /// Case label expressions; must fold to int constants.
    pub labels: Vec<Expr>,
    pub is_default: bool,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    pub exception_type: TypeName,
    pub param: Rc<Declarator>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Decl(Vec<VarDecl>),
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Vec<Stmt>,
        cond: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Synchronized {
        lock: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Throw(Expr),
    Break(Option<String>),
    Continue(Option<String>),
    Labeled(String, Box<Stmt>),
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    pub modifiers: Modifiers,
    pub ty: TypeName,
    pub name: String,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    /// `void` for constructors.
    pub return_type: TypeName,
    /// `<init>` for constructors.
    pub name: String,
    pub params: Vec<Rc<Declarator>>,
    pub throws: Vec<TypeName>,
    /// `None` for abstract and native methods.
    pub body: Option<Vec<Stmt>>,
}

impl MethodDecl {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
}

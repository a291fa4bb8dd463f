//! Compile-time type triples and their JVM descriptor encoding.

use std::fmt;

/// Base kind of a type. For arrays this is the kind of the innermost element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Null,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Class,
}

impl TypeKind {
    pub fn descriptor_char(self) -> Option<char> {
        Some(match self {
            TypeKind::Void => 'V',
            TypeKind::Boolean => 'Z',
            TypeKind::Byte => 'B',
            TypeKind::Char => 'C',
            TypeKind::Short => 'S',
            TypeKind::Int => 'I',
            TypeKind::Long => 'J',
            TypeKind::Float => 'F',
            TypeKind::Double => 'D',
            TypeKind::Null | TypeKind::Class => return None,
        })
    }

    pub fn from_keyword(word: &str) -> Option<TypeKind> {
        Some(match word {
            "void" => TypeKind::Void,
            "boolean" => TypeKind::Boolean,
            "byte" => TypeKind::Byte,
            "char" => TypeKind::Char,
            "short" => TypeKind::Short,
            "int" => TypeKind::Int,
            "long" => TypeKind::Long,
            "float" => TypeKind::Float,
            "double" => TypeKind::Double,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            TypeKind::Void => "void",
            TypeKind::Null => "null",
            TypeKind::Boolean => "boolean",
            TypeKind::Byte => "byte",
            TypeKind::Char => "char",
            TypeKind::Short => "short",
            TypeKind::Int => "int",
            TypeKind::Long => "long",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::Class => "class",
        }
    }

    /// `newarray` operand for a primitive element kind.
    pub fn newarray_code(self) -> Option<u8> {
        Some(match self {
            TypeKind::Boolean => 4,
            TypeKind::Char => 5,
            TypeKind::Float => 6,
            TypeKind::Double => 7,
            TypeKind::Byte => 8,
            TypeKind::Short => 9,
            TypeKind::Int => 10,
            TypeKind::Long => 11,
            _ => return None,
        })
    }
}

/// The `(kind, array depth, class name)` triple computed for every expression.
/// `class_name` is set only for [`TypeKind::Class`] and holds an internal
/// slash-separated name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JType {
    pub kind: TypeKind,
    pub dim: u8,
    pub class_name: Option<String>,
}

impl JType {
    pub const VOID: JType = JType::prim(TypeKind::Void);
    pub const NULL: JType = JType::prim(TypeKind::Null);
    pub const BOOLEAN: JType = JType::prim(TypeKind::Boolean);
    pub const BYTE: JType = JType::prim(TypeKind::Byte);
    pub const CHAR: JType = JType::prim(TypeKind::Char);
    pub const SHORT: JType = JType::prim(TypeKind::Short);
    pub const INT: JType = JType::prim(TypeKind::Int);
    pub const LONG: JType = JType::prim(TypeKind::Long);
    pub const FLOAT: JType = JType::prim(TypeKind::Float);
    pub const DOUBLE: JType = JType::prim(TypeKind::Double);

    pub const fn prim(kind: TypeKind) -> JType {
        JType {
            kind,
            dim: 0,
            class_name: None,
        }
    }

    pub fn class(internal_name: impl Into<String>) -> JType {
        JType {
            kind: TypeKind::Class,
            dim: 0,
            class_name: Some(internal_name.into()),
        }
    }

    pub fn object() -> JType {
        JType::class("java/lang/Object")
    }

    pub fn string() -> JType {
        JType::class("java/lang/String")
    }

    pub fn array_of(mut self, dims: u8) -> JType {
        self.dim += dims;
        self
    }

    /// The element type of an array, or `None` when `self` is not an array.
    pub fn element(&self) -> Option<JType> {
        if self.dim == 0 {
            return None;
        }
        let mut elem = self.clone();
        elem.dim -= 1;
        Some(elem)
    }

    pub fn is_array(&self) -> bool {
        self.dim > 0
    }

    pub fn is_void(&self) -> bool {
        self.dim == 0 && self.kind == TypeKind::Void
    }

    pub fn is_null(&self) -> bool {
        self.dim == 0 && self.kind == TypeKind::Null
    }

    pub fn is_boolean(&self) -> bool {
        self.dim == 0 && self.kind == TypeKind::Boolean
    }

    pub fn is_reference(&self) -> bool {
        self.dim > 0 || matches!(self.kind, TypeKind::Class | TypeKind::Null)
    }

    pub fn is_class(&self, internal_name: &str) -> bool {
        self.dim == 0 && self.class_name.as_deref() == Some(internal_name)
    }

    pub fn is_string(&self) -> bool {
        self.is_class("java/lang/String")
    }

    pub fn is_object(&self) -> bool {
        self.is_class("java/lang/Object")
    }

    pub fn is_numeric(&self) -> bool {
        self.dim == 0
            && matches!(
                self.kind,
                TypeKind::Byte
                    | TypeKind::Char
                    | TypeKind::Short
                    | TypeKind::Int
                    | TypeKind::Long
                    | TypeKind::Float
                    | TypeKind::Double
            )
    }

    /// byte, char, short or int.
    pub fn is_int_family(&self) -> bool {
        self.dim == 0
            && matches!(
                self.kind,
                TypeKind::Byte | TypeKind::Char | TypeKind::Short | TypeKind::Int
            )
    }

    pub fn is_wide(&self) -> bool {
        self.dim == 0 && matches!(self.kind, TypeKind::Long | TypeKind::Double)
    }

    /// Local variable slots (and operand stack words) a value of this type takes.
    pub fn slot_size(&self) -> u16 {
        if self.is_void() {
            0
        } else if self.is_wide() {
            2
        } else {
            1
        }
    }

    pub fn descriptor(&self) -> String {
        let mut out = "[".repeat(self.dim as usize);
        match (self.kind.descriptor_char(), &self.class_name) {
            (Some(c), _) => out.push(c),
            (None, Some(name)) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            (None, None) => out.push_str("Ljava/lang/Object;"),
        }
        out
    }

    /// The name used with `checkcast`, `anewarray`, `instanceof` and class
    /// literals: the internal name for classes, the descriptor for arrays.
    pub fn class_ref_name(&self) -> String {
        if self.dim > 0 {
            self.descriptor()
        } else {
            self.class_name
                .clone()
                .unwrap_or_else(|| "java/lang/Object".to_string())
        }
    }

    pub fn from_descriptor(desc: &str) -> Option<JType> {
        match parse_type_at(desc, 0)? {
            (ty, end) if end == desc.len() => Some(ty),
            _ => None,
        }
    }
}

impl fmt::Display for JType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class_name {
            Some(name) => write!(f, "{}", internal_to_source_name(name))?,
            None => write!(f, "{}", self.kind.keyword())?,
        }
        for _ in 0..self.dim {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns the type and the position just past it.
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JType, usize)> {
    let bytes = desc.as_bytes();
    let mut pos = pos;
    let mut dim = 0u8;
    while bytes.get(pos) == Some(&b'[') {
        dim += 1;
        pos += 1;
    }
    let kind = match *bytes.get(pos)? {
        b'B' => TypeKind::Byte,
        b'C' => TypeKind::Char,
        b'D' => TypeKind::Double,
        b'F' => TypeKind::Float,
        b'I' => TypeKind::Int,
        b'J' => TypeKind::Long,
        b'S' => TypeKind::Short,
        b'Z' => TypeKind::Boolean,
        b'V' => TypeKind::Void,
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let name = &desc[pos + 1..pos + 1 + semi];
            return Some((JType::class(name).array_of(dim), pos + semi + 2));
        }
        _ => return None,
    };
    Some((JType::prim(kind).array_of(dim), pos + 1))
}

/// Parse a method descriptor, e.g. "(II)V" -> ([int, int], void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JType>, JType)> {
    if !desc.starts_with('(') {
        return None;
    }
    let close = desc.find(')')?;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        params.push(ty);
        pos = next;
    }
    let (ret, end) = parse_type_at(desc, close + 1)?;
    if end != desc.len() {
        return None;
    }
    Some((params, ret))
}

pub fn method_descriptor(params: &[JType], ret: &JType) -> String {
    let mut out = String::from("(");
    for p in params {
        out.push_str(&p.descriptor());
    }
    out.push(')');
    out.push_str(&ret.descriptor());
    out
}

/// Total parameter slots of a method descriptor, excluding the receiver.
pub fn param_slots(desc: &str) -> Option<u16> {
    let (params, _) = parse_method_descriptor(desc)?;
    Some(params.iter().map(JType::slot_size).sum())
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Convert a dotted source name to internal form.
pub fn source_to_internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Get the package from an internal name.
pub fn package_name(name: &str) -> Option<&str> {
    name.rfind('/').map(|pos| &name[..pos])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(JType::from_descriptor("I"), Some(JType::INT));
        assert_eq!(JType::from_descriptor("J"), Some(JType::LONG));
        assert_eq!(JType::from_descriptor("V"), Some(JType::VOID));
        assert_eq!(JType::from_descriptor("II"), None);
    }

    #[test]
    fn test_parse_array() {
        let t = JType::from_descriptor("[[Ljava/lang/Object;").unwrap();
        assert_eq!(t.dim, 2);
        assert_eq!(t.class_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(t.element().unwrap().descriptor(), "[Ljava/lang/Object;");
        assert_eq!(t.to_string(), "java.lang.Object[][]");
    }

    #[test]
    fn test_parse_method_descriptor() {
        let (params, ret) = parse_method_descriptor("(Ljava/lang/String;J[I)V").unwrap();
        assert_eq!(params, vec![JType::string(), JType::LONG, JType::INT.array_of(1)]);
        assert_eq!(ret, JType::VOID);
        assert_eq!(param_slots("(Ljava/lang/String;J[I)V"), Some(4));
        assert_eq!(method_descriptor(&params, &ret), "(Ljava/lang/String;J[I)V");
    }

    #[test]
    fn test_names() {
        assert_eq!(internal_to_source_name("java/lang/String"), "java.lang.String");
        assert_eq!(simple_class_name("java/lang/String"), "String");
        assert_eq!(package_name("java/lang/String"), Some("java/lang"));
        assert_eq!(package_name("NoPackage"), None);
    }
}

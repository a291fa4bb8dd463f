//! Access flags shared by class models, synthesized members and compiled declarations.

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ENUM = 0x4000;       //	Declared as an enum type.
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct MethodAccessFlags(u16);

bitflags! {
    impl MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;       // Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;      // Declared private; accessible only within the defining class.
        const PROTECTED = 0x0004;    // Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;       // Declared static.
        const FINAL = 0x0010;        // Declared final; must not be overridden.
        const SYNCHRONIZED = 0x0020; // Declared synchronized; invocation is wrapped by a monitor use.
        const BRIDGE = 0x0040;       // A bridge method, generated by the compiler.
        const VARARGS = 0x0080;      // Declared with variable number of arguments.
        const NATIVE = 0x0100;       // Declared native; implemented in a language other than Java.
        const ABSTRACT = 0x0400;     // Declared abstract; no implementation is provided.
        const STRICT = 0x0800;       // Declared strictfp; floating-point mode is FP-strict.
        const SYNTHETIC = 0x1000;    // Declared synthetic; not present in the source code.
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct FieldAccessFlags(u16);

bitflags! {
    impl FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;     // 	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;    // 	Declared private; usable only within the defining class.
        const PROTECTED = 0x0004;  // 	Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;     // 	Declared static.
        const FINAL = 0x0010;      // 	Declared final; never directly assigned to after object construction.
        const VOLATILE = 0x0040;   // 	Declared volatile; cannot be cached.
        const TRANSIENT = 0x0080;  // 	Declared transient; not written or read by a persistent object manager.
        const SYNTHETIC = 0x1000;  // 	Declared synthetic; not present in the source code.
        const ENUM = 0x4000;       // 	Declared as an element of an enum.
    }
}

/// Source-level modifiers collected by the parser before it knows whether it is
/// looking at a field or a method.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Modifiers(u16);

bitflags! {
    impl Modifiers: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
    }
}

impl Modifiers {
    pub fn from_keyword(word: &str) -> Option<Modifiers> {
        Some(match word {
            "public" => Modifiers::PUBLIC,
            "private" => Modifiers::PRIVATE,
            "protected" => Modifiers::PROTECTED,
            "static" => Modifiers::STATIC,
            "final" => Modifiers::FINAL,
            "synchronized" => Modifiers::SYNCHRONIZED,
            "volatile" => Modifiers::VOLATILE,
            "transient" => Modifiers::TRANSIENT,
            "native" => Modifiers::NATIVE,
            "abstract" => Modifiers::ABSTRACT,
            "strictfp" => Modifiers::STRICT,
            _ => return None,
        })
    }

    pub fn to_method_flags(self) -> MethodAccessFlags {
        // Bit positions coincide for every method modifier.
        MethodAccessFlags::from_bits_truncate(
            self.bits() & !(Modifiers::VOLATILE | Modifiers::TRANSIENT).bits(),
        )
    }

    pub fn to_field_flags(self) -> FieldAccessFlags {
        FieldAccessFlags::from_bits_truncate(
            self.bits()
                & (Modifiers::PUBLIC
                    | Modifiers::PRIVATE
                    | Modifiers::PROTECTED
                    | Modifiers::STATIC
                    | Modifiers::FINAL
                    | Modifiers::VOLATILE
                    | Modifiers::TRANSIENT)
                    .bits(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_flags_drop_field_only_bits() {
        let m = Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::TRANSIENT;
        assert_eq!(
            m.to_method_flags(),
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC
        );
    }

    #[test]
    fn test_field_flags_drop_method_only_bits() {
        let m = Modifiers::PRIVATE | Modifiers::SYNCHRONIZED | Modifiers::FINAL;
        assert_eq!(
            m.to_field_flags(),
            FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL
        );
    }
}

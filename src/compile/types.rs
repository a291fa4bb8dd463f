//! Primitive conversion and promotion rules.

use crate::code_attribute::Instruction;
use crate::descriptor::{JType, TypeKind};

/// Promotion rank; `None` for non-numeric kinds.
pub fn numeric_rank(kind: TypeKind) -> Option<u8> {
    Some(match kind {
        TypeKind::Byte | TypeKind::Char | TypeKind::Short | TypeKind::Int => 0,
        TypeKind::Long => 1,
        TypeKind::Float => 2,
        TypeKind::Double => 3,
        _ => return None,
    })
}

fn kind_of_rank(rank: u8) -> TypeKind {
    match rank {
        0 => TypeKind::Int,
        1 => TypeKind::Long,
        2 => TypeKind::Float,
        _ => TypeKind::Double,
    }
}

/// Unary numeric promotion: byte, char and short become int.
pub fn unary_promotion(ty: &JType) -> Option<JType> {
    if !ty.is_numeric() {
        return None;
    }
    numeric_rank(ty.kind).map(|r| JType::prim(kind_of_rank(r)))
}

/// Binary numeric promotion of two operand types.
pub fn binary_promotion(a: &JType, b: &JType) -> Option<JType> {
    if !a.is_numeric() || !b.is_numeric() {
        return None;
    }
    let rank = numeric_rank(a.kind)?.max(numeric_rank(b.kind)?);
    Some(JType::prim(kind_of_rank(rank)))
}

/// Widening primitive conversion, identity included.
pub fn is_primitive_widening(from: TypeKind, to: TypeKind) -> bool {
    use TypeKind::*;
    from == to
        || matches!(
            (from, to),
            (Byte, Short | Int | Long | Float | Double)
                | (Short, Int | Long | Float | Double)
                | (Char, Int | Long | Float | Double)
                | (Int, Long | Float | Double)
                | (Long, Float | Double)
                | (Float, Double)
        )
}

/// True when the int constant `value` is representable in `kind`, which allows
/// it to initialize a narrower variable without a cast.
pub fn int_constant_fits(value: i64, kind: TypeKind) -> bool {
    match kind {
        TypeKind::Byte => i8::try_from(value).is_ok(),
        TypeKind::Short => i16::try_from(value).is_ok(),
        TypeKind::Char => u16::try_from(value).is_ok(),
        TypeKind::Int => i32::try_from(value).is_ok(),
        _ => false,
    }
}

/// Instructions converting a value of primitive kind `from` to `to`. Empty when
/// no instruction is needed.
pub fn conversion_ops(from: TypeKind, to: TypeKind) -> Vec<Instruction> {
    use Instruction::*;
    use TypeKind::*;
    let stack_kind = |k| match k {
        Boolean | Byte | Char | Short | Int => Int,
        other => other,
    };
    let mut ops = match (stack_kind(from), stack_kind(to)) {
        (Int, Long) => vec![I2l],
        (Int, Float) => vec![I2f],
        (Int, Double) => vec![I2d],
        (Long, Int) => vec![L2i],
        (Long, Float) => vec![L2f],
        (Long, Double) => vec![L2d],
        (Float, Int) => vec![F2i],
        (Float, Long) => vec![F2l],
        (Float, Double) => vec![F2d],
        (Double, Int) => vec![D2i],
        (Double, Long) => vec![D2l],
        (Double, Float) => vec![D2f],
        _ => Vec::new(),
    };
    // narrowing into a sub-int kind goes through int
    let narrow = match to {
        Byte if from != Byte => Some(I2b),
        Char if from != Char => Some(I2c),
        Short if !matches!(from, Short | Byte) => Some(I2s),
        _ => None,
    };
    ops.extend(narrow);
    ops
}

fn with_exponent(mantissa_exp: String, sign: &str) -> String {
    match mantissa_exp.split_once('e') {
        Some((mantissa, exp)) if mantissa.contains('.') => format!("{}{}E{}", sign, mantissa, exp),
        Some((mantissa, exp)) => format!("{}{}.0E{}", sign, mantissa, exp),
        None => format!("{}{}", sign, mantissa_exp),
    }
}

/// `String.valueOf(double)`.
pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        return "NaN".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0.0" } else { "0.0" }.into();
    }
    let sign = if v < 0.0 { "-" } else { "" };
    let abs = v.abs();
    if (1e-3..1e7).contains(&abs) {
        format!("{}{:?}", sign, abs)
    } else {
        with_exponent(format!("{:e}", abs), sign)
    }
}

/// `String.valueOf(float)`.
pub fn format_float(v: f32) -> String {
    if v.is_nan() {
        return "NaN".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0.0" } else { "0.0" }.into();
    }
    let sign = if v < 0.0 { "-" } else { "" };
    let abs = v.abs();
    if (1e-3..1e7).contains(&abs) {
        format!("{}{:?}", sign, abs)
    } else {
        with_exponent(format!("{:e}", abs), sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_follows_rank() {
        assert_eq!(binary_promotion(&JType::BYTE, &JType::CHAR), Some(JType::INT));
        assert_eq!(binary_promotion(&JType::INT, &JType::LONG), Some(JType::LONG));
        assert_eq!(binary_promotion(&JType::LONG, &JType::FLOAT), Some(JType::FLOAT));
        assert_eq!(binary_promotion(&JType::FLOAT, &JType::DOUBLE), Some(JType::DOUBLE));
        assert_eq!(binary_promotion(&JType::BOOLEAN, &JType::INT), None);
        assert_eq!(unary_promotion(&JType::SHORT), Some(JType::INT));
    }

    #[test]
    fn test_widening() {
        assert!(is_primitive_widening(TypeKind::Char, TypeKind::Int));
        assert!(!is_primitive_widening(TypeKind::Char, TypeKind::Short));
        assert!(!is_primitive_widening(TypeKind::Long, TypeKind::Int));
        assert!(!is_primitive_widening(TypeKind::Boolean, TypeKind::Int));
    }

    #[test]
    fn test_conversions() {
        use Instruction::*;
        assert_eq!(conversion_ops(TypeKind::Int, TypeKind::Long), vec![I2l]);
        assert_eq!(conversion_ops(TypeKind::Long, TypeKind::Byte), vec![L2i, I2b]);
        assert_eq!(conversion_ops(TypeKind::Double, TypeKind::Char), vec![D2i, I2c]);
        assert_eq!(conversion_ops(TypeKind::Byte, TypeKind::Short), vec![]);
        assert_eq!(conversion_ops(TypeKind::Char, TypeKind::Int), vec![]);
        assert_eq!(conversion_ops(TypeKind::Int, TypeKind::Short), vec![I2s]);
    }

    #[test]
    fn test_constant_fits() {
        assert!(int_constant_fits(127, TypeKind::Byte));
        assert!(!int_constant_fits(128, TypeKind::Byte));
        assert!(int_constant_fits(65535, TypeKind::Char));
        assert!(!int_constant_fits(-1, TypeKind::Char));
    }

    #[test]
    fn test_java_number_strings() {
        assert_eq!(format_double(1.0), "1.0");
        assert_eq!(format_double(0.001), "0.001");
        assert_eq!(format_double(1e7), "1.0E7");
        assert_eq!(format_double(1.5e-4), "1.5E-4");
        assert_eq!(format_double(-2.5), "-2.5");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(1e10), "1.0E10");
    }
}

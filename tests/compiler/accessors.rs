use classfile_compiler::class_pool::{AccessorBody, SyntheticMethod, CONSTRUCTOR_MARKER};

use super::*;

/// Compiles `src` into a static method of the nested class and hands back the
/// code together with the pool, so the outer class's accessors can be read.
fn compile_in_inner(params: &[JType], ret: JType, src: &str) -> (MethodCode, ClassPool) {
    let classes = classes();
    let code = {
        let mut pool = ConstPool::new();
        let mut javac = Javac::new(&classes, &mut pool, INNER);
        javac.record_params(params, true).unwrap();
        javac.record_return_type(ret, false).unwrap();
        javac.compile_stmnt(src).unwrap();
        javac.finish_code().unwrap()
    };
    (code, classes)
}

fn outer_accessors(classes: &ClassPool) -> Vec<SyntheticMethod> {
    classes.get(CALC).unwrap().synthetic_methods().unwrap()
}

#[test]
fn test_private_field_read_is_memoized() {
    let (code, classes) = compile_in_inner(
        &[JType::class(CALC)],
        JType::INT,
        "{ return $1.count + $1.count; }",
    );
    assert_eq!(count(&ops(&code), |i| matches!(i, Instruction::Invokestatic(_))), 2);
    assert!(!ops(&code).iter().any(|i| matches!(i, Instruction::Getfield(_))));

    let accessors = outer_accessors(&classes);
    assert_eq!(accessors.len(), 1);
    assert_eq!(accessors[0].name, "access$0");
    assert_eq!(accessors[0].descriptor, "(Ldemo/Calc;)I");
    assert!(accessors[0].access.contains(MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC));
}

#[test]
fn test_private_field_write() {
    let (code, classes) = compile_in_inner(&[JType::class(CALC)], JType::VOID, "{ $1.count = 4; }");
    assert!(!ops(&code).iter().any(|i| matches!(i, Instruction::Putfield(_))));

    let accessors = outer_accessors(&classes);
    assert_eq!(accessors.len(), 1);
    assert_eq!(accessors[0].descriptor, "(Ldemo/Calc;I)V");
    assert!(matches!(accessors[0].body, AccessorBody::SetField { .. }));
}

#[test]
fn test_private_static_method_forwarder() {
    let (code, classes) = compile_in_inner(&[], JType::INT, "{ return hidden(3); }");
    assert_eq!(count(&ops(&code), |i| matches!(i, Instruction::Invokestatic(_))), 1);

    let accessors = outer_accessors(&classes);
    assert_eq!(accessors.len(), 1);
    assert_eq!(accessors[0].descriptor, "(I)I");
    assert!(matches!(
        &accessors[0].body,
        AccessorBody::Forward { name, is_static: true, .. } if name == "hidden"
    ));
}

#[test]
fn test_private_constructor_uses_shadow() {
    let (code, classes) = compile_in_inner(&[], JType::class(CALC), "{ return new Calc(5); }");
    let listing = ops(&code);
    assert!(listing.contains(&Instruction::Aconstnull));
    assert!(listing.iter().any(|i| matches!(i, Instruction::Invokespecial(_))));

    let accessors = outer_accessors(&classes);
    assert_eq!(accessors.len(), 1);
    assert_eq!(accessors[0].name, "<init>");
    assert_eq!(accessors[0].descriptor, format!("(IL{};)V", CONSTRUCTOR_MARKER));

    // the public constructor is reached directly
    let (code, classes) = compile_in_inner(&[], JType::class(CALC), "{ return new Calc(); }");
    assert!(!ops(&code).contains(&Instruction::Aconstnull));
    assert!(outer_accessors(&classes).is_empty());
}

#[test]
fn test_accessor_bodies() {
    let (_, classes) = compile_in_inner(&[JType::class(CALC)], JType::INT, "{ return $1.count; }");
    let accessor = &outer_accessors(&classes)[0];
    let mut pool = ConstPool::new();
    let body = accessor.emit_body(CALC, &mut pool).unwrap();
    let listing = ops(&body);
    assert_eq!(listing[0], Instruction::Aload0);
    assert!(matches!(listing[1], Instruction::Getfield(_)));
    assert_eq!(listing[2], Instruction::Ireturn);
    assert_eq!(body.max_locals, 1);
}

#[test]
fn test_same_class_needs_no_accessor() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params(&[], false).unwrap();
    javac.record_return_type(JType::INT, false).unwrap();
    javac.compile_stmnt("{ return count + hidden(1); }").unwrap();
    let code = javac.finish_code().unwrap();
    assert!(ops(&code).iter().any(|i| matches!(i, Instruction::Getfield(_))));
    assert!(outer_accessors(&classes).is_empty());
}

#[test]
fn test_public_members_are_reached_directly() {
    let (code, classes) = compile_in_inner(&[JType::class(CALC)], JType::VOID, r#"{ $1.name = "n"; $1.log("x"); }"#);
    let listing = ops(&code);
    assert!(listing.iter().any(|i| matches!(i, Instruction::Putfield(_))));
    assert!(listing.iter().any(|i| matches!(i, Instruction::Invokevirtual(_))));
    assert!(outer_accessors(&classes).is_empty());
}

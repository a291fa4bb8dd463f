use super::*;

// --- Expressions and statements ---

#[test]
fn test_add_parameters() {
    let code = compile_body(&[JType::INT, JType::INT], JType::INT, false, "{ return $1 + $2; }").unwrap();
    assert_eq!(
        ops(&code),
        vec![Instruction::Iload1, Instruction::Iload2, Instruction::Iadd, Instruction::Ireturn]
    );
    assert!(code.max_locals >= 3);
    assert_eq!(code.max_stack, 2);
}

#[test]
fn test_string_constant_folds() {
    let classes = classes();
    let mut pool = ConstPool::new();
    {
        let mut javac = Javac::new(&classes, &mut pool, CALC);
        javac.record_params(&[], true).unwrap();
        javac.record_return_type(JType::string(), false).unwrap();
        javac.compile_stmnt(r#"{ return "a" + 1 + 1.0; }"#).unwrap();
        let code = javac.finish_code().unwrap();
        assert!(matches!(ops(&code)[0], Instruction::Ldc(_)));
        assert!(!ops(&code).iter().any(|i| matches!(i, Instruction::New(_))));
    }
    let entries = pool.count();
    pool.get_or_add_string("a11.0");
    assert_eq!(pool.count(), entries, "folded string should already be interned");
}

#[test]
fn test_runtime_concatenation() {
    let code = compile_body(&[JType::INT], JType::string(), true, r#"{ return "n=" + $1; }"#).unwrap();
    let code = ops(&code);
    assert!(matches!(code[0], Instruction::New(_)));
    assert_eq!(count(&code, |i| matches!(i, Instruction::Invokevirtual(_))), 3);
    assert_eq!(code.last(), Some(&Instruction::Areturn));
}

#[test]
fn test_compound_string_assignment() {
    let code = compile_body(
        &[JType::INT],
        JType::string(),
        true,
        r#"{ String s = "x"; s += $1; return s; }"#,
    )
    .unwrap();
    let code = ops(&code);
    assert!(code.contains(&Instruction::Swap));
    assert!(code.contains(&Instruction::Dupx1));
}

#[test]
fn test_long_arithmetic() {
    let code = compile_body(&[JType::LONG], JType::LONG, true, "{ long x = $1; return x * 2L + 1; }").unwrap();
    let code = ops(&code);
    assert!(code.contains(&Instruction::Lmul));
    assert!(code.contains(&Instruction::Ladd));
    assert_eq!(code.last(), Some(&Instruction::Lreturn));
}

#[test]
fn test_static_call_and_widening_argument() {
    let code = compile_body(&[JType::SHORT], JType::INT, true, "{ return twice($1) + Math.max($1, 3); }").unwrap();
    let code = ops(&code);
    assert_eq!(count(&code, |i| matches!(i, Instruction::Invokestatic(_))), 2);
}

#[test]
fn test_array_initializer_and_length() {
    let code = compile_body(&[], JType::INT, true, "{ int[] a = {1, 2, 3}; return a.length; }").unwrap();
    let code = ops(&code);
    assert!(code.contains(&Instruction::Newarray(10)));
    assert_eq!(count(&code, |i| *i == Instruction::Iastore), 3);
    assert!(code.contains(&Instruction::Arraylength));
}

#[test]
fn test_multi_dimensional_array() {
    let code = compile_body(&[], JType::INT, true, "{ int[][] m = new int[2][3]; m[1][2] = 7; return m[1][2]; }")
        .unwrap();
    let code = ops(&code);
    assert!(code
        .iter()
        .any(|i| matches!(i, Instruction::Multianewarray { dimensions: 2, .. })));
    assert!(code.contains(&Instruction::Aaload));
    assert!(code.contains(&Instruction::Iaload));
}

#[test]
fn test_field_access() {
    let code = compile_body(&[], JType::string(), false, r#"{ name = "a"; total += 2; return name; }"#).unwrap();
    let code = ops(&code);
    assert!(code.iter().any(|i| matches!(i, Instruction::Putfield(_))));
    assert!(code.iter().any(|i| matches!(i, Instruction::Putstatic(_))));
    assert!(code.contains(&Instruction::Ladd));
}

#[test]
fn test_instanceof_and_cast() {
    let code = compile_body(
        &[JType::object()],
        JType::INT,
        true,
        "{ if ($1 instanceof String) return ((String) $1).length(); return -1; }",
    )
    .unwrap();
    let code = ops(&code);
    assert!(code.iter().any(|i| matches!(i, Instruction::Instanceof(_))));
    assert!(code.iter().any(|i| matches!(i, Instruction::Checkcast(_))));
}

#[test]
fn test_class_literals() {
    let code = compile_body(&[], JType::VOID, true, "{ Class a = int.class; Class b = String.class; }").unwrap();
    let code = ops(&code);
    assert!(code.iter().any(|i| matches!(i, Instruction::Getstatic(_))));
    assert!(code.iter().any(|i| matches!(i, Instruction::Ldc(_))));
}

#[test]
fn test_narrowing_constant_needs_no_conversion() {
    let code = compile_body(&[], JType::VOID, true, "{ byte b = 10; char c = 'x'; short s = -3; }").unwrap();
    let code = ops(&code);
    assert!(!code.contains(&Instruction::I2b));
    assert!(!code.contains(&Instruction::I2s));
}

#[test]
fn test_trailing_point_literals() {
    let code = compile_body(&[], JType::DOUBLE, true, "{ double d = 1.e5; float f = 1.f; return d + f + 2.d; }").unwrap();
    let code = ops(&code);
    assert_eq!(code.last(), Some(&Instruction::Dreturn));
    assert!(code.contains(&Instruction::F2d));

    let err = compile_body(&[], JType::VOID, true, "{ int n = 1.foo; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);
}

#[test]
fn test_int_local_increment() {
    let code = compile_body(&[], JType::INT, true, "{ int i = 0; i++; i += 5; return i; }").unwrap();
    let code = ops(&code);
    assert_eq!(count(&code, |i| matches!(i, Instruction::Iinc { .. })), 2);
}

#[test]
fn test_type_errors() {
    let err = compile_body(&[], JType::VOID, true, r#"{ int x = "s"; }"#).unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);

    let err = compile_body(&[], JType::VOID, true, "{ nothing(); }").unwrap_err();
    assert!(matches!(err, CompileError::MethodNotFound { .. }), "{:?}", err);

    let err = compile_body(&[], JType::VOID, true, "{ 1 + 2; }").unwrap_err();
    assert!(
        matches!(err, CompileError::TypeError { .. } | CompileError::ParseError { .. }),
        "{:?}",
        err
    );
}

#[test]
fn test_expression_into_open_buffer() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params(&[JType::INT], true).unwrap();
    let ty = javac.compile_expr("$1 * 2.0f").unwrap();
    assert_eq!(ty, JType::FLOAT);
    assert!(javac.bytecode().instructions().contains(&Instruction::Fmul));
}

#[test]
fn test_locals_persist_between_statements() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params(&[], true).unwrap();
    javac.compile_stmnt("int x = 4;").unwrap();
    javac.compile_stmnt("x = x * 3;").unwrap();
    let code = javac.finish_code().unwrap();
    assert_eq!(code.max_locals, 1);
    assert!(ops(&code).contains(&Instruction::Imul));
}

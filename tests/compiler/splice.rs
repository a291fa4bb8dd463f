use super::*;

fn javac_for<'a>(classes: &'a ClassPool, pool: &'a mut ConstPool, params: &[JType], ret: JType) -> Javac<'a> {
    let mut javac = Javac::new(classes, pool, CALC);
    javac.record_params(params, false).unwrap();
    javac.record_return_type(ret, false).unwrap();
    javac
}

// --- $-variables ---

#[test]
fn test_dollar_zero_is_this() {
    let code = compile_body(&[], JType::VOID, false, r#"{ $0.log("hi"); }"#).unwrap();
    assert_eq!(ops(&code)[0], Instruction::Aload0);
}

#[test]
fn test_args_array_boxes_primitives() {
    let code = compile_body(
        &[JType::INT, JType::string()],
        JType::INT,
        false,
        "{ Object[] a = $args; return a.length; }",
    )
    .unwrap();
    let listing = ops(&code);
    assert!(listing.iter().any(|i| matches!(i, Instruction::Anewarray(_))));
    assert_eq!(count(&listing, |i| *i == Instruction::Aastore), 2);
    // Integer.valueOf for the int, nothing for the string
    assert_eq!(count(&listing, |i| matches!(i, Instruction::Invokestatic(_))), 1);
}

#[test]
fn test_spliced_arguments_expand() {
    let code = compile_body(&[JType::INT], JType::INT, true, "{ return twice($$); }").unwrap();
    assert_eq!(
        ops(&code)
            .iter()
            .filter(|i| matches!(i, Instruction::Invokestatic(_)))
            .count(),
        1
    );
    let err = compile_body(&[JType::INT], JType::VOID, true, "{ Object o = $$; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);
}

#[test]
fn test_sig_type_and_class() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = javac_for(&classes, &mut pool, &[JType::INT, JType::string()], JType::LONG);
    javac
        .compile_stmnt("{ Class[] s = $sig; Class c = $class; Class t = $type; }")
        .unwrap();
    let code = javac.finish_code().unwrap();
    let listing = ops(&code);
    // Integer.TYPE and Long.TYPE
    assert_eq!(count(&listing, |i| matches!(i, Instruction::Getstatic(_))), 2);
    // String.class and Calc.class
    assert_eq!(count(&listing, |i| matches!(i, Instruction::Ldc(_))), 2);
}

#[test]
fn test_return_cast_unboxes() {
    let code = compile_body(&[JType::object()], JType::INT, false, "{ return ($r) $1; }").unwrap();
    let listing = ops(&code);
    assert!(listing.iter().any(|i| matches!(i, Instruction::Checkcast(_))));
    assert!(listing.iter().any(|i| matches!(i, Instruction::Invokevirtual(_))));
    assert_eq!(listing.last(), Some(&Instruction::Ireturn));
}

#[test]
fn test_return_cast_in_void_context_drops_value() {
    let code = compile_body(&[JType::LONG], JType::VOID, false, "{ return ($r) $1; }").unwrap();
    assert_eq!(
        ops(&code),
        vec![Instruction::Lload1, Instruction::Pop2, Instruction::Return]
    );
}

#[test]
fn test_box_cast() {
    let code = compile_body(&[JType::DOUBLE], JType::object(), false, "{ return ($w) $1; }").unwrap();
    let listing = ops(&code);
    assert!(listing.iter().any(|i| matches!(i, Instruction::Invokestatic(_))));
    assert_eq!(listing.last(), Some(&Instruction::Areturn));
}

#[test]
fn test_result_variable() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params(&[JType::INT], true).unwrap();
    let slot = javac.record_return_type(JType::INT, true).unwrap();
    assert_eq!(slot, Some(1));
    javac.compile_stmnt("$_ = $1 * 2;").unwrap();
    let code = javac.finish_code().unwrap();
    assert_eq!(
        ops(&code),
        vec![Instruction::Iload0, Instruction::Iconst2, Instruction::Imul, Instruction::Istore1]
    );

    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    assert_eq!(javac.record_return_type(JType::VOID, true).unwrap(), None);
}

#[test]
fn test_recorded_variable() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params(&[], true).unwrap();
    let slot = javac.record_variable(JType::LONG, "start").unwrap();
    javac.compile_stmnt("start = System.nanoTime();").unwrap();
    let code = javac.finish_code().unwrap();
    assert_eq!(slot, 0);
    assert_eq!(code.max_locals, 2);
}

// --- $proceed and $cflow ---

#[test]
fn test_proceed_forwards_to_method() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params_descriptor("(I)I", true).unwrap();
    javac.record_proceed_call(Some("demo.Calc"), "twice").unwrap();
    javac.compile_stmnt("{ return $proceed($$) + 1; }").unwrap();
    let code = javac.finish_code().unwrap();
    let listing = ops(&code);
    assert_eq!(count(&listing, |i| matches!(i, Instruction::Invokestatic(_))), 1);
    assert_eq!(listing.last(), Some(&Instruction::Ireturn));
}

#[test]
fn test_proceed_on_receiver() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params_descriptor("(Ljava/lang/String;)V", false).unwrap();
    javac.record_proceed_call(Some("$0"), "log").unwrap();
    javac.compile_stmnt(r#"{ $proceed("before " + $1); }"#).unwrap();
    let code = javac.finish_code().unwrap();
    let listing = ops(&code);
    assert_eq!(listing[0], Instruction::Aload0);
    assert!(listing.iter().any(|i| matches!(i, Instruction::Invokevirtual(_))));
}

#[test]
fn test_proceed_without_handler() {
    let err = compile_body(&[], JType::VOID, true, "{ $proceed(); }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);
}

#[test]
fn test_cflow_counter() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, CALC);
    javac.record_params(&[], true).unwrap();
    javac.record_return_type(JType::INT, false).unwrap();
    javac.record_cflow("depth", CALC, "_cflow$0");
    javac
        .compile_stmnt("{ if ($cflow(depth) > 0) return 0; return 1; }")
        .unwrap();
    let code = javac.finish_code().unwrap();
    let listing = ops(&code);
    assert!(matches!(listing[0], Instruction::Getstatic(_)));
    assert!(matches!(listing[1], Instruction::Invokevirtual(_)));

    let err = compile_body(&[], JType::INT, true, "{ return $cflow(unknown); }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);
}

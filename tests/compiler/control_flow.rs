use super::*;

fn is_log_call(instr: &Instruction) -> bool {
    matches!(instr, Instruction::Invokevirtual(_))
}

// --- Branches, loops and switches ---

#[test]
fn test_short_circuit_skips_division() {
    let code = compile_body(
        &[],
        JType::BOOLEAN,
        true,
        "{ boolean r = false && (1 / 0 == 0); return r; }",
    )
    .unwrap();
    assert!(!ops(&code).contains(&Instruction::Idiv));
}

#[test]
fn test_switch_keys_are_sorted() {
    let code = compile_body(
        &[JType::INT],
        JType::INT,
        true,
        "{ int r = 0; switch ($1) { case 5: r = 50; break; case 1: r = 10; break; case 3: r = 30; } return r; }",
    )
    .unwrap();
    let listing = code.instructions().unwrap();
    let (switch_pc, default, pairs) = listing
        .iter()
        .find_map(|(pc, instr)| match instr {
            Instruction::Lookupswitch { default, pairs, .. } => Some((*pc, *default, pairs.clone())),
            _ => None,
        })
        .expect("no lookupswitch");
    let keys: Vec<i32> = pairs.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![1, 3, 5]);

    // without a default the switch jumps to the code after it: `return r`
    let (load_pc, _) = listing
        .iter()
        .rev()
        .find(|(_, instr)| *instr == Instruction::Iload1)
        .unwrap();
    assert_eq!((switch_pc as i32 + default) as u32, *load_pc);
}

#[test]
fn test_duplicate_case_label() {
    let err = compile_body(
        &[JType::INT],
        JType::VOID,
        true,
        "{ switch ($1) { case 1: break; case 1: break; } }",
    )
    .unwrap_err();
    assert!(
        matches!(err, CompileError::CodegenError { .. } | CompileError::TypeError { .. }),
        "{:?}",
        err
    );
}

#[test]
fn test_for_loop_with_break_and_continue() {
    let code = compile_body(
        &[JType::INT],
        JType::INT,
        true,
        "{ int s = 0; for (int i = 0; i < $1; i++) { if (i == 3) continue; if (i > 10) break; s += i; } return s; }",
    )
    .unwrap();
    let code = ops(&code);
    assert!(code.iter().any(|i| matches!(i, Instruction::Goto(off) if *off < 0)));
    assert!(code.iter().any(|i| matches!(i, Instruction::Iinc { value: 1, .. })));
    assert_eq!(code.last(), Some(&Instruction::Ireturn));
}

#[test]
fn test_do_while_branches_back() {
    let code = compile_body(&[JType::INT], JType::INT, true, "{ int i = 0; do { i++; } while (i < $1); return i; }")
        .unwrap();
    assert!(ops(&code)
        .iter()
        .any(|i| matches!(i, Instruction::IfIcmplt(off) if *off < 0)));
}

#[test]
fn test_infinite_loop_needs_no_return() {
    let code = compile_member("int spin() { while (true) { } }").unwrap();
    let CompiledMember::Method(method) = code else {
        panic!("expected a method");
    };
    let code = method.code.unwrap();
    assert!(!ops(&code).contains(&Instruction::Ireturn));
}

// --- try / finally / synchronized ---

#[test]
fn test_finally_runs_on_both_returns() {
    let code = compile_body(
        &[JType::INT],
        JType::INT,
        false,
        r#"{ try { if ($1 > 0) return 1; return 2; } finally { log("done"); } }"#,
    )
    .unwrap();
    let listing = ops(&code);
    // one copy on the exception path, one on the return path
    assert_eq!(count(&listing, is_log_call), 2);
    assert_eq!(count(&listing, |i| *i == Instruction::Ireturn), 1);
    assert_eq!(code.exception_table.len(), 1);
    assert_eq!(code.exception_table[0].catch_type, 0);
    assert!(listing.contains(&Instruction::Athrow));
}

#[test]
fn test_finally_covers_catch_blocks() {
    let code = compile_body(
        &[],
        JType::VOID,
        false,
        r#"{ try { log("a"); } catch (RuntimeException e) { log("b"); } finally { log("c"); } }"#,
    )
    .unwrap();
    let listing = ops(&code);
    // a, b, then c after the body, after the catch and in the handler
    assert_eq!(count(&listing, is_log_call), 5);
    let table = &code.exception_table;
    assert_eq!(table.len(), 3);
    assert_ne!(table[0].catch_type, 0);
    assert!(table[1..].iter().all(|e| e.catch_type == 0));
    assert_eq!(table[1].handler_pc, table[2].handler_pc);
}

#[test]
fn test_break_through_finally() {
    let code = compile_body(
        &[JType::INT],
        JType::VOID,
        false,
        r#"{ while (true) { try { if ($1 > 0) break; } finally { log("f"); } } }"#,
    )
    .unwrap();
    let listing = ops(&code);
    // normal completion, exception path and the break tail
    assert_eq!(count(&listing, is_log_call), 3);
    assert_eq!(count(&listing, |i| matches!(i, Instruction::Goto(off) if *off < 0)), 1);
}

#[test]
fn test_empty_try_is_rejected() {
    let err = compile_body(&[], JType::VOID, false, r#"{ try { } finally { log("x"); } }"#).unwrap_err();
    assert!(matches!(err, CompileError::CodegenError { .. }), "{:?}", err);
}

#[test]
fn test_protected_range_beyond_method_limit() {
    let body = "x = x + 1000000; ".repeat(15_000);
    let src = format!("{{ int x = 0; try {{ {} }} finally {{ x = 0; }} }}", body);
    let err = compile_body(&[], JType::VOID, true, &src).unwrap_err();
    assert!(matches!(err, CompileError::CodegenError { .. }), "{:?}", err);
}

#[test]
fn test_synchronized_releases_monitor() {
    let code = compile_body(&[], JType::VOID, false, "{ synchronized (this) { count++; } }").unwrap();
    let listing = ops(&code);
    assert_eq!(count(&listing, |i| *i == Instruction::Monitorenter), 1);
    assert_eq!(count(&listing, |i| *i == Instruction::Monitorexit), 2);
    assert_eq!(code.exception_table.len(), 1);
    assert_eq!(code.exception_table[0].catch_type, 0);
}

#[test]
fn test_return_inside_synchronized() {
    let code = compile_body(&[], JType::INT, false, "{ synchronized (this) { return count; } }").unwrap();
    let listing = ops(&code);
    // unlock before the return and in the handler
    assert_eq!(count(&listing, |i| *i == Instruction::Monitorexit), 2);
    assert_eq!(count(&listing, |i| *i == Instruction::Ireturn), 1);
}

#[test]
fn test_break_out_of_synchronized_is_unsupported() {
    let err = compile_body(&[], JType::VOID, false, "{ while (true) { synchronized (this) { break; } } }").unwrap_err();
    assert!(matches!(err, CompileError::Unsupported(_)), "{:?}", err);
}

#[test]
fn test_labeled_break_is_an_error() {
    let err = compile_body(&[], JType::VOID, true, "{ foo: while (true) { break foo; } }").unwrap_err();
    assert!(matches!(err, CompileError::Unsupported(_)), "{:?}", err);

    assert!(compile_body(&[], JType::VOID, true, "{ break foo; }").is_err());
}

#[test]
fn test_throw() {
    let code = compile_body(&[], JType::VOID, true, "{ throw new RuntimeException(); }").unwrap();
    let listing = ops(&code);
    assert_eq!(listing.last(), Some(&Instruction::Athrow));
    assert!(!listing.contains(&Instruction::Return));
}

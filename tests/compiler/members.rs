use classfile_compiler::class_pool::ConstValue;
use classfile_compiler::compile::CompileOptions;

use super::*;

fn method(member: CompiledMember) -> classfile_compiler::compile::javac::CompiledMethod {
    match member {
        CompiledMember::Method(method) => method,
        other => panic!("expected a method, got {:?}", other),
    }
}

fn field(member: CompiledMember) -> classfile_compiler::compile::javac::CompiledField {
    match member {
        CompiledMember::Field(field) => field,
        other => panic!("expected a field, got {:?}", other),
    }
}

// --- Methods ---

#[test]
fn test_compile_method() {
    let add = method(compile_member("public int add(int a, int b) { return a + b; }").unwrap());
    assert_eq!(add.name, "add");
    assert_eq!(add.descriptor, "(II)I");
    assert_eq!(add.access, MethodAccessFlags::PUBLIC);
    let code = add.code.unwrap();
    assert_eq!(
        ops(&code),
        vec![Instruction::Iload1, Instruction::Iload2, Instruction::Iadd, Instruction::Ireturn]
    );
    assert_eq!(code.max_locals, 3);
}

#[test]
fn test_static_method_with_wide_parameters() {
    let m = method(compile_member("static double mix(long a, double b, int c) { return a * b + c; }").unwrap());
    assert_eq!(m.descriptor, "(JDI)D");
    let code = m.code.unwrap();
    assert_eq!(code.max_locals, 5);
    let listing = ops(&code);
    assert_eq!(listing[0], Instruction::Lload0);
    assert!(listing.contains(&Instruction::Iload(4)));
    assert_eq!(listing.last(), Some(&Instruction::Dreturn));
}

#[test]
fn test_void_method_gets_trailing_return() {
    let m = method(compile_member(r#"void greet() { log("hi"); }"#).unwrap());
    assert_eq!(ops(&m.code.unwrap()).last(), Some(&Instruction::Return));

    let classes = classes();
    let mut pool = ConstPool::new();
    let options = CompileOptions {
        append_void_return: false,
        ..CompileOptions::default()
    };
    let m = method(
        Javac::with_options(&classes, &mut pool, CALC, options)
            .compile(r#"void greet() { log("hi"); }"#)
            .unwrap(),
    );
    assert_ne!(ops(&m.code.unwrap()).last(), Some(&Instruction::Return));
}

#[test]
fn test_constructor_calls_super_first() {
    let ctor = method(compile_member("public Calc(int start) { count = start; }").unwrap());
    assert_eq!(ctor.name, "<init>");
    assert_eq!(ctor.descriptor, "(I)V");
    let listing = ops(&ctor.code.unwrap());
    assert_eq!(listing[0], Instruction::Aload0);
    assert!(matches!(listing[1], Instruction::Invokespecial(_)));
    assert!(listing.iter().any(|i| matches!(i, Instruction::Putfield(_))));
}

#[test]
fn test_constructor_delegating_to_this() {
    let ctor = method(compile_member("Calc(long big) { this((int) big); }").unwrap());
    let listing = ops(&ctor.code.unwrap());
    // only the explicit this(...) call
    assert_eq!(count(&listing, |i| matches!(i, Instruction::Invokespecial(_))), 1);
    assert!(listing.contains(&Instruction::L2i));
}

#[test]
fn test_abstract_and_native_methods() {
    let m = method(compile_member("public abstract void run();").unwrap());
    assert!(m.code.is_none());
    assert!(m.access.contains(MethodAccessFlags::ABSTRACT));

    let m = method(compile_member("native int peek(long address);").unwrap());
    assert!(m.code.is_none());

    let err = compile_member("void run();").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);
    let err = compile_member("abstract void run() { }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);
}

#[test]
fn test_throws_clause() {
    let m = method(compile_member("void risky() throws RuntimeException, IllegalStateException { }").unwrap());
    assert_eq!(
        m.exceptions,
        vec!["java/lang/RuntimeException", "java/lang/IllegalStateException"]
    );
}

#[test]
fn test_throws_clause_from_imported_package() {
    let classes = classes();
    let mut pool = ConstPool::new();
    let options = CompileOptions {
        imported_packages: vec!["java.lang".into(), "java.io".into()],
        ..CompileOptions::default()
    };
    let m = method(
        Javac::with_options(&classes, &mut pool, CALC, options)
            .compile("void read() throws IOException { }")
            .unwrap(),
    );
    assert_eq!(m.exceptions, vec!["java/io/IOException"]);

    let err = compile_member("void read() throws IOException { }").unwrap_err();
    assert!(matches!(err, CompileError::NoSuchClass { .. }), "{:?}", err);
}

#[test]
fn test_missing_return() {
    let err = compile_member("int f() { }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);

    let err = compile_member("int f(int x) { if (x > 0) return 1; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);

    // an `if` without `else` can complete even under a constant condition
    let err = compile_member("int f() { if (true) return 1; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeError { .. }), "{:?}", err);

    assert!(compile_member("int f(int x) { if (x > 0) return 1; else return 2; }").is_ok());
    assert!(compile_member("int f() { while (true) { } }").is_ok());
    assert!(compile_member("int f() { for (;;) { } }").is_ok());
    assert!(compile_member("int f() { throw new IllegalStateException(); }").is_ok());
}

#[test]
fn test_parse_error_position() {
    let err = compile_member("int f( { }").unwrap_err();
    match err {
        CompileError::ParseError { line, .. } => assert_eq!(line, 1),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

// --- Fields ---

#[test]
fn test_static_final_constant() {
    let f = field(compile_member("public static final int LIMIT = 3 * 4;").unwrap());
    assert_eq!(f.descriptor, "I");
    assert_eq!(f.constant, Some(ConstValue::Int(12)));
    assert!(f.initializer.is_none());

    let f = field(compile_member(r#"static final String TAG = "v" + 2;"#).unwrap());
    assert_eq!(f.constant, Some(ConstValue::String("v2".into())));
}

#[test]
fn test_field_initializer() {
    let f = field(compile_member("private int seed = 7;").unwrap());
    assert_eq!(f.access, FieldAccessFlags::PRIVATE);
    assert!(f.constant.is_none());
    let listing = ops(&f.initializer.unwrap());
    assert_eq!(listing[0], Instruction::Aload0);
    assert!(matches!(listing.last(), Some(Instruction::Putfield(_))));
}

#[test]
fn test_static_field_initializer() {
    let f = field(compile_member("static long stamp = System.nanoTime();").unwrap());
    assert_eq!(f.descriptor, "J");
    let listing = ops(&f.initializer.unwrap());
    assert!(matches!(listing[0], Instruction::Invokestatic(_)));
    assert!(matches!(listing.last(), Some(Instruction::Putstatic(_))));
}

#[test]
fn test_field_without_initializer() {
    let f = field(compile_member("protected String[] names;").unwrap());
    assert_eq!(f.descriptor, "[Ljava/lang/String;");
    assert!(f.constant.is_none());
    assert!(f.initializer.is_none());
}

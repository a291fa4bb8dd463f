use classfile_compiler::class_pool::{ClassModel, ClassPool};
use classfile_compiler::code_attribute::{Instruction, MethodCode};
use classfile_compiler::compile::{CompileError, CompiledMember, Javac};
use classfile_compiler::constant_info::ConstPool;
use classfile_compiler::descriptor::JType;
use classfile_compiler::types::{FieldAccessFlags, MethodAccessFlags};

mod accessors;
mod codegen;
mod control_flow;
mod members;
mod splice;

// --- Test helpers ---

const CALC: &str = "demo/Calc";
const INNER: &str = "demo/Calc$Inner";

/// The JDK subset plus a small class with a nested class, mixing public and
/// private members.
fn classes() -> ClassPool {
    let mut pool = ClassPool::with_jdk();
    pool.insert(
        ClassModel::new(CALC)
            .with_field("count", "I", FieldAccessFlags::PRIVATE)
            .with_field("name", "Ljava/lang/String;", FieldAccessFlags::PUBLIC)
            .with_field("total", "J", FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC)
            .with_method("<init>", "()V", MethodAccessFlags::PUBLIC)
            .with_method("<init>", "(I)V", MethodAccessFlags::PRIVATE)
            .with_method("twice", "(I)I", MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
            .with_method("hidden", "(I)I", MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC)
            .with_method("log", "(Ljava/lang/String;)V", MethodAccessFlags::PUBLIC),
    );
    pool.insert(
        ClassModel::new(INNER)
            .nested_in(CALC)
            .with_method("<init>", "()V", MethodAccessFlags::PUBLIC),
    );
    pool
}

/// Compiles `src` into a method of `class` with the given signature.
fn compile_body_in(
    class: &str,
    params: &[JType],
    ret: JType,
    is_static: bool,
    src: &str,
) -> Result<MethodCode, CompileError> {
    let classes = classes();
    let mut pool = ConstPool::new();
    let mut javac = Javac::new(&classes, &mut pool, class);
    javac.record_params(params, is_static)?;
    javac.record_return_type(ret, false)?;
    javac.compile_stmnt(src)?;
    javac.finish_code()
}

fn compile_body(params: &[JType], ret: JType, is_static: bool, src: &str) -> Result<MethodCode, CompileError> {
    compile_body_in(CALC, params, ret, is_static, src)
}

fn compile_member(src: &str) -> Result<CompiledMember, CompileError> {
    let classes = classes();
    let mut pool = ConstPool::new();
    Javac::new(&classes, &mut pool, CALC).compile(src)
}

/// Decoded instructions without their addresses.
fn ops(code: &MethodCode) -> Vec<Instruction> {
    code.instructions()
        .unwrap()
        .into_iter()
        .map(|(_, instr)| instr)
        .collect()
}

fn count(code: &[Instruction], pred: impl Fn(&Instruction) -> bool) -> usize {
    code.iter().filter(|i| pred(i)).count()
}

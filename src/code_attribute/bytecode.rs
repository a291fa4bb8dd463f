use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use super::types::{ExceptionEntry, Instruction};
use crate::compile::CompileError;
use crate::descriptor::{parse_method_descriptor, JType, TypeKind};

/// Largest code array a method may carry.
pub const MAX_CODE_LENGTH: u32 = 65535;

/// Which `invoke*` opcode a call uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Special,
    Interface,
}

/// Append-only instruction buffer.
///
/// Instructions are kept decoded together with their byte address, so a branch
/// emitted with a placeholder offset can be patched once its target pc is known.
/// Operand stack depth is tracked as instructions are appended; the code
/// generator resets it explicitly at join points and handler entries.
#[derive(Clone, Debug, Default)]
pub struct Bytecode {
    instructions: Vec<Instruction>,
    addresses: Vec<u32>,
    pc: u32,
    stack_depth: i32,
    max_stack: u16,
    max_locals: u16,
    exception_table: Vec<ExceptionEntry>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer whose first `max_locals` slots are already taken (receiver and parameters).
    pub fn with_locals(max_locals: u16) -> Self {
        Bytecode {
            max_locals,
            ..Self::default()
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Appends `instr`, applying its fixed stack effect. Returns its index.
    pub fn emit(&mut self, instr: Instruction) -> usize {
        let delta = instr.stack_delta().unwrap_or(0);
        self.emit_with_delta(instr, delta)
    }

    /// Appends an instruction whose stack effect was computed by the caller.
    pub fn emit_with_delta(&mut self, instr: Instruction, delta: i32) -> usize {
        let idx = self.instructions.len();
        self.addresses.push(self.pc);
        self.pc += instr.byte_size(self.pc);
        self.instructions.push(instr);
        self.grow_stack(delta);
        idx
    }

    /// Emits a branch with a zero placeholder offset.
    pub fn emit_branch(&mut self, make: fn(i16) -> Instruction) -> usize {
        self.emit(make(0))
    }

    /// Emits a `goto` to an already known pc.
    pub fn emit_goto_to(&mut self, target: u32) -> Result<usize, CompileError> {
        let at = self.emit_branch(Instruction::Goto);
        self.patch_branch(at, target)?;
        Ok(at)
    }

    pub fn address_of(&self, idx: usize) -> Result<u32, CompileError> {
        self.addresses
            .get(idx)
            .copied()
            .ok_or_else(|| CompileError::Fatal(format!("no instruction at index {}", idx)))
    }

    /// Points the branch at `idx` to `target`.
    pub fn patch_branch(&mut self, idx: usize, target: u32) -> Result<(), CompileError> {
        let source = self.address_of(idx)?;
        let offset = target as i64 - source as i64;
        let offset = i16::try_from(offset).map_err(|_| CompileError::CodegenError {
            message: format!("branch offset {} out of range", offset),
        })?;
        let patched = with_branch_offset(&self.instructions[idx], offset)?;
        self.instructions[idx] = patched;
        Ok(())
    }

    /// Patches every branch in `sites` to `target`.
    pub fn patch_all(&mut self, sites: &[usize], target: u32) -> Result<(), CompileError> {
        for &site in sites {
            self.patch_branch(site, target)?;
        }
        Ok(())
    }

    /// Emits a `lookupswitch` over `keys` (already sorted) with zero offsets.
    pub fn emit_lookupswitch(&mut self, keys: &[i32]) -> usize {
        self.emit(Instruction::Lookupswitch {
            default: 0,
            npairs: keys.len() as u32,
            pairs: keys.iter().map(|&k| (k, 0)).collect(),
        })
    }

    /// Fills in the default and per-key targets of the switch at `idx`.
    pub fn patch_switch(
        &mut self,
        idx: usize,
        default_target: u32,
        targets: &[u32],
    ) -> Result<(), CompileError> {
        let source = self.address_of(idx)? as i32;
        match &mut self.instructions[idx] {
            Instruction::Lookupswitch { default, pairs, .. } => {
                if pairs.len() != targets.len() {
                    return Err(CompileError::Fatal("switch target count mismatch".into()));
                }
                *default = default_target as i32 - source;
                for (pair, &target) in pairs.iter_mut().zip(targets) {
                    pair.1 = target as i32 - source;
                }
                Ok(())
            }
            other => Err(CompileError::Fatal(format!("not a switch: {:?}", other))),
        }
    }

    /// Pushes local `slot` of type `ty`.
    pub fn emit_load(&mut self, ty: &JType, slot: u16) {
        self.emit(local_access(local_kind(ty), slot, false));
    }

    /// Pops the top of stack into local `slot` of type `ty`.
    pub fn emit_store(&mut self, ty: &JType, slot: u16) {
        self.emit(local_access(local_kind(ty), slot, true));
    }

    /// Adds `value` to the int local at `slot`.
    pub fn emit_iinc(&mut self, slot: u16, value: i16) {
        match (u8::try_from(slot), i8::try_from(value)) {
            (Ok(index), Ok(value)) => self.emit(Instruction::Iinc { index, value }),
            _ => self.emit(Instruction::IincWide { index: slot, value }),
        };
    }

    /// Emits the return opcode matching `ty`.
    pub fn emit_return(&mut self, ty: &JType) {
        let instr = if ty.is_void() {
            Instruction::Return
        } else {
            match local_kind(ty) {
                TypeKind::Long => Instruction::Lreturn,
                TypeKind::Float => Instruction::Freturn,
                TypeKind::Double => Instruction::Dreturn,
                TypeKind::Class => Instruction::Areturn,
                _ => Instruction::Ireturn,
            }
        };
        self.emit(instr);
    }

    /// Emits an invocation of the method at pool `index`, sizing the stack
    /// effect from its descriptor.
    pub fn emit_invoke(&mut self, kind: InvokeKind, index: u16, descriptor: &str) -> Result<(), CompileError> {
        let (params, ret) = parse_method_descriptor(descriptor)
            .ok_or_else(|| CompileError::Fatal(format!("bad method descriptor {}", descriptor)))?;
        let arg_words: u16 = params.iter().map(JType::slot_size).sum();
        let receiver = if kind == InvokeKind::Static { 0 } else { 1 };
        let delta = ret.slot_size() as i32 - arg_words as i32 - receiver;
        let instr = match kind {
            InvokeKind::Static => Instruction::Invokestatic(index),
            InvokeKind::Virtual => Instruction::Invokevirtual(index),
            InvokeKind::Special => Instruction::Invokespecial(index),
            InvokeKind::Interface => Instruction::Invokeinterface {
                index,
                count: (arg_words + 1) as u8,
                filler: 0,
            },
        };
        self.emit_with_delta(instr, delta);
        Ok(())
    }

    /// Emits `getfield`/`getstatic`/`putfield`/`putstatic` for a field of type `ty`.
    pub fn emit_field_access(&mut self, index: u16, ty: &JType, is_static: bool, is_put: bool) {
        let size = ty.slot_size() as i32;
        let (instr, delta) = match (is_static, is_put) {
            (true, false) => (Instruction::Getstatic(index), size),
            (true, true) => (Instruction::Putstatic(index), -size),
            (false, false) => (Instruction::Getfield(index), size - 1),
            (false, true) => (Instruction::Putfield(index), -size - 1),
        };
        self.emit_with_delta(instr, delta);
    }

    /// Emits `multianewarray` consuming `dimensions` counts.
    pub fn emit_multianewarray(&mut self, index: u16, dimensions: u8) {
        self.emit_with_delta(
            Instruction::Multianewarray { index, dimensions },
            1 - dimensions as i32,
        );
    }

    pub fn stack_depth(&self) -> i32 {
        self.stack_depth
    }

    pub fn set_stack_depth(&mut self, depth: i32) {
        self.stack_depth = depth.max(0);
        self.max_stack = self.max_stack.max(self.stack_depth as u16);
    }

    pub fn grow_stack(&mut self, delta: i32) {
        self.set_stack_depth(self.stack_depth + delta);
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    /// Reserves `size` consecutive local slots and returns the first one.
    pub fn alloc_local(&mut self, size: u16) -> Result<u16, CompileError> {
        let slot = self.max_locals;
        self.max_locals = slot
            .checked_add(size)
            .ok_or_else(|| CompileError::codegen("too many local variables"))?;
        Ok(slot)
    }

    pub fn ensure_locals(&mut self, max_locals: u16) {
        self.max_locals = self.max_locals.max(max_locals);
    }

    pub fn add_exception_handler(
        &mut self,
        start_pc: u32,
        end_pc: u32,
        handler_pc: u32,
        catch_type: u16,
    ) -> Result<(), CompileError> {
        let pc = |pc: u32| {
            u16::try_from(pc).map_err(|_| CompileError::codegen(format!("exception range pc {} exceeds 65535", pc)))
        };
        self.exception_table.push(ExceptionEntry {
            start_pc: pc(start_pc)?,
            end_pc: pc(end_pc)?,
            handler_pc: pc(handler_pc)?,
            catch_type,
        });
        Ok(())
    }

    pub fn exception_table(&self) -> &[ExceptionEntry] {
        &self.exception_table
    }

    /// Encodes the buffer and hands it back as a method body.
    pub fn finish(self) -> Result<MethodCode, CompileError> {
        if self.pc > MAX_CODE_LENGTH {
            return Err(CompileError::codegen(format!(
                "method body of {} bytes exceeds {} bytes",
                self.pc, MAX_CODE_LENGTH
            )));
        }
        let mut out = Cursor::new(Vec::with_capacity(self.pc as usize));
        for (instr, &address) in self.instructions.iter().zip(&self.addresses) {
            instr
                .write_args(&mut out, binrw::args! { address })
                .map_err(|e| CompileError::Fatal(format!("encoding {:?}: {}", instr, e)))?;
        }
        Ok(MethodCode {
            code: out.into_inner(),
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            exception_table: self.exception_table,
        })
    }
}

/// A finished method body: raw code bytes plus the sizing and exception table the
/// class-file container needs to wrap it in a `Code` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionEntry>,
}

impl MethodCode {
    /// Decodes `code` back into `(address, instruction)` pairs.
    pub fn instructions(&self) -> Result<Vec<(u32, Instruction)>, CompileError> {
        let mut cursor = Cursor::new(&self.code);
        let mut out = Vec::new();
        while (cursor.position() as usize) < self.code.len() {
            let address = cursor.position() as u32;
            let instr = Instruction::read_args(&mut cursor, binrw::args! { address })
                .map_err(|e| CompileError::Fatal(format!("decoding at {}: {}", address, e)))?;
            out.push((address, instr));
        }
        Ok(out)
    }
}

/// The kind that selects the load/store/return opcode family.
fn local_kind(ty: &JType) -> TypeKind {
    if ty.is_reference() {
        TypeKind::Class
    } else {
        ty.kind
    }
}

fn local_access(kind: TypeKind, slot: u16, store: bool) -> Instruction {
    use Instruction::*;
    type Forms = ([Instruction; 4], fn(u8) -> Instruction, fn(u16) -> Instruction);
    let (short, normal, wide): Forms = match (kind, store) {
        (TypeKind::Long, false) => ([Lload0, Lload1, Lload2, Lload3], Lload, LloadWide),
        (TypeKind::Float, false) => ([Fload0, Fload1, Fload2, Fload3], Fload, FloadWide),
        (TypeKind::Double, false) => ([Dload0, Dload1, Dload2, Dload3], Dload, DloadWide),
        (TypeKind::Class, false) => ([Aload0, Aload1, Aload2, Aload3], Aload, AloadWide),
        (_, false) => ([Iload0, Iload1, Iload2, Iload3], Iload, IloadWide),
        (TypeKind::Long, true) => ([Lstore0, Lstore1, Lstore2, Lstore3], Lstore, LstoreWide),
        (TypeKind::Float, true) => ([Fstore0, Fstore1, Fstore2, Fstore3], Fstore, FstoreWide),
        (TypeKind::Double, true) => ([Dstore0, Dstore1, Dstore2, Dstore3], Dstore, DstoreWide),
        (TypeKind::Class, true) => ([Astore0, Astore1, Astore2, Astore3], Astore, AstoreWide),
        (_, true) => ([Istore0, Istore1, Istore2, Istore3], Istore, IstoreWide),
    };
    match slot {
        0..=3 => short[slot as usize].clone(),
        4..=255 => normal(slot as u8),
        _ => wide(slot),
    }
}

fn with_branch_offset(instr: &Instruction, offset: i16) -> Result<Instruction, CompileError> {
    Ok(match instr {
        Instruction::Goto(_) => Instruction::Goto(offset),
        Instruction::Ifeq(_) => Instruction::Ifeq(offset),
        Instruction::Ifne(_) => Instruction::Ifne(offset),
        Instruction::Iflt(_) => Instruction::Iflt(offset),
        Instruction::Ifge(_) => Instruction::Ifge(offset),
        Instruction::Ifgt(_) => Instruction::Ifgt(offset),
        Instruction::Ifle(_) => Instruction::Ifle(offset),
        Instruction::IfIcmpeq(_) => Instruction::IfIcmpeq(offset),
        Instruction::IfIcmpne(_) => Instruction::IfIcmpne(offset),
        Instruction::IfIcmplt(_) => Instruction::IfIcmplt(offset),
        Instruction::IfIcmpge(_) => Instruction::IfIcmpge(offset),
        Instruction::IfIcmpgt(_) => Instruction::IfIcmpgt(offset),
        Instruction::IfIcmple(_) => Instruction::IfIcmple(offset),
        Instruction::IfAcmpeq(_) => Instruction::IfAcmpeq(offset),
        Instruction::IfAcmpne(_) => Instruction::IfAcmpne(offset),
        Instruction::Ifnull(_) => Instruction::Ifnull(offset),
        Instruction::Ifnonnull(_) => Instruction::Ifnonnull(offset),
        _ => {
            return Err(CompileError::Fatal(format!(
                "cannot patch branch offset on {:?}",
                instr
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_branch_is_patched_relative_to_its_own_address() {
        let mut code = Bytecode::new();
        code.emit(Instruction::Iconst0);
        let br = code.emit_branch(Instruction::Ifeq);
        code.emit(Instruction::Iconst1);
        code.emit(Instruction::Pop);
        let target = code.pc();
        code.patch_branch(br, target).unwrap();
        code.emit(Instruction::Return);

        let body = code.finish().unwrap();
        let decoded = body.instructions().unwrap();
        assert_eq!(decoded[1], (1, Instruction::Ifeq(5)));
        assert_eq!(decoded[4], (6, Instruction::Return));
    }

    #[test]
    fn test_stack_tracking_records_high_water_mark() {
        let mut code = Bytecode::new();
        code.emit(Instruction::Lconst1);
        code.emit(Instruction::Lconst1);
        code.emit(Instruction::Ladd);
        code.emit(Instruction::Pop2);
        assert_eq!(code.stack_depth(), 0);
        assert_eq!(code.max_stack(), 4);
    }

    #[test]
    fn test_lookupswitch_padding_and_offsets() {
        let mut code = Bytecode::new();
        code.emit(Instruction::Iconst1);
        let sw = code.emit_lookupswitch(&[1, 3]);
        // opcode at 1, two bytes of padding, default + npairs + 2 pairs
        assert_eq!(code.pc(), 1 + 1 + 2 + 8 + 16);
        let end = code.pc();
        code.emit(Instruction::Return);
        code.patch_switch(sw, end, &[end, end]).unwrap();

        let decoded = code.finish().unwrap().instructions().unwrap();
        assert_eq!(
            decoded[1].1,
            Instruction::Lookupswitch {
                default: 27,
                npairs: 2,
                pairs: vec![(1, 27), (3, 27)],
            }
        );
    }

    #[test]
    fn test_local_forms_follow_slot_ranges() {
        let mut code = Bytecode::new();
        code.emit_load(&JType::INT, 2);
        code.emit_load(&JType::object(), 7);
        code.emit_store(&JType::LONG, 300);
        assert_eq!(
            code.instructions(),
            &[
                Instruction::Iload2,
                Instruction::Aload(7),
                Instruction::LstoreWide(300)
            ]
        );
    }

    #[test]
    fn test_invoke_stack_effect_comes_from_descriptor() {
        let mut code = Bytecode::new();
        code.emit(Instruction::Aload0);
        code.emit(Instruction::Lconst1);
        code.emit_invoke(InvokeKind::Virtual, 5, "(J)D").unwrap();
        assert_eq!(code.stack_depth(), 2);
        assert_eq!(code.max_stack(), 3);
    }

    #[test]
    fn test_out_of_range_branch_is_an_error() {
        let mut code = Bytecode::new();
        let br = code.emit_branch(Instruction::Goto);
        assert!(code.patch_branch(br, 40_000).is_err());
    }

    #[test]
    fn test_exception_range_past_u16_is_an_error() {
        let mut code = Bytecode::new();
        code.add_exception_handler(0, 10, 12, 0).unwrap();
        let err = code.add_exception_handler(2, 75_002, 75_007, 0).unwrap_err();
        assert!(matches!(err, CompileError::CodegenError { .. }), "{:?}", err);
        assert_eq!(code.exception_table().len(), 1);
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let mut code = Bytecode::new();
        for _ in 0..MAX_CODE_LENGTH {
            code.emit(Instruction::Nop);
        }
        code.emit(Instruction::Return);
        let err = code.finish().unwrap_err();
        assert!(matches!(err, CompileError::CodegenError { .. }), "{:?}", err);
    }

    #[test]
    fn test_local_slots_do_not_wrap() {
        let mut code = Bytecode::with_locals(u16::MAX - 1);
        assert_eq!(code.alloc_local(1).unwrap(), u16::MAX - 1);
        assert!(code.alloc_local(2).is_err());
        assert_eq!(code.max_locals(), u16::MAX);
    }
}

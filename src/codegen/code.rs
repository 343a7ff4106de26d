//! Code buffer for one method body.
//!
//! Besides the bytes, the buffer tracks the verifier's view of the frame
//! (operand stack and local types) so that every branch target gets a
//! StackMapTable entry. Branches go to [`Label`]s; a label remembers the frame
//! of the first jump to it and how many local slots were in scope when it was
//! created, so locals of scopes that end before the label never leak into its
//! frame. While the code is not alive (after `goto`, a return or `athrow`)
//! emission is skipped until a label that something jumps to is placed.

use std::collections::BTreeMap;

use crate::ast::PrimitiveType;

use super::attribute::{LineNumberEntry, LocalVariableEntry};
use super::constpool::ConstantPool;
use super::descriptor::{descriptor_to_internal, parse_method_descriptor};
use super::error::{BytecodeError, CodeGenError, CodeGenResult};
use super::frame::{FrameState, StackMapTable, VerificationType};
use super::opcodes::name as opcode_name;
use super::opcodes::*;
use super::switch_optimizer::SwitchInstruction;

/// Verifier type of a stack entry or local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VType {
    Top,
    Int,
    Null,
    UninitializedThis,
    Object(String),
    /// Result of the `new` at this pc, before its constructor ran.
    Uninitialized(u16),
}

impl VType {
    /// `None` for `V`.
    pub fn from_descriptor(descriptor: &str) -> CodeGenResult<Option<VType>> {
        match descriptor.as_bytes().first() {
            Some(b'V') => Ok(None),
            Some(b'B' | b'C' | b'I' | b'S' | b'Z') => Ok(Some(VType::Int)),
            Some(b'L') => Ok(Some(VType::Object(descriptor_to_internal(descriptor).to_string()))),
            Some(b'[') => Ok(Some(VType::Object(descriptor.to_string()))),
            Some(b'J' | b'F' | b'D') => Err(CodeGenError::unsupported("long, float and double values")),
            _ => Err(CodeGenError::InvalidDescriptor { descriptor: descriptor.to_string() }),
        }
    }

    pub fn object(name: &str) -> Self {
        VType::Object(name.to_string())
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, VType::Null | VType::Object(_) | VType::UninitializedThis | VType::Uninitialized(_))
    }

    fn merge(&self, other: &VType) -> VType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (VType::Null, VType::Object(o)) | (VType::Object(o), VType::Null) => VType::Object(o.clone()),
            (VType::Object(_), VType::Object(_)) => VType::object(crate::consts::OBJECT),
            _ => VType::Top,
        }
    }

    fn to_verification(&self, cp: &mut ConstantPool) -> CodeGenResult<VerificationType> {
        Ok(match self {
            VType::Top => VerificationType::Top,
            VType::Int => VerificationType::Integer,
            VType::Null => VerificationType::Null,
            VType::UninitializedThis => VerificationType::UninitializedThis,
            VType::Object(name) => VerificationType::Object(cp.add_class(name)?),
            VType::Uninitialized(pc) => VerificationType::Uninitialized(*pc),
        })
    }
}

/// Operand stack and local types at one point of the method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub stack: Vec<VType>,
    pub locals: Vec<VType>,
}

impl State {
    fn merge_with(&self, other: &State) -> State {
        let locals = self.locals.iter().zip(&other.locals).map(|(a, b)| a.merge(b)).collect();
        let stack = if self.stack.len() == other.stack.len() {
            self.stack.iter().zip(&other.stack).map(|(a, b)| a.merge(b)).collect()
        } else {
            self.stack.clone()
        };
        State { stack, locals }
    }

    fn truncated(&self, limit: usize) -> State {
        let mut s = self.clone();
        s.locals.truncate(limit);
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug)]
struct LabelInfo {
    pc: Option<u16>,
    frame: Option<State>,
    locals_limit: usize,
}

#[derive(Debug)]
struct Fixup {
    label: Label,
    /// Position of the offset operand.
    at: usize,
    /// Pc the offset is relative to.
    base: usize,
    wide: bool,
}

#[derive(Debug, Clone)]
struct LocalSlot {
    name: String,
    descriptor: String,
    slot: u16,
    start: Option<u16>,
}

/// Marker returned by [`Code::enter_scope`].
#[derive(Debug, Clone, Copy)]
pub struct ScopeMark {
    next_local: u16,
    named: usize,
}

/// Everything the class writer needs from a finished body.
#[derive(Debug)]
pub struct FinishedCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub stack_map: Option<StackMapTable>,
    pub line_numbers: Vec<LineNumberEntry>,
    pub local_vars: Vec<LocalVariableEntry>,
}

pub struct Code {
    pub code: Vec<u8>,
    pub state: State,
    pub max_stack: u16,
    pub max_locals: u16,
    /// Code generation enabled?
    pub alive: bool,
    next_local: u16,
    labels: Vec<LabelInfo>,
    fixups: Vec<Fixup>,
    frames: BTreeMap<u16, State>,
    initial_locals: Vec<VType>,
    this_class: Option<String>,
    named: Vec<LocalSlot>,
    closed: Vec<LocalVariableEntry>,
    line_numbers: Vec<LineNumberEntry>,
}

impl Code {
    /// A buffer whose frame starts with `this` (for instance methods of `this_class`)
    /// and the parameters. In a constructor `this` starts out uninitialized.
    pub fn new(this_class: Option<&str>, is_constructor: bool, param_descriptors: &[String]) -> CodeGenResult<Self> {
        let mut locals = Vec::new();
        match this_class {
            Some(_) if is_constructor => locals.push(VType::UninitializedThis),
            Some(class) => locals.push(VType::object(class)),
            None => {}
        }
        for p in param_descriptors {
            locals.push(VType::from_descriptor(p)?.unwrap_or(VType::Top));
        }
        let next_local = locals.len() as u16;
        Ok(Self {
            code: Vec::with_capacity(64),
            state: State { stack: Vec::new(), locals: locals.clone() },
            max_stack: 0,
            max_locals: next_local,
            alive: true,
            next_local,
            labels: Vec::new(),
            fixups: Vec::new(),
            frames: BTreeMap::new(),
            initial_locals: locals,
            this_class: this_class.map(str::to_string),
            named: Vec::new(),
            closed: Vec::new(),
            line_numbers: Vec::new(),
        })
    }

    pub fn pc(&self) -> u16 {
        self.code.len() as u16
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn stack_depth(&self) -> usize {
        self.state.stack.len()
    }

    // ------------------------------------------------------------------
    // Raw emission
    // ------------------------------------------------------------------

    fn emit1(&mut self, od: u8) {
        self.code.push(od);
    }

    fn emit2(&mut self, od: u16) {
        self.code.extend_from_slice(&od.to_be_bytes());
    }

    fn emit4(&mut self, od: i32) {
        self.code.extend_from_slice(&od.to_be_bytes());
    }

    fn push(&mut self, t: VType) {
        self.state.stack.push(t);
        self.max_stack = self.max_stack.max(self.state.stack.len() as u16);
    }

    fn pop(&mut self, n: usize) -> CodeGenResult<Vec<VType>> {
        let len = self.state.stack.len();
        if len < n {
            return Err(BytecodeError::StackUnderflow { pc: self.code.len() }.into());
        }
        Ok(self.state.stack.split_off(len - n))
    }

    fn pop1(&mut self) -> CodeGenResult<VType> {
        let mut popped = self.pop(1)?;
        Ok(popped.pop().unwrap_or(VType::Top))
    }

    // ------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------

    /// Emits an opcode without operands and applies its stack effect.
    pub fn emitop(&mut self, op: u8) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        match op {
            NOP => {}
            ACONST_NULL => self.push(VType::Null),
            ICONST_M1..=ICONST_5 => self.push(VType::Int),
            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IAND | IOR | IXOR => {
                self.pop(2)?;
                self.push(VType::Int);
            }
            INEG => {
                self.pop1()?;
                self.push(VType::Int);
            }
            POP => {
                self.pop1()?;
            }
            DUP => {
                let top = self.pop1()?;
                self.push(top.clone());
                self.push(top);
            }
            DUP_X1 => {
                let v1 = self.pop1()?;
                let v2 = self.pop1()?;
                self.push(v1.clone());
                self.push(v2);
                self.push(v1);
            }
            SWAP => {
                let v1 = self.pop1()?;
                let v2 = self.pop1()?;
                self.push(v1);
                self.push(v2);
            }
            ARRAYLENGTH => {
                self.pop1()?;
                self.push(VType::Int);
            }
            IRETURN | ARETURN | ATHROW => {
                self.pop1()?;
                self.emit1(op);
                self.alive = false;
                return Ok(());
            }
            RETURN => {
                self.emit1(op);
                self.alive = false;
                return Ok(());
            }
            _ => return Err(CodeGenError::unsupported(format!("opcode {}", opcode_name(op)))),
        }
        self.emit1(op);
        Ok(())
    }

    pub fn emit_int(&mut self, cp: &mut ConstantPool, value: i32) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        match value {
            -1..=5 => return self.emitop((ICONST_0 as i32 + value) as u8),
            -128..=127 => {
                self.emit1(BIPUSH);
                self.emit1(value as i8 as u8);
            }
            -32768..=32767 => {
                self.emit1(SIPUSH);
                self.emit2(value as i16 as u16);
            }
            _ => {
                let index = cp.add_integer(value)?;
                self.emit_ldc(index);
            }
        }
        self.push(VType::Int);
        Ok(())
    }

    pub fn emit_string(&mut self, cp: &mut ConstantPool, value: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let index = cp.add_string(value)?;
        self.emit_ldc(index);
        self.push(VType::object(crate::consts::STRING));
        Ok(())
    }

    fn emit_ldc(&mut self, index: u16) {
        if index <= 0xff {
            self.emit1(LDC);
            self.emit1(index as u8);
        } else {
            self.emit1(LDC_W);
            self.emit2(index);
        }
    }

    fn emit_local_op(&mut self, op: u8, short_base: u8, slot: u16) {
        if slot <= 3 {
            self.emit1(short_base + slot as u8);
        } else if slot <= 0xff {
            self.emit1(op);
            self.emit1(slot as u8);
        } else {
            self.emit1(WIDE);
            self.emit1(op);
            self.emit2(slot);
        }
    }

    pub fn emit_load(&mut self, slot: u16, descriptor: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let declared = VType::from_descriptor(descriptor)?.unwrap_or(VType::Top);
        if declared.is_reference() {
            let current = self.state.locals.get(slot as usize).cloned().filter(VType::is_reference);
            self.emit_local_op(ALOAD, ALOAD_0, slot);
            self.push(current.unwrap_or(declared));
        } else {
            self.emit_local_op(ILOAD, ILOAD_0, slot);
            self.push(VType::Int);
        }
        Ok(())
    }

    pub fn emit_store(&mut self, slot: u16, descriptor: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        self.pop1()?;
        let declared = VType::from_descriptor(descriptor)?.unwrap_or(VType::Top);
        if declared.is_reference() {
            self.emit_local_op(ASTORE, ASTORE_0, slot);
        } else {
            self.emit_local_op(ISTORE, ISTORE_0, slot);
        }
        let index = slot as usize;
        if self.state.locals.len() <= index {
            self.state.locals.resize(index + 1, VType::Top);
        }
        self.state.locals[index] = declared;
        let pc = self.pc();
        if let Some(local) = self.named.iter_mut().rev().find(|l| l.slot == slot) {
            local.start.get_or_insert(pc);
        }
        Ok(())
    }

    pub fn emit_iinc(&mut self, slot: u16, delta: i32) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        if slot <= 0xff && (-128..=127).contains(&delta) {
            self.emit1(IINC);
            self.emit1(slot as u8);
            self.emit1(delta as i8 as u8);
        } else {
            self.emit1(WIDE);
            self.emit1(IINC);
            self.emit2(slot);
            self.emit2(delta as i16 as u16);
        }
        Ok(())
    }

    /// invokevirtual/special/static/interface; adds the member reference to the pool.
    pub fn emit_invoke(
        &mut self,
        cp: &mut ConstantPool,
        op: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        owner_is_interface: bool,
    ) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let index = if op == INVOKEINTERFACE || owner_is_interface {
            cp.add_interface_method_ref(owner, name, descriptor)?
        } else {
            cp.add_method_ref(owner, name, descriptor)?
        };
        let (params, ret) = parse_method_descriptor(descriptor)?;
        self.pop(params.len())?;
        if op != INVOKESTATIC {
            let receiver = self.pop1()?;
            if op == INVOKESPECIAL && name == super::defs::CONSTRUCTOR_METHOD_NAME {
                self.initialize(&receiver, owner);
            }
        }
        self.emit1(op);
        self.emit2(index);
        if op == INVOKEINTERFACE {
            self.emit1(params.len() as u8 + 1);
            self.emit1(0);
        }
        if let Some(t) = VType::from_descriptor(&ret)? {
            self.push(t);
        }
        Ok(())
    }

    /// After `<init>` every copy of the uninitialized reference becomes a real object.
    fn initialize(&mut self, receiver: &VType, owner: &str) {
        let init = match receiver {
            VType::UninitializedThis => VType::object(self.this_class.as_deref().unwrap_or(owner)),
            VType::Uninitialized(_) => VType::object(owner),
            _ => return,
        };
        for slot in self.state.stack.iter_mut().chain(self.state.locals.iter_mut()) {
            if slot == receiver {
                *slot = init.clone();
            }
        }
    }

    pub fn emit_invokedynamic(&mut self, call_site_index: u16, descriptor: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let (params, ret) = parse_method_descriptor(descriptor)?;
        self.pop(params.len())?;
        self.emit1(INVOKEDYNAMIC);
        self.emit2(call_site_index);
        self.emit2(0);
        if let Some(t) = VType::from_descriptor(&ret)? {
            self.push(t);
        }
        Ok(())
    }

    pub fn emit_field(&mut self, cp: &mut ConstantPool, op: u8, owner: &str, name: &str, descriptor: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let index = cp.add_field_ref(owner, name, descriptor)?;
        let value = VType::from_descriptor(descriptor)?.unwrap_or(VType::Top);
        match op {
            GETSTATIC => self.push(value),
            GETFIELD => {
                self.pop1()?;
                self.push(value);
            }
            PUTSTATIC => {
                self.pop1()?;
            }
            PUTFIELD => {
                self.pop(2)?;
            }
            _ => return Err(CodeGenError::unsupported(format!("field opcode {}", opcode_name(op)))),
        }
        self.emit1(op);
        self.emit2(index);
        Ok(())
    }

    pub fn emit_new(&mut self, cp: &mut ConstantPool, class: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let index = cp.add_class(class)?;
        let pc = self.pc();
        self.emit1(NEW);
        self.emit2(index);
        self.push(VType::Uninitialized(pc));
        Ok(())
    }

    /// `checkcast`, `instanceof` or `anewarray` against `class` (internal name or array descriptor).
    pub fn emit_type_op(&mut self, cp: &mut ConstantPool, op: u8, class: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let index = cp.add_class(class)?;
        self.pop1()?;
        match op {
            CHECKCAST => self.push(VType::object(class)),
            INSTANCEOF => self.push(VType::Int),
            ANEWARRAY => {
                let array = if class.starts_with('[') { format!("[{}", class) } else { format!("[L{};", class) };
                self.push(VType::Object(array))
            }
            _ => return Err(CodeGenError::unsupported(format!("type opcode {}", opcode_name(op)))),
        }
        self.emit1(op);
        self.emit2(index);
        Ok(())
    }

    /// `valueOf` of the wrapper class of `p`.
    pub fn emit_box(&mut self, cp: &mut ConstantPool, p: PrimitiveType) -> CodeGenResult<()> {
        let wrapper = p.box_class().ok_or_else(|| CodeGenError::unsupported(format!("boxing {}", p.name())))?;
        let descriptor = format!("({})L{};", p.descriptor(), wrapper);
        self.emit_invoke(cp, INVOKESTATIC, wrapper, "valueOf", &descriptor, false)
    }

    /// `intValue()` and friends; the operand must already be an instance of the wrapper.
    pub fn emit_unbox(&mut self, cp: &mut ConstantPool, p: PrimitiveType) -> CodeGenResult<()> {
        let wrapper = p.box_class().ok_or_else(|| CodeGenError::unsupported(format!("unboxing {}", p.name())))?;
        let method = format!("{}Value", p.name());
        let descriptor = format!("(){}", p.descriptor());
        self.emit_invoke(cp, INVOKEVIRTUAL, wrapper, &method, &descriptor, false)
    }

    /// Retypes the reference on top of the stack as `descriptor`, a supertype of
    /// what is there. Nothing is emitted; branch merges then agree on the type.
    pub fn widen_top(&mut self, descriptor: &str) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        let widened = VType::from_descriptor(descriptor)?;
        if let (Some(top), Some(widened)) = (self.state.stack.last_mut(), widened) {
            if top.is_reference() && widened.is_reference() {
                *top = widened;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Labels and branches
    // ------------------------------------------------------------------

    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelInfo { pc: None, frame: None, locals_limit: self.next_local as usize });
        Label(self.labels.len() - 1)
    }

    fn record_jump(&mut self, label: Label) {
        let info = &self.labels[label.0];
        if info.pc.is_some() {
            return;
        }
        let frame = self.state.truncated(info.locals_limit);
        let merged = match &info.frame {
            Some(existing) => existing.merge_with(&frame),
            None => frame,
        };
        self.labels[label.0].frame = Some(merged);
    }

    pub fn emit_jump(&mut self, op: u8, label: Label) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        match op {
            GOTO => {}
            IFEQ..=IFLE | IFNULL | IFNONNULL => {
                self.pop1()?;
            }
            IF_ICMPEQ..=IF_ACMPNE => {
                self.pop(2)?;
            }
            _ => return Err(CodeGenError::unsupported(format!("branch opcode {}", opcode_name(op)))),
        }
        self.record_jump(label);
        let base = self.code.len();
        self.emit1(op);
        self.fixups.push(Fixup { label, at: self.code.len(), base, wide: false });
        self.emit2(0);
        if op == GOTO {
            self.alive = false;
        }
        Ok(())
    }

    /// Emits a `tableswitch` or `lookupswitch` over the int on top of the stack.
    pub fn emit_switch(&mut self, instruction: &SwitchInstruction<Label>) -> CodeGenResult<()> {
        if !self.alive {
            return Ok(());
        }
        self.pop1()?;
        let base = self.code.len();
        let op = match instruction {
            SwitchInstruction::TableSwitch { .. } => TABLESWITCH,
            SwitchInstruction::LookupSwitch { .. } => LOOKUPSWITCH,
        };
        self.emit1(op);
        while self.code.len() % 4 != 0 {
            self.emit1(0);
        }
        let mut targets = Vec::new();
        match instruction {
            SwitchInstruction::TableSwitch { low, high, default, targets: labels } => {
                targets.push((self.code.len(), *default));
                self.emit4(0);
                self.emit4(*low);
                self.emit4(*high);
                for label in labels {
                    targets.push((self.code.len(), *label));
                    self.emit4(0);
                }
            }
            SwitchInstruction::LookupSwitch { default, pairs } => {
                targets.push((self.code.len(), *default));
                self.emit4(0);
                self.emit4(pairs.len() as i32);
                for (value, label) in pairs {
                    self.emit4(*value);
                    targets.push((self.code.len(), *label));
                    self.emit4(0);
                }
            }
        }
        for (at, label) in targets {
            self.record_jump(label);
            self.fixups.push(Fixup { label, at, base, wide: true });
        }
        self.alive = false;
        Ok(())
    }

    /// Binds `label` to the current pc.
    pub fn place(&mut self, label: Label) {
        let pc = self.pc();
        let info = &self.labels[label.0];
        let incoming = info.frame.clone();
        let limit = info.locals_limit;
        let state = match (self.alive, incoming) {
            (true, Some(frame)) => Some(self.state.truncated(limit).merge_with(&frame)),
            (true, None) => Some(self.state.truncated(limit)),
            (false, Some(frame)) => Some(frame),
            (false, None) => None,
        };
        self.labels[label.0].pc = Some(pc);
        if let Some(state) = state {
            self.labels[label.0].frame = Some(state.clone());
            self.frames.insert(pc, state.clone());
            self.state = state;
            self.alive = true;
        }
    }

    // ------------------------------------------------------------------
    // Locals and scopes
    // ------------------------------------------------------------------

    pub fn enter_scope(&self) -> ScopeMark {
        ScopeMark { next_local: self.next_local, named: self.named.len() }
    }

    pub fn exit_scope(&mut self, mark: ScopeMark) {
        let end = self.pc();
        for local in self.named.drain(mark.named..) {
            if let Some(start) = local.start {
                self.closed.push(LocalVariableEntry {
                    start_pc: start,
                    length: end - start,
                    name: local.name,
                    descriptor: local.descriptor,
                    index: local.slot,
                });
            }
        }
        self.next_local = mark.next_local;
        self.state.locals.truncate(mark.next_local as usize);
    }

    /// Allocates a slot; named locals appear in the LocalVariableTable once stored.
    pub fn declare_local(&mut self, name: Option<&str>, descriptor: &str) -> u16 {
        let slot = self.next_local;
        self.next_local += 1;
        self.max_locals = self.max_locals.max(self.next_local);
        if let Some(name) = name {
            self.named.push(LocalSlot { name: name.to_string(), descriptor: descriptor.to_string(), slot, start: None });
        }
        slot
    }

    /// Registers a parameter (or `this`) that already occupies `slot`.
    pub fn name_parameter(&mut self, name: &str, descriptor: &str, slot: u16) {
        self.named.push(LocalSlot { name: name.to_string(), descriptor: descriptor.to_string(), slot, start: Some(0) });
    }

    /// Innermost visible local called `name`: `(slot, descriptor)`.
    pub fn lookup_local(&self, name: &str) -> Option<(u16, &str)> {
        self.named.iter().rev().find(|l| l.name == name).map(|l| (l.slot, l.descriptor.as_str()))
    }

    pub fn mark_line(&mut self, line: usize) {
        if !self.alive || line == 0 {
            return;
        }
        let line = line.min(u16::MAX as usize) as u16;
        if self.line_numbers.last().map_or(false, |e| e.line_number == line) {
            return;
        }
        let start_pc = self.pc();
        if let Some(last) = self.line_numbers.last_mut() {
            if last.start_pc == start_pc {
                last.line_number = line;
                return;
            }
        }
        self.line_numbers.push(LineNumberEntry { start_pc, line_number: line });
    }

    // ------------------------------------------------------------------
    // Finishing
    // ------------------------------------------------------------------

    pub fn finish(mut self, cp: &mut ConstantPool, method_name: &str) -> CodeGenResult<FinishedCode> {
        if self.code.len() > u16::MAX as usize {
            return Err(CodeGenError::CodeTooLarge { name: method_name.to_string() });
        }
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0].pc.ok_or(BytecodeError::UnplacedLabel(fixup.label.0))?;
            let offset = target as i32 - fixup.base as i32;
            if fixup.wide {
                self.code[fixup.at..fixup.at + 4].copy_from_slice(&offset.to_be_bytes());
            } else {
                let short = i16::try_from(offset).map_err(|_| BytecodeError::BranchTooFar { offset })?;
                self.code[fixup.at..fixup.at + 2].copy_from_slice(&short.to_be_bytes());
            }
        }
        self.exit_scope(ScopeMark { next_local: 0, named: 0 });

        let code_len = self.code.len() as u16;
        let initial = verification_locals(&self.initial_locals, cp)?;
        let mut states = Vec::new();
        for (pc, state) in self.frames.iter().filter(|(pc, _)| **pc < code_len) {
            states.push(FrameState {
                pc: *pc,
                locals: verification_locals(&state.locals, cp)?,
                stack: state.stack.iter().map(|t| t.to_verification(cp)).collect::<CodeGenResult<_>>()?,
            });
        }
        let stack_map = if states.is_empty() { None } else { Some(StackMapTable::compress(&initial, &states)) };
        let mut local_vars = self.closed;
        local_vars.sort_by_key(|l| (l.index, l.start_pc));
        Ok(FinishedCode {
            code: self.code,
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            stack_map,
            line_numbers: self.line_numbers,
            local_vars,
        })
    }
}

/// Locals with trailing `Top` entries trimmed.
fn verification_locals(locals: &[VType], cp: &mut ConstantPool) -> CodeGenResult<Vec<VerificationType>> {
    let used = locals.iter().rposition(|t| *t != VType::Top).map_or(0, |i| i + 1);
    locals[..used].iter().map(|t| t.to_verification(cp)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::frame::StackMapFrame;

    fn static_code(params: &[&str]) -> Code {
        let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();
        Code::new(None, false, &params).unwrap()
    }

    #[test]
    fn branch_targets_get_frames() {
        let mut cp = ConstantPool::new();
        let mut code = static_code(&["I"]);
        let else_label = code.new_label();
        let end = code.new_label();
        code.emit_load(0, "I").unwrap();
        code.emit_jump(IFEQ, else_label).unwrap();
        code.emit_string(&mut cp, "yes").unwrap();
        code.emit_jump(GOTO, end).unwrap();
        assert!(!code.is_alive());
        code.place(else_label);
        code.emit_string(&mut cp, "no").unwrap();
        code.place(end);
        code.emitop(ARETURN).unwrap();

        let finished = code.finish(&mut cp, "m").unwrap();
        let table = finished.stack_map.unwrap();
        assert_eq!(table.frames.len(), 2);
        assert!(matches!(table.frames[0], StackMapFrame::Same { .. }));
        assert!(matches!(table.frames[1], StackMapFrame::SameLocals1StackItem { .. }));
        assert_eq!(finished.max_stack, 1);
        // iload_0, ifeq +8 ...
        assert_eq!(&finished.code[..4], &[ILOAD_0, IFEQ, 0, 8]);
    }

    #[test]
    fn dead_code_is_skipped() {
        let mut cp = ConstantPool::new();
        let mut code = static_code(&[]);
        code.emitop(RETURN).unwrap();
        code.emit_int(&mut cp, 7).unwrap();
        code.emitop(POP).unwrap();
        let finished = code.finish(&mut cp, "m").unwrap();
        assert_eq!(finished.code, vec![RETURN]);
    }

    #[test]
    fn scoped_locals_leave_label_frames() {
        let mut cp = ConstantPool::new();
        let mut code = static_code(&[]);
        let end = code.new_label();
        let mark = code.enter_scope();
        let slot = code.declare_local(Some("s"), "Ljava/lang/String;");
        code.emit_string(&mut cp, "x").unwrap();
        code.emit_store(slot, "Ljava/lang/String;").unwrap();
        code.emit_jump(GOTO, end).unwrap();
        code.exit_scope(mark);
        code.place(end);
        code.emitop(RETURN).unwrap();
        let finished = code.finish(&mut cp, "m").unwrap();
        let table = finished.stack_map.unwrap();
        assert!(matches!(table.frames[0], StackMapFrame::Same { .. }));
        assert_eq!(finished.local_vars.len(), 1);
        assert_eq!(finished.local_vars[0].name, "s");
        assert_eq!(finished.max_locals, 1);
    }

    #[test]
    fn constructor_call_initializes_new_object() {
        let mut cp = ConstantPool::new();
        let mut code = static_code(&[]);
        code.emit_new(&mut cp, "java/lang/Object").unwrap();
        code.emitop(DUP).unwrap();
        code.emit_invoke(&mut cp, INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false).unwrap();
        assert_eq!(code.state.stack, vec![VType::object("java/lang/Object")]);
        code.emitop(ARETURN).unwrap();
    }

    #[test]
    fn unplaced_label_is_an_error() {
        let mut cp = ConstantPool::new();
        let mut code = static_code(&[]);
        let nowhere = code.new_label();
        code.emit_jump(GOTO, nowhere).unwrap();
        assert!(code.finish(&mut cp, "m").is_err());
    }
}

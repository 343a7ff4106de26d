//! StackMapTable frames and their compact encoding

use super::attribute::AttributeInfo;
use super::constpool::ConstantPool;
use super::error::ConstPoolResult;

/// VerificationTypeInfo as defined in JVMS 4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Null,
    UninitializedThis,
    Object(u16),        // cpool index to CONSTANT_Class
    Uninitialized(u16), // offset of the `new`
}

impl VerificationType {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            VerificationType::Top => vec![0],
            VerificationType::Integer => vec![1],
            VerificationType::Null => vec![5],
            VerificationType::UninitializedThis => vec![6],
            VerificationType::Object(cp_index) => {
                let [hi, lo] = cp_index.to_be_bytes();
                vec![7, hi, lo]
            }
            VerificationType::Uninitialized(offset) => {
                let [hi, lo] = offset.to_be_bytes();
                vec![8, hi, lo]
            }
        }
    }
}

/// StackMapFrame variants as defined in JVMS 4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same { offset_delta: u16 },
    SameLocals1StackItem { offset_delta: u16, stack: VerificationType },
    Chop { k: u8, offset_delta: u16 },
    Append { offset_delta: u16, locals: Vec<VerificationType> },
    Full { offset_delta: u16, locals: Vec<VerificationType>, stack: Vec<VerificationType> },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            StackMapFrame::Same { offset_delta } => {
                if *offset_delta <= 63 {
                    bytes.push(*offset_delta as u8);
                } else {
                    bytes.push(251);
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
            }
            StackMapFrame::SameLocals1StackItem { offset_delta, stack } => {
                if *offset_delta <= 63 {
                    bytes.push(64 + *offset_delta as u8);
                } else {
                    bytes.push(247);
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
                bytes.extend_from_slice(&stack.to_bytes());
            }
            StackMapFrame::Chop { k, offset_delta } => {
                bytes.push(251 - *k);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
            }
            StackMapFrame::Append { offset_delta, locals } => {
                bytes.push(251 + locals.len() as u8);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                for l in locals {
                    bytes.extend_from_slice(&l.to_bytes());
                }
            }
            StackMapFrame::Full { offset_delta, locals, stack } => {
                bytes.push(255);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                bytes.extend_from_slice(&(locals.len() as u16).to_be_bytes());
                for l in locals {
                    bytes.extend_from_slice(&l.to_bytes());
                }
                bytes.extend_from_slice(&(stack.len() as u16).to_be_bytes());
                for s in stack {
                    bytes.extend_from_slice(&s.to_bytes());
                }
            }
        }
        bytes
    }
}

/// A frame at an absolute pc, before delta encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameState {
    pub pc: u16,
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Delta-encodes `states` (sorted by pc, distinct pcs) against the method's
    /// initial locals, choosing the smallest frame kind each time.
    pub fn compress(initial_locals: &[VerificationType], states: &[FrameState]) -> Self {
        let mut frames = Vec::with_capacity(states.len());
        let mut prev_locals = initial_locals.to_vec();
        let mut prev_pc: i32 = -1;
        for state in states {
            let offset_delta = (state.pc as i32 - prev_pc - 1) as u16;
            let frame = if state.stack.is_empty() && state.locals == prev_locals {
                StackMapFrame::Same { offset_delta }
            } else if state.stack.len() == 1 && state.locals == prev_locals {
                StackMapFrame::SameLocals1StackItem { offset_delta, stack: state.stack[0].clone() }
            } else if state.stack.is_empty()
                && state.locals.len() < prev_locals.len()
                && prev_locals.len() - state.locals.len() <= 3
                && prev_locals.starts_with(&state.locals)
            {
                StackMapFrame::Chop { k: (prev_locals.len() - state.locals.len()) as u8, offset_delta }
            } else if state.stack.is_empty()
                && state.locals.len() > prev_locals.len()
                && state.locals.len() - prev_locals.len() <= 3
                && state.locals.starts_with(&prev_locals)
            {
                StackMapFrame::Append { offset_delta, locals: state.locals[prev_locals.len()..].to_vec() }
            } else {
                StackMapFrame::Full { offset_delta, locals: state.locals.clone(), stack: state.stack.clone() }
            };
            frames.push(frame);
            prev_locals = state.locals.clone();
            prev_pc = state.pc as i32;
        }
        Self { frames }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.frames.len() as u16).to_be_bytes());
        for f in &self.frames {
            bytes.extend_from_slice(&f.to_bytes());
        }
        bytes
    }

    /// Absolute pcs of every frame.
    pub fn frame_pcs(&self) -> Vec<u16> {
        let mut pcs = Vec::with_capacity(self.frames.len());
        let mut pc: i32 = -1;
        for f in &self.frames {
            pc += f.offset_delta() as i32 + 1;
            pcs.push(pc as u16);
        }
        pcs
    }
}

/// Human-readable frame listing with absolute offsets, for logs and test failures.
pub fn describe_stack_map_frames(table: &StackMapTable) -> Vec<String> {
    table
        .frames
        .iter()
        .zip(table.frame_pcs())
        .map(|(frame, pc)| match frame {
            StackMapFrame::Same { .. } => format!("@{:>4} SAME", pc),
            StackMapFrame::SameLocals1StackItem { stack, .. } => format!("@{:>4} SAME_LOCALS_1 {:?}", pc, stack),
            StackMapFrame::Chop { k, .. } => format!("@{:>4} CHOP{}", pc, k),
            StackMapFrame::Append { locals, .. } => format!("@{:>4} APPEND {:?}", pc, locals),
            StackMapFrame::Full { locals, stack, .. } => format!("@{:>4} FULL {:?} {:?}", pc, locals, stack),
        })
        .collect()
}

pub fn make_stack_map_attribute(constant_pool: &mut ConstantPool, table: &StackMapTable) -> ConstPoolResult<AttributeInfo> {
    AttributeInfo::named(constant_pool, "StackMapTable", table.to_bytes())
}

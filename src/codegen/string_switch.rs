//! Hash-then-equals dispatch over string keys.
//!
//! Used by `String` switches and by `$deserializeLambda$`. The dispatch turns
//! the string in one local into the position of the matching key in another
//! int local (`-1` when nothing matches); the caller then switches on that
//! position.

use std::collections::BTreeMap;

use super::code::Code;
use super::constpool::ConstantPool;
use super::error::CodeGenResult;
use super::opcodes::*;
use super::switch_optimizer::SwitchOptimizer;

const STRING: &str = crate::consts::STRING;
const STRING_DESC: &str = "Ljava/lang/String;";

/// `String.hashCode()`: `s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 code units.
pub fn java_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Keys grouped by hash, each with its position, in key order within a bucket.
pub fn hash_buckets<'k>(keys: &[&'k str]) -> BTreeMap<i32, Vec<(usize, &'k str)>> {
    let mut buckets: BTreeMap<i32, Vec<(usize, &'k str)>> = BTreeMap::new();
    for (position, key) in keys.iter().enumerate() {
        buckets.entry(java_hash(key)).or_default().push((position, key));
    }
    buckets
}

/// Stores into `index_slot` the position of the string in `string_slot` among `keys`.
/// Both slots must already be declared.
pub fn emit_string_index(
    code: &mut Code,
    cp: &mut ConstantPool,
    string_slot: u16,
    index_slot: u16,
    keys: &[&str],
) -> CodeGenResult<()> {
    code.emit_int(cp, -1)?;
    code.emit_store(index_slot, "I")?;
    code.emit_load(string_slot, STRING_DESC)?;
    code.emit_invoke(cp, INVOKEVIRTUAL, STRING, "hashCode", "()I", false)?;

    let end = code.new_label();
    let buckets = hash_buckets(keys);
    let mut dispatch = SwitchOptimizer::new(end);
    let mut bucket_labels = Vec::with_capacity(buckets.len());
    for hash in buckets.keys() {
        let label = code.new_label();
        dispatch.add_case(*hash, label);
        bucket_labels.push(label);
    }
    code.emit_switch(&dispatch.optimize())?;

    for (label, entries) in bucket_labels.into_iter().zip(buckets.values()) {
        code.place(label);
        for (position, key) in entries {
            let next = code.new_label();
            code.emit_load(string_slot, STRING_DESC)?;
            code.emit_string(cp, key)?;
            code.emit_invoke(cp, INVOKEVIRTUAL, STRING, "equals", "(Ljava/lang/Object;)Z", false)?;
            code.emit_jump(IFEQ, next)?;
            code.emit_int(cp, *position as i32)?;
            code.emit_store(index_slot, "I")?;
            code.emit_jump(GOTO, end)?;
            code.place(next);
        }
        code.emit_jump(GOTO, end)?;
    }
    code.place(end);
    Ok(())
}

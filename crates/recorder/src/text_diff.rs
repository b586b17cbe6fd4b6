//! Minimal text edits via longest-common-prefix/suffix trimming.
//!
//! Indices and lengths count Unicode scalar values, not bytes, so an
//! edit never lands inside a multibyte sequence.

use anyhow::{Error, bail};
use protocol::TextOperation;

/// Compute the minimal remove/insert pair transforming `old` into `new`.
///
/// The shared prefix and suffix are trimmed first; the general case is a
/// single remove followed by a single insert at the same index. Equal
/// inputs produce no operations.
#[must_use]
pub fn diff(old: &str, new: &str) -> Vec<TextOperation> {
    if old == new {
        return Vec::new();
    }
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let mut prefix = 0;
    while prefix < old_chars.len()
        && prefix < new_chars.len()
        && old_chars[prefix] == new_chars[prefix]
    {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < old_chars.len() - prefix
        && suffix < new_chars.len() - prefix
        && old_chars[old_chars.len() - 1 - suffix] == new_chars[new_chars.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut operations = Vec::with_capacity(2);
    let removed = old_chars.len() - prefix - suffix;
    if removed > 0 {
        operations.push(TextOperation::Remove {
            index: prefix as u32,
            length: removed as u32,
        });
    }
    let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();
    if !inserted.is_empty() {
        operations.push(TextOperation::Insert {
            index: prefix as u32,
            text: inserted,
        });
    }
    operations
}

/// Apply text operations in order, the way a consumer replays them.
///
/// # Errors
/// Returns an error if an index or length falls outside the text.
pub fn apply(old: &str, operations: &[TextOperation]) -> Result<String, Error> {
    let mut chars: Vec<char> = old.chars().collect();
    for operation in operations {
        match operation {
            TextOperation::Insert { index, text } => {
                let at = *index as usize;
                if at > chars.len() {
                    bail!("insert index {at} out of bounds ({})", chars.len());
                }
                chars.splice(at..at, text.chars());
            }
            TextOperation::Remove { index, length } => {
                let from = *index as usize;
                let to = from + *length as usize;
                if to > chars.len() {
                    bail!("remove range {from}..{to} out of bounds ({})", chars.len());
                }
                chars.drain(from..to);
            }
        }
    }
    Ok(chars.into_iter().collect())
}

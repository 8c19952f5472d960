//! Textual edits against a unit's buffer.
//!
//! Edits are collected with the byte range they replace, checked for
//! overlap, then applied highest offset first so no edit shifts the
//! anchor of another.

use crate::error::SmaliError;
use crate::field::STRING_ARRAY;
use crate::instruction::{decode, escape_string, parse_literal_int};
use crate::text::{code_part, lines, Line};
use log::debug;
use rangemap::RangeMap;
use std::ops::Range;

/// Registers used by the synthesised array block.
pub(crate) const ARRAY_REGISTERS: u32 = 3;

#[derive(Debug)]
pub(crate) struct EditList {
    ranges: RangeMap<usize, usize>,
    replacements: Vec<String>,
}

impl EditList {
    pub fn new() -> Self {
        EditList {
            ranges: RangeMap::new(),
            replacements: vec![],
        }
    }

    /// Queues `replacement` for `range`. Ranges must be non-empty and must not overlap.
    pub fn push(&mut self, range: Range<usize>, replacement: String) -> Result<(), SmaliError> {
        if range.start >= range.end {
            fail!(AnchorNotFound, "empty edit at offset {}", range.start);
        }
        if self.ranges.overlaps(&range) {
            fail!(OverlappingEdit, "edit {}..{} overlaps an earlier edit", range.start, range.end);
        }
        debug!("edit {}..{} -> {} bytes", range.start, range.end, replacement.len());
        self.ranges.insert(range, self.replacements.len());
        self.replacements.push(replacement);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    /// Applies every edit to `text`, back to front.
    pub fn apply(&self, text: &str) -> Result<String, SmaliError> {
        let mut out = text.to_string();
        let edits: Vec<(&Range<usize>, &usize)> = self.ranges.iter().collect();
        for (range, &idx) in edits.into_iter().rev() {
            if range.end > out.len() || !out.is_char_boundary(range.start) || !out.is_char_boundary(range.end) {
                fail!(AnchorNotFound, "edit {}..{} falls outside the buffer", range.start, range.end);
            }
            out.replace_range(range.clone(), &self.replacements[idx]);
        }
        Ok(out)
    }
}

/// Finds the declaration line whose trimmed text is exactly `declaration`.
pub(crate) fn locate_line(text: &str, declaration: &str) -> Option<Range<usize>> {
    lines(text)
        .find(|l| l.trimmed() == declaration)
        .map(|l| l.trimmed_range())
}

/// A located `.method` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MethodSpan {
    /// The body, between the two boundary lines
    pub body: Range<usize>,
    /// The trimmed `.end method` terminator
    pub terminator: Range<usize>,
}

/// Locates the method whose `.method` line ends in `name_signature`, e.g. `<clinit>()V`.
pub(crate) fn locate_method(text: &str, name_signature: &str) -> Option<MethodSpan> {
    let mut it = lines(text);
    let header = it.find(|l| l.is_directive(".method") && code_part(l.text).split_whitespace().last() == Some(name_signature))?;
    let end = it.find(|l| l.is_directive(".end method"))?;
    Some(MethodSpan {
        body: header.next..end.start,
        terminator: end.trimmed_range(),
    })
}

/// The instructions that build a `String[]` and store it into `reference`.
pub(crate) fn synthesize_string_array<S: AsRef<str>>(values: &[S], reference: &str, indent: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}{} v0, {:#x}\n", indent, const_opcode(values.len()), values.len()));
    out.push_str(&format!("{}new-array v0, v0, {}\n", indent, STRING_ARRAY));
    for (idx, value) in values.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("{}{} v1, {:#x}\n", indent, const_opcode(idx), idx));
        out.push_str(&format!("{}const-string v2, \"{}\"\n", indent, escape_string(value.as_ref())));
        out.push_str(&format!("{}aput-object v2, v0, v1\n", indent));
    }
    out.push('\n');
    out.push_str(&format!("{}sput-object v0, {}\n", indent, reference));
    out.push('\n');
    out
}

// const/16 holds a signed 16 bit literal
fn const_opcode(n: usize) -> &'static str {
    if n <= 0x7fff {
        "const/16"
    } else {
        "const"
    }
}

/// Injects the array block before the first return of a static initializer body.
pub(crate) fn inject_string_array<S: AsRef<str>>(body: &str, values: &[S], reference: &str) -> Result<String, SmaliError> {
    let ret: Line<'_> = lines(body)
        .find(|l| decode(l.text).is_return())
        .ok_or_else(|| err!(AnchorNotFound, "no return instruction to insert {} before", reference))?;
    let indent = &ret.text[..ret.text.len() - ret.text.trim_start().len()];

    let mut out = String::with_capacity(body.len() + 128 * (values.len() + 1));
    out.push_str(&body[..ret.start]);
    out.push_str(&synthesize_string_array(values, reference, indent));
    out.push_str(&body[ret.start..]);
    Ok(ensure_registers(&out, ARRAY_REGISTERS))
}

/// Raises the first `.locals` or `.registers` count to at least `min`.
pub(crate) fn ensure_registers(body: &str, min: u32) -> String {
    for line in lines(body) {
        let directive = [".locals", ".registers"].into_iter().find(|d| line.is_directive(d));
        let Some(directive) = directive else {
            continue;
        };
        let count = line.trimmed()[directive.len()..].trim();
        return match parse_literal_int::<u32>(count) {
            Ok(("", n)) if n < min => {
                let mut out = body.to_string();
                out.replace_range(line.trimmed_range(), &format!("{} {}", directive, min));
                out
            }
            _ => body.to_string(),
        };
    }
    body.to_string()
}

/// Drops every line that writes `reference`. `None` when nothing matched.
pub(crate) fn strip_assignments(body: &str, reference: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut removed = 0;
    for line in lines(body) {
        if decode(line.text).assigns(reference) {
            removed += 1;
            continue;
        }
        out.push_str(&body[line.start..line.next]);
    }
    if removed == 0 {
        return None;
    }
    debug!("removed {} assignment(s) to {}", removed, reference);
    Some(out)
}

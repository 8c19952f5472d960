use std::ops::Range;

/// One line of a buffer together with where it sits in that buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line<'a> {
    /// Zero based
    pub number: usize,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset just past the content, before any `\r\n`
    pub end: usize,
    /// Byte offset of the next line (or the buffer length)
    pub next: usize,
    pub text: &'a str,
}

impl<'a> Line<'a> {
    pub fn trimmed(&self) -> &'a str {
        self.text.trim()
    }

    /// Byte range of the trimmed content.
    pub fn trimmed_range(&self) -> Range<usize> {
        let lead = self.text.len() - self.text.trim_start().len();
        let start = self.start + lead;
        start..start + self.trimmed().len()
    }

    /// The first word of the line is `directive`, e.g. `.method`.
    pub fn is_directive(&self, directive: &str) -> bool {
        let t = self.trimmed();
        t.strip_prefix(directive)
            .map(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            .unwrap_or(false)
    }
}

pub(crate) fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut start = 0;
    let mut number = 0;
    std::iter::from_fn(move || {
        if start >= text.len() {
            return None;
        }
        let next = text[start..].find('\n').map(|i| start + i + 1).unwrap_or(text.len());
        let mut end = if text[..next].ends_with('\n') { next - 1 } else { next };
        if text[start..end].ends_with('\r') {
            end -= 1;
        }
        let line = Line {
            number,
            start,
            end,
            next,
            text: &text[start..end],
        };
        start = next;
        number += 1;
        Some(line)
    })
}

/// The line without a trailing `# comment`. A `#` inside a string literal is kept.
pub(crate) fn code_part(line: &str) -> &str {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '#' if !quoted => return line[..i].trim_end(),
            _ => {}
        }
    }
    line.trim_end()
}

/// Drops `.line N` directives, keeping everything else byte for byte.
pub(crate) fn strip_line_directives(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in lines(text) {
        let t = line.trimmed();
        let is_line_directive = t
            .strip_prefix(".line")
            .map(|n| !n.trim().is_empty() && n.trim().chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false);
        if !is_line_directive {
            out.push_str(&text[line.start..line.next]);
        }
    }
    out
}

//! Single-line instruction decoding.
//!
//! Only the handful of instruction shapes the patcher and callers care about
//! are decoded, everything else comes back as [`Instruction::Other`]. There is
//! no attempt at control or data flow here, a line is looked at on its own.

use crate::descriptor::{parse_field_ref, parse_method_ref, FieldRef, MethodRef};
use nom::branch::alt;
use nom::bytes::complete::{escaped, tag};
use nom::character::complete::{char, digit1, hex_digit1, multispace0, none_of, one_of, space0};
use nom::combinator::{map, opt, recognize};
use nom::multi::separated_list0;
use nom::sequence::{delimited, pair, separated_pair};
use nom::IResult;
use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccessKind {
    Get,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOp {
    pub kind: FieldAccessKind,
    pub is_static: bool,
}

// sget, sget-wide, ... iput-short
static FIELD_OPS: Lazy<HashMap<String, FieldOp>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (prefix, is_static) in [("s", true), ("i", false)] {
        for (verb, kind) in [("get", FieldAccessKind::Get), ("put", FieldAccessKind::Put)] {
            for suffix in ["", "-wide", "-object", "-boolean", "-byte", "-char", "-short"] {
                map.insert(format!("{prefix}{verb}{suffix}"), FieldOp { kind, is_static });
            }
        }
    }
    map
});

const CONST_OPS: [&str; 8] = [
    "const",
    "const/4",
    "const/16",
    "const/high16",
    "const-wide",
    "const-wide/16",
    "const-wide/32",
    "const-wide/high16",
];

/// One decoded body line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Blank,
    Comment(String),
    Label(String),
    /// `.locals`, `.line`, `.param` and the like
    Directive(String),
    FieldAccess {
        opcode: String,
        op: FieldOp,
        registers: Vec<String>,
        field: FieldRef,
    },
    /// For `/range` forms `registers` holds the first and last register.
    Invoke {
        opcode: String,
        registers: Vec<String>,
        method: MethodRef,
    },
    ConstString {
        register: String,
        value: String,
    },
    Const {
        opcode: String,
        register: String,
        value: i64,
    },
    MoveResult {
        opcode: String,
        register: String,
    },
    Return {
        opcode: String,
        register: Option<String>,
    },
    Other(String),
}

impl Instruction {
    /// True for a put instruction writing `reference` (`class->name:type`).
    pub fn assigns(&self, reference: &str) -> bool {
        match self {
            Instruction::FieldAccess { op, field, .. } => {
                op.kind == FieldAccessKind::Put && field.to_string() == reference
            }
            _ => false,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instruction::Return { .. })
    }
}

fn parse_register(input: &str) -> IResult<&str, &str> {
    recognize(pair(one_of("vp"), digit1))(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(space0, char(','), space0)(input)
}

fn parse_register_list(input: &str) -> IResult<&str, Vec<&str>> {
    let range = map(
        separated_pair(parse_register, delimited(space0, tag(".."), space0), parse_register),
        |(start, end)| vec![start, end],
    );
    delimited(
        pair(char('{'), space0),
        alt((range, separated_list0(comma, parse_register))),
        pair(space0, char('}')),
    )(input)
}

/// Parses a quoted string literal and returns it still escaped, e.g. `"a\nb"`.
pub(crate) fn parse_string_literal(input: &str) -> IResult<&str, &str> {
    let esc = escaped(none_of("\\\""), '\\', one_of("'\"tbnrfu\\"));
    let esc_or_empty = alt((esc, tag("")));

    delimited(pair(multispace0, char('"')), esc_or_empty, pair(char('"'), multispace0))(input)
}

/// Parses a decimal or `0x` hex literal with optional sign and `L`/`t`/`s` suffix.
pub(crate) fn parse_literal_int<T>(input: &str) -> IResult<&str, T>
where
    T: num_traits::PrimInt,
{
    use nom::error::{Error, ErrorKind};

    let (input, sign) = opt(char('-'))(input)?;
    let hex: IResult<&str, &str> = alt((tag("0x"), tag("0X")))(input);
    let (input, magnitude) = if let Ok((input, _)) = hex {
        let (input, digits) = hex_digit1(input)?;
        let value = u64::from_str_radix(digits, 16)
            .map_err(|_| nom::Err::Failure(Error::new(input, ErrorKind::HexDigit)))?;
        // Wide literals are written as unsigned two's complement.
        (input, value as i64)
    } else {
        let (input, digits) = digit1(input)?;
        let value = digits
            .parse::<i64>()
            .map_err(|_| nom::Err::Failure(Error::new(input, ErrorKind::Digit)))?;
        (input, value)
    };
    let (input, _) = opt(one_of("Lts"))(input)?;

    let value = if sign.is_some() { magnitude.wrapping_neg() } else { magnitude };
    let out = num_traits::cast::<i64, T>(value)
        .ok_or_else(|| nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)))?;
    Ok((input, out))
}

fn decode_operands(opcode: &str, operands: &str) -> Option<Instruction> {
    if let Some(op) = FIELD_OPS.get(opcode) {
        let (_, (registers, field)) =
            separated_pair(separated_list0(comma, parse_register), comma, parse_field_ref)(operands).ok()?;
        return Some(Instruction::FieldAccess {
            opcode: opcode.to_string(),
            op: *op,
            registers: registers.into_iter().map(str::to_string).collect(),
            field,
        });
    }

    if opcode.starts_with("invoke-") {
        let (_, (registers, method)) = separated_pair(parse_register_list, comma, parse_method_ref)(operands).ok()?;
        return Some(Instruction::Invoke {
            opcode: opcode.to_string(),
            registers: registers.into_iter().map(str::to_string).collect(),
            method,
        });
    }

    if opcode == "const-string" || opcode == "const-string/jumbo" {
        let (_, (register, value)) = separated_pair(parse_register, comma, parse_string_literal)(operands).ok()?;
        return Some(Instruction::ConstString {
            register: register.to_string(),
            value: unescape_string(value),
        });
    }

    if CONST_OPS.contains(&opcode) {
        let (_, (register, value)) = separated_pair(parse_register, comma, parse_literal_int::<i64>)(operands).ok()?;
        return Some(Instruction::Const {
            opcode: opcode.to_string(),
            register: register.to_string(),
            value,
        });
    }

    if opcode.starts_with("move-result") {
        let (_, register) = parse_register(operands).ok()?;
        return Some(Instruction::MoveResult {
            opcode: opcode.to_string(),
            register: register.to_string(),
        });
    }

    if opcode == "return-void" {
        return Some(Instruction::Return {
            opcode: opcode.to_string(),
            register: None,
        });
    }

    if opcode.starts_with("return") {
        let (_, register) = parse_register(operands).ok()?;
        return Some(Instruction::Return {
            opcode: opcode.to_string(),
            register: Some(register.to_string()),
        });
    }

    None
}

/// Decodes a single body line. Unknown or malformed instructions come back as `Other`.
pub fn decode(line: &str) -> Instruction {
    let line = line.trim();
    if line.is_empty() {
        return Instruction::Blank;
    }
    if let Some(c) = line.strip_prefix('#') {
        return Instruction::Comment(c.trim().to_string());
    }
    if line.starts_with(':') {
        return Instruction::Label(line.to_string());
    }
    if line.starts_with('.') {
        return Instruction::Directive(line.to_string());
    }

    let (opcode, operands) = match line.split_once(char::is_whitespace) {
        Some((opcode, operands)) => (opcode, operands.trim_start()),
        None => (line, ""),
    };
    decode_operands(opcode, operands).unwrap_or_else(|| Instruction::Other(line.to_string()))
}

/// Renders text for embedding inside a `"..."` smali literal.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out
}

/// Inverse of [`escape_string`]. Unknown escapes are kept as written.
pub fn unescape_string(s: &str) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut buf = [0u16; 2];
    while let Some(c) = chars.next() {
        if c != '\\' {
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let decoded = match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('b') => '\u{8}',
            Some('f') => '\u{c}',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('\\') => '\\',
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next_if(|c| c.is_ascii_hexdigit())).collect();
                match u16::from_str_radix(&hex, 16) {
                    Ok(unit) if hex.len() == 4 => units.push(unit),
                    _ => {
                        units.extend("\\u".encode_utf16());
                        units.extend(hex.encode_utf16());
                    }
                }
                continue;
            }
            Some(other) => {
                units.push('\\' as u16);
                units.extend_from_slice(other.encode_utf16(&mut buf));
                continue;
            }
            None => '\\',
        };
        units.extend_from_slice(decoded.encode_utf16(&mut buf));
    }
    String::from_utf16_lossy(&units)
}

//! Descriptor grammar: class headers, type descriptors, prototypes and the
//! `class->member` reference strings used everywhere else in the crate.
//!
//! Everything here is a pure function over `&str`.

use crate::error::SmaliError;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_until, take_while};
use nom::character::complete::{char, one_of, space0, space1};
use nom::combinator::{all_consuming, eof, recognize};
use nom::multi::{many0, many1};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A class header line, `.class <modifiers> <descriptor>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub modifiers: Vec<String>,
    pub descriptor: String,
}

/// True for `L...;` with a non-empty body.
pub fn is_class_descriptor(s: &str) -> bool {
    s.len() > 2 && s.starts_with('L') && s.ends_with(';')
}

/// Recognises one type token: any number of `[` followed by a primitive
/// letter or an object descriptor.
pub(crate) fn type_descriptor(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        many0(char('[')),
        alt((
            recognize(one_of("BCDFIJSZ")),
            recognize(delimited(char('L'), is_not(";\n"), char(';'))),
        )),
    ))(input)
}

/// Like [`type_descriptor`] but also accepts `V`, for return types.
pub(crate) fn return_descriptor(input: &str) -> IResult<&str, &str> {
    alt((tag("V"), type_descriptor))(input)
}

pub fn is_type_descriptor(s: &str) -> bool {
    all_consuming(type_descriptor)(s).is_ok()
}

fn class_line(input: &str) -> IResult<&str, Vec<&str>> {
    let (input, _) = tag(".class")(input)?;
    let (input, words) = many1(preceded(space1, is_not(" \t\r\n")))(input)?;
    let (input, _) = terminated(space0, eof)(input)?;
    Ok((input, words))
}

fn super_line(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag(".super")(input)?;
    let (input, class) = preceded(space1, is_not(" \t\r\n"))(input)?;
    let (input, _) = terminated(space0, eof)(input)?;
    Ok((input, class))
}

/// Parses a `.class` line. Everything but the last word is a modifier.
pub fn parse_class_line(line: &str) -> Result<ClassHeader, SmaliError> {
    let line = line.trim();
    let (_, mut words) = class_line(line)
        .map_err(|_| err!(MalformedHeader, "not a class header: `{}`", line))?;
    let descriptor = words.pop().unwrap_or_default();
    if !is_class_descriptor(descriptor) {
        fail!(MalformedHeader, "class descriptor `{}` must look like Lpkg/Name;", descriptor);
    }
    Ok(ClassHeader {
        modifiers: words.into_iter().map(str::to_string).collect(),
        descriptor: descriptor.to_string(),
    })
}

/// Parses a `.super` line and returns the superclass descriptor.
pub fn parse_super_line(line: &str) -> Result<String, SmaliError> {
    let line = line.trim();
    match super_line(line) {
        Ok((_, class)) if is_class_descriptor(class) => Ok(class.to_string()),
        _ => Err(err!(MissingSuper, "not a super line: `{}`", line)),
    }
}

/// Splits a parameter run such as `Ljava/lang/String;[B[IBICF` into one token per parameter.
pub fn segment_params(proto: &str) -> Result<Vec<String>, SmaliError> {
    let (_, params) = all_consuming(many0(type_descriptor))(proto)
        .map_err(|_| err!(MalformedSignature, "cannot segment parameters `{}`", proto))?;
    Ok(params.into_iter().map(str::to_string).collect())
}

/// `Lpkg/Name;` to `pkg.Name`
pub fn to_dotted(descriptor: &str) -> Result<String, SmaliError> {
    if !is_class_descriptor(descriptor) {
        fail!(NotAClassDescriptor, "{} is not a class that conforms to the smali grammar", descriptor);
    }
    Ok(descriptor[1..descriptor.len() - 1].replace('/', "."))
}

/// `pkg.Name` to `Lpkg/Name;`
pub fn from_dotted(java: &str) -> String {
    format!("L{};", java.replace('.', "/"))
}

/// Relative file location for a class, e.g. `Lcom/a/C;` to `com/a/C.smali`.
pub fn class_path(descriptor: &str, extension: &str) -> Result<PathBuf, SmaliError> {
    if !is_class_descriptor(descriptor) {
        fail!(NotAClassDescriptor, "cannot derive a path from {}", descriptor);
    }
    let mut parts: Vec<&str> = descriptor[1..descriptor.len() - 1].split('/').collect();
    let file = format!("{}.{}", parts.pop().unwrap_or_default(), extension);
    let mut path: PathBuf = parts.into_iter().collect();
    path.push(file);
    Ok(path)
}

/// A symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// The class descriptor, e.g. "Lcom/example/MyClass;".
    pub class: String,
    pub name: String,
    /// The field type, e.g. "I".
    pub descriptor: String,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.descriptor)
    }
}

/// A symbolic reference to a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    /// The method prototype, e.g. "(I)V".
    pub descriptor: String,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.descriptor)
    }
}

pub(crate) fn parse_field_ref(input: &str) -> IResult<&str, FieldRef> {
    let (input, class) = take_until("->")(input)?;
    let (input, _) = tag("->")(input)?;
    let (input, name) = take_while(|c: char| c != ':' && c != '(' && !c.is_whitespace())(input)?;
    let (input, _) = char(':')(input)?;
    let (input, descriptor) = type_descriptor(input)?;
    Ok((
        input,
        FieldRef {
            class: class.trim().to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        },
    ))
}

pub(crate) fn parse_method_ref(input: &str) -> IResult<&str, MethodRef> {
    let (input, class) = take_until("->")(input)?;
    let (input, _) = tag("->")(input)?;
    let (input, name) = take_while(|c: char| c != '(' && c != ':' && !c.is_whitespace())(input)?;
    let (input, descriptor) = recognize(pair(
        delimited(char('('), many0(type_descriptor), char(')')),
        return_descriptor,
    ))(input)?;
    Ok((
        input,
        MethodRef {
            class: class.trim().to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        },
    ))
}

/// Anything that can be renamed across a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reference {
    Class(String),
    Field(FieldRef),
    Method(MethodRef),
}

impl Reference {
    pub fn parse(s: &str) -> Result<Reference, SmaliError> {
        let s = s.trim();
        if s.contains("->") {
            if let Ok((_, m)) = all_consuming(parse_method_ref)(s) {
                return Ok(Reference::Method(m));
            }
            if let Ok((_, f)) = all_consuming(parse_field_ref)(s) {
                return Ok(Reference::Field(f));
            }
            fail!(InvalidReference, "`{}` is neither a field nor a method reference", s);
        }
        if !is_class_descriptor(s) {
            fail!(InvalidReference, "`{}` is not a class descriptor", s);
        }
        Ok(Reference::Class(s.to_string()))
    }

    /// The owning class descriptor.
    pub fn class(&self) -> &str {
        match self {
            Reference::Class(c) => c,
            Reference::Field(f) => &f.class,
            Reference::Method(m) => &m.class,
        }
    }

    /// The part after `->`, e.g. `a:I` or `m()V`. `None` for a class.
    pub fn member_token(&self) -> Option<String> {
        match self {
            Reference::Class(_) => None,
            Reference::Field(f) => Some(format!("{}:{}", f.name, f.descriptor)),
            Reference::Method(m) => Some(format!("{}{}", m.name, m.descriptor)),
        }
    }

    /// The member token with a leading space, so `a:I` won't match inside `ba:I`.
    pub fn anchored_token(&self) -> Option<String> {
        self.member_token().map(|t| format!(" {}", t))
    }

    pub fn is_member(&self) -> bool {
        !matches!(self, Reference::Class(_))
    }

    pub(crate) fn same_kind(&self, other: &Reference) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Class(c) => write!(f, "{}", c),
            Reference::Field(r) => write!(f, "{}", r),
            Reference::Method(r) => write!(f, "{}", r),
        }
    }
}

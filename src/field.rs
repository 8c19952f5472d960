use crate::access::AccessFlags;
use crate::descriptor::{is_type_descriptor, FieldRef};
use crate::error::SmaliError;
use crate::instruction::{escape_string, unescape_string};
use nom::bytes::complete::tag;
use nom::character::complete::space1;
use nom::combinator::rest;
use nom::sequence::preceded;
use nom::IResult;
use std::fmt;

pub(crate) const STRING_ARRAY: &str = "[Ljava/lang/String;";

/// A literal initial value on a `.field` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A quoted string, held unescaped
    Str(String),
    /// Anything else (`0x5`, `true`, ...), kept exactly as written
    Raw(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "\"{}\"", escape_string(s)),
            FieldValue::Raw(r) => write!(f, "{}", r),
        }
    }
}

/// A value change waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PendingValue {
    #[default]
    NoChange,
    /// Written into the declaration itself
    ScalarLiteral(String),
    /// Has no declarative form, built up inside `<clinit>` instead
    CompositeLiteral(Vec<String>),
}

/// Struct representing one `.field` declaration
///
/// Java declares a field as
/// `[access] [static] [final] type name [= value];`
/// and smali as
/// `.field [access] [static] [final] name:type [= value]`
///
/// Only static fields may carry an initial value, so giving a value to an
/// instance field turns it static.
#[derive(Debug, Clone)]
pub struct Field {
    class: String,
    modifiers: Vec<String>,
    name: String,
    field_type: String,
    value: Option<FieldValue>,
    /// The declaration exactly as it currently sits in the unit's text (trimmed)
    declaration: String,
    /// The reference the unit's instructions use, `class->name:type` as parsed
    declared_reference: String,
    previous: Option<String>,
    pending: PendingValue,
    dirty: bool,
}

fn field_line(input: &str) -> IResult<&str, &str> {
    preceded(tag(".field"), preceded(space1, rest))(input)
}

impl Field {
    /// Parses a `.field` line for the class `class`.
    ///
    /// ```
    /// use smafile::field::Field;
    ///
    /// let f = Field::parse("Lx;", ".field protected static final z:Ljava/lang/String; = \"Action\"").unwrap();
    /// assert_eq!(f.name(), "z");
    /// assert_eq!(f.value(), Some("Action"));
    /// assert_eq!(f.reference(), "Lx;->z:Ljava/lang/String;");
    /// ```
    pub fn parse(class: &str, line: &str) -> Result<Field, SmaliError> {
        let declaration = line.trim();
        let (_, body) = field_line(declaration)
            .map_err(|_| err!(MalformedField, "not a field declaration: `{}`", declaration))?;

        let (lhs, literal) = match body.split_once(" = ") {
            Some((lhs, literal)) => (lhs, Some(literal.trim())),
            None => (body, None),
        };

        let mut words: Vec<&str> = lhs.split_whitespace().collect();
        let last = words
            .pop()
            .ok_or_else(|| err!(MalformedField, "missing name:type in `{}`", declaration))?;
        let (name, field_type) = last
            .split_once(':')
            .ok_or_else(|| err!(MalformedField, "missing ':' between name and type in `{}`", declaration))?;
        if name.is_empty() || !is_type_descriptor(field_type) {
            fail!(MalformedField, "cannot split `{}` into name and type", last);
        }

        let value = literal.map(|l| {
            if l.len() >= 2 && l.starts_with('"') && l.ends_with('"') {
                FieldValue::Str(unescape_string(&l[1..l.len() - 1]))
            } else {
                FieldValue::Raw(l.to_string())
            }
        });

        Ok(Field {
            class: class.to_string(),
            modifiers: words.into_iter().map(str::to_string).collect(),
            name: name.to_string(),
            field_type: field_type.to_string(),
            value,
            declaration: declaration.to_string(),
            declared_reference: format!("{}->{}:{}", class, name, field_type),
            previous: None,
            pending: PendingValue::NoChange,
            dirty: false,
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }

    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_modifiers(&self.modifiers)
    }

    pub fn is_static(&self) -> bool {
        self.flags().contains(AccessFlags::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.flags().contains(AccessFlags::FINAL)
    }

    pub fn set_static(&mut self, flag: bool) {
        self.set_modifier("static", flag);
    }

    pub fn set_final(&mut self, flag: bool) {
        self.set_modifier("final", flag);
    }

    fn set_modifier(&mut self, word: &str, flag: bool) {
        let present = self.modifiers.iter().any(|m| m == word);
        if flag && !present {
            self.modifiers.push(word.to_string());
            self.dirty = true;
        } else if !flag && present {
            self.modifiers.retain(|m| m != word);
            self.dirty = true;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.dirty = true;
    }

    pub fn field_type(&self) -> &str {
        &self.field_type
    }

    pub fn set_type(&mut self, field_type: &str) {
        self.field_type = field_type.to_string();
        self.dirty = true;
    }

    /// The string content of the declared literal, if any.
    pub fn value(&self) -> Option<&str> {
        match &self.value {
            Some(FieldValue::Str(s)) | Some(FieldValue::Raw(s)) => Some(s),
            None => None,
        }
    }

    pub fn literal(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    /// Declares a string literal for this field. Makes the field static if it isn't.
    pub fn set_value(&mut self, value: &str) {
        self.previous = Some(self.declaration_text());
        self.value = Some(FieldValue::Str(value.to_string()));
        self.pending = PendingValue::ScalarLiteral(value.to_string());
        self.dirty = true;
        if !self.is_static() {
            self.modifiers.push("static".to_string());
        }
    }

    /// Gives a `String[]` field a value, to be built in the static initializer.
    pub fn set_string_array<S: AsRef<str>>(&mut self, values: &[S]) -> Result<(), SmaliError> {
        if self.field_type != STRING_ARRAY {
            fail!(TypeMismatch, "{} is not a {} field", self.reference(), STRING_ARRAY);
        }
        self.pending = PendingValue::CompositeLiteral(values.iter().map(|v| v.as_ref().to_string()).collect());
        self.dirty = true;
        Ok(())
    }

    pub fn pending(&self) -> &PendingValue {
        &self.pending
    }

    /// `class->name:type` from the current name and type
    pub fn reference(&self) -> String {
        format!("{}->{}:{}", self.class, self.name, self.field_type)
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef {
            class: self.class.clone(),
            name: self.name.clone(),
            descriptor: self.field_type.clone(),
        }
    }

    /// The reference as it was when the declaration was last read from or written to text.
    pub fn declared_reference(&self) -> &str {
        &self.declared_reference
    }

    /// The declaration line currently in the unit's text.
    pub fn declaration(&self) -> &str {
        &self.declaration
    }

    /// Re-serialises the declaration from the model.
    pub fn declaration_text(&self) -> String {
        let mut parts = vec![".field".to_string()];
        parts.extend(self.modifiers.iter().cloned());
        parts.push(format!("{}:{}", self.name, self.field_type));
        if let Some(v) = &self.value {
            parts.push("=".to_string());
            parts.push(v.to_string());
        }
        parts.join(" ")
    }

    /// The declaration as it was before the pending `set_value`.
    pub fn previous_declaration(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the next flush rewrites the declaration line.
    pub(crate) fn rewrites_declaration(&self) -> bool {
        self.dirty
            && (matches!(self.pending, PendingValue::ScalarLiteral(_))
                || self.reference() != self.declared_reference
                || self.modifiers_changed())
    }

    fn modifiers_changed(&self) -> bool {
        let on_text = self.declaration.split(" = ").next().unwrap_or_default();
        let mut words: Vec<&str> = on_text.split_whitespace().skip(1).collect();
        words.pop();
        words != self.modifiers.iter().map(String::as_str).collect::<Vec<_>>()
    }

    /// Called once the declaration has been written back.
    pub(crate) fn mark_flushed(&mut self, written: Option<String>) {
        if let Some(declaration) = written {
            self.declaration = declaration;
        }
        self.declared_reference = self.reference();
        self.previous = None;
        self.pending = PendingValue::NoChange;
        self.dirty = false;
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}

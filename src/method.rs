use crate::access::AccessFlags;
use crate::descriptor::{return_descriptor, segment_params, MethodRef};
use crate::error::SmaliError;
use crate::instruction::{decode, Instruction};
use crate::text::{code_part, lines};
use nom::bytes::complete::{is_not, tag, take_until};
use nom::character::complete::char;
use nom::combinator::{all_consuming, opt};
use nom::sequence::{delimited, tuple};
use nom::IResult;
use std::fmt;

pub(crate) const STATIC_INITIALIZER: &str = "<clinit>()V";

/// Struct representing a smali method
#[derive(Debug, Clone)]
pub struct Method {
    class: String,
    access_flags: Vec<String>,
    name: String,
    /// The parameter run between the brackets
    proto: String,
    params: Vec<String>,
    return_type: String,
    body: String,
    dirty: bool,
}

// name(params)return, name is everything up to the first '('
fn signature_token(input: &str) -> IResult<&str, (&str, Option<&str>, &str)> {
    all_consuming(tuple((
        take_until("("),
        delimited(char('('), opt(is_not(")")), char(')')),
        return_descriptor,
    )))(input)
}

impl Method {
    /// Builds a method from its `.method` line and the text between that line and `.end method`.
    pub fn parse(class: &str, line: &str, body: &str) -> Result<Method, SmaliError> {
        let line = code_part(line.trim());
        let (rest, _) = tag::<_, _, nom::error::Error<&str>>(".method")(line)
            .map_err(|_| err!(MalformedSignature, "not a method declaration: `{}`", line))?;

        let mut words: Vec<&str> = rest.split_whitespace().collect();
        let token = words
            .pop()
            .ok_or_else(|| err!(MalformedSignature, "missing signature in `{}`", line))?;
        let (_, (name, proto, return_type)) =
            signature_token(token).map_err(|_| err!(MalformedSignature, "cannot split `{}` into name(params)return", token))?;
        if name.is_empty() {
            fail!(MalformedSignature, "empty method name in `{}`", line);
        }
        let proto = proto.unwrap_or_default();
        let params = segment_params(proto).map_err(|e| SmaliError::with_context(e, format!("method {}", name)))?;

        Ok(Method {
            class: class.to_string(),
            access_flags: words.into_iter().map(str::to_string).collect(),
            name: name.to_string(),
            proto: proto.to_string(),
            params,
            return_type: return_type.to_string(),
            body: body.to_string(),
            dirty: false,
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn access_flags(&self) -> &[String] {
        &self.access_flags
    }

    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_modifiers(&self.access_flags)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw parameter descriptors between the parentheses, e.g. `[[IJ`.
    pub fn proto(&self) -> &str {
        &self.proto
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// `(params)return`
    pub fn signature(&self) -> String {
        format!("({}){}", self.proto, self.return_type)
    }

    /// `class->name(params)return`
    pub fn reference(&self) -> String {
        format!("{}->{}{}", self.class, self.name, self.signature())
    }

    pub fn method_ref(&self) -> MethodRef {
        MethodRef {
            class: self.class.clone(),
            name: self.name.clone(),
            descriptor: self.signature(),
        }
    }

    /// `name(params)return`, the last word of the `.method` line.
    pub fn name_signature(&self) -> String {
        format!("{}{}", self.name, self.signature())
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name_signature() == STATIC_INITIALIZER
    }

    /// Everything between the `.method` line and `.end method`, exclusive of both.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Replaces the body verbatim.
    pub fn set_body(&mut self, body: &str) {
        self.body = body.to_string();
        self.dirty = true;
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn declaration(&self) -> String {
        let mut parts = vec![".method".to_string()];
        parts.extend(self.access_flags.iter().cloned());
        parts.push(self.name_signature());
        parts.join(" ")
    }

    pub fn instructions(&self) -> impl Iterator<Item = Instruction> + '_ {
        lines(&self.body).map(|l| decode(l.text))
    }

    /// Signature line, newline, body, terminator.
    pub fn to_smali(&self) -> String {
        format!("{}\n{}.end method\n", self.declaration(), self.body)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}

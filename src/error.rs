use std::fmt;

macro_rules! err {
    ($kind:ident, $msg:literal) => {
        $crate::error::SmaliError::new($crate::error::ErrorKind::$kind, $msg)
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        $crate::error::SmaliError::new($crate::error::ErrorKind::$kind, &format!($fmtstr, $($args)*))
    };
}

macro_rules! fail {
    ($kind:ident, $msg:literal) => {
        return Err(err!($kind, $msg))
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        return Err(err!($kind, $fmtstr, $($args)*))
    };
}

/// What went wrong, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `.class` line missing or its descriptor is not `L...;`
    MalformedHeader,
    /// `.super` line missing
    MissingSuper,
    NotAClassDescriptor,
    MalformedSignature,
    MalformedField,
    /// `.method` without a matching `.end method`
    UnterminatedMethod,
    /// A composite field value needs `<clinit>()V` and the unit has none
    NoStaticInitializer,
    /// The text a pending patch is anchored on is no longer in the buffer
    AnchorNotFound,
    OverlappingEdit,
    TypeMismatch,
    InvalidReference,
    Io,
}

/// How far an error reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The whole unit is unusable.
    Fatal,
    /// A single field or method was dropped, the unit is still usable.
    Recoverable,
    /// A flush could not be applied. Buffer and model are untouched.
    Patch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmaliError
{
    kind: ErrorKind,
    msg: String,
    contexts: Vec<String>,
}

impl SmaliError
{
    pub fn new(kind: ErrorKind, msg: &str) -> Self
    {
        SmaliError {
            kind,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub fn with_context(base: SmaliError, context: String) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context);
        SmaliError { kind: base.kind, msg: base.msg, contexts }
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }

    pub fn severity(&self) -> Severity
    {
        match self.kind {
            ErrorKind::MalformedField => Severity::Recoverable,
            ErrorKind::AnchorNotFound | ErrorKind::OverlappingEdit => Severity::Patch,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for SmaliError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for SmaliError {}

impl From<std::io::Error> for SmaliError
{
    fn from(e: std::io::Error) -> Self
    {
        SmaliError::new(ErrorKind::Io, &e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_chains_contexts() {
        let e = err!(UnterminatedMethod, "no .end method after line {}", 12);
        let e = SmaliError::with_context(e, "a()V".to_string());
        let e = SmaliError::with_context(e, "Lcom/a/A;".to_string());
        assert_eq!(e.to_string(), "no .end method after line 12 for a()V of Lcom/a/A;");
        assert_eq!(e.kind(), ErrorKind::UnterminatedMethod);
    }

    #[test]
    fn severities() {
        assert_eq!(err!(MalformedField, "bad").severity(), Severity::Recoverable);
        assert_eq!(err!(AnchorNotFound, "gone").severity(), Severity::Patch);
        assert_eq!(err!(NoStaticInitializer, "none").severity(), Severity::Fatal);
    }

    fn failing() -> Result<(), SmaliError> {
        fail!(Io, "cannot write {}", "x.smali");
    }

    #[test]
    fn fail_returns() {
        assert_eq!(failing().unwrap_err().message(), "cannot write x.smali");
    }
}

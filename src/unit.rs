use crate::access::AccessFlags;
use crate::config::ParseOptions;
use crate::descriptor::{parse_class_line, parse_super_line, to_dotted};
use crate::error::SmaliError;
use crate::field::{Field, PendingValue};
use crate::method::{Method, STATIC_INITIALIZER};
use crate::patch::{inject_string_array, locate_line, locate_method, strip_assignments, EditList};
use crate::text::{lines, strip_line_directives, Line};
use log::{debug, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A declaration that was skipped while parsing, the rest of the unit is fine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// One based line number
    pub line: usize,
    pub text: String,
    pub error: SmaliError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} (`{}`)", self.line, self.error, self.text)
    }
}

/// Represents one smali file, i.e. one class
///
/// The raw text is kept as is. Fields and methods are views over it and
/// every change made through them is written back by [`Unit::flush`] as a
/// textual edit, so everything else in the file stays byte for byte.
///
/// # Examples
///
/// ```
///  use smafile::unit::Unit;
///
///  let smali = ".class public Lcom/a/A;\n.super Ljava/lang/Object;\n\n.field private z:Ljava/lang/String;\n";
///  let mut u = Unit::from_smali(smali).unwrap();
///  u.get_field_mut("z:Ljava/lang/String;").unwrap().set_value("Action");
///  u.flush().unwrap();
///  assert!(u.text().contains(".field private static z:Ljava/lang/String; = \"Action\"\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Unit {
    text: String,
    class: String,
    modifiers: Vec<String>,
    super_class: String,
    fields: Vec<Field>,
    methods: Vec<Method>,
    diagnostics: Vec<Diagnostic>,

    /// Where the unit will be saved
    path: Option<PathBuf>,
    /// Where it was loaded from, if it has been moved since
    origin: Option<PathBuf>,
    /// The buffer differs from what is on disk
    modified: bool,
}

struct OpenMethod<'a> {
    header: Line<'a>,
}

impl Unit {
    /// Parses a unit from the text of a smali document.
    pub fn from_smali(s: &str) -> Result<Unit, SmaliError> {
        Self::from_smali_with(s, &ParseOptions::default())
    }

    pub fn from_smali_with(s: &str, options: &ParseOptions) -> Result<Unit, SmaliError> {
        let text = if options.strip_line_directives {
            strip_line_directives(s)
        } else {
            s.to_string()
        };
        Self::parse(text)
    }

    /// Reads and parses a smali file
    ///
    /// # Examples
    ///
    /// ```no_run
    ///  use std::path::Path;
    ///  use smafile::unit::Unit;
    ///
    ///  let u = Unit::read_from_file(Path::new("smali/com/cool/Class.smali")).expect("Uh oh, does the file exist?");
    ///  println!("Java class: {}", u.java_name());
    /// ```
    pub fn read_from_file(path: &Path) -> Result<Unit, SmaliError> {
        Self::read_from_file_with(path, &ParseOptions::default())
    }

    pub fn read_from_file_with(path: &Path, options: &ParseOptions) -> Result<Unit, SmaliError> {
        let context = || path.display().to_string();
        let s = fs::read_to_string(path).map_err(|e| SmaliError::with_context(e.into(), context()))?;
        let mut u = Self::from_smali_with(&s, options).map_err(|e| SmaliError::with_context(e, context()))?;
        u.path = Some(path.to_path_buf());
        Ok(u)
    }

    fn parse(text: String) -> Result<Unit, SmaliError> {
        let header = lines(&text)
            .find(|l| l.is_directive(".class"))
            .ok_or_else(|| err!(MalformedHeader, "no .class line"))?;
        let header = parse_class_line(header.text)?;
        let class = header.descriptor;

        let super_line = lines(&text)
            .find(|l| l.is_directive(".super"))
            .ok_or_else(|| err!(MissingSuper, "no .super line in {}", class))?;
        let super_class = parse_super_line(super_line.text).map_err(|e| SmaliError::with_context(e, class.clone()))?;

        let mut fields = vec![];
        let mut methods = vec![];
        let mut diagnostics = vec![];
        let mut open: Option<OpenMethod<'_>> = None;

        for line in lines(&text) {
            if line.is_directive(".method") {
                if let Some(m) = &open {
                    fail!(
                        UnterminatedMethod,
                        "line {} `{}` has no .end method before line {}",
                        m.header.number + 1,
                        m.header.trimmed(),
                        line.number + 1
                    );
                }
                open = Some(OpenMethod { header: line });
            } else if line.is_directive(".end method") {
                let Some(m) = open.take() else {
                    fail!(UnterminatedMethod, "line {}: .end method without .method in {}", line.number + 1, class);
                };
                let body = &text[m.header.next..line.start];
                let method = Method::parse(&class, m.header.text, body)
                    .map_err(|e| SmaliError::with_context(e, class.clone()))?;
                methods.push(method);
            } else if open.is_none() && line.is_directive(".field") {
                match Field::parse(&class, line.text) {
                    Ok(f) => fields.push(f),
                    Err(error) => {
                        warn!("{}: dropping field at line {}: {}", class, line.number + 1, error);
                        diagnostics.push(Diagnostic {
                            line: line.number + 1,
                            text: line.trimmed().to_string(),
                            error,
                        });
                    }
                }
            }
        }
        if let Some(m) = open {
            fail!(
                UnterminatedMethod,
                "line {} `{}` has no .end method in {}",
                m.header.number + 1,
                m.header.trimmed(),
                class
            );
        }

        Ok(Unit {
            text,
            class,
            modifiers: header.modifiers,
            super_class,
            fields,
            methods,
            diagnostics,
            path: None,
            origin: None,
            modified: false,
        })
    }

    /// The class descriptor, e.g. `Lcom/a/A;`
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The class in dotted form, e.g. `com.a.A`
    pub fn java_name(&self) -> String {
        to_dotted(&self.class).unwrap_or_else(|_| self.class.clone())
    }

    pub fn super_class(&self) -> &str {
        &self.super_class
    }

    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }

    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_modifiers(&self.modifiers)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Field declarations that could not be parsed.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn field_index(&self, reference: &str) -> Option<usize> {
        let member = member_part(&self.class, reference)?;
        self.fields
            .iter()
            .position(|f| format!("{}:{}", f.name(), f.field_type()) == member)
    }

    /// Looks a field up by `class->name:type` or by `name:type`.
    pub fn get_field(&self, reference: &str) -> Option<&Field> {
        self.field_index(reference).map(|i| &self.fields[i])
    }

    pub fn get_field_mut(&mut self, reference: &str) -> Option<&mut Field> {
        self.field_index(reference).map(move |i| &mut self.fields[i])
    }

    fn method_index(&self, signature: &str) -> Option<usize> {
        let member = member_part(&self.class, signature)?;
        self.methods.iter().position(|m| m.name_signature() == member)
    }

    /// Looks a method up by `class->name(params)return` or by `name(params)return`.
    pub fn get_method(&self, signature: &str) -> Option<&Method> {
        self.method_index(signature).map(|i| &self.methods[i])
    }

    pub fn get_method_mut(&mut self, signature: &str) -> Option<&mut Method> {
        self.method_index(signature).map(move |i| &mut self.methods[i])
    }

    /// The current buffer. Pending changes show up only after [`Unit::flush`].
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    /// Replaces the whole buffer and rebuilds the model from it. Pending
    /// changes are dropped. On error the unit is left as it was.
    pub fn set_text(&mut self, text: String) -> Result<(), SmaliError> {
        let parsed = Self::parse(text)?;
        self.replace_model(parsed);
        self.modified = true;
        Ok(())
    }

    /// Rebuilds the model from the current buffer, dropping pending changes.
    pub fn reparse(&mut self) -> Result<(), SmaliError> {
        let parsed = Self::parse(self.text.clone())?;
        self.replace_model(parsed);
        Ok(())
    }

    fn replace_model(&mut self, parsed: Unit) {
        self.text = parsed.text;
        self.class = parsed.class;
        self.modifiers = parsed.modifiers;
        self.super_class = parsed.super_class;
        self.fields = parsed.fields;
        self.methods = parsed.methods;
        self.diagnostics = parsed.diagnostics;
    }

    /// Any field or method has a change waiting for a flush.
    pub fn is_dirty(&self) -> bool {
        self.fields.iter().any(Field::is_dirty) || self.methods.iter().any(Method::is_dirty)
    }

    /// The buffer has changed since it was loaded or saved.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Writes every pending change into the buffer and returns the patched text.
    ///
    /// Field changes are planned first since removing assignments to a field
    /// dirties the methods holding them. Anchors are looked up in the
    /// current buffer and a missing one fails the whole flush, leaving both
    /// the buffer and the model untouched.
    pub fn flush(&mut self) -> Result<&str, SmaliError> {
        if !self.is_dirty() {
            return Ok(&self.text);
        }
        self.plan_and_apply().map_err(|e| SmaliError::with_context(e, self.class.clone()))?;
        Ok(&self.text)
    }

    fn plan_and_apply(&mut self) -> Result<(), SmaliError> {
        let mut edits = EditList::new();
        let mut bodies: Vec<Option<String>> = vec![None; self.methods.len()];
        let mut declarations: Vec<Option<String>> = vec![None; self.fields.len()];

        for (i, field) in self.fields.iter().enumerate().filter(|(_, f)| f.is_dirty()) {
            if let PendingValue::CompositeLiteral(values) = field.pending() {
                let clinit = self
                    .methods
                    .iter()
                    .position(Method::is_static_initializer)
                    .ok_or_else(|| err!(NoStaticInitializer, "{} needs {} to hold its value", field, STATIC_INITIALIZER))?;
                let body = bodies[clinit].as_deref().unwrap_or(self.methods[clinit].body());
                let body = inject_string_array(body, values.as_slice(), &field.reference())
                    .map_err(|e| SmaliError::with_context(e, STATIC_INITIALIZER.to_string()))?;
                bodies[clinit] = Some(body);
            }

            if field.rewrites_declaration() {
                let range = locate_line(&self.text, field.declaration())
                    .ok_or_else(|| err!(AnchorNotFound, "declaration `{}` is no longer in the text", field.declaration()))?;
                let declaration = field.declaration_text();
                edits.push(range, declaration.clone())?;
                declarations[i] = Some(declaration);
            }

            if let PendingValue::ScalarLiteral(_) = field.pending() {
                for (j, method) in self.methods.iter().enumerate() {
                    let body = bodies[j].as_deref().unwrap_or(method.body());
                    if let Some(stripped) = strip_assignments(body, field.declared_reference()) {
                        bodies[j] = Some(stripped);
                    }
                }
            }
        }

        for (j, method) in self.methods.iter().enumerate() {
            if bodies[j].is_none() && !method.is_dirty() {
                continue;
            }
            let span = locate_method(&self.text, &method.name_signature())
                .ok_or_else(|| err!(AnchorNotFound, "method {} is no longer in the text", method.name_signature()))?;
            let body = bodies[j].as_deref().unwrap_or(method.body());
            // the terminator line is copied back as is, indentation included
            let replacement = format!("{}{}", body, &self.text[span.body.end..span.terminator.end]);
            edits.push(span.body.start..span.terminator.end, replacement)?;
        }

        let text = if edits.is_empty() {
            self.text.clone()
        } else {
            edits.apply(&self.text)?
        };
        debug!("{}: applied {} edit(s)", self.class, edits.len());

        // Nothing below can fail.
        if text != self.text {
            self.modified = true;
        }
        self.text = text;
        for (field, declaration) in self.fields.iter_mut().zip(declarations) {
            if field.is_dirty() {
                field.mark_flushed(declaration);
            }
        }
        for (method, body) in self.methods.iter_mut().zip(bodies) {
            if let Some(body) = body {
                method.set_body(&body);
            }
            method.set_dirty(false);
        }
        Ok(())
    }

    /// Flushes pending changes and returns a copy of the resulting text.
    pub fn to_smali(&mut self) -> Result<String, SmaliError> {
        self.flush().map(str::to_string)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path<P: AsRef<Path>>(&mut self, path: P) {
        self.path = Some(path.as_ref().to_path_buf());
    }

    /// Moves the unit to `path`. The old file is removed on the next [`Unit::save`].
    pub fn relocate<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref().to_path_buf();
        if self.path.as_ref() == Some(&path) {
            return;
        }
        if self.origin.is_none() {
            self.origin = self.path.take();
        }
        self.path = Some(path);
        self.modified = true;
    }

    /// The path the unit was loaded from when it has been relocated since.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Writes the current buffer to `path`, creating parent directories as needed.
    pub fn write_to_file(&self, path: &Path) -> Result<(), SmaliError> {
        let context = || path.display().to_string();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| SmaliError::with_context(e.into(), context()))?;
        }
        fs::write(path, &self.text).map_err(|e| SmaliError::with_context(e.into(), context()))
    }

    /// Flushes, writes the unit to its path and removes the file it was moved from
    ///
    /// # Examples
    ///
    /// ```no_run
    ///  use std::path::Path;
    ///  use smafile::unit::Unit;
    ///
    ///  let mut u = Unit::read_from_file(Path::new("smali/com/cool/Class.smali")).expect("Uh oh, does the file exist?");
    ///  u.get_method_mut("<clinit>()V").unwrap().set_body("    .locals 0\n    return-void\n");
    ///  u.save().unwrap();
    /// ```
    pub fn save(&mut self) -> Result<(), SmaliError> {
        self.flush()?;
        let Some(path) = self.path.clone() else {
            fail!(Io, "unable to save, no path set for class {}", self.class);
        };
        self.write_to_file(&path)?;
        if let Some(origin) = self.origin.take() {
            if origin != path && origin.exists() {
                fs::remove_file(&origin).map_err(|e| SmaliError::with_context(e.into(), origin.display().to_string()))?;
            }
        }
        self.modified = false;
        Ok(())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class)
    }
}

// `class->member` or plain `member`, None when it names another class
fn member_part<'a>(class: &str, reference: &'a str) -> Option<&'a str> {
    match reference.split_once("->") {
        Some((c, member)) if c == class => Some(member),
        Some(_) => None,
        None => Some(reference),
    }
}

//! # Smafile
//!
//! A library for reading and patching Android smali files in place.
//!
//! A [`Unit`] keeps the text of one smali file and exposes its class
//! header, fields and methods. Changes made through the model are written
//! back as narrow textual edits, so comments and formatting elsewhere in the
//! file survive untouched. A [`SmaliDir`] loads a whole directory and can
//! rename a class or member everywhere it is referenced.
//!
//! ```
//!  use smafile::Unit;
//!
//!  let smali = ".class public Lcom/a/A;
//! .super Ljava/lang/Object;
//!
//! .method public static m()I
//!     .locals 1
//!     const/4 v0, 0x0
//!     return v0
//! .end method
//! ";
//!  let mut u = Unit::from_smali(smali).unwrap();
//!  u.get_method_mut("m()I").unwrap().set_body("    .locals 1\n    const/4 v0, 0x1\n    return v0\n");
//!  assert!(u.flush().unwrap().contains("const/4 v0, 0x1"));
//! ```

#[macro_use]
pub mod error;

pub mod access;
pub mod config;
pub mod descriptor;
pub mod dir;
pub mod field;
pub mod instruction;
pub mod method;
mod patch;
mod tests;
mod text;
pub mod unit;
pub mod walk;

pub use crate::config::{DirConfig, ParseOptions};
pub use crate::descriptor::{FieldRef, MethodRef, Reference};
pub use crate::dir::{RenameReport, SmaliDir, UnitFailure};
pub use crate::error::{ErrorKind, Severity, SmaliError};
pub use crate::field::{Field, FieldValue, PendingValue};
pub use crate::method::Method;
pub use crate::unit::{Diagnostic, Unit};
pub use crate::walk::find_smali_files;

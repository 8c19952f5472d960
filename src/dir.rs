use crate::config::DirConfig;
use crate::descriptor::{class_path, Reference};
use crate::error::SmaliError;
use crate::field::Field;
use crate::method::Method;
use crate::unit::Unit;
use crate::walk::find_smali_files;
use log::{info, warn};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

/// A unit that could not be loaded or rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub path: PathBuf,
    pub error: SmaliError,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// What a [`SmaliDir::rename`] touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    /// Class descriptors of the rewritten units, after the rename
    pub rewritten: Vec<String>,
    /// New paths of units whose class was renamed
    pub relocated: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
}

/// Every unit under a smali directory
///
/// Units are parsed eagerly. One that fails to parse is reported in
/// [`SmaliDir::failures`] and left out, the rest load as usual.
///
/// # Examples
///
/// ```no_run
///  use smafile::config::DirConfig;
///  use smafile::dir::SmaliDir;
///
///  let mut d = SmaliDir::open(DirConfig::new("smali").include(&["com.app"])).unwrap();
///  let report = d.rename("Lcom/app/a;", "Lcom/app/Config;").unwrap();
///  println!("{} units rewritten", report.rewritten.len());
///  d.save().unwrap();
/// ```
#[derive(Debug)]
pub struct SmaliDir {
    config: DirConfig,
    units: Vec<Unit>,
    failures: Vec<UnitFailure>,
}

impl SmaliDir {
    /// Walks `config.root` and parses every matching file.
    pub fn open(config: DirConfig) -> Result<SmaliDir, SmaliError> {
        let paths = find_smali_files(&config)?;
        let mut dir = SmaliDir::empty(config);
        for path in paths {
            let loaded = Unit::read_from_file_with(&path, &dir.config.parse);
            dir.add(path, loaded);
        }
        info!("{} units loaded from {}, {} failed", dir.units.len(), dir.config.root.display(), dir.failures.len());
        Ok(dir)
    }

    /// Builds a collection from in-memory `(path, text)` pairs.
    pub fn from_sources<I>(config: DirConfig, sources: I) -> SmaliDir
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        let mut dir = SmaliDir::empty(config);
        for (path, text) in sources {
            let loaded = Unit::from_smali_with(&text, &dir.config.parse).map(|mut u| {
                u.set_path(&path);
                u
            });
            dir.add(path, loaded);
        }
        dir
    }

    fn empty(config: DirConfig) -> SmaliDir {
        SmaliDir {
            config,
            units: vec![],
            failures: vec![],
        }
    }

    fn add(&mut self, path: PathBuf, loaded: Result<Unit, SmaliError>) {
        let loaded = loaded.and_then(|u| match self.get_unit(u.class()) {
            Some(other) => Err(err!(
                MalformedHeader,
                "class {} is already defined in {}",
                u.class(),
                other.path().unwrap_or(Path::new("")).display()
            )),
            None => Ok(u),
        });
        match loaded {
            Ok(u) => self.units.push(u),
            Err(error) => {
                warn!("skipping {}: {}", path.display(), error);
                self.failures.push(UnitFailure { path, error });
            }
        }
    }

    pub fn config(&self) -> &DirConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Unit> {
        self.units.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Unit> {
        self.units.iter_mut()
    }

    /// Puts `unit` at `index` and hands back the one it replaces.
    pub fn replace(&mut self, index: usize, unit: Unit) -> Unit {
        std::mem::replace(&mut self.units[index], unit)
    }

    /// Units that failed to load.
    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    pub fn get_unit(&self, class: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.class() == class)
    }

    pub fn get_unit_mut(&mut self, class: &str) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.class() == class)
    }

    /// e.g. `get_method("Lcom/a/A;", "a([B)Ljava/security/Key;")`
    pub fn get_method(&self, class: &str, signature: &str) -> Option<&Method> {
        self.get_unit(class)?.get_method(signature)
    }

    pub fn get_method_mut(&mut self, class: &str, signature: &str) -> Option<&mut Method> {
        self.get_unit_mut(class)?.get_method_mut(signature)
    }

    /// Looks up a field by its full `class->name:type` reference.
    pub fn get_field(&self, reference: &str) -> Option<&Field> {
        let (class, _) = reference.split_once("->")?;
        self.get_unit(class)?.get_field(reference)
    }

    pub fn get_field_mut(&mut self, reference: &str) -> Option<&mut Field> {
        let (class, _) = reference.split_once("->")?;
        self.get_unit_mut(class)?.get_field_mut(reference)
    }

    /// Every unit whose text mentions `desc`.
    pub fn xref(&self, desc: &str) -> Vec<&Unit> {
        self.units.iter().filter(|u| u.contains(desc)).collect()
    }

    /// Renames a class, field or method across every unit.
    ///
    /// Each unit is flushed first so pending changes are not lost. Inside
    /// the declaring unit a member is matched by its space-anchored token,
    /// then every occurrence of the full old reference is replaced in every
    /// unit. Each rewritten unit is parsed again. The new name must not be
    /// taken already, and a member stays in its declaring class. A renamed class moves to
    /// the path matching its new descriptor. Units that fail are reported
    /// and left untouched.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<RenameReport, SmaliError> {
        let old = Reference::parse(old)?;
        let new = Reference::parse(new)?;
        if !old.same_kind(&new) {
            fail!(InvalidReference, "cannot rename {} to {}, they are not the same kind", old, new);
        }
        self.check_rename_target(&old, &new)?;
        let target = match &new {
            Reference::Class(c) => Some(self.config.root.join(class_path(c, &self.config.extension)?)),
            _ => None,
        };
        let anchored = old.anchored_token().zip(new.anchored_token());
        let (old_s, new_s) = (old.to_string(), new.to_string());

        let mut report = RenameReport::default();
        for unit in self.units.iter_mut() {
            let path = unit.path().map(Path::to_path_buf).unwrap_or_default();
            if let Err(error) = unit.flush() {
                warn!("{}: not renaming {}: {}", path.display(), old_s, error);
                report.failures.push(UnitFailure { path, error });
                continue;
            }

            let mut text = unit.text().to_string();
            if let Some((old_tok, new_tok)) = &anchored {
                if unit.class() == old.class() {
                    text = text.replace(old_tok.as_str(), new_tok);
                }
            }
            if text.contains(&old_s) {
                text = text.replace(&old_s, &new_s);
            }
            if text == unit.text() {
                continue;
            }

            let declaring = matches!(&old, Reference::Class(c) if c == unit.class());
            if let Err(error) = unit.set_text(text) {
                warn!("{}: rewritten text no longer parses: {}", path.display(), error);
                report.failures.push(UnitFailure { path, error });
                continue;
            }
            report.rewritten.push(unit.class().to_string());

            if let (true, Some(target)) = (declaring, &target) {
                info!("relocating {} to {}", new_s, target.display());
                unit.relocate(target);
                report.relocated.push(target.clone());
            }
        }
        Ok(report)
    }

    // A rename must not merge two declarations into one.
    fn check_rename_target(&self, old: &Reference, new: &Reference) -> Result<(), SmaliError> {
        if let Reference::Class(c) = new {
            if self.get_unit(c).is_some() {
                fail!(InvalidReference, "cannot rename {} to {}, the class already exists", old, new);
            }
            return Ok(());
        }
        if old.class() != new.class() {
            fail!(InvalidReference, "cannot move {} to another class as {}", old, new);
        }
        let new_s = new.to_string();
        let taken = self.get_unit(new.class()).is_some_and(|u| match new {
            Reference::Field(_) => u.get_field(&new_s).is_some(),
            _ => u.get_method(&new_s).is_some(),
        });
        if taken {
            fail!(InvalidReference, "cannot rename {} to {}, the member already exists", old, new);
        }
        Ok(())
    }

    /// Writes every changed unit back, moving relocated ones. Returns how many were written.
    pub fn save(&mut self) -> Result<usize, SmaliError> {
        let mut saved = 0;
        for unit in self.units.iter_mut().filter(|u| u.is_dirty() || u.is_modified()) {
            unit.save()?;
            saved += 1;
        }
        Ok(saved)
    }
}

impl Index<usize> for SmaliDir {
    type Output = Unit;

    fn index(&self, index: usize) -> &Unit {
        &self.units[index]
    }
}

impl IndexMut<usize> for SmaliDir {
    fn index_mut(&mut self, index: usize) -> &mut Unit {
        &mut self.units[index]
    }
}

impl<'a> IntoIterator for &'a SmaliDir {
    type Item = &'a Unit;
    type IntoIter = std::slice::Iter<'a, Unit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn unit(class: &str, body: &str) -> String {
        format!(".class public {}\n.super Ljava/lang/Object;\n\n{}", class, body)
    }

    fn dir() -> SmaliDir {
        let a = unit(
            "Lcom/a/A;",
            ".field public a:I\n\n.field public ab:I\n\n.method public static m()V\n    .locals 0\n    return-void\n.end method\n",
        );
        let b = unit(
            "Lcom/a/B;",
            ".method public run(Lcom/a/A;)V\n    .locals 1\n    iget v0, p1, Lcom/a/A;->a:I\n    iget v0, p1, Lcom/a/A;->ab:I\n    invoke-static {}, Lcom/a/A;->m()V\n    return-void\n.end method\n",
        );
        let broken = unit("Lcom/a/Broken;", ".method public x()V\n    return-void\n");
        SmaliDir::from_sources(
            DirConfig::new("smali"),
            vec![
                (PathBuf::from("smali/com/a/A.smali"), a),
                (PathBuf::from("smali/com/a/B.smali"), b),
                (PathBuf::from("smali/com/a/Broken.smali"), broken),
            ],
        )
    }

    #[test]
    fn failed_units_are_reported_and_excluded() {
        let d = dir();
        assert_eq!(d.len(), 2);
        assert_eq!(d.failures().len(), 1);
        assert_eq!(d.failures()[0].path, PathBuf::from("smali/com/a/Broken.smali"));
        assert_eq!(d.failures()[0].error.kind(), ErrorKind::UnterminatedMethod);
        assert!(d.get_unit("Lcom/a/Broken;").is_none());
        assert_eq!(d[1].class(), "Lcom/a/B;");
    }

    #[test]
    fn lookups() {
        let d = dir();
        assert!(d.get_method("Lcom/a/A;", "m()V").is_some());
        assert!(d.get_method("Lcom/a/B;", "m()V").is_none());
        assert_eq!(d.get_field("Lcom/a/A;->ab:I").unwrap().name(), "ab");
        assert!(d.get_field("ab:I").is_none());
        let refs: Vec<&str> = d.xref("Lcom/a/A;->m()V").into_iter().map(|u| u.class()).collect();
        assert_eq!(refs, vec!["Lcom/a/B;"]);
    }

    #[test]
    fn duplicate_classes_are_rejected() {
        let a = unit("Lcom/a/A;", "");
        let d = SmaliDir::from_sources(
            DirConfig::default(),
            vec![(PathBuf::from("A.smali"), a.clone()), (PathBuf::from("copy/A.smali"), a)],
        );
        assert_eq!(d.len(), 1);
        assert_eq!(d.failures()[0].path, PathBuf::from("copy/A.smali"));
    }

    #[test]
    fn rename_field_is_anchored() {
        let mut d = dir();
        let report = d.rename("Lcom/a/A;->a:I", "Lcom/a/A;->c:I").unwrap();
        assert_eq!(report.rewritten, vec!["Lcom/a/A;", "Lcom/a/B;"]);
        assert!(report.relocated.is_empty());

        let a = d.get_unit("Lcom/a/A;").unwrap();
        assert!(a.contains(".field public c:I\n"));
        assert!(a.contains(".field public ab:I\n"));
        assert!(a.get_field("c:I").is_some());
        let b = d.get_unit("Lcom/a/B;").unwrap();
        assert!(b.contains("iget v0, p1, Lcom/a/A;->c:I\n"));
        assert!(b.contains("iget v0, p1, Lcom/a/A;->ab:I\n"));
    }

    #[test]
    fn rename_class_relocates() {
        let mut d = dir();
        let report = d.rename("Lcom/a/A;", "Lcom/a/C;").unwrap();
        assert_eq!(report.relocated, vec![PathBuf::from("smali/com/a/C.smali")]);
        assert!(d.get_unit("Lcom/a/A;").is_none());
        let c = d.get_unit("Lcom/a/C;").unwrap();
        assert_eq!(c.path(), Some(Path::new("smali/com/a/C.smali")));
        assert_eq!(c.origin(), Some(Path::new("smali/com/a/A.smali")));
        assert!(c.get_method("Lcom/a/C;->m()V").is_some());
        let b = d.get_unit("Lcom/a/B;").unwrap();
        assert!(b.contains("invoke-static {}, Lcom/a/C;->m()V"));
        assert_eq!(b.methods()[0].params(), &["Lcom/a/C;"]);
    }

    #[test]
    fn rename_keeps_pending_changes() {
        let mut d = dir();
        d.get_method_mut("Lcom/a/A;", "m()V")
            .unwrap()
            .set_body("    .locals 0\n    nop\n    return-void\n");
        d.rename("Lcom/a/A;->ab:I", "Lcom/a/A;->abc:I").unwrap();
        let a = d.get_unit("Lcom/a/A;").unwrap();
        assert!(a.contains("    nop\n"));
        assert!(!a.is_dirty());
    }

    #[test]
    fn rename_needs_same_kind() {
        let mut d = dir();
        let e = d.rename("Lcom/a/A;", "Lcom/a/A;->c:I").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidReference);
        let e = d.rename("com.a.A", "Lcom/a/C;").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidReference);
    }

    #[test]
    fn rename_refuses_existing_target() {
        let mut d = dir();
        let before: Vec<String> = d.iter().map(|u| u.text().to_string()).collect();

        let e = d.rename("Lcom/a/A;", "Lcom/a/B;").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidReference);
        let e = d.rename("Lcom/a/A;->a:I", "Lcom/a/A;->ab:I").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidReference);
        let e = d.rename("Lcom/a/A;->m()V", "Lcom/a/A;->m()V").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidReference);

        let after: Vec<String> = d.iter().map(|u| u.text().to_string()).collect();
        assert_eq!(before, after);
        assert_eq!(d.get_unit("Lcom/a/B;").unwrap().class(), "Lcom/a/B;");
    }

    #[test]
    fn rename_keeps_members_in_their_class() {
        let mut d = dir();
        let e = d.rename("Lcom/a/A;->a:I", "Lcom/a/B;->a:I").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidReference);
        let e = d.rename("Lcom/a/A;->m()V", "Lcom/a/C;->m()V").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidReference);
        assert!(d.get_field("Lcom/a/A;->a:I").is_some());
        assert!(d.get_unit("Lcom/a/B;").unwrap().contains("iget v0, p1, Lcom/a/A;->a:I\n"));
    }
}

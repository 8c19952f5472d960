use crate::config::DirConfig;
use crate::error::SmaliError;
use std::path::{Path, PathBuf};

/// Include/exclude keyword filter over paths relative to the root.
///
/// A `.` in a keyword stands for a path separator, so `com.app` matches
/// `com/app/Main.smali`. Matching is a plain case-sensitive substring test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        let norm = |k: &S| k.as_ref().replace('.', "/");
        PathFilter {
            include: include.iter().map(norm).collect(),
            exclude: exclude.iter().map(norm).collect(),
        }
    }

    pub fn from_config(config: &DirConfig) -> Self {
        Self::new(config.include.as_slice(), config.exclude.as_slice())
    }

    /// `rel` uses `/` separators.
    pub fn matches(&self, rel: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|k| rel.contains(k.as_str())) {
            return false;
        }
        !self.exclude.iter().any(|k| rel.contains(k.as_str()))
    }
}

/// Recurses `config.root` and returns every file with the configured
/// extension that passes the filters, sorted
///
/// # Examples
///
/// ```no_run
///  use smafile::config::DirConfig;
///  use smafile::walk::find_smali_files;
///
///  let files = find_smali_files(&DirConfig::new("smali").exclude(&["android"])).unwrap();
///  println!("{:} smali files found.", files.len());
/// ```
pub fn find_smali_files(config: &DirConfig) -> Result<Vec<PathBuf>, SmaliError> {
    let filter = PathFilter::from_config(config);
    let mut results = vec![];
    visit(&config.root, &config.root, &config.extension, &filter, &mut results)?;
    results.sort();
    Ok(results)
}

fn visit(root: &Path, dir: &Path, extension: &str, filter: &PathFilter, results: &mut Vec<PathBuf>) -> Result<(), SmaliError> {
    let entries = dir
        .read_dir()
        .map_err(|e| SmaliError::with_context(e.into(), dir.display().to_string()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            visit(root, &path, extension, filter, results)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let rel = relative(root, &path);
        if filter.matches(&rel) {
            results.push(path);
        }
    }
    Ok(())
}

/// `path` relative to `root` with `/` separators.
pub(crate) fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

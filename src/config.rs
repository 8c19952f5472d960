use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a unit's text is prepared before it is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Drop `.line N` directives at load time. Off by default since the
    /// buffer then no longer round-trips byte for byte.
    pub strip_line_directives: bool,
}

/// Settings for loading a directory of smali files
///
/// # Examples
///
/// ```
///  use smafile::config::DirConfig;
///
///  let c = DirConfig::new("out/smali").include(&["com.app"]).exclude(&["android"]);
///  assert_eq!(c.extension, "smali");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirConfig {
    pub root: PathBuf,
    /// Keywords a path must contain, `.` stands for `/`
    pub include: Vec<String>,
    /// Keywords that reject a path
    pub exclude: Vec<String>,
    pub extension: String,
    pub parse: ParseOptions,
}

impl Default for DirConfig {
    fn default() -> Self {
        DirConfig {
            root: PathBuf::new(),
            include: vec![],
            exclude: vec![],
            extension: "smali".to_string(),
            parse: ParseOptions::default(),
        }
    }
}

impl DirConfig {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirConfig {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn include<S: AsRef<str>>(mut self, keywords: &[S]) -> Self {
        self.include = keywords.iter().map(|k| k.as_ref().to_string()).collect();
        self
    }

    pub fn exclude<S: AsRef<str>>(mut self, keywords: &[S]) -> Self {
        self.exclude = keywords.iter().map(|k| k.as_ref().to_string()).collect();
        self
    }

    pub fn extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn strip_line_directives(mut self, strip: bool) -> Self {
        self.parse.strip_line_directives = strip;
        self
    }
}

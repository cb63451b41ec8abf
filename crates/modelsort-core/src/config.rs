use crate::executor::ExecutionMode;
use crate::plan::PLAN_FILE_NAME;
use crate::scanner::FileRole;
use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Recognized 3D model formats. The table, not individual call sites, is the
/// configurable surface: overriding `model_extensions` replaces this list.
const MODEL_EXTENSIONS: &[&str] = &[
    "stl", "obj", "ply", "3mf", "amf", "dae", "fbx", "blend", "max", "c4d", "ma", "mb", "step",
    "stp", "iges", "igs", "x3d", "wrl", "3ds", "lwo", "off", "gcode",
];

/// Extensions classified as supporting assets (textures, previews, docs).
/// Anything in neither table is recorded as `Unknown` and treated like a
/// supporting file for grouping purposes.
const SUPPORT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff", "txt", "md", "pdf", "html", "json",
    "xml", "csv", "zip", "ini", "lys", "chitubox",
];

/// Filenames skipped entirely during scanning (case-insensitive).
const IGNORE_FILES: &[&str] = &["thumbs.db", "desktop.ini", ".ds_store", "datapackage.json"];

/// Trailing qualifiers stripped when inferring a model's base name.
/// Glob patterns matched against the tail of the file stem.
const STRIP_RULES: &[&str] = &["_v[0-9]*", "-v[0-9]*", "_[0-9]*", "-[0-9]*", "([0-9]*)"];

/// Directories that must never contain a planned target, no matter what
/// `trust_mode` says.
const PROTECTED_PATHS: &[&str] = &[
    "/",
    "/bin",
    "/boot",
    "/dev",
    "/etc",
    "/home",
    "/lib",
    "/lib64",
    "/opt",
    "/proc",
    "/root",
    "/sbin",
    "/sys",
    "/usr",
    "/var",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
    "C:\\ProgramData",
    "C:\\$Recycle.Bin",
    "C:\\System Volume Information",
];

/// Fully resolved configuration handed to the core by the CLI layer.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub root: PathBuf,
    pub mode: ExecutionMode,
    pub trust_mode: bool,
    pub extension_table: HashMap<String, FileRole>,
    pub strip_rules: Vec<String>,
    pub ignore_files: HashSet<String>,
    pub protected_paths: Vec<PathBuf>,
}

impl RunConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut extension_table = HashMap::new();
        for ext in MODEL_EXTENSIONS {
            extension_table.insert((*ext).to_string(), FileRole::Model);
        }
        for ext in SUPPORT_EXTENSIONS {
            extension_table.insert((*ext).to_string(), FileRole::Support);
        }

        let mut ignore_files: HashSet<String> =
            IGNORE_FILES.iter().map(|f| (*f).to_string()).collect();
        ignore_files.insert(PLAN_FILE_NAME.to_string());

        Self {
            root: root.into(),
            mode: ExecutionMode::DryRun,
            trust_mode: false,
            extension_table,
            strip_rules: STRIP_RULES.iter().map(|r| (*r).to_string()).collect(),
            ignore_files,
            protected_paths: PROTECTED_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_trust(mut self, trust: bool) -> Self {
        self.trust_mode = trust;
        self
    }

    pub fn classify(&self, extension: &str) -> FileRole {
        self.extension_table
            .get(extension)
            .copied()
            .unwrap_or(FileRole::Unknown)
    }

    pub fn is_ignored(&self, file_name: &str) -> bool {
        self.ignore_files.contains(&file_name.to_lowercase())
    }

    /// Layer optional `Modelsort.toml` overrides on top of the defaults.
    pub fn apply_overrides(&mut self, overrides: FileOverrides) {
        if let Some(exts) = overrides.model_extensions {
            self.extension_table
                .retain(|_, role| *role != FileRole::Model);
            for ext in exts {
                self.extension_table
                    .insert(ext.to_lowercase(), FileRole::Model);
            }
        }
        if let Some(exts) = overrides.support_extensions {
            self.extension_table
                .retain(|_, role| *role != FileRole::Support);
            for ext in exts {
                self.extension_table
                    .insert(ext.to_lowercase(), FileRole::Support);
            }
        }
        if let Some(rules) = overrides.strip_rules {
            self.strip_rules = rules;
        }
        if let Some(files) = overrides.ignore_files {
            self.ignore_files = files.into_iter().map(|f| f.to_lowercase()).collect();
            self.ignore_files.insert(PLAN_FILE_NAME.to_string());
        }
        if let Some(paths) = overrides.protected_paths {
            self.protected_paths
                .extend(paths.into_iter().map(PathBuf::from));
        }
    }
}

/// Optional overrides read from `Modelsort.toml`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileOverrides {
    pub model_extensions: Option<Vec<String>>,
    pub support_extensions: Option<Vec<String>>,
    pub strip_rules: Option<Vec<String>>,
    pub ignore_files: Option<Vec<String>>,
    pub protected_paths: Option<Vec<String>>,
}

pub fn load_overrides() -> Result<FileOverrides, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Modelsort").required(false))
        .build()?;
    builder.try_deserialize::<FileOverrides>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_classifies_common_formats() {
        let config = RunConfig::new("/tmp/models");
        assert_eq!(config.classify("stl"), FileRole::Model);
        assert_eq!(config.classify("3mf"), FileRole::Model);
        assert_eq!(config.classify("jpg"), FileRole::Support);
        assert_eq!(config.classify("xyz"), FileRole::Unknown);
    }

    #[test]
    fn plan_file_is_always_ignored() {
        let config = RunConfig::new("/tmp/models");
        assert!(config.is_ignored(PLAN_FILE_NAME));
        assert!(config.is_ignored("Thumbs.db"));
        assert!(!config.is_ignored("dragon.stl"));
    }

    #[test]
    fn overrides_replace_model_table() {
        let mut config = RunConfig::new("/tmp/models");
        config.apply_overrides(FileOverrides {
            model_extensions: Some(vec!["stl".to_string()]),
            ..Default::default()
        });
        assert_eq!(config.classify("stl"), FileRole::Model);
        assert_eq!(config.classify("obj"), FileRole::Unknown);
        assert_eq!(config.classify("jpg"), FileRole::Support);
    }
}

//! pysweep core analysis engine.
//! Scans Python sources for common security mistakes by combining a
//! line-oriented regex tier with a tree-sitter AST tier.

use std::{
    fs,
    path::{Path, PathBuf},
};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

pub mod checks;
pub mod tree;

pub use tree::SyntaxTree;

/// Severity levels, highest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        };
        f.write_str(name)
    }
}

/// Vulnerability categories, in catalogue registration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    #[serde(rename = "SQL Injection")]
    SqlInjection,
    #[serde(rename = "Hardcoded Secrets")]
    HardcodedSecrets,
    #[serde(rename = "Input Validation")]
    InputValidation,
    #[serde(rename = "Password Storage")]
    PasswordStorage,
    #[serde(rename = "Dangerous Functions")]
    DangerousFunctions,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::SqlInjection => "SQL Injection",
            Category::HardcodedSecrets => "Hardcoded Secrets",
            Category::InputValidation => "Input Validation",
            Category::PasswordStorage => "Password Storage",
            Category::DangerousFunctions => "Dangerous Functions",
        };
        f.write_str(name)
    }
}

/// One reported potential vulnerability. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub category: Category,
    pub file: String,
    pub line: usize,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
}

/// Scanner errors. Only `PathNotFound` is fatal; the rest are per-file.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("syntax error in {path}: {detail}")]
    SyntaxParse { path: String, detail: String },
}

/// Top-level configuration for the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extensions: Vec<String>,
    pub ignore_globs: Vec<String>,
    pub allowlist_markers: Vec<String>,
    pub validation_keywords: Vec<String>,
    pub validation_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: vec!["py".into()],
            ignore_globs: vec![
                "**/.git/**".into(),
                "**/__pycache__/**".into(),
                "**/.venv/**".into(),
                "**/venv/**".into(),
                "**/node_modules/**".into(),
            ],
            allowlist_markers: vec!["example".into(), "placeholder".into(), "todo".into()],
            validation_keywords: vec![
                "validate".into(),
                "check".into(),
                "sanitize".into(),
                "regex".into(),
            ],
            validation_window: 3,
        }
    }
}

impl Config {
    /// Load from a YAML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
            let cfg: Config = serde_yaml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
            Ok(cfg)
        } else {
            Ok(Config::default())
        }
    }

    /// Build the traversal ignore matcher from `ignore_globs`.
    pub fn ignore_set(&self) -> anyhow::Result<Option<GlobSet>> {
        if self.ignore_globs.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_globs {
            let glob = Glob::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid ignore glob `{pattern}`: {e}"))?;
            builder.add(glob);
        }
        Ok(Some(builder.build()?))
    }

    /// Whether a path's extension marks it as a scannable source file.
    pub fn is_eligible(&self, path: &Path) -> bool {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| e == &ext)
            }
            None => false,
        }
    }
}

/// Case-insensitive substring automata consulted by check suppression logic.
pub struct SuppressionTables {
    pub allowlist: AhoCorasick,
    pub validation: AhoCorasick,
    pub strong_kdf: AhoCorasick,
    pub window: usize,
}

/// Per-file input handed to every check procedure.
pub struct ScanContext<'a> {
    pub text: &'a str,
    pub lines: Vec<&'a str>,
    pub tree: Option<&'a SyntaxTree>,
    pub path: &'a str,
    pub suppress: &'a SuppressionTables,
}

/// A check procedure: pure function from (text, tree, path) to findings.
pub type CheckFn = fn(&ScanContext) -> Vec<Finding>;

/// The fixed rule catalogue, executed in registration order. Rules are
/// independent; none observes another's output.
pub const CATALOGUE: &[(Category, CheckFn)] = &[
    (Category::SqlInjection, checks::sql_injection),
    (Category::HardcodedSecrets, checks::hardcoded_secrets),
    (Category::InputValidation, checks::input_validation),
    (Category::PasswordStorage, checks::password_storage),
    (Category::DangerousFunctions, checks::dangerous_functions),
];

/// Result of scanning one file. A parse failure does not empty the report;
/// line-tier findings survive it.
#[derive(Debug)]
pub struct FileReport {
    pub findings: Vec<Finding>,
    pub parse_error: Option<ScanError>,
}

/// Ordered accumulation of findings across one scan. No deduplication: the
/// regex and tree tiers are intentionally redundant.
#[derive(Debug, Default)]
pub struct AnalysisRun {
    findings: Vec<Finding>,
}

impl AnalysisRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch, preserving insertion order.
    pub fn record(&mut self, batch: Vec<Finding>) {
        self.findings.extend(batch);
    }

    pub fn all(&self) -> &[Finding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Analyzer encapsulates compiled suppression automata for reuse across files.
pub struct Analyzer {
    config: Config,
    suppress: SuppressionTables,
}

impl Analyzer {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let allowlist = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(&config.allowlist_markers);
        let validation = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(&config.validation_keywords);
        let strong_kdf = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(vec!["bcrypt".to_string(), "argon2".to_string()]);
        let suppress = SuppressionTables {
            allowlist,
            validation,
            strong_kdf,
            window: config.validation_window,
        };
        Ok(Self { config, suppress })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every catalogue rule against one file's text. The tree is built
    /// once; when parsing fails the tree tier is skipped and the failure is
    /// surfaced in the report for the caller to log.
    pub fn analyze_source(&self, text: &str, path: &str) -> FileReport {
        let (tree, parse_error) = match tree::parse_python(text, path) {
            Ok(tree) => (Some(tree), None),
            Err(err) => (None, Some(err)),
        };

        let ctx = ScanContext {
            text,
            lines: text.lines().collect(),
            tree: tree.as_ref(),
            path,
            suppress: &self.suppress,
        };

        let mut findings = Vec::new();
        for (_, check) in CATALOGUE {
            findings.extend(check(&ctx));
        }

        FileReport {
            findings,
            parse_error,
        }
    }
}

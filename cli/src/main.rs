//! pysweep command-line entry point: file discovery, report printing, and
//! exit-status policy around the core engine.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
};

use clap::{ArgAction, Parser};
use console::style;
use globset::GlobSet;
use pysweep_core::{Analyzer, AnalysisRun, Category, Config, Finding, ScanError, Severity};
use walkdir::WalkDir;

#[derive(Debug, Parser)]
#[command(name = "pysweep", about = "Scan Python sources for common security mistakes.")]
struct Args {
    /// Path to config file (YAML). Defaults are used if absent.
    #[arg(long, default_value = "pysweep.yml")]
    config: PathBuf,

    /// Emit JSON output for automation.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Suppress per-file progress lines.
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,

    /// File or directory to scan.
    #[arg(value_name = "PATH", default_value = ".")]
    path: PathBuf,

    /// Report only these categories (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "CAT[,CAT]")]
    only: Vec<String>,

    /// Drop these categories from the report (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "CAT[,CAT]")]
    disable: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    let cfg = Config::load(&args.config)?;
    let analyzer = Analyzer::new(cfg.clone())?;

    // A bad top-level path is the one fatal condition; everything after this
    // point degrades per file.
    if !args.path.exists() {
        eprintln!(
            "{} {}",
            style("error:").red().bold(),
            ScanError::PathNotFound(args.path.clone())
        );
        process::exit(2);
    }

    let ignore = cfg.ignore_set()?;
    let mut files = collect_files(&args.path, &cfg, ignore.as_ref())?;
    files.sort();

    let cwd = env::current_dir()?;
    let verbose = !args.quiet && !args.json;
    let scan = scan_files(&analyzer, &files, &cwd, verbose);

    let findings = filter_findings(scan.all(), &args.only, &args.disable);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
    } else {
        if verbose && !files.is_empty() {
            println!();
        }
        print_text_report(&findings);
    }

    Ok(())
}

/// Analyze each file in order, recording findings into one run. Read and
/// parse failures are reported on stderr and never abort the batch.
fn scan_files(analyzer: &Analyzer, files: &[PathBuf], cwd: &Path, verbose: bool) -> AnalysisRun {
    let mut run = AnalysisRun::new();
    for path in files {
        let display = display_path(path, cwd);
        if verbose {
            println!("{} {}", style("Scanning").dim(), style(&display).dim());
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) => {
                let err = ScanError::FileRead {
                    path: path.clone(),
                    source,
                };
                eprintln!("{} {err}", style("warning:").yellow().bold());
                continue;
            }
        };
        let report = analyzer.analyze_source(&content, &display);
        if let Some(err) = report.parse_error {
            eprintln!(
                "{} {err}; running line checks only",
                style("warning:").yellow().bold()
            );
        }
        run.record(report.findings);
    }
    run
}

fn collect_files(root: &Path, cfg: &Config, ignore: Option<&GlobSet>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.is_dir() {
        let mut walker = WalkDir::new(root).into_iter();
        while let Some(entry_res) = walker.next() {
            let entry = entry_res?;
            let entry_path = entry.path();
            if let Some(set) = ignore {
                if set.is_match(entry_path) {
                    if entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }
            if entry.file_type().is_file() && cfg.is_eligible(entry_path) {
                files.push(entry_path.to_path_buf());
            }
        }
    } else if root.is_file() && cfg.is_eligible(root) {
        if let Some(set) = ignore {
            if set.is_match(root) {
                return Ok(files);
            }
        }
        files.push(root.to_path_buf());
    }
    Ok(files)
}

fn display_path(path: &Path, cwd: &Path) -> String {
    let rel = pathdiff::diff_paths(path, cwd).unwrap_or_else(|| path.to_path_buf());
    rel.to_string_lossy().replace('\\', "/")
}

fn parse_category(name: &str) -> Option<Category> {
    let n = name.trim().to_lowercase();
    match n.as_str() {
        "sql-injection" | "sql" => Some(Category::SqlInjection),
        "hardcoded-secrets" | "secrets" => Some(Category::HardcodedSecrets),
        "input-validation" | "validation" => Some(Category::InputValidation),
        "password-storage" | "passwords" => Some(Category::PasswordStorage),
        "dangerous-functions" | "dangerous" => Some(Category::DangerousFunctions),
        _ => None,
    }
}

fn filter_findings(findings: &[Finding], only: &[String], disable: &[String]) -> Vec<Finding> {
    let only_set: Vec<Category> = only.iter().filter_map(|s| parse_category(s)).collect();
    let disable_set: Vec<Category> = disable.iter().filter_map(|s| parse_category(s)).collect();
    findings
        .iter()
        .filter(|f| {
            if !only_set.is_empty() {
                only_set.contains(&f.category)
            } else {
                !disable_set.contains(&f.category)
            }
        })
        .cloned()
        .collect()
}

fn paint_severity(severity: Severity) -> console::StyledObject<Severity> {
    match severity {
        Severity::Critical | Severity::High => style(severity).red().bold(),
        Severity::Medium => style(severity).yellow(),
        Severity::Low => style(severity).cyan(),
    }
}

fn print_text_report(findings: &[Finding]) {
    if findings.is_empty() {
        println!("No security issues found.");
        return;
    }
    println!("Found {} potential security issue(s):\n", findings.len());
    for finding in findings {
        println!("[{}] {}", paint_severity(finding.severity), finding.category);
        println!("File: {} (Line {})", finding.file, finding.line);
        println!("Issue: {}", finding.description);
        println!("Recommendation: {}", finding.recommendation);
        println!("{}", "-".repeat(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn collects_only_eligible_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        write(dir.path(), "a.py", "x = 1\n");
        write(dir.path(), "b.py", "y = 2\n");
        write(dir.path(), "c.py", "z = 3\n");
        write(dir.path(), "notes.txt", "password = \"hunter2\"\n");
        let files = collect_files(dir.path(), &cfg, None).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| p.extension().unwrap() == "py"));
    }

    #[test]
    fn ignored_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        fs::create_dir(dir.path().join("__pycache__")).unwrap();
        write(&dir.path().join("__pycache__"), "cached.py", "x = 1\n");
        write(dir.path(), "app.py", "x = 1\n");
        let ignore = cfg.ignore_set().unwrap();
        let files = collect_files(dir.path(), &cfg, ignore.as_ref()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("app.py"));
    }

    #[test]
    fn corrupt_file_does_not_block_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let analyzer = Analyzer::new(cfg.clone()).unwrap();
        write(dir.path(), "good1.py", "password = \"hunter2\"\n");
        write(dir.path(), "good2.py", "token = \"abc123\"\n");
        write(dir.path(), "broken.py", "def broken(:\napi_key = \"deadbeef\"\n");
        let mut files = collect_files(dir.path(), &cfg, None).unwrap();
        files.sort();
        let scan = scan_files(&analyzer, &files, dir.path(), false);
        // All three still contribute line-tier findings.
        assert_eq!(scan.len(), 3, "got: {:#?}", scan.all());
    }

    #[test]
    fn unreadable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let analyzer = Analyzer::new(cfg.clone()).unwrap();
        fs::write(dir.path().join("binary.py"), [0xff, 0xfe, 0x00, 0x01]).unwrap();
        write(dir.path(), "good.py", "password = \"hunter2\"\n");
        let mut files = collect_files(dir.path(), &cfg, None).unwrap();
        files.sort();
        let scan = scan_files(&analyzer, &files, dir.path(), false);
        assert_eq!(scan.len(), 1);
        assert_eq!(scan.all()[0].file, "good.py");
    }

    #[test]
    fn single_eligible_file_is_collected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let path = write(dir.path(), "app.py", "x = 1\n");
        let files = collect_files(&path, &cfg, None).unwrap();
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn category_filter_only_and_disable() {
        let finding = |category| Finding {
            category,
            file: "a.py".into(),
            line: 1,
            severity: Severity::High,
            description: String::new(),
            recommendation: String::new(),
        };
        let findings = vec![
            finding(Category::SqlInjection),
            finding(Category::HardcodedSecrets),
        ];
        let only = filter_findings(&findings, &["sql".into()], &[]);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].category, Category::SqlInjection);
        let disabled = filter_findings(&findings, &[], &["secrets".into()]);
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].category, Category::SqlInjection);
    }
}

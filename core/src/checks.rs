//! The five check procedures. Each is a pure function over one file's
//! (text, tree, path) triple; no state is shared between rules.
//!
//! SQL injection is detected twice on purpose: a regex tier over raw lines
//! and a tree tier over call expressions. Overlapping hits are kept.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::{tree::node_text, Category, Finding, ScanContext, Severity};

static SQL_LINE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // "..." + variable inside an execute call
        Regex::new(r#"(?:execute|executemany)\s*\(.*["']\s*\+"#).expect("static regex"),
        // variable + "..." inside an execute call
        Regex::new(r#"(?:execute|executemany)\s*\(.*\+\s*["']"#).expect("static regex"),
        // f-string query
        Regex::new(r#"(?:execute|executemany)\s*\(\s*f["']"#).expect("static regex"),
        // str.format interpolation
        Regex::new(r#"(?:execute|executemany)\s*\(.*\.format\s*\("#).expect("static regex"),
        // %-style interpolation
        Regex::new(r#"(?:execute|executemany)\s*\(.*["']\s*%"#).expect("static regex"),
    ]
});

static SECRET_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        "password",
        "api_key",
        "secret",
        "token",
        "aws_access_key_id",
        "aws_secret_access_key",
    ]
    .iter()
    .map(|key| {
        let pattern = format!(r#"(?i)\b{key}\s*=\s*["'][^"']+["']"#);
        (*key, Regex::new(&pattern).expect("static regex"))
    })
    .collect()
});

static REQUEST_ACCESS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["args", "form", "json", "values"]
        .iter()
        .map(|container| {
            let pattern = format!(r#"request\.{container}\s*\[\s*["'][^"']+["']\s*\]"#);
            Regex::new(&pattern).expect("static regex")
        })
        .collect()
});

static PASSWORD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // password variable pushed through .encode()
        Regex::new(r"(?i)\bpassword\w*\s*\.\s*encode\s*\(").expect("static regex"),
        // fast digests unfit for passwords
        Regex::new(r"hashlib\.(?:md5|sha1)\s*\(").expect("static regex"),
        // slice-reversal "encryption"
        Regex::new(r"(?i)\bpassword\w*\s*\[\s*::\s*-1\s*\]").expect("static regex"),
    ]
});

/// Bare or dotted callee names that warrant a finding on sight.
const DANGEROUS_CALLS: &[&str] = &[
    "eval",
    "exec",
    "pickle.loads",
    "marshal.loads",
    "os.system",
    "subprocess.call",
    "subprocess.Popen",
];

/// SQL Injection: regex tier over raw lines plus tree tier over `.execute`
/// calls whose argument is assembled dynamically.
pub fn sql_injection(ctx: &ScanContext) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (idx, line) in ctx.lines.iter().enumerate() {
        for regex in SQL_LINE_PATTERNS.iter() {
            if regex.is_match(line) {
                findings.push(Finding {
                    category: Category::SqlInjection,
                    file: ctx.path.to_string(),
                    line: idx + 1,
                    severity: Severity::Critical,
                    description: "SQL query assembled with string formatting".into(),
                    recommendation: "Use parameterized queries with placeholder values".into(),
                });
            }
        }
    }

    let Some(tree) = ctx.tree else {
        return findings;
    };

    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        if node.kind() == "call" {
            if let Some(line) = execute_call_with_dynamic_query(node, ctx.text) {
                findings.push(Finding {
                    category: Category::SqlInjection,
                    file: ctx.path.to_string(),
                    line,
                    severity: Severity::Critical,
                    description: "execute() called with a dynamically built query".into(),
                    recommendation: "Use parameterized queries with placeholder values".into(),
                });
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }

    findings
}

/// Returns the call's 1-based line when the callee is a member access named
/// `execute` and any argument is a concatenation or f-string interpolation.
fn execute_call_with_dynamic_query(call: Node<'_>, src: &str) -> Option<usize> {
    let function = call.child_by_field_name("function")?;
    if function.kind() != "attribute" {
        return None;
    }
    let member = function.child_by_field_name("attribute")?;
    if node_text(member, src) != "execute" {
        return None;
    }
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for arg in args.children(&mut cursor) {
        if !arg.is_named() {
            continue;
        }
        if is_dynamic_string(arg) {
            return Some(call.start_position().row + 1);
        }
    }
    None
}

fn is_dynamic_string(node: Node<'_>) -> bool {
    match node.kind() {
        "binary_operator" | "concatenated_string" => true,
        "string" => {
            let mut cursor = node.walk();
            let has_interpolation = node
                .children(&mut cursor)
                .any(|child| child.kind() == "interpolation");
            has_interpolation
        }
        _ => false,
    }
}

/// Hardcoded Secrets: one pattern per credential key, matched per line.
/// Lines carrying an allowlist marker (example/placeholder/todo) are skipped.
pub fn hardcoded_secrets(ctx: &ScanContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (idx, line) in ctx.lines.iter().enumerate() {
        if ctx.suppress.allowlist.is_match(line) {
            continue;
        }
        for (key, regex) in SECRET_PATTERNS.iter() {
            if regex.is_match(line) {
                findings.push(Finding {
                    category: Category::HardcodedSecrets,
                    file: ctx.path.to_string(),
                    line: idx + 1,
                    severity: Severity::High,
                    description: format!("Hardcoded {key} found in source"),
                    recommendation: "Load secrets from environment variables or a secrets manager"
                        .into(),
                });
            }
        }
    }
    findings
}

/// Input Validation: flags indexed access to request containers unless a
/// validation keyword appears within the configured line window around it.
pub fn input_validation(ctx: &ScanContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let window = ctx.suppress.window;
    for (idx, line) in ctx.lines.iter().enumerate() {
        for regex in REQUEST_ACCESS_PATTERNS.iter() {
            if !regex.is_match(line) {
                continue;
            }
            let lo = idx.saturating_sub(window);
            let hi = (idx + window).min(ctx.lines.len().saturating_sub(1));
            let validated = ctx.lines[lo..=hi]
                .iter()
                .any(|nearby| ctx.suppress.validation.is_match(nearby));
            if validated {
                continue;
            }
            findings.push(Finding {
                category: Category::InputValidation,
                file: ctx.path.to_string(),
                line: idx + 1,
                severity: Severity::Medium,
                description: "Request input used without apparent validation".into(),
                recommendation: "Validate and sanitize user-supplied input before use".into(),
            });
        }
    }
    findings
}

/// Password Storage: weak hashing or toy obfuscation of password material.
/// A strong KDF name on the same line voids the finding.
pub fn password_storage(ctx: &ScanContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (idx, line) in ctx.lines.iter().enumerate() {
        if ctx.suppress.strong_kdf.is_match(line) {
            continue;
        }
        for regex in PASSWORD_PATTERNS.iter() {
            if regex.is_match(line) {
                findings.push(Finding {
                    category: Category::PasswordStorage,
                    file: ctx.path.to_string(),
                    line: idx + 1,
                    severity: Severity::Critical,
                    description: "Weak password storage or hashing".into(),
                    recommendation: "Hash passwords with a slow KDF such as bcrypt or argon2"
                        .into(),
                });
            }
        }
    }
    findings
}

/// Dangerous Functions: tree tier only. Walks every call expression and
/// matches the resolved callee name against the denylist.
pub fn dangerous_functions(ctx: &ScanContext) -> Vec<Finding> {
    let Some(tree) = ctx.tree else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        if node.kind() == "call" {
            if let Some(function) = node.child_by_field_name("function") {
                if let Some(name) = resolve_callee_name(function, ctx.text) {
                    if DANGEROUS_CALLS.contains(&name.as_str()) {
                        findings.push(Finding {
                            category: Category::DangerousFunctions,
                            file: ctx.path.to_string(),
                            line: node.start_position().row + 1,
                            severity: Severity::High,
                            description: format!("Use of dangerous function `{name}`"),
                            recommendation: format!("Avoid `{name}`; prefer a safer alternative"),
                        });
                    }
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    findings
}

/// Resolves a callee to a matchable name. A member access composes
/// `base.member` only when the base is itself a bare identifier; otherwise
/// the bare member name stands in, which can misattribute a hit when an
/// unrelated object has a method named like a denylisted call. That fallback
/// is documented behavior, kept as-is.
fn resolve_callee_name(function: Node<'_>, src: &str) -> Option<String> {
    match function.kind() {
        "identifier" => Some(node_text(function, src).to_string()),
        "attribute" => {
            let member = function.child_by_field_name("attribute")?;
            let member = node_text(member, src);
            match function.child_by_field_name("object") {
                Some(base) if base.kind() == "identifier" => {
                    Some(format!("{}.{}", node_text(base, src), member))
                }
                _ => Some(member.to_string()),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Analyzer, Config};

    fn scan(text: &str) -> Vec<Finding> {
        let analyzer = Analyzer::new(Config::default()).unwrap();
        analyzer.analyze_source(text, "test.py").findings
    }

    fn count(findings: &[Finding], category: Category) -> usize {
        findings.iter().filter(|f| f.category == category).count()
    }

    #[test]
    fn qualified_name_composes_from_bare_base() {
        let findings = scan("import os\nos.system(\"ls\")\n");
        assert_eq!(count(&findings, Category::DangerousFunctions), 1);
        assert!(findings
            .iter()
            .any(|f| f.description.contains("os.system") && f.line == 2));
    }

    #[test]
    fn chained_base_falls_back_to_member_name() {
        // helpers.os.system: base is an attribute, so only `system` is
        // matched, which is not on the denylist.
        let findings = scan("helpers.os.system(\"ls\")\n");
        assert_eq!(count(&findings, Category::DangerousFunctions), 0);
    }

    #[test]
    fn chained_base_fallback_still_hits_bare_names() {
        // The fallback misattributes on purpose: any `.eval` member call on
        // a non-bare base matches the bare `eval` entry.
        let findings = scan("model.head.eval()\n");
        assert_eq!(count(&findings, Category::DangerousFunctions), 1);
    }

    #[test]
    fn execute_keyword_argument_shapes_do_not_fire_tree_tier() {
        let findings = scan("cursor.execute(query, params)\n");
        assert_eq!(count(&findings, Category::SqlInjection), 0);
    }

    #[test]
    fn format_call_matches_line_tier() {
        let findings = scan("cursor.execute(\"SELECT {}\".format(user_id))\n");
        assert!(count(&findings, Category::SqlInjection) >= 1);
    }

    #[test]
    fn secret_pattern_requires_literal_value() {
        let findings = scan("password = load_password()\n");
        assert_eq!(count(&findings, Category::HardcodedSecrets), 0);
    }

    #[test]
    fn secret_key_match_is_case_insensitive() {
        let findings = scan("PASSWORD = \"hunter2\"\n");
        assert_eq!(count(&findings, Category::HardcodedSecrets), 1);
    }

    #[test]
    fn slice_reversal_counts_as_weak_storage() {
        let findings = scan("stored = password[::-1]\n");
        assert_eq!(count(&findings, Category::PasswordStorage), 1);
    }
}

//! Tree builder: parses one Python file into a tree-sitter syntax tree.

use tree_sitter::{Node, Parser};

use crate::ScanError;

/// Parsed syntax tree for one file. Owned by that file's analysis and
/// discarded once every rule has run.
#[derive(Debug)]
pub struct SyntaxTree {
    tree: tree_sitter::Tree,
}

impl SyntaxTree {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }
}

/// Parse Python source text. Invalid syntax is a per-file error: the caller
/// logs it and runs line-tier rules only.
pub fn parse_python(text: &str, path: &str) -> Result<SyntaxTree, ScanError> {
    let mut parser = Parser::new();
    let lang = tree_sitter_python::LANGUAGE;
    parser
        .set_language(&lang.into())
        .map_err(|e| ScanError::SyntaxParse {
            path: path.to_string(),
            detail: format!("grammar unavailable: {e}"),
        })?;

    let tree = parser.parse(text, None).ok_or_else(|| ScanError::SyntaxParse {
        path: path.to_string(),
        detail: "parser produced no tree".into(),
    })?;

    if tree.root_node().has_error() {
        return Err(ScanError::SyntaxParse {
            path: path.to_string(),
            detail: "invalid syntax".into(),
        });
    }

    Ok(SyntaxTree { tree })
}

pub fn node_text<'a>(node: Node<'_>, src: &'a str) -> &'a str {
    node.utf8_text(src.as_bytes()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_python() {
        let tree = parse_python("def f():\n    return 1\n", "ok.py").unwrap();
        assert_eq!(tree.root().kind(), "module");
    }

    #[test]
    fn rejects_invalid_syntax() {
        let err = parse_python("def f(:\n", "bad.py").unwrap_err();
        match err {
            ScanError::SyntaxParse { path, .. } => assert_eq!(path, "bad.py"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

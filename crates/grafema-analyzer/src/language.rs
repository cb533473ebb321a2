//! Source language detection and tree-sitter grammar selection.

use std::path::Path;
use tree_sitter::Language;

/// Languages the analyzer parses. The extractor seam is pluggable; these
/// are the grammars wired in today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    JavaScript,
    TypeScript,
    Tsx,
}

impl SourceLanguage {
    /// Determine the language from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "js" | "jsx" | "mjs" | "cjs" => Some(SourceLanguage::JavaScript),
            "ts" | "mts" | "cts" => Some(SourceLanguage::TypeScript),
            "tsx" => Some(SourceLanguage::Tsx),
            _ => None,
        }
    }

    /// The tree-sitter grammar for this language.
    pub fn grammar(&self) -> Language {
        match self {
            SourceLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            SourceLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SourceLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLanguage::JavaScript => "javascript",
            SourceLanguage::TypeScript => "typescript",
            SourceLanguage::Tsx => "tsx",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detects_by_extension() {
        let cases = [
            ("app.js", Some(SourceLanguage::JavaScript)),
            ("app.mjs", Some(SourceLanguage::JavaScript)),
            ("app.ts", Some(SourceLanguage::TypeScript)),
            ("App.tsx", Some(SourceLanguage::Tsx)),
            ("style.css", None),
            ("Makefile", None),
        ];
        for (file, expected) in cases {
            assert_eq!(SourceLanguage::from_path(&PathBuf::from(file)), expected, "{file}");
        }
    }
}

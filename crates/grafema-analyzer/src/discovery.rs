//! Service and source-file discovery.
//!
//! Walks the analysis root gitignore-aware, detects service boundaries
//! (package.json roots), and classifies source files by language.

use crate::language::SourceLanguage;
use anyhow::Result;
use ignore::WalkBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredService {
    pub name: String,
    /// Root relative to the analysis root ("" for the top level).
    pub root: String,
    pub package_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub abs: PathBuf,
    /// Path relative to the analysis root, forward slashes.
    pub rel: String,
    pub language: SourceLanguage,
    pub service: Option<String>,
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Find services: directories holding a package.json, the root included.
/// node_modules and gitignored trees are never entered.
pub fn discover_services(root: &Path) -> Result<Vec<DiscoveredService>> {
    let mut services = Vec::new();
    let walker = WalkBuilder::new(root)
        .max_depth(Some(4))
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build();

    for entry in walker {
        let entry = entry?;
        if entry.file_name() != "package.json" {
            continue;
        }
        let dir = entry.path().parent().unwrap_or(root);
        let rel = relative(root, dir);
        let package_name = std::fs::read_to_string(entry.path())
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|pkg| pkg.get("name").and_then(|n| n.as_str()).map(String::from));
        let name = package_name.clone().unwrap_or_else(|| {
            if rel.is_empty() {
                root.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "root".to_string())
            } else {
                rel.rsplit('/').next().unwrap_or(&rel).to_string()
            }
        });
        services.push(DiscoveredService {
            name,
            root: rel,
            package_name,
        });
    }

    // Deepest roots first, so file→service attribution picks the nearest.
    services.sort_by(|a, b| b.root.len().cmp(&a.root.len()));
    Ok(services)
}

/// Enumerate analyzable source files under the root.
pub fn discover_files(root: &Path, services: &[DiscoveredService]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Some(language) = SourceLanguage::from_path(path) else {
            continue;
        };
        let rel = relative(root, path);
        let service = services
            .iter()
            .find(|s| s.root.is_empty() || rel.starts_with(&format!("{}/", s.root)))
            .map(|s| s.name.clone());
        files.push(SourceFile {
            abs: path.to_path_buf(),
            rel,
            language,
            service,
        });
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_services_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("packages/api/src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/evil")).unwrap();
        std::fs::write(root.join("package.json"), r#"{"name": "workspace"}"#).unwrap();
        std::fs::write(
            root.join("packages/api/package.json"),
            r#"{"name": "@acme/api"}"#,
        )
        .unwrap();
        std::fs::write(root.join("packages/api/src/index.ts"), "export {};").unwrap();
        std::fs::write(root.join("app.js"), "console.log(1);").unwrap();
        std::fs::write(root.join("node_modules/evil/index.js"), "boom();").unwrap();
        std::fs::write(root.join("README.md"), "# hi").unwrap();

        let services = discover_services(root).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "@acme/api");

        let files = discover_files(root, &services).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(rels, vec!["app.js", "packages/api/src/index.ts"]);
        assert_eq!(files[1].service.as_deref(), Some("@acme/api"));
        assert_eq!(files[0].service.as_deref(), Some("workspace"));
    }
}

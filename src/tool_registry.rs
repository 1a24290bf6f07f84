//! Tool registry for package lookups.
//!
//! Static metadata for every operation the server exposes. The operation
//! catalog builds its dispatch table from this list, and `tools/list`
//! follows registry order.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tool category for grouping related tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// npm registry (registry.npmjs.org)
    Npm,
    /// crates.io
    Cargo,
    /// Python Package Index (pypi.org)
    Pypi,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Cargo => "cargo",
            Self::Pypi => "pypi",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Npm => "JavaScript/TypeScript packages from the npm registry",
            Self::Cargo => "Rust crates from crates.io",
            Self::Pypi => "Python packages from PyPI",
        }
    }

    pub fn all() -> &'static [ToolCategory] {
        &[Self::Npm, Self::Cargo, Self::Pypi]
    }
}

impl FromStr for ToolCategory {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "npm" | "node" | "javascript" | "js" => Ok(Self::Npm),
            "cargo" | "crates" | "crates_io" | "rust" => Ok(Self::Cargo),
            "pypi" | "pip" | "python" => Ok(Self::Pypi),
            _ => Err(()),
        }
    }
}

/// Metadata for a single tool
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: &'static str,
    pub category: ToolCategory,
    /// Short description (1 line, <100 chars)
    pub short_desc: &'static str,
    /// Full description with usage details - sent as the tool description
    pub full_desc: &'static str,
    /// Example invocation (JSON)
    pub example: &'static str,
    /// Keywords for search
    pub keywords: &'static [&'static str],
}

/// Static registry of all tools
pub static TOOL_REGISTRY: &[ToolInfo] = &[
    // === NPM ===
    ToolInfo {
        name: "npm_details",
        category: ToolCategory::Npm,
        short_desc: "Get details for an npm package",
        full_desc: "Get detailed information about an npm package: description, latest version, \
                    license, homepage, repository, keywords, maintainers, dist-tags and the \
                    dependencies of the latest release. Scoped names (@scope/name) are supported.",
        example: r#"{"name": "left-pad"}"#,
        keywords: &["npm", "node", "package", "details", "info", "metadata", "javascript"],
    },
    ToolInfo {
        name: "npm_search",
        category: ToolCategory::Npm,
        short_desc: "Search the npm registry",
        full_desc: "Search the npm registry by free text. Returns package names, versions, \
                    descriptions and search scores. Use this when the exact package name is unknown.",
        example: r#"{"query": "date formatting", "limit": 5}"#,
        keywords: &["npm", "search", "find", "query", "javascript"],
    },
    ToolInfo {
        name: "npm_versions",
        category: ToolCategory::Npm,
        short_desc: "List published versions of an npm package",
        full_desc: "List the published versions of an npm package, newest first, with their \
                    publish dates and the current dist-tags.",
        example: r#"{"name": "react", "limit": 10}"#,
        keywords: &["npm", "versions", "releases", "history", "tags"],
    },
    // === CARGO ===
    ToolInfo {
        name: "cargo_details",
        category: ToolCategory::Cargo,
        short_desc: "Get details for a crate on crates.io",
        full_desc: "Get detailed information about a Rust crate from crates.io: description, \
                    newest and max stable version, downloads, license, repository, documentation \
                    and categories.",
        example: r#"{"name": "serde"}"#,
        keywords: &["cargo", "crate", "rust", "details", "info", "metadata"],
    },
    ToolInfo {
        name: "cargo_search",
        category: ToolCategory::Cargo,
        short_desc: "Search crates.io",
        full_desc: "Search crates.io by free text. Returns crate names, newest versions, \
                    descriptions and download counts, plus the total number of matches.",
        example: r#"{"query": "async http client", "limit": 5}"#,
        keywords: &["cargo", "crate", "rust", "search", "find"],
    },
    ToolInfo {
        name: "cargo_versions",
        category: ToolCategory::Cargo,
        short_desc: "List published versions of a crate",
        full_desc: "List the published versions of a crate, newest first, with publish dates, \
                    yanked flags, downloads and license.",
        example: r#"{"name": "tokio", "limit": 10}"#,
        keywords: &["cargo", "crate", "versions", "releases", "yanked"],
    },
    // === PYPI ===
    ToolInfo {
        name: "pypi_details",
        category: ToolCategory::Pypi,
        short_desc: "Get details for a PyPI package",
        full_desc: "Get detailed information about a Python package from PyPI: summary, latest \
                    version, license, author, required Python version, project URLs, classifiers \
                    and declared requirements.",
        example: r#"{"name": "requests"}"#,
        keywords: &["pypi", "pip", "python", "package", "details", "info"],
    },
    ToolInfo {
        name: "pypi_versions",
        category: ToolCategory::Pypi,
        short_desc: "List published versions of a PyPI package",
        full_desc: "List the published versions of a Python package, newest first, with upload \
                    dates and yanked flags.",
        example: r#"{"name": "django", "limit": 10}"#,
        keywords: &["pypi", "pip", "python", "versions", "releases"],
    },
];

/// Get all tools
pub fn all_tools() -> impl Iterator<Item = &'static ToolInfo> {
    TOOL_REGISTRY.iter()
}

/// Get tools by category
pub fn tools_in(category: ToolCategory) -> impl Iterator<Item = &'static ToolInfo> {
    TOOL_REGISTRY.iter().filter(move |t| t.category == category)
}

#[cfg(test)]
mod tests {
    use crate::tool_registry::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_names() {
        assert!(all_tools().any(|t| t.name == "npm_details"));
        assert!(!all_tools().any(|t| t.name == "nuget_details"));
    }

    #[test]
    fn test_names_unique() {
        let names: HashSet<_> = all_tools().map(|t| t.name).collect();
        assert_eq!(names.len(), TOOL_REGISTRY.len());
    }

    #[test]
    fn test_categories() {
        assert_eq!(tools_in(ToolCategory::Npm).count(), 3);
        assert_eq!(tools_in(ToolCategory::Cargo).count(), 3);
        assert_eq!(tools_in(ToolCategory::Pypi).count(), 2);
        for tool in all_tools() {
            assert!(tool.name.starts_with(tool.category.as_str()));
        }
    }

    #[test]
    fn test_category_aliases() {
        assert_eq!("crates-io".parse(), Ok(ToolCategory::Cargo));
        assert_eq!(" Python ".parse(), Ok(ToolCategory::Pypi));
        assert_eq!("nuget".parse::<ToolCategory>(), Err(()));
    }

    #[test]
    fn test_examples_are_json() {
        for tool in all_tools() {
            let parsed: serde_json::Value =
                serde_json::from_str(tool.example).expect("example is valid JSON");
            assert!(parsed.is_object(), "{} example", tool.name);
        }
    }
}

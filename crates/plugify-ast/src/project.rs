//! Module metadata from the `.csproj` next to the sources

use crate::source::ProjectInfo;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// First `*.csproj` in `root`, by file name
pub fn find_project_file(root: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csproj"))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Read project properties; a module without a project file yields defaults
pub fn read_project(root: &Path) -> Result<(ProjectInfo, Option<PathBuf>)> {
    let Some(path) = find_project_file(root) else {
        return Ok((ProjectInfo::default(), None));
    };
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read project file {}", path.display()))?;
    let info = parse_project(&text)
        .with_context(|| format!("Failed to parse project file {}", path.display()))?;
    debug!("Read project metadata from {}", path.display());
    Ok((info, Some(path)))
}

pub fn parse_project(text: &str) -> Result<ProjectInfo> {
    let doc = roxmltree::Document::parse(text)?;
    let property = |names: &[&str]| -> Option<String> {
        names.iter().find_map(|name| {
            doc.descendants()
                .find(|n| n.is_element() && n.tag_name().name() == *name)
                .and_then(|n| n.text())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
    };

    Ok(ProjectInfo {
        assembly_name: property(&["AssemblyName"]),
        version: property(&["Version", "VersionPrefix"]).map(|v| normalize_version(&v)),
        description: property(&["Description"]),
        author: property(&["Authors", "Company"]),
        website: property(&["PackageProjectUrl", "RepositoryUrl"]),
        license: property(&["PackageLicenseExpression", "Copyright"]),
    })
}

/// `1.2` -> `1.2.0`, `1.2.3.4` -> `1.2.3`; anything else is kept
pub fn normalize_version(version: &str) -> String {
    let version = version.trim();
    let parts: Vec<&str> = version.split('.').collect();
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return version.to_string();
    }
    let mut numbers: Vec<&str> = parts.into_iter().take(3).collect();
    while numbers.len() < 3 {
        numbers.push("0");
    }
    numbers.join(".")
}

/// Assembly name, else the project file stem, else the directory name
pub fn module_name(root: &Path, info: &ProjectInfo, project_file: Option<&Path>) -> String {
    if let Some(name) = &info.assembly_name {
        return name.clone();
    }
    project_file
        .and_then(|p| p.file_stem())
        .or_else(|| root.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "plugin".to_string())
}

#[cfg(test)]
mod tests {
    use crate::project::*;

    const PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
    <AssemblyName>DemoPlugin</AssemblyName>
    <Version>1.4</Version>
    <Description>Demo plugin</Description>
    <Company>Example</Company>
    <PackageLicenseExpression>MIT</PackageLicenseExpression>
  </PropertyGroup>
</Project>"#;

    #[test]
    fn test_parse_project_properties() {
        let Ok(info) = parse_project(PROJECT) else {
            panic!("project should parse");
        };
        assert_eq!(info.assembly_name.as_deref(), Some("DemoPlugin"));
        assert_eq!(info.version.as_deref(), Some("1.4.0"));
        assert_eq!(info.author.as_deref(), Some("Example"));
        assert_eq!(info.license.as_deref(), Some("MIT"));
        assert_eq!(info.website, None);
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("2"), "2.0.0");
        assert_eq!(normalize_version("1.2.3.4"), "1.2.3");
        assert_eq!(normalize_version("1.0.0-beta"), "1.0.0-beta");
    }

    #[test]
    fn test_module_name_fallbacks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("MyModule");
        fs::create_dir_all(&root)?;
        assert_eq!(module_name(&root, &ProjectInfo::default(), None), "MyModule");

        fs::write(root.join("Other.csproj"), "<Project></Project>")?;
        let (info, file) = read_project(&root)?;
        assert_eq!(module_name(&root, &info, file.as_deref()), "Other");
        Ok(())
    }

    #[test]
    fn test_invalid_project_is_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("Broken.csproj"), "<Project>")?;
        assert!(read_project(dir.path()).is_err());
        Ok(())
    }
}

//! Aggregates export-direction signatures of one module into a manifest

use crate::errors::{Diagnostic, DuplicateExportError, GenerationError, ManifestError, Severity};
use crate::manifest::{ManifestMetadata, ManifestMethod, PluginManifest};
use crate::types::CallableSignature;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

static SEMVER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?(\+[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$",
    )
    .ok()
});

/// `MAJOR.MINOR.PATCH` with optional prerelease and build suffixes
pub fn is_valid_version(version: &str) -> bool {
    SEMVER.as_ref().is_some_and(|re| re.is_match(version))
}

struct Entry {
    method: ManifestMethod,
    /// `declaring-type.method`, used in duplicate reports
    origin: String,
}

pub struct ManifestAssembler {
    module: Arc<str>,
    metadata: ManifestMetadata,
    entries: Vec<Entry>,
}

#[derive(Debug)]
pub struct AssembledManifest {
    pub manifest: PluginManifest,
    pub diagnostics: Vec<Diagnostic>,
}

impl AssembledManifest {
    /// True for the sentinel produced by a module without exports
    pub fn is_sentinel(&self) -> bool {
        self.manifest.is_empty()
    }
}

impl ManifestAssembler {
    pub fn new(module: &str) -> Self {
        ManifestAssembler {
            module: Arc::from(module),
            metadata: ManifestMetadata::default(),
            entries: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: ManifestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append in discovery order; duplicates are only reported by `finish`
    pub fn add(&mut self, signature: &CallableSignature) {
        let Some(method) = ManifestMethod::from_signature(signature) else {
            debug!(
                "Skipping import-direction callable '{}' in manifest for '{}'",
                signature.qualified_name(),
                self.module
            );
            return;
        };
        self.entries.push(Entry {
            method,
            origin: signature.qualified_name(),
        });
    }

    pub fn finish(self, name: &str, version: &str) -> Result<AssembledManifest, GenerationError> {
        if !is_valid_version(version) {
            return Err(ManifestError::InvalidManifest(format!(
                "version `{}` of module `{}` is not a MAJOR.MINOR.PATCH version",
                version, self.module
            ))
            .into());
        }

        let mut index: AHashMap<Arc<str>, usize> = AHashMap::with_capacity(self.entries.len());
        for (position, entry) in self.entries.iter().enumerate() {
            if let Some(&first) = index.get(&entry.method.name) {
                return Err(DuplicateExportError {
                    symbol: entry.method.name.to_string(),
                    first: self.entries[first].origin.clone(),
                    second: entry.origin.clone(),
                }
                .into());
            }
            index.insert(entry.method.name.clone(), position);
        }

        let mut manifest = PluginManifest::new(name, version, self.metadata);
        let mut diagnostics = Vec::new();

        if self.entries.is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                self.module.as_ref(),
                format!("no exported methods found in module `{}`", self.module),
            ));
        } else {
            manifest.methods = self.entries.into_iter().map(|e| e.method).collect();
        }

        debug!(
            "Assembled manifest '{}' with {} method(s)",
            manifest.name,
            manifest.methods.len()
        );

        Ok(AssembledManifest {
            manifest,
            diagnostics,
        })
    }
}

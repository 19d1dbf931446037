//! Per-module generation: transform, plan, assemble, emit, write
//!
//! Each module is generated in isolation. A module-level failure produces
//! no artifacts at all, and writing is two-phase (stage every file, then
//! rename with rollback) so a module never ends up half written.

use crate::emitter::{
    emit_diagnostic_class, emit_exports, emit_imports, emit_manifest_class, imports_file_name,
    DIAGNOSTIC_CLASS_FILE, EXPORTS_FILE, MANIFEST_CLASS_FILE,
};
use crate::plan::{build_plan, MarshalPlan};
use ahash::AHashMap;
use plugify_ast::source::{ModuleDecl, ProjectInfo};
use plugify_ast::{AnnotationConventions, DeclarationScanner, SignatureTransformer, TypeClassifier};
use plugify_manifest::manifest_writer::{is_unchanged, stage};
use plugify_manifest::{
    CallableError, CallableSignature, DeclarationError, DeclaringType, Diagnostic, Direction,
    DuplicateImportError, GenerationError, ManifestAssembler, ManifestMetadata, ManifestMethod,
    PluginManifest, PointerWidth, Severity,
};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_VERSION: &str = "1.0.0";

/// Cooperative cancellation shared by every module of a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub pointer_width: PointerWidth,
    pub conventions: AnnotationConventions,
    /// Overrides the module name discovered from the project
    pub name: Option<String>,
    /// Overrides the project version
    pub version: Option<String>,
    /// Takes precedence over project metadata and the built-in defaults, field by field
    pub metadata: ManifestMetadata,
    pub cancellation: CancellationToken,
    /// Cancel the remaining modules after the first failure
    pub fail_fast: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions {
            pointer_width: PointerWidth::default(),
            conventions: AnnotationConventions::default(),
            name: None,
            version: None,
            metadata: ManifestMetadata::default(),
            cancellation: CancellationToken::new(),
            fail_fast: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

#[derive(Debug)]
pub struct ModuleArtifacts {
    pub module: String,
    pub manifest: PluginManifest,
    /// Manifest document first, then C# sources
    pub files: Vec<Artifact>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ModuleArtifacts {
    pub fn is_sentinel(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }
}

/// Accepted callables of one module, in discovery order
struct Transformed {
    signatures: Vec<CallableSignature>,
    /// Parallel to `signatures`; `Some` for imports
    plans: Vec<Option<MarshalPlan>>,
    diagnostics: Vec<Diagnostic>,
}

fn project_metadata(project: &ProjectInfo) -> ManifestMetadata {
    ManifestMetadata {
        description: project.description.clone(),
        author: project.author.clone(),
        website: project.website.clone(),
        license: project.license.clone(),
        ..ManifestMetadata::default()
    }
}

fn transform_module(
    module: &ModuleDecl,
    options: &GenerationOptions,
) -> Result<Transformed, GenerationError> {
    let transformer = SignatureTransformer::new(
        TypeClassifier::new(options.pointer_width),
        options.conventions.clone(),
    );
    let mut diagnostics: Vec<Diagnostic> = module
        .parse_failures
        .iter()
        .map(|failure| {
            let err = CallableError::from(DeclarationError::Malformed {
                method: failure.subject.clone(),
                reason: failure.reason.clone(),
            });
            let subject = match &failure.location {
                Some(location) => format!("{} ({})", failure.subject, location),
                None => failure.subject.clone(),
            };
            Diagnostic::rejected_callable(&module.name, &subject, &err)
        })
        .collect();

    let mut signatures = Vec::with_capacity(module.callables.len());
    let mut plans = Vec::with_capacity(module.callables.len());
    // Import symbol -> first claimant; every import binds one slot pair per symbol
    let mut imports: AHashMap<Arc<str>, String> = AHashMap::new();

    for decl in &module.callables {
        if options.cancellation.is_cancelled() {
            return Err(GenerationError::Cancelled {
                module: module.name.clone(),
            });
        }

        let accepted = transformer.transform(&module.name, decl).and_then(|signature| {
            let plan = match signature.direction() {
                Direction::Import => Some(build_plan(&signature)?),
                Direction::Export => None,
            };
            Ok((signature, plan))
        });

        match accepted {
            Ok((signature, plan)) => {
                if signature.direction() == Direction::Import {
                    let origin = signature.qualified_name();
                    if let Some(first) = imports.get(&signature.native_symbol) {
                        return Err(DuplicateImportError {
                            symbol: signature.native_symbol.to_string(),
                            first: first.clone(),
                            second: origin,
                        }
                        .into());
                    }
                    imports.insert(signature.native_symbol.clone(), origin);
                }
                debug!(
                    "Accepted {} '{}' as '{}'",
                    signature.direction(),
                    signature.qualified_name(),
                    signature.native_symbol
                );
                signatures.push(signature);
                plans.push(plan);
            }
            Err(err) => {
                let subject = match &decl.location {
                    Some(location) => format!("{} ({})", decl.qualified_name(), location),
                    None => decl.qualified_name(),
                };
                debug!("Rejected '{}': {}", subject, err);
                diagnostics.push(Diagnostic::rejected_callable(&module.name, &subject, &err));
            }
        }
    }

    Ok(Transformed {
        signatures,
        plans,
        diagnostics,
    })
}

/// Generate every artifact of one module without touching the file system
pub fn generate_module(
    module: &ModuleDecl,
    options: &GenerationOptions,
) -> Result<ModuleArtifacts, GenerationError> {
    info!("Generating module '{}'", module.name);
    let transformed = transform_module(module, options)?;
    let mut diagnostics = transformed.diagnostics;

    let name = options.name.clone().unwrap_or_else(|| module.name.clone());
    let version = options
        .version
        .clone()
        .or_else(|| module.project.version.clone())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let metadata = options
        .metadata
        .clone()
        .or(project_metadata(&module.project))
        .or(ManifestMetadata::defaults_for(&module.name));

    let mut assembler = ManifestAssembler::new(&module.name).with_metadata(metadata);
    for signature in &transformed.signatures {
        assembler.add(signature);
    }
    let assembled = assembler.finish(&name, &version)?;
    let sentinel = assembled.is_sentinel();
    let manifest = assembled.manifest;

    let mut files = Vec::new();
    if sentinel {
        let message = assembled
            .diagnostics
            .iter()
            .find(|d| d.subject.is_none())
            .map(|d| d.message.clone())
            .unwrap_or_else(|| format!("no exported methods found in module `{}`", module.name));
        files.push(Artifact {
            file_name: DIAGNOSTIC_CLASS_FILE.to_string(),
            contents: emit_diagnostic_class(&message),
        });
    } else {
        files.push(Artifact {
            file_name: manifest.file_name(),
            contents: manifest.to_document()?,
        });
        files.push(Artifact {
            file_name: MANIFEST_CLASS_FILE.to_string(),
            contents: emit_manifest_class(&manifest)?,
        });
        let exports: Vec<&CallableSignature> = transformed
            .signatures
            .iter()
            .filter(|s| s.direction() == Direction::Export)
            .collect();
        files.push(Artifact {
            file_name: EXPORTS_FILE.to_string(),
            contents: emit_exports(&exports),
        });
    }
    diagnostics.extend(assembled.diagnostics);

    // Declaring types in first-discovered order
    let mut groups: Vec<(&DeclaringType, Vec<(&CallableSignature, &MarshalPlan)>)> = Vec::new();
    for (signature, plan) in transformed.signatures.iter().zip(&transformed.plans) {
        let Some(plan) = plan else {
            continue;
        };
        match groups
            .iter_mut()
            .find(|(declaring, _)| **declaring == signature.declaring_type)
        {
            Some((_, items)) => items.push((signature, plan)),
            None => groups.push((&signature.declaring_type, vec![(signature, plan)])),
        }
    }
    for (declaring, items) in &groups {
        files.push(Artifact {
            file_name: imports_file_name(declaring),
            contents: emit_imports(declaring, items),
        });
    }

    if options.cancellation.is_cancelled() {
        return Err(GenerationError::Cancelled {
            module: module.name.clone(),
        });
    }

    debug!(
        "Module '{}' produced {} artifact(s)",
        module.name,
        files.len()
    );
    Ok(ModuleArtifacts {
        module: module.name.clone(),
        manifest,
        files,
        diagnostics,
    })
}

/// Scan a source root and generate it
pub fn generate_root(
    root: &Path,
    options: &GenerationOptions,
) -> Result<ModuleArtifacts, GenerationError> {
    let scanner = DeclarationScanner::new(options.conventions.clone());
    let module = scanner
        .scan_module(root)
        .map_err(|err| GenerationError::Discovery {
            module: root.display().to_string(),
            reason: format!("{:#}", err),
        })?;
    generate_module(&module, options)
}

/// Generate independent modules in parallel; results keep the input order
pub fn generate_all(
    roots: &[PathBuf],
    options: &GenerationOptions,
) -> Vec<(PathBuf, Result<ModuleArtifacts, GenerationError>)> {
    roots
        .par_iter()
        .map(|root| {
            let result = generate_root(root, options);
            if options.fail_fast && result.is_err() {
                options.cancellation.cancel();
            }
            (root.clone(), result)
        })
        .collect()
}

// =============================================================================
// WRITING
// =============================================================================

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to stage {}: {reason}", .path.display())]
    Stage { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}; {restored} earlier file(s) restored", .path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
        restored: usize,
    },
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    /// Generated files of an earlier run that this run no longer produces
    pub removed: Vec<PathBuf>,
    /// Write failures; they never abort the run
    pub diagnostics: Vec<Diagnostic>,
}

impl WriteReport {
    fn fail(&mut self, module: &str, err: &ArtifactError) {
        debug!("{}", err);
        self.diagnostics
            .push(Diagnostic::new(Severity::Error, module, err.to_string()));
    }
}

/// File suffixes owned by the generator inside an output directory
const GENERATED_SUFFIXES: [&str; 2] = [".g.cs", ".pplugin"];

fn is_generated_file(name: &str) -> bool {
    GENERATED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Where the previous contents of `path` wait until the whole module committed
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".orig");
    path.with_file_name(name)
}

struct Committed {
    path: PathBuf,
    backup: Option<PathBuf>,
}

/// Move `temp` over `path`, keeping the old file aside
fn commit(temp: &Path, path: &Path) -> io::Result<Committed> {
    let backup = if path.exists() {
        let backup = backup_path(path);
        fs::rename(path, &backup)?;
        Some(backup)
    } else {
        None
    };
    if let Err(err) = fs::rename(temp, path) {
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, path);
        }
        return Err(err);
    }
    Ok(Committed {
        path: path.to_path_buf(),
        backup,
    })
}

/// Put every committed target back the way it was, newest first
fn roll_back(committed: &[Committed]) {
    for entry in committed.iter().rev() {
        let restored = match &entry.backup {
            Some(backup) => fs::rename(backup, &entry.path),
            None => fs::remove_file(&entry.path),
        };
        if let Err(err) = restored {
            debug!("Could not restore {:?}: {}", entry.path, err);
        }
    }
}

/// Delete generated files in `out_dir` that are not part of `keep`
fn remove_stale(out_dir: &Path, keep: &[&str], module: &str, report: &mut WriteReport) {
    let entries = match fs::read_dir(out_dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("Could not list {:?}: {}", out_dir, err);
            return;
        }
    };
    let mut stale: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| is_generated_file(name) && !keep.contains(&name))
        })
        .collect();
    stale.sort();

    for path in stale {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed stale {:?}", path);
                report.removed.push(path);
            }
            Err(err) => report.diagnostics.push(Diagnostic::new(
                Severity::Warning,
                module,
                format!("failed to remove stale {}: {}", path.display(), err),
            )),
        }
    }
}

/// Write a module's artifacts under `out_dir`, skipping identical files
///
/// Either every changed file is committed or none is: a failed rename rolls
/// back the files renamed before it. After a full commit, generated files of
/// earlier runs that are no longer produced are removed.
pub fn write_artifacts(artifacts: &ModuleArtifacts, out_dir: &Path) -> WriteReport {
    let module = artifacts.module.as_str();
    let mut report = WriteReport::default();
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();

    for artifact in &artifacts.files {
        let path = out_dir.join(&artifact.file_name);
        if is_unchanged(&path, artifact.contents.as_bytes()) {
            debug!("Unchanged, skipping write: {:?}", path);
            report.unchanged.push(path);
            continue;
        }
        match stage(&path, artifact.contents.as_bytes()) {
            Ok(temp) => staged.push((temp, path)),
            Err(err) => {
                report.fail(
                    module,
                    &ArtifactError::Stage {
                        path,
                        reason: format!("{:#}", err),
                    },
                );
                for (temp, _) in &staged {
                    let _ = fs::remove_file(temp);
                }
                return report;
            }
        }
    }

    let mut committed: Vec<Committed> = Vec::with_capacity(staged.len());
    for (position, (temp, path)) in staged.iter().enumerate() {
        match commit(temp, path) {
            Ok(entry) => committed.push(entry),
            Err(source) => {
                for (temp, _) in &staged[position..] {
                    let _ = fs::remove_file(temp);
                }
                roll_back(&committed);
                report.fail(
                    module,
                    &ArtifactError::Commit {
                        path: path.clone(),
                        source,
                        restored: committed.len(),
                    },
                );
                return report;
            }
        }
    }

    for entry in committed {
        if let Some(backup) = &entry.backup {
            let _ = fs::remove_file(backup);
        }
        debug!("Wrote {:?}", entry.path);
        report.written.push(entry.path);
    }

    let keep: Vec<&str> = artifacts.files.iter().map(|f| f.file_name.as_str()).collect();
    remove_stale(out_dir, &keep, module, &mut report);
    report
}

// =============================================================================
// INSPECTION
// =============================================================================

#[derive(Debug, Serialize)]
pub struct DiagnosticView {
    pub severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

impl From<&Diagnostic> for DiagnosticView {
    fn from(diagnostic: &Diagnostic) -> Self {
        DiagnosticView {
            severity: diagnostic.severity.as_str(),
            subject: diagnostic.subject.clone(),
            message: diagnostic.message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CallableView {
    pub declaration: String,
    pub direction: &'static str,
    pub native_symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_entry: Option<ManifestMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<MarshalPlan>,
}

#[derive(Debug, Serialize)]
pub struct ModuleView {
    pub module: String,
    pub root: PathBuf,
    pub callables: Vec<CallableView>,
    pub diagnostics: Vec<DiagnosticView>,
}

/// Signatures and plans of a module, without emitting anything
pub fn inspect_module(
    module: &ModuleDecl,
    options: &GenerationOptions,
) -> Result<ModuleView, GenerationError> {
    let transformed = transform_module(module, options)?;
    let callables = transformed
        .signatures
        .iter()
        .zip(transformed.plans)
        .map(|(signature, plan)| CallableView {
            declaration: signature.qualified_name(),
            direction: signature.direction().as_str(),
            native_symbol: signature.native_symbol.to_string(),
            manifest_entry: ManifestMethod::from_signature(signature),
            plan,
        })
        .collect();
    Ok(ModuleView {
        module: module.name.clone(),
        root: module.root.clone(),
        callables,
        diagnostics: transformed.diagnostics.iter().map(DiagnosticView::from).collect(),
    })
}

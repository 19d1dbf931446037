//! Declaration discovery over C# sources using ast-grep
//!
//! A module is a directory tree of `.cs` files. Discovery runs in two phases:
//! 1. Every file is parsed once; annotated methods, delegates and enums are
//!    collected together with their namespace and enclosing types.
//! 2. Type names used by annotated methods are resolved against the module's
//!    own delegates and enums, so the classifier sees callbacks and enums as
//!    structured declarations.
pub mod parser;
pub mod types;

use crate::classifier::is_builtin_name;
use crate::naming::{find_closing, line_of, strip_comments};
use crate::project::{module_name, read_project};
use crate::source::{
    CallableDecl, DelegateDecl, EnumDecl, ModuleDecl, ParamDecl, ParseFailure, SourceLocation,
    SourceType, TypeFrameDecl,
};
use crate::transformer::AnnotationConventions;
use anyhow::{bail, Context, Result};
use ast_grep_core::matcher::KindMatcher;
use ast_grep_core::source::StrDoc;
use ast_grep_core::{AstGrep, Node};
use ast_grep_language::CSharp;
use parser::{parse_attributes, parse_enum, parse_namespace, parse_signature, parse_type_frame};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

type CsNode<'r> = Node<'r, StrDoc<CSharp>>;

const TYPE_DECLARATION_KINDS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "interface_declaration",
    "record_declaration",
    "record_struct_declaration",
];

/// Directories that never hold plugin sources; `Generated` is the default output dir
const SKIPPED_DIRS: &[&str] = &["bin", "obj", "Generated", ".git", ".vs", "node_modules"];

/// Callback declarations may reference each other; stop expanding past this
const MAX_RESOLVE_DEPTH: usize = 8;

/// Where a declaration sits: namespace plus enclosing types
#[derive(Debug, Clone, Default)]
struct Scope {
    namespace: Option<String>,
    containers: Vec<TypeFrameDecl>,
}

impl Scope {
    fn qualify(&self, name: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(ns) = &self.namespace {
            parts.push(ns);
        }
        parts.extend(self.containers.iter().map(|c| c.name.as_ref()));
        parts.push(name);
        parts.join(".")
    }
}

#[derive(Debug, Clone)]
struct RawDelegate {
    name: Arc<str>,
    qualified: Arc<str>,
    namespace: Option<String>,
    parameters: Vec<ParamDecl>,
    return_type: SourceType,
}

#[derive(Debug, Clone)]
enum RegistryEntry {
    Delegate(RawDelegate),
    Enum {
        namespace: Option<String>,
        decl: Arc<EnumDecl>,
    },
}

impl RegistryEntry {
    fn qualified(&self) -> &str {
        match self {
            RegistryEntry::Delegate(d) => &d.qualified,
            RegistryEntry::Enum { decl, .. } => &decl.qualified_name,
        }
    }

    fn namespace(&self) -> Option<&str> {
        match self {
            RegistryEntry::Delegate(d) => d.namespace.as_deref(),
            RegistryEntry::Enum { namespace, .. } => namespace.as_deref(),
        }
    }
}

/// Delegates and enums declared anywhere in the module
#[derive(Debug, Default)]
struct TypeRegistry {
    entries: Vec<RegistryEntry>,
    by_simple_name: HashMap<String, Vec<usize>>,
}

impl TypeRegistry {
    fn insert(&mut self, simple: &str, entry: RegistryEntry) {
        let index = self.entries.len();
        self.entries.push(entry);
        self.by_simple_name
            .entry(simple.to_string())
            .or_default()
            .push(index);
    }

    /// Exact qualified match first, then the candidate closest to `namespace`
    fn lookup(&self, name: &str, namespace: Option<&str>) -> Option<&RegistryEntry> {
        let simple = name.rsplit('.').next().unwrap_or(name);
        let suffix = format!(".{}", name);
        let candidates: Vec<&RegistryEntry> = self
            .by_simple_name
            .get(simple)?
            .iter()
            .filter_map(|&i| self.entries.get(i))
            .filter(|e| e.qualified() == name || e.qualified().ends_with(&suffix))
            .collect();

        if let Some(exact) = candidates.iter().copied().find(|e| e.qualified() == name) {
            return Some(exact);
        }
        if let Some(same) = candidates.iter().copied().find(|e| e.namespace() == namespace) {
            return Some(same);
        }
        if let Some(ns) = namespace {
            let enclosing = candidates.iter().copied().find(|e| {
                e.namespace()
                    .is_some_and(|candidate| ns.starts_with(&format!("{}.", candidate)))
            });
            if let Some(entry) = enclosing {
                return Some(entry);
            }
        }
        candidates.first().copied()
    }

    fn resolve(&self, ty: SourceType, namespace: Option<&str>, depth: usize) -> SourceType {
        match ty {
            SourceType::Named(name) if depth < MAX_RESOLVE_DEPTH && !is_builtin_name(&name) => {
                match self.lookup(&name, namespace) {
                    Some(RegistryEntry::Delegate(raw)) => {
                        SourceType::Delegate(Arc::new(self.resolve_delegate(raw, depth + 1)))
                    }
                    Some(RegistryEntry::Enum { decl, .. }) => SourceType::Enum(decl.clone()),
                    None => SourceType::Named(name),
                }
            }
            SourceType::Array(inner) => {
                SourceType::Array(Box::new(self.resolve(*inner, namespace, depth)))
            }
            SourceType::MultiArray(inner, rank) => {
                SourceType::MultiArray(Box::new(self.resolve(*inner, namespace, depth)), rank)
            }
            SourceType::Pointer(inner) => {
                SourceType::Pointer(Box::new(self.resolve(*inner, namespace, depth)))
            }
            SourceType::Nullable(inner) => {
                SourceType::Nullable(Box::new(self.resolve(*inner, namespace, depth)))
            }
            SourceType::Generic { name, args } => SourceType::Generic {
                name,
                args: args
                    .into_iter()
                    .map(|a| self.resolve(a, namespace, depth))
                    .collect(),
            },
            SourceType::Tuple(items) => SourceType::Tuple(
                items
                    .into_iter()
                    .map(|a| self.resolve(a, namespace, depth))
                    .collect(),
            ),
            other => other,
        }
    }

    fn resolve_delegate(&self, raw: &RawDelegate, depth: usize) -> DelegateDecl {
        let namespace = raw.namespace.as_deref();
        DelegateDecl {
            name: raw.name.clone(),
            qualified_name: raw.qualified.clone(),
            parameters: raw
                .parameters
                .iter()
                .map(|p| ParamDecl {
                    ty: self.resolve(p.ty.clone(), namespace, depth),
                    ..p.clone()
                })
                .collect(),
            return_type: self.resolve(raw.return_type.clone(), namespace, depth),
        }
    }
}

/// Everything one file contributes before resolution
#[derive(Debug, Default)]
struct FileScan {
    callables: Vec<CallableDecl>,
    failures: Vec<ParseFailure>,
}

pub struct DeclarationScanner {
    conventions: AnnotationConventions,
}

impl DeclarationScanner {
    pub fn new(conventions: AnnotationConventions) -> Self {
        DeclarationScanner { conventions }
    }

    /// All `.cs` sources under `root` in a stable order, generated files excluded
    pub fn source_files(root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(DirEntry::into_path)
            .filter(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                name.ends_with(".cs") && !name.ends_with(".g.cs")
            })
            .collect()
    }

    pub fn scan_module(&self, root: &Path) -> Result<ModuleDecl> {
        if !root.is_dir() {
            bail!("Source directory not found: {}", root.display());
        }
        let start = Instant::now();
        let (project, project_file) = read_project(root)?;
        let name = module_name(root, &project, project_file.as_deref());

        let files = Self::source_files(root);
        debug!("Scanning {} source file(s) of module `{}`", files.len(), name);

        let mut registry = TypeRegistry::default();
        let mut scans = Vec::with_capacity(files.len());
        for path in &files {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read source file {}", path.display()))?;
            let relative = path.strip_prefix(root).unwrap_or(path);
            scans.push(self.scan_file(relative, &content, &mut registry));
        }

        let mut callables = Vec::new();
        let mut parse_failures = Vec::new();
        for scan in scans {
            for mut callable in scan.callables {
                let namespace = callable.namespace.clone();
                let ns = namespace.as_deref();
                callable.parameters = callable
                    .parameters
                    .into_iter()
                    .map(|p| ParamDecl {
                        ty: registry.resolve(p.ty.clone(), ns, 0),
                        ..p
                    })
                    .collect();
                callable.return_type = registry.resolve(callable.return_type, ns, 0);
                callables.push(callable);
            }
            parse_failures.extend(scan.failures);
        }

        debug!(
            "Module `{}`: {} annotated callable(s), {} parse failure(s), {} declared type(s) in {:.2}ms",
            name,
            callables.len(),
            parse_failures.len(),
            registry.entries.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(ModuleDecl {
            name,
            root: root.to_path_buf(),
            project,
            callables,
            parse_failures,
        })
    }

    fn scan_file(&self, path: &Path, content: &str, registry: &mut TypeRegistry) -> FileScan {
        let text = strip_comments(content);
        let sg = AstGrep::new(text.as_str(), CSharp);
        let root = sg.root();
        let mut scanner = FileScanner::new(&root);
        let mut scan = FileScan::default();

        for node in root.find_all(KindMatcher::new("delegate_declaration", CSharp)) {
            let scope = scanner.scope_of(&node);
            match parse_signature(&node.text()) {
                Ok(sig) => {
                    let qualified = scope.qualify(&sig.name);
                    registry.insert(
                        &sig.name,
                        RegistryEntry::Delegate(RawDelegate {
                            name: Arc::from(sig.name.as_str()),
                            qualified: Arc::from(qualified),
                            namespace: scope.namespace,
                            parameters: sig.parameters,
                            return_type: sig.return_type,
                        }),
                    );
                }
                Err(reason) => debug!("Skipping delegate in {}: {}", path.display(), reason),
            }
        }

        for node in root.find_all(KindMatcher::new("enum_declaration", CSharp)) {
            let scope = scanner.scope_of(&node);
            match parse_enum(&node.text()) {
                Ok(parsed) => {
                    let decl = EnumDecl {
                        name: Arc::from(parsed.name.as_str()),
                        qualified_name: Arc::from(scope.qualify(&parsed.name)),
                        underlying: parsed.underlying,
                        members: parsed.members,
                        error: parsed.error,
                    };
                    registry.insert(
                        &parsed.name,
                        RegistryEntry::Enum {
                            namespace: scope.namespace,
                            decl: Arc::new(decl),
                        },
                    );
                }
                Err(reason) => debug!("Skipping enum in {}: {}", path.display(), reason),
            }
        }

        for node in root.find_all(KindMatcher::new("method_declaration", CSharp)) {
            let node_text = node.text();
            let location = SourceLocation {
                file: path.to_path_buf(),
                line: line_of(&text, node.range().start),
            };

            let attributes = match parse_attributes(&node_text) {
                Ok((attributes, _)) => attributes,
                Err(reason) => {
                    if self.mentions_annotation(&node_text) {
                        scan.failures.push(ParseFailure {
                            subject: guess_name(&node_text),
                            reason,
                            location: Some(location),
                        });
                    }
                    continue;
                }
            };
            if !self.conventions.is_annotated(&attributes) {
                continue;
            }

            let sig = match parse_signature(&node_text) {
                Ok(sig) => sig,
                Err(reason) => {
                    let scope = scanner.scope_of(&node);
                    scan.failures.push(ParseFailure {
                        subject: scope.qualify(&guess_name(&node_text)),
                        reason,
                        location: Some(location),
                    });
                    continue;
                }
            };

            let scope = scanner.scope_of(&node);
            scan.callables.push(CallableDecl {
                name: Arc::from(sig.name.as_str()),
                namespace: scope.namespace.as_deref().map(Arc::from),
                is_static: sig.has_modifier("static"),
                is_partial: sig.has_modifier("partial"),
                accessibility: sig.accessibility().map(Arc::from),
                containers: scope.containers,
                attributes: sig.attributes,
                type_parameters: sig.type_parameters,
                parameters: sig.parameters,
                return_type: sig.return_type,
                location: Some(location),
            });
        }

        scan
    }

    fn mentions_annotation(&self, text: &str) -> bool {
        text.trim_start().starts_with('[')
            && (text.contains(self.conventions.export_attribute.as_str())
                || text.contains(self.conventions.import_attribute.as_str()))
    }
}

/// Per-file scope lookup with memoized type frames
struct FileScanner {
    file_namespace: Option<String>,
    frames: HashMap<usize, Option<TypeFrameDecl>>,
}

impl FileScanner {
    fn new(root: &CsNode<'_>) -> Self {
        let file_namespace = root
            .find_all(KindMatcher::new("file_scoped_namespace_declaration", CSharp))
            .next()
            .and_then(|n| parse_namespace(&n.text()));
        FileScanner {
            file_namespace,
            frames: HashMap::new(),
        }
    }

    fn scope_of(&mut self, node: &CsNode<'_>) -> Scope {
        let mut namespaces: Vec<String> = Vec::new();
        let mut containers: Vec<TypeFrameDecl> = Vec::new();
        for ancestor in node.ancestors() {
            let kind = ancestor.kind();
            if TYPE_DECLARATION_KINDS.contains(&kind.as_ref()) {
                let frame = self
                    .frames
                    .entry(ancestor.range().start)
                    .or_insert_with(|| parse_type_frame(&ancestor.text()).ok());
                if let Some(frame) = frame {
                    containers.push(frame.clone());
                }
            } else if kind.as_ref() == "namespace_declaration" {
                if let Some(ns) = parse_namespace(&ancestor.text()) {
                    namespaces.push(ns);
                }
            }
        }
        containers.reverse();
        namespaces.reverse();

        let namespace = if namespaces.is_empty() {
            self.file_namespace.clone()
        } else {
            Some(namespaces.join("."))
        };
        Scope {
            namespace,
            containers,
        }
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name) || name.starts_with('.'))
}

/// Identifier right before the parameter list, for reporting unparsable methods
fn guess_name(text: &str) -> String {
    let mut rest = text.trim_start();
    while let Some(inner) = rest.strip_prefix('[') {
        match find_closing(inner, b'[', b']') {
            Some(close) => rest = inner[close + 1..].trim_start(),
            None => return "<unknown>".to_string(),
        }
    }
    let head = rest.find('(').map_or(rest, |i| &rest[..i]);
    head.split_whitespace()
        .last()
        .map(|w| w.split('<').next().unwrap_or(w).to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}

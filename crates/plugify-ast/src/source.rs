//! Source-level model of the declarations the scanner discovers
//!
//! These types mirror what is written in C# before any classification:
//! type spellings, parameter modifiers, attributes and literal defaults.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "kebab-case")]
pub enum SourceType {
    /// Keyword or (possibly qualified) type name
    Named(Arc<str>),
    Array(Box<SourceType>),
    /// `T[,]` and higher ranks
    MultiArray(Box<SourceType>, u8),
    Pointer(Box<SourceType>),
    /// `T?`
    Nullable(Box<SourceType>),
    Generic {
        name: Arc<str>,
        args: Vec<SourceType>,
    },
    /// Tuple syntax `(int, string)`
    Tuple(Vec<SourceType>),
    /// An open type parameter of the method or an enclosing type
    TypeParameter(Arc<str>),
    Delegate(Arc<DelegateDecl>),
    Enum(Arc<EnumDecl>),
}

impl SourceType {
    pub fn named(name: &str) -> Self {
        SourceType::Named(Arc::from(name))
    }

    pub fn array(element: SourceType) -> Self {
        SourceType::Array(Box::new(element))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, SourceType::Named(name) if name.as_ref() == "void")
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Named(name) | SourceType::TypeParameter(name) => f.write_str(name),
            SourceType::Array(element) => write!(f, "{}[]", element),
            SourceType::MultiArray(element, rank) => {
                write!(f, "{}[{}]", element, ",".repeat(rank.saturating_sub(1) as usize))
            }
            SourceType::Pointer(inner) => write!(f, "{}*", inner),
            SourceType::Nullable(inner) => write!(f, "{}?", inner),
            SourceType::Generic { name, args } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}<{}>", name, args.join(", "))
            }
            SourceType::Tuple(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", items.join(", "))
            }
            SourceType::Delegate(decl) => f.write_str(&decl.qualified_name),
            SourceType::Enum(decl) => f.write_str(&decl.qualified_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamModifier {
    #[default]
    None,
    Ref,
    Out,
    In,
    Params,
    This,
}

impl ParamModifier {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            ParamModifier::None => None,
            ParamModifier::Ref => Some("ref"),
            ParamModifier::Out => Some("out"),
            ParamModifier::In => Some("in"),
            ParamModifier::Params => Some("params"),
            ParamModifier::This => Some("this"),
        }
    }
}

/// Default-value literal as written in source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Literal {
    Bool(bool),
    Null,
    Number(Arc<str>),
    Str(Arc<str>),
    /// Any other constant expression (`default`, enum members, ...), kept verbatim
    Expr(Arc<str>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParamDecl {
    pub name: Arc<str>,
    pub ty: SourceType,
    pub modifier: ParamModifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DelegateDecl {
    pub name: Arc<str>,
    pub qualified_name: Arc<str>,
    pub parameters: Vec<ParamDecl>,
    pub return_type: SourceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnumMember {
    pub name: Arc<str>,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnumDecl {
    pub name: Arc<str>,
    pub qualified_name: Arc<str>,
    /// Declared underlying type, `int` when omitted
    pub underlying: SourceType,
    /// Declaration order
    pub members: Vec<EnumMember>,
    /// Set when a member value could not be evaluated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDecl {
    /// Simple name without namespace or `Attribute` suffix
    pub name: Arc<str>,
    /// Raw argument expressions
    pub args: Vec<Arc<str>>,
}

impl AttributeDecl {
    pub fn new(name: &str, args: Vec<Arc<str>>) -> Self {
        AttributeDecl {
            name: Arc::from(normalize_attribute_name(name)),
            args,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.as_ref() == normalize_attribute_name(name)
    }
}

/// `Plugify.NativeExportAttribute` -> `NativeExport`
pub fn normalize_attribute_name(name: &str) -> &str {
    let name = name.trim();
    let name = name.strip_prefix("global::").unwrap_or(name);
    let simple = name.rsplit('.').next().unwrap_or(name);
    match simple.strip_suffix("Attribute") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => simple,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeFrameDecl {
    pub keyword: Arc<str>,
    pub name: Arc<str>,
    pub type_parameters: Vec<Arc<str>>,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 1-based
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallableDecl {
    pub name: Arc<str>,
    pub namespace: Option<Arc<str>>,
    /// Enclosing types, outermost first
    pub containers: Vec<TypeFrameDecl>,
    pub is_static: bool,
    pub is_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<Arc<str>>,
    pub attributes: Vec<AttributeDecl>,
    pub type_parameters: Vec<Arc<str>>,
    pub parameters: Vec<ParamDecl>,
    pub return_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl CallableDecl {
    /// `Outer.Inner`
    pub fn container_path(&self) -> String {
        self.containers
            .iter()
            .map(|c| c.name.as_ref())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `Namespace.Outer.Inner.Method`
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(ns) = &self.namespace {
            parts.push(ns);
        }
        parts.extend(self.containers.iter().map(|c| c.name.as_ref()));
        parts.push(&self.name);
        parts.join(".")
    }
}

/// A declaration that looked annotated but could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    pub subject: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// Project-level metadata read from the module's `.csproj`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDecl {
    pub name: String,
    pub root: PathBuf,
    pub project: ProjectInfo,
    /// Annotated callables in discovery order
    pub callables: Vec<CallableDecl>,
    pub parse_failures: Vec<ParseFailure>,
}

#[cfg(test)]
mod tests {
    use crate::source::*;

    #[test]
    fn test_normalize_attribute_name() {
        assert_eq!(normalize_attribute_name("NativeExport"), "NativeExport");
        assert_eq!(normalize_attribute_name("NativeExportAttribute"), "NativeExport");
        assert_eq!(
            normalize_attribute_name("global::Plugify.NativeImportAttribute"),
            "NativeImport"
        );
        assert_eq!(normalize_attribute_name("Attribute"), "Attribute");
    }

    #[test]
    fn test_source_type_display() {
        let ty = SourceType::Nullable(Box::new(SourceType::array(SourceType::named("string"))));
        assert_eq!(ty.to_string(), "string[]?");
        let generic = SourceType::Generic {
            name: Arc::from("List"),
            args: vec![SourceType::named("int")],
        };
        assert_eq!(generic.to_string(), "List<int>");
        let grid = SourceType::MultiArray(Box::new(SourceType::named("int")), 2);
        assert_eq!(grid.to_string(), "int[,]");
    }
}

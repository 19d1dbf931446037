use std::fmt;
use std::io;
use thiserror::Error;

/// A type outside the closed portable taxonomy appeared in an annotated signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported type `{type_text}`{}: {reason}", context_suffix(.context.as_deref()))]
pub struct UnsupportedTypeError {
    pub type_text: String,
    pub reason: String,
    pub context: Option<String>,
}

fn context_suffix(context: Option<&str>) -> String {
    context.map(|c| format!(" in {}", c)).unwrap_or_default()
}

impl UnsupportedTypeError {
    pub fn new(type_text: impl Into<String>, reason: impl Into<String>) -> Self {
        UnsupportedTypeError {
            type_text: type_text.into(),
            reason: reason.into(),
            context: None,
        }
    }

    /// Attach where the type was found, e.g. "parameter `names` of `Combine`"
    pub fn within(mut self, context: impl Into<String>) -> Self {
        if self.context.is_none() {
            self.context = Some(context.into());
        }
        self
    }
}

/// Structural preconditions of an annotated callable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("`{method}` is not annotated for export or import")]
    NotAnnotated { method: String },

    #[error("`{method}` must be static to carry [{attribute}]")]
    NotStatic { method: String, attribute: String },

    #[error("import `{method}` must be declared partial")]
    NotPartial { method: String },

    #[error("[{attribute}] on `{method}` requires an export name argument")]
    MissingExportName { method: String, attribute: String },

    #[error("[{attribute}] on `{method}` has an empty export name")]
    EmptyExportName { method: String, attribute: String },

    #[error("`{method}` carries [{attribute}] more than once")]
    DuplicateAnnotation { method: String, attribute: String },

    #[error("`{method}` carries both export and import annotations")]
    ConflictingAnnotations { method: String },

    #[error("[{attribute}] on `{method}` takes no arguments")]
    UnexpectedArguments { method: String, attribute: String },

    #[error("import `{method}` must start with the `{marker}` marker followed by a symbol name")]
    MissingMarker { method: String, marker: String },

    #[error("generic method `{method}` cannot cross the native boundary")]
    GenericMethod { method: String },

    #[error("`{method}` is declared inside generic type `{container}`")]
    GenericContainer { method: String, container: String },

    #[error("parameter `{parameter}` of `{method}` uses unsupported modifier `{modifier}`")]
    UnsupportedModifier {
        method: String,
        parameter: String,
        modifier: String,
    },

    #[error("`{method}` is an {actual} callable, expected {expected}")]
    WrongDirection {
        method: String,
        expected: String,
        actual: String,
    },

    #[error("could not parse declaration of `{method}`: {reason}")]
    Malformed { method: String, reason: String },
}

/// Two callables in one module claim the same native symbol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("export `{symbol}` is declared by both `{first}` and `{second}`")]
pub struct DuplicateExportError {
    pub symbol: String,
    pub first: String,
    pub second: String,
}

/// Two imports in one module bind the same native symbol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("import `{symbol}` is declared by both `{first}` and `{second}`")]
pub struct DuplicateImportError {
    pub symbol: String,
    pub first: String,
    pub second: String,
}

/// Failure of a single callable; the module keeps going without it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallableError {
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

/// Errors that can occur during plugin manifest operations
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}

/// Module-level failure: nothing is emitted for the module
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    DuplicateExport(#[from] DuplicateExportError),

    #[error(transparent)]
    DuplicateImport(#[from] DuplicateImportError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("generation of module `{module}` was cancelled")]
    Cancelled { module: String },

    #[error("discovery failed for module `{module}`: {reason}")]
    Discovery { module: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal build message attached to a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub module: String,
    pub subject: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, module: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            module: module.into(),
            subject: None,
            message: message.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// A rejected callable: reported as an error, but the module still builds
    pub fn rejected_callable(module: &str, callable: &str, err: &CallableError) -> Self {
        Diagnostic::new(Severity::Error, module, err.to_string()).with_subject(callable)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "[{}] {}: {}", self.module, subject, self.message),
            None => write!(f, "[{}] {}", self.module, self.message),
        }
    }
}

//! Plugify Manifest
//!
//! Portable ABI types, callable signatures, and the JSON plugin manifest a
//! native host loads. The assembler turns export-direction signatures of one
//! module into an ordered manifest document.

pub mod assembler;
pub mod errors;
pub mod manifest;
pub mod manifest_writer;
pub mod types;

pub use assembler::{is_valid_version, AssembledManifest, ManifestAssembler};
pub use errors::{
    CallableError, DeclarationError, Diagnostic, DuplicateExportError, DuplicateImportError,
    GenerationError, ManifestError, Severity, UnsupportedTypeError,
};
pub use manifest::{
    ManifestEnum, ManifestMetadata, ManifestMethod, ManifestParam, ManifestReturn, PluginManifest,
    Prototype, RefMarker, DEFAULT_LANGUAGE, DEFAULT_SCHEMA,
};
pub use types::{
    Binding, CallableSignature, DeclaringType, DefaultValue, Direction, EnumInfo, EnumValue,
    FunctionParam, FunctionSignature, ImportSymbols, ParameterDescriptor, PointerWidth,
    PortableType, ReturnDescriptor, TypeFrame, WireForm,
};

pub use manifest_writer::{is_unchanged, stage, staging_path};

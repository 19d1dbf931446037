//! C# declaration discovery and signature transformation
//!
//! This crate provides:
//! - A source-level model of annotated methods, delegates and enums
//! - ast-grep based scanning of a module's `.cs` files
//! - The type classifier onto the portable taxonomy
//! - The signature transformer producing `CallableSignature`s
pub mod classifier;
pub mod naming;
pub mod project;
pub mod scanner;
pub mod source;
pub mod transformer;

pub use classifier::{is_builtin_name, render_source, Classified, TypeClassifier};
pub use scanner::DeclarationScanner;
pub use source::{CallableDecl, ModuleDecl, ParseFailure, ProjectInfo, SourceType};
pub use transformer::{AnnotationConventions, SignatureTransformer};

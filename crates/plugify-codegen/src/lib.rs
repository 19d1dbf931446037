//! Plugify Codegen
//!
//! Turns a scanned module into its generated artifacts: marshaling plans for
//! import shims, the C# sources that implement them, the export forwarders
//! and the manifest document.

pub mod emitter;
pub mod pipeline;
pub mod plan;
pub mod writer;

pub use pipeline::{
    generate_all, generate_module, generate_root, inspect_module, write_artifacts, Artifact,
    ArtifactError, CancellationToken, GenerationOptions, ModuleArtifacts, ModuleView, WriteReport,
};
pub use plan::{build_plan, MarshalPlan, MarshalStrategy, ParamPlan, ReturnPlan};

use crate::commands::{options_from_config, parse_pointer_width};
use crate::errors::Result;
use crate::GlobalOpts;
use clap::Args;
use plugify_ast::DeclarationScanner;
use plugify_codegen::inspect_module;
use plugify_config::Config;
use plugify_manifest::{GenerationError, PointerWidth};
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Module source directory
    #[arg(value_name = "SOURCE_DIR")]
    pub source: PathBuf,

    /// Target pointer width used for nint/IntPtr and pointer types
    #[arg(long, value_name = "32|64", value_parser = parse_pointer_width)]
    pub pointer_width: Option<PointerWidth>,
}

/// Print accepted signatures, their manifest entries and marshaling plans as JSON
pub fn handle_inspect(args: InspectArgs, _opts: &GlobalOpts) -> Result<()> {
    let config = Config::load()?;
    let options = options_from_config(&config, args.pointer_width);

    let module = DeclarationScanner::new(options.conventions.clone())
        .scan_module(&args.source)
        .map_err(|err| GenerationError::Discovery {
            module: args.source.display().to_string(),
            reason: format!("{:#}", err),
        })?;
    plugify_logger::debug(&format!(
        "Inspecting {} callable(s) of '{}'",
        module.callables.len(),
        module.name
    ));

    let view = inspect_module(&module, &options)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

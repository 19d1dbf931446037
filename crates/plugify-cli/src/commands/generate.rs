use crate::commands::{options_from_config, parse_pointer_width};
use crate::common::report_diagnostic;
use crate::errors::{CliError, Result};
use crate::GlobalOpts;
use clap::Args;
use plugify_codegen::{generate_all, write_artifacts, GenerationOptions};
use plugify_config::Config;
use plugify_manifest::PointerWidth;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Directory used when neither `--out` nor `output-dir` is set
pub const DEFAULT_OUTPUT_DIR: &str = "Generated";

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Module source directories, one module each
    #[arg(required = true, value_name = "SOURCE_DIR")]
    pub sources: Vec<PathBuf>,

    /// Output directory (per-module subdirectories when several modules are given)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Plugin name written to the manifest (single module only)
    #[arg(long)]
    pub name: Option<String>,

    /// Plugin version written to the manifest
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Target pointer width used for nint/IntPtr and pointer types
    #[arg(long, value_name = "32|64", value_parser = parse_pointer_width)]
    pub pointer_width: Option<PointerWidth>,

    /// List the files that would be written without writing them
    #[arg(long)]
    pub dry_run: bool,

    /// Cancel the remaining modules after the first failure
    #[arg(long)]
    pub fail_fast: bool,
}

/// Where the artifacts of the module at `root` go
pub fn output_dir(root: &Path, module: &str, base: Option<&Path>, per_module: bool) -> PathBuf {
    match base {
        Some(base) if per_module => base.join(module),
        Some(base) => base.to_path_buf(),
        None => root.join(DEFAULT_OUTPUT_DIR),
    }
}

pub fn handle_generate(args: GenerateArgs, _opts: &GlobalOpts) -> Result<()> {
    if args.name.is_some() && args.sources.len() > 1 {
        return Err(CliError::InvalidArgs(
            "--name can only be used with a single SOURCE_DIR".to_string(),
        ));
    }

    let config = Config::load()?;
    let options = GenerationOptions {
        name: args.name.clone(),
        version: args.version.clone(),
        fail_fast: args.fail_fast,
        ..options_from_config(&config, args.pointer_width)
    };
    let base = args
        .out
        .clone()
        .or_else(|| config.output_dir.as_ref().map(PathBuf::from));
    let per_module = args.sources.len() > 1;

    let total = args.sources.len();
    let start = Instant::now();
    plugify_logger::info(&format!(
        "Generating {} module(s) at pointer width {}",
        total, options.pointer_width.bits()
    ));
    if let Some(log_path) = plugify_logger::get_log_path() {
        plugify_logger::info(&format!("Log file: {}", log_path.display()));
    }
    plugify_logger::spinner_start(&format!("Generating {} module(s)...", total));
    let results = generate_all(&args.sources, &options);
    plugify_logger::spinner_stop();

    let mut failed = 0;
    for (root, result) in &results {
        let artifacts = match result {
            Ok(artifacts) => artifacts,
            Err(err) => {
                failed += 1;
                plugify_logger::error(&format!("{}: {}", root.display(), err));
                continue;
            }
        };

        plugify_logger::set_current_module(Some(artifacts.module.clone()));
        for diagnostic in &artifacts.diagnostics {
            report_diagnostic(diagnostic);
        }

        let dir = output_dir(root, &artifacts.module, base.as_deref(), per_module);
        if args.dry_run {
            for file in &artifacts.files {
                println!("{}", dir.join(&file.file_name).display());
            }
        } else {
            plugify_logger::step(&format!(
                "Writing {} file(s) to {}",
                artifacts.files.len(),
                dir.display()
            ));
            let report = write_artifacts(artifacts, &dir);
            for diagnostic in &report.diagnostics {
                report_diagnostic(diagnostic);
            }
            for path in &report.removed {
                plugify_logger::note(&format!("Removed stale {}", path.display()));
            }
            plugify_logger::success(&format!(
                "{}: {} method(s), {} file(s) written, {} unchanged in {}",
                artifacts.module,
                artifacts.manifest.methods.len(),
                report.written.len(),
                report.unchanged.len(),
                dir.display()
            ));
        }
        plugify_logger::set_current_module(None);
    }

    plugify_logger::debug(&format!(
        "Generated {} of {} module(s) in {:.2?}",
        total - failed,
        total,
        start.elapsed()
    ));

    if failed > 0 {
        return Err(CliError::ModulesFailed { failed, total });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dir_resolution() {
        let root = Path::new("/src/Demo");
        assert_eq!(
            output_dir(root, "Demo", None, false),
            PathBuf::from("/src/Demo/Generated")
        );
        assert_eq!(
            output_dir(root, "Demo", Some(Path::new("/out")), false),
            PathBuf::from("/out")
        );
        assert_eq!(
            output_dir(root, "Demo", Some(Path::new("/out")), true),
            PathBuf::from("/out/Demo")
        );
    }
}

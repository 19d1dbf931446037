use clap::{Parser, Subcommand};
use plugify_cli::{
    commands::{
        config::{self, ConfigAction},
        generate::{self, GenerateArgs},
        inspect::{self, InspectArgs},
    },
    common, GlobalOpts,
};

#[derive(Parser)]
#[command(name = "plugify-gen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Plugin manifest and marshaling shim generator",
    long_about = "plugify-gen scans annotated C# methods and generates the plugin manifest and the native marshaling shims."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate manifests and shims for one or more modules
    Generate(GenerateArgs),
    /// Print discovered signatures and marshaling plans as JSON
    Inspect(InspectArgs),
    /// Configure plugify-gen
    #[command(subcommand_required = false, arg_required_else_help = false)]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = plugify_logger::init_with_verbosity(
        cli.global.verbosity_level(),
        cli.global.quiet,
        cli.global.no_color,
    ) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }
    common::init_tracing(&cli.global);

    let result = match cli.command {
        Commands::Generate(args) => generate::handle_generate(args, &cli.global),
        Commands::Inspect(args) => inspect::handle_inspect(args, &cli.global),
        Commands::Config { action } => config::handle_config(action, &cli.global),
    };

    if let Err(e) = result {
        plugify_logger::error(&e.to_string());
        std::process::exit(1);
    }
}

mod commands;

use clap::{Parser, Subcommand};
use commands::EXIT_FAILURE;
use layerc_core::install_signal_handler;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "layerc",
    version,
    about = "Dependency-checked filesystem image layer compiler"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a layer declaration and print its build order.
    Plan {
        /// Path to the layer declaration TOML file.
        #[arg(default_value = "layer.toml")]
        declaration: PathBuf,
        /// Subvolumes directory; needed when the layer has a parent.
        #[arg(long)]
        subvolumes_dir: Option<PathBuf>,
        /// Descriptor of the parent layer (overrides the declaration).
        #[arg(long)]
        parent_layer_json: Option<PathBuf>,
        /// Package-manager wrapper (overrides the declaration).
        #[arg(long)]
        package_source: Option<PathBuf>,
    },
    /// Build a layer into a new subvolume.
    Build {
        /// Path to the layer declaration TOML file.
        #[arg(default_value = "layer.toml")]
        declaration: PathBuf,
        /// Directory holding all subvolumes.
        #[arg(long)]
        subvolumes_dir: PathBuf,
        /// Path of the new subvolume, relative to the subvolumes directory.
        #[arg(long)]
        subvolume_rel_path: String,
        /// Descriptor of the parent layer (overrides the declaration).
        #[arg(long)]
        parent_layer_json: Option<PathBuf>,
        /// Package-manager wrapper (overrides the declaration).
        #[arg(long)]
        package_source: Option<PathBuf>,
        /// How privileged operations run: sudo, direct, or virtual (in memory).
        #[arg(long, default_value = "sudo")]
        executor: String,
        /// Where to write the new subvolume's descriptor.
        #[arg(long)]
        descriptor_out: Option<PathBuf>,
        /// Do not mark the finished subvolume read-only.
        #[arg(long, default_value_t = false)]
        leave_writable: bool,
        /// Print the rendered tree of the finished subvolume.
        #[arg(long, default_value_t = false)]
        show_tree: bool,
    },
    /// Render a directory tree in the layer test format.
    Render {
        /// Directory to render.
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LAYERC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    if let Commands::Build { executor, .. } = &cli.command {
        if let Err(msg) = commands::check_prereqs(executor) {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Plan {
            declaration,
            subvolumes_dir,
            parent_layer_json,
            package_source,
        } => commands::plan::run(
            &declaration,
            subvolumes_dir.as_deref(),
            parent_layer_json.as_deref(),
            package_source,
            json_output,
        ),
        Commands::Build {
            declaration,
            subvolumes_dir,
            subvolume_rel_path,
            parent_layer_json,
            package_source,
            executor,
            descriptor_out,
            leave_writable,
            show_tree,
        } => commands::build::run(
            &commands::build::BuildArgs {
                declaration,
                subvolumes_dir,
                subvolume_rel_path,
                parent_layer_json,
                package_source,
                executor,
                descriptor_out,
                leave_writable,
                show_tree,
            },
            json_output,
        ),
        Commands::Render { path } => commands::render::run(&path, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {}", e.message);
            ExitCode::from(e.code)
        }
    }
}

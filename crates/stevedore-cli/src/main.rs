mod backend;
mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_FAILURE, EXIT_INPUT_ERROR, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use backend::{CatalogImages, DaemonResolver, LocalOrchestrator};
use stevedore_cluster::{Cluster, NodeRole};
use stevedore_daemon::Daemon;
use stevedore_remote::{HttpRegistryClient, RegistryConfig};

#[derive(Debug, Parser)]
#[command(
    name = "stevedore",
    version,
    about = "Content-addressed application bundle engine"
)]
struct Cli {
    /// Path to the Stevedore store directory.
    #[arg(long, default_value = "~/.local/share/stevedore")]
    store: String,

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
    /// Manage application bundles.
    Bundle {
        #[command(subcommand)]
        command: BundleCommands,
    },
    /// Manage stacks deployed from bundles.
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },
}

#[derive(Debug, Subcommand)]
enum BundleCommands {
    /// List stored bundles.
    Ls {
        /// Only list bundles whose references match (glob, or exact `name:tag`).
        name: Option<String>,
        /// Filter output (label=key[=value], before=REF, since=REF). Repeatable.
        #[arg(long = "filter", short = 'f')]
        filters: Vec<String>,
        /// Print bundle IDs only.
        #[arg(long, short, default_value_t = false)]
        quiet: bool,
    },
    /// Create a bundle from a manifest file, URL, or stdin.
    Create {
        /// Reference to bind to the new bundle (`name` or `name:tag`).
        reference: Option<String>,
        /// Path to the manifest file (stdin when omitted).
        #[arg(long, short)]
        file: Option<PathBuf>,
        /// Download the manifest from a URL instead.
        #[arg(long)]
        url: Option<String>,
    },
    /// Inspect bundle metadata, references, and services.
    Inspect {
        /// Bundle reference, ID, or unique ID prefix.
        reference: String,
    },
    /// Bind a new reference to an existing bundle.
    Tag {
        /// Bundle reference, ID, or unique ID prefix.
        source: String,
        /// New reference (`name` or `name:tag`).
        target: String,
    },
    /// Remove bundles and all their references.
    Rm {
        /// Bundle references, IDs, or unique ID prefixes.
        #[arg(required = true)]
        references: Vec<String>,
    },
    /// Push a bundle to the configured registry.
    Push {
        /// Bundle reference (`name` or `name:tag`).
        reference: String,
        /// Registry URL (overrides the config file).
        #[arg(long)]
        remote: Option<String>,
        /// Bearer token for the registry.
        #[arg(long)]
        token: Option<String>,
    },
    /// Pull a bundle from a registry.
    Pull {
        /// Bundle reference.
        reference: String,
    },
}

#[derive(Debug, Subcommand)]
enum StackCommands {
    /// Deploy a bundle as a stack of services.
    Deploy {
        /// Bundle reference, ID, or unique ID prefix.
        #[arg(long)]
        bundle: String,
        /// Stack name (random when omitted).
        name: Option<String>,
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
            tracing_subscriber::EnvFilter::try_from_env("STEVEDORE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let store_path = expand_tilde(&cli.store);
    let json_output = cli.json;

    let result = run(&cli.command, &store_path, json_output);
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("invalid bundle source")
                || msg.starts_with("invalid filter")
                || msg.starts_with("invalid reference")
            {
                EXIT_INPUT_ERROR
            } else if msg.starts_with("store ") || msg.starts_with("lock acquisition") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn run(command: &Commands, store_path: &std::path::Path, json: bool) -> Result<u8, String> {
    let registry_config = match command {
        Commands::Bundle {
            command: BundleCommands::Push { remote, token, .. },
        } => RegistryConfig::resolve(remote.as_deref(), token.as_deref())
            .map_err(|e| e.to_string())?,
        // The registry is never contacted outside push; any URL will do.
        _ => RegistryConfig::new("http://localhost:5000"),
    };

    let images = Arc::new(CatalogImages::load(store_path)?);
    let registry = Arc::new(HttpRegistryClient::new(registry_config));
    let daemon = Arc::new(
        Daemon::open(store_path, images, registry).map_err(|e| e.to_string())?,
    );

    match command {
        Commands::Bundle { command } => match command {
            BundleCommands::Ls {
                name,
                filters,
                quiet,
            } => commands::ls::run(&daemon, name.as_deref(), filters, *quiet, json),
            BundleCommands::Create {
                reference,
                file,
                url,
            } => commands::create::run(
                &daemon,
                file.as_deref(),
                url.as_deref(),
                reference.as_deref(),
                json,
            ),
            BundleCommands::Inspect { reference } => {
                commands::inspect::run(&daemon, reference, json)
            }
            BundleCommands::Tag { source, target } => commands::tag::run(&daemon, source, target),
            BundleCommands::Rm { references } => commands::rm::run(&daemon, references),
            BundleCommands::Push {
                reference, token, ..
            } => commands::push::run(&daemon, reference, token.as_deref()),
            BundleCommands::Pull { reference } => commands::pull::run(&daemon, reference),
        },
        Commands::Stack {
            command: StackCommands::Deploy { bundle, name },
        } => {
            let orchestrator = Arc::new(LocalOrchestrator::open(store_path)?);
            // A standalone engine is its own manager.
            let cluster = Cluster::new(
                NodeRole::Manager,
                Arc::new(DaemonResolver::new(daemon.clone())),
                orchestrator,
            );
            commands::deploy::run(&cluster, bundle, name.as_deref(), json)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tilde_expansion() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_tilde("~/.local/share/stevedore"),
            PathBuf::from("/home/tester/.local/share/stevedore")
        );
        assert_eq!(expand_tilde("/var/lib/stevedore"), PathBuf::from("/var/lib/stevedore"));
    }
}

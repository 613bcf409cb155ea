mod config;
mod run_cmd;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use config::Overrides;

#[derive(Parser)]
#[command(
    name = "flowrig",
    about = "Launch a coordinator and its workers, hold them open, tear them down"
)]
struct Cli {
    /// Config file (overrides FLOWRIG_CONFIG env var)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, start the topology, wait for Enter, then tear it down
    Run {
        #[command(flatten)]
        topology: TopologyArgs,
    },
    /// Print the resolved topology without launching anything
    Show {
        #[command(flatten)]
        topology: TopologyArgs,
    },
    /// Write a config file populated with the defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct TopologyArgs {
    /// Number of workers to start (overrides FLOWRIG_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
    /// Coordinator listening port (overrides FLOWRIG_PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Fixed settle delay in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,
    /// Poll the coordinator's port before starting workers
    #[arg(long)]
    probe: bool,
    /// Skip the build step
    #[arg(long)]
    skip_build: bool,
}

impl From<TopologyArgs> for Overrides {
    fn from(args: TopologyArgs) -> Self {
        Overrides {
            workers: args.workers,
            port: args.port,
            settle_ms: args.settle_ms,
            probe: args.probe,
            skip_build: args.skip_build,
        }
    }
}

/// Execute the `flowrig init` command: write config file.
fn cmd_init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config::config_path);

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    config::save_config(&path, &config::ConfigFile::default())?;

    println!("Config written to {}", path.display());
    println!();
    println!("Next: edit the coordinator and worker commands, then run `flowrig run`.");
    Ok(())
}

fn resolve_topology(
    path: Option<&std::path::Path>,
    args: TopologyArgs,
) -> anyhow::Result<flowrig_core::Topology> {
    let file = config::locate_config(path)?;
    config::resolve(file, &args.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { topology } => {
            let topology = resolve_topology(cli.config.as_deref(), topology)?;
            if let Err(e) = run_cmd::run_topology(&topology).await {
                eprintln!("{:#}", anyhow::Error::new(e));
                std::process::exit(1);
            }
        }
        Commands::Show { topology } => {
            let topology = resolve_topology(cli.config.as_deref(), topology)?;
            println!("{topology}");
            println!("processes:   {}", topology.process_count());
        }
        Commands::Init { force } => {
            cmd_init(cli.config, force)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse_into_overrides() {
        let cli = Cli::try_parse_from([
            "flowrig",
            "run",
            "--workers",
            "0",
            "--port",
            "9000",
            "--probe",
            "--skip-build",
        ])
        .unwrap();

        let Commands::Run { topology } = cli.command else {
            panic!("expected run");
        };
        let overrides = Overrides::from(topology);
        assert_eq!(overrides.workers, Some(0));
        assert_eq!(overrides.port, Some(9000));
        assert!(overrides.probe);
        assert!(overrides.skip_build);
        assert_eq!(overrides.settle_ms, None);
    }

    #[test]
    fn negative_worker_count_is_rejected() {
        assert!(Cli::try_parse_from(["flowrig", "run", "--workers", "-1"]).is_err());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        cmd_init(Some(path.clone()), false).unwrap();
        let err = cmd_init(Some(path.clone()), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        cmd_init(Some(path.clone()), true).unwrap();

        let loaded = config::load_config(&path).unwrap();
        assert_eq!(loaded, config::ConfigFile::default());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["flowrig", "show", "--config", "/tmp/x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
    }
}

//! scene_launch CLI

use clap::{Args, Parser, Subcommand};
use scene_launch::{
    compose_file,
    supervisor::{shutdown_signal, Supervisor, SupervisorConfig},
    Composition, LaunchError, RuntimeEnvironment,
};
use std::{collections::HashMap, path::PathBuf, process, time::Duration};

#[derive(Parser)]
#[command(name = "scene_launch")]
#[command(
    about = "Resolve declarative launch descriptions and supervise the processes",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a launch file into a process manifest
    Compose {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Write the manifest JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the top-level arguments and their values
        #[arg(long)]
        show_args: bool,
    },

    /// Resolve a launch file and run its processes until interrupted
    Run {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Time between SIGTERM and SIGKILL on shutdown
        #[arg(long, default_value_t = 5000)]
        grace_period_ms: u64,
    },
}

#[derive(Args)]
struct LaunchArgs {
    /// Launch file path
    file: PathBuf,

    /// Launch arguments (name:=value or name=value)
    #[arg(value_parser = parse_launch_arg)]
    args: Vec<(String, String)>,

    /// Timeout for $(command ...) substitutions
    #[arg(long, default_value_t = 30000)]
    command_timeout_ms: u64,
}

impl LaunchArgs {
    fn compose(self) -> Result<Composition, LaunchError> {
        let env = RuntimeEnvironment::from_process()
            .with_command_timeout(Duration::from_millis(self.command_timeout_ms));
        let overrides: HashMap<String, String> = self.args.into_iter().collect();
        log::info!("Composing launch file: {}", self.file.display());
        compose_file(&self.file, overrides, &env)
    }
}

fn parse_launch_arg(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(":=")
        .or_else(|| s.split_once('='))
        .ok_or_else(|| format!("Invalid launch argument format (expected name:=value): {}", s))?;
    if name.is_empty() {
        return Err(format!("Launch argument has an empty name: {}", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Compose {
            launch,
            output,
            show_args,
        } => compose(launch, output, show_args),
        Commands::Run {
            launch,
            grace_period_ms,
        } => run(launch, Duration::from_millis(grace_period_ms)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn compose(
    launch: LaunchArgs,
    output: Option<PathBuf>,
    show_args: bool,
) -> Result<(), LaunchError> {
    let composition = launch.compose()?;

    if show_args {
        for (declaration, value) in &composition.arguments {
            println!("{}:", declaration.name);
            if !declaration.description.is_empty() {
                println!("    {}", declaration.description);
            }
            println!("    value: {}", value.as_deref().unwrap_or("<unset>"));
            if let Some(choices) = &declaration.choices {
                println!("    choices: {}", choices.join(", "));
            }
        }
        return Ok(());
    }

    let json = composition
        .manifest
        .to_json()
        .map_err(|e| LaunchError::Io(e.into()))?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            log::info!(
                "Wrote manifest: {} ({} processes)",
                path.display(),
                composition.manifest.len()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run(launch: LaunchArgs, grace_period: Duration) -> Result<(), LaunchError> {
    let composition = launch.compose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let supervisor = Supervisor::new(
            SupervisorConfig { grace_period },
            RuntimeEnvironment::from_process(),
        );
        let handle = supervisor.launch(&composition.manifest).await?;
        let report = handle.run_until(shutdown_signal()).await?;
        log::info!("{} process(es) stopped", report.exits.len());
        Ok::<(), LaunchError>(())
    })
}

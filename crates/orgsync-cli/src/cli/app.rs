use super::*;

pub(super) fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!(command = command_label(&cli.command), "running command");

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => default_config_path()?,
    };
    match cli.command {
        Commands::Sync(args) => handle_sync(args, &config_path),
        Commands::Config(args) => handle_config(args, &config_path).map(|()| ExitCode::SUCCESS),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

pub(super) fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Sync(_) => "sync",
        Commands::Config(_) => "config",
    }
}

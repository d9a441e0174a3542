use super::*;

pub(super) fn handle_config(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Init(args) => {
            if config_path.exists() && !args.force {
                anyhow::bail!(
                    "config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            let config = SyncConfig {
                output_dir: args.output_dir,
                ..SyncConfig::default()
            };
            config.save(config_path)?;
            info!(path = %config_path.display(), "config written");
            println!("Config written to {}", config_path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = SyncConfig::load(config_path)?;
            let rendered = serde_json::to_string_pretty(&config).context("serialize config")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

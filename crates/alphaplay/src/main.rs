mod cli;
mod export;
mod pack;
mod paths;
mod player;
mod run;

use std::path::Path;

use anyhow::{Context, Result};
use cli::{Command, ConfigAction};
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Pack(args)) => pack::pack(&args),
        Some(Command::Export(args)) => export::export(&args),
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action),
        None => run::run(cli.play),
    }
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    let paths = AppPaths::discover()?;
    match action {
        ConfigAction::Where { config } => run_config_where(&paths, config.as_deref()),
        ConfigAction::Show { config } => run_config_show(&paths, config.as_deref()),
    }
}

fn run_config_where(paths: &AppPaths, explicit: Option<&Path>) -> Result<()> {
    println!("config dir:  {}", paths.config_dir().display());
    match paths.config_file(explicit) {
        Some(file) => println!("config file: {}", file.display()),
        None => println!(
            "config file: {} (not present; built-in defaults apply)",
            paths.default_config_file().display()
        ),
    }
    Ok(())
}

fn run_config_show(paths: &AppPaths, explicit: Option<&Path>) -> Result<()> {
    let config = paths.load_config(explicit)?;
    let rendered = toml::to_string_pretty(&config).context("failed to render config as TOML")?;
    print!("{rendered}");
    Ok(())
}

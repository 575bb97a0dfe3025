use clap::{builder::styling, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use std::fs;
use std::path::PathBuf;

use ridge::commands::computer::{handle_computer_commands, ComputerCommands};
use ridge::commands::print_error;
use ridge::config::{ConfigPaths, RidgeConfig};

const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::Green.on_default().bold())
    .usage(styling::AnsiColor::Green.on_default().bold())
    .literal(styling::AnsiColor::Cyan.on_default().bold())
    .placeholder(styling::AnsiColor::Cyan.on_default());

#[derive(Parser)]
#[command(name = "ridge")]
#[command(about = "Compute-resource management for the Ridge workflow platform", long_about = None)]
#[command(version)]
#[command(styles = STYLES)]
struct Cli {
    /// Output format (table, json)
    #[arg(short = 'f', long, global = true)]
    format: Option<String>,

    /// Path to an explicit config file (overrides the standard locations)
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage execution resources
    #[command(subcommand)]
    Computer(ComputerCommands),

    /// Manage the ridge configuration files
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default config file to the user config directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as TOML
    Show,
}

fn load_config(cli: &Cli) -> RidgeConfig {
    let result = match &cli.config_file {
        Some(path) => RidgeConfig::load_from_files(std::slice::from_ref(path)),
        None => RidgeConfig::load(),
    };
    match result {
        Ok(config) => config,
        Err(e) => {
            print_error("loading the configuration", &e);
            std::process::exit(1);
        }
    }
}

fn level_filter(level: &str) -> LevelFilter {
    match level {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli);

    Builder::from_default_env()
        .filter_level(level_filter(&config.client.log_level))
        .init();

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {error}");
        }
        std::process::exit(1);
    }

    let format = cli
        .format
        .clone()
        .unwrap_or_else(|| config.client.format.clone());
    if !["table", "json"].contains(&format.as_str()) {
        eprintln!("Invalid format: {format}. Valid values are: table, json");
        std::process::exit(1);
    }

    match &cli.command {
        Commands::Computer(command) => handle_computer_commands(&config, command, &format),
        Commands::Config(command) => handle_config_commands(&config, command),
    }
}

fn handle_config_commands(config: &RidgeConfig, command: &ConfigCommands) {
    match command {
        ConfigCommands::Init { force } => {
            let paths = ConfigPaths::new();
            let Some(path) = paths.user.clone() else {
                eprintln!("Could not determine the user config directory.");
                std::process::exit(1);
            };
            if path.exists() && !force {
                eprintln!(
                    "Config file {} already exists; use --force to overwrite.",
                    path.display()
                );
                std::process::exit(1);
            }
            if let Some(parent) = path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    print_error("creating the config directory", &e);
                    std::process::exit(1);
                }
            }
            match fs::write(&path, RidgeConfig::generate_default_config()) {
                Ok(()) => println!("Success: wrote default config to {}", path.display()),
                Err(e) => {
                    print_error("writing the config file", &e);
                    std::process::exit(1);
                }
            }
        }
        ConfigCommands::Show => match config.to_toml() {
            Ok(toml) => println!("{toml}"),
            Err(e) => {
                print_error("serializing the configuration", &e);
                std::process::exit(1);
            }
        },
    }
}

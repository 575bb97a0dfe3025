//! `ridge computer` subcommands: registering, configuring and testing
//! execution resources.

use clap::Subcommand;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const COMPUTER_HELP_TEMPLATE: &str = "\
{before-help}{about-with-newline}
{usage-heading} {usage}

{all-args}

\x1b[1;32mRegistration:\x1b[0m
  \x1b[1;36msetup\x1b[0m        Register a new computer
  \x1b[1;36mduplicate\x1b[0m    Register a copy of an existing computer
  \x1b[1;36mconfigure\x1b[0m    Attach per-user connection settings

\x1b[1;32mInspection:\x1b[0m
  \x1b[1;36mlist\x1b[0m         List registered computers
  \x1b[1;36mshow\x1b[0m         Show one computer in full
  \x1b[1;36mtest\x1b[0m         Run the connectivity test suite

\x1b[1;32mMaintenance:\x1b[0m
  \x1b[1;36mrelabel\x1b[0m      Rename a computer
  \x1b[1;36mdelete\x1b[0m       Remove a computer permanently
{after-help}";

use crate::builder::ComputerBuilder;
use crate::commands::output::{print_if_json, print_json_wrapped};
use crate::commands::table_format::display_table_with_count;
use crate::commands::{get_env_user_name, print_error};
use crate::config::RidgeConfig;
use crate::errors::RidgeError;
use crate::models::Computer;
use crate::ops::{self, OpContext};
use crate::plugins::PluginRegistry;
use crate::prompt::StdinSource;
use crate::store::ComputerStore;
use tabled::Tabled;

/// Computer management commands.
#[derive(Subcommand)]
#[command(
    help_template = COMPUTER_HELP_TEMPLATE,
    subcommand_help_heading = None,
    after_long_help = "\
EXAMPLES:
    # Register a computer without prompting
    ridge computer setup --non-interactive --label=cluster1 --hostname=cluster1.example.com \\
        --transport=ssh --scheduler=slurm

    # Attach your connection settings
    ridge computer configure ssh cluster1 --non-interactive username=alice port=22

    # Check it works
    ridge computer test cluster1
")]
pub enum ComputerCommands {
    /// Register a new computer
    ///
    /// Field values can come from flags, from a YAML document (--config) or
    /// from interactive prompts; flags win over the document.
    #[command(after_long_help = "\
EXAMPLES:
    ridge computer setup --non-interactive --label=local_box --hostname=localhost \\
        --transport=local --scheduler=direct

    ridge computer setup --non-interactive --config computer.yml
")]
    Setup {
        /// Fail instead of prompting for missing values
        #[arg(short = 'n', long)]
        non_interactive: bool,

        /// YAML document supplying setup fields by name
        #[arg(long)]
        config: Option<PathBuf>,

        /// Unique computer label
        #[arg(long)]
        label: Option<String>,

        /// Network address of the machine
        #[arg(long)]
        hostname: Option<String>,

        /// Free-text description
        #[arg(long)]
        description: Option<String>,

        /// Transport plugin identifier
        #[arg(long)]
        transport: Option<String>,

        /// Scheduler plugin identifier
        #[arg(long)]
        scheduler: Option<String>,

        /// First line of generated job scripts
        #[arg(long)]
        shebang: Option<String>,

        /// Work directory template, may reference {username}
        #[arg(long)]
        work_dir: Option<String>,

        /// MPI launcher template
        #[arg(long)]
        mpirun_command: Option<String>,

        /// Default number of MPI processes per machine (0 means unset)
        #[arg(long)]
        mpiprocs_per_machine: Option<i64>,

        /// Default memory per machine in kB
        #[arg(long)]
        default_memory_per_machine: Option<i64>,

        /// Shell text executed before every job script
        #[arg(long)]
        prepend_text: Option<String>,

        /// Shell text executed after every job script
        #[arg(long)]
        append_text: Option<String>,
    },

    /// Attach or update per-user connection settings
    #[command(subcommand)]
    Configure(ConfigureCommands),

    /// List registered computers
    ///
    /// By default only computers configured for the current user are shown.
    List {
        /// Print bare labels without header or formatting
        #[arg(short = 'r', long)]
        raw: bool,

        /// Include computers not configured for the current user
        #[arg(short = 'a', long)]
        all: bool,
    },

    /// Show one computer in full
    Show {
        /// Computer label
        #[arg()]
        label: String,
    },

    /// Rename a computer
    ///
    /// Configuration is preserved; the old label stops resolving.
    Relabel {
        /// Current label
        #[arg()]
        old_label: String,

        /// New label, must be unused
        #[arg()]
        new_label: String,
    },

    /// Remove a computer permanently
    ///
    /// Per-user configuration records are removed with it.
    Delete {
        /// Computer label
        #[arg()]
        label: String,
    },

    /// Register a copy of an existing computer
    ///
    /// Every field except the label is taken from the source; in
    /// interactive mode each field is prompted with the source value as the
    /// default.
    Duplicate {
        /// Label of the computer to copy
        #[arg()]
        source_label: String,

        /// Fail instead of prompting for missing values
        #[arg(short = 'n', long)]
        non_interactive: bool,

        /// Label for the copy (required in non-interactive mode)
        #[arg(long)]
        label: Option<String>,
    },

    /// Run the connectivity test suite against a configured computer
    Test {
        /// Computer label
        #[arg()]
        label: String,
    },
}

/// `ridge computer configure` subcommands, one per transport plus `show`.
#[derive(Subcommand)]
pub enum ConfigureCommands {
    /// Configure a computer that uses the local transport
    Local {
        /// Computer label
        #[arg()]
        label: String,

        /// Fail instead of prompting for missing values
        #[arg(short = 'n', long)]
        non_interactive: bool,

        /// YAML document supplying auth fields by name
        #[arg(long)]
        config: Option<PathBuf>,

        /// Auth fields as key=value (e.g. safe_interval=5)
        #[arg()]
        assignments: Vec<String>,
    },

    /// Configure a computer that uses the ssh transport
    Ssh {
        /// Computer label
        #[arg()]
        label: String,

        /// Fail instead of prompting for missing values
        #[arg(short = 'n', long)]
        non_interactive: bool,

        /// YAML document supplying auth fields by name
        #[arg(long)]
        config: Option<PathBuf>,

        /// Auth fields as key=value (e.g. username=alice port=2222)
        #[arg()]
        assignments: Vec<String>,
    },

    /// Show the current or default configuration of a computer
    Show {
        /// Computer label
        #[arg()]
        label: String,

        /// Show the transport's defaults instead of stored values
        #[arg(long)]
        defaults: bool,

        /// Print a replayable key=value option string
        #[arg(long)]
        as_option_string: bool,
    },
}

#[derive(Tabled)]
struct ComputerTableRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "Transport")]
    transport: String,
    #[tabled(rename = "Scheduler")]
    scheduler: String,
    #[tabled(rename = "Configured")]
    configured: String,
}

fn open_context(config: &RidgeConfig) -> OpContext {
    let store_path = config.store_path();
    let store = match ComputerStore::open(&store_path) {
        Ok(store) => store,
        Err(e) => {
            print_error("opening the computer store", &e);
            std::process::exit(1);
        }
    };
    debug!("using computer store at {}", store_path.display());
    OpContext::new(get_env_user_name(), store, PluginRegistry::with_builtins())
}

/// Handle computer commands.
pub fn handle_computer_commands(config: &RidgeConfig, command: &ComputerCommands, format: &str) {
    match command {
        ComputerCommands::Setup {
            non_interactive,
            config: config_file,
            label,
            hostname,
            description,
            transport,
            scheduler,
            shebang,
            work_dir,
            mpirun_command,
            mpiprocs_per_machine,
            default_memory_per_machine,
            prepend_text,
            append_text,
        } => {
            let mut ctx = open_context(config);
            let mut builder = ComputerBuilder::new(&ctx.registry);

            if let Some(path) = config_file {
                let document = match fs::read_to_string(path) {
                    Ok(document) => document,
                    Err(e) => {
                        print_error("reading the setup document", &e);
                        std::process::exit(1);
                    }
                };
                if let Err(e) = builder.apply_document(&document) {
                    print_error("applying the setup document", &e);
                    std::process::exit(1);
                }
            }

            // Flags are applied in the canonical field order.
            let flag_values: [(&str, Option<String>); 12] = [
                ("label", label.clone()),
                ("hostname", hostname.clone()),
                ("description", description.clone()),
                ("transport", transport.clone()),
                ("scheduler", scheduler.clone()),
                ("shebang", shebang.clone()),
                ("work-dir", work_dir.clone()),
                ("mpirun-command", mpirun_command.clone()),
                ("mpiprocs-per-machine", mpiprocs_per_machine.map(|n| n.to_string())),
                (
                    "default-memory-per-machine",
                    default_memory_per_machine.map(|n| n.to_string()),
                ),
                ("prepend-text", prepend_text.clone()),
                ("append-text", append_text.clone()),
            ];
            for (key, value) in flag_values {
                if let Some(raw) = value {
                    if let Err(e) = builder.set(key, &raw) {
                        print_error("validating setup options", &e);
                        std::process::exit(1);
                    }
                }
            }

            if !non_interactive {
                let mut source = StdinSource::new();
                if let Err(e) = builder.collect_interactive(&mut source) {
                    print_error("collecting setup values", &e);
                    std::process::exit(1);
                }
            }

            let computer = match builder.build() {
                Ok(computer) => computer,
                Err(e) => {
                    print_error("validating setup options", &e);
                    std::process::exit(1);
                }
            };
            let label = computer.label.clone();

            match ops::setup_computer(&mut ctx, computer) {
                Ok(()) => {
                    println!("Success: computer '{label}' registered.");
                    println!("Use 'ridge computer configure' to attach your connection settings.");
                }
                Err(e) => {
                    print_error("registering the computer", &e);
                    std::process::exit(1);
                }
            }
        }

        ComputerCommands::Configure(configure) => handle_configure(config, configure, format),

        ComputerCommands::List { raw, all } => {
            let ctx = open_context(config);
            let computers: Vec<&Computer> = ctx
                .store
                .computers()
                .iter()
                .filter(|c| *all || ctx.store.is_configured(&c.label, &ctx.username))
                .collect();

            if *raw {
                for computer in &computers {
                    println!("{}", computer.label);
                }
                return;
            }

            if format == "json" {
                let items: Vec<Value> = computers
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "label": c.label,
                            "hostname": c.hostname,
                            "transport": c.transport,
                            "scheduler": c.scheduler,
                            "configured": ctx.store.is_configured(&c.label, &ctx.username),
                        })
                    })
                    .collect();
                print_json_wrapped("computers", &items);
                return;
            }

            if computers.is_empty() {
                println!("No computers found.");
                if !*all {
                    println!("Use 'ridge computer list --all' to include unconfigured computers.");
                }
                return;
            }

            let rows: Vec<ComputerTableRow> = computers
                .iter()
                .map(|c| ComputerTableRow {
                    label: c.label.clone(),
                    hostname: c.hostname.clone(),
                    transport: c.transport.clone(),
                    scheduler: c.scheduler.clone(),
                    configured: if ctx.store.is_configured(&c.label, &ctx.username) {
                        "Yes".to_string()
                    } else {
                        "No".to_string()
                    },
                })
                .collect();
            display_table_with_count(rows, "computers");
        }

        ComputerCommands::Show { label } => {
            let ctx = open_context(config);
            let computer = match ctx.store.get(label) {
                Ok(computer) => computer,
                Err(e) => {
                    print_error("looking up the computer", &e);
                    std::process::exit(1);
                }
            };

            if print_if_json(format, computer) {
                return;
            }

            println!("Computer '{}':", computer.label);
            println!("  Hostname:                   {}", computer.hostname);
            println!("  Description:                {}", computer.description);
            println!("  Transport:                  {}", computer.transport);
            println!("  Scheduler:                  {}", computer.scheduler);
            println!("  Shebang:                    {}", computer.shebang);
            println!("  Work directory:             {}", computer.work_dir);
            println!("  Mpirun command:             {}", computer.mpirun_command);
            println!(
                "  Default MPI procs/machine:  {}",
                computer
                    .mpiprocs_per_machine
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "not set".to_string())
            );
            println!(
                "  Default memory/machine:     {}",
                computer
                    .default_memory_per_machine
                    .map(|n| format!("{n} kB"))
                    .unwrap_or_else(|| "not set".to_string())
            );
            println!("  Prepend text:               {}", computer.prepend_text);
            println!("  Append text:                {}", computer.append_text);
            println!(
                "  Configured for you:         {}",
                if ctx.store.is_configured(&computer.label, &ctx.username) {
                    "yes"
                } else {
                    "no"
                }
            );
        }

        ComputerCommands::Relabel {
            old_label,
            new_label,
        } => {
            let mut ctx = open_context(config);
            match ops::relabel_computer(&mut ctx, old_label, new_label) {
                Ok(()) => println!("Success: computer '{old_label}' renamed to '{new_label}'."),
                Err(e) => {
                    print_error("relabeling the computer", &e);
                    std::process::exit(1);
                }
            }
        }

        ComputerCommands::Delete { label } => {
            let mut ctx = open_context(config);
            match ops::delete_computer(&mut ctx, label) {
                Ok(()) => println!("Success: computer '{label}' deleted."),
                Err(e) => {
                    print_error("deleting the computer", &e);
                    std::process::exit(1);
                }
            }
        }

        ComputerCommands::Duplicate {
            source_label,
            non_interactive,
            label,
        } => {
            let mut ctx = open_context(config);
            let source = match ctx.store.get(source_label) {
                Ok(computer) => computer.clone(),
                Err(e) => {
                    print_error("looking up the source computer", &e);
                    std::process::exit(1);
                }
            };

            let mut builder = ComputerBuilder::from_computer(&ctx.registry, &source);
            if let Some(new_label) = label {
                if let Err(e) = builder.set("label", new_label) {
                    print_error("validating the new label", &e);
                    std::process::exit(1);
                }
            }
            if !non_interactive {
                let mut stdin = StdinSource::new();
                if let Err(e) = builder.collect_interactive(&mut stdin) {
                    print_error("collecting setup values", &e);
                    std::process::exit(1);
                }
            }

            let computer = match builder.build() {
                Ok(computer) => computer,
                Err(e) => {
                    print_error("validating setup options", &e);
                    std::process::exit(1);
                }
            };
            let new_label = computer.label.clone();

            match ops::setup_computer(&mut ctx, computer) {
                Ok(()) => {
                    println!("Success: computer '{source_label}' duplicated as '{new_label}'.")
                }
                Err(e) => {
                    print_error("registering the duplicate", &e);
                    std::process::exit(1);
                }
            }
        }

        ComputerCommands::Test { label } => {
            let ctx = open_context(config);
            let report = match ops::test_computer(&ctx, label) {
                Ok(report) => report,
                Err(e) => {
                    print_error("testing the computer", &e);
                    std::process::exit(1);
                }
            };

            let host = hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());
            println!(
                "Testing computer '{label}' from host '{host}' for user '{}'...",
                ctx.username
            );
            for check in &report.checks {
                if check.passed {
                    println!("* {}... [OK]", check.name);
                } else {
                    println!("* {}... [Failed]", check.name);
                    for message in &check.messages {
                        println!("    {message}");
                    }
                }
            }
            if report.all_passed() {
                println!("Success: all {} tests succeeded", report.total());
            } else {
                println!(
                    "Warning: {} out of {} tests failed",
                    report.failed(),
                    report.total()
                );
            }
        }
    }
}

fn handle_configure(config: &RidgeConfig, command: &ConfigureCommands, _format: &str) {
    match command {
        ConfigureCommands::Local {
            label,
            non_interactive,
            config: config_file,
            assignments,
        } => {
            configure_for_transport(config, "local", label, *non_interactive, config_file, assignments)
        }
        ConfigureCommands::Ssh {
            label,
            non_interactive,
            config: config_file,
            assignments,
        } => configure_for_transport(config, "ssh", label, *non_interactive, config_file, assignments),
        ConfigureCommands::Show {
            label,
            defaults,
            as_option_string,
        } => {
            let ctx = open_context(config);
            let params = if *defaults {
                ops::default_auth_params(&ctx, label)
            } else {
                ops::current_auth_params(&ctx, label)
            };
            let params = match params {
                Ok(params) => params,
                Err(e) => {
                    print_error("reading the configuration", &e);
                    std::process::exit(1);
                }
            };

            if *as_option_string {
                println!("{}", ops::as_option_string(&params));
            } else {
                for (name, value) in &params {
                    println!(
                        "* {name:<20} {}",
                        crate::transport::AuthField::display(value)
                    );
                }
            }
        }
    }
}

fn configure_for_transport(
    config: &RidgeConfig,
    transport: &str,
    label: &str,
    non_interactive: bool,
    config_file: &Option<PathBuf>,
    assignments: &[String],
) {
    let mut ctx = open_context(config);

    let schema = match ctx.registry.transport(transport) {
        Ok(entry) => entry.auth_schema(&ctx.username),
        Err(e) => {
            print_error("resolving the transport", &e);
            std::process::exit(1);
        }
    };

    let mut supplied: BTreeMap<String, Value> = BTreeMap::new();

    if let Some(path) = config_file {
        let document = match fs::read_to_string(path) {
            Ok(document) => document,
            Err(e) => {
                print_error("reading the configuration document", &e);
                std::process::exit(1);
            }
        };
        match parse_auth_document(&document) {
            Ok(fields) => supplied.extend(fields),
            Err(e) => {
                print_error("applying the configuration document", &e);
                std::process::exit(1);
            }
        }
    }

    for assignment in assignments {
        match ops::parse_auth_assignment(&schema, assignment) {
            Ok((key, value)) => {
                supplied.insert(key, value);
            }
            Err(e) => {
                print_error("parsing auth fields", &e);
                std::process::exit(1);
            }
        }
    }

    let result = if non_interactive {
        ops::configure_computer(&mut ctx, transport, label, &supplied, None)
    } else {
        let mut source = StdinSource::new();
        ops::configure_computer(&mut ctx, transport, label, &supplied, Some(&mut source))
    };

    match result {
        Ok(_) => println!(
            "Success: computer '{label}' configured for user '{}'.",
            ctx.username
        ),
        Err(e) => {
            print_error("configuring the computer", &e);
            std::process::exit(1);
        }
    }
}

/// Parse a YAML auth document into typed field values.
fn parse_auth_document(document: &str) -> Result<BTreeMap<String, Value>, RidgeError> {
    let fields: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(document)
        .map_err(|e| RidgeError::Format(format!("invalid configuration document: {e}")))?;
    let mut result = BTreeMap::new();
    for (key, value) in fields {
        let value = serde_json::to_value(value)
            .map_err(|e| RidgeError::Format(format!("invalid value for {key}: {e}")))?;
        result.insert(key, value);
    }
    Ok(result)
}

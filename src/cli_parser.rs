//! CLI argument parsing and help text for GG-DEVMEM.

use std::path::PathBuf;

use gg_devmem::cli::{parse_sizes, DEFAULT_SIZES};

/// Options shared by all commands plus the `demo` ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub config_path: Option<PathBuf>,
    pub sizes: Vec<u64>,
    pub json: bool,
    pub log_json: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            sizes: DEFAULT_SIZES.to_vec(),
            json: false,
            log_json: false,
        }
    }
}

/// Parse options following the command words.
pub fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let value = args.get(i + 1).ok_or("Missing value for --config")?;
                opts.config_path = Some(PathBuf::from(value));
                i += 2;
            }
            "--sizes" => {
                let value = args.get(i + 1).ok_or("Missing value for --sizes")?;
                opts.sizes = parse_sizes(value)?;
                i += 2;
            }
            "--json" => {
                opts.json = true;
                i += 1;
            }
            "--log-json" => {
                opts.log_json = true;
                i += 1;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(opts)
}

/// Print general usage information.
pub fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "GG-DEVMEM - Paged device memory sub-allocator v{}

USAGE:
    gg-devmem-cli [COMMAND] [OPTIONS]

COMMANDS:
    demo         Run an allocate/free/clean scenario on host memory
    config       Manage configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help       Show help for command
    -V, --version    Show version information
    --config FILE    Load pool configuration from a TOML file
    --log-json       Emit logs as JSON lines

ENVIRONMENT:
    GG_DEVMEM_POOL_SIZE          Total pool bytes
    GG_DEVMEM_PAGE_COUNT         Number of pages
    GG_DEVMEM_ALIGNMENT          Allocation granularity override
    GG_DEVMEM_CLEAN_INTERVAL_MS  Background clean period
    RUST_LOG                     Log filter (debug, info, warn, error)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
pub fn print_command_help(command: &str) {
    match command {
        "demo" => print_demo_help(),
        "config" => print_config_help(),
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'gg-devmem-cli help' for general usage.",
                command
            );
        }
    }
}

fn print_demo_help() {
    eprintln!(
        "gg-devmem-cli demo - Exercise a pool on host memory

USAGE:
    gg-devmem-cli demo [OPTIONS]

OPTIONS:
    --config FILE     Load pool configuration from file
    --sizes A,B,C     Allocation sizes in bytes
    --json            Print reports as JSON
    --log-json        Emit logs as JSON lines

DESCRIPTION:
    Allocates every size, binds a byte payload to each block, frees every
    other block and prints the usage report. Fragmentation is reported only
    after the clean pass that follows.

EXAMPLES:
    gg-devmem-cli demo
    gg-devmem-cli demo --sizes 64,4096,100000 --json
"
    );
}

fn print_config_help() {
    eprintln!(
        "gg-devmem-cli config - Manage configuration

USAGE:
    gg-devmem-cli config <SUBCOMMAND> [--config FILE]

SUBCOMMANDS:
    show       Print the effective configuration (file, then environment)
    defaults   Print the built-in defaults
    validate   Check the configuration (exit 0 if valid, 2 if invalid)
"
    );
}

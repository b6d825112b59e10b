//! GG-DEVMEM CLI entry point.
//!
//! Runs allocator diagnostics on host memory and manages pool configuration.

mod cli_parser;
mod runtime_init;

use std::process::ExitCode;

use gg_devmem::cli::config_cmd;
use gg_devmem::cli::run_demo;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "demo" => run_demo_cmd(&args[2..]),
        "config" => run_config_cmd(&args[2..]),
        "help" | "--help" | "-h" => {
            if let Some(sub) = args.get(2) {
                cli_parser::print_command_help(sub);
            } else {
                cli_parser::print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("GG-DEVMEM {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            cli_parser::print_usage();
            ExitCode::FAILURE
        }
    }
}

fn run_demo_cmd(rest: &[String]) -> ExitCode {
    let opts = match cli_parser::parse_options(rest) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}", e);
            cli_parser::print_command_help("demo");
            return ExitCode::FAILURE;
        }
    };
    runtime_init::init_logging(opts.log_json);

    let config = match runtime_init::load_config(opts.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2u8);
        }
    };
    ExitCode::from(run_demo(&config, &opts.sizes, opts.json) as u8)
}

fn run_config_cmd(rest: &[String]) -> ExitCode {
    let (sub, tail) = match rest.split_first() {
        Some((sub, tail)) => (sub.as_str(), tail),
        None => ("show", rest),
    };
    let opts = match cli_parser::parse_options(tail) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}", e);
            cli_parser::print_command_help("config");
            return ExitCode::FAILURE;
        }
    };
    runtime_init::init_logging(opts.log_json);

    let path = opts.config_path.as_deref();
    match sub {
        "show" => ExitCode::from(config_cmd::run_show(path) as u8),
        "defaults" => ExitCode::from(config_cmd::run_defaults() as u8),
        "validate" => ExitCode::from(config_cmd::run_validate(path) as u8),
        _ => {
            eprintln!("Unknown config subcommand: {}", sub);
            cli_parser::print_command_help("config");
            ExitCode::FAILURE
        }
    }
}

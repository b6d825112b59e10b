//! `config` subcommands.

use std::path::Path;

use crate::config::{self, PoolConfig};

/// Print the effective configuration as TOML.
pub fn run_show(path: Option<&Path>) -> i32 {
    match config::load(path) {
        Ok(cfg) => print_toml(&cfg),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            2
        }
    }
}

/// Print the built-in defaults as TOML.
pub fn run_defaults() -> i32 {
    print_toml(&PoolConfig::default())
}

/// Validate the configuration. Exit 0 if valid, 2 otherwise.
pub fn run_validate(path: Option<&Path>) -> i32 {
    match config::load(path) {
        Ok(cfg) => {
            println!(
                "Configuration valid: {} pages of {} bytes, clean interval {} ms",
                cfg.page_count,
                cfg.page_size(),
                cfg.clean_interval_ms
            );
            0
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            2
        }
    }
}

fn print_toml(cfg: &PoolConfig) -> i32 {
    match cfg.to_toml_string() {
        Ok(text) => {
            print!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Failed to render configuration: {}", e);
            1
        }
    }
}

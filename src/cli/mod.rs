//! CLI command implementations for `gg-devmem-cli`.

pub mod config_cmd;
pub mod demo;
pub mod report_format;

pub use demo::{parse_sizes, run_demo, run_scenario, DemoOutcome, DEFAULT_SIZES};
pub use report_format::{format_bytes, render_clean_summary, render_report};

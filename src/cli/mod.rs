use std::path::PathBuf;

use clap::Parser;

use crate::config::InputMethod;

#[derive(Debug, Parser)]
#[command(name = "malg-acta")]
#[command(about = "Concrete specimen testing workflow for the laboratory bench")]
#[command(long_about = "Drives one testing cycle after another: collect the set parameters, \
                       measure every specimen, then write receipts and update the testing registry. \
                       Configuration is read from configs/app_config.yaml unless --config is given.")]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, help = "Path to the configuration file")]
    pub config: Option<PathBuf>,

    /// Input front-end, overrides `input.method`
    #[arg(long, value_enum, help = "Input front-end to use")]
    pub input: Option<InputMethod>,

    /// Print the effective configuration as TOML and exit
    #[arg(long, help = "Print the effective configuration and exit")]
    pub print_config: bool,
}

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "ipt-converge")]
#[command(about = "Converge declarative iptables policy and verify live firewalls against it")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Build the converged firewall from configuration files and print it.
    Converge(ConvergeArgs),
    /// Check whether the active firewall matches the converged policy.
    Check(CheckArgs),
    /// Compare two rule-dump files.
    Diff(DiffArgs),
}

#[derive(Parser, Debug)]
pub struct ConvergeArgs {
    /// Configuration files, or directories holding policy/rules/primitives/macros/services files.
    #[arg(required = true)]
    pub configs: Vec<PathBuf>,
    /// Print the IPv6 policy firewall instead (it takes no rules overlay).
    #[arg(long)]
    pub ipv6: bool,
    /// Exclude comment rules from the output.
    #[arg(long)]
    pub no_comments: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Configuration files, or directories holding policy/rules/primitives/macros/services files.
    #[arg(required = true)]
    pub configs: Vec<PathBuf>,
    /// Read the active rule dump from a file instead of running iptables-save.
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Ignore comment differences when comparing firewalls.
    #[arg(long)]
    pub ignore_comments: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Print the converged and retrieved firewalls while checking.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct DiffArgs {
    pub file1: PathBuf,
    pub file2: PathBuf,
    /// Ignore comment differences.
    #[arg(long)]
    pub ignore_comments: bool,
    /// Report plain line-set differences instead of the structural diff.
    #[arg(long)]
    pub set_diff: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

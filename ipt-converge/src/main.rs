use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{ensure, Context as _, Result};
use clap::Parser;

use ipt_converge::config::Configuration;
use ipt_converge::report::{marker, render_report};
use iptables_policy_core::{
    format_json, parse, parse_file, TableDiffEntry, Tables, TablesComparison,
};

mod cli;

use cli::{CheckArgs, Cli, Command, ConvergeArgs, DiffArgs, OutputFormat};

/// Monitoring-style exit statuses: 0 OK, 1 warning, 3 unknown.
const EXIT_OK: u8 = 0;
const EXIT_WARNING: u8 = 1;
const EXIT_UNKNOWN: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Converge(args) => run_converge(args),
        Command::Check(args) => run_check(args),
        Command::Diff(args) => run_diff(args),
    };
    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("UNKNOWN: {err:#}");
            ExitCode::from(EXIT_UNKNOWN)
        }
    }
}

fn run_converge(args: ConvergeArgs) -> Result<u8> {
    let configuration = Configuration::load(&args.configs)?;
    let converged = if args.ipv6 {
        configuration.converge6()?
    } else {
        configuration.converge()?
    };

    let lines = converged.to_lines(!args.no_comments);
    match args.format {
        OutputFormat::Text => {
            for line in &lines {
                println!("{line}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&lines)?),
    }
    Ok(EXIT_OK)
}

fn run_check(args: CheckArgs) -> Result<u8> {
    let configuration = Configuration::load(&args.configs)?;
    let policy_fw = configuration
        .converge()
        .context("firewall converge failed")?;

    let active_text = active_rules(args.input.as_deref())?;
    let active_fw = parse(&active_text).context("unable to parse active firewall")?;

    if args.verbose {
        println!("{}", marker("--- CONVERGED FIREWALL BEGIN ---"));
        for line in policy_fw.to_lines(true) {
            println!("{line}");
        }
        println!("{}", marker("--- CONVERGED FIREWALL END ---"));
        println!("{}", marker("--- RETRIEVED FIREWALL BEGIN ---"));
        for line in active_fw.to_lines(true) {
            println!("{line}");
        }
        println!("{}", marker("--- RETRIEVED FIREWALL END ---"));
    }

    let mut comparison = TablesComparison::new(&active_fw, &policy_fw)?;
    if args.ignore_comments {
        comparison.ignore_comments();
    }

    let equal = comparison.equal();
    match args.format {
        OutputFormat::Text => {
            if equal {
                println!("OK: active firewall matches policy firewall");
            } else {
                println!("WARNING: firewall needs to be applied");
                println!("{}", render_report(&comparison.as_lines()));
            }
        }
        OutputFormat::Json => {
            let report = CheckReport {
                status: if equal { "ok" } else { "warning" },
                entries: comparison.to_report(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(if equal { EXIT_OK } else { EXIT_WARNING })
}

#[derive(Debug, serde::Serialize)]
struct CheckReport {
    status: &'static str,
    entries: Vec<TableDiffEntry>,
}

fn run_diff(args: DiffArgs) -> Result<u8> {
    let left = parse_file(&args.file1)
        .with_context(|| format!("failed to parse {}", args.file1.display()))?;
    let right = parse_file(&args.file2)
        .with_context(|| format!("failed to parse {}", args.file2.display()))?;

    if args.set_diff {
        return run_set_diff(&left, &right, args.format);
    }

    let mut comparison = TablesComparison::new(&left, &right)?;
    if args.ignore_comments {
        comparison.ignore_comments();
    }

    match args.format {
        OutputFormat::Text => println!("{}", render_report(&comparison.as_lines())),
        OutputFormat::Json => println!("{}", format_json(&comparison.to_report())),
    }
    Ok(if comparison.equal() { EXIT_OK } else { EXIT_WARNING })
}

fn run_set_diff(left: &Tables, right: &Tables, format: OutputFormat) -> Result<u8> {
    let diff = left.compare(right);
    match format {
        OutputFormat::Text => {
            for line in &diff.only_in_self {
                println!("- {line}");
            }
            for line in &diff.only_in_compared {
                println!("+ {line}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
    }
    let equal = diff.only_in_self.is_empty() && diff.only_in_compared.is_empty();
    Ok(if equal { EXIT_OK } else { EXIT_WARNING })
}

fn active_rules(input: Option<&Path>) -> Result<String> {
    let text = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let output = std::process::Command::new("iptables-save")
                .output()
                .context("failed to run iptables-save")?;
            ensure!(
                output.status.success(),
                "iptables-save exited with {}",
                output.status
            );
            String::from_utf8(output.stdout).context("iptables-save emitted invalid UTF-8")?
        }
    };
    ensure!(
        !text.trim().is_empty(),
        "active firewall is empty; do you have root permissions?"
    );
    Ok(text)
}

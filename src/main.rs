//! CLI entry point for the agent pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use foundry::io::config::{PipelineConfig, load_config, write_config};
use foundry::logging;
use foundry::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "foundry", version, about = "Multi-agent code generation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline for a task.
    Run {
        /// Task description, in natural language.
        task: String,
        /// Config file; missing file means defaults.
        #[arg(long, default_value = "foundry.toml")]
        config: PathBuf,
        /// Directory the workspace is created under.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Write the default config file.
    InitConfig {
        #[arg(long, default_value = "foundry.toml")]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { task, config, root } => {
            let cfg = load_config(&config)?;
            let pipeline = Pipeline::from_config(cfg, &root)?;
            let report = pipeline.run(&task)?;
            println!(
                "done: {:?} after {} iteration(s), exit code {}, artifacts in {}",
                report.stop,
                report.iterations,
                report.test_exit_code,
                report.workspace_dir.display()
            );
            Ok(())
        }
        Command::InitConfig { config, force } => {
            if config.exists() && !force {
                anyhow::bail!("{} already exists (use --force)", config.display());
            }
            write_config(&config, &PipelineConfig::default())?;
            println!("wrote {}", config.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["foundry", "run", "compute savings"]);
        match cli.command {
            Command::Run { task, .. } => assert_eq!(task, "compute savings"),
            Command::InitConfig { .. } => panic!("wrong command"),
        }
    }

    #[test]
    fn parse_init_config() {
        let cli = Cli::parse_from(["foundry", "init-config", "--force"]);
        assert!(matches!(
            cli.command,
            Command::InitConfig { force: true, .. }
        ));
    }
}

mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{EmbedArgs, SummaryArgs, TrainArgs};

/// merit: self-supervised graph representation learning with MERIT.
#[derive(Parser)]
#[command(name = "merit", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training, embedding export, and graph inspection.
#[derive(Subcommand)]
enum Command {
    /// Train the online/target encoders on one graph.
    Train {
        /// Path to merit config TOML file.
        #[arg(long, default_value = "configs/merit.toml")]
        config: PathBuf,
        /// Path to the graph JSON file.
        #[arg(long)]
        graph: PathBuf,
        /// Checkpoint directory (overrides `training.checkpoint_dir`).
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Override the number of training steps.
        #[arg(long)]
        steps: Option<usize>,
        /// Override the base learning rate.
        #[arg(long)]
        lr: Option<f64>,
        /// Override the view-sampling seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Resume from the `step_N` checkpoint in the output directory.
        #[arg(long)]
        resume_step: Option<usize>,
    },
    /// Write per-node representations from a checkpoint as JSONL.
    Embed {
        /// Path to merit config TOML file.
        #[arg(long, default_value = "configs/merit.toml")]
        config: PathBuf,
        /// Path to the graph JSON file.
        #[arg(long)]
        graph: PathBuf,
        /// Checkpoint directory (e.g. checkpoints/merit/best).
        #[arg(long)]
        checkpoint: PathBuf,
        /// Output JSONL file.
        #[arg(long)]
        output: PathBuf,
    },
    /// Print statistics of a graph JSON file.
    Summary {
        /// Path to the graph JSON file.
        #[arg(long)]
        graph: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            graph,
            output_dir,
            steps,
            lr,
            seed,
            resume_step,
        } => pipeline::run_train(TrainArgs {
            config,
            graph,
            output_dir,
            steps,
            lr,
            seed,
            resume_step,
        }),
        Command::Embed {
            config,
            graph,
            checkpoint,
            output,
        } => pipeline::run_embed(EmbedArgs {
            config,
            graph,
            checkpoint,
            output,
        }),
        Command::Summary { graph, json } => pipeline::run_summary(SummaryArgs { graph, json }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_train() {
        let cli = Cli::try_parse_from([
            "merit", "train", "--graph", "g.json", "--steps", "10", "--lr", "0.01",
        ])
        .unwrap();
        match cli.command {
            Command::Train { config, graph, steps, lr, seed, .. } => {
                assert_eq!(config, PathBuf::from("configs/merit.toml"));
                assert_eq!(graph, PathBuf::from("g.json"));
                assert_eq!(steps, Some(10));
                assert_eq!(lr, Some(0.01));
                assert!(seed.is_none());
            }
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn test_embed_requires_checkpoint() {
        assert!(Cli::try_parse_from(["merit", "embed", "--graph", "g.json", "--output", "o.jsonl"]).is_err());
    }
}

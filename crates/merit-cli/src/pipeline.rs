//! Subcommand implementations: training, embedding export, graph summary.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::prelude::*;

use merit::model::bridge::{tensor_to_rows, view_to_tensors};
use merit::model::gnn::{Gcn, GcnConfig};
use merit::training::augment::GraphView;
use merit::training::data::GraphData;
use merit::training::trainer::{load_checkpoint, train};

use crate::config::{build_merit_config, build_training_config, load_merit_toml, TrainCliOverrides};

type TrainBackend = Autodiff<NdArray<f32>>;
type InferenceBackend = NdArray<f32>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the merit config TOML file.
    pub config: PathBuf,
    /// Path to the graph JSON file.
    pub graph: PathBuf,
    /// Override for the checkpoint directory.
    pub output_dir: Option<PathBuf>,
    /// Override for the number of training steps.
    pub steps: Option<usize>,
    /// Override for the base learning rate.
    pub lr: Option<f64>,
    /// Override for the view-sampling seed.
    pub seed: Option<u64>,
    /// Resume from `{output_dir}/step_{N}`.
    pub resume_step: Option<usize>,
}

/// Arguments for the `embed` subcommand.
#[derive(Debug)]
pub struct EmbedArgs {
    pub config: PathBuf,
    pub graph: PathBuf,
    /// Checkpoint directory (e.g. `checkpoints/merit/best`).
    pub checkpoint: PathBuf,
    /// Output JSONL file, one node per line.
    pub output: PathBuf,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub graph: PathBuf,
    pub json: bool,
}

/// One line of the embeddings JSONL export.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct NodeEmbedding {
    pub node: usize,
    pub embedding: Vec<f32>,
}

fn gcn_for<B: Backend>(feature_dim: usize, d_output: usize) -> impl Fn(&B::Device) -> Gcn<B> {
    move |device| {
        GcnConfig::new(feature_dim)
            .with_d_output(d_output)
            .init::<B>(device)
    }
}

/// Train MERIT on one graph and write checkpoints.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = load_merit_toml(&args.config)?;
    let merit_config = build_merit_config(&toml.model);
    let cli = TrainCliOverrides {
        output_dir: args.output_dir,
        steps: args.steps,
        lr: args.lr,
        seed: args.seed,
    };
    let training_config = build_training_config(&toml.training, &cli);

    // 2. Load graph
    let graph = GraphData::from_json(&args.graph)?;
    let init_gnn = gcn_for::<TrainBackend>(graph.feature_dim(), merit_config.d_representation);
    let device = Default::default();

    // 3. Build or restore the objective
    let merit = match args.resume_step {
        Some(step) => {
            let dir = Path::new(&training_config.checkpoint_dir).join(format!("step_{step}"));
            tracing::info!(dir = %dir.display(), "Restoring objective for resume");
            load_checkpoint::<TrainBackend, _>(&dir, &merit_config, init_gnn, &device)?
        }
        None => merit_config.init::<TrainBackend, _>(init_gnn, &device)?,
    };

    std::fs::create_dir_all(&training_config.checkpoint_dir)?;
    let config_path = Path::new(&training_config.checkpoint_dir).join("merit_config.json");
    merit_config
        .save(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to save {}: {e}", config_path.display()))?;

    // 4. Train
    let merit = train(&training_config, merit, &graph, &device, args.resume_step)?;
    let drift = merit.target_drift()?;

    tracing::info!(
        checkpoint_dir = %training_config.checkpoint_dir,
        target_drift = drift,
        elapsed_secs = format!("{:.1}", start.elapsed().as_secs_f64()),
        "Training finished"
    );
    Ok(())
}

/// Export per-node GNN representations from a checkpoint as JSONL.
pub fn run_embed(args: EmbedArgs) -> anyhow::Result<()> {
    let toml = load_merit_toml(&args.config)?;
    let merit_config = build_merit_config(&toml.model);
    let graph = GraphData::from_json(&args.graph)?;
    let device = Default::default();

    let init_gnn = gcn_for::<InferenceBackend>(graph.feature_dim(), merit_config.d_representation);
    let merit = load_checkpoint::<InferenceBackend, _>(&args.checkpoint, &merit_config, init_gnn, &device)?;

    let view = view_to_tensors(&GraphView::from_graph(&graph), &device);
    let reps = merit.embed(view, toml.training.sparse.unwrap_or(false));
    let [batch, nodes, dim] = reps.dims();
    let rows = tensor_to_rows(reps.reshape([batch * nodes, dim]));

    let file = std::fs::File::create(&args.output)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    for (node, embedding) in rows.into_iter().enumerate() {
        serde_json::to_writer(&mut writer, &NodeEmbedding { node, embedding })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    tracing::info!(
        nodes = batch * nodes,
        dim,
        output = %args.output.display(),
        "Wrote embeddings"
    );
    Ok(())
}

/// Print statistics of a graph file.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let graph = GraphData::from_json(&args.graph)?;
    let summary = graph.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Graph: {}", args.graph.display());
        println!("  nodes:          {}", summary.num_nodes);
        println!("  edges:          {}", summary.num_edges);
        println!("  feature dim:    {}", summary.feature_dim);
        println!("  isolated nodes: {}", summary.isolated_nodes);
        println!("  mean degree:    {:.2}", summary.mean_degree);
    }
    Ok(())
}

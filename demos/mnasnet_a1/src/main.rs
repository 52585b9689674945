#![recursion_limit = "256"]

use anyhow::{Context, anyhow};
use burn::backend::NdArray;
use burn::config::Config;
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;
use clap::Parser;
use mnasnet::models::mnasnet::prefabs::{list_prefabs, lookup_prefab};
use mnasnet::models::mnasnet::{HeadPoolConfig, MnasNet, MnasNetAbstractConfig};
use mnasnet::utility::params::numel;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Name of the model prefab.
    #[arg(long, default_value = "mnasnet_a1")]
    prefab: String,

    /// Override the prefab width multiplier.
    #[arg(long)]
    width_mult: Option<f64>,

    /// Override the prefab class count.
    #[arg(long)]
    num_classes: Option<usize>,

    /// Load the model config from a JSON file, instead of a prefab.
    #[arg(long)]
    config: Option<String>,

    /// Write the effective model config to a JSON file.
    #[arg(long)]
    save_config: Option<String>,

    /// Pool the head globally; needed for inputs outside 193..=416.
    #[arg(long)]
    global_pool: bool,

    /// Input batch size.
    #[arg(long, default_value = "1")]
    batch_size: usize,

    /// Input resolution.
    #[arg(long, default_value = "224")]
    resolution: usize,

    /// Random seed.
    #[arg(long, default_value = "0")]
    seed: u64,
}

fn model_config(args: &Args) -> anyhow::Result<MnasNetAbstractConfig> {
    let mut config = match &args.config {
        Some(path) => MnasNetAbstractConfig::load(path)
            .map_err(|err| anyhow!("{err:?}"))
            .with_context(|| format!("loading config from {path}"))?,
        None => lookup_prefab(&args.prefab)
            .ok_or_else(|| {
                anyhow!(
                    "unknown prefab {:?}; expected one of {:?}",
                    args.prefab,
                    list_prefabs()
                )
            })?
            .new_config(),
    };

    if let Some(width_mult) = args.width_mult {
        config = config.with_width_mult(width_mult);
    }
    if let Some(num_classes) = args.num_classes {
        config = config.with_num_classes(num_classes);
    }
    if args.global_pool {
        config = config.with_pool(HeadPoolConfig::Global);
    }

    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    type B = NdArray<f32>;
    let device = Default::default();
    B::seed(args.seed);

    let config = model_config(&args)?;
    tracing::info!(
        width_mult = config.width_mult,
        num_classes = config.num_classes,
        "model config"
    );

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("saving config to {path}"))?;
        tracing::info!(path = %path, "saved config");
    }

    let model: MnasNet<B> = config.to_structure().init(&device);

    let input: Tensor<B, 4> = Tensor::random(
        [args.batch_size, 3, args.resolution, args.resolution],
        Distribution::Normal(0.0, 1.0),
        &device,
    );
    tracing::info!(shape = ?input.dims(), "forward");
    let output = model.forward(input);

    println!("output shape: {:?}", output.dims());
    println!("learnable params: {}", numel(&model));

    Ok(())
}

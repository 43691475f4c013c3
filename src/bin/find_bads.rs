use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use faster::{
    find_bad_channels, find_bad_channels_in_epochs, find_bad_epochs, io::load_epochs,
    BadChannelsInEpochsParams, BadChannelsParams, BadEpochsParams, Method,
};

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    Channels,
    Epochs,
    ChannelsInEpochs,
}

#[derive(Parser)]
#[command(name = "find_bads", about = "FASTER bad channel / epoch detection")]
struct Args {
    /// Epochs safetensors file (data, sfreq, ch_names, ch_kind, ch_loc, bads)
    #[arg(long)]
    input: PathBuf,

    /// What to look for
    #[arg(long, value_enum, default_value_t = Level::Channels)]
    level: Level,

    /// Detection parameters as JSON, e.g. '{"thresh": 2.5}'
    #[arg(long)]
    params: Option<String>,

    /// Report findings per metric instead of combined
    #[arg(long)]
    by_metric: bool,

    /// Detection method
    #[arg(long, default_value = "faster")]
    method: String,
}

fn params<T: serde::de::DeserializeOwned + Default>(json: &Option<String>) -> Result<T> {
    match json {
        Some(s) => serde_json::from_str(s).context("parsing --params"),
        None => Ok(T::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let method: Method = args.method.parse()?;
    let epochs = load_epochs(&args.input)?;

    let out = match args.level {
        Level::Channels => {
            let p: BadChannelsParams = params(&args.params)?;
            serde_json::to_string_pretty(&find_bad_channels(&epochs, None, method, &p, args.by_metric)?)?
        }
        Level::Epochs => {
            let p: BadEpochsParams = params(&args.params)?;
            serde_json::to_string_pretty(&find_bad_epochs(&epochs, None, method, &p, args.by_metric)?)?
        }
        Level::ChannelsInEpochs => {
            let p: BadChannelsInEpochsParams = params(&args.params)?;
            serde_json::to_string_pretty(&find_bad_channels_in_epochs(&epochs, None, method, &p, args.by_metric)?)?
        }
    };
    println!("{out}");
    Ok(())
}

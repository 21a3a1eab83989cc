// src/runtime_interface.rs

use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};

use crate::accelerator::{GpuMode, SystemProbe};
use crate::checkpoint;
use crate::config::GanParams;
use crate::constraints::get_min_max_constraints;
use crate::error::GanError;
use crate::generator::{describe_network, MlpGenerator};
use crate::history::{OptimHistory, TrainingSummary};
use crate::metrics;
use crate::phsp_io;
use crate::sampling::{generate_samples, GenerateOptions};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Phase space GAN utilities", long_about = None)]
pub struct CliArgs {
    /// Report the selected device and host resources
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the training parameters and the generator network
    Info {
        checkpoint: PathBuf,
    },
    /// Generate samples from a trained generator
    Generate {
        checkpoint: PathBuf,
        #[clap(short = 'n', long = "number")]
        n: usize,
        /// Samples per forward pass (all at once when omitted)
        #[clap(long)]
        batch_size: Option<usize>,
        /// Keep samples in normalised units
        #[clap(long)]
        normalized: bool,
        /// auto, true or false
        #[clap(long, default_value = "auto")]
        gpu: String,
        #[clap(short, long)]
        output: PathBuf,
    },
    /// Compare a generated sample table against a reference one
    Compare {
        reference: PathBuf,
        generated: PathBuf,
        #[clap(long, default_value_t = 200)]
        bins: usize,
        #[clap(long, default_value_t = 0.0)]
        margin: f64,
        #[clap(long, default_value_t = 100)]
        directions: usize,
        #[clap(long, default_value_t = 2.0)]
        p: f64,
    },
    /// Write a checkpoint holding a freshly initialised generator
    Init {
        params: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
    },
}

pub fn run_cli() -> Result<(), Box<dyn Error>> {
    run(CliArgs::parse())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn Error>> {
    match args.command {
        Command::Info { checkpoint } => info_command(&checkpoint, args.verbose),
        Command::Generate { checkpoint, n, batch_size, normalized, gpu, output } => {
            let mode = GpuMode::from_flag(&gpu);
            generate_command(&checkpoint, n, batch_size, normalized, mode, &output, args.verbose)
        }
        Command::Compare { reference, generated, bins, margin, directions, p } => {
            compare_command(&reference, &generated, bins, margin, directions, p)
        }
        Command::Init { params, output } => init_command(&params, &output),
    }
}

fn info_command(path: &Path, verbose: bool) -> Result<(), Box<dyn Error>> {
    let gan = checkpoint::load(path, verbose)?;
    let summary = TrainingSummary::new(&gan.params, &gan.optim)?;
    println!("{}", summary);
    println!("{}", describe_network(&gan.generator));
    Ok(())
}

fn generate_command(
    path: &Path,
    n: usize,
    batch_size: Option<usize>,
    normalized: bool,
    mode: GpuMode,
    output: &Path,
    verbose: bool,
) -> Result<(), Box<dyn Error>> {
    let gan = checkpoint::load_with_mode(path, mode, &SystemProbe, verbose)?;
    let options = GenerateOptions { batch_size, un_norm: !normalized, to_host: true };
    let samples = generate_samples(&gan.params, &gan.generator, n, options)?.into_host();
    phsp_io::write_samples(output, &gan.params.keys, samples.view())?;
    info!("Wrote {} samples to {}", samples.nrows(), output.display());
    Ok(())
}

fn compare_command(
    reference: &Path,
    generated: &Path,
    bins: usize,
    margin: f64,
    directions: usize,
    p: f64,
) -> Result<(), Box<dyn Error>> {
    let reference = phsp_io::read_samples(reference)?;
    let generated = phsp_io::read_samples(generated)?;
    if reference.keys.len() != generated.keys.len() {
        return Err(Box::new(GanError::ShapeMismatch(format!(
            "reference has {} features, generated has {}",
            reference.keys.len(),
            generated.keys.len()
        ))));
    }

    let jsd = metrics::jsd_per_feature(reference.values.view(), generated.values.view(), bins, margin)?;
    for (key, value) in reference.keys.iter().zip(&jsd) {
        println!("   {:20} {:.6}", format!("JSD {}", key), value);
    }

    let rows = reference.values.nrows().min(generated.values.nrows());
    if rows != reference.values.nrows() || rows != generated.values.nrows() {
        info!("Sliced Wasserstein distance computed on the first {} samples of each table", rows);
    }
    let x = reference.values.slice(ndarray::s![..rows, ..]);
    let y = generated.values.slice(ndarray::s![..rows, ..]);
    let swd = metrics::sliced_wasserstein(x, y, directions, p)?;
    println!("   {:20} {:.6}", "SWD", swd);
    Ok(())
}

fn init_command(params_path: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
    let path = params_path
        .to_str()
        .ok_or_else(|| GanError::InvalidArgument(format!("invalid path {}", params_path.display())))?;
    let params = GanParams::load(path)?;
    let bounds = get_min_max_constraints(&params)?;
    let mut generator = MlpGenerator::from_params(&params, bounds)?;
    generator.init_random(&mut rand::thread_rng());
    checkpoint::save(output, &params, &generator, &OptimHistory::new())?;
    println!("{}", describe_network(&generator));
    Ok(())
}

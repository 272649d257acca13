//! Randomized hyperparameter search over a CSV dataset
//!
//! Usage: cargo run --bin random_search -- --data dataset.csv

use anyhow::{bail, Context, Result};
use clap::Parser;
use mlp_search::search::{RandomizedSearchCv, SearchSpace, TrialResult};
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

#[derive(Parser, Debug)]
#[command(author, version, about = "Randomized hyperparameter search for an MLP classifier")]
struct Args {
    /// Input data file (CSV; feature columns followed by an integer label column)
    #[arg(short, long)]
    data: String,

    /// Output results file
    #[arg(short, long, default_value = "search_results.csv")]
    output: String,

    /// Number of sampled configurations
    #[arg(short = 'n', long, default_value = "4")]
    iterations: usize,

    /// Cross-validation fold count
    #[arg(long, default_value = "5")]
    folds: usize,

    /// Training epochs per fold
    #[arg(short, long, default_value = "15")]
    epochs: usize,

    /// Mini-batch size
    #[arg(short, long, default_value = "1024")]
    batch_size: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Loading data from {}...", args.data);
    let (features, labels) = load_dataset(&args.data)?;
    let n_class = labels.iter().max().map_or(0, |&m| m + 1);
    println!(
        "Loaded {} samples, {} features, {} classes",
        features.nrows(),
        features.ncols(),
        n_class
    );

    let space = SearchSpace::default();
    let search = RandomizedSearchCv::new(args.iterations, args.folds)
        .with_epochs(args.epochs)
        .with_batch_size(args.batch_size);

    println!(
        "\nSampling {} configurations, {}-fold cross-validation...\n",
        args.iterations, args.folds
    );
    let outcome = search.fit(&space, &features, &labels, n_class);

    let mut ranked: Vec<&TrialResult> = outcome.trials.iter().collect();
    ranked.sort_by(|a, b| b.mean_accuracy.total_cmp(&a.mean_accuracy));

    println!("Results (best first):");
    for (rank, trial) in ranked.iter().enumerate() {
        match &trial.error {
            Some(error) => println!("  {}. rejected ({})", rank + 1, error),
            None => println!(
                "  {}. acc={:.4} (+/- {:.4})  hidden={:?} dropout={} l2={}",
                rank + 1,
                trial.mean_accuracy,
                trial.std_accuracy * 2.0,
                trial.config.hidden_layers,
                trial.config.dropout_rate,
                trial.config.l2_penalty,
            ),
        }
    }

    save_results(&args.output, &outcome.trials)?;
    println!("\nResults saved to {}", args.output);

    if let Some(best) = &outcome.best {
        println!("\n=== Best Configuration ===");
        println!("Hidden layers: {:?}", best.config.hidden_layers);
        println!("Dropout rate: {}", best.config.dropout_rate);
        println!("L2 penalty: {}", best.config.l2_penalty);
        println!("Optimizer: {:?}", best.config.optimizer);
        println!("Mean CV accuracy: {:.4}", best.mean_accuracy);
        println!("\n{}", serde_json::to_string_pretty(&best.config)?);
    }

    Ok(())
}

/// Parse a CSV of numeric feature columns with a trailing integer label
/// column. A non-numeric first line is treated as a header and skipped.
fn load_dataset(path: &str) -> Result<(Array2<f64>, Array1<usize>)> {
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    let reader = BufReader::new(file);

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut labels: Vec<usize> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            bail!("line {}: need at least one feature and a label", line_no + 1);
        }

        let values: Result<Vec<f64>, _> = parts.iter().map(|p| p.parse::<f64>()).collect();
        let values = match values {
            Ok(values) => values,
            Err(_) if line_no == 0 => continue, // header
            Err(err) => bail!("line {}: {}", line_no + 1, err),
        };

        let (label, features) = values
            .split_last()
            .context("empty row after parsing")?;
        if label.fract() != 0.0 || *label < 0.0 {
            bail!("line {}: label must be a non-negative integer", line_no + 1);
        }

        rows.push(features.to_vec());
        labels.push(*label as usize);
    }

    if rows.is_empty() {
        bail!("no data rows in {}", path);
    }

    let n_features = rows[0].len();
    if rows.iter().any(|r| r.len() != n_features) {
        bail!("inconsistent column counts in {}", path);
    }

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let features = Array2::from_shape_vec((labels.len(), n_features), flat)?;

    Ok((features, Array1::from_vec(labels)))
}

fn save_results(path: &str, trials: &[TrialResult]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path))?;
    writeln!(
        file,
        "hidden_layers,dropout_rate,l2_penalty,mean_accuracy,std_accuracy,error"
    )?;

    for trial in trials {
        let hidden: Vec<String> = trial
            .config
            .hidden_layers
            .iter()
            .map(|w| w.to_string())
            .collect();
        writeln!(
            file,
            "{},{},{},{:.6},{:.6},{}",
            hidden.join("|"),
            trial.config.dropout_rate,
            trial.config.l2_penalty,
            trial.mean_accuracy,
            trial.std_accuracy,
            trial.error.as_deref().unwrap_or(""),
        )?;
    }

    Ok(())
}

//! sign_eval - hold-out evaluation of the nearest-neighbour sign classifier
//!
//! Loads a dataset laid out as `<data>/<label>/*.png`, shuffles it with a fixed
//! seed, keeps a test fraction aside and classifies it against the rest.
//! Prints the confusion matrix (rows: actual, columns: predicted), accuracy and
//! per-class precision; `--json` writes the same report as JSON.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;

use signpilot::classify::{
    evaluate, list_labelled_images, load_features, split_holdout, Evaluation, Reference,
};
use signpilot::ReferenceSet;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "sign_eval", about = "Hold-out evaluation of the sign classifier")]
struct Args {
    /// Dataset root with one sub-directory per class
    #[arg(long, default_value = "data/train", value_name = "DIR")]
    data: PathBuf,

    /// Neighbours consulted per vote
    #[arg(long, default_value_t = 5)]
    k: usize,

    /// Fraction of the samples held out for testing
    #[arg(long, default_value_t = 0.25)]
    test_fraction: f64,

    /// Shuffle seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write the report as JSON to this path
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Serialize)]
struct Report<'a> {
    data: String,
    seed: u64,
    test_fraction: f64,
    train_samples: usize,
    accuracy: f64,
    precision: Vec<Option<f64>>,
    #[serde(flatten)]
    evaluation: &'a Evaluation,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let images = {
        let _stage = ui.stage("List dataset");
        list_labelled_images(&args.data)?
    };
    if images.is_empty() {
        return Err(anyhow!(
            "no images found in {}; expected <data>/<class>/*.png",
            args.data.display()
        ));
    }

    let samples = {
        let mut stage = ui.progress("Decode images", images.len() as u64);
        let mut samples = Vec::with_capacity(images.len());
        for (path, label) in images {
            samples.push(Reference::new(load_features(&path)?, label));
            stage.inc();
        }
        samples
    };

    let (train, test) = split_holdout(samples, args.test_fraction, args.seed)?;
    let train_samples = train.len();
    let evaluation = {
        let _stage = ui.stage(&format!("Classify {} held-out samples", test.len()));
        evaluate(ReferenceSet::new(train)?, &test, args.k)?
    };

    print_report(&evaluation, train_samples);

    if let Some(path) = &args.json {
        let report = Report {
            data: args.data.display().to_string(),
            seed: args.seed,
            test_fraction: args.test_fraction,
            train_samples,
            accuracy: evaluation.accuracy(),
            precision: evaluation.precision_per_class(),
            evaluation: &evaluation,
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn print_report(evaluation: &Evaluation, train_samples: usize) {
    let labels: Vec<String> = evaluation.labels.iter().map(|l| l.to_string()).collect();
    let width = labels.iter().map(|l| l.len()).max().unwrap_or(0).max(6);

    println!(
        "k={}  train={}  test={}",
        evaluation.k, train_samples, evaluation.samples
    );
    println!("Classes: {}", labels.join(", "));
    println!("Confusion matrix (rows: actual, columns: predicted):");
    print!("{:>width$}", "", width = width);
    for label in &labels {
        print!(" {:>width$}", label, width = width);
    }
    println!();
    for (label, row) in labels.iter().zip(&evaluation.confusion) {
        print!("{:>width$}", label, width = width);
        for count in row {
            print!(" {:>width$}", count, width = width);
        }
        println!();
    }
    println!(
        "Accuracy: {:.4} ({}/{})",
        evaluation.accuracy(),
        evaluation.correct(),
        evaluation.samples
    );
    println!("Precision per class:");
    for (label, precision) in labels.iter().zip(evaluation.precision_per_class()) {
        match precision {
            Some(p) => println!("  {:>width$}: {:.4}", label, p, width = width),
            None => println!("  {:>width$}: n/a (never predicted)", label, width = width),
        }
    }
}

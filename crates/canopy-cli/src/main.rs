//! canopy command-line interface.
//!
//! Certifies the local robustness of tree-ensemble classifiers: for each
//! dataset sample it builds an adversarial region, runs the stability
//! verifier, and reports STABLE / UNSTABLE / UNKNOWN together with
//! per-dataset statistics.

use anyhow::{Context, Result};
use canopy_core::{StabilityReport, Verdict};
use canopy_data::{read_classifier_from_path, read_tiers_from_path, Dataset, RegionStream};
use canopy_model::{Classifier, VotingScheme};
use canopy_verify::{
    AdversarialRegion, AnalysisOptions, Perturbation, SearchParams, StabilityVerifier, Tier,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Voting scheme selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum VotingArg {
    /// One vote per tree, to every label tying for its maximum
    #[default]
    Max,
    /// Average of per-tree probabilities
    Average,
    /// Softargmax over summed log-probabilities
    Softargmax,
}

impl From<VotingArg> for VotingScheme {
    fn from(arg: VotingArg) -> Self {
        match arg {
            VotingArg::Max => VotingScheme::Max,
            VotingArg::Average => VotingScheme::Average,
            VotingArg::Softargmax => VotingScheme::Softargmax,
        }
    }
}

#[derive(Parser)]
#[command(name = "canopy")]
#[command(version)]
#[command(about = "Robustness certification for tree-ensemble classifiers", long_about = None)]
struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the stability of every dataset sample
    Verify {
        /// Path to the classifier (text format)
        classifier: PathBuf,

        /// Path to the dataset (CSV: label,x1,…,xn)
        dataset: PathBuf,

        /// Voting scheme for forests
        #[arg(long, value_enum, default_value_t = VotingArg::Max)]
        voting: VotingArg,

        /// L∞ perturbation radius
        #[arg(short, long, default_value = "0.01")]
        epsilon: f64,

        /// Clip every perturbed dimension to this lower bound
        #[arg(long, requires = "clip_max")]
        clip_min: Option<f64>,

        /// Clip every perturbed dimension to this upper bound
        #[arg(long, requires = "clip_min")]
        clip_max: Option<f64>,

        /// Read one explicit region per sample from this file instead of
        /// perturbing (whitespace-separated [l;u] pairs)
        #[arg(long, conflicts_with_all = ["epsilon", "clip_min", "clip_max"])]
        regions: Option<PathBuf>,

        /// One-hot tier groups, one id per feature (0 = untiered)
        #[arg(long)]
        tiers: Option<PathBuf>,

        /// Per-sample wall-clock timeout in seconds (minimum 1)
        #[arg(short, long, default_value = "60")]
        timeout: u64,

        /// Append counterexample regions to this file
        #[arg(long)]
        counterexamples: Option<PathBuf>,

        /// Analyse samples in parallel on this many threads (1 = serial)
        #[arg(short, long, default_value = "1")]
        jobs: usize,

        /// Weight of a region's volume in the search priority
        #[arg(long, default_value_t = SearchParams::default().volume_weight)]
        volume_weight: f64,

        /// Weight of a decorator's depth in the search priority
        #[arg(long, default_value_t = SearchParams::default().depth_weight)]
        depth_weight: f64,

        /// Weight of the label divergence in the search priority
        #[arg(long, default_value_t = SearchParams::default().divergence_weight)]
        divergence_weight: f64,

        /// Emit a JSON report instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Load a classifier and print its structure
    Inspect {
        /// Path to the classifier (text format)
        classifier: PathBuf,

        /// Voting scheme for forests
        #[arg(long, value_enum, default_value_t = VotingArg::Max)]
        voting: VotingArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Outcome of one sample, crossing correctness with the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum Outcome {
    /// Correctly classified and stable.
    Robust,
    /// Correctly classified but a counterexample exists.
    Fragile,
    /// Misclassified yet stable in the misclassification.
    Vulnerable,
    /// Misclassified and unstable.
    Broken,
    /// The analysis was inconclusive.
    NoInfo,
}

impl Outcome {
    fn new(correct: bool, verdict: Verdict) -> Self {
        match verdict {
            Verdict::Stable if correct => Outcome::Robust,
            Verdict::Stable => Outcome::Vulnerable,
            Verdict::Unstable if correct => Outcome::Fragile,
            Verdict::Unstable => Outcome::Broken,
            Verdict::Unknown => Outcome::NoInfo,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Robust => "ROBUST",
            Outcome::Fragile => "FRAGILE",
            Outcome::Vulnerable => "VULNERABLE",
            Outcome::Broken => "BROKEN",
            Outcome::NoInfo => "NO-INFO",
        }
    }
}

#[derive(Debug, Serialize)]
struct SampleRow {
    id: usize,
    true_label: String,
    predicted: Vec<String>,
    correct: bool,
    verdict: Verdict,
    outcome: Outcome,
    elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<StabilityReport>,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    size: usize,
    elapsed_secs: f64,
    correct: usize,
    wrong: usize,
    stable: usize,
    unstable: usize,
    no_info: usize,
    robust: usize,
    fragile: usize,
    vulnerable: usize,
    broken: usize,
}

impl Summary {
    fn record(&mut self, row: &SampleRow) {
        self.size += 1;
        if row.correct {
            self.correct += 1;
        } else {
            self.wrong += 1;
        }
        match row.verdict {
            Verdict::Stable => self.stable += 1,
            Verdict::Unstable => self.unstable += 1,
            Verdict::Unknown => self.no_info += 1,
        }
        match row.outcome {
            Outcome::Robust => self.robust += 1,
            Outcome::Fragile => self.fragile += 1,
            Outcome::Vulnerable => self.vulnerable += 1,
            Outcome::Broken => self.broken += 1,
            Outcome::NoInfo => {}
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the log subscriber")?;

    match cli.command {
        Commands::Verify {
            classifier,
            dataset,
            voting,
            epsilon,
            clip_min,
            clip_max,
            regions,
            tiers,
            timeout,
            counterexamples,
            jobs,
            volume_weight,
            depth_weight,
            divergence_weight,
            json,
        } => run_verify(VerifyArgs {
            classifier,
            dataset,
            voting: voting.into(),
            epsilon,
            clip: clip_min.zip(clip_max),
            regions,
            tiers,
            timeout,
            counterexamples,
            jobs,
            params: SearchParams {
                volume_weight,
                depth_weight,
                divergence_weight,
            },
            json,
        }),
        Commands::Inspect {
            classifier,
            voting,
            json,
        } => run_inspect(&classifier, voting.into(), json),
    }
}

struct VerifyArgs {
    classifier: PathBuf,
    dataset: PathBuf,
    voting: VotingScheme,
    epsilon: f64,
    clip: Option<(f64, f64)>,
    regions: Option<PathBuf>,
    tiers: Option<PathBuf>,
    timeout: u64,
    counterexamples: Option<PathBuf>,
    jobs: usize,
    params: SearchParams,
    json: bool,
}

fn run_verify(args: VerifyArgs) -> Result<()> {
    let classifier = read_classifier_from_path(&args.classifier, args.voting)
        .with_context(|| format!("failed to load classifier {}", args.classifier.display()))?;
    let dataset = Dataset::read_path(&args.dataset)
        .with_context(|| format!("failed to load dataset {}", args.dataset.display()))?;

    if dataset.dimension() != classifier.dimension() {
        anyhow::bail!(
            "dataset has {} features but the classifier expects {}",
            dataset.dimension(),
            classifier.dimension()
        );
    }

    let tier = match &args.tiers {
        Some(path) => read_tiers_from_path(path)
            .with_context(|| format!("failed to load tiers {}", path.display()))?,
        None => Tier::untiered(classifier.dimension()),
    };
    tier.check_dimension(classifier.dimension())?;

    let options = AnalysisOptions::new(args.timeout)?.with_params(args.params);

    // Per-sample perturbations: either one explicit region per sample,
    // or the same ball applied to every reference sample.
    let perturbations: Vec<Perturbation> = match &args.regions {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open regions {}", path.display()))?;
            let mut stream = RegionStream::new(std::io::BufReader::new(file));
            (0..dataset.len())
                .map(|_| {
                    Ok(Perturbation::Explicit(
                        stream.next_region(classifier.dimension())?,
                    ))
                })
                .collect::<canopy_data::Result<_>>()?
        }
        None => {
            let p = match args.clip {
                Some((min, max)) => Perturbation::l_inf_clip(args.epsilon, min, max)?,
                None => Perturbation::l_inf(args.epsilon)?,
            };
            vec![p; dataset.len()]
        }
    };

    info!(
        samples = dataset.len(),
        dimension = classifier.dimension(),
        timeout_secs = args.timeout,
        jobs = args.jobs,
        "starting stability analysis"
    );

    let analyse = |i: usize| -> Result<SampleRow> {
        let sample = dataset.sample(i);
        let region = AdversarialRegion {
            sample,
            perturbation: &perturbations[i],
        }
        .to_hyperrectangle()?;

        let started = Instant::now();
        let predicted = classifier.classify(sample)?;
        let mut verifier = StabilityVerifier::new(&classifier, tier.clone(), options.clone())?;
        let report = verifier.verify_sample(sample, predicted.clone(), &region)?;
        let elapsed_secs = started.elapsed().as_secs_f64();

        let correct = predicted.is_singleton()
            && classifier
                .label_index(dataset.label(i))
                .is_some_and(|idx| predicted.contains(idx));

        debug!(sample = i, verdict = %report.verdict, elapsed_secs, "sample analysed");

        Ok(SampleRow {
            id: i,
            true_label: dataset.label(i).to_string(),
            predicted: classifier
                .label_names(&predicted)
                .into_iter()
                .map(str::to_string)
                .collect(),
            correct,
            verdict: report.verdict,
            outcome: Outcome::new(correct, report.verdict),
            elapsed_secs,
            report: Some(report),
        })
    };

    if !args.json {
        print_header();
    }

    let total = Instant::now();
    let rows: Vec<SampleRow> = if args.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.jobs)
            .build()
            .context("failed to build the worker pool")?;
        pool.install(|| {
            use rayon::prelude::*;
            (0..dataset.len())
                .into_par_iter()
                .map(analyse)
                .collect::<Result<Vec<SampleRow>>>()
        })?
    } else {
        let mut rows = Vec::with_capacity(dataset.len());
        for i in 0..dataset.len() {
            let row = analyse(i)?;
            if !args.json {
                print_row(&row);
            }
            rows.push(row);
        }
        rows
    };
    let wall_secs = total.elapsed().as_secs_f64();

    if args.jobs > 1 && !args.json {
        for row in &rows {
            print_row(row);
        }
    }

    if let Some(path) = &args.counterexamples {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for row in &rows {
            if let Some(witness) = row.report.as_ref().and_then(|r| r.witness.as_ref()) {
                canopy_data::write_counterexample(&mut file, row.id, &witness.region)?;
            }
        }
    }

    let mut summary = Summary::default();
    for row in &rows {
        summary.record(row);
    }
    summary.elapsed_secs = wall_secs;

    if args.json {
        let report = serde_json::json!({ "samples": rows, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_header() {
    println!(
        "{:>8} {:>10} {:>16} {:>10} {:>10}",
        "ID", "Label", "Predicted", "Result", "Time (s)"
    );
}

fn print_row(row: &SampleRow) {
    println!(
        "{:>8} {:>10} {:>16} {:>10} {:>10.4}",
        row.id,
        row.true_label,
        row.predicted.join(","),
        row.outcome.as_str(),
        row.elapsed_secs,
    );
}

fn print_summary(summary: &Summary) {
    println!(
        "[SUMMARY] {:>8} {:>10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10} {:>8}",
        "Size",
        "Time (s)",
        "Correct",
        "Wrong",
        "Stable",
        "Unstable",
        "No info",
        "Robust",
        "Fragile",
        "Vulnerable",
        "Broken"
    );
    println!(
        "[SUMMARY] {:>8} {:>10.3} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10} {:>8}",
        summary.size,
        summary.elapsed_secs,
        summary.correct,
        summary.wrong,
        summary.stable,
        summary.unstable,
        summary.no_info,
        summary.robust,
        summary.fragile,
        summary.vulnerable,
        summary.broken
    );
}

#[derive(Debug, Serialize)]
struct TreeInfo {
    nodes: usize,
    leaves: usize,
    depth: usize,
}

#[derive(Debug, Serialize)]
struct ClassifierInfo {
    kind: &'static str,
    dimension: usize,
    labels: Vec<String>,
    trees: Vec<TreeInfo>,
}

fn run_inspect(path: &PathBuf, voting: VotingScheme, json: bool) -> Result<()> {
    let classifier = read_classifier_from_path(path, voting)
        .with_context(|| format!("failed to load classifier {}", path.display()))?;

    let trees: Vec<TreeInfo> = match &classifier {
        Classifier::Tree(tree) => vec![tree],
        Classifier::Forest(forest) => forest.trees().iter().collect(),
    }
    .into_iter()
    .map(|t| TreeInfo {
        nodes: t.n_nodes(),
        leaves: t.n_leaves(),
        depth: t.max_depth(),
    })
    .collect();

    let info = ClassifierInfo {
        kind: match &classifier {
            Classifier::Tree(_) => "decision-tree",
            Classifier::Forest(_) => "forest",
        },
        dimension: classifier.dimension(),
        labels: classifier.labels().to_vec(),
        trees,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}: {}", info.kind, path.display());
    println!("  features: {}", info.dimension);
    println!("  labels:   {}", info.labels.join(", "));
    println!("  trees:    {}", info.trees.len());
    let mut out = std::io::stdout().lock();
    for (i, tree) in info.trees.iter().enumerate() {
        writeln!(
            out,
            "    tree {i}: {} nodes, {} leaves, depth {}",
            tree.nodes, tree.leaves, tree.depth
        )?;
    }
    Ok(())
}

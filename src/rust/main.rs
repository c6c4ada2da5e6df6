use std::fs::{self, File};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger;
use lexcarf::training::write_filtered;
use lexcarf::{
    ArtifactStore, CaseRecord, DatasetReader, Denylist, InputWarning, Predictor, TrainingConfig, TrainingPipeline,
    TrainingProfile, VotingOutcome,
};
use log::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bundle store directory (defaults to $LEXCARF_HOME/bundles or the platform data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Name of the bundle to train, load or verify
    #[arg(long, global = true, default_value = "carf")]
    name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a bundle from a historical CSV dataset
    Train {
        /// Training dataset
        #[arg(long)]
        data: PathBuf,
        /// Evaluation dataset (e.g. the following year)
        #[arg(long)]
        test: Option<PathBuf>,
        /// cross_year or single_year
        #[arg(long)]
        profile: Option<TrainingProfile>,
        /// JSON training configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON denylist replacing the built-in one
        #[arg(long)]
        denylist: Option<PathBuf>,
        /// Stratified holdout fraction when no test dataset is given
        #[arg(long)]
        holdout: Option<f64>,
        /// Write the training report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Predict the outcome of one case
    Predict {
        #[arg(long)]
        tax_type: Option<String>,
        #[arg(long)]
        panel: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report and remove records whose summary reveals the outcome
    ScanLeakage {
        #[arg(long)]
        input: PathBuf,
        /// Cleaned copy of the input; only the report is produced when omitted
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        denylist: Option<PathBuf>,
    },
    /// Check a stored bundle against its checksum
    Verify,
}

fn open_store(dir: Option<PathBuf>) -> Result<ArtifactStore> {
    let store = match dir {
        Some(dir) => ArtifactStore::new(&dir),
        None => ArtifactStore::new_default(),
    };
    store.context("failed to open bundle store")
}

fn load_denylist(path: Option<PathBuf>) -> Result<Denylist> {
    match path {
        Some(path) => Ok(Denylist::from_file(path)?),
        None => Ok(Denylist::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Train {
            data,
            test,
            profile,
            config,
            denylist,
            holdout,
            report,
        } => {
            let start_time = Instant::now();
            let mut training_config = match config {
                Some(path) => TrainingConfig::from_file(path)?,
                None => TrainingConfig::default(),
            };
            if let Some(profile) = profile {
                training_config.profile = profile;
            }

            let mut builder = TrainingPipeline::builder()
                .with_config(training_config)
                .with_denylist(load_denylist(denylist)?);
            if let Some(fraction) = holdout {
                builder = builder.with_holdout_fraction(fraction)?;
            }
            let pipeline = builder.build()?;

            let train_records = DatasetReader::new(&data).read_records()?;
            let test_records = match test {
                Some(path) => Some(DatasetReader::new(path).read_records()?),
                None => None,
            };

            let (bundle, training_report) = pipeline.fit(train_records, test_records)?;
            let store = open_store(args.store)?;
            let path = store.save(&args.name, &bundle)?;
            info!("=== Training complete (took {:.2?}) ===", start_time.elapsed());
            println!("Bundle '{}' written to {}", args.name, path.display());

            if let Some(evaluation) = &training_report.evaluation {
                println!(
                    "Disposition accuracy on {} held-out records: {:.3}",
                    evaluation.records, evaluation.disposition.accuracy
                );
                if let Some(voting) = &evaluation.voting {
                    println!("Voting accuracy: {:.3}", voting.accuracy);
                }
            }
            if let Some(path) = report {
                fs::write(&path, serde_json::to_string_pretty(&training_report)?)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
            }
        }
        Command::Predict {
            tax_type,
            panel,
            summary,
            json,
        } => {
            let store = open_store(args.store)?;
            let bundle = lexcarf::runtime::initialize(&store, &args.name)?;
            let predictor = Predictor::new(bundle)?;

            let record = CaseRecord {
                tax_type,
                panel,
                summary_text: summary,
                ..CaseRecord::default()
            };
            let prediction = predictor.predict(&record)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
                return Ok(());
            }

            println!("\nDisposition:");
            for (label, score) in prediction.disposition.sorted() {
                println!("    {}: {:.1}%", label, score * 100.0);
            }
            match &prediction.voting {
                VotingOutcome::Predicted(voting) => {
                    println!("Voting type:");
                    for (label, score) in voting.sorted() {
                        println!("    {}: {:.1}%", label, score * 100.0);
                    }
                }
                VotingOutcome::NotApplicable => println!("Voting type: not applicable to a denial"),
                VotingOutcome::Unavailable => println!("Voting type: bundle has no voting model"),
            }
            for warning in &prediction.warnings {
                match warning {
                    InputWarning::EmptySummary => eprintln!("warning: empty summary, text features are zero"),
                    InputWarning::EmptyCategory(field) => eprintln!("warning: no value for {}, encoded as OTHER", field),
                }
            }
        }
        Command::ScanLeakage {
            input,
            output,
            denylist,
        } => {
            let denylist = load_denylist(denylist)?;
            let records = DatasetReader::new(&input).read_records()?;
            let report = denylist.scan(&records);
            report.log_summary(&input.display().to_string());
            println!(
                "{} of {} records flagged ({:.1}%) with denylist {}",
                report.flagged,
                report.total,
                report.rate * 100.0,
                denylist.version
            );

            if let Some(output) = output {
                if output == input {
                    bail!("output must differ from input");
                }
                let reader = File::open(&input).with_context(|| format!("failed to open {}", input.display()))?;
                let writer =
                    File::create(&output).with_context(|| format!("failed to create {}", output.display()))?;
                let (kept, dropped) = write_filtered(reader, writer, |summary| !denylist.is_leaking(summary))?;
                println!("Wrote {} records to {} ({} removed)", kept, output.display(), dropped);
            }
        }
        Command::Verify => {
            let store = open_store(args.store)?;
            if store.verify(&args.name)? {
                let bundle = store.load(&args.name)?;
                bundle.validate()?;
                println!(
                    "Bundle '{}' OK: format {}, profile {}, {} text features, denylist {}",
                    args.name,
                    bundle.format_version,
                    bundle.profile,
                    bundle.vectorizer.dimension(),
                    bundle.denylist_version
                );
            } else {
                warn!("Bundle '{}' failed verification", args.name);
                bail!("bundle '{}' is missing or does not match its checksum", args.name);
            }
        }
    }

    Ok(())
}

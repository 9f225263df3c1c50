//! `handsign`: build a hand-landmark dataset from labeled images and train
//! gesture classifiers on it.

mod aggregate;
mod display;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use handsign_ai::{
    AggregateOptions, ForestConfig, HandLandmarker, ModelArtifact, NetworkConfig,
    run_forest_harness, run_network_harness,
};
use handsign_store::{read_table, write_artifact};
use tracing_subscriber::EnvFilter;

/// Hand-sign dataset builder and classifier trainer
#[derive(Parser, Debug)]
#[command(name = "handsign", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract hand landmarks from `<data-dir>/<label>/<image>` into a CSV table
    Aggregate {
        /// Root directory with one subdirectory per label
        #[arg(long)]
        data_dir: PathBuf,

        /// Output table
        #[arg(long, default_value = "landmarks.csv")]
        output: PathBuf,

        /// Maximum rows to extract per class (at least 1)
        #[arg(long)]
        limit: Option<NonZeroUsize>,

        /// Directory holding the palm detection and hand landmark ONNX models
        #[arg(long, env = "HANDSIGN_MODEL_DIR", default_value = "models/mediapipe-hands")]
        model_dir: PathBuf,
    },

    /// Train the feed-forward network
    Train {
        #[arg(long, default_value = "landmarks_data.csv")]
        data_file: PathBuf,

        #[arg(long, default_value = "sign_language_model.json")]
        model_output: PathBuf,
    },

    /// Train the random forest
    TrainForest {
        #[arg(long, default_value = "landmarks_data.csv")]
        data_file: PathBuf,

        #[arg(long, default_value = "sign_language_model_forest.json")]
        model_output: PathBuf,
    },

    /// Classify the hand sign in one image
    Predict {
        #[arg(long)]
        model: PathBuf,

        #[arg(long)]
        image: PathBuf,

        #[arg(long, env = "HANDSIGN_MODEL_DIR", default_value = "models/mediapipe-hands")]
        model_dir: PathBuf,
    },

    /// Show a model artifact's kind, training time, metrics and classes
    Inspect {
        #[arg(long)]
        model: PathBuf,
    },

    /// Show row counts per class and the first rows of a landmark table
    Stats {
        #[arg(long, default_value = "landmarks_data.csv")]
        data_file: PathBuf,

        /// Number of rows to print
        #[arg(long, default_value_t = 5)]
        head: usize,
    },

    /// Write a model's class list, in code order, as a JSON array
    ExportClasses {
        #[arg(long)]
        model: PathBuf,

        #[arg(long, default_value = "classes.json")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("handsign v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Aggregate {
            data_dir,
            output,
            limit,
            model_dir,
        } => {
            aggregate::check_data_dir(&data_dir)?;
            let mut landmarker = open_landmarker(&model_dir)?;
            let options = AggregateOptions {
                limit: limit.map(NonZeroUsize::get),
            };
            let stats =
                aggregate::run_aggregate(&data_dir, &output, &options, landmarker.as_mut())?;
            print!("{}", display::format_report(&stats.report));
            eprintln!(
                "Saved {} rows to {} in {:.1}s",
                stats.report.total_rows(),
                output.display(),
                stats.elapsed_secs
            );
        }
        Command::Train {
            data_file,
            model_output,
        } => {
            let artifact = run_network_harness(&data_file, &model_output, &NetworkConfig::default())
                .with_context(|| format!("training network from {}", data_file.display()))?;
            if let Some(loss) = artifact.metrics.loss {
                println!("Validation loss: {loss:.4}");
            }
            println!("Validation accuracy: {:.4}", artifact.metrics.accuracy);
            println!("Model saved to {}", model_output.display());
            println!(
                "Classes saved to {}",
                handsign_ai::classes_path(&model_output).display()
            );
        }
        Command::TrainForest {
            data_file,
            model_output,
        } => {
            let artifact = run_forest_harness(&data_file, &model_output, &ForestConfig::default())
                .with_context(|| format!("training forest from {}", data_file.display()))?;
            println!("Model accuracy: {:.4}", artifact.metrics.accuracy);
            println!("Model saved to {}", model_output.display());
        }
        Command::Predict {
            model,
            image,
            model_dir,
        } => {
            let artifact = load_model(&model)?;
            let mut landmarker = open_landmarker(&model_dir)?;
            let image_data = handsign_ai::load_image(&image)?;
            let Some(features) = landmarker.landmarks(&image_data) else {
                anyhow::bail!("no hand detected in {}", image.display());
            };
            let prediction = artifact.predict(&features);
            print!("{}", display::format_prediction(&prediction, &artifact));
        }
        Command::Inspect { model } => {
            let artifact = load_model(&model)?;
            print!("{}", display::format_artifact(&artifact, &model));
        }
        Command::Stats { data_file, head } => {
            let table = read_table(&data_file)
                .with_context(|| format!("reading {}", data_file.display()))?;
            print!("{}", display::format_table_stats(&table, head)?);
        }
        Command::ExportClasses { model, output } => {
            let artifact = load_model(&model)?;
            write_artifact(&output, &artifact.encoding)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Wrote {} classes to {}",
                artifact.encoding.len(),
                output.display()
            );
        }
    }

    Ok(())
}

fn load_model(path: &Path) -> anyhow::Result<ModelArtifact> {
    ModelArtifact::load(path).with_context(|| format!("loading model {}", path.display()))
}

#[cfg(feature = "onnx")]
fn open_landmarker(model_dir: &Path) -> anyhow::Result<Box<dyn HandLandmarker>> {
    let landmarker = handsign_ai::OnnxHandLandmarker::load(model_dir)
        .with_context(|| format!("loading hand models from {}", model_dir.display()))?;
    Ok(Box::new(landmarker))
}

#[cfg(not(feature = "onnx"))]
fn open_landmarker(_model_dir: &Path) -> anyhow::Result<Box<dyn HandLandmarker>> {
    anyhow::bail!("hand landmark extraction requires the `onnx` feature; rebuild with --features onnx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn train_uses_default_paths() {
        let cli = Cli::try_parse_from(["handsign", "train"]).unwrap();
        match cli.command {
            Command::Train {
                data_file,
                model_output,
            } => {
                assert_eq!(data_file, PathBuf::from("landmarks_data.csv"));
                assert_eq!(model_output, PathBuf::from("sign_language_model.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn aggregate_parses_limit() {
        let cli = Cli::try_parse_from([
            "handsign",
            "aggregate",
            "--data-dir",
            "data",
            "--limit",
            "50",
            "--model-dir",
            "m",
        ])
        .unwrap();
        match cli.command {
            Command::Aggregate {
                data_dir,
                output,
                limit,
                model_dir,
            } => {
                assert_eq!(data_dir, PathBuf::from("data"));
                assert_eq!(output, PathBuf::from("landmarks.csv"));
                assert_eq!(limit, NonZeroUsize::new(50));
                assert_eq!(model_dir, PathBuf::from("m"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn aggregate_rejects_zero_limit() {
        let parsed = Cli::try_parse_from([
            "handsign",
            "aggregate",
            "--data-dir",
            "data",
            "--limit",
            "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn aggregate_requires_data_dir() {
        assert!(Cli::try_parse_from(["handsign", "aggregate"]).is_err());
    }

    #[test]
    fn forest_output_default() {
        let cli = Cli::try_parse_from(["handsign", "train-forest"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::TrainForest { ref model_output, .. }
                if model_output == Path::new("sign_language_model_forest.json")
        ));
    }
}

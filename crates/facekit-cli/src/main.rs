mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facekit_core::{FaceAnalyzer, FaceMatcher};
use facekit_data::{
    AgeDataset, Compose, DataLoader, Dataset, FaceDataset, Normalize, Resize, ToTensor, Transform,
};
use facekit_prep::{DataAugmentor, FaceAligner, ImageDetector};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facekit", about = "Face detection, cropping, augmentation and matching")]
struct Cli {
    /// TOML configuration file (FACEKIT_* environment variables take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image, optionally saving a copy with boxes drawn
    Detect {
        input: PathBuf,
        /// Where to write the annotated image
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Crop the main face of one image into a square
    Align {
        input: PathBuf,
        output: PathBuf,
        /// Output edge length in pixels
        #[arg(long)]
        size: Option<u32>,
        /// Margin around the face box, as a fraction of its size
        #[arg(long)]
        margin: Option<f32>,
    },
    /// Crop every image in a directory, writing aligned_<name> files
    AlignBatch {
        input_dir: PathBuf,
        output_dir: PathBuf,
        #[arg(long)]
        size: Option<u32>,
        #[arg(long)]
        margin: Option<f32>,
    },
    /// Write six augmented variants plus the original for each image
    Augment {
        /// An image file or a directory of images
        input: PathBuf,
        output_dir: PathBuf,
        /// Standard deviation of the Gaussian noise
        #[arg(long)]
        noise: Option<f32>,
        /// Seed for reproducible noise
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Compare the faces in two images
    Match {
        first: PathBuf,
        second: PathBuf,
        /// Similarity a pair must exceed to match
        #[arg(long)]
        threshold: Option<f32>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load a directory as a dataset and report its first batch
    Dataset {
        dir: PathBuf,
        /// Only use files with an _age_<N> label
        #[arg(long)]
        age: bool,
        #[arg(long, default_value_t = 4)]
        batch_size: usize,
        /// Resize samples to this square edge
        #[arg(long, default_value_t = 512)]
        size: u32,
        #[arg(long)]
        shuffle: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Detect { input, output } => detect(&config, &input, output.as_deref()),
        Commands::Align { input, output, size, margin } => {
            let mut aligner = aligner(&config, size, margin)?;
            match aligner.align_face(&input, Some(output.as_path()))? {
                Some(_) => println!("Aligned face saved to {}", output.display()),
                None => println!("No face aligned from {}", input.display()),
            }
            Ok(())
        }
        Commands::AlignBatch { input_dir, output_dir, size, margin } => {
            let summary = aligner(&config, size, margin)?.batch_align(&input_dir, &output_dir)?;
            println!(
                "Aligned {}/{} images into {}",
                summary.succeeded,
                summary.total,
                output_dir.display()
            );
            Ok(())
        }
        Commands::Augment { input, output_dir, noise, seed } => {
            let augmentor = match seed {
                Some(seed) => DataAugmentor::with_seed(seed),
                None => DataAugmentor::new(),
            };
            let mut augmentor = augmentor.noise_level(noise.unwrap_or(config.noise_level));
            let written = if input.is_file() {
                augmentor.augment_single(&input, &output_dir)?.len()
            } else {
                augmentor.augment_batch(&input, &output_dir)?
            };
            println!("Wrote {written} images to {}", output_dir.display());
            Ok(())
        }
        Commands::Match { first, second, threshold, json } => {
            let analyzer = FaceAnalyzer::load(&config.model_paths(), config.detector_config())
                .context("failed to load face models")?;
            let threshold = threshold.unwrap_or(config.match_threshold);
            let mut matcher = FaceMatcher::new(analyzer, threshold);
            let result = matcher.match_faces(&first, &second)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Similarity: {:.4}", result.similarity);
                println!(
                    "Verdict: {} (threshold {:.2})",
                    if result.is_match { "same person" } else { "different people" },
                    matcher.threshold()
                );
            }
            Ok(())
        }
        Commands::Dataset { dir, age, batch_size, size, shuffle, seed } => {
            let transform = tensor_pipeline(size);
            if age {
                let dataset = AgeDataset::new(&dir, transform)?;
                println!("Age dataset: {} labeled images", dataset.len());
                let mut loader = DataLoader::new(&dataset, batch_size).shuffle(shuffle);
                if let Some(seed) = seed {
                    loader = loader.seed(seed);
                }
                if let Some(batch) = loader.iter().next() {
                    let batch = batch?;
                    println!("First batch: {:?}", batch.images.shape());
                    println!("Ages: {:?}", batch.ages);
                    println!("Files: {:?}", batch.filenames);
                }
            } else {
                let dataset = FaceDataset::new(&dir, transform)?;
                println!("Dataset: {} images", dataset.len());
                let mut loader = DataLoader::new(&dataset, batch_size).shuffle(shuffle);
                if let Some(seed) = seed {
                    loader = loader.seed(seed);
                }
                if let Some(batch) = loader.iter().next() {
                    let batch = batch?;
                    println!("First batch: {:?}", batch.images.shape());
                    println!("Files: {:?}", batch.filenames);
                }
            }
            Ok(())
        }
    }
}

fn detect(config: &Config, input: &Path, output: Option<&Path>) -> Result<()> {
    let analyzer = FaceAnalyzer::detection_only(&config.model_paths(), config.detector_config())
        .context("failed to load detection model")?;
    let mut detector = ImageDetector::new(analyzer);

    // With an output path the faces come from the same pass that draws them.
    let (faces, annotated) = match output {
        Some(output) => match detector.draw_faces(input, output)? {
            Some(faces) => (faces, Some(output)),
            None => (Vec::new(), None),
        },
        None => (detector.detect_faces(input)?, None),
    };

    println!("{}: {} face(s)", input.display(), faces.len());
    for (i, face) in faces.iter().enumerate() {
        let b = &face.bbox;
        println!(
            "  [{}] x={:.0} y={:.0} w={:.0} h={:.0} confidence={:.3}",
            i + 1,
            b.x,
            b.y,
            b.width,
            b.height,
            b.confidence
        );
    }

    if let Some(output) = annotated {
        println!("Annotated image saved to {}", output.display());
    }
    Ok(())
}

fn aligner(
    config: &Config,
    size: Option<u32>,
    margin: Option<f32>,
) -> Result<FaceAligner<FaceAnalyzer>> {
    let analyzer = FaceAnalyzer::detection_only(&config.model_paths(), config.detector_config())
        .context("failed to load detection model")?;
    Ok(FaceAligner::new(analyzer, size.unwrap_or(config.align_size))
        .with_margin(margin.unwrap_or(config.align_margin)))
}

/// Resize, scale to `[0, 1]`, then map each channel to `[-1, 1]`.
fn tensor_pipeline(size: u32) -> Option<Box<dyn Transform>> {
    Some(Box::new(
        Compose::default()
            .then(Resize::new(size, size))
            .then(ToTensor)
            .then(Normalize::new([0.5; 3], [0.5; 3])),
    ))
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
    fn test_parse_match_json() {
        let cli = Cli::try_parse_from(["facekit", "match", "a.jpg", "b.jpg", "--json"]).unwrap();
        let Commands::Match { first, threshold, json, .. } = cli.command else {
            panic!("expected match");
        };
        assert_eq!(first, PathBuf::from("a.jpg"));
        assert!(json);
        assert!(threshold.is_none());
    }

    #[test]
    fn test_parse_dataset_defaults_and_global_config() {
        let args = ["facekit", "dataset", "data/augmented", "--age", "--config", "f.toml"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("f.toml")));
        let Commands::Dataset { age, batch_size, size, shuffle, .. } = cli.command else {
            panic!("expected dataset");
        };
        assert!(age);
        assert!(!shuffle);
        assert_eq!((batch_size, size), (4, 512));
    }

    #[test]
    fn test_parse_align_batch() {
        let args = ["facekit", "align-batch", "raw", "processed", "--size", "256"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Commands::AlignBatch { size: Some(256), margin: None, .. }));
    }
}

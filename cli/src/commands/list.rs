//! `relimg list` command: show the image references a manifest contains.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use relimg_core::RelimgConfig;
use relimg_runtime::manifest::io;
use relimg_runtime::{ExtractionWarning, Extractor, Occurrence};
use serde::Serialize;

use crate::output::{self, ReportFormat};

#[derive(Args)]
pub struct ListArgs {
    /// Manifest file to inspect
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Env var name prefix marking related images
    #[arg(long)]
    pub related_image_prefix: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

pub async fn execute(args: ListArgs, config: RelimgConfig) -> Result<(), Box<dyn std::error::Error>> {
    run(&args, config, &mut std::io::stdout())
}

fn run<W: Write>(
    args: &ListArgs,
    mut config: RelimgConfig,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(prefix) = &args.related_image_prefix {
        config.related_image_prefix = prefix.clone();
    }
    config.validate()?;

    let doc = io::load(&args.manifest)?;
    let (occurrences, warnings) = Extractor::new(&config).extract(&doc);

    match args.format {
        ReportFormat::Json => {
            let listing = Listing::new(&occurrences, &warnings);
            writeln!(out, "{}", serde_json::to_string_pretty(&listing)?)?;
        }
        ReportFormat::Text => {
            let mut table = output::new_table(&["LOCATION", "IMAGE", "FORM"]);
            for occurrence in &occurrences {
                let form = if occurrence.reference.is_digest_form() {
                    "digest"
                } else {
                    "tag"
                };
                table.add_row([
                    occurrence.location.to_string(),
                    occurrence.raw.clone(),
                    form.to_string(),
                ]);
            }
            writeln!(out, "{table}")?;

            if !warnings.is_empty() {
                let mut table = output::new_table(&["LOCATION", "VALUE", "PROBLEM"]);
                for warning in &warnings {
                    table.add_row([
                        warning.location.to_string(),
                        warning.raw.clone(),
                        warning.reason.clone(),
                    ]);
                }
                writeln!(out)?;
                writeln!(out, "{table}")?;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Listing {
    images: Vec<ListedImage>,
    warnings: Vec<ListedWarning>,
}

#[derive(Serialize)]
struct ListedImage {
    location: String,
    image: String,
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

#[derive(Serialize)]
struct ListedWarning {
    location: String,
    value: String,
    reason: String,
}

impl Listing {
    fn new(occurrences: &[Occurrence], warnings: &[ExtractionWarning]) -> Self {
        Self {
            images: occurrences
                .iter()
                .map(|o| ListedImage {
                    location: o.location.to_string(),
                    image: o.raw.clone(),
                    registry: o.reference.registry.clone(),
                    repository: o.reference.repository.clone(),
                    tag: o.reference.tag.clone(),
                    digest: o.reference.digest.clone(),
                })
                .collect(),
            warnings: warnings
                .iter()
                .map(|w| ListedWarning {
                    location: w.location.to_string(),
                    value: w.raw.clone(),
                    reason: w.reason.clone(),
                })
                .collect(),
        }
    }
}

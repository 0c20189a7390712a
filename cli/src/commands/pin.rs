//! `relimg pin` command: rewrite a manifest so every image is pinned by digest.
//!
//! By default the run is all-or-nothing: if any reference cannot be resolved
//! nothing is written and the command fails. `--allow-partial` applies the
//! resolvable subset and reports the rest as warnings.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use relimg_core::{RelimgConfig, RelimgError};
use relimg_runtime::manifest::io;
use relimg_runtime::{
    OciRegistryInspector, PinOutcome, Pipeline, RegistryInspector, RelatedImageEntry,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::output::{self, ReportFormat};

#[derive(Args)]
pub struct PinArgs {
    /// Manifest file to pin (e.g. a ClusterServiceVersion)
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Env var name prefix marking related images
    #[arg(long)]
    pub related_image_prefix: Option<String>,

    /// Print the rewritten manifest to stdout instead of writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Per-lookup timeout (e.g. 500ms, 30s, 2m)
    #[arg(long, value_parser = output::parse_duration)]
    pub timeout: Option<Duration>,

    /// Apply the resolvable subset when some references fail
    #[arg(long)]
    pub allow_partial: bool,

    /// Write the result here instead of over the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum concurrent registry lookups
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Platform to pick from multi-arch images (os/arch[/variant])
    #[arg(long)]
    pub platform: Option<String>,

    /// Pin multi-arch images to their index digest
    #[arg(long)]
    pub pin_index: bool,

    /// Registry reached over plain HTTP (repeatable)
    #[arg(long = "insecure-registry")]
    pub insecure_registries: Vec<String>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

impl PinArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    fn configure(&self, mut config: RelimgConfig) -> relimg_core::Result<RelimgConfig> {
        if let Some(prefix) = &self.related_image_prefix {
            config.related_image_prefix = prefix.clone();
        }
        if let Some(timeout) = self.timeout {
            config.resolver.timeout_secs = timeout.as_secs().max(1);
        }
        if let Some(max) = self.max_concurrency {
            config.resolver.max_concurrency = max;
        }
        if let Some(platform) = &self.platform {
            config.resolver.platform = Some(platform.clone());
        }
        if self.pin_index {
            config.resolver.pin_index = true;
        }
        config
            .resolver
            .insecure_registries
            .extend(self.insecure_registries.iter().cloned());
        if self.allow_partial {
            config.allow_partial = true;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn execute(args: PinArgs, config: RelimgConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.configure(config)?;
    let inspector: Arc<dyn RegistryInspector> = Arc::new(OciRegistryInspector::new(&config.resolver)?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    run(
        &args,
        config,
        inspector,
        &cancel,
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .await
}

/// Pin the manifest named by `args`.
///
/// `out` receives the command output (report, or the manifest on dry runs);
/// `err` receives warnings and, on dry runs, the report.
pub(crate) async fn run<O: Write, E: Write>(
    args: &PinArgs,
    config: RelimgConfig,
    inspector: Arc<dyn RegistryInspector>,
    cancel: &CancellationToken,
    out: &mut O,
    err: &mut E,
) -> Result<(), Box<dyn std::error::Error>> {
    let allow_partial = config.allow_partial;
    let doc = io::load(&args.manifest)?;

    let mut pipeline = Pipeline::new(config, inspector);
    if let Some(timeout) = args.timeout {
        pipeline = pipeline.with_lookup_timeout(timeout);
    }
    let outcome = pipeline.run(&doc, cancel).await?;

    for warning in &outcome.warnings {
        writeln!(err, "Warning: skipped {}", warning)?;
    }
    for failure in &outcome.failures {
        writeln!(err, "Warning: could not resolve {}", failure)?;
    }

    if args.dry_run {
        write_report(&outcome, &args.manifest, args.format, err)?;
        if outcome.applied {
            write!(out, "{}", outcome.document.to_yaml_string()?)?;
        }
    } else {
        write_report(&outcome, &args.manifest, args.format, out)?;
    }

    if !outcome.is_complete() && !allow_partial {
        return Err(RelimgError::Unresolved {
            count: outcome.failures.len(),
        }
        .into());
    }

    if !args.dry_run {
        let target = args.output.as_deref().unwrap_or(&args.manifest);
        if target != args.manifest.as_path() || outcome.has_changes(&doc) {
            io::save(&outcome.document, target)?;
            tracing::info!(path = %target.display(), "Wrote pinned manifest");
        } else {
            tracing::info!(path = %target.display(), "Manifest already pinned");
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct PinReport {
    manifest: String,
    generated_at: String,
    applied: bool,
    annotated: bool,
    resolved: Vec<ResolvedEntry>,
    failures: Vec<FailureEntry>,
    warnings: Vec<WarningEntry>,
    related_images: Vec<RelatedImageEntry>,
}

#[derive(Serialize)]
struct ResolvedEntry {
    reference: String,
    pinned: String,
}

#[derive(Serialize)]
struct FailureEntry {
    reference: String,
    error: String,
}

#[derive(Serialize)]
struct WarningEntry {
    location: String,
    raw: String,
    reason: String,
}

impl PinReport {
    fn new(outcome: &PinOutcome, manifest: &Path) -> Self {
        Self {
            manifest: manifest.display().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            applied: outcome.applied,
            annotated: outcome.annotated,
            resolved: outcome
                .resolved
                .iter()
                .map(|(reference, pinned)| ResolvedEntry {
                    reference: reference.to_string(),
                    pinned: pinned.to_string(),
                })
                .collect(),
            failures: outcome
                .failures
                .iter()
                .map(|f| FailureEntry {
                    reference: f.reference.to_string(),
                    error: f.cause.to_string(),
                })
                .collect(),
            warnings: outcome
                .warnings
                .iter()
                .map(|w| WarningEntry {
                    location: w.location.to_string(),
                    raw: w.raw.clone(),
                    reason: w.reason.clone(),
                })
                .collect(),
            related_images: outcome.related_images.clone(),
        }
    }
}

fn write_report<W: Write>(
    outcome: &PinOutcome,
    manifest: &Path,
    format: ReportFormat,
    w: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    if format == ReportFormat::Json {
        let report = PinReport::new(outcome, manifest);
        writeln!(w, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    let mut table = output::new_table(&["REFERENCE", "DIGEST", "STATUS"]);
    for (reference, pinned) in &outcome.resolved {
        let digest = pinned.digest.as_deref().unwrap_or_default();
        table.add_row([
            reference.to_string(),
            output::short_digest(digest),
            "pinned".to_string(),
        ]);
    }
    for failure in &outcome.failures {
        table.add_row([
            failure.reference.to_string(),
            String::new(),
            failure.cause.to_string(),
        ]);
    }
    writeln!(w, "{table}")?;

    let pinned_already = outcome
        .occurrences
        .iter()
        .filter(|o| o.reference.is_digest_form())
        .count();
    writeln!(
        w,
        "{} resolved, {} failed, {} already pinned, {} related image(s){}",
        outcome.resolved.len(),
        outcome.failures.len(),
        pinned_already,
        outcome.related_images.len(),
        if outcome.applied { "" } else { " (not applied)" }
    )?;
    for entry in &outcome.related_images {
        tracing::debug!(name = %entry.name, image = %entry.image, "Related image");
    }
    Ok(())
}

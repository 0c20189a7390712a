//! `relimg resolve` command: print the digest form of one image reference.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use relimg_core::RelimgConfig;
use relimg_runtime::oci::resolver::ResolveError;
use relimg_runtime::{
    DigestResolver, ImageReference, OciRegistryInspector, ReferenceForm, RegistryInspector,
};

use crate::output;

#[derive(Args)]
pub struct ResolveArgs {
    /// Image reference (e.g. docker.io/memcached:1.4.36-alpine)
    pub image: String,

    /// Lookup timeout (e.g. 500ms, 30s, 2m)
    #[arg(long, value_parser = output::parse_duration)]
    pub timeout: Option<Duration>,

    /// Platform to pick from multi-arch images (os/arch[/variant])
    #[arg(long)]
    pub platform: Option<String>,

    /// Pin multi-arch images to their index digest
    #[arg(long)]
    pub pin_index: bool,

    /// Registry reached over plain HTTP (repeatable)
    #[arg(long = "insecure-registry")]
    pub insecure_registries: Vec<String>,
}

pub async fn execute(
    args: ResolveArgs,
    mut config: RelimgConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(platform) = &args.platform {
        config.resolver.platform = Some(platform.clone());
    }
    if args.pin_index {
        config.resolver.pin_index = true;
    }
    config
        .resolver
        .insecure_registries
        .extend(args.insecure_registries.iter().cloned());

    let inspector: Arc<dyn RegistryInspector> =
        Arc::new(OciRegistryInspector::new(&config.resolver)?);
    run(&args, &config, inspector, &mut std::io::stdout()).await
}

async fn run<W: Write>(
    args: &ResolveArgs,
    config: &RelimgConfig,
    inspector: Arc<dyn RegistryInspector>,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ImageReference::parse(&args.image)?;

    let pinned = if reference.is_digest_form() {
        reference
    } else {
        let mut resolver = DigestResolver::new(inspector, &config.resolver);
        if let Some(timeout) = args.timeout {
            resolver = resolver.with_timeout(timeout);
        }
        match resolver.resolve(&reference).await {
            Ok(pinned) => pinned,
            Err(ResolveError::Fatal(e)) => return Err(e.into()),
            Err(ResolveError::Failed(failure)) => {
                return Err(format!("could not resolve {}", failure).into())
            }
        }
    };

    writeln!(out, "{}", pinned.render(ReferenceForm::Digest)?)?;
    Ok(())
}

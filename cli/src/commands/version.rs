//! `relimg version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("relimg version {}", relimg_core::VERSION);
    println!("runtime version {}", relimg_runtime::VERSION);
    Ok(())
}

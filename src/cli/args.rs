//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "out")]
#[command(about = "Push a docker-save image tarball to a registry; reads the request as JSON on stdin")]
#[command(version)]
pub struct Args {
    /// Directory holding the fetched inputs; image and tag paths are relative to it
    #[arg(value_name = "DESTINATION")]
    pub destination: Option<PathBuf>,
}

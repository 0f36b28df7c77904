use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration
    Config,

    /// Write the annotated default configuration file
    #[clap(name = "defconfig")]
    DefConfig,

    /// Summarize a package: type, identifiers, metadata sections, files and pointers
    #[command(arg_required_else_help = true)]
    Inspect {
        /// Package archive or bare manifest
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        package: PathBuf,
    },

    /// Check a package against a packager profile and the structural rules
    #[command(arg_required_else_help = true)]
    Validate {
        /// Package archive or bare manifest
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        package: PathBuf,

        /// Packager whose profile the package must declare
        #[arg(required = false, long, short)]
        packager: Option<String>,

        /// Only check the manifest, without reading referenced content
        #[arg(required = false, long)]
        manifest_only: bool,
    },
}

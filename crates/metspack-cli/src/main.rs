use std::env;

use clap::Parser;
use cli::{Args, Commands};
use error::{CliError, CliResult};
use inspect::inspect_package;
use logging::setup_logging;
use metspack_config::{
    config::{self, generate_default_config, get_config, CONFIG_PATH},
    error::ConfigError,
};
use metspack_utils::path::resolve_path;
use tracing::info;
use utils::COLOR;
use validate::validate_package;

mod cli;
mod error;
mod inspect;
mod logging;
mod utils;
mod validate;

fn handle_cli() -> CliResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        let mut color = COLOR.write().unwrap();
        *color = false;
    }

    if let Some(ref c) = args.config {
        let mut config_path = CONFIG_PATH.write().unwrap();
        let path = resolve_path(c).map_err(ConfigError::from)?;
        let path = if path.is_absolute() {
            path
        } else {
            env::current_dir()
                .map_err(|source| {
                    CliError::Io {
                        action: "retrieving current directory".into(),
                        source,
                    }
                })?
                .join(path)
        };
        *config_path = path;
    }

    match args.command {
        Commands::DefConfig => {
            let path = generate_default_config()?;
            info!("Default configuration written to {}", path.display());
        }
        command => {
            config::init()?;
            let config = get_config();

            match command {
                Commands::Config => {
                    print!("{}", config.to_annotated_document()?);
                }
                Commands::Inspect {
                    package,
                } => inspect_package(&config, &package, args.json)?,
                Commands::Validate {
                    package,
                    packager,
                    manifest_only,
                } => {
                    validate_package(
                        &config,
                        &package,
                        packager.as_deref(),
                        manifest_only,
                        args.json,
                    )?
                }
                Commands::DefConfig => unreachable!(),
            }
        }
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}

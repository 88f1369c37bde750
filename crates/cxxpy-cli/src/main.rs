//! cxxpy - translate a C++ subset to Python 3.

mod config;

use anyhow::Context;
use clap::Parser;
use config::CxxpyConfig;
use cxxpy::{TranslateError, TranslationContext};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cxxpy", version, about = "Translate a C++ subset to Python 3")]
struct Cli {
    /// Define a macro before preprocessing (`NAME` or `NAME=VALUE`)
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    /// Name of the root module (default: stem of the first file)
    #[arg(long, value_name = "NAME")]
    module: Option<String>,

    /// Config file (default: ./cxxpy.toml if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write every module under DIR instead of the root module to stdout
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Source files, parsed in order into one root module
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<TranslateError>() {
                Some(err) => eprintln!("{}", err),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = CxxpyConfig::load(cli.config.as_deref())?;
    let root = cli
        .module
        .clone()
        .or_else(|| config.root_module.clone())
        .unwrap_or_else(|| module_name_for(&cli.files[0]));

    let mut context = TranslationContext::with_defines(&root, config.defines(&cli.define));
    for path in &cli.files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        context.parse_source(&path.display().to_string(), &text)?;
    }
    let resolved = context.resolve()?;
    tracing::debug!("resolved {} name references", resolved);

    match &cli.out_dir {
        None => print!("{}", context.render(&root)?),
        Some(dir) => {
            for (file, text) in context.render_all()? {
                let path = dir.join(file);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                std::fs::write(&path, text)
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::info!("wrote {}", path.display());
            }
        }
    }
    Ok(())
}

/// File stem made into a valid module name.
fn module_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_from_paths() {
        assert_eq!(module_name_for(Path::new("src/shapes.cpp")), "shapes");
        assert_eq!(module_name_for(Path::new("my-lib.h")), "my_lib");
        assert_eq!(module_name_for(Path::new("3d.cpp")), "_3d");
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

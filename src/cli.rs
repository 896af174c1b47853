use std::{env, path::PathBuf};

use anyhow::{Result, anyhow};

const DEFAULT_CONFIG_FILE: &str = "./code-analyst.jsonc";

/// Config file from `--config <path>`, else `./code-analyst.jsonc` when it
/// exists, else none (defaults plus environment).
pub fn config_path_from_args() -> Result<Option<PathBuf>> {
    config_path_from(env::args().skip(1))
}

fn config_path_from(args: impl IntoIterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut args = args.into_iter();
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --config"))?;
                config_path = Some(PathBuf::from(value));
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other}. usage: code-analyst [--config <path>]"
                ));
            }
        }
    }

    Ok(config_path.or_else(|| {
        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        fallback.exists().then_some(fallback)
    }))
}

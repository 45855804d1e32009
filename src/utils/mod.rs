pub mod http;

use anyhow::{Context, Result};
use std::path::PathBuf;

pub fn get_chatledger_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("CHATLEDGER_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::home_dir()
        .context("Could not determine home directory")?
        .join(".chatledger"))
}

//! Step outputs for GitHub Actions.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Append `name=value` to `$GITHUB_OUTPUT`. A no-op outside Actions.
pub fn set_output(name: &str, value: &str) -> io::Result<()> {
    match std::env::var_os("GITHUB_OUTPUT") {
        Some(path) => append_output(Path::new(&path), name, value),
        None => Ok(()),
    }
}

fn append_output(path: &Path, name: &str, value: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}={}", name, value)
}

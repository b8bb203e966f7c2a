use std::collections::HashSet;
use std::path::PathBuf;

use error_stack::{Report, ResultExt, bail};

use crate::error::UniverseError;

/// Source of the instrument identifiers screened in one pass.
pub trait Universe: Send + Sync {
    fn load(&self) -> Result<Vec<String>, Report<UniverseError>>;
}

/// Line-delimited symbol list on disk, e.g. `stocks.txt`.
pub struct FileUniverse {
    path: PathBuf,
}

impl FileUniverse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Universe for FileUniverse {
    fn load(&self) -> Result<Vec<String>, Report<UniverseError>> {
        let content = std::fs::read_to_string(&self.path)
            .change_context(UniverseError::ReadFile)
            .attach_with(|| format!("path: {}", self.path.display()))?;

        let symbols = parse_symbols(content.lines());
        if symbols.is_empty() {
            return Err(Report::new(UniverseError::Empty)
                .attach(format!("path: {}", self.path.display())));
        }
        Ok(symbols)
    }
}

/// Symbols given inline (config file or command line).
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }
}

impl Universe for StaticUniverse {
    fn load(&self) -> Result<Vec<String>, Report<UniverseError>> {
        let symbols = parse_symbols(self.symbols.iter().map(String::as_str));
        if symbols.is_empty() {
            bail!(UniverseError::Empty);
        }
        Ok(symbols)
    }
}

/// Trim entries, drop blanks and `#` comments, keep the first occurrence of
/// each symbol.
fn parse_symbols<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    lines
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .map(str::to_owned)
        .collect()
}

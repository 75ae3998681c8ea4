//! Compiler options.
//!
//! The environment is consulted exactly once, at the driver boundary; the
//! rest of the stack only ever sees this value.

use serde::Deserialize;
use std::path::Path;

use crate::graph::DependencyTrackingLevel;

pub const ROOT_CANONICAL_CODE_VAR: &str = "ROOT_CANONICAL_CODE";
pub const NO_GENERIC_CODE_VAR: &str = "NO_GENERIC_CODE";
pub const ONLY_CANONICAL_CODE_VAR: &str = "ONLY_CANONICAL_CODE";

#[derive(Clone, Debug, Default)]
pub struct CompilerOptions {
    /// Library rooting includes canonical instantiations of generics.
    pub root_canonical_code: bool,
    /// Emit an empty body for every generic method.
    pub no_generic_code: bool,
    /// Emit an empty body for non-canonical instantiations of generics.
    pub only_canonical_code: bool,
    pub dependency_tracking: DependencyTrackingLevel,
    /// Log every method as its compilation begins.
    pub verbose: bool,
}

#[derive(Deserialize, Default)]
struct OptionsFile {
    root_canonical_code: Option<bool>,
    no_generic_code: Option<bool>,
    only_canonical_code: Option<bool>,
    verbose: Option<bool>,
}

impl CompilerOptions {
    pub fn from_env() -> CompilerOptions {
        fn flag(name: &str) -> bool {
            std::env::var(name).map(|v| v == "1").unwrap_or(false)
        }
        CompilerOptions {
            root_canonical_code: flag(ROOT_CANONICAL_CODE_VAR),
            no_generic_code: flag(NO_GENERIC_CODE_VAR),
            only_canonical_code: flag(ONLY_CANONICAL_CODE_VAR),
            dependency_tracking: DependencyTrackingLevel::default(),
            verbose: false,
        }
    }

    /// Applies a TOML options file on top of the current values.
    pub fn apply_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)?;
        let file: OptionsFile = toml::from_str(&text)?;
        if let Some(v) = file.root_canonical_code {
            self.root_canonical_code = v;
        }
        if let Some(v) = file.no_generic_code {
            self.no_generic_code = v;
        }
        if let Some(v) = file.only_canonical_code {
            self.only_canonical_code = v;
        }
        if let Some(v) = file.verbose {
            self.verbose = v;
        }
        Ok(())
    }
}

//! Embedding algorithm dispatch.
//!
//! Resolves a method name against the registry of supported algorithms and
//! runs the matching external script against an acquired source file.

mod process;

use std::ffi::OsString;
use std::path::Path;

use graphfeat_shared::{GraphFeatError, Hyperparameters, Result};

pub use process::{Dispatcher, ProcessOutcome};

/// File the algorithm writes its resource list to.
pub const RESOURCES_FILE: &str = "resources.tsv";

/// File the algorithm writes its vectors to.
pub const VECTORS_FILE: &str = "vectors.tsv";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Embedding methods the dispatcher knows how to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingMethod {
    /// RESCAL tensor factorization over the source's relations.
    Rescal,
}

impl EmbeddingMethod {
    /// Every registered method.
    pub const ALL: &'static [EmbeddingMethod] = &[EmbeddingMethod::Rescal];

    /// Look up a method by name, ignoring case.
    pub fn resolve(name: &str) -> Result<Self> {
        let wanted = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| GraphFeatError::UnsupportedMethod {
                method: name.to_string(),
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rescal => "rescal",
        }
    }

    /// Script file, relative to the configured scripts directory.
    pub fn script(&self) -> &'static str {
        match self {
            Self::Rescal => "rdf_rescal.py",
        }
    }

    /// Hyperparameters passed positionally to the script, in order.
    pub fn hyperparameter_names(&self) -> &'static [&'static str] {
        match self {
            Self::Rescal => &["rank"],
        }
    }

    /// Check that every hyperparameter the method takes is present.
    pub fn check_hyperparameters(&self, hyperparameters: &Hyperparameters) -> Result<()> {
        let missing: Vec<&str> = self
            .hyperparameter_names()
            .iter()
            .copied()
            .filter(|name| hyperparameters.get(name).is_none_or(str::is_empty))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GraphFeatError::validation(format!(
                "method '{}' requires hyperparameter(s): {}",
                self.as_str(),
                missing.join(", ")
            )))
        }
    }

    /// Arguments after the interpreter:
    /// `<script> <input> <output_dir>/ <hyperparameter values...>`.
    pub fn arguments(
        &self,
        scripts_dir: &Path,
        input: &Path,
        output_dir: &Path,
        hyperparameters: &Hyperparameters,
    ) -> Result<Vec<OsString>> {
        self.check_hyperparameters(hyperparameters)?;

        let mut out_arg = output_dir.as_os_str().to_os_string();
        out_arg.push("/");

        let mut args = vec![
            scripts_dir.join(self.script()).into_os_string(),
            input.as_os_str().to_os_string(),
            out_arg,
        ];
        args.extend(
            self.hyperparameter_names()
                .iter()
                .filter_map(|name| hyperparameters.get(name))
                .map(OsString::from),
        );
        Ok(args)
    }
}

impl std::fmt::Display for EmbeddingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Plain configuration structs for each pass, composed by [`PipelineConfig`].
//!
//! No CLI dispatch or option parsing lives here (out of scope); a caller
//! builds these however it likes — hardcoded, `serde`-deserialized from
//! JSON, or produced by its own option-parsing layer. `Default` impls
//! match the defaults named throughout the component contracts.

use gossamer_common::{Error, Result};
use serde::{Deserialize, Serialize};

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parameters for [`crate::pipeline::build_graph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub k: u64,
    /// `false` builds a symmetric (canonical-only) graph; `true` stores
    /// both strands as distinct edges.
    pub asymmetric: bool,
    pub threads: usize,
    /// Expected distinct k-mer count, used to size the counting hash.
    pub capacity_hint: u64,
    pub ways_per_slot: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            k: 27,
            asymmetric: false,
            threads: default_threads(),
            capacity_hint: 1 << 20,
            ways_per_slot: 4,
        }
    }
}

/// Parameters for [`crate::passes::CoverageTrimmer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageTrimConfig {
    /// An explicit cutoff; ignored if `infer` is set.
    pub cutoff: Option<u32>,
    pub infer: bool,
    /// Scale an explicit `cutoff` by `k` before applying it. Mutually
    /// exclusive with `infer` and `estimate_only`.
    pub scale_cutoff_by_k: bool,
    /// Report the inferred cutoff without writing a trimmed graph.
    /// Requires `infer`.
    pub estimate_only: bool,
    pub threads: usize,
}

impl Default for CoverageTrimConfig {
    fn default() -> Self {
        CoverageTrimConfig {
            cutoff: None,
            infer: true,
            scale_cutoff_by_k: false,
            estimate_only: false,
            threads: default_threads(),
        }
    }
}

impl CoverageTrimConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scale_cutoff_by_k && self.infer {
            return Err(Error::Usage(
                "--scale-cutoff-by-k is mutually exclusive with --infer".to_string(),
            ));
        }
        if self.scale_cutoff_by_k && self.estimate_only {
            return Err(Error::Usage(
                "--scale-cutoff-by-k is mutually exclusive with --estimate-only".to_string(),
            ));
        }
        if self.estimate_only && !self.infer {
            return Err(Error::Usage(
                "--estimate-only requires --infer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for [`crate::passes::TipPruner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipPruneConfig {
    pub cutoff: Option<u32>,
    pub relative_cutoff: Option<f64>,
    pub iterate: u32,
    pub threads: usize,
}

impl Default for TipPruneConfig {
    fn default() -> Self {
        TipPruneConfig {
            cutoff: None,
            relative_cutoff: None,
            iterate: 1,
            threads: default_threads(),
        }
    }
}

/// Parameters for [`crate::passes::TourBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourBusConfig {
    pub max_sequence_length: u64,
    pub max_edit_distance: u64,
    pub max_relative_errors: f64,
    pub cutoff: Option<u32>,
    pub relative_cutoff: Option<f64>,
    pub max_passes: u64,
    pub threads: usize,
}

impl TourBusConfig {
    /// Build the length/distance defaults that scale with `k`:
    /// `maxSequenceLength = 2(k+1)+2`, `maxEditDistance ~= 2k/27`.
    pub fn for_k(k: u64) -> Self {
        TourBusConfig {
            max_sequence_length: 2 * (k + 1) + 2,
            max_edit_distance: (2 * k / 27).max(1),
            max_relative_errors: 0.2,
            cutoff: None,
            relative_cutoff: None,
            max_passes: 10_000,
            threads: default_threads(),
        }
    }
}

impl Default for TourBusConfig {
    fn default() -> Self {
        TourBusConfig::for_k(27)
    }
}

/// Parameters for [`crate::passes::ContigExtractor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContigExtractConfig {
    pub min_length: u64,
    pub min_coverage: u32,
    pub threads: usize,
}

impl Default for ContigExtractConfig {
    fn default() -> Self {
        ContigExtractConfig {
            min_length: 0,
            min_coverage: 0,
            threads: default_threads(),
        }
    }
}

/// Composes every pass's configuration into one value for
/// [`crate::pipeline::run_pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    pub build: BuildConfig,
    pub coverage_trim: Option<CoverageTrimConfig>,
    pub tip_prune: Option<TipPruneConfig>,
    pub tour_bus: Option<TourBusConfig>,
    pub contig_extract: ContigExtractConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(c) = &self.coverage_trim {
            c.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tour_bus_defaults_scale_with_k() {
        let cfg = TourBusConfig::for_k(15);
        assert_eq!(cfg.max_sequence_length, 2 * 16 + 2);
        assert_eq!(cfg.max_edit_distance, 1);
    }

    #[test]
    fn scale_cutoff_by_k_rejects_infer_combination() {
        let cfg = CoverageTrimConfig {
            cutoff: Some(4),
            infer: true,
            scale_cutoff_by_k: true,
            estimate_only: false,
            threads: 1,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn estimate_only_requires_infer() {
        let cfg = CoverageTrimConfig {
            cutoff: Some(4),
            infer: false,
            scale_cutoff_by_k: false,
            estimate_only: true,
            threads: 1,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_pipeline_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }
}

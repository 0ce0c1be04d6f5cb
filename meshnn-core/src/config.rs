//! Runtime-mutable index parameters (spec §6), with layered configuration
//! support via `meshnn.toml` and `MESHNN_*` environment variables.
//!
//! Priority, highest to lowest:
//! 1. Explicit setters (`with_*`) called after construction.
//! 2. Environment variables (`MESHNN_*`).
//! 3. Configuration file (`meshnn.toml`).
//! 4. [`IndexParams::default`].
//!
//! This layering is ambient plumbing, not a correctness feature: an index
//! built from bare `IndexParams::default()` is fully conforming.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Tunable parameters for an [`crate::Index`], per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// `M`: out-degree cap for layers ≥ 1. Layer 0 allows `2 * max_edges`.
    pub max_edges: usize,
    /// `mL`: layer sampler scale. Default `1 / ln(max_edges)`.
    pub distribution_rate: f64,
    /// `efConstruction` / `max_candidates`: beam width during insert/update.
    pub ef_construction: usize,
    /// `efSearch` / `min_nn`: minimum beam width during queries.
    pub ef_search: usize,
    /// Initial capacity hint for the arena.
    pub collection_size: usize,
    /// PRNG seed for layer sampling. Negative means OS entropy.
    pub random_seed: i64,
    /// When `false`, in-edges are never tracked and `remove` is an error.
    pub allow_removals: bool,
    /// When `false`, some inserts are vetoed by layer sampling, permitting a
    /// differently shaped hierarchy.
    pub zero_layer_guaranteed: bool,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            max_edges: 16,
            distribution_rate: 1.0 / (16.0_f64).ln(),
            ef_construction: 100,
            ef_search: 5,
            collection_size: 65536,
            random_seed: 31337,
            allow_removals: true,
            zero_layer_guaranteed: true,
        }
    }
}

impl IndexParams {
    /// Loads parameters from `path` (a TOML file) layered over the
    /// defaults, then over `MESHNN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but fails to parse, or
    /// if a value fails validation (e.g. `max_edges == 0`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MESHNN_"));
        let params: Self = figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Loads parameters from `MESHNN_*` environment variables layered over
    /// the defaults, without a config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value fails validation.
    pub fn from_env() -> Result<Self> {
        let figment =
            Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed("MESHNN_"));
        let params: Self = figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Checks the basic validity constraints the façade depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field found.
    pub fn validate(&self) -> Result<()> {
        if self.max_edges == 0 {
            return Err(Error::Config("max_edges must be >= 1".into()));
        }
        if self.ef_construction == 0 {
            return Err(Error::Config("ef_construction must be >= 1".into()));
        }
        if self.ef_search == 0 {
            return Err(Error::Config("ef_search must be >= 1".into()));
        }
        if !self.distribution_rate.is_finite() || self.distribution_rate <= 0.0 {
            return Err(Error::Config("distribution_rate must be a positive finite number".into()));
        }
        Ok(())
    }

    /// Returns `self` with `max_edges` overridden.
    #[must_use]
    pub fn with_max_edges(mut self, m: usize) -> Self {
        self.max_edges = m;
        self
    }

    /// Returns `self` with `ef_construction` overridden.
    #[must_use]
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Returns `self` with `ef_search` overridden.
    #[must_use]
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Returns `self` with `allow_removals` overridden.
    #[must_use]
    pub fn with_allow_removals(mut self, allow: bool) -> Self {
        self.allow_removals = allow;
        self
    }

    /// Per-layer out-degree cap: `2 * max_edges` at layer 0, `max_edges`
    /// elsewhere (spec §4.7.1, §9 "layer-0 fatter than the rest").
    #[must_use]
    pub fn max_edges_for_layer(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_edges * 2
        } else {
            self.max_edges
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec() {
        let p = IndexParams::default();
        assert_eq!(p.max_edges, 16);
        assert_eq!(p.ef_construction, 100);
        assert_eq!(p.ef_search, 5);
        assert_eq!(p.collection_size, 65536);
        assert_eq!(p.random_seed, 31337);
        assert!(p.allow_removals);
        assert!(p.zero_layer_guaranteed);
    }

    #[test]
    fn layer_zero_is_fatter() {
        let p = IndexParams::default();
        assert_eq!(p.max_edges_for_layer(0), 32);
        assert_eq!(p.max_edges_for_layer(1), 16);
    }

    #[test]
    fn zero_max_edges_fails_validation() {
        let p = IndexParams::default().with_max_edges(0);
        assert!(p.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_takes_priority_over_file_default() {
        // `#[serial]` keeps this test from racing other env-mutating tests,
        // `MESHNN_*` vars are process-global state, not per-test.
        std::env::set_var("MESHNN_MAX_EDGES", "48");
        let p = IndexParams::from_env().unwrap();
        assert_eq!(p.max_edges, 48);
        std::env::remove_var("MESHNN_MAX_EDGES");
    }
}

//! Configuration file parser for estimation runs

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::covar::CovarOptions;
use crate::error::{Error, Result};
use crate::mean::MeanOptions;
use crate::nufft::{Backend, PlanOptions, Precision};

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub plan: PlanSection,
    pub mean: MeanSection,
    #[serde(default)]
    pub covar: CovarSection,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PlanSection {
    /// Dimensionality of the frequency space, 1 to 3
    pub dimensions: usize,

    /// Output grid size, one entry per dimension
    pub grid_size: Vec<usize>,

    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    #[serde(default)]
    pub backend: Backend,

    #[serde(default)]
    pub thread_budget: usize,

    #[serde(default)]
    pub precision: Precision,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct MeanSection {
    #[serde(default)]
    pub regularizer: f64,

    pub max_iterations: usize,

    pub tolerance: f64,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct CovarSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_covar_precision")]
    pub precision: Precision,
}

impl Default for CovarSection {
    fn default() -> Self {
        Self { batch_size: default_batch_size(), precision: default_covar_precision() }
    }
}

fn default_epsilon() -> f64 { 1e-15 }
fn default_batch_size() -> usize { 512 }
fn default_covar_precision() -> Precision { Precision::Single }

impl Config {
    /// Validate the plan section into `PlanOptions` (plus the grid size).
    pub fn plan_options(&self) -> Result<(Vec<usize>, PlanOptions)> {
        let plan = &self.plan;
        if plan.dimensions == 0 || plan.dimensions > 3 {
            return Err(Error::config(format!(
                "dimensions must be 1 to 3, got {}", plan.dimensions
            )));
        }
        if plan.grid_size.len() != plan.dimensions {
            return Err(Error::config(format!(
                "grid_size has {} entries for {} dimensions",
                plan.grid_size.len(), plan.dimensions
            )));
        }
        if !(plan.epsilon > 0.0) {
            return Err(Error::config(format!("epsilon must be positive, got {}", plan.epsilon)));
        }
        let options = PlanOptions {
            backend: plan.backend,
            precision: plan.precision,
            epsilon: plan.epsilon,
            thread_budget: plan.thread_budget,
        };
        Ok((plan.grid_size.clone(), options))
    }

    pub fn mean_options(&self) -> Result<MeanOptions> {
        let mean = &self.mean;
        if mean.regularizer < 0.0 {
            return Err(Error::config(format!(
                "regularizer must be non-negative, got {}", mean.regularizer
            )));
        }
        if !(mean.tolerance > 0.0) {
            return Err(Error::config(format!("tolerance must be positive, got {}", mean.tolerance)));
        }
        Ok(MeanOptions {
            regularizer: mean.regularizer,
            max_iterations: mean.max_iterations,
            tolerance: mean.tolerance,
            store_objective: false,
        })
    }

    pub fn covar_options(&self) -> Result<CovarOptions> {
        if self.covar.batch_size == 0 {
            return Err(Error::config("batch_size must be positive".to_string()));
        }
        Ok(CovarOptions {
            batch_size: self.covar.batch_size,
            precision: self.covar.precision,
        })
    }
}

pub fn read_config_file(path: PathBuf) -> Result<Config> {
    let config = fs::read_to_string(&path)
        .map_err(|e| Error::config(format!("could not read config file {path:?}: {e}")))?;
    toml::from_str(&config)
        .map_err(|e| Error::config(format!("could not parse config file {path:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ----- Some helpers to make the tests more concise ---------------------------------
    fn parse(input: &str) -> Config {
        toml::from_str(input).unwrap()
    }

    fn minimal() -> &'static str {
        r#"
            [plan]
            dimensions = 3
            grid_size = [8, 8, 8]

            [mean]
            max_iterations = 50
            tolerance = 1e-10
        "#
    }

    #[test]
    fn minimal_config_fills_in_defaults() {
        let config = parse(minimal());
        let (sz, plan) = config.plan_options().unwrap();
        assert_eq!(sz, vec![8, 8, 8]);
        assert_eq!(plan.backend, Backend::KaiserBessel);
        assert_eq!(plan.precision, Precision::Double);
        assert_eq!(plan.epsilon, 1e-15);
        assert_eq!(plan.thread_budget, 0);

        let mean = config.mean_options().unwrap();
        assert_eq!(mean.regularizer, 0.0);
        assert_eq!(mean.max_iterations, 50);

        let covar = config.covar_options().unwrap();
        assert_eq!(covar.batch_size, 512);
        assert_eq!(covar.precision, Precision::Single);
    }

    #[test]
    fn explicit_values_are_parsed() {
        let config = parse(r#"
            [plan]
            dimensions = 2
            grid_size = [16, 16]
            epsilon = 1e-9
            backend = "exp-semicircle"
            thread_budget = 4
            precision = "single"

            [mean]
            regularizer = 0.01
            max_iterations = 200
            tolerance = 1e-8

            [covar]
            batch_size = 64
            precision = "double"
        "#);
        let (sz, plan) = config.plan_options().unwrap();
        assert_eq!(sz, vec![16, 16]);
        assert_eq!(plan.backend, Backend::ExpSemicircle);
        assert_eq!(plan.precision, Precision::Single);
        assert_eq!(plan.epsilon, 1e-9);
        assert_eq!(plan.thread_budget, 4);
        assert_eq!(config.mean_options().unwrap().regularizer, 0.01);
        assert_eq!(config.covar_options().unwrap().batch_size, 64);
    }

    // ----- Make sure that unknown fields are not accepted -----------------------------
    #[test]
    #[should_panic]
    fn unknown_fields_are_rejected() {
        parse(r#"
            [plan]
            dimensions = 3
            grid_size = [8, 8, 8]
            unknown_field = 666

            [mean]
            max_iterations = 1
            tolerance = 1e-10
        "#);
    }

    #[test]
    fn mismatched_grid_size_is_a_configuration_error() {
        let config = parse(r#"
            [plan]
            dimensions = 3
            grid_size = [8, 8]

            [mean]
            max_iterations = 1
            tolerance = 1e-10
        "#);
        assert!(matches!(config.plan_options(), Err(Error::Configuration(_))));
    }

    #[test]
    fn negative_regularizer_is_a_configuration_error() {
        let config = parse(r#"
            [plan]
            dimensions = 1
            grid_size = [8]

            [mean]
            regularizer = -1.0
            max_iterations = 1
            tolerance = 1e-10
        "#);
        assert!(matches!(config.mean_options(), Err(Error::Configuration(_))));
    }

    // ----- Test an example on-disk config file -----------------------------------------
    #[test]
    fn config_file_roundtrip() -> Result<()> {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("estimate.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", minimal()).unwrap();
        let config = read_config_file(path)?;
        assert_eq!(config.plan.dimensions, 3);
        assert_eq!(config.mean.max_iterations, 50);
        Ok(())
    }

    #[test]
    fn missing_config_file_is_a_configuration_error() {
        let missing = PathBuf::from("/definitely/not/here.toml");
        assert!(matches!(read_config_file(missing), Err(Error::Configuration(_))));
    }
}

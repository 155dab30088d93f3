//! Out-of-vocabulary vector initializers
//!
//! A [`VectorTable`](crate::table::VectorTable) calls its initializer every
//! time a lookup misses. The default is [`ZerosInitializer`].

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum InitializerError {
    #[error("Invalid uniform range [{low}, {high}): low must be less than high")]
    InvalidRange { low: f32, high: f32 },
}

/// Produces the vector returned for unknown tokens.
///
/// Must be `Send + Sync`: loaded tables are shared across threads.
pub trait Initializer: Send + Sync {
    /// Vector of length `dim`
    fn initialize(&self, dim: usize) -> Vec<f32>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// All zeros
#[derive(Debug, Clone, Copy, Default)]
pub struct ZerosInitializer;

impl Initializer for ZerosInitializer {
    fn initialize(&self, dim: usize) -> Vec<f32> {
        vec![0.0; dim]
    }

    fn name(&self) -> &str {
        "zeros"
    }
}

/// Every element set to one value
#[derive(Debug, Clone, Copy)]
pub struct ConstantInitializer {
    value: f32,
}

impl ConstantInitializer {
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Initializer for ConstantInitializer {
    fn initialize(&self, dim: usize) -> Vec<f32> {
        vec![self.value; dim]
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Uniform samples from `[low, high)`, fresh on every call
#[derive(Debug, Clone, Copy)]
pub struct RandomUniformInitializer {
    low: f32,
    high: f32,
}

impl RandomUniformInitializer {
    /// Fails unless `low < high`, which also rules out NaN bounds.
    pub fn new(low: f32, high: f32) -> Result<Self, InitializerError> {
        if !(low < high) {
            return Err(InitializerError::InvalidRange { low, high });
        }
        Ok(Self { low, high })
    }
}

impl Default for RandomUniformInitializer {
    fn default() -> Self {
        Self {
            low: -0.25,
            high: 0.25,
        }
    }
}

impl Initializer for RandomUniformInitializer {
    fn initialize(&self, dim: usize) -> Vec<f32> {
        let mut rng = rand::thread_rng();
        (0..dim).map(|_| rng.gen_range(self.low..self.high)).collect()
    }

    fn name(&self) -> &str {
        "random_uniform"
    }
}

/// Caller-supplied closure
pub struct FnInitializer<F> {
    name: String,
    f: F,
}

impl<F> FnInitializer<F>
where
    F: Fn(usize) -> Vec<f32> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Initializer for FnInitializer<F>
where
    F: Fn(usize) -> Vec<f32> + Send + Sync,
{
    fn initialize(&self, dim: usize) -> Vec<f32> {
        let mut v = (self.f)(dim);
        // A closure returning the wrong length must not break the dim contract
        v.resize(dim, 0.0);
        v
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnInitializer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInitializer").field("name", &self.name).finish()
    }
}

/// Serializable choice of initializer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitializerConfig {
    #[default]
    Zeros,
    Constant {
        value: f32,
    },
    RandomUniform {
        low: f32,
        high: f32,
    },
}

impl InitializerConfig {
    pub fn build(&self) -> Result<Arc<dyn Initializer>, InitializerError> {
        Ok(match *self {
            InitializerConfig::Zeros => Arc::new(ZerosInitializer),
            InitializerConfig::Constant { value } => Arc::new(ConstantInitializer::new(value)),
            InitializerConfig::RandomUniform { low, high } => {
                Arc::new(RandomUniformInitializer::new(low, high)?)
            }
        })
    }

    pub fn validate(&self) -> Result<(), InitializerError> {
        self.build().map(|_| ())
    }
}

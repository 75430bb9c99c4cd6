use std::collections::BTreeMap;

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use super::classifier::{Classifier, ConstantClassifier, EnsembleClassifier, IntensityLogistic};
use crate::error::{MuraError, Result};

/// Selects a registered classifier and its parameters.
///
/// ```toml
/// [model]
/// name = "intensity-logistic"
/// params = { weight = 4.0, bias = -0.5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub params: BTreeMap<String, f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "intensity-logistic".to_string(),
            params: BTreeMap::new(),
        }
    }
}

impl ModelConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: f32) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn param(&self, key: &str, default: f32) -> f32 {
        self.params.get(key).copied().unwrap_or(default)
    }
}

/// Builds a classifier from its configuration.
pub type ClassifierFactory = fn(&ModelConfig) -> anyhow::Result<Box<dyn Classifier>>;

/// Name → factory table, resolved once at startup.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    factories: BTreeMap<&'static str, ClassifierFactory>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every classifier that ships with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("intensity-logistic", build_intensity_logistic);
        registry.register("constant", build_constant);
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, name: &'static str, factory: ClassifierFactory) {
        self.factories.insert(name, factory);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn build(&self, cfg: &ModelConfig) -> Result<Box<dyn Classifier>> {
        let factory = self
            .factories
            .get(cfg.name.as_str())
            .ok_or_else(|| MuraError::UnknownModelName {
                name: cfg.name.clone(),
                available: self.names().join(", "),
            })?;
        factory(cfg).map_err(|e| MuraError::Config(format!("model '{}': {e:#}", cfg.name)))
    }

    /// Build every member; any unknown name fails the whole ensemble.
    pub fn build_ensemble(&self, members: &[ModelConfig]) -> Result<EnsembleClassifier> {
        if members.is_empty() {
            return Err(MuraError::Config("ensemble has no members".into()));
        }
        let built = members
            .iter()
            .map(|m| self.build(m))
            .collect::<Result<Vec<_>>>()?;
        Ok(EnsembleClassifier::new(built))
    }
}

fn build_intensity_logistic(cfg: &ModelConfig) -> anyhow::Result<Box<dyn Classifier>> {
    let weight = cfg.param("weight", 1.0);
    let bias = cfg.param("bias", 0.0);
    ensure!(
        weight.is_finite() && bias.is_finite(),
        "weight and bias must be finite"
    );
    Ok(Box::new(IntensityLogistic { weight, bias }))
}

fn build_constant(cfg: &ModelConfig) -> anyhow::Result<Box<dyn Classifier>> {
    let negative = cfg.param("negative", 0.0);
    let positive = cfg.param("positive", 0.0);
    Ok(Box::new(ConstantClassifier {
        scores: vec![negative, positive],
    }))
}

//! Parameter expansion: turns multi-valued query and path parameters into the
//! full Cartesian product of [`RequestDescriptor`]s.
//!
//! Ordering is path-major: every query combination for the first path value
//! comes before any combination for the second one. Within a path value the
//! query combinations follow key insertion order with the last key varying
//! fastest.

use crate::error::{IngestError, Result};
use crate::request::{QueryParams, RequestDescriptor};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Raw expansion input, validated once and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSpace {
    query_parameters: Vec<(String, Vec<String>)>,
    path_parameters: Vec<Option<String>>,
}

impl ParameterSpace {
    /// Query parameter names must be non-empty and unique; a repeated name
    /// is rejected with [`IngestError::InvalidParameterShape`].
    pub fn new(
        query_parameters: Vec<(String, Vec<String>)>,
        path_parameters: Vec<Option<String>>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(query_parameters.len());
        for (key, _) in &query_parameters {
            if key.trim().is_empty() {
                return Err(IngestError::invalid_shape(key, "query parameter name is empty"));
            }
            if !seen.insert(key.as_str()) {
                return Err(IngestError::invalid_shape(key, "query parameter name is repeated"));
            }
        }
        Ok(Self {
            query_parameters,
            path_parameters,
        })
    }

    /// Builds a space from loosely typed configuration values.
    ///
    /// Scalars (strings, numbers, booleans) become single-element lists.
    /// Lists must hold scalars only; `null`, objects and nested lists are
    /// rejected with [`IngestError::InvalidParameterShape`].
    pub fn from_raw(
        query_parameters: &Map<String, Value>,
        path_parameters: Vec<Option<String>>,
    ) -> Result<Self> {
        let mut query = Vec::with_capacity(query_parameters.len());
        for (key, value) in query_parameters {
            query.push((key.clone(), normalize_values(key, value)?));
        }
        Self::new(query, path_parameters)
    }

    pub fn query_parameters(&self) -> &[(String, Vec<String>)] {
        &self.query_parameters
    }

    pub fn path_parameters(&self) -> &[Option<String>] {
        &self.path_parameters
    }

    /// Number of descriptors [`ParameterSpace::expand`] will produce.
    pub fn request_count(&self) -> usize {
        let paths = self.path_parameters.len().max(1);
        self.query_parameters
            .iter()
            .fold(paths, |acc, (_, values)| acc * values.len())
    }

    pub fn expand(&self, endpoint: &str) -> Vec<RequestDescriptor> {
        expand(endpoint, &self.query_parameters, &self.path_parameters)
    }
}

/// Expands the parameter lists into one descriptor per combination.
///
/// An empty `path_parameters` behaves like `[None]`. Any empty query list
/// collapses the whole product to an empty result. Query keys are assumed
/// unique, which [`ParameterSpace::new`] guarantees.
pub fn expand(
    endpoint: &str,
    query_parameters: &[(String, Vec<String>)],
    path_parameters: &[Option<String>],
) -> Vec<RequestDescriptor> {
    let combinations = query_combinations(query_parameters);
    if combinations.is_empty() {
        return Vec::new();
    }

    let no_path = [None];
    let paths: &[Option<String>] = if path_parameters.is_empty() {
        &no_path
    } else {
        path_parameters
    };

    let mut out = Vec::with_capacity(paths.len() * combinations.len());
    for path in paths {
        for combination in &combinations {
            out.push(RequestDescriptor::new(
                endpoint,
                path.clone(),
                combination.clone(),
            ));
        }
    }
    out
}

fn query_combinations(query_parameters: &[(String, Vec<String>)]) -> Vec<QueryParams> {
    let mut combinations = vec![QueryParams::new()];
    for (key, values) in query_parameters {
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for partial in &combinations {
            for value in values {
                let mut combination = partial.clone();
                combination.insert(key.as_str(), value.as_str());
                next.push(combination);
            }
        }
        combinations = next;
    }
    combinations
}

fn normalize_values(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| {
                    IngestError::invalid_shape(key, format!("list item {} is not a scalar", item))
                })
            })
            .collect(),
        other => scalar_to_string(other)
            .map(|s| vec![s])
            .ok_or_else(|| {
                IngestError::invalid_shape(key, format!("expected a scalar or a list, got {}", other))
            }),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

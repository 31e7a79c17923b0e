use serde::{Deserialize, Serialize};

/// Flat query-parameter mapping that keeps insertion order.
///
/// Order matters: it drives both the query string sent upstream and the
/// generated object name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a pair. A repeated key replaces the earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// One concrete request: endpoint, at most one path value and scalar query values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    endpoint: String,
    path_parameter: Option<String>,
    query_parameter: QueryParams,
}

impl RequestDescriptor {
    pub fn new(
        endpoint: impl Into<String>,
        path_parameter: Option<String>,
        query_parameter: QueryParams,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            path_parameter,
            query_parameter,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn path_parameter(&self) -> Option<&str> {
        self.path_parameter.as_deref()
    }

    pub fn query_parameter(&self) -> &QueryParams {
        &self.query_parameter
    }

    /// Full request URL: base, endpoint and path value concatenated as-is.
    pub fn url(&self, base_url: &str) -> String {
        let mut url = String::with_capacity(base_url.len() + self.endpoint.len() + 8);
        url.push_str(base_url);
        url.push_str(&self.endpoint);
        if let Some(path) = &self.path_parameter {
            url.push_str(path);
        }
        url
    }
}

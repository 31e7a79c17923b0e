//! Deterministic object names derived from request descriptors.

use crate::request::RequestDescriptor;
use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[vV]\d+$").expect("version segment regex is valid"));

const FILE_EXTENSION: &str = ".json";

/// Endpoint segments that carry meaning: version markers (`v1`, `v2`, ...)
/// and segments of length one or less (including the empty trailing one)
/// are dropped.
fn meaningful_segments(endpoint: &str) -> impl Iterator<Item = &str> {
    endpoint
        .split('/')
        .filter(|segment| segment.chars().count() > 1 && !VERSION_SEGMENT.is_match(segment))
}

/// Builds the blob name for a descriptor.
///
/// `ibge/municipios/v1/` with path `AL` and `providers=x` becomes
/// `ibge_municipios_path(AL)_providers(x).json`.
///
/// The `.json` extension rides on the last query segment, so a descriptor
/// without query parameters gets no extension.
pub fn generate_name(descriptor: &RequestDescriptor) -> String {
    let mut name = meaningful_segments(descriptor.endpoint())
        .collect::<Vec<_>>()
        .join("_");

    if let Some(path) = descriptor.path_parameter() {
        name.push_str("_path(");
        name.push_str(path);
        name.push(')');
    }

    let query = descriptor.query_parameter();
    let last = query.len().saturating_sub(1);
    for (index, (key, value)) in query.iter().enumerate() {
        name.push('_');
        name.push_str(key);
        name.push('(');
        name.push_str(value);
        name.push(')');
        if index == last {
            name.push_str(FILE_EXTENSION);
        }
    }

    name
}

/// Blob key for `name` inside an optional folder.
pub fn object_key(folder: Option<&str>, name: &str) -> String {
    match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        Some(folder) => format!("{}/{}", folder, name),
        None => name.to_string(),
    }
}

/// Default destination table for an endpoint, e.g. `ibge_municipios`.
pub fn table_name(endpoint: &str) -> String {
    meaningful_segments(endpoint).collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::QueryParams;

    fn descriptor(endpoint: &str, path: Option<&str>, query: &[(&str, &str)]) -> RequestDescriptor {
        let query: QueryParams = query.iter().copied().collect();
        RequestDescriptor::new(endpoint, path.map(str::to_string), query)
    }

    #[test]
    fn drops_version_and_empty_segments() {
        let d = descriptor("ibge/municipios/v1/", Some("AL"), &[("providers", "x")]);
        assert_eq!(generate_name(&d), "ibge_municipios_path(AL)_providers(x).json");
    }

    #[test]
    fn extension_attaches_to_last_query_segment_only() {
        let d = descriptor("cep/v2/", None, &[("a", "1"), ("b", "2")]);
        assert_eq!(generate_name(&d), "cep_a(1)_b(2).json");
    }

    #[test]
    fn no_query_parameters_means_no_extension() {
        let d = descriptor("ibge/uf/v1/", Some("SP"), &[]);
        assert_eq!(generate_name(&d), "ibge_uf_path(SP)");
    }

    #[test]
    fn single_character_segments_are_dropped() {
        let d = descriptor("/a/banks/x/", None, &[("q", "1")]);
        assert_eq!(generate_name(&d), "banks_q(1).json");
    }

    #[test]
    fn names_are_deterministic_and_distinct() {
        let a = descriptor("ibge/municipios/v1/", Some("AL"), &[("providers", "a")]);
        let b = descriptor("ibge/municipios/v1/", Some("AL"), &[("providers", "b")]);
        let c = descriptor("ibge/municipios/v1/", Some("RR"), &[("providers", "a")]);

        assert_eq!(generate_name(&a), generate_name(&a.clone()));
        assert_ne!(generate_name(&a), generate_name(&b));
        assert_ne!(generate_name(&a), generate_name(&c));
    }

    #[test]
    fn object_key_handles_folders() {
        assert_eq!(object_key(Some("run-1"), "n.json"), "run-1/n.json");
        assert_eq!(object_key(Some("/run-1/"), "n.json"), "run-1/n.json");
        assert_eq!(object_key(Some(""), "n.json"), "n.json");
        assert_eq!(object_key(None, "n.json"), "n.json");
    }

    #[test]
    fn table_name_follows_segment_rules() {
        assert_eq!(table_name("ibge/municipios/v1/"), "ibge_municipios");
        assert_eq!(table_name("cep/v2"), "cep");
    }
}

//! Path templating and URL assembly.
//!
//! A path such as `/user/:id/posts/:post` is split on `/`; every segment that
//! starts with `:` is replaced by the value registered under the rest of the
//! segment. The final URL is `base_url + resolved_path + "?" + query`.
//!
//! Query values are written verbatim as `key=value` pairs. Nothing is
//! percent-encoded here, so callers pre-encode `&`, `=` and spaces.

use crate::error::{RestError, Result};
use std::collections::BTreeMap;

/// Replace every `:name` segment with its value.
///
/// An empty map is not a pass-through: any `:name` segment still fails with
/// [`RestError::MissingPathVariable`]. Paths without placeholders come back as given.
///
/// # Examples
///
/// ```
/// use rest_chain::client::substitute_path_variables;
/// use std::collections::BTreeMap;
///
/// let vars = BTreeMap::from([("id".to_string(), "2".to_string())]);
/// let path = substitute_path_variables("/user/detail/:id", &vars).unwrap();
/// assert_eq!(path, "/user/detail/2");
/// ```
pub fn substitute_path_variables(path: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let segments = path
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => vars
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| RestError::MissingPathVariable(name.to_string())),
            None => Ok(segment),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(segments.join("/"))
}

/// Join query pairs as `k=v&k=v`; empty when there are none
pub fn build_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// `base + path`, followed by `?query` when the query is non-empty
pub fn assemble_url(base_url: Option<&str>, path: &str, query: &str) -> String {
    let mut url = String::with_capacity(
        base_url.map(str::len).unwrap_or(0) + path.len() + query.len() + 1,
    );
    if let Some(base) = base_url {
        url.push_str(base);
    }
    url.push_str(path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}

//! Curl command reconstruction.
//!
//! The builder only calls into this module when a curl sink is configured,
//! so none of the formatting happens for requests nobody inspects.
//!
//! ```text
//! curl --location --request POST 'http://localhost:8080/user/register' \
//! --header 'Content-Type: application/json' \
//! --header 'token: 234' \
//! --data-raw '{"user_id":5}'
//! ```

/// Body clause for a JSON (or raw) payload
pub fn json_clause(json: &str) -> String {
    format!("--data-raw '{}'", json)
}

/// Body clause for a multipart form: one `--form` line per field, then the file
pub fn form_data_clause<'a>(
    fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    file: Option<(&str, &str)>,
) -> String {
    let mut clause = String::new();
    for (k, v) in fields {
        clause.push_str(&format!("--form '{}=\"{}\"' \\\n", k, v));
    }
    if let Some((key, path)) = file {
        clause.push_str(&format!("--form '{}=@\"{}\"' \\\n", key, path));
    }
    clause
}

/// Body clause for an url-encoded form
pub fn urlencoded_clause<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    fields
        .into_iter()
        .map(|(k, v)| format!("--data-urlencode '{}={}' \\\n", k, v))
        .collect()
}

/// Body clause for an octet-stream payload
pub fn octet_stream_clause() -> String {
    "raw".to_string()
}

/// Full command: request line, `Content-Type` first, caller headers, body clause
pub fn build_curl(
    method: &str,
    url: &str,
    content_type: &str,
    headers: &[(String, String)],
    body_clause: &str,
) -> String {
    let mut curl = format!("curl --location --request {} '{}' \\\n", method, url);
    if !content_type.is_empty() {
        curl.push_str(&format!("--header 'Content-Type: {}' \\\n", content_type));
    }
    for (k, v) in headers {
        curl.push_str(&format!("--header '{}: {}' \\\n", k, v));
    }
    curl.push_str(body_clause);
    curl
}

/// Curl sink that prints to stdout
pub fn print_curl(curl: &str) {
    println!("{}", curl);
}

/// Curl sink that emits an INFO event on target `rest_chain::curl`
pub fn log_curl(curl: &str) {
    tracing::info!(target: "rest_chain::curl", "{}", curl);
}

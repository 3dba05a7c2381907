/// Default output file for a host, e.g. `docs.rs` -> `docs-rs-docs.md`
pub fn output_file_for_host(host: &str) -> String {
    format!("{}-docs.md", host.replace('.', "-"))
}

/// Upper-case the first letter of every word and lower-case the rest
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive a readable title from the last non-empty path segment of a URL
pub fn title_from_url(url: &str) -> String {
    let last = url
        .split('/')
        .rev()
        .find(|part| !part.is_empty())
        .unwrap_or_default();

    // Only a scheme/host remains, nothing meaningful to show
    if last.is_empty() || last.ends_with(':') {
        return "Untitled".to_string();
    }

    let words = last.replace(['-', '_'], " ");
    let title = title_case(&words);
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

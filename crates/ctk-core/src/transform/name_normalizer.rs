use heck::{ToLowerCamelCase, ToPascalCase};
use indexmap::IndexMap;

/// Name an operation that declares no `operationId` after its route.
///
/// The verb comes from the method (`GET` on a collection lists, on a single
/// resource gets) and the noun from the literal path segments, with the last
/// one singularized when the path ends in a placeholder:
/// `GET /payments` → `listPayments`, `GET /payments/{id}` → `getPayment`,
/// `POST /payments/{id}/refunds` → `createPaymentsRefunds`.
pub fn route_to_name(method: &str, path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let targets_item = segments
        .last()
        .is_some_and(|s| s.starts_with('{') && s.ends_with('}'));
    let literals: Vec<&str> = segments
        .iter()
        .copied()
        .filter(|s| !s.starts_with('{'))
        .collect();

    let verb = match (method.to_ascii_uppercase().as_str(), targets_item) {
        ("GET", true) => "get".to_string(),
        ("GET", false) => "list".to_string(),
        ("POST", _) => "create".to_string(),
        ("PUT", _) => "update".to_string(),
        (other, _) => other.to_ascii_lowercase(),
    };

    let last = literals.len().saturating_sub(1);
    let noun: String = literals
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i == last && targets_item {
                singularize(word).to_pascal_case()
            } else {
                word.to_pascal_case()
            }
        })
        .collect();

    format!("{verb}{noun}")
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies").filter(|s| !s.is_empty()) {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "zes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Apply a configured alias to an operation name. Names containing
/// whitespace are camel-cased so they stay usable as file names and keys.
pub fn apply_alias(name: &str, aliases: &IndexMap<String, String>) -> String {
    if let Some(alias) = aliases.get(name) {
        return alias.clone();
    }
    if name.chars().any(char::is_whitespace) {
        name.to_lower_camel_case()
    } else {
        name.to_string()
    }
}

/// Lowercase slug used for snapshot directories and scenario ids: runs of
/// anything outside `[a-z0-9_-]` collapse into a single `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "service".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Version component of a snapshot path; only path separators are replaced.
pub fn version_slug(version: &str) -> String {
    let slug = version.trim().replace(['/', '\\'], "-");
    if slug.is_empty() { "0".to_string() } else { slug }
}

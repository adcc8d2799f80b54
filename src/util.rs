use std::path::Path;

/// Random six-character token for debug links (`[A-Z0-9]{6}`).
pub fn debug_token() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Query string that lets an ad or experiment page be opened outside the
/// marketplace.
pub fn debug_query(include_worker: bool) -> String {
    let mut query = format!(
        "assignmentId=debug{}&hitId=debug{}",
        debug_token(),
        debug_token()
    );
    if include_worker {
        query.push_str(&format!("&workerId=debug{}", debug_token()));
    }
    query
}

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

/// Last `count` lines of `text`, in order.
pub fn tail_lines(text: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].to_vec()
}

/// Dollar amounts as shown to the operator.
pub fn format_dollars(amount: f64) -> String {
    format!("${amount:.2}")
}

//! Better error messages with actionable suggestions.

use rhi_tributary_core::Registry;
use std::path::Path;

/// Build an error message for a workflow step that names no transformer.
pub fn unknown_transformer_error(name: &str, registry: &Registry) -> String {
    let mut msg = format!("Unknown transformer '{}'", name);

    if let Some(suggestion) = find_similar_name(name, registry) {
        msg.push_str(&format!(".\n\nDid you mean '{}'?", suggestion));
    } else {
        msg.push('.');
    }

    msg.push_str(" Run `tributary list` to see available transformers.");
    msg
}

/// Build an error message for file read errors.
pub fn file_read_error(path: &str, err: &std::io::Error) -> String {
    use std::io::ErrorKind;

    let mut msg = format!("Failed to read '{}'", path);

    match err.kind() {
        ErrorKind::NotFound => {
            msg.push_str(": file not found");

            if let Some(suggestions) = find_similar_files(path).filter(|s| !s.is_empty()) {
                msg.push_str(&format!(".\n\nDid you mean: {}?", suggestions.join(", ")));
            }
        }
        ErrorKind::PermissionDenied => {
            msg.push_str(": permission denied. Check file permissions.");
        }
        ErrorKind::InvalidData => {
            msg.push_str(": file contains invalid data.");
        }
        _ => {
            msg.push_str(&format!(": {}", err));
        }
    }

    msg
}

/// Closest registered name within edit distance 2, if any.
fn find_similar_name<'a>(input: &str, registry: &'a Registry) -> Option<&'a str> {
    let input = input.to_lowercase();

    registry
        .entries()
        .map(|(name, _)| (name, levenshtein(&input, name)))
        .filter(|&(_, distance)| distance <= 2)
        .min_by_key(|&(_, distance)| distance)
        .map(|(name, _)| name)
}

/// Simple Levenshtein distance for short strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Find similar files in the same directory (for "did you mean" suggestions).
fn find_similar_files(path: &str) -> Option<Vec<String>> {
    let path = Path::new(path);
    let filename = path.file_name()?.to_str()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let entries = std::fs::read_dir(parent).ok()?;
    let mut suggestions: Vec<String> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name != filename && levenshtein(filename, name) <= 2)
        .collect();

    suggestions.sort();
    suggestions.truncate(3);
    Some(suggestions)
}

// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mapping of session identifiers to orchestrator names.
//!
//! Kubernetes object names must be DNS-1123 labels (lowercase alphanumerics
//! and dashes, at most 63 characters, starting with a letter); label values
//! additionally must end in an alphanumeric. Session identifiers are opaque
//! strings, so both mappings sanitize and truncate.

/// Orchestrator name length limit (DNS-1123 label).
const NAME_MAX: usize = 63;

/// Map a session id to a deterministic worker object name.
///
/// The `cw-` prefix guarantees a leading letter.
pub fn worker_name(session_id: &str) -> String {
    let sanitized: String = session_id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut name = format!("cw-{sanitized}");
    name.truncate(NAME_MAX);
    name.trim_end_matches('-').to_string()
}

/// Map a session id to a per-session PVC name.
pub fn volume_name(session_id: &str) -> String {
    let mut name = format!("{}-ws", worker_name(session_id));
    name.truncate(NAME_MAX);
    name.trim_end_matches('-').to_string()
}

/// Sanitize an arbitrary string into a valid label value.
pub fn label_value(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut value = sanitized;
    value.truncate(NAME_MAX);
    value
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_name_is_deterministic_and_lowercase() {
        assert_eq!(worker_name("Session-42"), "cw-session-42");
        assert_eq!(worker_name("Session-42"), worker_name("Session-42"));
    }

    #[test]
    fn worker_name_replaces_invalid_characters() {
        assert_eq!(worker_name("user@example.com"), "cw-user-example-com");
        assert_eq!(worker_name("a_b c"), "cw-a-b-c");
    }

    #[test]
    fn worker_name_starts_with_a_letter_even_for_numeric_ids() {
        let name = worker_name("12345");
        assert!(name.starts_with("cw-"));
        assert!(name.chars().next().unwrap().is_ascii_lowercase());
    }

    #[test]
    fn worker_name_respects_length_limit() {
        let long = "x".repeat(200);
        let name = worker_name(&long);
        assert!(name.len() <= 63);
        assert!(!name.ends_with('-'));
    }

    #[test]
    fn label_value_trims_non_alphanumeric_edges() {
        assert_eq!(label_value("-abc-"), "abc");
        assert_eq!(label_value("a/b"), "a-b");
    }

    #[test]
    fn volume_name_derives_from_worker_name() {
        assert_eq!(volume_name("s1"), "cw-s1-ws");
    }
}

use std::collections::HashSet;

/// Result of comparing two consecutive identifier lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// The last new identifier in delivery order. This is the one that gets flagged.
    pub latest: String,
    /// How many identifiers were new in this snapshot. Only one alert is raised regardless.
    pub new_count: usize,
}

/// Identifiers in `current` that do not appear in `previous`, in `current` order.
pub fn new_identifiers<'a>(previous: &[String], current: &'a [String]) -> Vec<&'a str> {
    let seen: HashSet<&str> = previous.iter().map(String::as_str).collect();
    current
        .iter()
        .map(String::as_str)
        .filter(|id| !seen.contains(id))
        .collect()
}

/// Decide whether `current` contains a newly appended identifier.
///
/// An alert requires all three of:
/// - `previous` is non-empty (the first snapshot after subscribing never alerts),
/// - `current` is strictly longer than `previous`,
/// - at least one identifier of `current` is missing from `previous`.
///
/// A same-length update never alerts, even when membership changed.
pub fn detect(previous: &[String], current: &[String]) -> Option<Detection> {
    if previous.is_empty() || current.len() <= previous.len() {
        return None;
    }
    let fresh = new_identifiers(previous, current);
    let latest = fresh.last()?;
    Some(Detection {
        latest: (*latest).to_owned(),
        new_count: fresh.len(),
    })
}

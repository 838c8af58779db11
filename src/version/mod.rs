//! Dotted numeric version comparison.
//!
//! Versions are compared component by component as integers after splitting on
//! `.`. Missing trailing components count as `0`, so `1.2` and `1.2.0` are
//! equal. A component that is not a plain integer also counts as `0`. An absent
//! version sorts before every concrete version.

use std::cmp::Ordering;

/// Compares two optional dotted versions.
///
/// # Examples
///
/// ```
/// use abu_cli::version::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions(Some("1.2.0"), Some("1.2")), Ordering::Equal);
/// assert_eq!(compare_versions(None, Some("1.0")), Ordering::Less);
/// assert_eq!(compare_versions(Some("2.0.1"), Some("1.9.9")), Ordering::Greater);
/// ```
#[must_use]
pub fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_components(a, b),
    }
}

/// Same as [`compare_versions`] but mapped to `-1`, `0` or `1`.
#[must_use]
pub fn compare_versions_signum(a: Option<&str>, b: Option<&str>) -> i32 {
    match compare_versions(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn compare_components(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());

    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn components(version: &str) -> Vec<u64> {
    version.trim().split('.').map(|part| part.trim().parse::<u64>().unwrap_or(0)).collect()
}

//! Glob matching used throughout policy and exception definitions.
//!
//! Patterns support two wildcards: `*` matches zero or more characters and `?` matches exactly
//! one character. Every other character matches itself.

/// Returns true if `value` matches the glob `pattern`.
///
/// An empty pattern only matches an empty value.
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern.is_empty() {
        return value.is_empty();
    }
    if pattern == "*" {
        return true;
    }

    let pattern = pattern.chars().collect::<Vec<_>>();
    let value = value.chars().collect::<Vec<_>>();

    let (mut p, mut v) = (0, 0);
    // The position of the last `*` seen in the pattern and the value position it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;
    while v < value.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, v));
                p += 1;
            }
            Some(&c) if c == '?' || c == value[v] => {
                p += 1;
                v += 1;
            }
            _ => match backtrack {
                // Let the last star absorb one more character.
                Some((star, from)) => {
                    p = star + 1;
                    v = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Returns true if the pattern contains `*` or `?`.
pub fn contains_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

//! Nearest-name suggestions for unbound-symbol diagnostics.

/// Levenshtein edit distance between two strings.
pub fn distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Pick the candidate closest to `target`, if any is close enough to be a
/// plausible typo (distance bounded by half the target length, at least 2).
pub fn suggest<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let threshold = (target.chars().count() / 2).max(2);
    candidates
        .into_iter()
        .map(|c| (distance(target, c), c))
        .filter(|(d, _)| *d <= threshold)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        assert_eq!(distance("head", "head"), 0);
    }

    #[test]
    fn test_distance_edits() {
        assert_eq!(distance("head", "heads"), 1);
        assert_eq!(distance("kitten", "sitting"), 3);
        assert_eq!(distance("", "abc"), 3);
    }

    #[test]
    fn test_suggest_picks_closest() {
        let names = ["print", "puts", "input"];
        assert_eq!(suggest("pritn", names), Some("print"));
        assert_eq!(suggest("putz", names), Some("puts"));
    }

    #[test]
    fn test_suggest_rejects_far_names() {
        let names = ["print"];
        assert_eq!(suggest("zzzzzzzz", names), None);
    }
}

/// Case-insensitive similarity in [0.0, 1.0].
///
/// Exact match is 1.0; an empty side against a non-empty one is 0.0;
/// substring containment short-circuits to 0.7 (statement references often
/// embed the expected text verbatim inside booking noise); otherwise
/// normalized Levenshtein over chars.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (&a, &b)
    } else {
        (&b, &a)
    };
    if longer.contains(shorter.as_str()) {
        return 0.7;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    1.0 - (levenshtein(&a, &b) as f64 / max_len as f64)
}

/// Two-row O(min(m,n)) edit distance over chars. Bytes would miscount
/// umlauts, which German statement text is full of.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let (a, b) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_ignores_case() {
        assert_eq!(similarity("Miete", "miete"), 1.0);
        assert_eq!(similarity("MIETE MÄRZ", "miete märz"), 1.0);
    }

    #[test]
    fn empty_against_nonempty_is_zero() {
        assert_eq!(similarity("", "miete"), 0.0);
        assert_eq!(similarity("miete", ""), 0.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn substring_containment_short_circuits() {
        assert_eq!(similarity("Miete", "Miete März Wohnung 2"), 0.7);
        assert_eq!(similarity("MIETE MÄRZ WOHNUNG 2", "miete"), 0.7);
    }

    #[test]
    fn edit_distance_fallback() {
        // "miete" vs "mietr": 1 edit over 5 chars.
        let s = similarity("miete", "mietr");
        assert!((s - 0.8).abs() < 1e-9);
    }

    #[test]
    fn bounds_symmetry_identity() {
        let samples = ["", "miete", "Müller", "Nebenkosten 2024", "xyz"];
        for a in samples {
            assert_eq!(similarity(a, a), 1.0);
            for b in samples {
                let s = similarity(a, b);
                assert!((0.0..=1.0).contains(&s), "similarity({a},{b}) = {s}");
                assert_eq!(s, similarity(b, a));
            }
        }
    }

    #[test]
    fn umlauts_count_as_single_edits() {
        // One char substitution in 4-char strings, not a byte-level mess.
        let s = similarity("märz", "marz");
        assert!((s - 0.75).abs() < 1e-9);
    }
}

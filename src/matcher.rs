//! Text normalization and fuzzy similarity scoring.
//!
//! Matching is tolerant of OCR noise: strings are normalized (lowercased,
//! punctuation stripped, whitespace collapsed) and compared with a
//! normalized indel similarity, so "Jonh Smith" still finds "John Smith"
//! while "Jane Smith" stays below a 0.9 threshold.

/// Characters dropped during normalization; possessive "'s" is removed as a
/// unit first so "Oliver's" and "Oliver" compare equal.
const STRIP: &[char] = &[
    '.', ',', '(', ')', '"', '\'', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', ';', ':',
    '!', '?',
];

/// Normalizes text for fuzzy comparison: lowercase, possessives and
/// punctuation stripped, whitespace runs collapsed to a single space.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let lowered = lowered.replace("\u{2019}s ", " ").replace("'s ", " ");
    let trimmed = lowered
        .strip_suffix("\u{2019}s")
        .or_else(|| lowered.strip_suffix("'s"))
        .map(str::to_string);
    let lowered = trimmed.unwrap_or(lowered);

    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else if !STRIP.contains(&ch) {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

/// Normalized indel similarity in [0, 1]: `2 * lcs / (len_a + len_b)`.
///
/// Equivalent to one minus the normalized insert/delete distance, the same
/// scoring family as `fuzz.ratio`. Both inputs are compared as-is; callers
/// normalize first.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let lcs = lcs_length(&a, &b);
    (2.0 * lcs as f64) / ((a.len() + b.len()) as f64)
}

/// Similarity of two raw strings after normalization
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    similarity(&normalize(a), &normalize(b))
}

/// Longest common subsequence length, two-row dynamic programming
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("John  Smith."), "john smith");
        assert_eq!(normalize("  (Hughes Construction) "), "hughes construction");
        assert_eq!(normalize("Oliver's school"), "oliver school");
        assert_eq!(normalize("Oliver's"), "oliver");
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("john smith", "john smith"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("john", ""), 0.0);
    }

    #[test]
    fn ocr_typo_sits_on_the_match_boundary() {
        // The transposed "Jonh" scores exactly 0.9 against "John Smith",
        // meeting a >= 0.9 threshold; "Jane Smith" falls well below it.
        let seed = normalize("Jonh Smith");
        assert!(similarity(&seed, &normalize("John Smith")) >= 0.9);
        assert!(similarity(&seed, &normalize("Jane Smith")) < 0.9);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = normalize("Bridgwater Primary School");
        let b = normalize("Bridgewater Primary School");
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
        assert!(similarity(&a, &b) > 0.9);
    }
}

/// Levenshtein edit distance using the two-row O(min(m,n)) space algorithm.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let n = b.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for j in 1..=n {
            let cost = usize::from(*ca != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Lowercase, alphanumeric words joined by single spaces.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Edit-distance similarity of the normalized strings, in `[0.0, 1.0]`.
pub fn similarity(s1: &str, s2: &str) -> f32 {
    let a = normalize(s1);
    let b = normalize(s2);
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(&a, &b) as f32 / max_len as f32)
}

/// Shared words divided by the longer word count. Words of the first
/// description are counted with repetition.
pub fn word_overlap(s1: &str, s2: &str) -> f32 {
    let lower1 = s1.to_lowercase();
    let lower2 = s2.to_lowercase();
    let words1: Vec<&str> = lower1.split_whitespace().collect();
    let words2: Vec<&str> = lower2.split_whitespace().collect();
    let longest = words1.len().max(words2.len());
    if longest == 0 {
        return 0.0;
    }
    let common = words1.iter().filter(|w| words2.contains(w)).count();
    common as f32 / longest as f32
}

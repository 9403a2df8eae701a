// Text helpers shared by the context reconstructor and the code resolver.

/// Trims the line and collapses runs of whitespace into a single space.
pub fn normalize_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Lower-cased letters and digits separated by single spaces.
/// Used to compare place names and person names.
pub fn normalize_name(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    normalize_line(&cleaned)
}

/// The 6-character candidate code derived from a name: the surname (last word
/// containing letters), upper-cased, letters only, truncated to 6 characters
/// and padded with `X`.
///
/// Returns an empty string if the name has no letters.
pub fn surname_code(name: &str) -> String {
    let surname = name
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_ascii_alphabetic()))
        .last()
        .unwrap_or("");
    let mut code: String = surname
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .take(6)
        .collect();
    if code.is_empty() {
        return code;
    }
    while code.len() < 6 {
        code.push('X');
    }
    code
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut cur: Vec<usize> = vec![0; b_chars.len() + 1];
    for (i, ca) in a_chars.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b_chars.len()]
}

//! Trigram name similarity.
//!
//! Words are lowercased and padded with two leading spaces and one trailing
//! space before trigrams are taken, and the score is the Jaccard index of the
//! two trigram sets. `"Jon Smith"` vs `"John Smith"` lands around 0.6.

use std::collections::HashSet;

type Trigram = [char; 3];

/// Trigram set of `text`. Non-alphanumeric characters separate words.
pub fn trigrams(text: &str) -> HashSet<Trigram> {
    let lowered = text.to_lowercase();
    let mut set = HashSet::new();

    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();

        for window in padded.windows(3) {
            set.insert([window[0], window[1], window[2]]);
        }
    }

    set
}

/// Similarity in `[0, 1]`. Two strings without any word characters score 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }

    let shared = left.intersection(&right).count();
    shared as f64 / union as f64
}

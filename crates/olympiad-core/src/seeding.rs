//! # Seeding
//!
//! Pure bracket mathematics. Nothing here knows about stages or storage.

/// Standard bracket order for `size` slots (`size` must be a power of two).
///
/// Positions `2i` and `2i + 1` are first-round opponents. Built recursively:
/// each seed `s` of the half-size order is followed by its mirror
/// `size + 1 - s`, so the top seeds can only meet in late rounds.
///
/// ```
/// use olympiad_core::seeding::standard_seeding;
/// assert_eq!(standard_seeding(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
/// ```
#[must_use]
pub fn standard_seeding(size: usize) -> Vec<usize> {
    if size <= 1 {
        return vec![1];
    }
    let half = standard_seeding(size / 2);
    let mut seeds = Vec::with_capacity(size);
    for s in half {
        seeds.push(s);
        seeds.push(size + 1 - s);
    }
    seeds
}

/// Smallest power of two that holds `participants` (at least 1).
#[must_use]
pub fn bracket_size(participants: usize) -> usize {
    participants.max(1).next_power_of_two()
}

/// Number of rounds of a bracket with `bracket_size` slots.
#[must_use]
pub fn round_count(bracket_size: usize) -> usize {
    bracket_size.max(1).trailing_zeros() as usize
}

/// Number of matches played in round `round` (0 = first round).
#[must_use]
pub fn matches_in_round(bracket_size: usize, round: usize) -> usize {
    bracket_size >> (round + 1)
}

/// First-round seed pairs, in match order.
#[must_use]
pub fn first_round_pairs(size: usize) -> Vec<(usize, usize)> {
    standard_seeding(size)
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

/// Display label for the group created at `index`: A, B, …, Z, AA, AB, …
#[must_use]
pub fn group_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

//! Shuffle order generation
//!
//! The queue never reorders its track list. Shuffle is a play order: a
//! permutation of queue indices walked by the cursor.

use rand::seq::SliceRandom;
use rand::Rng;

/// Identity play order for `len` tracks
pub fn sequential_order(len: usize) -> Vec<usize> {
    (0..len).collect()
}

/// Random play order that starts at `anchor`
///
/// Uses Fisher-Yates over every other index, so each remaining track has
/// equal probability of appearing at any later position. Anchoring keeps
/// the current track current when shuffle is switched on.
pub fn anchored_order<R: Rng + ?Sized>(len: usize, anchor: usize, rng: &mut R) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }

    let anchor = anchor.min(len - 1);
    let mut rest: Vec<usize> = (0..len).filter(|&index| index != anchor).collect();
    rest.shuffle(rng);

    let mut order = Vec::with_capacity(len);
    order.push(anchor);
    order.extend(rest);
    order
}

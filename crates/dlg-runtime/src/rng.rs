//! Seedable RNG behind `[random]` blocks. All state is one `u32` word that
//! travels in the save file, so a restored conversation draws the same
//! branches it would have drawn live.

pub(crate) fn advance(state: &mut u32) -> u32 {
    let mut word = state.wrapping_add(0x6d2b79f5);
    *state = word;
    word = (word ^ (word >> 15)).wrapping_mul(word | 1);
    word ^= word.wrapping_add((word ^ (word >> 7)).wrapping_mul(word | 61));
    word ^ (word >> 14)
}

/// Uniform draw in `0..bound` by rejection sampling, so every branch of a
/// `[random]` block is equally likely regardless of `bound`.
pub(crate) fn draw_bounded(state: &mut u32, bound: u32) -> u32 {
    draw_bounded_with(state, bound, advance)
}

fn draw_bounded_with<F>(state: &mut u32, bound: u32, mut next: F) -> u32
where
    F: FnMut(&mut u32) -> u32,
{
    let threshold = (u64::from(u32::MAX) + 1) / u64::from(bound) * u64::from(bound);
    let mut candidate = next(state);
    while u64::from(candidate) >= threshold {
        candidate = next(state);
    }
    candidate % bound
}

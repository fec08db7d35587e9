//! Fixed-size bitset used for per-primitive and per-static-mesh visibility
//! maps.

/// A dense bitset sized once per frame to the scene's current max index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitset {
    words: Vec<u64>,
    len: usize,
}

impl Bitset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize to `len` bits, clearing every bit.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.words.clear();
        self.words.resize(len.div_ceil(64), 0);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; a bit beyond the live count means
    /// the caller's index bookkeeping has diverged from the scene arrays.
    pub fn set(&mut self, index: usize) {
        assert!(index < self.len, "bit index {index} out of range {}", self.len);
        self.words[index / 64] |= 1 << (index % 64);
    }

    pub fn clear_bit(&mut self, index: usize) {
        assert!(index < self.len, "bit index {index} out of range {}", self.len);
        self.words[index / 64] &= !(1 << (index % 64));
    }

    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    /// True if any bit is set.
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate the indices of set bits in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(word_index * 64 + bit)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_and_sizes() {
        let mut bits = Bitset::new();
        bits.reset(70);
        bits.set(69);
        assert!(bits.get(69));
        bits.reset(70);
        assert!(!bits.get(69));
        assert!(!bits.any());
    }

    #[test]
    fn test_get_out_of_range_is_false() {
        let mut bits = Bitset::new();
        bits.reset(10);
        assert!(!bits.get(1000));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_out_of_range_panics() {
        let mut bits = Bitset::new();
        bits.reset(10);
        bits.set(10);
    }

    #[test]
    fn test_iter_set_crosses_word_boundaries() {
        let mut bits = Bitset::new();
        bits.reset(200);
        for index in [0, 63, 64, 127, 199] {
            bits.set(index);
        }
        let collected: Vec<usize> = bits.iter_set().collect();
        assert_eq!(collected, vec![0, 63, 64, 127, 199]);
        assert_eq!(bits.count_ones(), 5);
    }

    #[test]
    fn test_clear_bit() {
        let mut bits = Bitset::new();
        bits.reset(10);
        bits.set(3);
        bits.clear_bit(3);
        assert!(!bits.get(3));
    }
}

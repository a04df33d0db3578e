use bit_vec::BitVec;
use seahash::hash;

/// Bloom filter over airport codes. A `false` answer from
/// [`CodeFilter::might_contain`] means no record ever carried the code.
pub struct CodeFilter {
    bits: BitVec,
    num_hashes: u32,
    inserted: usize,
}

impl CodeFilter {
    /// expected_codes: how many distinct codes the filter is sized for.
    /// false_positive_rate: acceptable error rate (e.g. 0.01 for 1%).
    pub fn new(expected_codes: usize, false_positive_rate: f64) -> Self {
        let n = expected_codes.max(1) as f64;
        // m = -(n * ln(p)) / (ln(2)^2)
        let ln2 = 2.0f64.ln();
        let m = (-(n * false_positive_rate.ln()) / (ln2 * ln2)).ceil().max(64.0);
        // k = (m / n) * ln(2)
        let k = ((m / n) * ln2).ceil().max(1.0);

        Self {
            bits: BitVec::from_elem(m as usize, false),
            num_hashes: k as u32,
            inserted: 0,
        }
    }

    pub fn insert(&mut self, code: &str) {
        let m = self.bits.len() as u64;
        for idx in Self::probes(code, self.num_hashes, m) {
            self.bits.set(idx, true);
        }
        self.inserted += 1;
    }

    pub fn might_contain(&self, code: &str) -> bool {
        let m = self.bits.len() as u64;
        Self::probes(code, self.num_hashes, m).all(|idx| self.bits.get(idx).unwrap_or(false))
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    // Double hashing: g_i(x) = h1(x) + i * h2(x)
    fn probes(code: &str, num_hashes: u32, m: u64) -> impl Iterator<Item = usize> {
        let h1 = hash(code.as_bytes());
        let h2 = h1.rotate_left(32).wrapping_add(0x9E37_79B9_7F4A_7C15);
        (0..num_hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_codes_are_reported() {
        let mut filter = CodeFilter::new(100, 0.01);
        for code in ["JFK", "KJFK", "LAX", "KLAX"] {
            filter.insert(code);
        }
        for code in ["JFK", "KJFK", "LAX", "KLAX"] {
            assert!(filter.might_contain(code));
        }
        assert_eq!(filter.inserted(), 4);
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let mut filter = CodeFilter::new(1_000, 0.01);
        for i in 0..1_000 {
            filter.insert(&format!("IN{}", i));
        }
        let false_hits = (0..10_000).filter(|i| filter.might_contain(&format!("OUT{}", i))).count();
        assert!(false_hits < 500, "false positives: {}", false_hits);
    }
}

//! The J-splitting cascade.
//!
//! Starting from a single line (offset 0, amplitude 1), every coupling
//! `(J, s, n)` replaces each line of the current ensemble with `n` children:
//!
//! ```text
//! offset_k    = J · (n/2 − 0.5 − k)            k = 0..n
//! amplitude_k = parent · C(n−1, k)  (+s if offset_k > 0.01, −s if < −0.01)
//! ```
//!
//! Notes:
//! - couplings must be processed in ascending order of `J`
//! - the `s` correction is the roofing heuristic; the threshold applies to the
//!   per-split offset and is reproduced exactly
//! - children of parent `p` are stored at `p·n .. p·n + n`, lowest offset first,
//!   which lets the expansion run in place from the back of the buffers

use crate::domain::{CouplingItem, MAX_LINES, MAX_MULTIPLICITY, checked_line_count};

/// Offsets within this distance of the parent get no anti-phase correction.
pub const ANTIPHASE_THRESHOLD: f64 = 0.01;

/// Binomial coefficient `C(n, k)` (row `n` of Pascal's triangle).
pub fn pascal(n: u32, k: u32) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut c = 1.0;
    for i in 0..k {
        c = c * f64::from(n - i) / f64::from(i + 1);
    }
    c
}

/// Sort couplings into cascade order (ascending `J`).
pub fn sort_couplings(items: &mut [CouplingItem]) {
    items.sort_by(CouplingItem::cmp_coupling);
}

/// Parallel line offsets and relative amplitudes produced by the cascade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSet {
    pub frequencies: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

impl LineSet {
    /// One uncoupled line at offset 0 with amplitude 1.
    pub fn singlet() -> Self {
        Self {
            frequencies: vec![0.0],
            amplitudes: vec![1.0],
        }
    }

    /// Reset to [`LineSet::singlet`] while keeping the allocations.
    pub fn reset_singlet(&mut self) {
        self.frequencies.clear();
        self.amplitudes.clear();
        self.frequencies.push(0.0);
        self.amplitudes.push(1.0);
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Add `center` to every line frequency.
    pub fn shift(&mut self, center: f64) {
        for f in &mut self.frequencies {
            *f += center;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.amplitudes.iter().copied())
    }
}

/// Expand `items` into `lines`.
///
/// With no items the buffers are left untouched; seed them with
/// [`LineSet::singlet`] when a single uncoupled line is wanted.
///
/// # Panics
/// Panics if a multiplicity lies outside `1..=MAX_MULTIPLICITY` or the
/// couplings expand to more than `MAX_LINES` lines. Signal shapes and patterns
/// are validated when a fit session is built, so this only fires on direct
/// misuse.
pub fn split_lines(items: &[CouplingItem], lines: &mut LineSet) {
    if items.is_empty() {
        return;
    }
    debug_assert!(
        items.windows(2).all(|w| w[0].coupling <= w[1].coupling),
        "couplings must be sorted ascending"
    );

    for item in items {
        assert!(
            (1..=MAX_MULTIPLICITY).contains(&item.multiplicity),
            "multiplicity {} outside 1..={MAX_MULTIPLICITY}",
            item.multiplicity
        );
    }
    let total = checked_line_count(items.iter().map(|item| item.multiplicity));
    let Some(total) = total else {
        panic!("couplings expand to more than {MAX_LINES} lines");
    };

    let freqs = &mut lines.frequencies;
    let amps = &mut lines.amplitudes;
    freqs.resize(total, 0.0);
    amps.resize(total, 0.0);
    freqs[0] = 0.0;
    amps[0] = 1.0;

    let mut current = 1usize;
    for item in items {
        let n = item.multiplicity as usize;
        let j = item.coupling;
        let s = item.antiphase;

        // Walk parents from the back so children never overwrite an
        // unprocessed parent.
        let mut last = n * current;
        for parent in (0..current).rev() {
            let pf = freqs[parent];
            let pa = amps[parent];
            let mut offset = j * (n as f64 / 2.0 - 0.5);
            for k in 0..n {
                last -= 1;
                let weight = pascal((n - 1) as u32, k as u32);
                freqs[last] = pf + offset;
                amps[last] = if offset > ANTIPHASE_THRESHOLD {
                    pa * weight + s
                } else if offset < -ANTIPHASE_THRESHOLD {
                    pa * weight - s
                } else {
                    pa * weight
                };
                offset -= j;
            }
        }
        current *= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_rows() {
        let row: Vec<f64> = (0..=4).map(|k| pascal(4, k)).collect();
        assert_eq!(row, vec![1.0, 4.0, 6.0, 4.0, 1.0]);
        assert_eq!(pascal(15, 7), 6435.0);
        assert_eq!(pascal(3, 5), 0.0);
    }

    #[test]
    fn no_couplings_leaves_singlet() {
        let mut lines = LineSet::singlet();
        split_lines(&[], &mut lines);
        assert_eq!(lines, LineSet::singlet());
    }

    #[test]
    fn symmetric_doublet() {
        let mut lines = LineSet::singlet();
        split_lines(&[CouplingItem::plain(10.0, 2)], &mut lines);
        assert_eq!(lines.frequencies, vec![-5.0, 5.0]);
        assert_eq!(lines.amplitudes, vec![1.0, 1.0]);
    }

    #[test]
    fn triplet_of_doublets() {
        let mut items = vec![CouplingItem::plain(10.0, 2), CouplingItem::plain(5.0, 3)];
        sort_couplings(&mut items);

        let mut lines = LineSet::singlet();
        split_lines(&items, &mut lines);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines.amplitudes, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0]);
        assert_eq!(
            lines.frequencies,
            vec![-10.0, 0.0, -5.0, 5.0, 0.0, 10.0]
        );
    }

    #[test]
    fn antiphase_raises_upfield_and_lowers_downfield() {
        let mut lines = LineSet::singlet();
        split_lines(&[CouplingItem::new(10.0, 0.2, 2)], &mut lines);
        assert!((lines.amplitudes[0] - 0.8).abs() < 1e-12);
        assert!((lines.amplitudes[1] - 1.2).abs() < 1e-12);
    }

    #[test]
    fn antiphase_skips_central_line() {
        let mut lines = LineSet::singlet();
        split_lines(&[CouplingItem::new(6.0, 0.5, 3)], &mut lines);
        assert_eq!(lines.frequencies, vec![-6.0, 0.0, 6.0]);
        assert_eq!(lines.amplitudes, vec![0.5, 2.0, 1.5]);
    }

    #[test]
    fn buffers_are_reused_across_calls() {
        let mut lines = LineSet::singlet();
        split_lines(&[CouplingItem::plain(4.0, 4)], &mut lines);
        assert_eq!(lines.len(), 4);
        lines.reset_singlet();
        split_lines(&[CouplingItem::plain(4.0, 2)], &mut lines);
        assert_eq!(lines.frequencies, vec![-2.0, 2.0]);
    }
}

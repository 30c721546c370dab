//! Team reductions over scalar or packed index ranges.
//!
//! Both entry points carry a compile-time `SERIALIZE` flag. Serialized
//! reductions accumulate strictly in index order on every worker, which
//! makes them bit-for-bit reproducible against a plain serial loop; the
//! non-serialized forms split the range across the team and reassociate
//! freely.
//!
//! [`view_reduction`] reduces a *scalar* index range `[begin, end)` over a
//! provider of packed values. The first and last packs of the range may be
//! partial: their lanes outside `[begin, end)` are garbage (typically the
//! invalid-value sentinel) and are never read. Getting those boundary lanes
//! right is the whole point of this function; the unit tests walk every
//! boundary shape.

use std::ops::AddAssign;

use num::Zero;

use crate::pack::ScalarTraits;
use crate::team::TeamMember;

/// Reduce `lambda` over `[begin, end)` into a fresh `V::zero()`.
///
/// `SERIALIZE = true` runs the full loop in order on every worker; each gets
/// the same answer in a private accumulator. `SERIALIZE = false` divides the
/// range across the team with an unspecified association order.
#[inline(always)]
pub fn parallel_reduce<const SERIALIZE: bool, V, M, F>(
    team: &M,
    begin: usize,
    end: usize,
    mut lambda: F,
) -> V
where
    V: Zero,
    M: TeamMember,
    F: FnMut(usize, &mut V),
{
    if SERIALIZE {
        let mut result = V::zero();
        for k in begin..end {
            lambda(k, &mut result);
        }
        result
    } else {
        team.thread_range_reduce(begin, end, lambda)
    }
}

/// Sum the scalar range `[begin, end)` of a packed view, excluding garbage
/// lanes in partial boundary packs. `input(k)` supplies pack `k`; the result
/// is always a scalar.
///
/// Serialized, the packs are unpacked and summed in strict scalar order.
/// Otherwise whole packs in the interior are reduced as packs and folded
/// once at the end, while the partial first and last packs have their valid
/// lanes folded manually:
///
/// ```text
/// lanes:   [ x x 2 3 ] [ 4 5 6 7 ] [ 8 x x x ]      begin = 2, end = 9
///            garbage^    ^whole pack^     ^garbage
/// ```
pub fn view_reduction<const SERIALIZE: bool, P, M, F>(
    team: &M,
    begin: usize,
    end: usize,
    input: F,
) -> P::Scalar
where
    P: ScalarTraits + Zero + AddAssign + Copy,
    M: TeamMember,
    F: Fn(usize) -> P,
{
    let n = P::LANES;
    if SERIALIZE || n == 1 {
        return parallel_reduce::<SERIALIZE, P::Scalar, M, _>(team, begin, end, |k, acc| {
            *acc += input(k / n).lane(k % n);
        });
    }

    let has_garbage_begin = begin % n != 0;
    let has_garbage_end = end % n != 0;
    let pack_loop_begin = if has_garbage_begin { begin / n + 1 } else { begin / n };
    let pack_loop_end = end / n;

    let mut result = P::Scalar::zero();

    // Valid lanes of a partial first pack. When the whole range lives in
    // this one pack, the end boundary clamps the fold and the end-garbage
    // step below is skipped.
    if has_garbage_begin {
        let first = input(pack_loop_begin - 1);
        let stop = n.min(end - (pack_loop_begin - 1) * n);
        for j in (begin % n)..stop {
            result += first.lane(j);
        }
    }

    // Whole packs: sum packs lane-parallel, fold to scalar once.
    if pack_loop_begin < pack_loop_end {
        let packed = parallel_reduce::<false, P, M, _>(team, pack_loop_begin, pack_loop_end, |k, acc| {
            *acc += input(k);
        });
        result += packed.sum_lanes();
    }

    // Valid lanes of a partial last pack, unless the begin fold already
    // covered it.
    if has_garbage_end && pack_loop_end >= pack_loop_begin {
        let last = input(pack_loop_end);
        for j in 0..(end % n) {
            result += last.lane(j);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::Pack;
    use crate::team::SerialTeam;

    const TOLERANCE: f64 = 10.0 * f64::EPSILON;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= TOLERANCE * b.abs().max(1.0), "{a} != {b}");
    }

    // 8 scalars over 4-lane packs: data[k] = 1/(k+1) inside [begin, end),
    // NaN garbage outside. Any garbage lane that gets read poisons the sum.
    fn poisoned_packs(begin: usize, end: usize) -> Vec<Pack<f64, 4>> {
        (0..2)
            .map(|p| {
                Pack::from_fn(|j| {
                    let k = 4 * p + j;
                    if k >= begin && k < end {
                        1.0 / (k + 1) as f64
                    } else {
                        f64::NAN
                    }
                })
            })
            .collect()
    }

    fn harmonic(begin: usize, end: usize) -> f64 {
        let mut s = 0.0;
        for k in begin..end {
            s += 1.0 / (k + 1) as f64;
        }
        s
    }

    fn check_boundary(begin: usize, end: usize) {
        let team = SerialTeam::new(0);
        let packs = poisoned_packs(begin, end);
        let input = |k: usize| packs[k];

        let vector = view_reduction::<false, Pack<f64, 4>, _, _>(&team, begin, end, input);
        assert!(!vector.is_nan(), "[{begin}, {end}) read a garbage lane");
        assert_close(vector, harmonic(begin, end));

        // serialized form is exactly the in-order scalar loop
        let serial = view_reduction::<true, Pack<f64, 4>, _, _>(&team, begin, end, input);
        assert_eq!(serial, harmonic(begin, end));
    }

    #[test]
    fn aligned_both_ends() {
        check_boundary(0, 8);
    }

    #[test]
    fn garbage_at_begin() {
        check_boundary(2, 8);
    }

    #[test]
    fn garbage_at_end() {
        check_boundary(0, 6);
    }

    #[test]
    fn garbage_at_both_ends() {
        check_boundary(2, 6);
    }

    #[test]
    fn range_within_a_single_pack() {
        check_boundary(1, 3);
        check_boundary(5, 7);
    }

    #[test]
    fn straddling_one_pack_boundary() {
        // [2, 5): two valid lanes of pack 0, one of pack 1, no whole packs
        check_boundary(2, 5);
    }

    #[test]
    fn empty_range() {
        let team = SerialTeam::new(0);
        let packs = poisoned_packs(0, 0);
        let s = view_reduction::<false, Pack<f64, 4>, _, _>(&team, 4, 4, |k| packs[k]);
        assert_eq!(s, 0.0);
    }

    #[test]
    fn scalar_provider_degenerates() {
        let team = SerialTeam::new(0);
        let sum = view_reduction::<false, f64, _, _>(&team, 3, 9, |k| k as f64);
        assert_eq!(sum, (3..9).sum::<usize>() as f64);
    }

    #[test]
    fn parallel_reduce_flavors_agree() {
        let team = SerialTeam::new(0);
        let f = |k: usize, acc: &mut f64| *acc += 1.0 / (k + 1) as f64;

        let serial = parallel_reduce::<true, f64, _, _>(&team, 0, 100, f);
        let vector = parallel_reduce::<false, f64, _, _>(&team, 0, 100, f);
        assert_eq!(serial, harmonic(0, 100));
        assert_close(vector, serial);
    }

    #[test]
    fn integer_reductions_are_exact() {
        let team = SerialTeam::new(0);
        let s = parallel_reduce::<false, i64, _, _>(&team, 0, 10, |k, acc| *acc += k as i64);
        assert_eq!(s, 45);
    }
}

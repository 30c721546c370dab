//! Single-pack folds, lane shifts, and lane-wise math functions.
//!
//! The folds come in two associativity flavors, chosen at compile time:
//! `SERIALIZE = true` walks lanes `0..N` in strict order and is bit-for-bit
//! identical to the equivalent scalar loop; `SERIALIZE = false` reduces
//! pairwise so the compiler is free to vectorize. Everything else here is a
//! plain lane map.

use num::{Float, NumCast};

use crate::pack::{Mask, Pack, Scalar, ScalarTraits};

/// Smallest lane of `p`.
#[inline(always)]
pub fn min<T: Scalar, const N: usize>(p: Pack<T, N>) -> T {
    let mut m = p[0];
    for i in 1..N {
        if p[i] < m {
            m = p[i];
        }
    }
    m
}

/// Largest lane of `p`.
#[inline(always)]
pub fn max<T: Scalar, const N: usize>(p: Pack<T, N>) -> T {
    let mut m = p[0];
    for i in 1..N {
        if p[i] > m {
            m = p[i];
        }
    }
    m
}

/// Smallest lane of `p` among lanes where `mask` is true, seeded with
/// `init`. With an all-false mask the result is `init`.
#[inline(always)]
pub fn min_where<T: Scalar, const N: usize>(mask: Mask<N>, init: T, p: Pack<T, N>) -> T {
    let mut m = init;
    for i in 0..N {
        if mask.get(i) && p[i] < m {
            m = p[i];
        }
    }
    m
}

/// Largest lane of `p` among lanes where `mask` is true, seeded with `init`.
#[inline(always)]
pub fn max_where<T: Scalar, const N: usize>(mask: Mask<N>, init: T, p: Pack<T, N>) -> T {
    let mut m = init;
    for i in 0..N {
        if mask.get(i) && p[i] > m {
            m = p[i];
        }
    }
    m
}

/// Sum of all lanes.
///
/// `SERIALIZE = true` accumulates lane 0 through lane N-1 in strict order,
/// matching the scalar loop bit for bit. `SERIALIZE = false` reduces
/// pairwise, which permits vector reassociation.
#[inline(always)]
pub fn reduce_sum<const SERIALIZE: bool, T: Scalar, const N: usize>(p: Pack<T, N>) -> T {
    if SERIALIZE {
        let mut s = p[0];
        for i in 1..N {
            s = s + p[i];
        }
        s
    } else {
        let mut acc: [T; N] = std::array::from_fn(|i| p[i]);
        let mut width = N;
        while width > 1 {
            width /= 2;
            for i in 0..width {
                acc[i] = acc[i] + acc[i + width];
            }
        }
        acc[0]
    }
}

/// Accumulate the lane sum of `p` into `s`.
///
/// The serialized form folds each lane into `s` in order, so chaining calls
/// over a pack range reproduces the scalar accumulation loop exactly.
#[inline(always)]
pub fn reduce_sum_into<const SERIALIZE: bool, T: Scalar, const N: usize>(p: Pack<T, N>, s: &mut T) {
    if SERIALIZE {
        for i in 0..N {
            *s = *s + p[i];
        }
    } else {
        *s = *s + reduce_sum::<false, T, N>(p);
    }
}

/// Shift lanes one place toward lane 0: `out[k] = p[k + 1]`, with the last
/// lane entering from `next` (lane 0 of `next` when a pack is passed).
///
/// Used to access neighbor elements across pack boundaries in stencil-style
/// kernels.
#[inline(always)]
pub fn shift_left<T: Scalar, const N: usize>(next: impl Into<Pack<T, N>>, p: Pack<T, N>) -> Pack<T, N> {
    let next = next.into();
    Pack::from_fn(|k| if k == N - 1 { next[0] } else { p[k + 1] })
}

/// Shift lanes one place away from lane 0: `out[k] = p[k - 1]`, with lane 0
/// entering from `prev` (the last lane of `prev` when a pack is passed).
#[inline(always)]
pub fn shift_right<T: Scalar, const N: usize>(prev: impl Into<Pack<T, N>>, p: Pack<T, N>) -> Pack<T, N> {
    let prev = prev.into();
    Pack::from_fn(|k| if k == 0 { prev[N - 1] } else { p[k - 1] })
}

/// Lane-wise NaN test. Always all-false for integer packs.
#[inline(always)]
pub fn isnan<T: Scalar, const N: usize>(p: Pack<T, N>) -> Mask<N> {
    Mask::from_fn(|i| p[i].is_nan_value())
}

/// Number of packs of type `P` needed to cover `nscalar` scalars (ceil-div
/// by the lane count).
#[inline(always)]
pub fn npack<P: ScalarTraits>(nscalar: usize) -> usize {
    (nscalar + P::LANES - 1) / P::LANES
}

/// Iota pack: lanes `start, start + 1, ..., start + N - 1`.
#[inline(always)]
pub fn range<T: Scalar, const N: usize>(start: T) -> Pack<T, N> {
    let mut v = start;
    Pack::from_fn(|i| {
        if i > 0 {
            v = v + T::one();
        }
        v
    })
}

macro_rules! pack_gen_unary_fn {
    ($($name:ident),* $(,)?) => {
        $(
            #[doc = concat!("Lane-wise `", stringify!($name), "`.")]
            #[inline(always)]
            pub fn $name<T: Scalar + Float, const N: usize>(p: Pack<T, N>) -> Pack<T, N> {
                Pack::from_fn(|i| p[i].$name())
            }
        )*
    };
}

pack_gen_unary_fn!(abs, sqrt, exp, ln, log10, cbrt, tanh);

/// Lane-wise power, with a scalar or pack exponent.
#[inline(always)]
pub fn pow<T: Scalar + Float, const N: usize>(
    base: Pack<T, N>,
    exp: impl Into<Pack<T, N>>,
) -> Pack<T, N> {
    let exp = exp.into();
    Pack::from_fn(|i| base[i].powf(exp[i]))
}

/// Lane-wise square. Works for integer packs too.
#[inline(always)]
pub fn square<T: Scalar, const N: usize>(p: Pack<T, N>) -> Pack<T, N> {
    p * p
}

/// Lane-wise cube.
#[inline(always)]
pub fn cube<T: Scalar, const N: usize>(p: Pack<T, N>) -> Pack<T, N> {
    p * p * p
}

/// Lane-wise conversion helper mirroring [`Pack::cast`] as a free function.
#[inline(always)]
pub fn cast<U: Scalar, T: Scalar, const N: usize>(p: Pack<T, N>) -> Pack<U, N> {
    Pack::from_fn(|i| <U as NumCast>::from(p[i]).unwrap_or_else(U::invalid))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON_F64: f64 = 1e-12;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= EPSILON_F64 * b.abs().max(1.0), "{a} != {b}");
    }

    #[test]
    fn lane_folds() {
        let p = Pack::<f64, 8>::from_fn(|i| [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0][i]);
        assert_eq!(min(p), 1.0);
        assert_eq!(max(p), 9.0);
    }

    #[test]
    fn masked_folds_respect_seed() {
        let p = Pack::<f64, 4>::from_fn(|i| i as f64);
        let m = Mask::<4>::from_fn(|i| i >= 2);
        assert_eq!(min_where(m, 100.0, p), 2.0);
        assert_eq!(max_where(m, -100.0, p), 3.0);
        // all-false mask leaves the seed
        let none = Mask::<4>::new(false);
        assert_eq!(min_where(none, 42.0, p), 42.0);
        assert_eq!(max_where(none, -42.0, p), -42.0);
    }

    #[test]
    fn reduce_sum_serialized_matches_scalar_loop() {
        let p = Pack::<f64, 8>::from_fn(|i| 1.0 / (i + 1) as f64);
        let mut expected = 0.0;
        for i in 0..8 {
            expected += p[i];
        }
        assert_eq!(reduce_sum::<true, f64, 8>(p), expected);

        let mut s = 0.0;
        reduce_sum_into::<true, f64, 8>(p, &mut s);
        assert_eq!(s, expected);
    }

    #[test]
    fn reduce_sum_flavors_agree_to_roundoff() {
        let p = Pack::<f64, 8>::from_fn(|i| 1.0 / (i + 1) as f64);
        let serial = reduce_sum::<true, f64, 8>(p);
        let vector = reduce_sum::<false, f64, 8>(p);
        assert_close(serial, vector);

        // integer sums are exact either way
        let q = Pack::<i64, 4>::from_fn(|i| (i + 1) as i64);
        assert_eq!(reduce_sum::<true, i64, 4>(q), 10);
        assert_eq!(reduce_sum::<false, i64, 4>(q), 10);
    }

    #[test]
    fn shifts_take_scalar_or_pack_neighbors() {
        let p = Pack::<i32, 4>::from_fn(|i| i as i32);

        let l = shift_left(99, p);
        assert_eq!(l.as_slice(), &[1, 2, 3, 99]);
        let r = shift_right(-1, p);
        assert_eq!(r.as_slice(), &[-1, 0, 1, 2]);

        // pack neighbors: left takes lane 0 of next, right the last lane of prev
        let next = Pack::<i32, 4>::from_fn(|i| 10 + i as i32);
        assert_eq!(shift_left(next, p).as_slice(), &[1, 2, 3, 10]);
        let prev = Pack::<i32, 4>::from_fn(|i| 20 + i as i32);
        assert_eq!(shift_right(prev, p).as_slice(), &[23, 0, 1, 2]);
    }

    #[test]
    fn nan_lane_detection() {
        let mut p = Pack::<f64, 4>::splat(1.0);
        p[2] = f64::NAN;
        let m = isnan(p);
        assert_eq!(m, Mask::from_fn(|i| i == 2));
        assert!(isnan(Pack::<i32, 4>::splat(7)).none());
        assert!(isnan(Pack::<f64, 4>::invalid()).all());
    }

    #[test]
    fn pack_counting_and_iota() {
        assert_eq!(npack::<Pack<f64, 4>>(0), 0);
        assert_eq!(npack::<Pack<f64, 4>>(1), 1);
        assert_eq!(npack::<Pack<f64, 4>>(4), 1);
        assert_eq!(npack::<Pack<f64, 4>>(5), 2);
        assert_eq!(npack::<f64>(7), 7);

        let r = range::<f64, 4>(2.0);
        assert_eq!(r.as_slice(), &[2.0, 3.0, 4.0, 5.0]);
        let ri = range::<i32, 4>(-1);
        assert_eq!(ri.as_slice(), &[-1, 0, 1, 2]);
    }

    #[test]
    fn unary_math_is_lane_wise() {
        let p = Pack::<f64, 4>::from_fn(|i| (i + 1) as f64);
        let neg = -p;
        for i in 0..4 {
            assert_eq!(abs(neg)[i], p[i]);
            assert_close(sqrt(p)[i], p[i].sqrt());
            assert_close(exp(p)[i], p[i].exp());
            assert_close(ln(p)[i], p[i].ln());
            assert_close(log10(p)[i], p[i].log10());
            assert_close(cbrt(p)[i], p[i].cbrt());
            assert_close(tanh(p)[i], p[i].tanh());
        }
    }

    #[test]
    fn powers() {
        let p = Pack::<f64, 4>::from_fn(|i| (i + 1) as f64);
        assert_eq!(square(p).as_slice(), &[1.0, 4.0, 9.0, 16.0]);
        assert_eq!(cube(p).as_slice(), &[1.0, 8.0, 27.0, 64.0]);
        let e = pow(p, 2.0);
        for i in 0..4 {
            assert_close(e[i], p[i] * p[i]);
        }
        let pe = pow(p, p);
        for i in 0..4 {
            assert_close(pe[i], p[i].powf(p[i]));
        }
        let qi = square(Pack::<i32, 4>::splat(3));
        assert_eq!(qi.as_slice(), &[9; 4]);
    }
}

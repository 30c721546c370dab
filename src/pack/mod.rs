//! Packed ("SIMD-friendly") numeric value types.
//!
//! A [`Pack`] is a bundle of `N` scalars inside a single value. Working on
//! packed data makes it much easier for the compiler to vectorize numeric
//! kernels: every operation below is a branch-free lane loop over a
//! fixed-size array, which optimizers turn into vector instructions without
//! any per-architecture intrinsics.
//!
//! [`Mask`] is the boolean companion produced by lane-wise comparisons and
//! consumed by masked assignment. With `N = 1` a `Pack` behaves like a plain
//! scalar and a `Mask` roughly like a `bool`.
//!
//! The lane count must be a nonzero power of two; this is enforced at compile
//! time. Packs of packs do not exist: the lane type must implement
//! [`Scalar`], which `Pack` itself never does.

pub mod mask;
pub mod math;
pub mod scalar;
pub mod where_expr;

pub use mask::Mask;
pub use scalar::{Scalar, ScalarTraits};
pub use where_expr::{where_, WhereExpression};

use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

use num::{NumCast, Zero};

/// A fixed-length bundle of `N` scalars of type `T`.
///
/// `N` must be a nonzero power of two (checked at compile time). Default
/// construction fills every lane with [`Scalar::invalid`], a quiet NaN for
/// floats, the maximum representable value for integers, so that garbage
/// lanes which should never have been read are detectable downstream.
///
/// The layout is `#[repr(C)]`, i.e. exactly `N` contiguous `T`s, so a flat
/// scratch buffer of `T` can be reinterpreted as a buffer of packs (see
/// `Workspace::take_packed`).
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(C)]
pub struct Pack<T: Scalar, const N: usize> {
    d: [T; N],
}

impl<T: Scalar, const N: usize> Pack<T, N> {
    /// Number of lanes.
    pub const LANES: usize = N;

    // Write a power of two and a non-power of two in binary and the bit
    // trick below is clear.
    const LANE_CHECK: () = assert!(
        N > 0 && N & (N - 1) == 0,
        "pack length must be a nonzero power of two"
    );

    /// Build a pack lane by lane.
    #[inline(always)]
    pub fn from_fn(f: impl FnMut(usize) -> T) -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::LANE_CHECK;
        Self {
            d: std::array::from_fn(f),
        }
    }

    /// All lanes set to `v`.
    #[inline(always)]
    pub fn splat(v: T) -> Self {
        Self::from_fn(|_| v)
    }

    /// All lanes set to the sentinel [`Scalar::invalid`] value.
    #[inline(always)]
    pub fn invalid() -> Self {
        Self::splat(T::invalid())
    }

    /// Lane `i` of `v` where `mask` is true, [`Scalar::invalid`] elsewhere.
    #[inline(always)]
    pub fn select(mask: Mask<N>, v: impl Into<Self>) -> Self {
        let v = v.into();
        Self::from_fn(|i| if mask.get(i) { v[i] } else { T::invalid() })
    }

    /// Lane `i` of `v_true` where `mask` is true, of `v_false` elsewhere.
    #[inline(always)]
    pub fn select_or(mask: Mask<N>, v_true: impl Into<Self>, v_false: impl Into<Self>) -> Self {
        let t = v_true.into();
        let f = v_false.into();
        Self::from_fn(|i| if mask.get(i) { t[i] } else { f[i] })
    }

    /// Lanes as a slice.
    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        &self.d
    }

    /// Masked assignment: lanes where `mask` is true take the corresponding
    /// lane of `v`; the rest are left untouched.
    #[inline(always)]
    pub fn set(&mut self, mask: Mask<N>, v: impl Into<Self>) -> &mut Self {
        let v = v.into();
        for i in 0..N {
            if mask.get(i) {
                self.d[i] = v[i];
            }
        }
        self
    }

    /// Two-branch masked assignment: every lane is overwritten, from
    /// `v_true` where `mask` is true and from `v_false` elsewhere.
    #[inline(always)]
    pub fn set_or(&mut self, mask: Mask<N>, v_true: impl Into<Self>, v_false: impl Into<Self>) -> &mut Self {
        let t = v_true.into();
        let f = v_false.into();
        for i in 0..N {
            self.d[i] = if mask.get(i) { t[i] } else { f[i] };
        }
        self
    }

    /// Fused multiply-accumulate: `self = beta*self + alpha*x`, lane-wise.
    ///
    /// With `alpha = 1, beta = 0` this is assignment; with `beta = 1` it is
    /// the scaled accumulate that [`add_scaled`](Self::add_scaled) wraps.
    /// Returns `&mut Self` so calls can be piped.
    #[inline(always)]
    pub fn update(&mut self, x: impl Into<Self>, alpha: T, beta: T) -> &mut Self {
        let x = x.into();
        for i in 0..N {
            self.d[i] = beta * self.d[i] + alpha * x[i];
        }
        self
    }

    /// [`update`](Self::update) restricted to lanes where `mask` is true.
    #[inline(always)]
    pub fn update_where(&mut self, mask: Mask<N>, x: impl Into<Self>, alpha: T, beta: T) -> &mut Self {
        let x = x.into();
        for i in 0..N {
            if mask.get(i) {
                self.d[i] = beta * self.d[i] + alpha * x[i];
            }
        }
        self
    }

    /// Two-source [`update`](Self::update): every lane is updated, drawing
    /// `x` from `x_true` where `mask` is true and from `x_false` elsewhere.
    #[inline(always)]
    pub fn update_select(
        &mut self,
        mask: Mask<N>,
        x_true: impl Into<Self>,
        x_false: impl Into<Self>,
        alpha: T,
        beta: T,
    ) -> &mut Self {
        let t = x_true.into();
        let f = x_false.into();
        for i in 0..N {
            let x = if mask.get(i) { t[i] } else { f[i] };
            self.d[i] = beta * self.d[i] + alpha * x;
        }
        self
    }

    /// `self += alpha*x`: [`update`](Self::update) with `beta = 1`.
    #[inline(always)]
    pub fn add_scaled(&mut self, x: impl Into<Self>, alpha: T) -> &mut Self {
        self.update(x, alpha, T::one())
    }

    /// Masked [`add_scaled`](Self::add_scaled).
    #[inline(always)]
    pub fn add_scaled_where(&mut self, mask: Mask<N>, x: impl Into<Self>, alpha: T) -> &mut Self {
        self.update_where(mask, x, alpha, T::one())
    }

    /// Two-source [`add_scaled`](Self::add_scaled).
    #[inline(always)]
    pub fn add_scaled_select(
        &mut self,
        mask: Mask<N>,
        x_true: impl Into<Self>,
        x_false: impl Into<Self>,
        alpha: T,
    ) -> &mut Self {
        self.update_select(mask, x_true, x_false, alpha, T::one())
    }

    /// Lane-wise conversion to another scalar type. Mixed-precision
    /// arithmetic requires this explicit cast; no implicit promotion is
    /// performed. Lanes that do not convert (e.g. NaN to an integer) become
    /// the target's [`Scalar::invalid`] sentinel.
    #[inline(always)]
    pub fn cast<U: Scalar>(self) -> Pack<U, N> {
        Pack::from_fn(|i| <U as NumCast>::from(self.d[i]).unwrap_or_else(U::invalid))
    }
}

impl<T: Scalar, const N: usize> Default for Pack<T, N> {
    #[inline(always)]
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T: Scalar, const N: usize> From<T> for Pack<T, N> {
    #[inline(always)]
    fn from(v: T) -> Self {
        Self::splat(v)
    }
}

impl<T: Scalar, const N: usize> From<[T; N]> for Pack<T, N> {
    #[inline(always)]
    fn from(d: [T; N]) -> Self {
        Self::from_fn(|i| d[i])
    }
}

impl<T: Scalar, const N: usize> Index<usize> for Pack<T, N> {
    type Output = T;

    #[inline(always)]
    fn index(&self, i: usize) -> &T {
        &self.d[i]
    }
}

impl<T: Scalar, const N: usize> IndexMut<usize> for Pack<T, N> {
    #[inline(always)]
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.d[i]
    }
}

impl<T: Scalar + fmt::Display, const N: usize> fmt::Display for Pack<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..N {
            write!(f, "{} ", self.d[i])?;
        }
        Ok(())
    }
}

// Generate the closed family of lane-wise binary operators over the
// {Pack-Pack, Pack-scalar} operand shapes. The scalar-Pack shape cannot be a
// generic impl (coherence), so it is generated per scalar type below.
macro_rules! pack_gen_bin_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Scalar, const N: usize> $trait for Pack<T, N> {
            type Output = Self;

            #[inline(always)]
            fn $method(self, rhs: Self) -> Self {
                Self::from_fn(|i| self.d[i] $op rhs.d[i])
            }
        }

        impl<T: Scalar, const N: usize> $trait<T> for Pack<T, N> {
            type Output = Self;

            #[inline(always)]
            fn $method(self, rhs: T) -> Self {
                Self::from_fn(|i| self.d[i] $op rhs)
            }
        }
    };
}

pack_gen_bin_op!(Add, add, +);
pack_gen_bin_op!(Sub, sub, -);
pack_gen_bin_op!(Mul, mul, *);
pack_gen_bin_op!(Div, div, /);

macro_rules! pack_gen_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Scalar, const N: usize> $trait for Pack<T, N> {
            #[inline(always)]
            fn $method(&mut self, rhs: Self) {
                for i in 0..N {
                    self.d[i] $op rhs.d[i];
                }
            }
        }

        impl<T: Scalar, const N: usize> $trait<T> for Pack<T, N> {
            #[inline(always)]
            fn $method(&mut self, rhs: T) {
                for i in 0..N {
                    self.d[i] $op rhs;
                }
            }
        }
    };
}

pack_gen_assign_op!(AddAssign, add_assign, +=);
pack_gen_assign_op!(SubAssign, sub_assign, -=);
pack_gen_assign_op!(MulAssign, mul_assign, *=);
pack_gen_assign_op!(DivAssign, div_assign, /=);

// scalar-op-Pack for each primitive scalar type.
macro_rules! pack_gen_scalar_lhs_op {
    ($t:ty, $trait:ident, $method:ident, $op:tt) => {
        impl<const N: usize> $trait<Pack<$t, N>> for $t {
            type Output = Pack<$t, N>;

            #[inline(always)]
            fn $method(self, rhs: Pack<$t, N>) -> Pack<$t, N> {
                Pack::from_fn(|i| self $op rhs[i])
            }
        }
    };
}

macro_rules! pack_gen_scalar_lhs_ops {
    ($($t:ty),* $(,)?) => {
        $(
            pack_gen_scalar_lhs_op!($t, Add, add, +);
            pack_gen_scalar_lhs_op!($t, Sub, sub, -);
            pack_gen_scalar_lhs_op!($t, Mul, mul, *);
            pack_gen_scalar_lhs_op!($t, Div, div, /);
        )*
    };
}

pack_gen_scalar_lhs_ops!(f32, f64, i32, i64, u32, u64, isize, usize);

impl<T: Scalar + Neg<Output = T>, const N: usize> Neg for Pack<T, N> {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        Self::from_fn(|i| -self.d[i])
    }
}

// Additive identity, needed to seed reductions over pack-valued ranges.
impl<T: Scalar, const N: usize> Zero for Pack<T, N> {
    #[inline(always)]
    fn zero() -> Self {
        Self::splat(T::zero())
    }

    #[inline(always)]
    fn is_zero(&self) -> bool {
        self.d.iter().all(|v| v.is_zero())
    }
}

// Lane-wise comparisons. These return a Mask, never a bool; reducing the
// mask (any/all) is the caller's explicit choice.
macro_rules! pack_gen_cmp {
    ($method:ident, $op:tt, $doc:literal) => {
        impl<T: Scalar, const N: usize> Pack<T, N> {
            #[doc = $doc]
            #[inline(always)]
            pub fn $method(self, rhs: impl Into<Self>) -> Mask<N> {
                let rhs = rhs.into();
                Mask::from_fn(|i| self.d[i] $op rhs.d[i])
            }
        }
    };
}

pack_gen_cmp!(eq_elements, ==, "Lane-wise `==`, as a [`Mask`].");
pack_gen_cmp!(ne_elements, !=, "Lane-wise `!=`, as a [`Mask`].");
pack_gen_cmp!(ge_elements, >=, "Lane-wise `>=`, as a [`Mask`].");
pack_gen_cmp!(le_elements, <=, "Lane-wise `<=`, as a [`Mask`].");
pack_gen_cmp!(gt_elements, >, "Lane-wise `>`, as a [`Mask`].");
pack_gen_cmp!(lt_elements, <, "Lane-wise `<`, as a [`Mask`].");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lanes_are_invalid() {
        let p = Pack::<f64, 8>::default();
        for i in 0..8 {
            assert!(p[i].is_nan());
        }
        let q = Pack::<i32, 4>::default();
        for i in 0..4 {
            assert_eq!(q[i], i32::MAX);
        }
    }

    #[test]
    fn splat_and_from_fn() {
        let p = Pack::<f64, 4>::splat(2.5);
        assert_eq!(p.as_slice(), &[2.5; 4]);
        let q = Pack::<f64, 4>::from_fn(|i| i as f64);
        assert_eq!(q.as_slice(), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn masked_constructors() {
        let m = Mask::<4>::from_fn(|i| i % 2 == 0);
        let p = Pack::<f64, 4>::select(m, 1.0);
        assert_eq!(p[0], 1.0);
        assert!(p[1].is_nan());
        assert_eq!(p[2], 1.0);
        assert!(p[3].is_nan());

        let q = Pack::<f64, 4>::select_or(m, 1.0, -1.0);
        assert_eq!(q.as_slice(), &[1.0, -1.0, 1.0, -1.0]);

        let t = Pack::<f64, 4>::from_fn(|i| i as f64);
        let r = Pack::select_or(m, t, -t);
        assert_eq!(r.as_slice(), &[0.0, -1.0, 2.0, -3.0]);
    }

    #[test]
    fn binary_ops_all_shapes() {
        let a = Pack::<f64, 4>::from_fn(|i| (i + 1) as f64);
        let b = Pack::<f64, 4>::splat(2.0);

        assert_eq!((a + b).as_slice(), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!((a - b).as_slice(), &[-1.0, 0.0, 1.0, 2.0]);
        assert_eq!((a * b).as_slice(), &[2.0, 4.0, 6.0, 8.0]);
        assert_eq!((a / b).as_slice(), &[0.5, 1.0, 1.5, 2.0]);

        // pack op scalar
        for i in 0..4 {
            assert_eq!((a + 2.0)[i], a[i] + 2.0);
            assert_eq!((a - 2.0)[i], a[i] - 2.0);
            assert_eq!((a * 2.0)[i], a[i] * 2.0);
            assert_eq!((a / 2.0)[i], a[i] / 2.0);
        }

        // scalar op pack
        for i in 0..4 {
            assert_eq!((2.0 + a)[i], 2.0 + a[i]);
            assert_eq!((2.0 - a)[i], 2.0 - a[i]);
            assert_eq!((2.0 * a)[i], 2.0 * a[i]);
            assert_eq!((2.0 / a)[i], 2.0 / a[i]);
        }
    }

    #[test]
    fn assign_ops_and_neg() {
        let mut a = Pack::<f64, 4>::from_fn(|i| i as f64);
        a += Pack::splat(1.0);
        assert_eq!(a.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        a *= 2.0;
        assert_eq!(a.as_slice(), &[2.0, 4.0, 6.0, 8.0]);
        a -= 1.0;
        a /= Pack::splat(2.0);
        assert_eq!(a.as_slice(), &[0.5, 1.5, 2.5, 3.5]);
        assert_eq!((-a).as_slice(), &[-0.5, -1.5, -2.5, -3.5]);
    }

    #[test]
    fn comparisons_return_masks() {
        let a = Pack::<f64, 4>::from_fn(|i| i as f64);
        let m = a.lt_elements(2.0);
        assert_eq!(m, Mask::from_fn(|i| i < 2));
        assert_eq!(a.ge_elements(2.0), !m);
        assert!(a.eq_elements(a).all());
        assert!(a.ne_elements(a).none());
        let b = Pack::<f64, 4>::splat(1.0);
        assert_eq!(a.gt_elements(b), Mask::from_fn(|i| i > 1));
        assert_eq!(a.le_elements(b), Mask::from_fn(|i| i <= 1));
    }

    #[test]
    fn masked_set() {
        let m = Mask::<4>::from_fn(|i| i >= 2);
        let mut p = Pack::<f64, 4>::splat(0.0);
        p.set(m, 5.0);
        assert_eq!(p.as_slice(), &[0.0, 0.0, 5.0, 5.0]);

        p.set_or(m, 1.0, -1.0);
        assert_eq!(p.as_slice(), &[-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn update_family() {
        let x = Pack::<f64, 4>::splat(3.0);
        let mut y = Pack::<f64, 4>::splat(10.0);

        // y = 2*y + 0.5*x
        y.update(x, 0.5, 2.0);
        assert_eq!(y.as_slice(), &[21.5; 4]);

        // alpha=1, beta=0 is assignment
        let mut z = Pack::<f64, 4>::splat(7.0);
        z.update(x, 1.0, 0.0);
        assert_eq!(z, x);

        let m = Mask::<4>::from_fn(|i| i == 0);
        let mut w = Pack::<f64, 4>::splat(1.0);
        w.update_where(m, x, 2.0, 1.0);
        assert_eq!(w.as_slice(), &[7.0, 1.0, 1.0, 1.0]);

        let mut v = Pack::<f64, 4>::splat(0.0);
        v.update_select(m, Pack::splat(1.0), Pack::splat(-1.0), 1.0, 1.0);
        assert_eq!(v.as_slice(), &[1.0, -1.0, -1.0, -1.0]);

        let mut s = Pack::<f64, 4>::splat(1.0);
        s.add_scaled(x, 2.0);
        assert_eq!(s.as_slice(), &[7.0; 4]);
    }

    #[test]
    fn explicit_cast() {
        let p = Pack::<f32, 4>::from_fn(|i| i as f32 + 0.5);
        let d = p.cast::<f64>();
        for i in 0..4 {
            assert_eq!(d[i], p[i] as f64);
        }
        // NaN does not convert to an integer; lanes fall back to the sentinel
        let n = Pack::<f64, 4>::invalid().cast::<i32>();
        assert_eq!(n.as_slice(), &[i32::MAX; 4]);
    }

    #[test]
    fn zero_identity() {
        let z = Pack::<f64, 4>::zero();
        assert!(z.is_zero());
        let p = Pack::<f64, 4>::splat(1.25);
        assert_eq!(z + p, p);
    }
}

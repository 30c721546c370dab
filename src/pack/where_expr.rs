//! Masked l-value proxy: apply compound assignment only where a mask holds.
//!
//! Bind the proxy and it reads like the masked loop it replaces:
//!
//! ```
//! use packly::pack::{where_, Pack};
//!
//! let mut y = Pack::<f64, 4>::splat(1.0);
//! let m = y.gt_elements(0.0);
//! let mut w = where_(m, &mut y);
//! w += 2.0; // only lanes where m is true
//! ```
//!
//! Two shapes exist: a pack guarded by a [`Mask`], and a plain scalar
//! guarded by a `bool`. The scalar shape lets kernels written against packs
//! degenerate to scalar code without rewriting their masked updates.

use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use crate::pack::{math, Mask, Pack, Scalar};

/// Borrowed l-value plus the mask guarding writes to it. Built with
/// [`where_`]; short-lived by design.
pub struct WhereExpression<'a, M, V> {
    mask: M,
    value: &'a mut V,
}

/// Guard `value` with `mask` for masked assignment and masked folds.
#[inline(always)]
pub fn where_<M, V>(mask: M, value: &mut V) -> WhereExpression<'_, M, V> {
    WhereExpression { mask, value }
}

impl<'a, T: Scalar, const N: usize> WhereExpression<'a, Mask<N>, Pack<T, N>> {
    /// Overwrite the masked lanes with the corresponding lanes of `v`.
    #[inline(always)]
    pub fn assign(&mut self, v: impl Into<Pack<T, N>>) {
        self.value.set(self.mask, v);
    }

    /// Is any guarded lane active?
    #[inline(always)]
    pub fn any(&self) -> bool {
        self.mask.any()
    }

    /// Are all lanes active?
    #[inline(always)]
    pub fn all(&self) -> bool {
        self.mask.all()
    }

    /// Are no lanes active?
    #[inline(always)]
    pub fn none(&self) -> bool {
        self.mask.none()
    }

    /// Largest active lane of the guarded value, seeded with `seed`.
    #[inline(always)]
    pub fn max(&self, seed: T) -> T {
        math::max_where(self.mask, seed, *self.value)
    }

    /// Smallest active lane of the guarded value, seeded with `seed`.
    #[inline(always)]
    pub fn min(&self, seed: T) -> T {
        math::min_where(self.mask, seed, *self.value)
    }
}

macro_rules! where_gen_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<'a, T: Scalar, const N: usize, R: Into<Pack<T, N>>> $trait<R>
            for WhereExpression<'a, Mask<N>, Pack<T, N>>
        {
            #[inline(always)]
            fn $method(&mut self, rhs: R) {
                let rhs = rhs.into();
                for i in 0..N {
                    if self.mask.get(i) {
                        self.value[i] = self.value[i] $op rhs[i];
                    }
                }
            }
        }

        impl<'a, T: Scalar> $trait<T> for WhereExpression<'a, bool, T> {
            #[inline(always)]
            fn $method(&mut self, rhs: T) {
                if self.mask {
                    *self.value = *self.value $op rhs;
                }
            }
        }
    };
}

where_gen_assign_op!(AddAssign, add_assign, +);
where_gen_assign_op!(SubAssign, sub_assign, -);
where_gen_assign_op!(MulAssign, mul_assign, *);
where_gen_assign_op!(DivAssign, div_assign, /);

// bool-guarded scalar shape, mirroring the pack shape with one lane.
impl<'a, T: Scalar> WhereExpression<'a, bool, T> {
    /// Overwrite the value if the guard holds.
    #[inline(always)]
    pub fn assign(&mut self, v: T) {
        if self.mask {
            *self.value = v;
        }
    }

    #[inline(always)]
    pub fn any(&self) -> bool {
        self.mask
    }

    #[inline(always)]
    pub fn all(&self) -> bool {
        self.mask
    }

    #[inline(always)]
    pub fn none(&self) -> bool {
        !self.mask
    }

    /// The guarded value if active and larger than `seed`, else `seed`.
    #[inline(always)]
    pub fn max(&self, seed: T) -> T {
        if self.mask && *self.value > seed {
            *self.value
        } else {
            seed
        }
    }

    /// The guarded value if active and smaller than `seed`, else `seed`.
    #[inline(always)]
    pub fn min(&self, seed: T) -> T {
        if self.mask && *self.value < seed {
            *self.value
        } else {
            seed
        }
    }
}

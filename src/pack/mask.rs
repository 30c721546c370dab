//! Boolean predicate over the lanes of a [`Pack`].
//!
//! A [`Mask`] is produced by the lane-wise comparison methods on
//! [`Pack`] (`eq_elements`, `lt_elements`, ...) and consumed by masked
//! assignment (`Pack::set`), masked updates, and the
//! [`where_`](crate::pack::where_expr::where_) expression proxy.
//!
//! Lanes are stored as machine words rather than single-byte `bool`s; byte
//! booleans vectorize poorly. Masks deliberately do not convert to `bool`:
//! it would be ambiguous whether that means [`any`](Mask::any) or
//! [`all`](Mask::all), so the caller must be explicit.
//!
//! [`Pack`]: crate::pack::Pack

use std::ops::{BitAnd, BitOr, Not};

/// A fixed set of `N` boolean lanes matching the lanes of a `Pack<T, N>`.
#[derive(Copy, Clone, Debug)]
pub struct Mask<const N: usize> {
    d: [i64; N],
}

impl<const N: usize> Mask<N> {
    /// Number of lanes.
    pub const LANES: usize = N;

    /// All lanes set to `init`.
    #[inline(always)]
    pub fn new(init: bool) -> Self {
        Self { d: [init as i64; N] }
    }

    /// Build a mask lane by lane.
    #[inline(always)]
    pub fn from_fn(mut f: impl FnMut(usize) -> bool) -> Self {
        Self {
            d: std::array::from_fn(|i| f(i) as i64),
        }
    }

    /// Set lane `i` to `val`.
    #[inline(always)]
    pub fn set(&mut self, i: usize, val: bool) {
        self.d[i] = val as i64;
    }

    /// Read lane `i`.
    #[inline(always)]
    pub fn get(&self, i: usize) -> bool {
        self.d[i] != 0
    }

    /// Is any lane true?
    #[inline(always)]
    pub fn any(&self) -> bool {
        let mut b = false;
        for i in 0..N {
            if self.d[i] != 0 {
                b = true;
            }
        }
        b
    }

    /// Are all lanes true?
    #[inline(always)]
    pub fn all(&self) -> bool {
        let mut b = true;
        for i in 0..N {
            if self.d[i] == 0 {
                b = false;
            }
        }
        b
    }

    /// Are all lanes false?
    #[inline(always)]
    pub fn none(&self) -> bool {
        !self.any()
    }
}

// Lane-wise logic, no short-circuit. `&`/`|` stand in for the `&&`/`||`
// of the packed comparison algebra.

impl<const N: usize> BitAnd for Mask<N> {
    type Output = Self;

    #[inline(always)]
    fn bitand(self, rhs: Self) -> Self {
        Self::from_fn(|i| self.get(i) && rhs.get(i))
    }
}

impl<const N: usize> BitAnd<bool> for Mask<N> {
    type Output = Self;

    #[inline(always)]
    fn bitand(self, rhs: bool) -> Self {
        Self::from_fn(|i| self.get(i) && rhs)
    }
}

impl<const N: usize> BitOr for Mask<N> {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        Self::from_fn(|i| self.get(i) || rhs.get(i))
    }
}

impl<const N: usize> BitOr<bool> for Mask<N> {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: bool) -> Self {
        Self::from_fn(|i| self.get(i) || rhs)
    }
}

impl<const N: usize> Not for Mask<N> {
    type Output = Self;

    #[inline(always)]
    fn not(self) -> Self {
        Self::from_fn(|i| !self.get(i))
    }
}

// Lane-wise comparison reduced with all().
impl<const N: usize> PartialEq for Mask<N> {
    fn eq(&self, other: &Self) -> bool {
        let mut same = Mask::<N>::new(true);
        for i in 0..N {
            same.set(i, self.get(i) == other.get(i));
        }
        same.all()
    }
}

impl<const N: usize> Eq for Mask<N> {}

// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The capability trait required of the base numeric type `B`.
//!
//! Link to [parent module](super)
//!
//! Any type implementing [Scalar] can be wrapped in [crate::ad::AD] and
//! recorded on a [crate::tape::Tape]. `f32` and `f64` are the two
//! concrete instances exercised by this crate's test suite.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Numeric capability required of the scalar type recorded by [crate::ad::AD].
///
/// The elementary functions here are exactly the catalog named in
/// `op::OpId`'s unary variants; there is no `panic_der`-style
/// placeholder -- every variant the catalog names is backed by a
/// real recurrence in `sweep::forward` / `sweep::reverse`.
pub trait Scalar:
    Clone
    + Copy
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + std::fmt::Debug
    + std::fmt::Display
{
    fn zero() -> Self;
    fn one() -> Self;
    fn nan() -> Self;
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;

    fn abs(self) -> Self;
    /// CppAD's `sign` convention: `-1`, `0`, or `1`; unlike
    /// `f64::signum` this returns exactly zero at zero.
    fn sign(self) -> Self;
    fn recip(self) -> Self { Self::one() / self }
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn asin(self) -> Self;
    fn acos(self) -> Self;
    fn atan(self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn asinh(self) -> Self;
    fn acosh(self) -> Self;
    fn atanh(self) -> Self;

    /// A hash-consing key that distinguishes `+0.0` from `-0.0` and
    /// distinguishes NaN bit patterns, per the parameter pool's
    /// bit-equality contract (§9 "Hash-consed parameter pool"). The raw
    /// bits of the value, widened to `f64` first so `f32` and `f64`
    /// share one key type; the widening never truncates a mantissa, so
    /// this is exact, not approximate.
    fn bit_key(self) -> u64;
}

macro_rules! impl_scalar_for_float { ($t:ty) => {
    impl Scalar for $t {
        fn zero() -> Self { 0 as $t }
        fn one()  -> Self { 1 as $t }
        fn nan()  -> Self { <$t>::NAN }
        fn from_f64(value: f64) -> Self { value as $t }
        fn to_f64(self) -> f64 { self as f64 }
        //
        fn abs(self)  -> Self { <$t>::abs(self) }
        fn sign(self) -> Self {
            if self > 0 as $t      { 1 as $t }
            else if self < 0 as $t { -1 as $t }
            else                   { 0 as $t }
        }
        fn sqrt(self)  -> Self { <$t>::sqrt(self) }
        fn exp(self)   -> Self { <$t>::exp(self) }
        fn ln(self)    -> Self { <$t>::ln(self) }
        fn sin(self)   -> Self { <$t>::sin(self) }
        fn cos(self)   -> Self { <$t>::cos(self) }
        fn tan(self)   -> Self { <$t>::tan(self) }
        fn asin(self)  -> Self { <$t>::asin(self) }
        fn acos(self)  -> Self { <$t>::acos(self) }
        fn atan(self)  -> Self { <$t>::atan(self) }
        fn sinh(self)  -> Self { <$t>::sinh(self) }
        fn cosh(self)  -> Self { <$t>::cosh(self) }
        fn tanh(self)  -> Self { <$t>::tanh(self) }
        fn asinh(self) -> Self { <$t>::asinh(self) }
        fn acosh(self) -> Self { <$t>::acosh(self) }
        fn atanh(self) -> Self { <$t>::atanh(self) }
        //
        fn bit_key(self) -> u64 { (self as f64).to_bits() }
    }
} }
impl_scalar_for_float!(f32);
impl_scalar_for_float!(f64);

// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors

//! An operator-overloading algorithmic differentiation engine.
//!
//! Recording: [independent](record::independent) opens a tape, ordinary
//! arithmetic on the resulting [AD] values appends to it, and
//! [ad_fun](function::ad_fun) closes it into a [function::AdFun] -- the
//! function object that owns the tape plus its Taylor-coefficient and
//! sparsity caches (§5 of the design notes). From there:
//!
//! * [function::AdFun::forward] / [function::AdFun::reverse] propagate
//!   Taylor coefficients and adjoints to arbitrary order.
//! * [function::AdFun::for_sparse_jac] / [function::AdFun::rev_sparse_jac] /
//!   [function::AdFun::rev_sparse_hes] propagate sparsity patterns
//!   through the same tape, via [sparsity::PackSetVec].
//! * [function::AdFun::sub_sparsity] answers structural
//!   dependency questions directly, without building a full pattern.
//!
//! # Example
//! ```
//! use tapead::record::independent;
//! use tapead::function::ad_fun;
//!
//! let ax = independent::<f64>(&[2.0, 3.0]);
//! let ay = vec![ax[0] * ax[1] + ax[0].sin()];
//! let mut f = ad_fun(&ay);
//! let y = f.forward(0, &[2.0, 3.0]);
//! assert!((y[0] - (2.0 * 3.0 + 2.0f64.sin())).abs() < 1e-12);
//! ```

pub mod ad;
pub mod atomic;
pub mod function;
pub mod index;
pub mod op;
pub mod param;
pub mod record;
pub mod scalar;
pub mod sparsity;
pub mod subgraph;
pub mod sweep;
pub mod tape;
pub mod taylor;
pub mod vecarray;

pub use ad::AD;
pub use function::{ad_fun, AdFun};
pub use record::independent;

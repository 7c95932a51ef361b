// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! Index types shared by the tape, recorder, and sweeps.
//!
//! Link to [parent module](super)

/// The integer type used for variable indices, parameter-pool indices,
/// and argument-slot offsets throughout a [crate::tape::Tape].
pub type IndexT = u32;

/// The variable index reserved for the `Begin` sentinel; see
/// [crate::op::OpId::Begin].
pub const BEGIN_VID: IndexT = 0;

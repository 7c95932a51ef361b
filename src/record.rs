// SPDX-License-Identifier: EPL-2.0 OR GPL-2.0-or-later
// SPDX-FileCopyrightText: tapead contributors
// SPDX-FileContributor: 2026 tapead contributors
//
//! The operation recorder: a thread-local recording window that turns
//! overloaded-scalar arithmetic into a [crate::tape::Tape].
//!
//! Link to [parent module](super)
//!
//! Recording state lives in thread-local storage, one instance per
//! scalar type `B`, behind the sealed [sealed::ThisThreadRecorder]
//! trait -- only this module may reach into the cell, which is how
//! the non-reentrance guard (§5 CONCURRENCY & RESOURCE MODEL) stays
//! enforceable from outside. A process-wide, mutex-guarded counter
//! hands out a fresh id to every recording so that an [crate::ad::AD]
//! value from one tape can never be mistaken for one from another.

use crate::atomic::AtomicFunction;
use crate::index::IndexT;
use crate::op::{ArgKind, OpId};
use crate::param::ParamPool;
use crate::scalar::Scalar;
use crate::tape::Tape;
use std::sync::Mutex;

static NEXT_TAPE_ID: Mutex<usize> = Mutex::new(0);

/// Per-thread, per-scalar-type recording state.
pub(crate) struct RecorderState<B> {
    pub recording: bool,
    pub tape_id: usize,
    pub ops: Vec<OpId>,
    pub op2arg: Vec<IndexT>,
    pub args: Vec<IndexT>,
    pub arg_type: Vec<ArgKind>,
    pub pars: ParamPool<B>,
    pub op2var: Vec<IndexT>,
    pub n_var: usize,
    pub ind_taddr: Vec<IndexT>,
    /// One entry per `Eq`/`Lt`/`Le` op actually recorded, in recording
    /// order: the comparison's result at record time, replayed against
    /// live values by the forward sweep to detect "compare changed"
    /// (§4.3 "Branch consistency").
    pub cmp_sign: Vec<bool>,
    /// Declaration-time values of every on-tape array; see
    /// [crate::tape::Tape::vec_init].
    pub vec_init: Vec<Vec<B>>,
    /// The array values as recording proceeds; `VecStore` mutates the
    /// entry addressed by its (then-current) index so that a later
    /// `VecLoad` on the same recording sees the store, mirroring
    /// ordinary array semantics during the recorded execution.
    pub vec_live: Vec<Vec<B>>,
    /// Registry of atomic functions named by `User` brackets; see
    /// [crate::tape::Tape::atomics].
    pub atomics: Vec<Box<dyn AtomicFunction<B>>>,
}

impl<B: Scalar> RecorderState<B> {
    fn new() -> Self {
        RecorderState {
            recording: false,
            tape_id: 0,
            ops: Vec::new(),
            op2arg: Vec::new(),
            args: Vec::new(),
            arg_type: Vec::new(),
            pars: ParamPool::new(),
            op2var: Vec::new(),
            n_var: 0,
            ind_taddr: Vec::new(),
            cmp_sign: Vec::new(),
            vec_init: Vec::new(),
            vec_live: Vec::new(),
            atomics: Vec::new(),
        }
    }
}

pub(crate) mod sealed {
    use super::RecorderState;

    /// Sealed: only types this crate instantiates the thread-local cell
    /// for may be recorded. See [super::impl_this_thread_recorder].
    pub trait ThisThreadRecorder: Sized + 'static {
        fn with_recorder<R>(f: impl FnOnce(&mut RecorderState<Self>) -> R) -> R;
    }
}
use sealed::ThisThreadRecorder;

macro_rules! impl_this_thread_recorder { ($t:ty) => {
    impl sealed::ThisThreadRecorder for $t {
        fn with_recorder<R>(f: impl FnOnce(&mut RecorderState<Self>) -> R) -> R {
            thread_local! {
                static RECORDER: std::cell::RefCell<RecorderState<$t>> =
                    std::cell::RefCell::new(RecorderState::new());
            }
            RECORDER.with(|cell| f(&mut cell.borrow_mut()))
        }
    }
} }
impl_this_thread_recorder!(f32);
impl_this_thread_recorder!(f64);

/// True if this thread currently has an open recording for `B`.
pub fn is_recording<B: Scalar + ThisThreadRecorder>() -> bool {
    B::with_recorder(|rec| rec.recording)
}

/// The tape id of this thread's open recording for `B`, if any.
pub(crate) fn current_tape_id<B: Scalar + ThisThreadRecorder>() -> Option<usize> {
    B::with_recorder(|rec| rec.recording.then_some(rec.tape_id))
}

/// Opens a recording window: asserts none is already active on this
/// thread, emits `Begin` followed by one `Inv` per element of `x`, and
/// returns the corresponding independent [crate::ad::AD] values.
pub fn independent<B>(x: &[B]) -> Vec<crate::ad::AD<B>>
where
    B: Scalar + ThisThreadRecorder,
{
    let tape_id = {
        let mut next = NEXT_TAPE_ID.lock().unwrap();
        *next += 1;
        *next
    };
    B::with_recorder(|rec| {
        assert!(
            !rec.recording,
            "independent: this thread's recording is already active"
        );
        rec.recording = true;
        rec.tape_id = tape_id;
        rec.ops.clear();
        rec.op2arg.clear();
        rec.args.clear();
        rec.arg_type.clear();
        rec.pars = ParamPool::new();
        rec.op2var.clear();
        rec.ind_taddr.clear();
        rec.cmp_sign.clear();
        rec.vec_init.clear();
        rec.vec_live.clear();
        rec.atomics.clear();
        //
        // Begin
        rec.op2arg.push(0);
        rec.ops.push(OpId::Begin);
        rec.op2var.push(0);
        rec.n_var = 1;
        //
        // Inv, one per independent
        let mut result = Vec::with_capacity(x.len());
        for &value in x {
            rec.op2arg.push(rec.args.len() as IndexT);
            let vid = rec.n_var as IndexT;
            rec.ops.push(OpId::Inv);
            rec.op2var.push(vid);
            rec.n_var += 1;
            rec.ind_taddr.push(vid);
            result.push(crate::ad::AD::variable(tape_id, vid, value));
        }
        result
    })
}

/// Closes the recording window opened by [independent], emits `End`,
/// and returns the finished, immutable [Tape].
pub fn stop<B>(dep: &[crate::ad::AD<B>]) -> Tape<B>
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| {
        assert!(rec.recording, "stop: no recording is active on this thread");
        //
        // End
        rec.op2arg.push(rec.args.len() as IndexT);
        rec.ops.push(OpId::End);
        rec.op2var.push(rec.n_var as IndexT);
        // final op2arg sentinel: one past the last op's start offset
        rec.op2arg.push(rec.args.len() as IndexT);
        //
        // dependent address list
        let mut dep_taddr = Vec::with_capacity(dep.len());
        let mut dep_is_parameter = Vec::with_capacity(dep.len());
        let mut dep_par_index = Vec::with_capacity(dep.len());
        for d in dep {
            match d.repr() {
                crate::ad::ADRepr::Variable { tape_id, vid, .. } => {
                    assert_eq!(
                        *tape_id, rec.tape_id,
                        "stop: a dependent belongs to a different thread's tape"
                    );
                    dep_taddr.push(*vid);
                    dep_is_parameter.push(false);
                    dep_par_index.push(0);
                }
                crate::ad::ADRepr::Constant(value) => {
                    let idx = rec.pars.get_or_insert(*value) as IndexT;
                    dep_taddr.push(0);
                    dep_is_parameter.push(true);
                    dep_par_index.push(idx);
                }
            }
        }
        //
        // var2op: built once, here, since the tape is immutable from here on
        let mut var2op = vec![0 as IndexT; rec.n_var];
        for (i, &op) in rec.ops.iter().enumerate() {
            let first = rec.op2var[i];
            for k in 0..op.n_res() {
                var2op[first as usize + k] = i as IndexT;
            }
        }
        //
        let tape = Tape {
            ops: std::mem::take(&mut rec.ops),
            op2arg: std::mem::take(&mut rec.op2arg),
            args: std::mem::take(&mut rec.args),
            arg_type: std::mem::take(&mut rec.arg_type),
            pars: std::mem::replace(&mut rec.pars, ParamPool::new()),
            op2var,
            var2op,
            n_var: rec.n_var,
            ind_taddr: std::mem::take(&mut rec.ind_taddr),
            dep_taddr,
            dep_is_parameter,
            dep_par_index,
            cmp_sign: std::mem::take(&mut rec.cmp_sign),
            vec_init: std::mem::take(&mut rec.vec_init),
            atomics: std::mem::take(&mut rec.atomics),
        };
        rec.vec_live.clear();
        debug_assert_eq!(
            tape.n_var,
            tape.ops.iter().map(|op| op.n_res()).sum::<usize>(),
            "stop: N_var invariant violated"
        );
        rec.recording = false;
        rec.n_var = 0;
        tape
    })
}

/// Appends one op and its argument slots to the active recording,
/// returning the op's first result variable index (or `n_var` if the
/// op allocates no result).
pub(crate) fn push_op<B>(op: OpId, args: &[(IndexT, ArgKind)]) -> IndexT
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| {
        assert!(rec.recording, "push_op: no recording is active on this thread");
        rec.op2arg.push(rec.args.len() as IndexT);
        for &(value, kind) in args {
            rec.args.push(value);
            rec.arg_type.push(kind);
        }
        let first_res = rec.n_var as IndexT;
        rec.ops.push(op);
        rec.op2var.push(first_res);
        rec.n_var += op.n_res();
        first_res
    })
}

/// Interns `value` in the active recording's parameter pool, returning
/// its (possibly pre-existing) pool index.
pub(crate) fn push_param<B>(value: B) -> IndexT
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| {
        assert!(
            rec.recording,
            "push_param: no recording is active on this thread"
        );
        rec.pars.get_or_insert(value) as IndexT
    })
}

/// Appends one recorded comparison outcome; see
/// [RecorderState::cmp_sign].
pub(crate) fn push_cmp_sign<B>(sign: bool)
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| rec.cmp_sign.push(sign));
}

/// Declares a new on-tape array with the given initial values, returning
/// its pool index (§3 "array-on-tape"); see [crate::vecarray].
pub(crate) fn push_array<B>(init: Vec<B>) -> IndexT
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| {
        assert!(rec.recording, "new_array: no recording is active on this thread");
        let id = rec.vec_init.len();
        rec.vec_live.push(init.clone());
        rec.vec_init.push(init);
        id as IndexT
    })
}

/// Reads the live (record-time) value at `array_id[slot]`.
pub(crate) fn read_array<B>(array_id: usize, slot: usize) -> B
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| rec.vec_live[array_id][slot])
}

/// Writes the live (record-time) value at `array_id[slot]`.
pub(crate) fn write_array<B>(array_id: usize, slot: usize, value: B)
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| rec.vec_live[array_id][slot] = value);
}

/// Registers an atomic function with the active recording, returning its
/// pool index; see [crate::atomic::AtomicFunction].
pub(crate) fn push_atomic<B>(atom: Box<dyn AtomicFunction<B>>) -> IndexT
where
    B: Scalar + ThisThreadRecorder,
{
    B::with_recorder(|rec| {
        assert!(rec.recording, "call_atomic: no recording is active on this thread");
        let id = rec.atomics.len();
        rec.atomics.push(atom);
        id as IndexT
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "already active")]
    fn nested_independent_panics() {
        let _ax = independent::<f64>(&[1.0]);
        let _ax2 = independent::<f64>(&[2.0]);
    }

    #[test]
    #[should_panic(expected = "no recording is active")]
    fn stop_without_independent_panics() {
        let ay: Vec<crate::ad::AD<f32>> = vec![crate::ad::AD::from(1.0f32)];
        let _ = stop(&ay);
    }
}

#![forbid(unsafe_code)]

//! Pure head protocol transaction logic.
//!
//! Constructors turn `(context, tracked UTxO, request)` into unbalanced
//! transactions; observers classify foreign transactions against the
//! tracked UTxO. Neither side performs I/O.

pub mod construct;
pub mod context;
pub mod datum;
pub mod observe;

pub use construct::{
    abort, close, collect, commit, contest, fanout, initialize, AbortError, CloseError,
    CollectError, CommitError, ContestError, FanoutError, InitializeError,
};
pub use context::ChainContext;
pub use datum::{CommitDatum, HeadDatum, HeadRedeemer, InitialDatum, OutputDatum, ScriptRegistry};
pub use observe::{convert_observation, observe_all, observe_tx, HeadObservation};

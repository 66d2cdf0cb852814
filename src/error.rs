//! Hard-failure error type. Structural problems (cycles, mismatched
//! read/write arrays, missing resources) are never an `Err` — they are
//! accumulated in `ValidationResult` and the pipeline keeps running.
//! `BuildError` exists for the one case that aborts `build()` outright.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("build() called without a preceding begin_graph()")]
    NoActiveGraph,
}

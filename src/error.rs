//! Error taxonomy (§7). User-input and protocol-level failures are
//! handled as `Option`/enum outcomes inside the FSM and never unwind a
//! task; only genuine local-resource failures (socket errors, I/O)
//! propagate as `anyhow::Error` out of an actor's future, exactly as the
//! teacher's benchmark runner treats transport failures.

use anyhow::Result;

/// Top-level outcome of running the engine to completion: either a clean
/// shutdown (normal END or SIGINT) or the first unrecoverable error from
/// any of the three actors.
pub type EngineResult = Result<()>;

/// Maps an `EngineResult` to the process exit code described in §6:
/// `0` for a clean shutdown, non-zero otherwise.
pub fn exit_code(result: &EngineResult) -> i32 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

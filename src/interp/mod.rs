// src/interp/mod.rs

//! Script interpreters.
//!
//! - [`lua`] is a single reusable interpreter context (one Lua state) and
//!   the host functions scripts use to emit records.
//! - [`pool`] bounds and recycles those contexts across sessions.

pub mod lua;
pub mod pool;

pub use lua::{LuaInterpreter, RecordSender, StopHandle, Stream, StreamRecord};
pub use pool::{InterpreterPool, PoolStatus, PooledInterpreter};

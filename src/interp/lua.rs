// src/interp/lua.rs

//! Embedded Lua interpreter context.
//!
//! One [`LuaInterpreter`] owns one Lua state. It is opened once, kept in the
//! pool and reused for many sessions; each run gets a fresh environment
//! table so script globals never leak into the next run.
//!
//! Scripts talk to the host through a handful of globals:
//!
//! | function                  | stream       |
//! |---------------------------|--------------|
//! | `write_output(value)`     | output       |
//! | `print(...)`              | output (tab-joined text) |
//! | `write_error(value)`      | error        |
//! | `write_warning(value)`    | warning      |
//! | `write_information(value)`| information  |
//!
//! plus `sleep(ms)`, which stays responsive to a host stop request.

use std::collections::HashSet;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mlua::{Function, HookTriggers, Lua, MultiValue, Table, Value as LuaValue, VmState};
use serde_json::{Map, Number, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::InterpreterError;
use crate::params::{ParamValue, ParameterCollection, names_match};

/// How many VM instructions run between two checks of the stop flag.
const STOP_CHECK_INSTRUCTIONS: u32 = 1_000;

/// Slice used by `sleep(ms)` between stop-flag checks.
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Records nested deeper than this are cut off (guards against cycles).
const MAX_RECORD_DEPTH: usize = 32;

const STOPPED_MESSAGE: &str = "execution stopped by host";

/// The four streams a script can write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Output,
    Error,
    Warning,
    Information,
}

/// One record as emitted by a script, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub stream: Stream,
    pub value: Value,
}

pub type RecordSender = mpsc::UnboundedSender<StreamRecord>;

/// Channel for the run in progress, stored as Lua app data.
struct ActiveStreams(RecordSender);

/// Force-stop switch for one interpreter.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Ask the interpreter to abandon its current run at the next check.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct LuaInterpreter {
    id: usize,
    lua: Lua,
    stop: StopHandle,
    runs: u64,
}

impl fmt::Debug for LuaInterpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaInterpreter")
            .field("id", &self.id)
            .field("runs", &self.runs)
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

impl LuaInterpreter {
    /// Create a Lua state with the host functions and the stop hook installed.
    pub fn open(id: usize) -> mlua::Result<Self> {
        let lua = Lua::new();
        let stop = StopHandle::default();

        register_host_functions(&lua, &stop)?;

        let flag = stop.clone();
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(STOP_CHECK_INSTRUCTIONS),
            move |_lua, _debug| {
                if flag.is_stopped() {
                    Err(mlua::Error::RuntimeError(STOPPED_MESSAGE.to_string()))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        debug!(interp = id, "lua interpreter opened");
        Ok(Self {
            id,
            lua,
            stop,
            runs: 0,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of scripts this interpreter has run.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Clear a stop request left over from a previous lease.
    pub(crate) fn reset_stop(&self) {
        self.stop.reset();
    }

    /// Run `source` to completion on the current thread.
    ///
    /// Every record the script writes is sent on `streams` immediately. The
    /// sender is dropped before this returns, so the receiving side sees the
    /// channel close once the run is over.
    pub fn execute(
        &mut self,
        script: &str,
        source: &str,
        params: &ParameterCollection,
        streams: RecordSender,
    ) -> Result<(), InterpreterError> {
        self.runs += 1;
        trace!(interp = self.id, script, run = self.runs, "executing chunk");

        let _ = self.lua.set_app_data(ActiveStreams(streams));
        let result = self.run_chunk(script, source, params);
        let _ = self.lua.remove_app_data::<ActiveStreams>();

        if self.stop.is_stopped() {
            return Err(InterpreterError::Stopped);
        }
        result.map_err(|e| InterpreterError::Script(describe_lua_error(&e)))
    }

    fn run_chunk(
        &self,
        script: &str,
        source: &str,
        params: &ParameterCollection,
    ) -> mlua::Result<()> {
        // Parameters are bound as globals of a fresh environment. Names that
        // miss fall through to a case-insensitive parameter lookup, then to
        // the shared globals (host functions and the standard library).
        let env = self.bound_table(params)?;
        env.set("params", self.params_table(params)?)?;
        let env_meta = self.lua.create_table()?;
        env_meta.set("__index", self.lookup_fn(params, true)?)?;
        env.set_metatable(Some(env_meta));

        self.lua
            .load(source)
            .set_name(format!("={script}"))
            .set_environment(env)
            .exec()
    }

    /// `params` table with case-insensitive field access.
    fn params_table(&self, params: &ParameterCollection) -> mlua::Result<Table> {
        let table = self.bound_table(params)?;
        let meta = self.lua.create_table()?;
        meta.set("__index", self.lookup_fn(params, false)?)?;
        table.set_metatable(Some(meta));
        Ok(table)
    }

    fn bound_table(&self, params: &ParameterCollection) -> mlua::Result<Table> {
        let table = self.lua.create_table()?;
        for (name, value) in first_occurrences(params) {
            table.set(name, param_to_lua(&self.lua, value)?)?;
        }
        Ok(table)
    }

    /// `__index` handler resolving a missing key against `params`, ignoring
    /// case, and optionally against the globals after that.
    fn lookup_fn(&self, params: &ParameterCollection, globals: bool) -> mlua::Result<Function> {
        let lookup = params.clone();
        self.lua
            .create_function(move |lua, (_table, key): (Table, LuaValue)| {
                if let LuaValue::String(name) = &key {
                    let name = name.to_string_lossy().to_string();
                    if let Some(value) = lookup.get(&name) {
                        return param_to_lua(lua, value);
                    }
                }
                if globals {
                    let value: LuaValue = lua.globals().get(key)?;
                    Ok(value)
                } else {
                    Ok(LuaValue::Nil)
                }
            })
    }
}

fn register_host_functions(lua: &Lua, stop: &StopHandle) -> mlua::Result<()> {
    let globals = lua.globals();

    for (name, stream) in [
        ("write_output", Stream::Output),
        ("write_error", Stream::Error),
        ("write_warning", Stream::Warning),
        ("write_information", Stream::Information),
    ] {
        let f = lua.create_function(move |lua, value: LuaValue| {
            emit(lua, stream, lua_to_json(&value))
        })?;
        globals.set(name, f)?;
    }

    let print = lua.create_function(|lua, args: MultiValue| {
        let line = args.iter().map(display).collect::<Vec<_>>().join("\t");
        emit(lua, Stream::Output, Value::String(line))
    })?;
    globals.set("print", print)?;

    let flag = stop.clone();
    let sleep = lua.create_function(move |_, ms: u64| {
        let deadline = Instant::now() + Duration::from_millis(ms);
        loop {
            if flag.is_stopped() {
                return Err(mlua::Error::RuntimeError(STOPPED_MESSAGE.to_string()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    })?;
    globals.set("sleep", sleep)?;

    Ok(())
}

fn emit(lua: &Lua, stream: Stream, value: Value) -> mlua::Result<()> {
    let Some(active) = lua.app_data_ref::<ActiveStreams>() else {
        return Err(mlua::Error::RuntimeError(
            "no session is attached to this interpreter".to_string(),
        ));
    };
    // A closed receiver means the session stopped listening (cancelled);
    // the stop flag ends the script shortly, so dropping the record is fine.
    let _ = active.0.send(StreamRecord { stream, value });
    Ok(())
}

/// Entries whose name does not repeat an earlier one, ignoring case; the
/// same value [`ParameterCollection::get`] would return for that name.
fn first_occurrences(params: &ParameterCollection) -> Vec<(&str, &ParamValue)> {
    let mut kept: Vec<(&str, &ParamValue)> = Vec::with_capacity(params.len());
    for (name, value) in params.iter() {
        if !kept.iter().any(|(seen, _)| names_match(seen, name)) {
            kept.push((name, value));
        }
    }
    kept
}

fn param_to_lua(lua: &Lua, value: &ParamValue) -> mlua::Result<LuaValue> {
    Ok(match value {
        ParamValue::Bool(b) => LuaValue::Boolean(*b),
        ParamValue::Int(n) => LuaValue::Integer(*n),
        ParamValue::String(s) => LuaValue::String(lua.create_string(s)?),
    })
}

/// Convert a Lua value into a JSON record.
///
/// Tables whose keys are exactly `1..=n` become arrays, other tables become
/// objects with stringified keys. Functions, userdata and threads become
/// their type name. A table nested inside itself becomes `"<cycle>"`.
pub fn lua_to_json(value: &LuaValue) -> Value {
    value_to_json(value, &mut HashSet::new())
}

/// `path` holds the tables currently being converted, outermost first.
fn value_to_json(value: &LuaValue, path: &mut HashSet<*const c_void>) -> Value {
    match value {
        LuaValue::Nil => Value::Null,
        LuaValue::Boolean(b) => Value::Bool(*b),
        LuaValue::Integer(n) => Value::Number(Number::from(*n)),
        LuaValue::Number(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        LuaValue::String(s) => Value::String(s.to_string_lossy().to_string()),
        LuaValue::Table(table) => {
            if path.len() > MAX_RECORD_DEPTH {
                return Value::String("<max depth>".to_string());
            }
            let ptr = table.to_pointer();
            if !path.insert(ptr) {
                return Value::String("<cycle>".to_string());
            }
            let json = table_to_json(table, path);
            path.remove(&ptr);
            json
        }
        other => Value::String(other.type_name().to_string()),
    }
}

fn table_to_json(table: &Table, path: &mut HashSet<*const c_void>) -> Value {
    let mut entries = Vec::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        match pair {
            Ok(kv) => entries.push(kv),
            Err(_) => continue,
        }
    }

    let len = table.raw_len();
    let is_array = len > 0
        && entries.len() == len
        && entries
            .iter()
            .all(|(k, _)| matches!(k, LuaValue::Integer(i) if *i >= 1 && (*i as usize) <= len));

    if is_array {
        let mut items = vec![Value::Null; len];
        for (k, v) in &entries {
            if let LuaValue::Integer(i) = k {
                items[(*i as usize) - 1] = value_to_json(v, path);
            }
        }
        return Value::Array(items);
    }

    let mut map = Map::new();
    for (k, v) in &entries {
        map.insert(display(k), value_to_json(v, path));
    }
    Value::Object(map)
}

/// `tostring`-like rendering used for `print` and object keys.
fn display(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(n) => n.to_string(),
        LuaValue::Number(f) => f.to_string(),
        LuaValue::String(s) => s.to_string_lossy().to_string(),
        other => other.type_name().to_string(),
    }
}

/// Flatten mlua's wrapped callback errors into the innermost message.
fn describe_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => describe_lua_error(cause),
        mlua::Error::RuntimeError(msg) | mlua::Error::SyntaxError { message: msg, .. } => {
            msg.clone()
        }
        other => other.to_string(),
    }
}

//! Embedded Lua for `execute_lua` and `execute_lua_file`.
//!
//! Every run gets a fresh sandboxed VM with a `reaper` table bound to the
//! session and a `log` table bridged to tracing. Runs are synchronous on the
//! host thread, so an instruction hook enforces a wall-clock limit.

use mlua::{HookTriggers, Lua, MultiValue, UserData, UserDataRef, Value as LuaValue, VmState};
use scytheproto::{Object, Value, MAX_DEPTH};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::c_void;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::session::{PlayState, Session};

/// Longest a script may hold the host thread.
pub const SCRIPT_TIME_LIMIT: Duration = Duration::from_secs(2);

/// Most memory a script's VM may allocate.
pub const SCRIPT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// How often the hook checks the clock.
const HOOK_INSTRUCTIONS: u32 = 10_000;

/// Most values a returned table may expand to.
const MAX_RESULT_NODES: usize = 100_000;

type SharedSession = Rc<RefCell<Session>>;

/// Successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    /// First return value, stringified; `None` when the script returned nothing/nil
    pub value: Option<String>,
    /// Everything written with `ShowConsoleMsg` or `print`
    pub console: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{message}")]
    Lua { message: String, console: String },

    #[error("Script exceeded the {}s time limit", .limit.as_secs())]
    Timeout { limit: Duration, console: String },
}

impl ScriptError {
    pub fn console(&self) -> &str {
        match self {
            ScriptError::Lua { console, .. } | ScriptError::Timeout { console, .. } => console,
        }
    }
}

impl From<mlua::Error> for ScriptError {
    fn from(e: mlua::Error) -> Self {
        ScriptError::Lua {
            message: describe_error(&e),
            console: String::new(),
        }
    }
}

/// Lends the session to Lua callbacks for one run and puts it back on drop,
/// including when a callback panics.
struct Lend<'a> {
    slot: &'a mut Session,
    shared: SharedSession,
}

impl<'a> Lend<'a> {
    fn new(slot: &'a mut Session) -> Self {
        let shared = Rc::new(RefCell::new(std::mem::take(slot)));
        Self { slot, shared }
    }

    fn shared(&self) -> &SharedSession {
        &self.shared
    }
}

impl Drop for Lend<'_> {
    fn drop(&mut self) {
        if let Ok(mut lent) = self.shared.try_borrow_mut() {
            *self.slot = std::mem::take(&mut *lent);
        }
    }
}

/// Run `source` against the session.
///
/// `params`, when given, is visible to the script as the global `params`.
pub fn run_script(
    session: &mut Session,
    source: &str,
    chunk_name: &str,
    params: Option<&Object>,
) -> Result<ScriptOutput, ScriptError> {
    let lend = Lend::new(session);
    let lua = create_sandboxed_lua(lend.shared())?;

    if let Some(params) = params {
        let table = value_to_lua(&lua, &Value::Object(params.clone()))?;
        lua.globals().set("params", table)?;
    }

    let started = Instant::now();
    let timed_out = Rc::new(Cell::new(false));
    let flag = timed_out.clone();
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTIONS),
        move |_lua, _debug| {
            if started.elapsed() > SCRIPT_TIME_LIMIT {
                flag.set(true);
                return Err(mlua::Error::runtime("time limit exceeded"));
            }
            Ok(VmState::Continue)
        },
    );

    let evaluated = lua.load(source).set_name(chunk_name).eval::<MultiValue>();
    let console = lend.shared().borrow_mut().take_console();

    let values = match evaluated {
        Ok(values) => values,
        Err(_) if timed_out.get() => {
            return Err(ScriptError::Timeout {
                limit: SCRIPT_TIME_LIMIT,
                console,
            })
        }
        Err(e) => {
            return Err(ScriptError::Lua {
                message: describe_error(&e),
                console,
            })
        }
    };

    let value = match values.into_iter().next() {
        None | Some(LuaValue::Nil) => None,
        Some(first) => match stringify(&lua, &first, started) {
            Ok(text) => Some(text),
            Err(_) if started.elapsed() > SCRIPT_TIME_LIMIT => {
                return Err(ScriptError::Timeout {
                    limit: SCRIPT_TIME_LIMIT,
                    console,
                })
            }
            Err(e) => {
                return Err(ScriptError::Lua {
                    message: describe_error(&e),
                    console,
                })
            }
        },
    };

    Ok(ScriptOutput { value, console })
}

/// Create a sandboxed Lua VM with restricted globals and the host API.
fn create_sandboxed_lua(session: &SharedSession) -> mlua::Result<Lua> {
    let lua = Lua::new();

    register_stdlib(&lua, session)?;
    remove_dangerous_globals(&lua)?;
    register_reaper_api(&lua, session)?;
    lua.set_memory_limit(SCRIPT_MEMORY_LIMIT)?;

    Ok(lua)
}

/// `log.*` goes to tracing; `print` goes to the host console.
fn register_stdlib(lua: &Lua, session: &SharedSession) -> mlua::Result<()> {
    let globals = lua.globals();

    let log_table = lua.create_table()?;
    log_table.set(
        "info",
        lua.create_function(|_, msg: String| {
            tracing::info!(target: "scythe.script", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "warn",
        lua.create_function(|_, msg: String| {
            tracing::warn!(target: "scythe.script", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "error",
        lua.create_function(|_, msg: String| {
            tracing::error!(target: "scythe.script", "{}", msg);
            Ok(())
        })?,
    )?;
    log_table.set(
        "debug",
        lua.create_function(|_, msg: String| {
            tracing::debug!(target: "scythe.script", "{}", msg);
            Ok(())
        })?,
    )?;
    globals.set("log", log_table)?;

    let s = session.clone();
    let print = lua.create_function(move |lua, args: MultiValue| {
        let mut line = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            line.push_str(&display(lua, arg));
        }
        line.push('\n');
        s.borrow_mut().show_console_msg(&line);
        Ok(())
    })?;
    globals.set("print", print)?;

    Ok(())
}

/// Remove globals that reach the filesystem or the process.
fn remove_dangerous_globals(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set("dofile", LuaValue::Nil)?;
    globals.set("loadfile", LuaValue::Nil)?;
    globals.set("require", LuaValue::Nil)?;
    globals.set("package", LuaValue::Nil)?;

    let os_table: mlua::Table = globals.get("os")?;
    for name in ["execute", "exit", "remove", "rename", "setenv", "setlocale", "tmpname", "getenv"] {
        os_table.set(name, LuaValue::Nil)?;
    }
    // Keep: os.clock, os.date, os.difftime, os.time

    globals.set("debug", LuaValue::Nil)?;
    globals.set("io", LuaValue::Nil)?;

    Ok(())
}

/// Opaque `MediaTrack*` stand-in. Holds the track's stable id.
#[derive(Debug, Clone, Copy)]
struct TrackHandle(u64);

impl UserData for TrackHandle {}

fn resolve(session: &Session, track: &TrackHandle) -> mlua::Result<usize> {
    session
        .track_index_by_id(track.0)
        .ok_or_else(|| mlua::Error::runtime("invalid MediaTrack (deleted?)"))
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

fn register_reaper_api(lua: &Lua, session: &SharedSession) -> mlua::Result<()> {
    let reaper = lua.create_table()?;

    let s = session.clone();
    reaper.set(
        "CountTracks",
        lua.create_function(move |_, _proj: LuaValue| Ok(s.borrow().track_count()))?,
    )?;

    let s = session.clone();
    reaper.set(
        "GetTrack",
        lua.create_function(move |_, (_proj, index): (LuaValue, i64)| {
            let session = s.borrow();
            let track = usize::try_from(index)
                .ok()
                .and_then(|i| session.track(i))
                .map(|t| TrackHandle(t.id));
            Ok(track)
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "InsertTrackAtIndex",
        lua.create_function(move |_, (index, _want_defaults): (i64, Option<bool>)| {
            let index = usize::try_from(index).unwrap_or(0);
            s.borrow_mut().insert_track(Some(index), "");
            Ok(())
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "GetTrackName",
        lua.create_function(move |_, track: UserDataRef<TrackHandle>| {
            let session = s.borrow();
            let index = resolve(&session, &track)?;
            let name = session.track(index).map(|t| t.name.clone()).unwrap_or_default();
            Ok((true, name))
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "SetTrackName",
        lua.create_function(move |_, (track, name): (UserDataRef<TrackHandle>, String)| {
            let mut session = s.borrow_mut();
            let index = resolve(&session, &track)?;
            if let Some(t) = session.edit_track(index, "rename") {
                t.name = name;
            }
            Ok(true)
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "GetMediaTrackInfo_Value",
        lua.create_function(move |_, (track, parm): (UserDataRef<TrackHandle>, String)| {
            let session = s.borrow();
            let index = resolve(&session, &track)?;
            let Some(t) = session.track(index) else {
                return Ok(0.0);
            };
            let value = match parm.as_str() {
                "D_VOL" => t.volume,
                "D_PAN" => t.pan,
                "B_MUTE" => flag(t.muted),
                "I_SOLO" => flag(t.solo),
                "I_RECARM" => flag(t.armed),
                "I_SELECTED" => flag(t.selected),
                "IP_TRACKNUMBER" => (index + 1) as f64,
                _ => 0.0,
            };
            Ok(value)
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "SetMediaTrackInfo_Value",
        lua.create_function(
            move |_, (track, parm, value): (UserDataRef<TrackHandle>, String, f64)| {
                let mut session = s.borrow_mut();
                let index = resolve(&session, &track)?;
                let known = matches!(
                    parm.as_str(),
                    "D_VOL" | "D_PAN" | "B_MUTE" | "I_SOLO" | "I_RECARM" | "I_SELECTED"
                );
                if !known || !value.is_finite() {
                    return Ok(false);
                }
                let Some(t) = session.edit_track(index, &format!("{} = {}", parm, value)) else {
                    return Ok(false);
                };
                match parm.as_str() {
                    "D_VOL" => t.volume = value.clamp(0.0, 4.0),
                    "D_PAN" => t.pan = value.clamp(-1.0, 1.0),
                    "B_MUTE" => t.muted = value != 0.0,
                    "I_SOLO" => t.solo = value != 0.0,
                    "I_RECARM" => t.armed = value != 0.0,
                    _ => t.selected = value != 0.0,
                }
                Ok(true)
            },
        )?,
    )?;

    let s = session.clone();
    reaper.set(
        "Master_GetTempo",
        lua.create_function(move |_, ()| Ok(s.borrow().tempo()))?,
    )?;

    let s = session.clone();
    reaper.set(
        "SetCurrentBPM",
        lua.create_function(move |_, (_proj, bpm, _want_undo): (LuaValue, f64, Option<bool>)| {
            if !(20.0..=999.0).contains(&bpm) {
                return Err(mlua::Error::runtime(format!("bpm out of range: {}", bpm)));
            }
            s.borrow_mut().set_tempo(bpm);
            Ok(())
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "OnPlayButton",
        lua.create_function(move |_, ()| {
            s.borrow_mut().set_play_state(PlayState::Playing);
            Ok(())
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "OnStopButton",
        lua.create_function(move |_, ()| {
            s.borrow_mut().set_play_state(PlayState::Stopped);
            Ok(())
        })?,
    )?;

    let s = session.clone();
    reaper.set(
        "GetCursorPosition",
        lua.create_function(move |_, ()| Ok(s.borrow().cursor()))?,
    )?;

    let s = session.clone();
    reaper.set(
        "SetEditCurPos",
        lua.create_function(
            move |_, (time, _move_view, _seek_play): (f64, Option<bool>, Option<bool>)| {
                s.borrow_mut().set_cursor(time);
                Ok(())
            },
        )?,
    )?;

    let s = session.clone();
    reaper.set(
        "ShowConsoleMsg",
        lua.create_function(move |_, msg: String| {
            s.borrow_mut().show_console_msg(&msg);
            Ok(())
        })?,
    )?;

    reaper.set("UpdateArrange", lua.create_function(|_, ()| Ok(()))?)?;

    lua.globals().set("reaper", reaper)
}

/// `tostring`-like rendering for console output.
fn display(lua: &Lua, value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => number_text(lua, *n),
        LuaValue::String(s) => s.to_string_lossy().to_string(),
        other => other.type_name().to_string(),
    }
}

/// Lua's own float formatting (`3.0`, `1e+100`).
fn number_text(lua: &Lua, n: f64) -> String {
    match lua.coerce_string(LuaValue::Number(n)) {
        Ok(Some(s)) => s.to_string_lossy().to_string(),
        _ => n.to_string(),
    }
}

/// Render a script's return value as the Response `result`.
///
/// Scalars render as text; tables are encoded with the wire codec.
fn stringify(lua: &Lua, value: &LuaValue, started: Instant) -> mlua::Result<String> {
    match value {
        LuaValue::Table(_) => {
            let mut walk = TableWalk::new(lua, started);
            Ok(walk.convert(value, 0)?.to_string())
        }
        other => Ok(display(lua, other)),
    }
}

/// Convert a wire value to a Lua value.
fn value_to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
    match value {
        Value::Null => Ok(LuaValue::Nil),
        Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Value::Number(n) => match value.as_i64() {
            Some(i) => Ok(LuaValue::Integer(i)),
            None => Ok(LuaValue::Number(*n)),
        },
        Value::String(s) => Ok(LuaValue::String(lua.create_string(s)?)),
        Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, v) in items.iter().enumerate() {
                table.set(i + 1, value_to_lua(lua, v)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        Value::Object(map) => {
            let table = lua.create_table()?;
            for (k, v) in map {
                table.set(k.as_str(), value_to_lua(lua, v)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

/// Converts a returned Lua value to a wire value.
///
/// A table already on the current path renders as `"[cycle]"`, and tables
/// past the codec's depth limit as `"[table]"`. Shared subtables are walked
/// each time they appear, so the total is capped by [`MAX_RESULT_NODES`] and
/// by the script's time limit.
struct TableWalk<'a> {
    lua: &'a Lua,
    started: Instant,
    path: HashSet<*const c_void>,
    nodes: usize,
}

impl<'a> TableWalk<'a> {
    fn new(lua: &'a Lua, started: Instant) -> Self {
        Self {
            lua,
            started,
            path: HashSet::new(),
            nodes: 0,
        }
    }

    fn count_node(&mut self) -> mlua::Result<()> {
        self.nodes += 1;
        if self.nodes > MAX_RESULT_NODES {
            return Err(mlua::Error::runtime("script result too large"));
        }
        if self.nodes % 1024 == 0 && self.started.elapsed() > SCRIPT_TIME_LIMIT {
            return Err(mlua::Error::runtime("time limit exceeded"));
        }
        Ok(())
    }

    fn convert(&mut self, lua_val: &LuaValue, depth: usize) -> mlua::Result<Value> {
        self.count_node()?;
        match lua_val {
            LuaValue::Nil => Ok(Value::Null),
            LuaValue::Boolean(b) => Ok(Value::Bool(*b)),
            LuaValue::Integer(i) => Ok(Value::Number(*i as f64)),
            LuaValue::Number(n) => Ok(Value::Number(*n)),
            LuaValue::String(s) => Ok(Value::String(s.to_string_lossy().to_string())),
            LuaValue::Table(_) if depth >= MAX_DEPTH => Ok(Value::String("[table]".to_string())),
            LuaValue::Table(table) => {
                let ptr = table.to_pointer();
                if !self.path.insert(ptr) {
                    return Ok(Value::String("[cycle]".to_string()));
                }
                let converted = self.convert_table(table, depth);
                self.path.remove(&ptr);
                converted
            }
            other => Ok(Value::String(format!("[{}]", other.type_name()))),
        }
    }

    fn convert_table(&mut self, table: &mlua::Table, depth: usize) -> mlua::Result<Value> {
        let len = table.raw_len();
        if len > 0 {
            let mut arr = Vec::with_capacity(len.min(MAX_RESULT_NODES));
            for i in 1..=len {
                let v: LuaValue = table.raw_get(i)?;
                arr.push(self.convert(&v, depth + 1)?);
            }
            return Ok(Value::Array(arr));
        }

        let mut obj = Object::new();
        for pair in table.clone().pairs::<LuaValue, LuaValue>() {
            let (k, v) = pair?;
            let key = match k {
                LuaValue::String(s) => s.to_string_lossy().to_string(),
                LuaValue::Integer(i) => i.to_string(),
                LuaValue::Number(n) => number_text(self.lua, n),
                _ => continue,
            };
            obj.insert(key, self.convert(&v, depth + 1)?);
        }
        Ok(Value::Object(obj))
    }
}

/// One-line description of a Lua failure, without the traceback.
pub fn describe_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => {
            format!("Lua syntax error: {}", clean_error_message(message))
        }
        mlua::Error::RuntimeError(message) => {
            format!("Lua error: {}", clean_error_message(message))
        }
        mlua::Error::CallbackError { cause, .. } => describe_error(cause),
        other => format!("Lua error: {}", clean_error_message(&other.to_string())),
    }
}

/// First meaningful line, minus the `[string "chunk"]:N: ` prefix.
fn clean_error_message(error_string: &str) -> String {
    let mut message = error_string
        .lines()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("stack traceback")
        })
        .unwrap_or(error_string)
        .to_string();

    if message.starts_with('[') {
        if let Some(idx) = message.find("]:") {
            let after_bracket = &message[idx + 2..];
            if let Some(colon_idx) = after_bracket.find(": ") {
                message = after_bracket[colon_idx + 2..].to_string();
            }
        }
    }

    message.trim().to_string()
}

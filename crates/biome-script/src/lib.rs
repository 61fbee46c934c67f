use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rhai::packages::{
    BasicArrayPackage, BasicMapPackage, BasicMathPackage, CorePackage, MoreStringPackage, Package,
};
use rhai::{Engine, EvalAltResult};

/// Fixed helper functions prepended to every generated script.
///
/// These are the only terrain-facing capabilities the script is promised:
/// `block_record` encodes one block as a JSON object string and `emit_blocks`
/// joins records into a JSON array and hands it to the capture channel.
pub const PRELUDE: &str = r#"
fn block_record(x, y, z, id) {
    `{"x":${x},"y":${y},"z":${z},"block":"${id}"}`
}

fn emit_blocks(records) {
    let out = "[";
    for (record, i) in records {
        if i > 0 { out += ","; }
        out += record;
    }
    out += "]";
    emit(out);
}
"#;

/// Resource ceilings for one script run.
///
/// Generated code is untrusted and may loop forever; both an operation count
/// and a wall-clock deadline bound each run.
#[derive(Debug, Clone, Copy)]
pub struct ExecLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub wall_clock: Duration,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            max_operations: 25_000_000,
            max_call_levels: 64,
            wall_clock: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// The script raised or failed to compile.
    Runtime(String),
    /// The script hit the operation or wall-clock ceiling.
    LimitExceeded(String),
    /// The script completed without emitting a result.
    NoOutput,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Runtime(message) => write!(f, "script failed: {message}"),
            ScriptError::LimitExceeded(message) => {
                write!(f, "script exceeded execution limits: {message}")
            }
            ScriptError::NoOutput => f.write_str("script produced no result"),
        }
    }
}

impl std::error::Error for ScriptError {}

/// Runs a generated script body under the sandbox and returns the single
/// value it emitted.
///
/// The body is appended to [`PRELUDE`] and evaluated in a fresh engine built
/// from an explicit package allowlist: core language (including range
/// iteration), arrays, maps, math and strings. No filesystem, network,
/// process or time access is registered.
/// The first non-empty string passed to `emit` is captured; later calls are
/// ignored. Completing without a captured value is an error, not an empty
/// success.
pub fn run_script(body: &str, limits: &ExecLimits) -> Result<String, ScriptError> {
    let captured: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

    let mut engine = sandbox_engine(limits);
    let sink = Rc::clone(&captured);
    engine.register_fn("emit", move |text: &str| {
        let mut slot = sink.borrow_mut();
        if slot.is_none() && !text.is_empty() {
            *slot = Some(text.to_string());
        }
    });

    let program = format!("{PRELUDE}\n{body}");
    engine.run(&program).map_err(map_eval_error)?;

    let mut slot = captured.borrow_mut();
    slot.take().ok_or(ScriptError::NoOutput)
}

fn sandbox_engine(limits: &ExecLimits) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(CorePackage::new().as_shared_module());
    engine.register_global_module(BasicArrayPackage::new().as_shared_module());
    engine.register_global_module(BasicMapPackage::new().as_shared_module());
    engine.register_global_module(BasicMathPackage::new().as_shared_module());
    engine.register_global_module(MoreStringPackage::new().as_shared_module());

    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);

    let deadline = Instant::now() + limits.wall_clock;
    engine.on_progress(move |_| {
        if Instant::now() >= deadline {
            Some("wall-clock budget exceeded".into())
        } else {
            None
        }
    });

    engine
}

fn map_eval_error(err: Box<EvalAltResult>) -> ScriptError {
    match *err {
        EvalAltResult::ErrorTooManyOperations(_) => {
            ScriptError::LimitExceeded("operation ceiling reached".to_string())
        }
        EvalAltResult::ErrorTerminated(token, _) => ScriptError::LimitExceeded(token.to_string()),
        other => ScriptError::Runtime(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ExecLimits, ScriptError, run_script};

    fn limits() -> ExecLimits {
        ExecLimits::default()
    }

    #[test]
    fn captures_emitted_value() {
        let out = run_script(r#"emit("[1,2,3]");"#, &limits()).expect("emit should be captured");
        assert_eq!(out, "[1,2,3]");
    }

    #[test]
    fn first_emit_wins() {
        let out = run_script(r#"emit("first"); emit("second");"#, &limits())
            .expect("first emit should be captured");
        assert_eq!(out, "first");
    }

    #[test]
    fn empty_emit_does_not_count_as_capture() {
        let err = run_script(r#"emit("");"#, &limits()).expect_err("empty emit is no result");
        assert_eq!(err, ScriptError::NoOutput);
    }

    #[test]
    fn completing_without_emit_is_an_error() {
        let err = run_script("let x = 1 + 1;", &limits()).expect_err("no emit should fail");
        assert_eq!(err, ScriptError::NoOutput);
    }

    #[test]
    fn runtime_errors_are_reported() {
        let err = run_script("undefined_function();", &limits()).expect_err("should fail");
        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn runaway_loop_hits_operation_ceiling() {
        let tight = ExecLimits {
            max_operations: 10_000,
            ..ExecLimits::default()
        };
        let err = run_script("loop { }", &tight).expect_err("infinite loop should be stopped");
        assert!(matches!(err, ScriptError::LimitExceeded(_)));
    }

    #[test]
    fn wall_clock_deadline_stops_execution() {
        let tight = ExecLimits {
            max_operations: u64::MAX,
            wall_clock: Duration::from_millis(50),
            ..ExecLimits::default()
        };
        let err = run_script("loop { }", &tight).expect_err("deadline should stop the loop");
        assert!(matches!(err, ScriptError::LimitExceeded(_)));
    }

    #[test]
    fn range_iteration_is_available() {
        let body = r#"
            let total = 0;
            for i in 0..5 { total += i; }
            emit(total.to_string());
        "#;
        let out = run_script(body, &limits()).expect("range loop should run");
        assert_eq!(out, "10");
    }

    #[test]
    fn prelude_helpers_build_a_json_array() {
        let body = r#"
            let records = [];
            records.push(block_record(0, 65, 0, "minecraft:blackstone"));
            records.push(block_record(1, 65, 0, "minecraft:basalt"));
            emit_blocks(records);
        "#;
        let out = run_script(body, &limits()).expect("prelude helpers should emit");
        assert_eq!(
            out,
            r#"[{"x":0,"y":65,"z":0,"block":"minecraft:blackstone"},{"x":1,"y":65,"z":0,"block":"minecraft:basalt"}]"#
        );
    }

    #[test]
    fn identical_source_is_deterministic() {
        let body = r#"
            let records = [];
            for z in 0..4 {
                for x in 0..4 {
                    let y = 60 + (x * 7 + z * 13) % 20;
                    records.push(block_record(x, y, z, "minecraft:stone"));
                }
            }
            emit_blocks(records);
        "#;
        let first = run_script(body, &limits()).expect("first run should succeed");
        let second = run_script(body, &limits()).expect("second run should succeed");
        assert_eq!(first, second);
    }
}

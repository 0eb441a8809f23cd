use std::{cell::RefCell, ffi::OsStr};

/// Instruction budget for `run` when neither `--max-steps` nor `MANO_MAX_STEPS` is given.
pub const DEFAULT_MAX_STEPS: u64 = 100_000;

#[derive(Clone, Copy)]
struct Env {
    max_steps: u64,
    trace: bool,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        max_steps: var_parse("MANO_MAX_STEPS").unwrap_or(DEFAULT_MAX_STEPS),
        trace: var_is("MANO_TRACE", "1"),
    };
    set_env(value);
}

pub fn max_steps() -> u64 {
    with_env(|env| env.max_steps)
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| &v == value.as_ref())
}

/// Unset or unparsable values are ignored.
fn var_parse<T: std::str::FromStr>(name: impl AsRef<OsStr>) -> Option<T> {
    std::env::var(name.as_ref()).ok()?.trim().parse().ok()
}

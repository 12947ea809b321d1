//! Call/return interception for instrumented library entry points.
//!
//! Engines wrap each public entry point in [`traced`] (or [`traced_native`]).
//! When a hook is installed on the current thread, it sees a call event
//! before the body runs and a return event with the produced value afterwards.
//! Without a hook the wrappers only run the body.

use crate::capture::Capture;
use crate::errors::BearcatError;
use crate::types::Boundary;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Source location of an instrumented entry point. Build it with
/// [`call_frame!`](crate::call_frame) so `file` and `line` point at the
/// defining module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
}

impl CallFrame {
    pub const fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self {
            file,
            line,
            function,
        }
    }
}

#[macro_export]
macro_rules! call_frame {
    ($function:expr) => {
        $crate::trace::CallFrame::new(file!(), line!(), $function)
    };
}

pub trait TraceHook {
    fn on_call(&self, frame: &CallFrame, boundary: Boundary);

    /// `value` is `None` when the body failed.
    fn on_return(
        &self,
        frame: &CallFrame,
        boundary: Boundary,
        value: Option<&dyn Capture>,
    ) -> Result<(), BearcatError>;

    /// The body panicked; the frame is leaving without a return event.
    fn on_unwind(&self, frame: &CallFrame);
}

thread_local! {
    static ACTIVE_HOOK: RefCell<Option<Rc<dyn TraceHook>>> = const { RefCell::new(None) };
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Install `hook` for the rest of this thread's life, replacing any earlier one.
pub fn install_hook(hook: Rc<dyn TraceHook>) {
    ACTIVE_HOOK.with(|slot| *slot.borrow_mut() = Some(hook));
}

pub fn hook_installed() -> bool {
    ACTIVE_HOOK.with(|slot| slot.borrow().is_some())
}

fn current_hook() -> Option<Rc<dyn TraceHook>> {
    if IN_HOOK.with(Cell::get) {
        return None;
    }
    ACTIVE_HOOK.with(|slot| slot.borrow().clone())
}

fn inside_hook<R>(f: impl FnOnce() -> R) -> R {
    let previous = IN_HOOK.with(|flag| flag.replace(true));
    let out = f();
    IN_HOOK.with(|flag| flag.set(previous));
    out
}

struct UnwindGuard<'a> {
    hook: &'a dyn TraceHook,
    frame: &'a CallFrame,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            inside_hook(|| self.hook.on_unwind(self.frame));
        }
    }
}

/// Run `body` as an instrumented library entry point.
pub fn traced<T: Capture>(
    frame: CallFrame,
    body: impl FnOnce() -> Result<T, BearcatError>,
) -> Result<T, BearcatError> {
    dispatch(frame, Boundary::Rust, body)
}

/// Like [`traced`], for entry points that hand off to a native kernel.
pub fn traced_native<T: Capture>(
    frame: CallFrame,
    body: impl FnOnce() -> Result<T, BearcatError>,
) -> Result<T, BearcatError> {
    dispatch(frame, Boundary::Native, body)
}

fn dispatch<T: Capture>(
    frame: CallFrame,
    boundary: Boundary,
    body: impl FnOnce() -> Result<T, BearcatError>,
) -> Result<T, BearcatError> {
    let Some(hook) = current_hook() else {
        return body();
    };
    inside_hook(|| hook.on_call(&frame, boundary));

    let mut guard = UnwindGuard {
        hook: hook.as_ref(),
        frame: &frame,
        armed: true,
    };
    let result = body();
    guard.armed = false;
    drop(guard);

    let value = result.as_ref().ok().map(|v| v as &dyn Capture);
    inside_hook(|| hook.on_return(&frame, boundary, value))?;
    result
}

use crate::capture::{Capture, Conversion};
use crate::classifier::{CallStack, Classifier, LibraryDirs, Verdict};
use crate::config::AppConfig;
use crate::engines::{package_for, Package};
use crate::errors::BearcatError;
use crate::logging::append_run_log;
use crate::replay::recording::{records_file_name, CallSiteRecord, RecordEntry, RecordWriter};
use crate::trace::{install_hook, CallFrame, TraceHook};
use crate::types::{Boundary, EngineKind};
use crate::value::RecordedValue;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Trace hook that writes top-level library returns to a log. The hook slot,
/// call stack and writer all belong to the thread that started it.
pub struct Recorder {
    package: Package,
    path: PathBuf,
    classifier: Classifier,
    conversion: Conversion,
    stack: RefCell<CallStack>,
    writer: RefCell<RecordWriter>,
    next_seq: Cell<u64>,
}

impl Recorder {
    /// Resolve the library directories and open `bearcat-<package>.records`
    /// in the configured output directory.
    pub fn open(cfg: &AppConfig, package: &Package) -> Result<Rc<Self>, BearcatError> {
        let reference = package_for(EngineKind::REFERENCE)?;
        let library = LibraryDirs::for_package(package, &reference);
        let classifier = Classifier::new(
            library,
            cfg.classifier.attribute_hooks.iter().cloned(),
            cfg.recorder.record_native_returns,
        );
        let path = cfg
            .recorder
            .output_dir
            .join(records_file_name(package.name()));
        let writer = RecordWriter::open(&path)?;

        append_run_log(
            "info",
            "recorder.opened",
            json!({
                "package": package.name(),
                "path": path.display().to_string(),
                "library_dirs": classifier
                    .library()
                    .dirs()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>(),
                "record_native_returns": cfg.recorder.record_native_returns,
            }),
        );

        Ok(Rc::new(Self {
            package: package.clone(),
            path,
            classifier,
            conversion: Conversion::for_engine(package.kind),
            stack: RefCell::new(CallStack::default()),
            writer: RefCell::new(writer),
            next_seq: Cell::new(0),
        }))
    }

    /// Install this recorder as the current thread's trace hook. There is
    /// no uninstall; the hook stays for the rest of the thread's life.
    pub fn start(self: &Rc<Self>) {
        install_hook(self.clone());
        append_run_log(
            "info",
            "recorder.started",
            json!({
                "package": self.package.name(),
                "thread": format!("{:?}", std::thread::current().id()),
            }),
        );
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.next_seq.get()
    }

    fn record(&self, frame: &CallFrame, value: Option<&dyn Capture>) -> Result<(), BearcatError> {
        let value = match value {
            Some(value) => self.conversion.apply(value.capture())?,
            None => RecordedValue::Null,
        };
        let seq = self.next_seq.get();
        let type_name = value.type_name();
        let entry = RecordEntry {
            seq,
            call: CallSiteRecord::from(frame),
            value,
        };
        self.writer.borrow_mut().append(&entry)?;
        self.next_seq.set(seq + 1);

        append_run_log(
            "debug",
            "recorder.record.written",
            json!({
                "seq": seq,
                "function": frame.function,
                "file": frame.file,
                "line": frame.line,
                "value_type": type_name,
            }),
        );
        Ok(())
    }
}

impl TraceHook for Recorder {
    fn on_call(&self, frame: &CallFrame, boundary: Boundary) {
        self.classifier
            .enter(&mut self.stack.borrow_mut(), frame, boundary);
    }

    fn on_return(
        &self,
        frame: &CallFrame,
        _boundary: Boundary,
        value: Option<&dyn Capture>,
    ) -> Result<(), BearcatError> {
        let verdict = self.classifier.leave(&mut self.stack.borrow_mut());
        match verdict {
            Verdict::Record => self.record(frame, value),
            Verdict::Outside => Ok(()),
            skipped => {
                append_run_log(
                    "debug",
                    "classifier.skipped",
                    json!({
                        "function": frame.function,
                        "file": frame.file,
                        "verdict": format!("{skipped:?}"),
                    }),
                );
                Ok(())
            }
        }
    }

    fn on_unwind(&self, frame: &CallFrame) {
        self.stack.borrow_mut().pop();
        append_run_log(
            "warn",
            "recorder.call.unwound",
            json!({ "function": frame.function, "file": frame.file }),
        );
    }
}

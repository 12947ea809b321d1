//! Call-boundary classification: which returns are top-level library calls.
//!
//! A frame is *in the library* when its source file sits under one of the
//! library directories. A library frame is *top-level* when no enclosing frame
//! on the current call stack is also in the library. Only top-level frames
//! are recorded, and attribute-lookup hooks never are.

use crate::engines::Package;
use crate::trace::CallFrame;
use crate::types::Boundary;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Directories whose source files count as library internals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryDirs {
    dirs: BTreeSet<PathBuf>,
}

impl LibraryDirs {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs
                .into_iter()
                .map(|dir| normalize_lexically(&dir))
                .collect(),
        }
    }

    /// The wrapped package's directory, plus the reference package's when
    /// the wrapped one is an alternative engine.
    pub fn for_package(wrapped: &Package, reference: &Package) -> Self {
        let mut dirs = vec![wrapped.install_dir.clone()];
        if wrapped.install_dir != reference.install_dir {
            dirs.push(reference.install_dir.clone());
        }
        Self::new(dirs)
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    pub fn contains_file(&self, file: &str) -> bool {
        let path = normalize_lexically(Path::new(file));
        let Some(parent) = path.parent() else {
            return false;
        };
        parent.ancestors().any(|dir| self.dirs.contains(dir))
    }
}

/// Resolve `.` and `..` without touching the file system; `file!()` paths
/// need not exist at run time.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Record,
    /// Caller code, not part of the tracked library.
    Outside,
    /// A library call made from inside another library call.
    Nested,
    AttributeHook,
    /// Native boundary whose return is not recorded.
    NativeBoundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEntry {
    pub frame: CallFrame,
    pub in_library: bool,
    pub boundary: Boundary,
}

/// Per-thread stack of open instrumented frames.
///
/// `library_depth` counts open library frames, so "has a library ancestor"
/// is a counter check instead of a walk to the root.
#[derive(Debug, Default)]
pub struct CallStack {
    entries: Vec<StackEntry>,
    library_depth: usize,
}

impl CallStack {
    pub fn push(&mut self, entry: StackEntry) {
        if entry.in_library {
            self.library_depth += 1;
        }
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<StackEntry> {
        let entry = self.entries.pop()?;
        if entry.in_library {
            self.library_depth -= 1;
        }
        Some(entry)
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn has_library_frame(&self) -> bool {
        self.library_depth > 0
    }

    /// Open frames, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &CallFrame> {
        self.entries.iter().rev().map(|entry| &entry.frame)
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    library: LibraryDirs,
    attribute_hooks: BTreeSet<String>,
    record_native_returns: bool,
}

impl Classifier {
    pub fn new(
        library: LibraryDirs,
        attribute_hooks: impl IntoIterator<Item = String>,
        record_native_returns: bool,
    ) -> Self {
        Self {
            library,
            attribute_hooks: attribute_hooks.into_iter().collect(),
            record_native_returns,
        }
    }

    pub fn library(&self) -> &LibraryDirs {
        &self.library
    }

    pub fn is_library_frame(&self, frame: &CallFrame) -> bool {
        self.library.contains_file(frame.file)
    }

    pub fn is_attribute_hook(&self, frame: &CallFrame) -> bool {
        self.attribute_hooks.contains(frame.function)
    }

    pub fn enter(&self, stack: &mut CallStack, frame: &CallFrame, boundary: Boundary) {
        stack.push(StackEntry {
            frame: *frame,
            in_library: self.is_library_frame(frame),
            boundary,
        });
    }

    /// Pop the returning frame and decide whether its value is recorded.
    pub fn leave(&self, stack: &mut CallStack) -> Verdict {
        let Some(entry) = stack.pop() else {
            return Verdict::Outside;
        };
        if !entry.in_library {
            return Verdict::Outside;
        }
        if stack.has_library_frame() {
            return Verdict::Nested;
        }
        if self.is_attribute_hook(&entry.frame) {
            return Verdict::AttributeHook;
        }
        if entry.boundary == Boundary::Native && !self.record_native_returns {
            return Verdict::NativeBoundary;
        }
        Verdict::Record
    }
}

use crate::config::CompareConfig;
use crate::equivalence::compare_values;
use crate::errors::BearcatError;
use crate::logging::append_run_log;
use crate::replay::recording::{render_truncated, RecordEntry, RecordReader};
use crate::runtime::Terminal;
use serde_json::json;
use std::fmt;
use std::path::Path;

pub const SUCCESS_MESSAGE: &str = "Everything looks the same, hurrah.";

/// One side of a comparison pair. `Absent` pads the shorter log and never
/// equals anything.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Present(RecordEntry),
    Absent,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(entry) => entry.value.fmt(f),
            Self::Absent => f.write_str("<absent>"),
        }
    }
}

/// Zip two fallible record streams, padding the shorter with `Absent`.
pub struct ZipLongest<L, R> {
    left: L,
    right: R,
}

impl<L, R> ZipLongest<L, R>
where
    L: Iterator<Item = Result<RecordEntry, BearcatError>>,
    R: Iterator<Item = Result<RecordEntry, BearcatError>>,
{
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

impl<L, R> Iterator for ZipLongest<L, R>
where
    L: Iterator<Item = Result<RecordEntry, BearcatError>>,
    R: Iterator<Item = Result<RecordEntry, BearcatError>>,
{
    type Item = Result<(Slot, Slot), BearcatError>;

    fn next(&mut self) -> Option<Self::Item> {
        let left = match self.left.next().transpose() {
            Ok(left) => left,
            Err(e) => return Some(Err(e)),
        };
        let right = match self.right.next().transpose() {
            Ok(right) => right,
            Err(e) => return Some(Err(e)),
        };
        let slot = |entry: Option<RecordEntry>| entry.map_or(Slot::Absent, Slot::Present);
        match (left, right) {
            (None, None) => None,
            (left, right) => Some(Ok((slot(left), slot(right)))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareSummary {
    pub pairs: usize,
}

/// Why `left` and `right` differ, or `None` when they are equivalent.
pub fn compare_slots(left: &Slot, right: &Slot) -> Option<String> {
    match (left, right) {
        (Slot::Present(l), Slot::Present(r)) => compare_values(&l.value, &r.value).err(),
        (Slot::Present(_), Slot::Absent) => Some("right log ended before left log".to_string()),
        (Slot::Absent, Slot::Present(_)) => Some("left log ended before right log".to_string()),
        (Slot::Absent, Slot::Absent) => Some("both logs ended".to_string()),
    }
}

fn describe(slot: &Slot, max_render_bytes: usize) -> String {
    match slot {
        Slot::Present(entry) => format!(
            "#{} {}\n{}",
            entry.seq,
            entry.call,
            render_truncated(&entry.value, max_render_bytes)
        ),
        Slot::Absent => Slot::Absent.to_string(),
    }
}

/// Compare the logs at `left` and `right` pair by pair, printing each pair.
/// Stops at the first difference with [`BearcatError::Mismatch`].
pub fn compare_logs(
    left: &Path,
    right: &Path,
    cfg: &CompareConfig,
    terminal: &dyn Terminal,
) -> Result<CompareSummary, BearcatError> {
    let pairs = ZipLongest::new(RecordReader::open(left)?, RecordReader::open(right)?);
    compare_pairs(pairs, cfg, terminal)
}

pub fn compare_pairs(
    pairs: impl Iterator<Item = Result<(Slot, Slot), BearcatError>>,
    cfg: &CompareConfig,
    terminal: &dyn Terminal,
) -> Result<CompareSummary, BearcatError> {
    let mut compared = 0;
    for (position, pair) in pairs.enumerate() {
        let (left, right) = pair?;
        terminal.write_line(&format!(
            "{} {}",
            render_truncated(&left, cfg.max_render_bytes),
            render_truncated(&right, cfg.max_render_bytes)
        ))?;

        if let Some(reason) = compare_slots(&left, &right) {
            append_run_log(
                "error",
                "compare.mismatch",
                json!({ "position": position, "reason": reason }),
            );
            return Err(BearcatError::Mismatch {
                position,
                detail: format!(
                    "{reason}\nleft:  {}\nright: {}",
                    describe(&left, cfg.max_render_bytes),
                    describe(&right, cfg.max_render_bytes)
                ),
            });
        }
        append_run_log(
            "debug",
            "compare.pair.equal",
            json!({
                "position": position,
                "value_type": match &left {
                    Slot::Present(entry) => entry.value.type_name(),
                    Slot::Absent => "absent",
                },
            }),
        );
        compared += 1;
    }

    terminal.write_line(SUCCESS_MESSAGE)?;
    append_run_log("info", "compare.completed", json!({ "pairs": compared }));
    Ok(CompareSummary { pairs: compared })
}

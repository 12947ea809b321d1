use crate::engines::shard::ShardEngine;
use crate::engines::tabula::TabulaEngine;
use crate::engines::{ColumnInput, FrameEngine, FrameOps};
use crate::errors::BearcatError;
use crate::runtime::Terminal;
use crate::types::EngineKind;

pub fn example_columns() -> Vec<(String, ColumnInput)> {
    vec![
        ("a".to_string(), ColumnInput::Int64(vec![1, 2, 3, 1])),
        ("b".to_string(), ColumnInput::Int64(vec![4, 5, 6, 7])),
        (
            "s".to_string(),
            ColumnInput::Text(
                ["hello", "world", "Bar", "foo"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
        ),
    ]
}

/// Build the example table and run the scenario calls, printing each result.
/// Under a recorder this writes five records.
pub fn run_example<E: FrameEngine>(engine: &E, terminal: &dyn Terminal) -> Result<(), BearcatError> {
    let df = engine.from_columns(example_columns())?;
    terminal.write_line(&df.sum()?.to_string())?;
    terminal.write_line(&df.groupby_count("a")?.to_string())?;
    let picked = df.select(&["b", "s"])?;
    terminal.write_line(&picked.sum_numeric()?.to_string())?;
    Ok(())
}

pub fn run_example_for(kind: EngineKind, terminal: &dyn Terminal) -> Result<(), BearcatError> {
    match kind {
        EngineKind::Tabula => run_example(&TabulaEngine, terminal),
        EngineKind::Shard => run_example(&ShardEngine, terminal),
    }
}

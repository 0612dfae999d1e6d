///
/// Recording engine for unit tests.
///
/// Compiles to the statement text itself and records every compile and
/// execute call. Failures can be injected by statement text or by execute
/// position, and `SELECT` statements answer with a canned row set.
///

use crate::engine::{Engine, RowSet, TxContext};
use crate::errors::DbError;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub compiled: Vec<String>,
    pub executed: Vec<(Option<u64>, String, Vec<Value>)>,
    pub closed: bool,
    fail_text: Vec<String>,
    fail_at: Option<usize>,
    select_rows: Option<RowSet>,
}

impl RecordingEngine {
    /// Fails every execution of `text`.
    pub fn fail_on(&mut self, text: &str) {
        self.fail_text.push(text.to_string());
    }

    /// Fails the execute call at position `index`, counting from zero.
    pub fn fail_at(&mut self, index: usize) {
        self.fail_at = Some(index);
    }

    pub fn answer_selects(&mut self, rows: RowSet) {
        self.select_rows = Some(rows);
    }

    pub fn executed_text(&self) -> Vec<String> {
        self.executed.iter().map(|(_, text, _)| text.clone()).collect()
    }
}

impl Engine for RecordingEngine {
    type Compiled = String;

    fn compile(&mut self, text: &str) -> Result<String, DbError> {
        if text.contains("SYNTAX") {
            return Err(DbError::Syntax {
                statement: text.to_string(),
                reason: "near SYNTAX".to_string(),
            });
        }
        self.compiled.push(text.to_string());
        Ok(text.to_string())
    }

    fn execute(
        &mut self,
        ctx: Option<&TxContext>,
        compiled: &String,
        params: &[Value],
    ) -> Result<Vec<RowSet>, DbError> {
        let position = self.executed.len();
        self.executed
            .push((ctx.map(TxContext::id), compiled.clone(), params.to_vec()));

        if self.fail_at == Some(position) || self.fail_text.iter().any(|t| t == compiled) {
            return Err(DbError::Engine(format!("cannot run {}", compiled)));
        }
        if compiled.starts_with("SELECT") {
            return Ok(self.select_rows.iter().cloned().collect());
        }
        Ok(Vec::new())
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.closed = true;
        Ok(())
    }
}

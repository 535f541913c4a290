//!
//! Request descriptors
//! --------------------
//! One descriptor per statement execution: SQL text, the ordinal parameter
//! map, the statement kind and the row cap. A descriptor is built up through
//! setters and then moved into `Session::execute_*`, which consumes it, so a
//! sent descriptor can never be mutated afterwards.

use std::collections::BTreeMap;

use crate::error::{ClientError, ClientResult};
use crate::wire::Param;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Plain,
    Prepared,
    StoredProcedure,
}

impl StatementKind {
    /// Wire operation path for this kind. Plain statements split into
    /// execute/execute_query depending on whether the caller expects rows.
    pub fn op_path(self, expects_rows: bool) -> &'static str {
        match self {
            StatementKind::Plain => {
                if expects_rows {
                    "execute_query"
                } else {
                    "execute"
                }
            }
            StatementKind::Prepared => "execute_prepared",
            StatementKind::StoredProcedure => "execute_call",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub sql: String,
    pub kind: StatementKind,
    /// 0 means the session default applies.
    pub max_rows: u32,
    // 1-based ordinal -> encoded parameter. BTreeMap keeps wire order stable
    // and makes "last set wins" the natural semantics for repeated ordinals.
    params: BTreeMap<u16, Param>,
}

impl RequestDescriptor {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), kind: StatementKind::Plain, max_rows: 0, params: BTreeMap::new() }
    }

    pub fn prepared(sql: impl Into<String>) -> Self {
        Self { kind: StatementKind::Prepared, ..Self::new(sql) }
    }

    pub fn call(sql: impl Into<String>) -> Self {
        Self { kind: StatementKind::StoredProcedure, ..Self::new(sql) }
    }

    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Bind a parameter at a 1-based ordinal. Re-binding the same ordinal
    /// before the descriptor is sent replaces the earlier value.
    pub fn set_param(&mut self, ordinal: u16, param: Param) -> ClientResult<()> {
        if ordinal == 0 {
            return Err(ClientError::protocol("parameter ordinals are 1-based"));
        }
        self.params.insert(ordinal, param);
        Ok(())
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Render the parameter form fields (`param_count`, `p1`..`pN`).
    /// Ordinals must be contiguous from 1 by send time; a gap means the
    /// caller forgot a binding and the server would misnumber everything
    /// after it.
    pub fn param_fields(&self) -> ClientResult<Vec<(String, String)>> {
        let mut fields = Vec::with_capacity(self.params.len() + 1);
        fields.push(("param_count".to_string(), self.params.len().to_string()));
        for (expected, (ordinal, param)) in (1u16..).zip(self.params.iter()) {
            if *ordinal != expected {
                return Err(ClientError::protocol(format!(
                    "parameter ordinals must be contiguous from 1; missing p{expected}"
                )));
            }
            fields.push((format!("p{ordinal}"), param.to_field()));
        }
        Ok(fields)
    }
}

//! Per-subject covariates carried onto every segment of a subject.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TvError};
use crate::ids::SubjectId;
use crate::table::{ColumnSpec, Value};

/// Fixed values per subject, one per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Covariates {
    pub columns: Vec<ColumnSpec>,
    values: BTreeMap<SubjectId, Vec<Value>>,
}

impl Covariates {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            values: BTreeMap::new(),
        }
    }

    /// True when there are no columns to carry.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of subjects with values.
    pub fn subjects(&self) -> usize {
        self.values.len()
    }

    /// Record the values of `id`. The first row of a subject wins; returns
    /// `false` when `id` already had values.
    pub fn insert(&mut self, id: SubjectId, values: Vec<Value>) -> Result<bool> {
        if values.len() != self.columns.len() {
            return Err(TvError::InvalidValue {
                field: "covariate row width".to_string(),
                value: format!("{} (expected {})", values.len(), self.columns.len()),
            });
        }
        if self.values.contains_key(&id) {
            return Ok(false);
        }
        self.values.insert(id, values);
        Ok(true)
    }

    pub fn get(&self, id: SubjectId) -> Option<&[Value]> {
        self.values.get(&id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_row_wins() {
        let mut covariates = Covariates::new(vec![ColumnSpec::categorical("sex", 0)]);
        let id = SubjectId::new(4);
        assert!(covariates.insert(id, vec![Value::Code(1)]).unwrap());
        assert!(!covariates.insert(id, vec![Value::Code(2)]).unwrap());
        assert_eq!(covariates.get(id), Some(&[Value::Code(1)][..]));
        assert_eq!(covariates.subjects(), 1);
        assert!(covariates.get(SubjectId::new(5)).is_none());
    }

    #[test]
    fn test_row_width_checked() {
        let mut covariates = Covariates::new(vec![ColumnSpec::level("age")]);
        let err = covariates.insert(SubjectId::new(1), Vec::new()).unwrap_err();
        assert_eq!(err.code(), 109);
    }
}

//! Selector evaluation.
//!
//! Selectors are the jq subset used by definitions in practice: paths,
//! pipes, comparisons, `and`/`or`, `select`, `map`, `has` and a handful of
//! zero-argument builtins. A selector is applied to a parsed response and
//! produces zero or more matches, in document order:
//!
//! ```rust
//! use serde_json::json;
//! use watchdog::selector::Selector;
//!
//! let selector = Selector::parse(".results[].score").unwrap();
//! let matches = selector.evaluate(&json!({"results": [{"score": 1}, {"score": 2}]})).unwrap();
//! assert_eq!(matches, vec![json!(1), json!(2)]);
//! ```

mod eval;
mod parser;

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use parser::Filter;

/// Failure to compile or run a selector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("syntax error at offset {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("{0}")]
    Runtime(String),
}

/// A compiled selector
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    filter: Filter,
}

impl Selector {
    /// Compile a selector expression
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let filter = parser::parse(source)?;
        Ok(Self { source: source.to_string(), filter })
    }

    /// The expression this selector was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Apply the selector to `document`, returning every match in order
    pub fn evaluate(&self, document: &Value) -> Result<Vec<Value>, SelectorError> {
        let mut matches = Vec::new();
        self.filter.eval(document, &mut matches)?;
        Ok(matches)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile `selector` and apply it to `document`
pub fn evaluate(document: &Value, selector: &str) -> Result<Vec<Value>, SelectorError> {
    Selector::parse(selector)?.evaluate(document)
}

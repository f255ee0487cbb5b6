//! Statement text normalization

use crate::statement::StatementInfo;

pub const STATEMENT_TERMINATOR: char = ';';

/// Append a `;` to non-empty statement text that lacks one after trimming.
///
/// Trailing whitespace is kept as is; the terminator goes after it.
pub fn ensure_terminated(sql: &mut String) {
    let trimmed = sql.trim();
    if !trimmed.is_empty() && !trimmed.ends_with(STATEMENT_TERMINATOR) {
        sql.push(STATEMENT_TERMINATOR);
    }
}

impl StatementInfo {
    /// Normalize the statement text for display
    pub fn terminated(mut self) -> Self {
        ensure_terminated(&mut self.statement);
        self
    }
}

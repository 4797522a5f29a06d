use std::fmt::{Display, Formatter};

use tracing::Value;

/// Wrapper that renders `Option<T>` as its inner value or `None`.
pub struct DisplayOption<'a, T>(&'a Option<T>);

impl<T: Display> Display for DisplayOption<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(inner) => write!(f, "{inner}"),
            None => write!(f, "None"),
        }
    }
}

/// Lets optional values be logged as fields, e.g. `debug!(block = opt(&latest), ..)`.
pub fn opt<T: Display>(val: &Option<T>) -> impl Value + '_ {
    tracing::field::display(DisplayOption(val))
}

/// Shortens long payloads (response bodies, fingerprints) before they end up in logs.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

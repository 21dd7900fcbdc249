use std::str::FromStr;

use crate::foundation::error::{DjvError, DjvResult};

/// Remove every occurrence of `flag` and the `count` values after it from `args`.
///
/// Returns the values of the last occurrence; a flag without enough values is an error naming
/// the flag.
pub(crate) fn take_flag(
    plugin: &'static str,
    args: &mut Vec<String>,
    flag: &str,
    count: usize,
) -> DjvResult<Option<Vec<String>>> {
    let mut found = None;
    while let Some(pos) = args.iter().position(|a| a == flag) {
        if pos + count >= args.len() {
            return Err(DjvError::option(plugin, flag));
        }
        found = Some(args.drain(pos..=pos + count).skip(1).collect());
    }
    Ok(found)
}

/// Parse an option enum from its settings name (e.g. `film_print`).
pub(crate) fn parse_named<T: serde::de::DeserializeOwned>(
    plugin: &'static str,
    token: &str,
) -> DjvResult<T> {
    serde_json::from_value(serde_json::Value::String(token.to_string()))
        .map_err(|_| DjvError::option(plugin, token))
}

/// Parse a single command-line token, reporting the token itself on failure.
pub(crate) fn parse_token<T: FromStr>(plugin: &'static str, token: &str) -> DjvResult<T> {
    token.parse().map_err(|_| DjvError::option(plugin, token))
}

//! Functions for parsing classic command text.

use crate::commands::CommandError;
use crate::utils::{self, consts};

/// Returns `Some((prefix, unprefixed))`,
/// where `prefix` is the matched prefix and `unprefixed` is everything after.
/// Otherwise, returns `None` if no prefix was matched from `prefixes`.
pub fn unprefix_with<I, T>(prefixes: I, text: &str) -> Option<(&str, &str)>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    for prefix in prefixes {
        let prefix = prefix.as_ref();

        if prefix.is_empty() {
            continue;
        }

        if let Some(stripped) = text.strip_prefix(prefix) {
            return Some((&text[..prefix.len()], stripped));
        }
    }

    None
}

/// Returns a tuple of `(next, rest)`, where `next` is the part before any whitespaces
/// and `rest` is everything after the first whitespace.
pub fn split_once_whitespace(text: &str) -> (&str, Option<&str>) {
    text.split_once(char::is_whitespace)
        .map_or((text, None), |(n, r)| (n, Some(r)))
}

/// Parse text and return a tuple `(arg, Option<rest>)`,
/// where `arg` is either the first quoted part, the first whitespace separated part
/// or the whole input (after `trim_start`).
/// The `Option` will contain the remaining text, if any.
///
/// # Notes
/// - Escape characters are **not** handled.
/// - If a quoted argument is followed by any character (whitespace or not),
/// those characters will be in the remaining `Option`.
pub fn maybe_quoted_arg(input: &str) -> Result<(&str, Option<&str>), CommandError> {
    let input = input.trim_start();

    let mut chars = input.char_indices();
    let (_, initial) = chars.next().ok_or(CommandError::MissingArgs)?;

    if consts::DELIMITERS.contains(&initial) {
        // Find the matching pair.
        let (idx, _) = chars.find(|(_, c)| *c == initial).ok_or_else(|| {
            let input = utils::escape_discord_chars(input);
            CommandError::ParseError(format!(
                "Missing matching delimiter: '{input}', expected one of: {}.",
                utils::nice_list(consts::DELIMITERS)
            ))
        })?;

        // Delimiters are one byte wide.
        let rest = input.get(idx + 1..).filter(|r| !r.is_empty());
        Ok((&input[1..idx], rest))
    } else {
        Ok(split_once_whitespace(input))
    }
}

/// Make sure there's nothing else by mistake.
pub fn ensure_rest_is_empty(rest: Option<&str>) -> Result<(), CommandError> {
    match rest {
        Some(rest) if !rest.trim().is_empty() => {
            Err(CommandError::UnexpectedArgs(format!("Unexpected '{}'", rest.trim())))
        },
        _ => Ok(()),
    }
}

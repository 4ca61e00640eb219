//! Search term tokenization.
//!
//! Whitespace separates terms; double quotes group a phrase that may contain
//! whitespace. An unterminated phrase runs to the end of the input.

const QUOTE: char = '"';

/// Splits raw search input into literal terms.
///
/// # Examples
///
/// ```rust
/// use reg_explorer::terms::parse;
///
/// assert_eq!(parse(r#"foo "bar baz""#), vec!["foo", "bar baz"]);
/// assert!(parse("   ").is_empty());
/// ```
pub fn parse(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    if !input.contains(QUOTE) {
        return input.split_whitespace().map(str::to_string).collect();
    }

    let mut terms = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        if in_quotes {
            if c == QUOTE {
                flush(&mut current, &mut terms);
                in_quotes = false;
            } else {
                current.push(c);
            }
        } else if c == QUOTE {
            in_quotes = true;
        } else if c.is_whitespace() {
            flush(&mut current, &mut terms);
        } else {
            current.push(c);
        }
    }
    flush(&mut current, &mut terms);

    terms
}

fn flush(current: &mut String, terms: &mut Vec<String>) {
    if !current.is_empty() {
        terms.push(std::mem::take(current));
    }
}

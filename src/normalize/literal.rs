use std::iter::Peekable;
use std::str::Chars;

use crate::errors::{AppError, AppResult};

/// Parses a textual list of quoted strings such as `['Drama', "Crime"]`.
///
/// An absent cell is rejected like any other malformed value.
pub fn parse_string_list(column: &'static str, value: Option<&str>) -> AppResult<Vec<String>> {
    let Some(raw) = value else {
        return Err(list_error(column, "", "value is missing"));
    };
    ListParser::new(raw)
        .parse()
        .map_err(|reason| list_error(column, raw, reason))
}

fn list_error(column: &'static str, value: &str, reason: impl Into<String>) -> AppError {
    AppError::ListLiteral {
        column,
        value: value.to_string(),
        reason: reason.into(),
    }
}

struct ListParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> ListParser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            chars: raw.chars().peekable(),
        }
    }

    fn parse(mut self) -> Result<Vec<String>, String> {
        self.skip_whitespace();
        self.expect('[')?;

        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.chars.peek().copied() {
                Some(']') => {
                    self.chars.next();
                    break;
                }
                Some(quote @ ('\'' | '"')) => {
                    self.chars.next();
                    items.push(self.string_body(quote)?);
                    self.skip_whitespace();
                    match self.chars.next() {
                        Some(',') => continue,
                        Some(']') => break,
                        Some(other) => return Err(format!("unexpected '{other}' after item")),
                        None => return Err("unterminated list".into()),
                    }
                }
                Some(other) => return Err(format!("expected a quoted string, found '{other}'")),
                None => return Err("unterminated list".into()),
            }
        }

        self.skip_whitespace();
        match self.chars.next() {
            None => Ok(items),
            Some(other) => Err(format!("trailing '{other}' after list")),
        }
    }

    fn string_body(&mut self, quote: char) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('x') => out.push(self.hex_escape()?),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err("unterminated string".into()),
                },
                Some('\n') | None => return Err("unterminated string".into()),
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self) -> Result<char, String> {
        let digits = (0..2)
            .map(|_| self.chars.next())
            .collect::<Option<String>>()
            .ok_or_else(|| "truncated \\x escape".to_string())?;
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid \\x escape '{digits}'"))
    }

    fn expect(&mut self, wanted: char) -> Result<(), String> {
        match self.chars.next() {
            Some(c) if c == wanted => Ok(()),
            Some(c) => Err(format!("expected '{wanted}', found '{c}'")),
            None => Err(format!("expected '{wanted}', found end of input")),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_quotes_and_escapes() {
        let items = parse_string_list(
            "Top 5 Casts",
            Some(r#"['Al Pacino', "Robert De Niro", 'Val Kilmer\'s Double', "Tab\there"]"#),
        )
        .unwrap();
        assert_eq!(
            items,
            vec![
                "Al Pacino".to_string(),
                "Robert De Niro".to_string(),
                "Val Kilmer's Double".to_string(),
                "Tab\there".to_string(),
            ]
        );
    }

    #[test]
    fn accepts_empty_and_trailing_comma() {
        assert!(parse_string_list("Generes", Some(" [ ] ")).unwrap().is_empty());
        assert_eq!(
            parse_string_list("Generes", Some("['Drama',]")).unwrap(),
            vec!["Drama".to_string()]
        );
    }

    #[test]
    fn rejects_missing_and_malformed_values() {
        for value in [None, Some(""), Some("Drama, Crime"), Some("['Drama'"), Some("[Drama]")] {
            let err = parse_string_list("Generes", value).unwrap_err();
            assert!(matches!(err, AppError::ListLiteral { column: "Generes", .. }));
        }
    }
}

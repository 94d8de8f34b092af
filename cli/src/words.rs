//! Reading octal word files.
//!
//! A word file holds 16-bit words written in octal, separated by
//! whitespace.  Everything from a `#` to the end of the line is a
//! comment.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, PartialEq, Eq)]
pub struct BadWord {
    pub line: usize,
    pub text: String,
}

impl Display for BadWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: '{}' is not a 16-bit octal word", self.line, self.text)
    }
}

impl Error for BadWord {}

pub fn parse_octal_words(text: &str) -> Result<Vec<u16>, BadWord> {
    let mut words = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let content = match line.split_once('#') {
            Some((before, _comment)) => before,
            None => line,
        };
        for item in content.split_whitespace() {
            match u16::from_str_radix(item, 8) {
                Ok(word) => words.push(word),
                Err(_) => {
                    return Err(BadWord {
                        line: index + 1,
                        text: item.to_string(),
                    });
                }
            }
        }
    }
    Ok(words)
}

#[test]
fn test_parse_octal_words() {
    assert_eq!(
        parse_octal_words("070000 2000  # read\n\n177777\n"),
        Ok(vec![0o70000, 0o2000, 0o177777])
    );
}

#[test]
fn test_parse_octal_words_rejects_non_octal() {
    assert_eq!(
        parse_octal_words("1 2\n  3 8\n"),
        Err(BadWord {
            line: 2,
            text: "8".to_string()
        })
    );
}

#[test]
fn test_parse_octal_words_rejects_overflow() {
    assert!(parse_octal_words("200000").is_err());
}

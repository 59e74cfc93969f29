use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum TokenKind {
    Word { letter: char, value: Number },
    Comment(String),
    Newline,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    /// Integer view of the literal; fractional parts are truncated.
    pub fn as_i64(self) -> i64 {
        match self {
            Number::Int(v) => v,
            Number::Float(v) => v.trunc() as i64,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LexError {
    #[error("unexpected '{raw}' at line {line}, column {column}")]
    Unexpected {
        line: usize,
        column: usize,
        raw: String,
    },

    #[error("word '{letter}' has no numeric value at line {line}, column {column}")]
    MissingValue {
        line: usize,
        column: usize,
        letter: char,
    },

    #[error("invalid number '{raw}' at line {line}, column {column}")]
    InvalidNumber {
        line: usize,
        column: usize,
        raw: String,
    },

    #[error("unterminated parenthesized comment starting at line {line}, column {column}")]
    UnterminatedComment { line: usize, column: usize },
}

pub fn lex(input: &str) -> Lexer<'_> {
    Lexer::new(input)
}

/// Only the words of `input`, comments and line breaks dropped.
pub fn words(input: &str) -> impl Iterator<Item = Result<(char, Number), LexError>> + '_ {
    lex(input).filter_map(|token| match token {
        Ok(Token {
            kind: TokenKind::Word { letter, value },
            ..
        }) => Some(Ok((letter, value))),
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    })
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn pos(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    /// Consume up to the next terminator so lexing resumes on the next word.
    fn take_run(&mut self, raw: &mut String) {
        while let Some(c) = self.peek() {
            if is_value_terminator(c) {
                break;
            }
            raw.push(c);
            self.bump();
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.peek() {
            let (line, column) = self.pos();

            if ch.is_ascii_whitespace() {
                self.bump();
                if ch == '\n' {
                    return Some(Ok(Token {
                        kind: TokenKind::Newline,
                        line,
                        column,
                    }));
                }
                continue;
            }

            if ch == ';' || ch == '#' {
                self.bump();
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    self.bump();
                }
                return Some(Ok(Token {
                    kind: TokenKind::Comment(text.trim().to_string()),
                    line,
                    column,
                }));
            }

            if ch == '(' {
                self.bump();
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if c == ')' {
                        self.bump();
                        return Some(Ok(Token {
                            kind: TokenKind::Comment(text),
                            line,
                            column,
                        }));
                    }
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    self.bump();
                }
                return Some(Err(LexError::UnterminatedComment { line, column }));
            }

            if ch.is_ascii_alphabetic() {
                self.bump();
                let letter = ch.to_ascii_uppercase();

                if !matches!(self.peek(), Some(next) if is_number_start(next)) {
                    let mut rest = String::new();
                    self.take_run(&mut rest);
                    return Some(Err(LexError::MissingValue {
                        line,
                        column,
                        letter,
                    }));
                }

                let start_col = self.column;
                return Some(match parse_number(self) {
                    Ok(value) => Ok(Token {
                        kind: TokenKind::Word { letter, value },
                        line,
                        column,
                    }),
                    Err(mut raw) => {
                        self.take_run(&mut raw);
                        Err(LexError::InvalidNumber {
                            line,
                            column: start_col,
                            raw,
                        })
                    }
                });
            }

            let mut raw = String::new();
            raw.push(ch);
            self.bump();
            self.take_run(&mut raw);
            return Some(Err(LexError::Unexpected { line, column, raw }));
        }

        None
    }
}

fn is_number_start(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.')
}

fn is_value_terminator(ch: char) -> bool {
    ch.is_ascii_whitespace() || matches!(ch, ';' | '(' | '#')
}

/// Reads `[+-]digits[.digits]`. On failure the consumed text is returned so
/// the caller can report it.
fn parse_number(lexer: &mut Lexer<'_>) -> Result<Number, String> {
    let mut raw = String::new();
    if let Some(sign @ ('+' | '-')) = lexer.peek() {
        raw.push(sign);
        lexer.bump();
    }

    let mut has_digit = false;
    while let Some(ch) = lexer.peek() {
        if !ch.is_ascii_digit() {
            break;
        }
        has_digit = true;
        raw.push(ch);
        lexer.bump();
    }

    let mut is_float = false;
    if let Some('.') = lexer.peek() {
        is_float = true;
        raw.push('.');
        lexer.bump();
        while let Some(ch) = lexer.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            has_digit = true;
            raw.push(ch);
            lexer.bump();
        }
    }

    if !has_digit {
        return Err(raw);
    }

    if !is_float {
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Number::Int(int));
        }
    }

    match raw.parse::<f64>() {
        Ok(value) => Ok(Number::Float(value)),
        Err(_) => Err(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).map(|t| t.unwrap().kind).collect()
    }

    #[test]
    fn lexes_words_and_comments() {
        assert_eq!(
            kinds("N10 G01 X-1.5 ; feed move\n(tool change) T2"),
            vec![
                TokenKind::Word {
                    letter: 'N',
                    value: Number::Int(10)
                },
                TokenKind::Word {
                    letter: 'G',
                    value: Number::Int(1)
                },
                TokenKind::Word {
                    letter: 'X',
                    value: Number::Float(-1.5)
                },
                TokenKind::Comment("feed move".into()),
                TokenKind::Newline,
                TokenKind::Comment("tool change".into()),
                TokenKind::Word {
                    letter: 'T',
                    value: Number::Int(2)
                },
            ]
        );
    }

    #[test]
    fn packed_words_split_on_letters() {
        let words: Vec<_> = words("g1x10Y.5").map(Result::unwrap).collect();
        assert_eq!(
            words,
            vec![
                ('G', Number::Int(1)),
                ('X', Number::Int(10)),
                ('Y', Number::Float(0.5)),
            ]
        );
    }

    #[test]
    fn token_positions_serialize() {
        let tokens: Vec<_> = lex("G1 X2.5").map(Result::unwrap).collect();
        let json = serde_json::to_string(&tokens).unwrap();
        insta::assert_snapshot!(json, @r#"[{"kind":{"kind":"Word","value":{"letter":"G","value":{"kind":"Int","value":1}}},"line":1,"column":1},{"kind":{"kind":"Word","value":{"letter":"X","value":{"kind":"Float","value":2.5}}},"line":1,"column":4}]"#);
    }

    #[test]
    fn recovers_after_bad_words() {
        let results: Vec<_> = words("X1 Y Z-. Q3 @@ F100").collect();
        assert_eq!(results.len(), 6);
        assert_eq!(results[0], Ok(('X', Number::Int(1))));
        assert_eq!(
            results[1],
            Err(LexError::MissingValue {
                line: 1,
                column: 4,
                letter: 'Y'
            })
        );
        assert_eq!(
            results[2],
            Err(LexError::InvalidNumber {
                line: 1,
                column: 7,
                raw: "-.".into()
            })
        );
        assert_eq!(results[3], Ok(('Q', Number::Int(3))));
        assert!(matches!(results[4], Err(LexError::Unexpected { ref raw, .. }) if raw == "@@"));
        assert_eq!(results[5], Ok(('F', Number::Int(100))));
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let results: Vec<_> = lex("(oops\nG1").collect();
        assert_eq!(
            results[0],
            Err(LexError::UnterminatedComment { line: 1, column: 1 })
        );
        assert!(results[1..].iter().any(|r| matches!(
            r,
            Ok(Token {
                kind: TokenKind::Word { letter: 'G', .. },
                ..
            })
        )));
    }

    #[test]
    fn number_views() {
        assert_eq!(Number::Float(10.9).as_i64(), 10);
        assert_eq!(Number::Int(3).as_f64(), 3.0);
    }
}

//! G-code word tokenizer.
//!
//! Motion programs are made of lines of words: a single command letter
//! followed by a numeric literal (`G01`, `X-12.5`, `F600`). Comments in
//! either `;` or `( ... )` form are surfaced as tokens so callers can
//! decide whether to keep them.

mod lexer;

pub use lexer::{LexError, Lexer, Number, Token, TokenKind, lex, words};

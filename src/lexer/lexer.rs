use log::debug;
use thiserror::Error;

use super::token::{Token, TokenKind};

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LexError {
    #[error("nothing after a backslash at position {0}")]
    TrailingBackslash(usize),
    #[error("unterminated quote '{0}' starting at position {1}")]
    UnterminatedQuote(char, usize),
    #[error("no closing '{0}' for the substitution starting at position {1}")]
    UnterminatedSubstitution(char, usize),
}

/// Knobs for one tokenizer pass. The defaults lex a complete command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerOptions {
    /// Opening character that nests another level before `stop_char` ends the pass.
    pub count_open_char: Option<char>,
    /// Unquoted character that ends the pass (consumed, never part of a token).
    pub stop_char: Option<char>,
    pub handle_comments: bool,
    pub emit_tokens: bool,
    pub incomplete_input_is_error: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        LexerOptions {
            count_open_char: None,
            stop_char: None,
            handle_comments: true,
            emit_tokens: true,
            incomplete_input_is_error: true,
        }
    }
}

impl LexerOptions {
    /// Lexes a partial line without failing, e.g. for completion.
    pub fn tolerant() -> Self {
        LexerOptions {
            incomplete_input_is_error: false,
            ..Self::default()
        }
    }

    /// Locates the `)` matching an already consumed `$(`.
    pub fn command_substitution(incomplete_input_is_error: bool) -> Self {
        LexerOptions {
            count_open_char: Some('('),
            stop_char: Some(')'),
            handle_comments: true,
            emit_tokens: false,
            incomplete_input_is_error,
        }
    }

    /// Locates the `}` closing an already consumed `${`.
    pub fn parameter_expansion(incomplete_input_is_error: bool) -> Self {
        LexerOptions {
            count_open_char: None,
            stop_char: Some('}'),
            handle_comments: false,
            emit_tokens: false,
            incomplete_input_is_error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Free,
    Single,
    Double,
}

fn can_start_operator(ch: char) -> bool {
    matches!(ch, '&' | '<' | '>' | ';' | '|' | '\n' | '(' | ')')
}

fn can_extend_operator(op: &str, ch: char) -> bool {
    let digit_prefixed = op.len() > 1 && op.as_bytes()[0].is_ascii_digit();
    if digit_prefixed {
        // `2>` -> `2>>` / `2>&`, `0<` -> `0<&`
        return matches!((&op[1..], ch), (">", '>') | (">", '&') | ("<", '&'));
    }
    matches!(
        (op, ch),
        ("&", '&')
            | ("|", '|')
            | (";", ';')
            | ("<", '<')
            | (">", '>')
            | ("<", '&')
            | (">", '&')
            | ("<", '>')
            | ("(", ')')
    )
}

/// Single left-to-right scanner over a shared input buffer.
///
/// A lexer may start in the middle of the buffer; nested substitutions are
/// located by running another lexer from the current cursor and then
/// continuing from wherever that one stopped.
pub struct Lexer<'a> {
    input: &'a str,
    options: LexerOptions,
    pos: usize,
    char_pos: usize,
    start: (usize, usize),
    depth: usize,
    quoting: Quoting,
    quote_start: usize,
    in_operator: bool,
    found_stop: bool,
    current: String,
    token_start: (usize, usize),
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_options(input, LexerOptions::default())
    }

    pub fn with_options(input: &'a str, options: LexerOptions) -> Self {
        Self::resume(input, 0, 0, options)
    }

    /// Starts lexing at byte `pos` (code point `char_pos`) of `input`.
    pub fn resume(input: &'a str, pos: usize, char_pos: usize, options: LexerOptions) -> Self {
        Lexer {
            input,
            options,
            pos,
            char_pos,
            start: (pos, char_pos),
            depth: 0,
            quoting: Quoting::Free,
            quote_start: pos,
            in_operator: false,
            found_stop: false,
            current: String::new(),
            token_start: (pos, char_pos),
            tokens: Vec::new(),
        }
    }

    /// Current cursor as (byte offset, code point offset).
    pub fn position(&self) -> (usize, usize) {
        (self.pos, self.char_pos)
    }

    /// Number of code points this lexer has consumed since it started.
    pub fn consumed_chars(&self) -> usize {
        self.char_pos - self.start.1
    }

    /// Number of bytes this lexer has consumed since it started.
    pub fn consumed_bytes(&self) -> usize {
        self.pos - self.start.0
    }

    /// True when a `stop_char` pass ended on its closing character.
    pub fn found_stop(&self) -> bool {
        self.found_stop
    }

    pub fn tokenize_all(&mut self) -> Result<Vec<Token>, LexError> {
        while let Some(ch) = self.peek() {
            match self.quoting {
                Quoting::Single => {
                    self.consume_into_token();
                    if ch == '\'' {
                        self.quoting = Quoting::Free;
                    }
                    continue;
                }
                Quoting::Double => {
                    match ch {
                        '"' => {
                            self.consume_into_token();
                            self.quoting = Quoting::Free;
                        }
                        '\\' => self.lex_backslash()?,
                        '`' => self.lex_backtick()?,
                        '$' => {
                            if !self.lex_dollar()? {
                                self.consume_into_token();
                            }
                        }
                        _ => self.consume_into_token(),
                    }
                    continue;
                }
                Quoting::Free => {}
            }

            if Some(ch) == self.options.stop_char {
                if self.depth == 0 {
                    self.delimit_current();
                    self.advance();
                    self.found_stop = true;
                    break;
                }
                self.depth -= 1;
            } else if Some(ch) == self.options.count_open_char {
                self.depth += 1;
            }

            if self.in_operator {
                if can_extend_operator(&self.current, ch) {
                    self.consume_into_token();
                    continue;
                }
                self.delimit(TokenKind::Operator);
            }

            match ch {
                '\\' => self.lex_backslash()?,
                '\'' => {
                    self.quote_start = self.pos;
                    self.consume_into_token();
                    self.quoting = Quoting::Single;
                }
                '"' => {
                    self.quote_start = self.pos;
                    self.consume_into_token();
                    self.quoting = Quoting::Double;
                }
                '`' => self.lex_backtick()?,
                '$' => {
                    if !self.lex_dollar()? {
                        self.consume_into_token();
                    }
                }
                '<' | '>' if self.current.len() == 1 && self.current.as_bytes()[0].is_ascii_digit() => {
                    // `2>file`: the fd number becomes part of the operator
                    self.consume_into_token();
                    self.in_operator = true;
                }
                c if can_start_operator(c) => {
                    self.delimit(TokenKind::Word);
                    self.consume_into_token();
                    self.in_operator = true;
                }
                ' ' | '\t' | '\r' => {
                    self.delimit(TokenKind::Word);
                    self.advance();
                }
                '#' if self.options.handle_comments && self.current.is_empty() => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => self.consume_into_token(),
            }
        }

        if self.options.incomplete_input_is_error {
            match self.quoting {
                Quoting::Single => return Err(LexError::UnterminatedQuote('\'', self.quote_start)),
                Quoting::Double => return Err(LexError::UnterminatedQuote('"', self.quote_start)),
                Quoting::Free => {}
            }
            if let Some(stop) = self.options.stop_char {
                if !self.found_stop {
                    return Err(LexError::UnterminatedSubstitution(stop, self.start.0.saturating_sub(2)));
                }
            }
        }

        self.delimit_current();
        debug!("lexed {} tokens from {} bytes", self.tokens.len(), self.consumed_bytes());
        Ok(std::mem::take(&mut self.tokens))
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += ch.len_utf8();
            self.char_pos += 1;
        }
    }

    fn begin_token_here(&mut self) {
        if self.current.is_empty() {
            self.token_start = (self.pos, self.char_pos);
        }
    }

    fn consume_into_token(&mut self) {
        if let Some(ch) = self.peek() {
            self.begin_token_here();
            self.current.push(ch);
            self.advance();
        }
    }

    fn delimit_current(&mut self) {
        let kind = if self.in_operator {
            TokenKind::Operator
        } else {
            TokenKind::Word
        };
        self.delimit(kind);
    }

    fn delimit(&mut self, kind: TokenKind) {
        self.in_operator = false;
        if self.current.is_empty() {
            return;
        }
        let lexeme = std::mem::take(&mut self.current);
        if self.options.emit_tokens {
            self.tokens.push(Token {
                kind,
                lexeme,
                span: (self.token_start.0, self.pos),
                char_span: (self.token_start.1, self.char_pos),
            });
        }
    }

    fn lex_backslash(&mut self) -> Result<(), LexError> {
        let backslash_pos = self.pos;
        let start = (self.pos, self.char_pos);
        self.advance();
        match self.peek() {
            None if self.options.incomplete_input_is_error => Err(LexError::TrailingBackslash(backslash_pos)),
            None => {
                if self.current.is_empty() {
                    self.token_start = start;
                }
                self.current.push('\\');
                Ok(())
            }
            Some('\n') => {
                // line continuation
                self.advance();
                Ok(())
            }
            Some(ch) => {
                if self.current.is_empty() {
                    self.token_start = start;
                }
                self.current.push('\\');
                self.current.push(ch);
                self.advance();
                Ok(())
            }
        }
    }

    /// Appends a whole `$(...)` or `${...}` region to the current token.
    /// Returns false when the `$` does not open such a region.
    fn lex_dollar(&mut self) -> Result<bool, LexError> {
        let rest = &self.input[self.pos..];
        let strict = self.options.incomplete_input_is_error;
        let options = if rest.starts_with("$(") {
            LexerOptions::command_substitution(strict)
        } else if rest.starts_with("${") {
            LexerOptions::parameter_expansion(strict)
        } else {
            return Ok(false);
        };

        self.begin_token_here();
        let begin = self.pos;
        let mut inner = Lexer::resume(self.input, self.pos + 2, self.char_pos + 2, options);
        inner.tokenize_all()?;
        let (end, end_chars) = inner.position();
        self.current.push_str(&self.input[begin..end]);
        self.pos = end;
        self.char_pos = end_chars;
        Ok(true)
    }

    fn lex_backtick(&mut self) -> Result<(), LexError> {
        self.begin_token_here();
        let begin = self.pos;
        self.consume_into_token();
        while let Some(ch) = self.peek() {
            match ch {
                '`' => {
                    self.consume_into_token();
                    return Ok(());
                }
                '\\' => {
                    self.consume_into_token();
                    self.consume_into_token();
                }
                _ => self.consume_into_token(),
            }
        }
        if self.options.incomplete_input_is_error {
            return Err(LexError::UnterminatedSubstitution('`', begin));
        }
        Ok(())
    }
}

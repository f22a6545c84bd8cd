/// POSIX splits input into exactly two kinds of tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,            // Original text, quotes and substitutions included
    pub span: (usize, usize),      // Byte position [start, end)
    pub char_span: (usize, usize), // Code point position [start, end)
}

impl Token {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.lexeme == op
    }

    /// True for an unquoted word spelled exactly `word`, e.g. a reserved word.
    pub fn is_word_spelled(&self, word: &str) -> bool {
        self.kind == TokenKind::Word && self.lexeme == word
    }
}

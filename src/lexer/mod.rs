mod lexer;
mod token;

pub use lexer::{LexError, Lexer, LexerOptions};
pub use token::{Token, TokenKind};

/// Tokenizes one complete piece of shell text.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).tokenize_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_text(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.lexeme))
            .collect()
    }

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize("echo hello | grep world").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[0].lexeme, "echo");
        assert_eq!(tokens[2].kind, TokenKind::Operator);
        assert_eq!(tokens[2].lexeme, "|");
    }

    #[test]
    fn test_and_or_are_single_tokens() {
        assert_eq!(
            kinds_and_text("a && b || c"),
            vec![
                (TokenKind::Word, "a".to_string()),
                (TokenKind::Operator, "&&".to_string()),
                (TokenKind::Word, "b".to_string()),
                (TokenKind::Operator, "||".to_string()),
                (TokenKind::Word, "c".to_string()),
            ]
        );
    }

    #[test]
    fn test_redirection_words() {
        let tokens = tokenize("cat < in.txt >> out.txt").unwrap();
        assert!(tokens[1].is_operator("<"));
        assert!(tokens[3].is_operator(">>"));
        assert!(tokens[4].is_word_spelled("out.txt"));
    }
}

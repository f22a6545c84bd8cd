use std::os::fd::RawFd;
use std::rc::Rc;

use log::debug;

use crate::ast::{
    AndOrList, AndOrOp, CommandKind, CommandList, ForCommand, IfCommand, LoopCommand, Pipeline,
    RedirectKind, Redirection, Separator, VariableAssignment,
};
use crate::lexer::Token;
use crate::parser::pending::PendingCommand;
use crate::parser::{ParseError, Parser};

/// Words that close a compound command. Outside of the construct that
/// expects them they are syntax errors.
const CLOSING_WORDS: &[&str] = &["then", "elif", "else", "fi", "do", "done", "}"];

pub struct DefaultParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

/// Accumulates one command list while its tokens stream in.
#[derive(Default)]
struct ListBuilder {
    list: CommandList,
    and_or: AndOrList,
    pipeline: Pipeline,
    pending: PendingCommand,
    // operator (`|`, `&&`, `||`) still waiting for the command after it
    dangling: Option<&'static str>,
}

impl ListBuilder {
    fn flush_command(&mut self) {
        if let Some(cmd) = self.pending.take() {
            self.pipeline.commands.push(cmd);
        }
    }

    fn flush_pipeline(&mut self, op: AndOrOp) {
        self.flush_command();
        let pipeline = std::mem::take(&mut self.pipeline);
        if !pipeline.commands.is_empty() || pipeline.negated {
            self.and_or.items.push((pipeline, op));
        }
    }

    fn flush_and_or(&mut self, separator: Separator) {
        self.flush_pipeline(AndOrOp::End);
        let and_or = std::mem::take(&mut self.and_or);
        if !and_or.items.is_empty() {
            self.list.items.push((and_or, separator));
        }
    }

    fn check_dangling(&self) -> Result<(), ParseError> {
        match self.dangling {
            Some(op) => Err(ParseError::Syntax(format!("a command is expected after '{op}'"))),
            None => Ok(()),
        }
    }

    fn has_no_pipeline(&self) -> bool {
        self.pending.is_unstarted() && self.pipeline.commands.is_empty() && !self.pipeline.negated
    }

    fn finish(mut self) -> Result<CommandList, ParseError> {
        self.check_dangling()?;
        self.flush_and_or(Separator::End);
        Ok(self.list)
    }
}

fn unexpected(token: &Token) -> ParseError {
    if token.is_operator("\n") {
        ParseError::Syntax("unexpected newline".to_string())
    } else {
        ParseError::Syntax(format!("unexpected '{}'", token.lexeme))
    }
}

fn expected_at_end(terminators: &[&str]) -> ParseError {
    let names: Vec<String> = terminators.iter().map(|t| format!("'{t}'")).collect();
    let explanation = if names.len() == 1 {
        format!("{} expected, but got to the end of input", names[0])
    } else {
        format!("either one of {} expected, but got to the end of input", names.join(", "))
    };
    ParseError::Syntax(explanation)
}

pub(crate) fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits `NAME=value`. The name may not be empty and consists of
/// alphanumerics and underscores only.
fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let eq = word.find('=')?;
    let name = &word[..eq];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, &word[eq + 1..]))
}

/// Splits a redirection operator into its explicit fd and the bare operator.
fn redirection_parts(op: &str) -> Option<(Option<&str>, &str)> {
    let digits = op.bytes().take_while(u8::is_ascii_digit).count();
    let (number, bare) = op.split_at(digits);
    if !matches!(bare, "<" | ">" | ">>" | "<&" | ">&") {
        return None;
    }
    Some(((!number.is_empty()).then_some(number), bare))
}

impl<'a> DefaultParser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn skip_newlines(&mut self) {
        while self.peek().is_some_and(|t| t.is_operator("\n")) {
            self.pos += 1;
        }
    }

    /// Parses a command list until one of `terminators` appears as a
    /// command word. Returns the list, the number of tokens consumed
    /// (terminator included) and the terminator itself.
    ///
    /// With no terminators the whole input is parsed.
    pub fn parse_until(
        &mut self,
        terminators: &[&str],
    ) -> Result<(CommandList, usize, Option<&'a Token>), ParseError> {
        let mut builder = ListBuilder::default();
        while let Some(token) = self.peek() {
            if token.is_word() {
                if builder.pending.at_command_word() && terminators.contains(&token.lexeme.as_str()) {
                    self.pos += 1;
                    let list = builder.finish()?;
                    return Ok((list, self.pos, Some(token)));
                }
                self.parse_word(&mut builder, token)?;
            } else {
                self.parse_operator(&mut builder, token)?;
            }
        }
        if !terminators.is_empty() {
            return Err(expected_at_end(terminators));
        }
        Ok((builder.finish()?, self.pos, None))
    }

    /// Runs a nested parser over the remaining tokens.
    fn sub_parse(&mut self, terminators: &[&str]) -> Result<(CommandList, &'a Token), ParseError> {
        let tokens: &'a [Token] = self.tokens;
        let mut sub = DefaultParser::new(&tokens[self.pos..]);
        let (list, consumed, terminator) = sub.parse_until(terminators)?;
        self.pos += consumed;
        match terminator {
            Some(token) => Ok((list, token)),
            None => Err(expected_at_end(terminators)),
        }
    }

    fn parse_word(&mut self, b: &mut ListBuilder, token: &'a Token) -> Result<(), ParseError> {
        let word = token.lexeme.as_str();
        if b.pending.is_unstarted() {
            match word {
                "!" => {
                    if !b.pipeline.commands.is_empty() {
                        return Err(ParseError::Syntax(
                            "'!' is only allowed at the start of a pipeline".to_string(),
                        ));
                    }
                    b.pipeline.negated = !b.pipeline.negated;
                    self.pos += 1;
                    return Ok(());
                }
                "{" => return self.parse_brace_group(b, token),
                "if" => return self.parse_if(b, token),
                "while" => return self.parse_loop(b, token, false),
                "until" => return self.parse_loop(b, token, true),
                "for" => return self.parse_for(b, token),
                "case" | "esac" => return Err(ParseError::Unsupported("case statements")),
                w if CLOSING_WORDS.contains(&w) => return Err(unexpected(token)),
                _ => {}
            }
        } else if b.pending.is_compound() && CLOSING_WORDS.contains(&word) {
            return Err(unexpected(token));
        }

        b.pending.touch(token);
        let simple = b.pending.commit_as_simple()?;
        b.dangling = None;
        if simple.argv.is_empty() {
            if let Some((name, value)) = split_assignment(word) {
                simple.assignments.push(VariableAssignment {
                    name: name.to_string(),
                    value: value.to_string(),
                });
                self.pos += 1;
                return Ok(());
            }
        }
        simple.argv.push(word.to_string());
        simple.argv_tokens.push(token.clone());
        self.pos += 1;
        Ok(())
    }

    fn parse_operator(&mut self, b: &mut ListBuilder, token: &'a Token) -> Result<(), ParseError> {
        let op = token.lexeme.as_str();
        match op {
            "|" => {
                b.check_dangling()?;
                if b.pending.is_unstarted() {
                    return Err(unexpected(token));
                }
                b.flush_command();
                b.dangling = Some("|");
                self.pos += 1;
            }
            "&&" | "||" => {
                b.check_dangling()?;
                if b.has_no_pipeline() {
                    return Err(unexpected(token));
                }
                let (and_or_op, name) = if op == "&&" {
                    (AndOrOp::And, "&&")
                } else {
                    (AndOrOp::Or, "||")
                };
                b.flush_pipeline(and_or_op);
                b.dangling = Some(name);
                self.pos += 1;
            }
            ";" | "&" => {
                b.check_dangling()?;
                let separator = if op == ";" {
                    Separator::Semicolon
                } else {
                    Separator::Ampersand
                };
                b.flush_and_or(separator);
                self.pos += 1;
            }
            "\n" => {
                // a linebreak may follow `|`, `&&` and `||`
                if b.dangling.is_none() {
                    b.flush_and_or(Separator::Newline);
                }
                self.pos += 1;
            }
            "()" => self.parse_function_definition(b, token)?,
            "<<" => return Err(ParseError::Unsupported("here-documents")),
            "<>" => return Err(ParseError::Unsupported("'<>' redirections")),
            ";;" => return Err(ParseError::Unsupported("case statements")),
            "(" => return Err(ParseError::Unsupported("subshells")),
            _ => match redirection_parts(op) {
                Some((number, bare)) => self.parse_redirection(b, token, number, bare)?,
                None => return Err(unexpected(token)),
            },
        }
        Ok(())
    }

    fn parse_redirection(
        &mut self,
        b: &mut ListBuilder,
        op_token: &'a Token,
        number: Option<&str>,
        bare: &str,
    ) -> Result<(), ParseError> {
        let op = op_token.lexeme.as_str();
        let fd: RawFd = match number {
            Some(n) => n
                .parse()
                .map_err(|_| ParseError::Syntax(format!("bad file descriptor in '{op}'")))?,
            None if bare.starts_with('<') => 0,
            None => 1,
        };

        self.pos += 1;
        let target = match self.peek() {
            None => {
                return Err(ParseError::Syntax(format!(
                    "EOF after a redirection operator '{op}'"
                )));
            }
            Some(t) if !t.is_word() => {
                return Err(ParseError::Syntax(format!(
                    "operator or newline after a redirection operator '{op}' (expected a word)"
                )));
            }
            Some(t) => t,
        };
        self.pos += 1;

        let kind = match bare {
            "<" => RedirectKind::FileRead,
            ">" => RedirectKind::FileWrite,
            ">>" => RedirectKind::FileWriteAppend,
            _ => {
                let source_fd = target.lexeme.parse().map_err(|_| {
                    ParseError::Syntax(format!(
                        "file descriptor number expected after '{op}', got '{}'",
                        target.lexeme
                    ))
                })?;
                RedirectKind::Rewiring { source_fd }
            }
        };

        b.pending.touch(op_token);
        b.pending.touch(target);
        b.pending.push_redirection(Redirection {
            kind,
            fd,
            target: target.lexeme.clone(),
            token: Some(target.clone()),
        });
        b.dangling = None;
        Ok(())
    }

    fn parse_function_definition(&mut self, b: &mut ListBuilder, token: &'a Token) -> Result<(), ParseError> {
        let name = match b.pending.as_command() {
            Some(cmd) if b.pending.argv_len() == 1 && cmd.redirections.is_empty() => {
                match cmd.as_simple() {
                    Some(simple) if simple.assignments.is_empty() => simple.argv[0].clone(),
                    _ => return Err(unexpected(token)),
                }
            }
            _ => return Err(unexpected(token)),
        };
        if !is_name(&name) {
            return Err(ParseError::Syntax(format!("'{name}' is not a valid function name")));
        }

        self.pos += 1;
        self.skip_newlines();
        match self.peek() {
            Some(t) if t.is_word_spelled("{") => {
                self.pos += 1;
                let (body, end) = self.sub_parse(&["}"])?;
                debug!("parsed function definition '{name}'");
                b.pending.replace_kind(
                    CommandKind::FunctionDefinition {
                        name,
                        body: Rc::new(body),
                    },
                    Some(end),
                );
                Ok(())
            }
            Some(_) => Err(ParseError::Unsupported(
                "function definitions without a brace group body",
            )),
            None => Err(ParseError::Syntax(
                "function body expected, but got to the end of input".to_string(),
            )),
        }
    }

    fn parse_brace_group(&mut self, b: &mut ListBuilder, start: &'a Token) -> Result<(), ParseError> {
        self.pos += 1;
        let (body, end) = self.sub_parse(&["}"])?;
        b.dangling = None;
        b.pending.install(CommandKind::BraceGroup(body), start, Some(end))
    }

    fn parse_if(&mut self, b: &mut ListBuilder, start: &'a Token) -> Result<(), ParseError> {
        const AFTER_THEN: &[&str] = &["elif", "else", "fi"];

        self.pos += 1;
        let (condition, _) = self.sub_parse(&["then"])?;
        let (then, mut terminator) = self.sub_parse(AFTER_THEN)?;

        let mut elif = Vec::new();
        while terminator.lexeme == "elif" {
            let (cond, _) = self.sub_parse(&["then"])?;
            let (body, next) = self.sub_parse(AFTER_THEN)?;
            elif.push((cond, body));
            terminator = next;
        }

        let opt_else = if terminator.lexeme == "else" {
            let (body, fi) = self.sub_parse(&["fi"])?;
            terminator = fi;
            Some(body)
        } else {
            None
        };

        b.dangling = None;
        b.pending.install(
            CommandKind::If(IfCommand {
                condition,
                then,
                elif,
                opt_else,
            }),
            start,
            Some(terminator),
        )
    }

    fn parse_loop(&mut self, b: &mut ListBuilder, start: &'a Token, until: bool) -> Result<(), ParseError> {
        self.pos += 1;
        let (condition, _) = self.sub_parse(&["do"])?;
        let (body, end) = self.sub_parse(&["done"])?;
        let lp = LoopCommand { condition, body };
        let kind = if until {
            CommandKind::Until(lp)
        } else {
            CommandKind::While(lp)
        };
        b.dangling = None;
        b.pending.install(kind, start, Some(end))
    }

    fn parse_for(&mut self, b: &mut ListBuilder, start: &'a Token) -> Result<(), ParseError> {
        self.pos += 1;
        let var_name = match self.peek() {
            Some(t) if t.is_word() && is_name(&t.lexeme) => t.lexeme.clone(),
            Some(t) if t.is_word() => {
                return Err(ParseError::Syntax(format!(
                    "'{}' is not a valid loop variable name",
                    t.lexeme
                )));
            }
            Some(t) => return Err(unexpected(t)),
            None => {
                return Err(ParseError::Syntax(
                    "a variable name is expected after 'for'".to_string(),
                ));
            }
        };
        self.pos += 1;
        self.skip_newlines();

        // without an `in` clause the loop runs over the positional parameters
        let mut items = vec!["\"$@\"".to_string()];
        let mut item_tokens = Vec::new();
        match self.peek() {
            Some(t) if t.is_operator(";") => {
                self.pos += 1;
                self.skip_newlines();
            }
            Some(t) if t.is_word_spelled("in") => {
                self.pos += 1;
                items.clear();
                loop {
                    match self.peek() {
                        Some(t) if t.is_word() => {
                            items.push(t.lexeme.clone());
                            item_tokens.push(t.clone());
                            self.pos += 1;
                        }
                        Some(t) if t.is_operator(";") || t.is_operator("\n") => {
                            self.pos += 1;
                            break;
                        }
                        Some(t) => return Err(unexpected(t)),
                        None => return Err(expected_at_end(&["do"])),
                    }
                }
                self.skip_newlines();
            }
            _ => {}
        }

        let (body, end) = match self.peek() {
            Some(t) if t.is_word_spelled("do") => {
                self.pos += 1;
                self.sub_parse(&["done"])?
            }
            Some(t) if t.is_word_spelled("{") => {
                self.pos += 1;
                self.sub_parse(&["}"])?
            }
            Some(t) => {
                return Err(ParseError::Syntax(format!(
                    "'do' expected, but got '{}'",
                    t.lexeme
                )));
            }
            None => return Err(expected_at_end(&["do"])),
        };

        b.dangling = None;
        b.pending.install(
            CommandKind::For(ForCommand {
                var_name,
                items,
                item_tokens,
                body,
            }),
            start,
            Some(end),
        )
    }
}

// Top-down recursive descent parser
impl<'a> Parser for DefaultParser<'a> {
    fn parse(&mut self) -> Result<CommandList, ParseError> {
        let (list, consumed, _) = self.parse_until(&[])?;
        debug!("parsed {} list items from {consumed} tokens", list.items.len());
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("a=b"), Some(("a", "b")));
        assert_eq!(split_assignment("a="), Some(("a", "")));
        assert_eq!(split_assignment("9x=1"), Some(("9x", "1")));
        assert_eq!(split_assignment("a=b=c"), Some(("a", "b=c")));
        assert_eq!(split_assignment("=b"), None);
        assert_eq!(split_assignment("a.b=c"), None);
        assert_eq!(split_assignment("'a'=b"), None);
        assert_eq!(split_assignment("ab"), None);
    }

    #[test]
    fn test_is_name() {
        assert!(is_name("x"));
        assert!(is_name("_a1"));
        assert!(!is_name("1a"));
        assert!(!is_name(""));
        assert!(!is_name("a-b"));
    }

    #[test]
    fn test_redirection_parts() {
        assert_eq!(redirection_parts(">"), Some((None, ">")));
        assert_eq!(redirection_parts("2>>"), Some((Some("2"), ">>")));
        assert_eq!(redirection_parts("0<&"), Some((Some("0"), "<&")));
        assert_eq!(redirection_parts("<<"), None);
        assert_eq!(redirection_parts("|"), None);
    }

    #[test]
    fn test_sub_parse_reports_consumption() {
        let tokens = crate::lexer::tokenize("a; b; } c").unwrap();
        let mut parser = DefaultParser::new(&tokens);
        let (list, consumed, terminator) = parser.parse_until(&["}"]).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(consumed, 5);
        assert_eq!(terminator.map(|t| t.lexeme.as_str()), Some("}"));
        assert_eq!(list.items[0].0.items[0].0.commands[0].as_simple().unwrap().argv, vec!["a"]);
    }
}

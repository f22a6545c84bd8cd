use glob::Pattern;
use log::trace;

use super::{ExpandError, ExpansionContext, pathname};
use crate::lexer::{LexError, Lexer, LexerOptions};
use crate::parser::default::is_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathnameExpansion {
    Always,
    Never,
    OnlyIfSingleResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Tilde, parameter and command substitution. Without them only
    /// quote removal happens.
    pub common_expansions: bool,
    pub field_splitting: bool,
    pub pathname_expansion: PathnameExpansion,
    /// `"$@"` gives one field per positional parameter instead of one
    /// space-joined field.
    pub variable_at_as_multiple_fields: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self::argv()
    }
}

impl ExpandOptions {
    pub fn argv() -> Self {
        ExpandOptions {
            common_expansions: true,
            field_splitting: true,
            pathname_expansion: PathnameExpansion::Always,
            variable_at_as_multiple_fields: true,
        }
    }

    pub fn assignment() -> Self {
        ExpandOptions {
            common_expansions: true,
            field_splitting: false,
            pathname_expansion: PathnameExpansion::Never,
            variable_at_as_multiple_fields: false,
        }
    }

    pub fn redirection() -> Self {
        ExpandOptions {
            common_expansions: true,
            field_splitting: true,
            pathname_expansion: PathnameExpansion::OnlyIfSingleResult,
            variable_at_as_multiple_fields: false,
        }
    }

    pub fn quote_removal() -> Self {
        ExpandOptions {
            common_expansions: false,
            field_splitting: false,
            pathname_expansion: PathnameExpansion::Never,
            variable_at_as_multiple_fields: false,
        }
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn escape_char(c: char) -> String {
    let mut buf = [0u8; 4];
    Pattern::escape(c.encode_utf8(&mut buf))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Free,
    Single,
    Double,
}

#[derive(Debug, Default)]
struct Field {
    text: String,
    // glob pattern of `text` with everything but unquoted `*`/`?` escaped
    pattern: String,
    has_glob: bool,
}

/// Collects output fields for one word.
#[derive(Debug)]
struct FieldBuilder {
    fields: Vec<Field>,
    current: Field,
    // an empty current field vanishes instead of becoming ""
    can_collapse: bool,
}

impl FieldBuilder {
    fn new() -> Self {
        FieldBuilder {
            fields: Vec::new(),
            current: Field::default(),
            can_collapse: true,
        }
    }

    fn push_literal(&mut self, c: char) {
        self.current.text.push(c);
        if c == '*' || c == '?' {
            self.current.has_glob = true;
            self.current.pattern.push(c);
        } else {
            self.current.pattern.push_str(&escape_char(c));
        }
    }

    fn push_quoted(&mut self, c: char) {
        self.current.text.push(c);
        self.current.pattern.push_str(&escape_char(c));
    }

    fn push_quoted_str(&mut self, s: &str) {
        for c in s.chars() {
            self.push_quoted(c);
        }
    }

    /// Appends an unquoted expansion result, breaking fields on blanks.
    fn push_split(&mut self, s: &str) {
        for c in s.chars() {
            if is_blank(c) {
                self.delimit();
            } else {
                self.push_quoted(c);
            }
        }
    }

    fn delimit(&mut self) {
        let field = std::mem::take(&mut self.current);
        if !field.text.is_empty() || !self.can_collapse {
            self.fields.push(field);
        }
        self.can_collapse = true;
    }

    /// Ends the current field even if it is empty.
    fn force_delimit(&mut self) {
        self.fields.push(std::mem::take(&mut self.current));
        self.can_collapse = true;
    }
}

/// Bookkeeping for one double-quoted region, used to let `"$@"` with no
/// positional parameters vanish like an unquoted empty expansion.
#[derive(Debug, Clone, Copy, Default)]
struct DoubleQuoted {
    saved_can_collapse: bool,
    only_at: bool,
    had_at: bool,
    at_had_params: bool,
}

/// Expands one raw word into fields.
pub struct WordExpander<'c, C: ExpansionContext + ?Sized> {
    ctx: &'c mut C,
    options: ExpandOptions,
}

impl<'c, C: ExpansionContext + ?Sized> WordExpander<'c, C> {
    pub fn new(ctx: &'c mut C, options: ExpandOptions) -> Self {
        WordExpander { ctx, options }
    }

    pub fn expand(&mut self, word: &str) -> Result<Vec<String>, ExpandError> {
        let mut out = FieldBuilder::new();
        self.scan(word, &mut out)?;
        out.delimit();
        let fields = self.expand_pathnames(out.fields);
        trace!("expanded {word:?} into {fields:?}");
        Ok(fields)
    }

    /// Expands and joins the fields with single spaces.
    pub fn expand_joined(&mut self, word: &str) -> Result<String, ExpandError> {
        Ok(self.expand(word)?.join(" "))
    }

    /// Expands a word that has to stay exactly one field.
    pub fn expand_single(&mut self, word: &str) -> Result<String, ExpandError> {
        let mut fields = self.expand(word)?;
        if fields.len() != 1 {
            return Err(ExpandError::AmbiguousRedirect(word.to_string()));
        }
        Ok(fields.remove(0))
    }

    fn scan(&mut self, word: &str, out: &mut FieldBuilder) -> Result<(), ExpandError> {
        let common = self.options.common_expansions;
        let mut quoting = Quoting::Free;
        let mut dq = DoubleQuoted::default();
        let mut i = 0;

        while let Some(c) = word[i..].chars().next() {
            let next_i = i + c.len_utf8();
            match quoting {
                Quoting::Single => {
                    if c == '\'' {
                        quoting = Quoting::Free;
                    } else {
                        out.push_quoted(c);
                    }
                    i = next_i;
                }
                Quoting::Double => match c {
                    '"' => {
                        quoting = Quoting::Free;
                        if dq.only_at && dq.had_at && !dq.at_had_params {
                            out.can_collapse = dq.saved_can_collapse;
                        }
                        i = next_i;
                    }
                    '\\' => {
                        dq.only_at = false;
                        match word[next_i..].chars().next() {
                            Some('\n') => i = next_i + 1,
                            Some(e @ ('$' | '`' | '"' | '\\')) => {
                                out.push_quoted(e);
                                i = next_i + 1;
                            }
                            _ => {
                                out.push_quoted('\\');
                                i = next_i;
                            }
                        }
                    }
                    '$' if common => i = self.expand_dollar(word, i, Some(&mut dq), out)?,
                    '`' if common => {
                        dq.only_at = false;
                        i = self.expand_backtick(word, i, true, out)?;
                    }
                    _ => {
                        dq.only_at = false;
                        out.push_quoted(c);
                        i = next_i;
                    }
                },
                Quoting::Free => match c {
                    '\'' => {
                        quoting = Quoting::Single;
                        out.can_collapse = false;
                        i = next_i;
                    }
                    '"' => {
                        quoting = Quoting::Double;
                        dq = DoubleQuoted {
                            saved_can_collapse: out.can_collapse,
                            only_at: true,
                            ..Default::default()
                        };
                        out.can_collapse = false;
                        i = next_i;
                    }
                    '\\' => match word[next_i..].chars().next() {
                        Some(e) => {
                            out.push_quoted(e);
                            i = next_i + e.len_utf8();
                        }
                        None => {
                            out.push_quoted('\\');
                            i = next_i;
                        }
                    },
                    '$' if common => i = self.expand_dollar(word, i, None, out)?,
                    '`' if common => i = self.expand_backtick(word, i, false, out)?,
                    '~' if common && self.tilde_allowed_at(word, i) => i = self.expand_tilde(word, i, out),
                    c if is_blank(c) && self.options.field_splitting => {
                        out.delimit();
                        i = next_i;
                    }
                    c => {
                        out.push_literal(c);
                        i = next_i;
                    }
                },
            }
        }
        Ok(())
    }

    /// A tilde prefix starts a word, or follows `:` in an assignment value.
    fn tilde_allowed_at(&self, word: &str, i: usize) -> bool {
        i == 0 || (!self.options.field_splitting && word[..i].ends_with(':'))
    }

    fn expand_tilde(&mut self, word: &str, i: usize, out: &mut FieldBuilder) -> usize {
        let rest = &word[i + 1..];
        let stop_at_colon = !self.options.field_splitting;
        let len = rest
            .find(|c| c == '/' || (stop_at_colon && c == ':'))
            .unwrap_or(rest.len());
        let user = &rest[..len];
        if user.chars().any(|c| matches!(c, '\'' | '"' | '\\' | '$' | '`')) {
            out.push_literal('~');
            return i + 1;
        }
        let home = if user.is_empty() {
            self.ctx.get_variable("HOME")
        } else {
            self.ctx.home_dir_of(user)
        };
        match home {
            Some(home) => {
                out.push_quoted_str(&home);
                i + 1 + len
            }
            // unknown users keep the literal text
            None => {
                out.push_literal('~');
                i + 1
            }
        }
    }

    /// Handles the `$` at `word[i]`; returns the index after the expansion.
    fn expand_dollar(
        &mut self,
        word: &str,
        i: usize,
        dq: Option<&mut DoubleQuoted>,
        out: &mut FieldBuilder,
    ) -> Result<usize, ExpandError> {
        let start = i + 1;
        let rest = &word[start..];
        match rest.chars().next() {
            Some('{') => {
                let end = find_closing(word, start + 1, LexerOptions::parameter_expansion(true))?;
                let inner = &word[start + 1..end - 1];
                self.expand_braced(inner, dq, out)?;
                Ok(end)
            }
            Some('(') => {
                if rest.starts_with("((") {
                    return Err(ExpandError::ArithmeticUnsupported);
                }
                let end = find_closing(word, start + 1, LexerOptions::command_substitution(true))?;
                let program = &word[start + 1..end - 1];
                let quoted = mark_not_only_at(dq);
                self.substitute_command(program, quoted, out)?;
                Ok(end)
            }
            Some(c) if c.is_ascii_digit() || "@*#?-$!".contains(c) => {
                self.expand_parameter(&c.to_string(), dq, out);
                Ok(start + c.len_utf8())
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                self.expand_parameter(&rest[..len], dq, out);
                Ok(start + len)
            }
            _ => {
                if mark_not_only_at(dq) {
                    out.push_quoted('$');
                } else {
                    out.push_literal('$');
                }
                Ok(start)
            }
        }
    }

    fn expand_parameter(&mut self, name: &str, dq: Option<&mut DoubleQuoted>, out: &mut FieldBuilder) {
        match dq {
            Some(dq) if name == "@" && self.options.variable_at_as_multiple_fields => {
                let params = self.ctx.positional_params();
                dq.had_at = true;
                dq.at_had_params |= !params.is_empty();
                for (n, param) in params.iter().enumerate() {
                    if n > 0 {
                        out.force_delimit();
                        out.can_collapse = false;
                    }
                    out.push_quoted_str(param);
                }
            }
            dq => {
                let quoted = mark_not_only_at(dq);
                let value = self.ctx.get_variable(name).unwrap_or_default();
                self.insert_value(&value, quoted, out);
            }
        }
    }

    fn insert_value(&self, value: &str, quoted: bool, out: &mut FieldBuilder) {
        if quoted || !self.options.field_splitting {
            out.push_quoted_str(value);
        } else {
            out.push_split(value);
        }
    }

    /// `${...}` with `inner` being the text between the braces.
    fn expand_braced(
        &mut self,
        inner: &str,
        dq: Option<&mut DoubleQuoted>,
        out: &mut FieldBuilder,
    ) -> Result<(), ExpandError> {
        if let Some(name) = inner.strip_prefix('#').filter(|n| !n.is_empty()) {
            if !is_parameter_name(name) {
                return Err(ExpandError::BadSubstitution(format!("${{{inner}}}")));
            }
            let len = self.ctx.get_variable(name).unwrap_or_default().chars().count();
            let quoted = mark_not_only_at(dq);
            self.insert_value(&len.to_string(), quoted, out);
            return Ok(());
        }

        let name_len = parameter_name_len(inner);
        if name_len == 0 {
            return Err(ExpandError::BadSubstitution(format!("${{{inner}}}")));
        }
        let (name, modifier) = inner.split_at(name_len);
        if modifier.is_empty() {
            self.expand_parameter(name, dq, out);
            return Ok(());
        }

        let (colon, modifier) = match modifier.strip_prefix(':') {
            Some(m) => (true, m),
            None => (false, modifier),
        };
        let mut chars = modifier.chars();
        let op = chars.next();
        let argument = chars.as_str();

        let value = self.ctx.get_variable(name);
        let use_argument = match &value {
            None => true,
            Some(v) => colon && v.is_empty(),
        };
        let value = value.unwrap_or_default();

        let result = match op {
            Some('-') if use_argument => self.expand_modifier_word(argument)?,
            Some('=') if use_argument => {
                if !is_name(name) {
                    return Err(ExpandError::BadSubstitution(format!("${{{inner}}}")));
                }
                let assigned = self.expand_modifier_word(argument)?;
                self.ctx.set_variable(name, &assigned);
                assigned
            }
            Some('+') if use_argument => String::new(),
            Some('+') => self.expand_modifier_word(argument)?,
            Some('?') if use_argument => {
                let message = if argument.is_empty() {
                    "parameter null or not set".to_string()
                } else {
                    self.expand_modifier_word(argument)?
                };
                return Err(ExpandError::ParameterError {
                    name: name.to_string(),
                    message,
                });
            }
            Some('-' | '=' | '?') => value,
            _ => return Err(ExpandError::BadSubstitution(format!("${{{inner}}}"))),
        };

        let quoted = mark_not_only_at(dq);
        self.insert_value(&result, quoted, out);
        Ok(())
    }

    fn expand_modifier_word(&mut self, argument: &str) -> Result<String, ExpandError> {
        WordExpander::new(&mut *self.ctx, ExpandOptions::assignment()).expand_joined(argument)
    }

    fn expand_backtick(
        &mut self,
        word: &str,
        i: usize,
        quoted: bool,
        out: &mut FieldBuilder,
    ) -> Result<usize, ExpandError> {
        let mut program = String::new();
        let mut chars = word[i + 1..].char_indices();
        while let Some((off, c)) = chars.next() {
            match c {
                '`' => {
                    self.substitute_command(&program, quoted, out)?;
                    return Ok(i + 1 + off + 1);
                }
                '\\' => match chars.next() {
                    Some((_, e @ ('$' | '`' | '\\'))) => program.push(e),
                    Some((_, e)) => {
                        program.push('\\');
                        program.push(e);
                    }
                    None => program.push('\\'),
                },
                _ => program.push(c),
            }
        }
        Err(LexError::UnterminatedSubstitution('`', i).into())
    }

    fn substitute_command(&mut self, program: &str, quoted: bool, out: &mut FieldBuilder) -> Result<(), ExpandError> {
        let output = self.ctx.command_substitution(program)?;
        let output = output.trim_end_matches('\n');
        self.insert_value(output, quoted, out);
        Ok(())
    }

    fn expand_pathnames(&self, fields: Vec<Field>) -> Vec<String> {
        let mode = self.options.pathname_expansion;
        let mut result = Vec::with_capacity(fields.len());
        for field in fields {
            if field.has_glob && mode != PathnameExpansion::Never {
                let matches = pathname::expand(&field.pattern);
                let accept = match mode {
                    PathnameExpansion::Always => !matches.is_empty(),
                    PathnameExpansion::OnlyIfSingleResult => matches.len() == 1,
                    PathnameExpansion::Never => false,
                };
                if accept {
                    result.extend(matches);
                    continue;
                }
            }
            result.push(field.text);
        }
        result
    }
}

/// Records that a double-quoted region holds more than `$@`; returns
/// whether the expansion is quoted.
fn mark_not_only_at(dq: Option<&mut DoubleQuoted>) -> bool {
    match dq {
        Some(dq) => {
            dq.only_at = false;
            true
        }
        None => false,
    }
}

/// Byte index just past the delimiter closing the region opened right
/// before `from`.
fn find_closing(word: &str, from: usize, options: LexerOptions) -> Result<usize, ExpandError> {
    let mut lexer = Lexer::resume(word, from, 0, options);
    lexer.tokenize_all()?;
    Ok(lexer.position().0)
}

fn is_parameter_name(name: &str) -> bool {
    parameter_name_len(name) == name.len()
}

/// Length of the parameter name at the start of `s` inside `${...}`.
fn parameter_name_len(s: &str) -> usize {
    match s.chars().next() {
        Some(c) if "@*#?-$!".contains(c) => 1,
        Some(c) if c.is_ascii_digit() => s.bytes().take_while(u8::is_ascii_digit).count(),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => s
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(s.len()),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::test_support::FakeContext;
    use assert_matches::assert_matches;
    use serial_test::serial;
    use std::fs::File;

    fn expand_with(ctx: &mut FakeContext, options: ExpandOptions, word: &str) -> Vec<String> {
        WordExpander::new(ctx, options).expand(word).unwrap()
    }

    fn argv(ctx: &mut FakeContext, word: &str) -> Vec<String> {
        expand_with(ctx, ExpandOptions::argv(), word)
    }

    fn params(list: &[&str]) -> FakeContext {
        FakeContext {
            params: list.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_literal_words_are_unchanged() {
        let mut ctx = FakeContext::default();
        for word in ["echo", "hello-world", "a=b", "x.y:z", "/usr/bin/env"] {
            assert_eq!(argv(&mut ctx, word), vec![word]);
        }
    }

    #[test]
    fn test_quote_removal() {
        let mut ctx = FakeContext::default();
        assert_eq!(argv(&mut ctx, r#"'a b'"c d"e\ f"#), vec!["a bc de f"]);
        assert_eq!(argv(&mut ctx, r#""a\"b\$c\d""#), vec![r#"a"b$c\d"#]);
        assert_eq!(argv(&mut ctx, r"'\n'"), vec![r"\n"]);
    }

    #[test]
    fn test_quoted_empty_string_is_one_field() {
        let mut ctx = FakeContext::default();
        assert_eq!(argv(&mut ctx, "''"), vec![""]);
        assert_eq!(argv(&mut ctx, "\"\""), vec![""]);
        assert_eq!(argv(&mut ctx, "\"$unset\""), vec![""]);
    }

    #[test]
    fn test_empty_unquoted_expansion_vanishes() {
        let mut ctx = FakeContext::with_vars(&[("blank", "   ")]);
        assert!(argv(&mut ctx, "$unset").is_empty());
        assert!(argv(&mut ctx, "$blank").is_empty());
        assert!(argv(&mut ctx, "${unset}$unset").is_empty());
    }

    #[test]
    fn test_variables() {
        let mut ctx = FakeContext::with_vars(&[("name", "world"), ("a_1", "x")]);
        assert_eq!(argv(&mut ctx, "hello-$name!"), vec!["hello-world!"]);
        assert_eq!(argv(&mut ctx, "${name}s"), vec!["worlds"]);
        assert_eq!(argv(&mut ctx, "$a_1.$"), vec!["x.$"]);
        assert_eq!(argv(&mut ctx, "'$name'"), vec!["$name"]);
    }

    #[test]
    fn test_field_splitting() {
        let mut ctx = FakeContext::with_vars(&[("v", "  a  b\tc  ")]);
        assert_eq!(argv(&mut ctx, "$v"), vec!["a", "b", "c"]);
        assert_eq!(argv(&mut ctx, "x${v}y"), vec!["x", "a", "b", "c", "y"]);
        assert_eq!(argv(&mut ctx, "\"$v\""), vec!["  a  b\tc  "]);
        let assignment = expand_with(&mut ctx, ExpandOptions::assignment(), "$v");
        assert_eq!(assignment, vec!["  a  b\tc  "]);
    }

    #[test]
    fn test_quoted_at_gives_one_field_per_parameter() {
        let mut ctx = params(&["foo", "bar baz"]);
        assert_eq!(argv(&mut ctx, "\"$@\""), vec!["foo", "bar baz"]);
        assert_eq!(argv(&mut ctx, "x\"$@\"y"), vec!["xfoo", "bar bazy"]);
        assert_eq!(argv(&mut ctx, "$@"), vec!["foo", "bar", "baz"]);
        assert_eq!(argv(&mut ctx, "\"$*\""), vec!["foo bar baz"]);
        assert_eq!(argv(&mut ctx, "\"${@}\""), vec!["foo", "bar baz"]);
    }

    #[test]
    fn test_quoted_at_with_empty_parameters() {
        let mut ctx = params(&["", "a"]);
        assert_eq!(argv(&mut ctx, "\"$@\""), vec!["", "a"]);
    }

    #[test]
    fn test_quoted_at_without_parameters_vanishes() {
        let mut ctx = params(&[]);
        assert!(argv(&mut ctx, "\"$@\"").is_empty());
        assert!(argv(&mut ctx, "\"$@\"\"$@\"").is_empty());
        assert_eq!(argv(&mut ctx, "\"$@\"''"), vec![""]);
        assert_eq!(argv(&mut ctx, "x\"$@\""), vec!["x"]);
        assert_eq!(argv(&mut ctx, "\"$@x\""), vec!["x"]);
        assert_eq!(argv(&mut ctx, "\"x$@\""), vec!["x"]);
        assert_eq!(argv(&mut ctx, "\"$@\"\"\""), vec![""]);
    }

    #[test]
    fn test_at_in_assignment_context_is_joined() {
        let mut ctx = params(&["a", "b"]);
        let mut expander = WordExpander::new(&mut ctx, ExpandOptions::assignment());
        assert_eq!(expander.expand_joined("\"$@\"").unwrap(), "a b");
        assert_eq!(expander.expand_joined("\"$*\"").unwrap(), "a b");
    }

    #[test]
    fn test_special_parameters() {
        let mut ctx = params(&["one", "two"]);
        ctx.vars.insert("?".into(), "1".into());
        assert_eq!(argv(&mut ctx, "$#:$1:$2:$3:$?"), vec!["2:one:two::1"]);
        assert_eq!(argv(&mut ctx, "$12"), vec!["one2"]);
    }

    #[test]
    fn test_parameter_modifiers() {
        let mut ctx = FakeContext::with_vars(&[("set", "v"), ("null", "")]);
        assert_eq!(argv(&mut ctx, "${unset-d}"), vec!["d"]);
        assert_eq!(argv(&mut ctx, "${null-d}"), Vec::<String>::new());
        assert_eq!(argv(&mut ctx, "${null:-d}"), vec!["d"]);
        assert_eq!(argv(&mut ctx, "${set:-d}"), vec!["v"]);
        assert_eq!(argv(&mut ctx, "${set+alt}"), vec!["alt"]);
        assert_eq!(argv(&mut ctx, "${null:+alt}"), Vec::<String>::new());
        assert_eq!(argv(&mut ctx, "${unset:-a b}"), vec!["a", "b"]);
        assert_eq!(argv(&mut ctx, "\"${unset:-a  b}\""), vec!["a  b"]);
        assert_eq!(argv(&mut ctx, "${unset:-$set}"), vec!["v"]);
        assert_eq!(argv(&mut ctx, "${#set}${#unset}"), vec!["10"]);
    }

    #[test]
    fn test_assign_default() {
        let mut ctx = FakeContext::default();
        assert_eq!(argv(&mut ctx, "${x:=fallback}"), vec!["fallback"]);
        assert_eq!(ctx.vars.get("x").map(String::as_str), Some("fallback"));
        let err = WordExpander::new(&mut ctx, ExpandOptions::argv()).expand("${1:=x}");
        assert_matches!(err, Err(ExpandError::BadSubstitution(_)));
    }

    #[test]
    fn test_error_if_unset() {
        let mut ctx = FakeContext::default();
        let err = WordExpander::new(&mut ctx, ExpandOptions::argv()).expand("${x?is required}");
        assert_matches!(err, Err(ExpandError::ParameterError { name, message }) if name == "x" && message == "is required");
        let err = WordExpander::new(&mut ctx, ExpandOptions::argv()).expand("${x:?}");
        assert_matches!(err, Err(ExpandError::ParameterError { .. }));
    }

    #[test]
    fn test_bad_substitutions() {
        let mut ctx = FakeContext::default();
        for word in ["${}", "${a%b}", "${!}x", "${ a}"] {
            let result = WordExpander::new(&mut ctx, ExpandOptions::argv()).expand(word);
            if word == "${!}x" {
                assert_eq!(result.unwrap(), vec!["x"]);
            } else {
                assert_matches!(result, Err(ExpandError::BadSubstitution(_)), "{word}");
            }
        }
        let result = WordExpander::new(&mut ctx, ExpandOptions::argv()).expand("$((1+2))");
        assert_matches!(result, Err(ExpandError::ArithmeticUnsupported));
    }

    #[test]
    fn test_command_substitution() {
        let mut ctx = FakeContext::default();
        ctx.outputs.insert("echo a b".into(), "a b\n\n".into());
        ctx.outputs.insert("echo (x)".into(), "x\n".into());
        assert_eq!(argv(&mut ctx, "$(echo a b)"), vec!["a", "b"]);
        assert_eq!(argv(&mut ctx, "\"$(echo a b)\""), vec!["a b"]);
        assert_eq!(argv(&mut ctx, "<$(echo (x))>"), vec!["<x>"]);
        assert_eq!(argv(&mut ctx, "`echo a b`"), vec!["a", "b"]);
        assert_eq!(ctx.programs_run, vec!["echo a b", "echo a b", "echo (x)", "echo a b"]);
    }

    #[test]
    fn test_backtick_escapes() {
        let mut ctx = FakeContext::default();
        ctx.outputs.insert("echo $x `y` \\n".into(), "ok".into());
        assert_eq!(argv(&mut ctx, r"`echo \$x \`y\` \n`"), vec!["ok"]);
    }

    #[test]
    fn test_command_substitution_failure_propagates() {
        let mut ctx = FakeContext::default();
        let result = WordExpander::new(&mut ctx, ExpandOptions::argv()).expand("$(missing)");
        assert_matches!(result, Err(ExpandError::CommandSubstitution(_)));
    }

    #[test]
    fn test_tilde() {
        let mut ctx = FakeContext::with_vars(&[("HOME", "/home/me")]);
        assert_eq!(argv(&mut ctx, "~"), vec!["/home/me"]);
        assert_eq!(argv(&mut ctx, "~/src"), vec!["/home/me/src"]);
        assert_eq!(argv(&mut ctx, "~alice/x"), vec!["/home/alice/x"]);
        assert_eq!(argv(&mut ctx, "~nobody-here/x"), vec!["~nobody-here/x"]);
        assert_eq!(argv(&mut ctx, "'~'"), vec!["~"]);
        assert_eq!(argv(&mut ctx, "a~"), vec!["a~"]);
        assert_eq!(argv(&mut ctx, "a:~"), vec!["a:~"]);
        let assignment = expand_with(&mut ctx, ExpandOptions::assignment(), "/bin:~/bin:~alice");
        assert_eq!(assignment, vec!["/bin:/home/me/bin:/home/alice"]);
    }

    #[test]
    fn test_quote_removal_only() {
        let mut ctx = FakeContext::with_vars(&[("x", "1")]);
        let fields = expand_with(&mut ctx, ExpandOptions::quote_removal(), "'a'$x~\"b\"");
        assert_eq!(fields, vec!["a$x~b"]);
    }

    #[test]
    fn test_pathname_expansion_with_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "star*.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let base = dir.path().to_string_lossy().into_owned();
        let mut ctx = FakeContext::with_vars(&[("d", base.as_str())]);

        assert_eq!(
            argv(&mut ctx, &format!("{base}/?.txt")),
            vec![format!("{base}/a.txt"), format!("{base}/b.txt")]
        );
        // quoted or escaped metacharacters match literally
        assert_eq!(argv(&mut ctx, &format!("'{base}/star*'.txt")), vec![format!("{base}/star*.txt")]);
        assert_eq!(argv(&mut ctx, &format!("{base}/\\?.txt")), vec![format!("{base}/?.txt")]);
        assert_eq!(argv(&mut ctx, &format!("\"{base}\"/s*")), vec![format!("{base}/star*.txt")]);
        // expansion results are not patterns
        ctx.vars.insert("pat".into(), "*".into());
        assert_eq!(argv(&mut ctx, "$d/$pat"), vec![format!("{base}/*")]);
        // no match keeps the word
        assert_eq!(argv(&mut ctx, &format!("{base}/*.md")), vec![format!("{base}/*.md")]);

        let never = ExpandOptions {
            pathname_expansion: PathnameExpansion::Never,
            ..ExpandOptions::argv()
        };
        assert_eq!(expand_with(&mut ctx, never, &format!("{base}/*.txt")), vec![format!("{base}/*.txt")]);

        let redirect = ExpandOptions::redirection();
        assert_eq!(expand_with(&mut ctx, redirect, &format!("{base}/a*")), vec![format!("{base}/a.txt")]);
        assert_eq!(expand_with(&mut ctx, redirect, &format!("{base}/?.txt")), vec![format!("{base}/?.txt")]);
    }

    #[test]
    #[serial]
    fn test_pathname_expansion_in_current_directory() {
        let dir = tempfile::tempdir().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let mut ctx = FakeContext::default();
        let empty = argv(&mut ctx, "*");
        File::create("a.txt").unwrap();
        File::create("b.txt").unwrap();
        let two = argv(&mut ctx, "*");

        std::env::set_current_dir(previous).unwrap();
        assert_eq!(empty, vec!["*"]);
        assert_eq!(two, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_expand_single() {
        let mut ctx = FakeContext::with_vars(&[("two", "a b")]);
        let mut expander = WordExpander::new(&mut ctx, ExpandOptions::redirection());
        assert_eq!(expander.expand_single("out.txt").unwrap(), "out.txt");
        assert_matches!(expander.expand_single("$two"), Err(ExpandError::AmbiguousRedirect(w)) if w == "$two");
        assert_matches!(expander.expand_single("$unset"), Err(ExpandError::AmbiguousRedirect(_)));
        assert_eq!(expander.expand_single("\"$two\"").unwrap(), "a b");
    }
}

use crate::error::{QueryError, Result, Span};
use logos::Logos;

/// Source form of a regex literal: `~r/pattern/flags`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexSource {
    pub pattern: String,
    pub flags: String,
}

fn regex_source(lex: &mut logos::Lexer<Token>) -> Option<RegexSource> {
    let body = &lex.slice()[3..];
    let close = body.rfind('/')?;
    Some(RegexSource {
        pattern: body[..close].replace("\\/", "/"),
        flags: body[close + 1..].to_string(),
    })
}

fn double_quoted(lex: &mut logos::Lexer<Token>) -> Option<String> {
    serde_json::from_str(lex.slice()).ok()
}

fn single_quoted(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let s = lex.slice();
    let mut out = String::with_capacity(s.len());
    let mut chars = s[1..s.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            other => out.push(other),
        }
    }
    Some(out)
}

/// Tokens of the query language
///
/// Whitespace and commas separate tokens; anything that is not a literal or a
/// reference form is a [`Token::Word`].
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f,]+")]
pub enum Token {
    #[regex(r"//[^\n]*", logos::skip, priority = 10)]
    Comment,

    // Delimiters
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Literals
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok(), priority = 3)]
    Int(i64),

    #[regex(
        r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|-?[0-9]+[eE][+-]?[0-9]+",
        |lex| lex.slice().parse::<f64>().ok(),
        priority = 3
    )]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, double_quoted)]
    #[regex(r#"'([^'\\]|\\.)*'"#, single_quoted)]
    Str(String),

    #[regex(r"~r/([^/\\\n]|\\.)*/[a-z]*", regex_source, priority = 3)]
    Regex(RegexSource),

    /// `~d|ISO-8601|`; empty means "now"
    #[regex(r"~d\|[^|\n]*\|", |lex| { let s = lex.slice(); s[3..s.len() - 1].to_string() }, priority = 3)]
    Date(String),

    /// `name:` inside a map literal
    #[regex(r"[A-Za-z_@][A-Za-z0-9_@\-]*:", |lex| { let s = lex.slice(); s[..s.len() - 1].to_string() }, priority = 3)]
    Key(String),

    // References
    #[regex(r"\$[A-Za-z_][A-Za-z0-9_\-]*", |lex| lex.slice()[1..].to_string(), priority = 3)]
    Ref(String),

    #[regex(r"\^[A-Za-z0-9_][A-Za-z0-9_\-]*", |lex| lex.slice()[1..].to_string(), priority = 3)]
    BackRef(String),

    /// `*name`, `**name`, `*$name`; keeps the stars
    #[regex(r"\*+[A-Za-z_$^@!/][^\s,\[\]{}\x22']*", |lex| lex.slice().to_string(), priority = 3)]
    Escaped(String),

    /// `/component/uri#pointer`
    #[regex(r"/[^\s,\[\]{}\x22'#]*#[^\s,\[\]{}\x22']*", |lex| lex.slice().to_string(), priority = 3)]
    AttrPath(String),

    #[regex(r"[^\s,\[\]{}\x22']+", |lex| lex.slice().to_string(), priority = 1)]
    Word(String),
}

impl Token {
    pub fn is_open(&self) -> bool {
        matches!(self, Token::LBracket | Token::LBrace)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Token::RBracket | Token::RBrace)
    }
}

/// A token with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

impl SpannedToken {
    pub fn new(token: Token, span: Span) -> Self {
        Self { token, span }
    }
}

/// Tokenize a whole program
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>> {
    let mut lex = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(token_result) = lex.next() {
        let span = Span::new(lex.span().start, lex.span().end);
        match token_result {
            Ok(token) => tokens.push(SpannedToken::new(token, span)),
            Err(_) => {
                return Err(QueryError::Lexer {
                    span,
                    message: format!("Invalid token: {}", &source[span.start..span.end]),
                });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_numbers_and_words() {
        let tokens = kinds("1 -2 3.5 1e3 + - swap");
        assert_eq!(tokens[0], Token::Int(1));
        assert_eq!(tokens[1], Token::Int(-2));
        assert_eq!(tokens[2], Token::Float(3.5));
        assert_eq!(tokens[3], Token::Float(1000.0));
        assert_eq!(tokens[4], Token::Word("+".into()));
        assert_eq!(tokens[5], Token::Word("-".into()));
        assert_eq!(tokens[6], Token::Word("swap".into()));
    }

    #[test]
    fn test_commas_and_comments() {
        let tokens = kinds("[1,2,3] // trailing\n4");
        assert_eq!(
            tokens,
            vec![
                Token::LBracket,
                Token::Int(1),
                Token::Int(2),
                Token::Int(3),
                Token::RBracket,
                Token::Int(4),
            ]
        );
    }

    #[test]
    fn test_strings() {
        let tokens = kinds(r#""say \"hi\"" 'it\'s' """#);
        assert_eq!(tokens[0], Token::Str("say \"hi\"".into()));
        assert_eq!(tokens[1], Token::Str("it's".into()));
        assert_eq!(tokens[2], Token::Str(String::new()));
    }

    #[test]
    fn test_literal_forms() {
        let tokens = kinds("~r/^get.*$/i ~d|2021-03-01| ~d|| true nil text:");
        assert_eq!(
            tokens[0],
            Token::Regex(RegexSource {
                pattern: "^get.*$".into(),
                flags: "i".into()
            })
        );
        assert_eq!(tokens[1], Token::Date("2021-03-01".into()));
        assert_eq!(tokens[2], Token::Date(String::new()));
        assert_eq!(tokens[3], Token::True);
        assert_eq!(tokens[4], Token::Nil);
        assert_eq!(tokens[5], Token::Key("text".into()));
    }

    #[test]
    fn test_references() {
        let tokens = kinds("$count ^total ^0 *name **name *$x /component/title#text /component/title @es !bf");
        assert_eq!(tokens[0], Token::Ref("count".into()));
        assert_eq!(tokens[1], Token::BackRef("total".into()));
        assert_eq!(tokens[2], Token::BackRef("0".into()));
        assert_eq!(tokens[3], Token::Escaped("*name".into()));
        assert_eq!(tokens[4], Token::Escaped("**name".into()));
        assert_eq!(tokens[5], Token::Escaped("*$x".into()));
        assert_eq!(tokens[6], Token::AttrPath("/component/title#text".into()));
        assert_eq!(tokens[7], Token::Word("/component/title".into()));
        assert_eq!(tokens[8], Token::Word("@es".into()));
        assert_eq!(tokens[9], Token::Word("!bf".into()));
    }

    #[test]
    fn test_star_alone_is_a_word() {
        assert_eq!(kinds("10 *"), vec![Token::Int(10), Token::Word("*".into())]);
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("[ 12 ]").unwrap();
        assert_eq!(tokens[1].span, Span::new(2, 4));
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let err = tokenize("\"open").unwrap_err();
        assert!(matches!(err, QueryError::Lexer { .. }));
    }

    proptest::proptest! {
        #[test]
        fn prop_integers_keep_their_spans(values in proptest::collection::vec(proptest::num::i64::ANY, 1..20)) {
            let source = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
            let tokens = tokenize(&source).unwrap();
            proptest::prop_assert_eq!(tokens.len(), values.len());
            for (token, value) in tokens.iter().zip(&values) {
                proptest::prop_assert_eq!(&token.token, &Token::Int(*value));
                proptest::prop_assert_eq!(&source[token.span.start..token.span.end], value.to_string());
            }
        }

        #[test]
        fn prop_plain_strings_unquote(text in "[a-z0-9 ]{0,24}") {
            let tokens = kinds(&format!("\"{}\"", text));
            proptest::prop_assert_eq!(tokens, vec![Token::Str(text)]);
        }
    }
}

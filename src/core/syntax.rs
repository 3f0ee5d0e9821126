//! BR-008: Textual form of expressions.
//!
//! Pipeline files write commands as text, e.g.
//! `analyze_data($method, data = "NIH")`. `parse_expr` reads that form and
//! `Display` writes it back canonically, so printed commands are stable
//! byte for byte.

use super::error::{BuildError, BuildResult};
use super::expr::{Arg, Expr, Literal};
use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{anychar, char, digit0, digit1, multispace0, none_of, one_of, satisfy},
    combinator::{all_consuming, cut, map, not, opt, recognize},
    error::ErrorKind,
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use std::fmt;

/// Parse a single expression.
pub fn parse_expr(text: &str) -> BuildResult<Expr> {
    match all_consuming(delimited(multispace0, expr, multispace0))(text) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(syntax_error(text, &e)),
        Err(nom::Err::Incomplete(_)) => Err(BuildError::Syntax {
            source_text: text.to_string(),
            offset: text.len(),
            message: "incomplete input".to_string(),
        }),
    }
}

fn syntax_error(text: &str, e: &nom::error::Error<&str>) -> BuildError {
    let message = match e.code {
        ErrorKind::Eof => "unexpected trailing input",
        _ if e.input.is_empty() => "unexpected end of input",
        _ => "unexpected character",
    };
    BuildError::Syntax {
        source_text: text.to_string(),
        offset: text.len() - e.input.len(),
        message: message.to_string(),
    }
}

// ============================================================================
// Internal Parsers
// ============================================================================

fn expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(char('$'), ident), |name| {
            Expr::Placeholder(name.to_string())
        }),
        map(string, |s| Expr::Literal(Literal::Str(s))),
        number,
        call_or_symbol,
    ))(input)
}

/// `[A-Za-z._][A-Za-z0-9._:]*`, except that `.5` is a number.
fn ident(input: &str) -> IResult<&str, &str> {
    let (input, _) = not(pair(char('.'), satisfy(|c| c.is_ascii_digit())))(input)?;
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_' || c == '.'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ':'),
    ))(input)
}

fn call_or_symbol(input: &str) -> IResult<&str, Expr> {
    let (input, name) = ident(input)?;
    let (input, args) = opt(preceded(multispace0, args))(input)?;
    let expr = match args {
        Some(args) => Expr::Call {
            func: name.to_string(),
            args,
        },
        None => match name {
            "TRUE" | "true" => Expr::Literal(Literal::Bool(true)),
            "FALSE" | "false" => Expr::Literal(Literal::Bool(false)),
            "NULL" | "null" => Expr::Literal(Literal::Null),
            _ => Expr::Symbol(name.to_string()),
        },
    };
    Ok((input, expr))
}

fn args(input: &str) -> IResult<&str, Vec<Arg>> {
    // past the opening paren the call must be well formed
    preceded(
        pair(char('('), multispace0),
        cut(terminated(
            separated_list0(delimited(multispace0, char(','), multispace0), arg),
            pair(multispace0, char(')')),
        )),
    )(input)
}

fn arg(input: &str) -> IResult<&str, Arg> {
    alt((named_arg, map(expr, Arg::positional)))(input)
}

fn named_arg(input: &str) -> IResult<&str, Arg> {
    let (input, name) = ident(input)?;
    let (input, _) = multispace0(input)?;
    // `==` is not an argument name
    let (input, _) = terminated(char('='), not(char('=')))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = expr(input)?;
    Ok((input, Arg::named(name, value)))
}

// ============================================================================
// Literals
// ============================================================================

fn string(input: &str) -> IResult<&str, String> {
    alt((quoted('"', "\\\""), quoted('\'', "\\'")))(input)
}

/// Quoted text with `\n`, `\t` and pass-through escapes.
fn quoted<'a>(
    quote: char,
    plain: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    delimited(
        char(quote),
        fold_many0(
            alt((
                none_of(plain),
                map(preceded(char('\\'), anychar), |esc| match esc {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                }),
            )),
            String::new,
            |mut out, c| {
                out.push(c);
                out
            },
        ),
        char(quote),
    )
}

fn number(input: &str) -> IResult<&str, Expr> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let malformed = |kind| nom::Err::Error(nom::error::Error::new(input, kind));
    if text.contains(['.', 'e', 'E']) {
        let x = text
            .parse::<f64>()
            .map_err(|_| malformed(ErrorKind::Float))?;
        return Ok((rest, Expr::Literal(Literal::Float(x))));
    }
    let n = text
        .parse::<i64>()
        .map_err(|_| malformed(ErrorKind::Digit))?;
    // R-style integer suffix
    let (rest, _) = opt(char('L'))(rest)?;
    Ok((rest, Expr::Literal(Literal::Int(n))))
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(true) => write!(f, "TRUE"),
            Self::Bool(false) => write!(f, "FALSE"),
            Self::Int(n) => write!(f, "{}", n),
            // Debug keeps a fractional part (`1.0`) so the text reads back as a float
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Str(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} = {}", name, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(l) => write!(f, "{}", l),
            Self::Symbol(s) => write!(f, "{}", s),
            Self::Placeholder(p) => write!(f, "${}", p),
            Self::Call { func, args } => {
                write!(f, "{}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_br008_parse_call_with_placeholders() {
        let e = parse_expr("analyze_data($method, $data_source)").unwrap();
        assert_eq!(
            e,
            Expr::call(
                "analyze_data",
                vec![Expr::placeholder("method"), Expr::placeholder("data_source")]
            )
        );
    }

    #[test]
    fn test_br008_parse_literals() {
        assert_eq!(parse_expr("\"NIH\"").unwrap(), Expr::lit("NIH"));
        assert_eq!(parse_expr("'NIH'").unwrap(), Expr::lit("NIH"));
        assert_eq!(parse_expr("42").unwrap(), Expr::lit(42i64));
        assert_eq!(parse_expr("42L").unwrap(), Expr::lit(42i64));
        assert_eq!(parse_expr("-1.5").unwrap(), Expr::lit(-1.5));
        assert_eq!(parse_expr(".5").unwrap(), Expr::lit(0.5));
        assert_eq!(parse_expr("TRUE").unwrap(), Expr::lit(true));
        assert_eq!(parse_expr("NULL").unwrap(), Expr::Literal(Literal::Null));
    }

    #[test]
    fn test_br008_parse_named_args() {
        let e = parse_expr("bind_rows(NIH = analysis_NIH, x)").unwrap();
        assert_eq!(
            e,
            Expr::Call {
                func: "bind_rows".to_string(),
                args: vec![
                    Arg::named("NIH", Expr::sym("analysis_NIH")),
                    Arg::positional(Expr::sym("x")),
                ],
            }
        );
    }

    #[test]
    fn test_br008_parse_dotted_and_namespaced() {
        let e = parse_expr("vctrs::vec_c($.x)").unwrap();
        assert_eq!(
            e,
            Expr::call("vctrs::vec_c", vec![Expr::placeholder(".x")])
        );
    }

    #[test]
    fn test_br008_parse_nested_and_empty_call() {
        let e = parse_expr("f(g(), h(a, \"b\"))").unwrap();
        assert_eq!(
            e,
            Expr::call(
                "f",
                vec![
                    Expr::call("g", vec![]),
                    Expr::call("h", vec![Expr::sym("a"), Expr::lit("b")])
                ]
            )
        );
    }

    #[test]
    fn test_br008_display_is_canonical() {
        let text = "f(a, b = \"q\\\"t\", 1.0, 2, TRUE, $col, g())";
        let e = parse_expr(text).unwrap();
        assert_eq!(e.to_string(), text);
        assert_eq!(parse_expr(&e.to_string()).unwrap(), e);
    }

    #[test]
    fn test_br008_display_normalizes_spacing() {
        let e = parse_expr("  f( a ,b=1 )  ").unwrap();
        assert_eq!(e.to_string(), "f(a, b = 1)");
    }

    #[test]
    fn test_br008_errors_report_offset() {
        let err = parse_expr("f(a, ").unwrap_err();
        assert!(matches!(err, BuildError::Syntax { .. }));
        let err = parse_expr("f(a) b").unwrap_err();
        match err {
            BuildError::Syntax { offset, message, .. } => {
                assert_eq!(offset, 5);
                assert!(message.contains("trailing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(parse_expr("\"open").is_err());
        assert!(parse_expr("99999999999999999999").is_err());
        assert!(parse_expr("$").is_err());
        assert!(parse_expr("").is_err());
    }

    #[test]
    fn test_br008_malformed_call_reports_position_inside() {
        match parse_expr("f(a b)").unwrap_err() {
            BuildError::Syntax { offset, message, .. } => {
                assert_eq!(offset, 4);
                assert_eq!(message, "unexpected character");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        match parse_expr("f(a, ").unwrap_err() {
            BuildError::Syntax { offset, .. } => assert_eq!(offset, 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_br008_comparison_is_not_a_named_arg() {
        assert!(parse_expr("f(a == 1)").is_err());
        assert_eq!(
            parse_expr("f(a= 1)").unwrap(),
            Expr::Call {
                func: "f".to_string(),
                args: vec![Arg::named("a", Expr::lit(1i64))],
            }
        );
    }
}

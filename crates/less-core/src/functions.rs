//! Built-in functions and the value pipeline that runs after variable
//! substitution: escapes, function calls, then arithmetic.

use crate::color::Color;
use crate::error::{Span, ValueError};
use crate::math::{self, parse_number, Number};
use crate::token::{closing_quote, matching, render, split_top_level, trim, unquote, Token, TokenKind, Tokens};
use crate::tokenizer::Tokenizer;

/// Functions whose arguments belong to the browser. Variables inside them
/// are still substituted, but nothing is evaluated.
const RAW_FUNCTIONS: &[&str] = &["calc", "url", "var", "env", "attr", "format", "local"];

/// Result of a built-in call.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Color(Color),
    Number(Number),
    /// Re-tokenized and may take part in further evaluation.
    Keyword(String),
    /// Printed verbatim; never evaluated again.
    Raw(String),
}

impl Value {
    pub fn to_tokens(&self, span: Span) -> Tokens {
        match self {
            Value::Color(c) => Tokenizer::fragment(&c.to_string(), span),
            Value::Number(n) => n.to_tokens(span),
            Value::Keyword(k) => Tokenizer::fragment(k, span),
            Value::Raw(text) => vec![Token::new(TokenKind::Other, text.clone(), span)],
        }
    }
}

fn boolean(value: bool) -> Value {
    Value::Keyword(if value { "true" } else { "false" }.to_string())
}

fn arg_color(function: &str, arg: &[Token]) -> Result<Color, ValueError> {
    Color::parse(arg).ok_or_else(|| ValueError::argument(function, format!("expected a color, got `{}`", render(trim(arg)))))
}

fn arg_number(function: &str, arg: &[Token]) -> Result<Number, ValueError> {
    parse_number(arg).ok_or_else(|| ValueError::argument(function, format!("expected a number, got `{}`", render(trim(arg)))))
}

fn check_arity(function: &str, args: &[&[Token]], min: usize, max: usize) -> Result<(), ValueError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}-{}", min, max)
        };
        return Err(ValueError::arity(function, &expected, args.len()));
    }
    Ok(())
}

/// An amount such as `10%` or `10`, as a fraction.
fn amount(function: &str, arg: &[Token]) -> Result<f64, ValueError> {
    Ok(arg_number(function, arg)?.value / 100.0)
}

fn is_string(arg: &[Token]) -> bool {
    let arg = trim(arg);
    let start = usize::from(arg.first().is_some_and(|t| t.is(TokenKind::Tilde)));
    arg.get(start).is_some_and(|t| t.kind.is_quote()) && closing_quote(arg, start) == Some(arg.len() - 1)
}

fn string_contents(function: &str, arg: &[Token]) -> Result<String, ValueError> {
    if !is_string(arg) {
        return Err(ValueError::argument(function, "expected a string"));
    }
    let text = render(trim(arg));
    Ok(unquote(text.trim_start_matches('~')).to_string())
}

fn escape_url(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' | '#' | '^' | '(' | ')' | '{' | '}' | '|' | ':' | '>' | '<' | ';' | ']' | '[' | '=' => {
                out.push_str(&format!("%{:02X}", c as u32))
            }
            c => out.push(c),
        }
    }
    out
}

/// Call a built-in. `args` are already evaluated. Returns `Ok(None)` for
/// names that are not built-ins, which then print as plain CSS functions.
pub fn call(name: &str, args: &[&[Token]]) -> Result<Option<Value>, ValueError> {
    let name = name.to_ascii_lowercase();
    let f = name.as_str();
    let value = match f {
        "rgb" | "rgba" | "hsl" | "hsla" | "hsv" | "hsva" => {
            return Ok(Color::construct(f, args)?.map(Value::Color));
        }

        "hue" | "saturation" | "lightness" | "red" | "green" | "blue" | "alpha" => {
            check_arity(f, args, 1, 1)?;
            let color = arg_color(f, args[0])?;
            let (hsla, rgba) = (color.hsla(), color.rgba());
            Value::Number(match f {
                "hue" => Number::unitless(hsla.h.round()),
                "saturation" => Number::new(hsla.s.round(), "%"),
                "lightness" => Number::new(hsla.l.round(), "%"),
                "red" => Number::unitless(rgba.r.round()),
                "green" => Number::unitless(rgba.g.round()),
                "blue" => Number::unitless(rgba.b.round()),
                _ => Number::unitless(color.alpha()),
            })
        }

        "spin" => {
            check_arity(f, args, 2, 2)?;
            let color = arg_color(f, args[0])?;
            let degrees = arg_number(f, args[1])?.value;
            Value::Color(color.adjust(|c| c.h = (c.h + degrees).rem_euclid(360.0)))
        }

        "saturate" | "desaturate" | "lighten" | "darken" => {
            check_arity(f, args, 2, 3)?;
            let color = arg_color(f, args[0])?;
            let delta = arg_number(f, args[1])?.value;
            let relative = args.get(2).is_some_and(|a| render(trim(a)) == "relative");
            let sign = if matches!(f, "saturate" | "lighten") { 1.0 } else { -1.0 };
            Value::Color(color.adjust(|c| {
                let channel = if matches!(f, "saturate" | "desaturate") {
                    &mut c.s
                } else {
                    &mut c.l
                };
                let step = if relative { *channel * delta / 100.0 } else { delta };
                *channel += sign * step;
            }))
        }

        "greyscale" | "grayscale" => {
            check_arity(f, args, 1, 1)?;
            Value::Color(arg_color(f, args[0])?.adjust(|c| c.s = 0.0))
        }

        "fade" | "fadein" | "fadeout" => {
            check_arity(f, args, 2, 2)?;
            let color = arg_color(f, args[0])?;
            let delta = amount(f, args[1])?;
            let alpha = match f {
                "fade" => delta,
                "fadein" => color.alpha() + delta,
                _ => color.alpha() - delta,
            };
            Value::Color(color.with_alpha(alpha))
        }

        "mix" => {
            check_arity(f, args, 2, 3)?;
            let first = arg_color(f, args[0])?;
            let second = arg_color(f, args[1])?;
            let weight = match args.get(2) {
                Some(w) => amount(f, w)?,
                None => 0.5,
            };
            Value::Color(first.mix(&second, weight))
        }

        "tint" | "shade" => {
            check_arity(f, args, 1, 2)?;
            let color = arg_color(f, args[0])?;
            let weight = match args.get(1) {
                Some(w) => amount(f, w)?,
                None => 0.5,
            };
            let base = Color::named(if f == "tint" { "white" } else { "black" })
                .ok_or_else(|| ValueError::InvalidColor(f.to_string()))?;
            Value::Color(base.mix(&color, weight))
        }

        "percentage" => {
            check_arity(f, args, 1, 1)?;
            let n = arg_number(f, args[0])?;
            Value::Number(Number::new(n.value * 100.0, "%"))
        }

        "round" | "ceil" | "floor" | "abs" | "sqrt" => {
            check_arity(f, args, 1, if f == "round" { 2 } else { 1 })?;
            let n = arg_number(f, args[0])?;
            let value = match f {
                "round" => {
                    let places = match args.get(1) {
                        Some(p) => arg_number(f, p)?.value.max(0.0) as i32,
                        None => 0,
                    };
                    let scale = 10f64.powi(places);
                    (n.value * scale).round() / scale
                }
                "ceil" => n.value.ceil(),
                "floor" => n.value.floor(),
                "abs" => n.value.abs(),
                _ => n.value.sqrt(),
            };
            Value::Number(Number::new(value, n.unit))
        }

        "unit" => {
            check_arity(f, args, 1, 2)?;
            let n = arg_number(f, args[0])?;
            let unit = args.get(1).map(|u| unquote(&render(trim(u))).to_string()).unwrap_or_default();
            Value::Number(Number::new(n.value, unit))
        }

        "e" => {
            check_arity(f, args, 1, 1)?;
            Value::Raw(string_contents(f, args[0])?)
        }

        "escape" => {
            check_arity(f, args, 1, 1)?;
            let text = if is_string(args[0]) {
                string_contents(f, args[0])?
            } else {
                render(trim(args[0]))
            };
            Value::Raw(escape_url(&text))
        }

        "iscolor" | "isnumber" | "isstring" | "iskeyword" | "ispixel" | "ispercentage" | "isem" => {
            check_arity(f, args, 1, 1)?;
            let arg = trim(args[0]);
            let number = parse_number(arg);
            boolean(match f {
                "iscolor" => Color::parse(arg).is_some(),
                "isnumber" => number.is_some(),
                "isstring" => is_string(arg),
                "iskeyword" => arg.len() == 1 && arg[0].is(TokenKind::Ident) && Color::named(&arg[0].text).is_none(),
                "ispixel" => number.is_some_and(|n| n.unit == "px"),
                "ispercentage" => number.is_some_and(|n| n.unit == "%"),
                _ => number.is_some_and(|n| n.unit == "em"),
            })
        }

        "isunit" => {
            check_arity(f, args, 2, 2)?;
            let unit = unquote(&render(trim(args[1]))).to_string();
            boolean(parse_number(args[0]).is_some_and(|n| n.unit == unit))
        }

        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Replace every `~"..."` with its contents and leave the rest alone.
fn unescape(tokens: &[Token]) -> Tokens {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token.is(TokenKind::Tilde) && tokens.get(i + 1).is_some_and(|t| t.kind.is_quote()) {
            if let Some(close) = closing_quote(tokens, i + 1) {
                out.push(Token::new(TokenKind::Other, render(&tokens[i + 2..close]), token.span));
                i = close + 1;
                continue;
            }
        }
        if token.kind.is_quote() {
            // copy the whole string so a `~` inside it is kept
            let end = closing_quote(tokens, i).unwrap_or(tokens.len() - 1);
            out.extend_from_slice(&tokens[i..=end]);
            i = end + 1;
            continue;
        }
        out.push(token.clone());
        i += 1;
    }
    out
}

/// Run escapes, function calls and arithmetic over a value whose variables
/// have already been substituted.
pub fn evaluate(tokens: &[Token]) -> Result<Tokens, ValueError> {
    let mut out: Tokens = Vec::with_capacity(tokens.len());
    let mut quote: Option<TokenKind> = None;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if let Some(q) = quote {
            if token.kind == q {
                quote = None;
            }
            out.push(token.clone());
            i += 1;
            continue;
        }

        // ~"..." prints its contents as is
        if token.is(TokenKind::Tilde) && tokens.get(i + 1).is_some_and(|t| t.kind.is_quote()) {
            if let Some(close) = closing_quote(tokens, i + 1) {
                let text = render(&tokens[i + 2..close]);
                out.push(Token::new(TokenKind::Other, text, token.span));
                i = close + 1;
                continue;
            }
        }

        if token.kind.is_quote() {
            quote = Some(token.kind);
            out.push(token.clone());
            i += 1;
            continue;
        }

        if token.is(TokenKind::Ident) && tokens.get(i + 1).is_some_and(|t| t.is(TokenKind::LParen)) {
            if let Some(close) = matching(tokens, i + 1) {
                let name = token.text.to_ascii_lowercase();
                if RAW_FUNCTIONS.contains(&name.as_str()) {
                    out.extend(unescape(&tokens[i..=close]));
                    i = close + 1;
                    continue;
                }

                let inner = &tokens[i + 2..close];
                let args = if trim(inner).is_empty() {
                    Vec::new()
                } else {
                    split_top_level(inner, TokenKind::Comma)
                        .into_iter()
                        .map(evaluate)
                        .collect::<Result<Vec<_>, _>>()?
                };
                let arg_refs: Vec<&[Token]> = args.iter().map(Vec::as_slice).collect();
                match call(&name, &arg_refs)? {
                    Some(value) => out.extend(value.to_tokens(token.span)),
                    None => {
                        out.push(token.clone());
                        out.push(tokens[i + 1].clone());
                        for (n, arg) in args.into_iter().enumerate() {
                            if n > 0 {
                                out.push(Token::new(TokenKind::Comma, ",", tokens[i + 1].span));
                            }
                            out.extend(arg);
                        }
                        out.push(tokens[close].clone());
                    }
                }
                i = close + 1;
                continue;
            }
        }

        out.push(token.clone());
        i += 1;
    }
    Ok(math::evaluate(&out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::render_compact;

    fn eval(src: &str) -> String {
        let tokens = Tokenizer::new().tokenize(src, "t.less");
        render_compact(&evaluate(&tokens).unwrap())
    }

    fn eval_err(src: &str) -> ValueError {
        let tokens = Tokenizer::new().tokenize(src, "t.less");
        evaluate(&tokens).unwrap_err()
    }

    #[test]
    fn color_functions() {
        assert_eq!(eval("darken(#ff0000, 10%)"), "#cc0000");
        assert_eq!(eval("lighten(#000, 100%)"), "#ffffff");
        assert_eq!(eval("saturate(hsl(90, 80%, 50%), 20%)"), "hsl(90,100%,50%)");
        assert_eq!(eval("spin(hsl(10, 90%, 50%), -30)"), "hsl(340,90%,50%)");
        assert_eq!(eval("mix(#f00, #00f, 50%)"), "#800080");
        assert_eq!(eval("mix(#f00, #00f)"), "#800080");
        assert_eq!(eval("fade(#000, 50%)"), "rgba(0,0,0,0.5)");
        assert_eq!(eval("fadeout(rgba(0,0,0,0.5), 20%)"), "rgba(0,0,0,0.3)");
        assert_eq!(eval("tint(#000, 50%)"), "#808080");
        assert_eq!(eval("greyscale(#f00)"), "#808080");
        assert_eq!(eval("1px solid darken(#fff, 20%)"), "1px solid #cccccc");
    }

    #[test]
    fn color_channels() {
        assert_eq!(eval("hue(hsl(120, 50%, 50%))"), "120");
        assert_eq!(eval("saturation(hsl(120, 50%, 40%))"), "50%");
        assert_eq!(eval("lightness(hsl(120, 50%, 40%))"), "40%");
        assert_eq!(eval("red(#336699)"), "51");
        assert_eq!(eval("alpha(rgba(0,0,0,.4))"), "0.4");
    }

    #[test]
    fn math_functions() {
        assert_eq!(eval("percentage(0.5)"), "50%");
        assert_eq!(eval("round(1.67)"), "2");
        assert_eq!(eval("round(1.67, 1)"), "1.7");
        assert_eq!(eval("ceil(2.4px)"), "3px");
        assert_eq!(eval("floor(2.6em)"), "2em");
        assert_eq!(eval("abs(-5px)"), "5px");
        assert_eq!(eval("unit(5, px)"), "5px");
        assert_eq!(eval("unit(5em)"), "5");
        assert_eq!(eval("percentage(10px / 20px)"), "50%");
    }

    #[test]
    fn escapes_print_verbatim() {
        assert_eq!(eval("~\"1px + 2px\""), "1px + 2px");
        assert_eq!(eval("e('a b')"), "a b");
        assert_eq!(eval("escape('a=1')"), "a%3D1");
        assert_eq!(eval("\"1 + 1\""), "\"1 + 1\"");
    }

    #[test]
    fn browser_functions_pass_through() {
        assert_eq!(eval("calc(100% - 10px)"), "calc(100% - 10px)");
        assert_eq!(eval("calc(~'100vh - 1rem')"), "calc(100vh - 1rem)");
        assert_eq!(eval("url(\"a~b.png\")"), "url(\"a~b.png\")");
        assert_eq!(eval("url(a.png)"), "url(a.png)");
        assert_eq!(eval("translate(2px * 2, 0)"), "translate(4px, 0)");
        assert_eq!(eval("rgb(var(--r), 0, 0)"), "rgb(var(--r), 0, 0)");
    }

    #[test]
    fn type_predicates() {
        assert_eq!(eval("iscolor(#fff)"), "true");
        assert_eq!(eval("iscolor(12px)"), "false");
        assert_eq!(eval("isnumber(12px)"), "true");
        assert_eq!(eval("isstring('a')"), "true");
        assert_eq!(eval("iskeyword(auto)"), "true");
        assert_eq!(eval("ispixel(3px)"), "true");
        assert_eq!(eval("ispercentage(3px)"), "false");
        assert_eq!(eval("isem(1em)"), "true");
        assert_eq!(eval("isunit(1rem, rem)"), "true");
    }

    #[test]
    fn argument_errors() {
        assert!(matches!(eval_err("darken(12px, 10%)"), ValueError::Argument { .. }));
        assert!(matches!(eval_err("darken(#fff)"), ValueError::Arity { got: 1, .. }));
        assert!(matches!(eval_err("percentage(a)"), ValueError::Argument { .. }));
    }
}

//! Tokenizer for the query language

use super::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Dot,
    DotDot,
    /// `.name` shorthand
    Field(String),
    Ident(String),
    Str(String),
    Num(f64),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Comma,
    Semicolon,
    Question,
    Op(&'static str),
}

/// Operators, longest first so `//` wins over `/` and `==` over `=`
const OPERATORS: &[&str] = &[
    "//", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split a query into tokens, each paired with its byte offset
pub(super) fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, QueryError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '.' => {
                let next = chars.get(i + 1).map(|(_, c)| *c);
                match next {
                    Some('.') => {
                        tokens.push((Token::DotDot, offset));
                        i += 2;
                    }
                    Some(n) if is_ident_start(n) => {
                        let mut j = i + 1;
                        while j < chars.len() && is_ident_char(chars[j].1) {
                            j += 1;
                        }
                        let name: String = chars[i + 1..j].iter().map(|(_, c)| *c).collect();
                        tokens.push((Token::Field(name), offset));
                        i = j;
                    }
                    _ => {
                        tokens.push((Token::Dot, offset));
                        i += 1;
                    }
                }
            }
            '[' => {
                tokens.push((Token::LBracket, offset));
                i += 1;
            }
            ']' => {
                tokens.push((Token::RBracket, offset));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, offset));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, offset));
                i += 1;
            }
            '|' => {
                tokens.push((Token::Pipe, offset));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, offset));
                i += 1;
            }
            ';' => {
                tokens.push((Token::Semicolon, offset));
                i += 1;
            }
            '?' => {
                tokens.push((Token::Question, offset));
                i += 1;
            }
            '"' => {
                let (value, next) = lex_string(&chars, i)?;
                tokens.push((Token::Str(value), offset));
                i = next;
            }
            c if c.is_ascii_digit() => {
                let mut j = i;
                while j < chars.len() {
                    let c = chars[j].1;
                    let signed_exponent = (c == '-' || c == '+') && matches!(chars[j - 1].1, 'e' | 'E');
                    if !(c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || signed_exponent) {
                        break;
                    }
                    j += 1;
                }
                let text: String = chars[i..j].iter().map(|(_, c)| *c).collect();
                let value = text.parse::<f64>().map_err(|_| QueryError::Parse {
                    offset,
                    message: format!("invalid number '{}'", text),
                })?;
                tokens.push((Token::Num(value), offset));
                i = j;
            }
            c if is_ident_start(c) => {
                let mut j = i;
                while j < chars.len() && is_ident_char(chars[j].1) {
                    j += 1;
                }
                let name: String = chars[i..j].iter().map(|(_, c)| *c).collect();
                tokens.push((Token::Ident(name), offset));
                i = j;
            }
            _ => {
                let rest = &src[offset..];
                let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(QueryError::Parse {
                        offset,
                        message: format!("unexpected character '{}'", c),
                    });
                };
                tokens.push((Token::Op(op), offset));
                i += op.chars().count();
            }
        }
    }

    Ok(tokens)
}

/// Lex a double-quoted string starting at `start`, returning the value and the next index
fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), QueryError> {
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let (offset, c) = chars[i];
        match c {
            '"' => return Ok((value, i + 1)),
            '\\' => {
                let Some((_, escaped)) = chars.get(i + 1) else {
                    break;
                };
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '"' => value.push('"'),
                    '\\' => value.push('\\'),
                    '/' => value.push('/'),
                    'u' => {
                        let hex: String = chars.iter().skip(i + 2).take(4).map(|(_, c)| *c).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| QueryError::Parse {
                                offset,
                                message: format!("invalid unicode escape '\\u{}'", hex),
                            })?;
                        value.push(code);
                        i += 4;
                    }
                    other => {
                        return Err(QueryError::Parse {
                            offset,
                            message: format!("invalid escape '\\{}'", other),
                        })
                    }
                }
                i += 2;
            }
            _ => {
                value.push(c);
                i += 1;
            }
        }
    }

    Err(QueryError::Parse {
        offset: chars[start].0,
        message: "unterminated string".to_string(),
    })
}

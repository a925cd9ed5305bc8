//! Low-level readers: fixed-column V2000 fields, the line cursor and the
//! V3000 field tokenizer.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0, none_of},
    combinator::{all_consuming, map, opt, recognize},
    error::{convert_error, VerboseError},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use super::MolfileError;

pub type Error<'a> = VerboseError<&'a str>;
pub type Res<'a, T> = IResult<&'a str, T, Error<'a>>;

/// Walks the lines of a Molfile, remembering where it is.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().map(|line| line.trim_end_matches('\r')).collect(),
            pos: 0,
        }
    }

    /// 0-based index of the line [`next`](Self::next) returned last.
    pub fn number(&self) -> usize {
        self.pos.saturating_sub(1)
    }

    pub fn next(&mut self) -> Result<&'a str, MolfileError> {
        let line = self
            .lines
            .get(self.pos)
            .copied()
            .ok_or(MolfileError::UnexpectedEnd { line: self.pos })?;
        self.pos += 1;
        Ok(line)
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.lines.len()
    }

    /// Reads one logical `M  V30` line, joining `-` continuations.
    pub fn next_v30(&mut self) -> Result<String, MolfileError> {
        let mut joined = String::new();
        loop {
            let line = self.next()?;
            let body = line.strip_prefix("M  V30 ").ok_or_else(|| MolfileError::Malformed {
                line: self.number(),
                reason: format!("expected an \"M  V30\" line, got {line:?}"),
            })?;
            match body.strip_suffix('-') {
                Some(head) => joined.push_str(head),
                None => {
                    joined.push_str(body);
                    return Ok(joined);
                }
            }
        }
    }
}

/// Reads fixed-width columns from one V2000 line. Columns past the end of
/// the line read as blank; a column edge inside a character is an error.
#[derive(Debug, Clone)]
pub struct Columns<'a> {
    line: &'a str,
    pos: usize,
    number: usize,
}

impl<'a> Columns<'a> {
    pub fn new(line: &'a str, number: usize) -> Self {
        Self { line, pos: 0, number }
    }

    /// Line number, for errors.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn skip(&mut self, width: usize) {
        self.pos += width;
    }

    /// The raw text of the next `width` columns.
    pub fn raw(&mut self, width: usize) -> Result<&'a str, MolfileError> {
        let start = self.pos.min(self.line.len());
        let end = (self.pos + width).min(self.line.len());
        self.pos += width;
        self.slice(start, end)
    }

    pub fn text(&mut self, width: usize) -> Result<&'a str, MolfileError> {
        Ok(self.raw(width)?.trim())
    }

    /// Whatever is left on the line.
    pub fn rest(&mut self) -> Result<&'a str, MolfileError> {
        let start = self.pos.min(self.line.len());
        self.pos = self.line.len();
        self.slice(start, self.line.len())
    }

    /// Columns count bytes, so a boundary may fall inside a character.
    fn slice(&self, start: usize, end: usize) -> Result<&'a str, MolfileError> {
        self.line.get(start..end).ok_or_else(|| MolfileError::Malformed {
            line: self.number,
            reason: format!("column {} splits a character in {:?}", start + 1, self.line),
        })
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.line.len()
    }

    /// An integer field that may be blank or missing.
    pub fn int_or_none(&mut self, width: usize, field: &'static str) -> Result<Option<i32>, MolfileError> {
        let line = self.number;
        let text = self.text(width)?;
        if text.is_empty() {
            return Ok(None);
        }
        text.parse().map(Some).map_err(|_| MolfileError::BadNumber {
            line,
            field,
            text: text.to_owned(),
        })
    }

    /// An integer field where blank means zero.
    pub fn int(&mut self, width: usize, field: &'static str) -> Result<i32, MolfileError> {
        Ok(self.int_or_none(width, field)?.unwrap_or(0))
    }

    /// An integer field that must be present.
    pub fn required_int(&mut self, width: usize, field: &'static str) -> Result<i32, MolfileError> {
        let line = self.number;
        self.int_or_none(width, field)?.ok_or(MolfileError::BadNumber {
            line,
            field,
            text: String::new(),
        })
    }

    pub fn float(&mut self, width: usize, field: &'static str) -> Result<f64, MolfileError> {
        let line = self.number;
        let text = self.text(width)?;
        text.parse().map_err(|_| MolfileError::BadNumber {
            line,
            field,
            text: text.to_owned(),
        })
    }
}

/// Value of one V3000 field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Word(String),
    Quoted(String),
    /// `(n a b ...)`, count included.
    List(Vec<String>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Word(String::new())
    }
}

impl Value {
    pub fn as_str(&self) -> &str {
        match self {
            Value::Word(text) | Value::Quoted(text) => text,
            Value::List(_) => "",
        }
    }

    pub fn int(&self) -> Option<i32> {
        self.as_str().parse().ok()
    }

    /// List entries after the leading count, checked against it.
    pub fn items(&self) -> Option<&[String]> {
        let Value::List(entries) = self else {
            return None;
        };
        let (count, items) = entries.split_first()?;
        (count.parse::<usize>().ok()? == items.len()).then_some(items)
    }

    pub fn int_items(&self) -> Option<Vec<i32>> {
        self.items()?.iter().map(|item| item.parse().ok()).collect()
    }

    pub fn float_items(&self) -> Option<Vec<f64>> {
        self.items()?.iter().map(|item| item.parse().ok()).collect()
    }
}

/// One whitespace-separated field: a bare value or `KEY=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: Option<String>,
    pub value: Value,
}

fn bare(input: &str) -> Res<&str> {
    take_while1(|c: char| !c.is_whitespace() && !"=()\"".contains(c))(input)
}

/// `"text"` with `""` standing for a literal quote.
fn quoted(input: &str) -> Res<String> {
    delimited(
        char('"'),
        map(
            many0(alt((
                map(recognize(many1(none_of("\""))), str::to_owned),
                map(pair(char('"'), char('"')), |_| "\"".to_owned()),
            ))),
            |parts| parts.concat(),
        ),
        char('"'),
    )(input)
}

fn list(input: &str) -> Res<Vec<String>> {
    delimited(
        terminated(char('('), multispace0),
        many0(terminated(alt((quoted, map(bare, str::to_owned))), multispace0)),
        char(')'),
    )(input)
}

fn value(input: &str) -> Res<Value> {
    alt((
        map(list, Value::List),
        map(quoted, Value::Quoted),
        map(bare, |word| Value::Word(word.to_owned())),
    ))(input)
}

fn field(input: &str) -> Res<Field> {
    alt((
        map(pair(terminated(bare, char('=')), opt(value)), |(key, value)| Field {
            key: Some(key.to_owned()),
            value: value.unwrap_or_default(),
        }),
        map(value, |value| Field { key: None, value }),
    ))(input)
}

/// Splits the body of a V3000 line into fields.
pub fn fields(input: &str) -> Result<Vec<Field>, String> {
    match all_consuming(preceded(multispace0, many0(terminated(field, multispace0))))(input) {
        Ok((_, fields)) => Ok(fields),
        Err(e) => match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => Err(convert_error(input, e)),
            nom::Err::Incomplete(_) => Err("incomplete".to_string()),
        },
    }
}

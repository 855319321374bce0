use std::fmt;
use nom::branch::alt;
use nom::bytes::complete::{is_not, take_while1, take_while_m_n};
use nom::character::complete::{char, multispace0, none_of};
use nom::combinator::{all_consuming, map, map_res, opt, recognize, value};
use nom::multi::{fold_many0, many0, separated_list1};
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};

/// A parsed rank feature name: `base(param, ...).output`.
///
/// Parameters are stored unquoted. A parameter that is itself a feature name is kept in
/// its canonical spelling, so `sum( a ,b )` and `sum(a,b)` name the same executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureName {
    base_name: String,
    parameters: Vec<String>,
    output: String,
    executor_name: String,
    feature_name: String,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == '$'
}

fn base_name(input: &str) -> IResult<&str, &str> {
    take_while1(is_ident_char).parse(input)
}

fn output_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| is_ident_char(c) || c == '.').parse(input)
}

fn hex_escape(input: &str) -> IResult<&str, char> {
    map_res(
        preceded(char('x'), take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit())),
        |hex: &str| u8::from_str_radix(hex, 16).map(char::from),
    )
    .parse(input)
}

fn escape(input: &str) -> IResult<&str, char> {
    preceded(
        char('\\'),
        alt((
            value('\\', char('\\')),
            value('"', char('"')),
            value('\t', char('t')),
            value('\n', char('n')),
            value('\r', char('r')),
            value('\u{c}', char('f')),
            hex_escape,
        )),
    )
    .parse(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(alt((escape, none_of("\\\""))), String::new, |mut s, c| {
            s.push(c);
            s
        }),
        char('"'),
    )
    .parse(input)
}

/// Text inside a parenthesized group, commas allowed.
fn nested(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((
        is_not("()\""),
        recognize(quoted),
        recognize(delimited(char('('), nested, char(')'))),
    ))))
    .parse(input)
}

/// An unquoted parameter: anything up to a top-level `,` or `)`.
fn raw(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((
        is_not("(),\""),
        recognize(quoted),
        recognize(delimited(char('('), nested, char(')'))),
    ))))
    .parse(input)
}

fn normalize_raw(text: &str) -> String {
    let text = text.trim();
    match FeatureName::parse(text) {
        Ok(name) => name.feature_name,
        Err(_) => text.to_string(),
    }
}

fn parameter(input: &str) -> IResult<&str, String> {
    alt((
        delimited(multispace0, quoted, multispace0),
        map(raw, normalize_raw),
    ))
    .parse(input)
}

type Parts<'a> = (&'a str, Option<Vec<String>>, Option<&'a str>);

fn feature(input: &str) -> IResult<&str, Parts<'_>> {
    (
        base_name,
        opt(delimited(char('('), separated_list1(char(','), parameter), char(')'))),
        opt(preceded(char('.'), output_name)),
    )
        .parse(input)
}

impl FeatureName {
    pub fn parse(input: &str) -> Result<FeatureName> {
        let (_, (base, parameters, output)) = all_consuming(delimited(multispace0, feature, multispace0))
            .parse(input)
            .map_err(|e| Error::parse(format!("malformed feature name '{}': {}", input, e)))?;
        let mut parameters = parameters.unwrap_or_default();
        if parameters.len() == 1 && parameters[0].is_empty() {
            parameters.clear();
        }
        let mut builder = FeatureNameBuilder::new(base);
        for p in &parameters {
            builder = builder.parameter(p);
        }
        let output = output.unwrap_or_default();
        let executor_name = builder.build();
        let feature_name = if output.is_empty() {
            executor_name.clone()
        } else {
            format!("{}.{}", executor_name, output)
        };
        Ok(FeatureName {
            base_name: base.to_string(),
            parameters,
            output: output.to_string(),
            executor_name,
            feature_name,
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Empty when the name refers to the default output.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Canonical name without the output part.
    pub fn executor_name(&self) -> &str {
        &self.executor_name
    }

    /// Canonical full name.
    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.feature_name)
    }
}

/// Builds canonical feature names, quoting parameters that would not parse back.
pub struct FeatureNameBuilder {
    base_name: String,
    parameters: Vec<String>,
    output: String,
}

impl FeatureNameBuilder {
    pub fn new(base_name: &str) -> Self {
        FeatureNameBuilder {
            base_name: base_name.to_string(),
            parameters: Vec::new(),
            output: String::new(),
        }
    }

    pub fn parameter(mut self, param: &str) -> Self {
        self.parameters.push(param.to_string());
        self
    }

    pub fn output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn build(&self) -> String {
        let mut name = self.base_name.clone();
        if !self.parameters.is_empty() {
            name.push('(');
            for (i, p) in self.parameters.iter().enumerate() {
                if i > 0 {
                    name.push(',');
                }
                if needs_quoting(p) {
                    name.push_str(&quote(p));
                } else {
                    name.push_str(p);
                }
            }
            name.push(')');
        }
        if !self.output.is_empty() {
            name.push('.');
            name.push_str(&self.output);
        }
        name
    }
}

fn is_plain_char(c: char) -> bool {
    is_ident_char(c) || matches!(c, '.' | '-' | '+')
}

fn needs_quoting(param: &str) -> bool {
    if param.is_empty() || param.chars().all(is_plain_char) {
        return false;
    }
    !matches!(FeatureName::parse(param), Ok(name) if name.feature_name == param)
}

/// Quote `s` so that the feature name parser reads it back unchanged.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

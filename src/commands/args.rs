//! Argument parsing for command text.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

/// Largest `lines` value accepted for log commands.
pub const MAX_LOG_LINES: u32 = 5000;

pub const DEFAULT_LOG_LINES: u32 = 100;

/// One positional argument.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    /// Names a single resource and must not contain whitespace.
    pub single: bool,
}

pub const fn arg(name: &'static str) -> ArgSpec {
    ArgSpec { name, single: true }
}

/// How the text after a command name is split into arguments.
#[derive(Debug, Clone, Copy)]
pub enum ArgRule {
    /// Trailing text is ignored.
    None,
    /// The whole trimmed tail is one argument.
    FreeText { name: &'static str, required: bool },
    /// Whitespace-separated tokens; the last argument takes whatever remains.
    Positional { args: &'static [ArgSpec], required: usize },
    /// A required leading token followed by `key=value` pairs.
    KeyValueTail { head: &'static str },
}

/// Arguments after splitting, before family-specific validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArgs {
    Empty,
    Text(Option<String>),
    Positional(Vec<String>),
    KeyValue {
        head: String,
        params: BTreeMap<String, String>,
    },
}

impl ParsedArgs {
    /// Positional argument `i`, if supplied.
    pub fn get(&self, i: usize) -> Option<&str> {
        match self {
            ParsedArgs::Positional(values) => values.get(i).map(String::as_str),
            ParsedArgs::Text(text) if i == 0 => text.as_deref(),
            ParsedArgs::KeyValue { head, .. } if i == 0 => Some(head.as_str()),
            _ => None,
        }
    }
}

/// Why the text could not be parsed. Rendered together with the command's usage line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl UsageError {
    pub fn new(message: impl Into<String>) -> Self {
        UsageError(message.into())
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

pub fn parse(rule: &ArgRule, raw: &str) -> Result<ParsedArgs, UsageError> {
    let raw = raw.trim();
    match *rule {
        ArgRule::None => Ok(ParsedArgs::Empty),
        ArgRule::FreeText { name, required } => {
            if raw.is_empty() {
                if required {
                    return Err(UsageError::new(format!("Missing required argument <{}>.", name)));
                }
                return Ok(ParsedArgs::Text(None));
            }
            Ok(ParsedArgs::Text(Some(raw.to_string())))
        }
        ArgRule::Positional { args, required } => parse_positional(args, required, raw),
        ArgRule::KeyValueTail { head } => {
            let mut tokens = raw.split_whitespace();
            let first = match tokens.next() {
                Some(t) if !t.contains('=') => t.to_string(),
                _ => return Err(UsageError::new(format!("Missing required argument <{}>.", head))),
            };
            Ok(ParsedArgs::KeyValue {
                head: first,
                params: parse_params(tokens),
            })
        }
    }
}

fn parse_positional(specs: &[ArgSpec], required: usize, raw: &str) -> Result<ParsedArgs, UsageError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    if let Some(bad) = tokens.iter().find(|t| t.contains('=')) {
        return Err(UsageError::new(format!(
            "`{}` looks like key=value, but this command takes positional arguments only.",
            bad
        )));
    }
    if tokens.len() < required {
        let missing = specs[tokens.len()..required]
            .iter()
            .map(|s| format!("<{}>", s.name))
            .collect::<Vec<_>>()
            .join(" ");
        return Err(UsageError::new(format!("Missing required argument {}.", missing)));
    }
    if specs.is_empty() {
        return Ok(ParsedArgs::Positional(Vec::new()));
    }

    let mut values: Vec<String> = Vec::with_capacity(specs.len());
    for (i, token) in tokens.iter().enumerate() {
        if i < specs.len() - 1 {
            values.push(token.to_string());
        } else {
            values.push(tokens[i..].join(" "));
            break;
        }
    }

    for (value, spec) in values.iter().zip(specs) {
        if spec.single && value.contains(char::is_whitespace) {
            return Err(UsageError::new(format!(
                "<{}> must be a single word, got `{}`.",
                spec.name, value
            )));
        }
    }
    Ok(ParsedArgs::Positional(values))
}

/// Split `key=value` tokens on their first `=`. Anything else is skipped with a warning.
pub fn parse_params<'a>(tokens: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for token in tokens {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                params.insert(key.to_string(), value.to_string());
            }
            _ => tracing::warn!("Ignoring malformed parameter '{}' (expected key=value)", token),
        }
    }
    params
}

/// Validate a Prometheus duration such as `30m` or `1h`.
pub fn duration(value: Option<&str>, default: &str) -> Result<String, UsageError> {
    let value = value.unwrap_or(default);
    let valid = Regex::new(r"^[0-9]+[smhdwy]$")
        .map(|re| re.is_match(value))
        .unwrap_or(false);
    if valid && !value.starts_with('0') {
        Ok(value.to_string())
    } else {
        Err(UsageError::new(format!(
            "Invalid duration `{}`; use a number followed by s, m, h, d, w or y (e.g. 30m, 1h).",
            value
        )))
    }
}

/// Validate a log line count.
pub fn lines(value: Option<&str>) -> Result<u32, UsageError> {
    let Some(value) = value else {
        return Ok(DEFAULT_LOG_LINES);
    };
    match value.parse::<u32>() {
        Ok(n) if (1..=MAX_LOG_LINES).contains(&n) => Ok(n),
        _ => Err(UsageError::new(format!(
            "Invalid line count `{}`; use a whole number from 1 to {}.",
            value, MAX_LOG_LINES
        ))),
    }
}

/// Validate a Jenkins build id.
pub fn build(value: Option<&str>) -> Result<String, UsageError> {
    let value = value.unwrap_or(crate::backends::jenkins::LAST_BUILD);
    if crate::backends::jenkins::is_valid_build_id(value) {
        Ok(value.to_string())
    } else {
        Err(UsageError::new(format!(
            "Invalid build `{}`; use a build number or a permalink such as lastBuild or lastSuccessfulBuild.",
            value
        )))
    }
}

/// A required argument that must be one token, for free-text rules that name one resource.
pub fn single_word(name: &str, value: Option<&str>) -> Result<String, UsageError> {
    match value {
        None => Err(UsageError::new(format!("Missing required argument <{}>.", name))),
        Some(v) if v.contains(char::is_whitespace) => Err(UsageError::new(format!(
            "<{}> must be a single word, got `{}`.",
            name, v
        ))),
        Some(v) => Ok(v.to_string()),
    }
}

/// A container or image reference. Must not start with `-`, so it can never be read as a flag.
pub fn docker_ref(name: &str, value: Option<&str>) -> Result<String, UsageError> {
    let value = single_word(name, value)?;
    if value.starts_with('-') {
        return Err(UsageError::new(format!(
            "<{}> must be a container or image name, got option-like `{}`.",
            name, value
        )));
    }
    Ok(value)
}

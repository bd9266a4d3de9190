//! Path templates compiled into matchers and reverse builders.
//!
//! A template is made of literal text and parameters:
//! ```ignore
//!  Syntax          Type
//!  :name           named parameter, matches one segment
//!  :name?          optional parameter
//!  :name+          one or more segments
//!  :name*          zero or more segments
//!  :name(\d+)      parameter with a custom pattern
//!  (\d+)           anonymous parameter with a custom pattern
//!  *               wildcard, matches anything including the delimiter
//!  \:              escaped literal character
//! ```
//!
//! Parameters preceded by `/` or `.` take that character as their prefix, so
//! an absent optional parameter removes its prefix too:
//! ```ignore
//!  Path: /r/:name/:args*
//!
//!   /r/reports.sales                 match: name="reports.sales"
//!   /r/reports.sales/1/%22x%22       match: name="reports.sales", args=["1", "\"x\""]
//!   /r/                              no match
//! ```
//!
//! Anonymous parameters are named by their position among the anonymous
//! parameters of the template: `"0"`, `"1"` and so on.
use crate::error::{Error, PatternError};
use crate::params::{ParamValue, Params};

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::OnceLock;

use regex::Regex;

/// Matching options for a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOptions {
    /// Match letters case-sensitively. Defaults to `false`.
    pub case_sensitive: bool,
    /// Require an exact trailing delimiter match. When `false`, a single
    /// trailing delimiter on the request path is optional. Defaults to `false`.
    pub strict: bool,
    /// Require the pattern to match the whole path. When `false` the pattern
    /// matches any path it is a segment-wise prefix of. Defaults to `false`.
    pub end: bool,
    /// Segment delimiter. Defaults to `"/"`.
    pub delimiter: String,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strict: false,
            end: false,
            delimiter: "/".to_owned(),
        }
    }
}

impl PathOptions {
    /// Options matching only paths the pattern covers entirely.
    pub fn exact() -> Self {
        Self {
            end: true,
            ..Self::default()
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }
}

/// A parameter declared by a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub prefix: String,
    /// Separator between repeated values.
    pub delimiter: String,
    pub optional: bool,
    pub repeat: bool,
    /// The parameter is followed by text other than its prefix, so its
    /// prefix is kept even when the parameter is absent.
    pub partial: bool,
    pub asterisk: bool,
    pub pattern: String,
}

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Key(usize),
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct Pattern {
    template: String,
    tokens: Vec<Token>,
    keys: Vec<Key>,
    regex: Regex,
    key_regexes: Vec<Regex>,
}

fn path_regexp() -> &'static Regex {
    static PATH_REGEXP: OnceLock<Regex> = OnceLock::new();
    PATH_REGEXP.get_or_init(|| {
        Regex::new(concat!(
            r"(\\.)",
            "|",
            r"([/.])?(?:(?::(\w+)(?:\(((?:\\.|[^\\()])+)\))?|\(((?:\\.|[^\\()])+)\))([+*?])?|(\*))",
        ))
        .expect("path template grammar is a valid expression")
    })
}

impl Pattern {
    /// Compiles `template` with the given options.
    /// ```rust
    /// use tokenroute::{Pattern, PathOptions};
    ///
    /// let pattern = Pattern::compile("/sum/:n+", PathOptions::exact()).unwrap();
    /// let params = pattern.matches("/sum/1/2/3").unwrap().unwrap();
    /// assert_eq!(params.get_all("n"), &["1", "2", "3"]);
    /// ```
    pub fn compile(template: &str, options: PathOptions) -> Result<Self, PatternError> {
        let (tokens, keys) = parse(template, &options.delimiter);
        let flags = if options.case_sensitive { "" } else { "(?i)" };

        let invalid = |source| PatternError::Template {
            template: template.to_owned(),
            source,
        };

        let regex = Regex::new(&to_regex_source(&tokens, &keys, &options, flags)).map_err(invalid)?;
        let key_regexes = keys
            .iter()
            .map(|key| Regex::new(&format!("{}^(?:{})$", flags, key.pattern)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        Ok(Self {
            template: template.to_owned(),
            tokens,
            keys,
            regex,
            key_regexes,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Matches a request path, returning the decoded parameters, or `None` if
    /// the path does not match.
    ///
    /// Repeated parameters are split on their delimiter before each value is
    /// percent-decoded, so an encoded delimiter stays inside its value.
    pub fn matches(&self, path: &str) -> Result<Option<Params>, Error> {
        let captures = match self.regex.captures(path) {
            Some(captures) => captures,
            None => return Ok(None),
        };

        let mut params = Params::default();
        for (i, key) in self.keys.iter().enumerate() {
            let raw = match captures.get(i + 1) {
                Some(m) if !m.as_str().is_empty() => m.as_str(),
                _ => continue,
            };

            let value = if key.repeat {
                ParamValue::Repeated(
                    raw.split(key.delimiter.as_str())
                        .map(decode)
                        .collect::<Result<_, _>>()?,
                )
            } else {
                ParamValue::Single(decode(raw)?)
            };
            params.push(key.name.clone(), value);
        }

        Ok(Some(params))
    }

    /// Builds a path from parameter values, percent-encoding each value.
    /// ```rust
    /// use tokenroute::{Pattern, PathOptions, ParamValue};
    /// use std::collections::BTreeMap;
    ///
    /// let pattern = Pattern::compile("/r/:name/:args*", PathOptions::exact()).unwrap();
    /// let mut values = BTreeMap::new();
    /// values.insert("name".to_owned(), ParamValue::from("reports.sales"));
    /// values.insert("args".to_owned(), ParamValue::from(vec!["1".to_owned(), "a b".to_owned()]));
    /// assert_eq!(pattern.build(&values).unwrap(), "/r/reports.sales/1/a%20b");
    /// ```
    pub fn build(&self, values: &BTreeMap<String, ParamValue>) -> Result<String, PatternError> {
        let mut path = String::new();

        for token in &self.tokens {
            let index = match token {
                Token::Literal(literal) => {
                    path.push_str(literal);
                    continue;
                }
                Token::Key(index) => *index,
            };
            let key = &self.keys[index];

            let value = match values.get(&key.name) {
                Some(value) => value,
                None if key.optional => {
                    if key.partial {
                        path.push_str(&key.prefix);
                    }
                    continue;
                }
                None => return Err(PatternError::Missing(key.name.clone())),
            };

            match value {
                ParamValue::Repeated(values) => {
                    if !key.repeat {
                        return Err(PatternError::Repeated(key.name.clone()));
                    }
                    if values.is_empty() {
                        if key.optional {
                            continue;
                        }
                        return Err(PatternError::Empty(key.name.clone()));
                    }
                    for (j, value) in values.iter().enumerate() {
                        let segment = self.segment(index, value)?;
                        path.push_str(if j == 0 { &key.prefix } else { &key.delimiter });
                        path.push_str(&segment);
                    }
                }
                ParamValue::Single(value) => {
                    let segment = self.segment(index, value)?;
                    path.push_str(&key.prefix);
                    path.push_str(&segment);
                }
            }
        }

        Ok(path)
    }

    fn segment(&self, index: usize, value: &str) -> Result<String, PatternError> {
        let key = &self.keys[index];
        let segment = if key.asterisk {
            urlencoding::encode(value).replace("%2F", "/")
        } else {
            urlencoding::encode(value).into_owned()
        };

        if !self.key_regexes[index].is_match(&segment) {
            return Err(PatternError::Mismatch {
                name: key.name.clone(),
                pattern: key.pattern.clone(),
                segment,
            });
        }
        Ok(segment)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn decode(raw: &str) -> Result<String, Error> {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .map_err(|_| Error::InvalidPath(raw.to_owned()))
}

fn parse(template: &str, default_delimiter: &str) -> (Vec<Token>, Vec<Key>) {
    let mut tokens = Vec::new();
    let mut keys = Vec::new();
    let mut anonymous = 0;
    let mut index = 0;
    let mut literal = String::new();

    for captures in path_regexp().captures_iter(template) {
        let whole = match captures.get(0) {
            Some(whole) => whole,
            None => continue,
        };
        literal.push_str(&template[index..whole.start()]);
        index = whole.end();

        if let Some(escaped) = captures.get(1) {
            literal.push_str(&escaped.as_str()[1..]);
            continue;
        }

        let next = template[index..].chars().next();
        let prefix = captures.get(2).map(|m| m.as_str());
        let modifier = captures.get(6).map(|m| m.as_str());
        let asterisk = captures.get(7).is_some();

        if !literal.is_empty() {
            tokens.push(Token::Literal(mem::take(&mut literal)));
        }

        let partial = match (prefix, next) {
            (Some(prefix), Some(next)) => !prefix.starts_with(next),
            _ => false,
        };
        let delimiter = prefix.unwrap_or(default_delimiter).to_owned();
        let pattern = match captures.get(4).or_else(|| captures.get(5)) {
            Some(custom) => custom.as_str().replace('$', r"\$"),
            None if asterisk => ".*".to_owned(),
            None => format!("[^{}]+?", regex::escape(&delimiter)),
        };
        let name = match captures.get(3) {
            Some(name) => name.as_str().to_owned(),
            None => {
                anonymous += 1;
                (anonymous - 1).to_string()
            }
        };

        tokens.push(Token::Key(keys.len()));
        keys.push(Key {
            name,
            prefix: prefix.unwrap_or_default().to_owned(),
            delimiter,
            optional: matches!(modifier, Some("?") | Some("*")),
            repeat: matches!(modifier, Some("+") | Some("*")),
            partial,
            asterisk,
            pattern,
        });
    }

    literal.push_str(&template[index..]);
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    (tokens, keys)
}

fn to_regex_source(tokens: &[Token], keys: &[Key], options: &PathOptions, flags: &str) -> String {
    let mut route = String::new();

    for token in tokens {
        match token {
            Token::Literal(literal) => route.push_str(&regex::escape(literal)),
            Token::Key(index) => {
                let key = &keys[*index];
                let prefix = regex::escape(&key.prefix);
                let mut capture = format!("(?:{})", key.pattern);
                if key.repeat {
                    capture = format!("{0}(?:{1}{0})*", capture, prefix);
                }
                let capture = match (key.optional, key.partial) {
                    (true, false) => format!("(?:{}({}))?", prefix, capture),
                    (true, true) => format!("{}({})?", prefix, capture),
                    (false, _) => format!("{}({})", prefix, capture),
                };
                route.push_str(&capture);
            }
        }
    }

    let delimiter = regex::escape(&options.delimiter);
    let ends_with_delimiter = !delimiter.is_empty() && route.ends_with(&delimiter);
    if !options.strict && ends_with_delimiter {
        route.truncate(route.len() - delimiter.len());
    }

    // The trailing delimiter is consumed rather than looked ahead at; only
    // the captures of a match are used, never its extent.
    let tail = match (options.end, options.strict) {
        (true, true) => "$".to_owned(),
        (true, false) => format!("(?:{})?$", delimiter),
        (false, true) if ends_with_delimiter => String::new(),
        (false, _) => format!("(?:{}|$)", delimiter),
    };

    format!("{}^{}{}", flags, route, tail)
}

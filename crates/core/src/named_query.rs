//! Named queries: stored templates that expand into asset filters.
//!
//! A template is a list of `key=value` pairs separated by `&`:
//!
//! ```text
//! space=p1&s1=p2&n1=p3&assetOrder=n1;s2 desc&objectname={s1}.pdf&#=12
//! ```
//!
//! Values of the form `pN` are replaced by the N-th request argument. Pairs
//! keyed `#` append a fixed argument to the end of the argument list. Parsing
//! never fails on bad arguments; instead the result is marked faulty with a
//! human readable message so the caller can answer with a client error.

use serde::{Deserialize, Serialize};
use std::fmt;

const ADDITIONAL_ARG_MARKER: &str = "#";
const PARAMETER_PREFIX: char = 'p';
const PATH_REPLACEMENT: &str = "%2F";
const DEFAULT_OBJECT_NAME: &str = "Untitled";

/// A stored named query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedQuery {
    /// Owning customer.
    pub customer: u32,
    pub name: String,
    pub template: String,
    /// Global queries are usable by every customer.
    #[serde(default)]
    pub global: bool,
}

/// Kind of persisted projection a named query is expanded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    Zip,
    Pdf,
}

impl ProjectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset field a template element refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMapping {
    Unset,
    String1,
    String2,
    String3,
    Number1,
    Number2,
    Number3,
}

impl QueryMapping {
    fn from_element(element: &str) -> Self {
        match element {
            "s1" => Self::String1,
            "s2" => Self::String2,
            "s3" => Self::String3,
            "n1" => Self::Number1,
            "n2" => Self::Number2,
            "n3" => Self::Number3,
            _ => Self::Unset,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

/// One ordering clause of a named query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOrder {
    pub mapping: QueryMapping,
    pub direction: OrderDirection,
}

impl QueryOrder {
    pub fn ascending(mapping: QueryMapping) -> Self {
        Self {
            mapping,
            direction: OrderDirection::Ascending,
        }
    }

    pub fn descending(mapping: QueryMapping) -> Self {
        Self {
            mapping,
            direction: OrderDirection::Descending,
        }
    }
}

/// A named query bound to one customer with its arguments resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedNamedQuery {
    pub customer: u32,
    pub query_name: String,
    pub kind: ProjectionKind,
    /// Request arguments followed by any `#` template arguments.
    pub args: Vec<String>,
    pub space: Option<u32>,
    pub space_name: Option<String>,
    pub string1: Option<String>,
    pub string2: Option<String>,
    pub string3: Option<String>,
    pub number1: Option<i64>,
    pub number2: Option<i64>,
    pub number3: Option<i64>,
    /// Ordering of the result set, used to fix canvas order in projections.
    pub asset_ordering: Vec<QueryOrder>,
    pub object_name: String,
    pub cover_page_url: Option<String>,
    pub redacted_message: Option<String>,
    pub storage_key: String,
    pub control_file_key: String,
    pub faulty: bool,
    pub error_message: Option<String>,
}

impl ParsedNamedQuery {
    fn empty(customer: u32, query_name: &str, kind: ProjectionKind, args: Vec<String>) -> Self {
        Self {
            customer,
            query_name: query_name.to_string(),
            kind,
            args,
            space: None,
            space_name: None,
            string1: None,
            string2: None,
            string3: None,
            number1: None,
            number2: None,
            number3: None,
            asset_ordering: Vec::new(),
            object_name: DEFAULT_OBJECT_NAME.to_string(),
            cover_page_url: None,
            redacted_message: None,
            storage_key: String::new(),
            control_file_key: String::new(),
            faulty: false,
            error_message: None,
        }
    }

    fn set_error(&mut self, message: String) {
        self.faulty = true;
        self.error_message = Some(message);
    }

    /// Replace `{s1}`..`{n3}` tokens with parsed values. Unset values become empty.
    pub fn format_template(&self, template: &str) -> String {
        let number = |n: Option<i64>| n.map(|v| v.to_string()).unwrap_or_default();
        template
            .replace("{s1}", self.string1.as_deref().unwrap_or_default())
            .replace("{s2}", self.string2.as_deref().unwrap_or_default())
            .replace("{s3}", self.string3.as_deref().unwrap_or_default())
            .replace("{n1}", &number(self.number1))
            .replace("{n2}", &number(self.number2))
            .replace("{n3}", &number(self.number3))
    }
}

/// Parse a named-query template against request arguments.
///
/// `raw_args` is the trailing request path (`1/2/foo`). Only an empty template
/// is an error; every other problem yields a faulty [`ParsedNamedQuery`].
pub fn parse_named_query(
    customer: u32,
    query_name: &str,
    template: &str,
    raw_args: Option<&str>,
    kind: ProjectionKind,
) -> crate::Result<ParsedNamedQuery> {
    if template.trim().is_empty() {
        return Err(crate::Error::Format(
            "named query template cannot be empty".to_string(),
        ));
    }

    let pairs: Vec<&str> = template.split('&').filter(|p| !p.is_empty()).collect();
    let args = collect_args(raw_args, &pairs);

    let mut parsed = ParsedNamedQuery::empty(customer, query_name, kind, args);
    let mut object_name_format = None;
    let mut cover_page_format = None;

    if let Err(message) =
        apply_pairs(&pairs, &mut parsed, &mut object_name_format, &mut cover_page_format)
    {
        parsed.set_error(message);
    }

    if let Some(format) = object_name_format {
        parsed.object_name = parsed.format_template(&format);
    }
    if kind == ProjectionKind::Pdf
        && let Some(format) = cover_page_format
    {
        parsed.cover_page_url = Some(parsed.format_template(&format));
    }
    if kind != ProjectionKind::Pdf {
        parsed.redacted_message = None;
    }

    parsed.storage_key = storage_key(&parsed);
    parsed.control_file_key = format!("{}.json", parsed.storage_key);
    if !parsed.faulty
        && parsed
            .storage_key
            .split('/')
            .any(|segment| segment == "." || segment == "..")
    {
        parsed.set_error("Named query arguments cannot contain relative path segments".to_string());
    }
    Ok(parsed)
}

fn collect_args(raw_args: Option<&str>, pairs: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = raw_args
        .unwrap_or_default()
        .split('/')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();

    for pair in pairs.iter().filter(|p| p.starts_with(ADDITIONAL_ARG_MARKER)) {
        if let [_, value] = split_pair(pair)[..] {
            args.push(value.to_string());
        }
    }
    args
}

fn split_pair(pair: &str) -> Vec<&str> {
    pair.split('=').filter(|e| !e.is_empty()).collect()
}

fn is_parameter(value: &str) -> bool {
    value.starts_with(PARAMETER_PREFIX) && value.len() > 1
}

fn apply_pairs(
    pairs: &[&str],
    parsed: &mut ParsedNamedQuery,
    object_name_format: &mut Option<String>,
    cover_page_format: &mut Option<String>,
) -> Result<(), String> {
    let references_args = pairs.iter().any(|pair| match split_pair(pair)[..] {
        [key, value] => key != ADDITIONAL_ARG_MARKER && is_parameter(value),
        _ => false,
    });
    if references_args && parsed.args.is_empty() {
        return Err("Named query must have at least 1 argument".to_string());
    }

    for pair in pairs {
        let [key, value] = split_pair(pair)[..] else {
            continue;
        };

        match key {
            "canvas" | "assetOrder" => parsed.asset_ordering = parse_ordering(value),
            "space" => {
                if let Some(v) = resolve_argument(&parsed.args, value)? {
                    parsed.space = Some(parse_number(key, &v)?);
                }
            }
            "spacename" => parsed.space_name = resolve_argument(&parsed.args, value)?,
            "s1" => parsed.string1 = resolve_argument(&parsed.args, value)?,
            "s2" => parsed.string2 = resolve_argument(&parsed.args, value)?,
            "s3" => parsed.string3 = resolve_argument(&parsed.args, value)?,
            "n1" | "n2" | "n3" => {
                let number = match resolve_argument(&parsed.args, value)? {
                    Some(v) => Some(parse_number(key, &v)?),
                    None => None,
                };
                match key {
                    "n1" => parsed.number1 = number,
                    "n2" => parsed.number2 = number,
                    _ => parsed.number3 = number,
                }
            }
            "objectname" => *object_name_format = Some(value.to_string()),
            "coverpage" => *cover_page_format = Some(value.to_string()),
            "redactedmessage" => parsed.redacted_message = Some(value.to_string()),
            _ => {}
        }
    }
    Ok(())
}

/// Resolve a template value, substituting `pN` with the N-th argument.
///
/// A reference past the end of the argument list resolves to `None`.
fn resolve_argument(args: &[String], element: &str) -> Result<Option<String>, String> {
    if !is_parameter(element) {
        return Ok(Some(element.to_string()));
    }

    match element[1..].parse::<usize>() {
        Ok(index) if index >= 1 => Ok(args
            .get(index - 1)
            .map(|arg| arg.replace(PATH_REPLACEMENT, "/"))),
        _ => Err(format!(
            "Could not parse template element parameter '{element}'"
        )),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("Value '{value}' for '{key}' is not a valid number"))
}

/// Parse `n1`, `n2 desc`, `n3+asc` or `;` separated combinations.
fn parse_ordering(element: &str) -> Vec<QueryOrder> {
    element
        .split(';')
        .filter_map(|ordering| {
            let normalised = ordering.replace('+', " ");
            let mut parts = normalised.split_whitespace();
            let field = parts.next()?;
            let direction = match parts.next() {
                Some(dir) if dir.eq_ignore_ascii_case("desc") => OrderDirection::Descending,
                _ => OrderDirection::Ascending,
            };
            Some(QueryOrder {
                mapping: QueryMapping::from_element(field),
                direction,
            })
        })
        .collect()
}

fn storage_key(parsed: &ParsedNamedQuery) -> String {
    let mut key = format!(
        "{}/{}/{}",
        parsed.customer,
        parsed.kind.as_str(),
        parsed.query_name
    );
    if !parsed.args.is_empty() {
        key.push('/');
        key.push_str(&parsed.args.join("/"));
    }
    key.push('/');
    key.push_str(&parsed.object_name);
    key
}

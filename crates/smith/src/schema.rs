//! Turn a function signature plus its documentation block into a
//! [`FunctionDescriptor`] the model can call.
//!
//! Parameter types are described by the closed [`ParamKind`] union. Rust types
//! map into it through [`SchemaType`]; textual annotations (as written in a
//! doc block or a config file) map into it through [`ParamKind::parse`], which
//! rejects anything it does not recognise.
//!
//! Documentation blocks use the sectioned layout:
//!
//! ```text
//! Get the weather for a city.
//!
//! Args:
//!     city (str): The city to look up.
//!     days (int): How many days to forecast.
//!
//! Returns:
//!     A forecast per day.
//! ```
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::function::{FunctionDescriptor, ParameterSchema};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Malformed type annotation `{annotation}`: {reason}")]
    MalformedAnnotation { annotation: String, reason: String },

    #[error("Function `{0}` has no description")]
    MissingDescription(String),

    #[error("Parameter `{param}` of `{function}` is documented but not declared")]
    UnknownParameter { function: String, param: String },

    #[error("Parameter `{param}` of `{function}` has no description")]
    UndocumentedParameter { function: String, param: String },

    #[error("Parameter `{param}` of `{function}` is declared twice")]
    DuplicateParameter { function: String, param: String },
}

/// The parameter types a callable may declare
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Number,
    String,
    Boolean,
    Null,
    /// Untyped; accepts any JSON value
    Any,
    Array(Box<ParamKind>),
    Map(Box<ParamKind>, Box<ParamKind>),
    Union(Vec<ParamKind>),
    Enum(Vec<Value>),
    Tuple(Vec<ParamKind>),
    Set(Box<ParamKind>),
}

impl ParamKind {
    /// The JSON-schema fragment for this kind
    pub fn to_schema(&self) -> Value {
        match self {
            ParamKind::Number => json!({"type": "number"}),
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::Null => json!({"type": "null"}),
            ParamKind::Any => json!({"type": "object"}),
            ParamKind::Array(item) => json!({"type": "array", "items": item.to_schema()}),
            ParamKind::Map(key, value) => json!({
                "type": "object",
                "properties": {
                    "key": key.to_schema(),
                    "value": value.to_schema(),
                }
            }),
            ParamKind::Union(options) => {
                json!({"anyOf": options.iter().map(ParamKind::to_schema).collect::<Vec<_>>()})
            }
            ParamKind::Enum(values) => json!({"enum": values}),
            ParamKind::Tuple(items) => json!({
                "type": "array",
                "items": items.iter().map(ParamKind::to_schema).collect::<Vec<_>>()
            }),
            ParamKind::Set(item) => json!({
                "type": "array",
                "items": item.to_schema(),
                "uniqueItems": true
            }),
        }
    }

    /// Parse a textual type annotation such as `list[int]`, `Dict[str, float]`,
    /// `Optional[str]`, `Literal['a', 'b']` or `HashMap<String, i64>`.
    pub fn parse(annotation: &str) -> Result<ParamKind, SchemaError> {
        let mut parser = AnnotationParser::new(annotation);
        let kind = parser.union()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.malformed("unexpected trailing input"));
        }
        Ok(kind)
    }
}

/// Types that can be declared as callable parameters
pub trait SchemaType {
    fn param_kind() -> ParamKind;
}

macro_rules! number_kind {
    ($($t:ty),*) => {
        $(impl SchemaType for $t {
            fn param_kind() -> ParamKind {
                ParamKind::Number
            }
        })*
    };
}

number_kind!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl SchemaType for String {
    fn param_kind() -> ParamKind {
        ParamKind::String
    }
}

impl SchemaType for &str {
    fn param_kind() -> ParamKind {
        ParamKind::String
    }
}

impl SchemaType for bool {
    fn param_kind() -> ParamKind {
        ParamKind::Boolean
    }
}

impl SchemaType for () {
    fn param_kind() -> ParamKind {
        ParamKind::Null
    }
}

impl SchemaType for Value {
    fn param_kind() -> ParamKind {
        ParamKind::Any
    }
}

impl<T: SchemaType> SchemaType for Option<T> {
    fn param_kind() -> ParamKind {
        ParamKind::Union(vec![T::param_kind(), ParamKind::Null])
    }
}

impl<T: SchemaType> SchemaType for Vec<T> {
    fn param_kind() -> ParamKind {
        ParamKind::Array(Box::new(T::param_kind()))
    }
}

impl<T: SchemaType> SchemaType for VecDeque<T> {
    fn param_kind() -> ParamKind {
        ParamKind::Array(Box::new(T::param_kind()))
    }
}

impl<T: SchemaType, S> SchemaType for HashSet<T, S> {
    fn param_kind() -> ParamKind {
        ParamKind::Set(Box::new(T::param_kind()))
    }
}

impl<T: SchemaType> SchemaType for BTreeSet<T> {
    fn param_kind() -> ParamKind {
        ParamKind::Set(Box::new(T::param_kind()))
    }
}

impl<K: SchemaType, V: SchemaType, S> SchemaType for HashMap<K, V, S> {
    fn param_kind() -> ParamKind {
        ParamKind::Map(Box::new(K::param_kind()), Box::new(V::param_kind()))
    }
}

impl<K: SchemaType, V: SchemaType> SchemaType for BTreeMap<K, V> {
    fn param_kind() -> ParamKind {
        ParamKind::Map(Box::new(K::param_kind()), Box::new(V::param_kind()))
    }
}

macro_rules! tuple_kind {
    ($($name:ident),+) => {
        impl<$($name: SchemaType),+> SchemaType for ($($name,)+) {
            fn param_kind() -> ParamKind {
                ParamKind::Tuple(vec![$($name::param_kind()),+])
            }
        }
    };
}

tuple_kind!(A);
tuple_kind!(A, B);
tuple_kind!(A, B, C);
tuple_kind!(A, B, C, D);
tuple_kind!(A, B, C, D, E);

/// A declared parameter: its name and type
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn new<S: Into<String>>(name: S, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// A parameter typed by a Rust type
    pub fn of<T: SchemaType>(name: &str) -> Self {
        Self::new(name, T::param_kind())
    }

    /// A parameter typed by a textual annotation
    pub fn annotated(name: &str, annotation: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(name, ParamKind::parse(annotation)?))
    }
}

/// One entry of the `Args:` section
#[derive(Debug, Clone, PartialEq)]
pub struct DocParam {
    pub name: String,
    pub type_name: Option<String>,
    pub description: String,
}

/// A parsed documentation block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionDoc {
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub params: Vec<DocParam>,
    pub returns: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Description,
    Args,
    Returns,
    Other,
}

fn section_header(line: &str) -> Option<Section> {
    let header = line.trim().strip_suffix(':')?;
    match header.to_ascii_lowercase().as_str() {
        "args" | "arguments" | "parameters" | "params" => Some(Section::Args),
        "returns" | "return" | "yields" => Some(Section::Returns),
        "raises" | "examples" | "example" | "note" | "notes" | "see also" => Some(Section::Other),
        _ => None,
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn push_text(target: &mut String, text: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

impl FunctionDoc {
    pub fn parse(doc: &str) -> FunctionDoc {
        let mut result = FunctionDoc::default();
        let mut section = Section::Description;
        let mut description: Vec<&str> = Vec::new();
        let mut returns = String::new();
        let mut entry_indent: Option<usize> = None;

        for line in doc.lines() {
            if let Some(next) = section_header(line) {
                section = next;
                entry_indent = None;
                continue;
            }
            let trimmed = line.trim();
            match section {
                Section::Description => description.push(trimmed),
                Section::Returns => {
                    if !trimmed.is_empty() {
                        push_text(&mut returns, trimmed);
                    }
                }
                Section::Args => {
                    if trimmed.is_empty() {
                        continue;
                    }
                    let indent = indent_of(line);
                    let continues = match (entry_indent, result.params.last()) {
                        (Some(base), Some(_)) => indent > base,
                        _ => false,
                    };
                    if continues {
                        if let Some(param) = result.params.last_mut() {
                            push_text(&mut param.description, trimmed);
                        }
                    } else if let Some(param) = parse_doc_param(trimmed) {
                        entry_indent = Some(indent);
                        result.params.push(param);
                    }
                }
                Section::Other => {}
            }
        }

        let text = description.join("\n");
        let text = text.trim();
        if !text.is_empty() {
            let mut parts = text.splitn(2, '\n');
            result.short_description = parts.next().map(|s| s.trim().to_string());
            result.long_description = parts
                .next()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        if !returns.is_empty() {
            result.returns = Some(returns);
        }
        result
    }
}

/// `name (type): description` or `name: description`
fn parse_doc_param(line: &str) -> Option<DocParam> {
    let (head, description) = line.split_once(':')?;
    let head = head.trim();
    let (name, type_name) = match head.split_once('(') {
        Some((name, rest)) => (
            name.trim(),
            Some(rest.trim_end_matches(')').trim().to_string()),
        ),
        None => (head, None),
    };
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(DocParam {
        name: name.to_string(),
        type_name,
        description: description.trim().to_string(),
    })
}

/// Build the descriptor for a callable named `name`, documented by `doc`,
/// declaring `params` in order.
///
/// Every declared parameter is listed as required, whether or not the
/// callable can work without it.
pub fn generate_schema(
    name: &str,
    doc: &str,
    params: &[Param],
) -> Result<FunctionDescriptor, SchemaError> {
    let parsed = FunctionDoc::parse(doc);
    let description = parsed
        .short_description
        .clone()
        .ok_or_else(|| SchemaError::MissingDescription(name.to_string()))?;

    let mut declared: BTreeMap<&str, &ParamKind> = BTreeMap::new();
    for param in params {
        if declared.insert(param.name.as_str(), &param.kind).is_some() {
            return Err(SchemaError::DuplicateParameter {
                function: name.to_string(),
                param: param.name.clone(),
            });
        }
    }

    for doc_param in &parsed.params {
        if !declared.contains_key(doc_param.name.as_str()) {
            return Err(SchemaError::UnknownParameter {
                function: name.to_string(),
                param: doc_param.name.clone(),
            });
        }
    }

    let mut properties = Map::new();
    for param in params {
        let doc_param = parsed
            .params
            .iter()
            .find(|p| p.name == param.name)
            .ok_or_else(|| SchemaError::UndocumentedParameter {
                function: name.to_string(),
                param: param.name.clone(),
            })?;

        // a documented type must be one we can describe; it fills in untyped params
        let documented = doc_param
            .type_name
            .as_deref()
            .map(ParamKind::parse)
            .transpose()?;
        let kind = match (&param.kind, documented) {
            (ParamKind::Any, Some(documented)) => documented,
            (declared, _) => declared.clone(),
        };

        let mut property = kind.to_schema();
        if let Value::Object(fields) = &mut property {
            fields.insert("description".to_string(), json!(doc_param.description));
        }
        properties.insert(param.name.clone(), property);
    }

    let required = params.iter().map(|p| p.name.clone()).collect();

    Ok(FunctionDescriptor::new(
        name,
        description,
        ParameterSchema::new(properties, required),
    ))
}

struct AnnotationParser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> AnnotationParser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn malformed(&self, reason: &str) -> SchemaError {
        SchemaError::MalformedAnnotation {
            annotation: self.source.to_string(),
            reason: reason.to_string(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn union(&mut self) -> Result<ParamKind, SchemaError> {
        let mut options = vec![self.term()?];
        while self.eat('|') {
            options.push(self.term()?);
        }
        if options.len() == 1 {
            Ok(options.remove(0))
        } else {
            Ok(ParamKind::Union(options))
        }
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == ':')
        {
            self.bump();
        }
        &self.source[start..self.pos]
    }

    /// Comma separated annotations up to `close`
    fn arguments(&mut self, close: char) -> Result<Vec<ParamKind>, SchemaError> {
        let mut args = Vec::new();
        if self.eat(close) {
            return Ok(args);
        }
        loop {
            args.push(self.union()?);
            if self.eat(close) {
                return Ok(args);
            }
            if !self.eat(',') {
                return Err(self.malformed(&format!("expected `,` or `{}`", close)));
            }
        }
    }

    fn literals(&mut self, close: char) -> Result<Vec<Value>, SchemaError> {
        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            let value = match self.peek() {
                Some(quote @ ('\'' | '"')) => {
                    self.bump();
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c != quote) {
                        self.bump();
                    }
                    let text = &self.source[start..self.pos];
                    if self.bump() != Some(quote) {
                        return Err(self.malformed("unterminated string literal"));
                    }
                    Value::String(text.to_string())
                }
                Some(_) => {
                    let start = self.pos;
                    while self
                        .peek()
                        .is_some_and(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_')
                    {
                        self.bump();
                    }
                    let token = &self.source[start..self.pos];
                    match token {
                        "True" | "true" => Value::Bool(true),
                        "False" | "false" => Value::Bool(false),
                        "None" | "null" => Value::Null,
                        _ => serde_json::from_str::<serde_json::Number>(token)
                            .map(Value::Number)
                            .map_err(|_| self.malformed("invalid literal value"))?,
                    }
                }
                None => return Err(self.malformed("unterminated literal")),
            };
            values.push(value);
            if self.eat(close) {
                return Ok(values);
            }
            if !self.eat(',') {
                return Err(self.malformed(&format!("expected `,` or `{}`", close)));
            }
        }
    }

    fn term(&mut self) -> Result<ParamKind, SchemaError> {
        self.skip_whitespace();
        if self.eat('&') {
            self.skip_whitespace();
        }
        if self.eat('(') {
            let items = self.arguments(')')?;
            return Ok(if items.is_empty() {
                ParamKind::Null
            } else {
                ParamKind::Tuple(items)
            });
        }

        let identifier = self.identifier();
        if identifier.is_empty() {
            return Err(self.malformed("expected a type name"));
        }
        let base = identifier
            .rsplit(|c: char| c == '.' || c == ':')
            .next()
            .unwrap_or(identifier);
        let lowered = base.to_ascii_lowercase();

        self.skip_whitespace();
        let close = match self.peek() {
            Some('[') => Some(']'),
            Some('<') => Some('>'),
            _ => None,
        };

        let Some(close) = close else {
            return match lowered.as_str() {
                "int" | "float" | "number" | "integer" | "double" | "i8" | "i16" | "i32"
                | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128" | "usize"
                | "f32" | "f64" => Ok(ParamKind::Number),
                "str" | "string" => Ok(ParamKind::String),
                "bool" | "boolean" => Ok(ParamKind::Boolean),
                "none" | "null" | "nonetype" => Ok(ParamKind::Null),
                "any" | "object" | "value" => Ok(ParamKind::Any),
                _ => Err(SchemaError::UnsupportedType(identifier.to_string())),
            };
        };
        self.bump();

        if lowered == "literal" {
            return Ok(ParamKind::Enum(self.literals(close)?));
        }

        let mut args = self.arguments(close)?;
        let arity = |expected: usize, args: &Vec<ParamKind>| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(SchemaError::MalformedAnnotation {
                    annotation: self.source.to_string(),
                    reason: format!("`{}` takes {} type argument(s)", identifier, expected),
                })
            }
        };

        match lowered.as_str() {
            "list" | "vec" | "array" | "sequence" | "vecdeque" => {
                arity(1, &args)?;
                Ok(ParamKind::Array(Box::new(args.remove(0))))
            }
            "set" | "frozenset" | "hashset" | "btreeset" => {
                arity(1, &args)?;
                Ok(ParamKind::Set(Box::new(args.remove(0))))
            }
            "dict" | "mapping" | "map" | "hashmap" | "btreemap" => {
                arity(2, &args)?;
                let value = args.remove(1);
                let key = args.remove(0);
                Ok(ParamKind::Map(Box::new(key), Box::new(value)))
            }
            "optional" | "option" => {
                arity(1, &args)?;
                Ok(ParamKind::Union(vec![args.remove(0), ParamKind::Null]))
            }
            "union" => {
                if args.is_empty() {
                    return Err(self.malformed("`Union` needs at least one type argument"));
                }
                Ok(ParamKind::Union(args))
            }
            "tuple" => Ok(ParamKind::Tuple(args)),
            _ => Err(SchemaError::UnsupportedType(identifier.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(i64::param_kind().to_schema(), json!({"type": "number"}));
        assert_eq!(f32::param_kind().to_schema(), json!({"type": "number"}));
        assert_eq!(String::param_kind().to_schema(), json!({"type": "string"}));
        assert_eq!(bool::param_kind().to_schema(), json!({"type": "boolean"}));
        assert_eq!(Value::param_kind().to_schema(), json!({"type": "object"}));
    }

    #[test]
    fn test_nested_maps() {
        let kind = HashMap::<String, HashMap<String, i32>>::param_kind();
        assert_eq!(
            kind.to_schema(),
            json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string"},
                    "value": {
                        "type": "object",
                        "properties": {
                            "key": {"type": "string"},
                            "value": {"type": "number"}
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            Vec::<Vec<String>>::param_kind().to_schema(),
            json!({"type": "array", "items": {"type": "array", "items": {"type": "string"}}})
        );
        assert_eq!(
            Vec::<BTreeMap<String, i32>>::param_kind().to_schema(),
            json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"key": {"type": "string"}, "value": {"type": "number"}}
                }
            })
        );
    }

    #[test]
    fn test_option_tuple_and_set() {
        assert_eq!(
            Option::<String>::param_kind().to_schema(),
            json!({"anyOf": [{"type": "string"}, {"type": "null"}]})
        );
        assert_eq!(
            <(String, i32)>::param_kind().to_schema(),
            json!({"type": "array", "items": [{"type": "string"}, {"type": "number"}]})
        );
        assert_eq!(
            HashSet::<String>::param_kind().to_schema(),
            json!({"type": "array", "items": {"type": "string"}, "uniqueItems": true})
        );
    }

    #[test]
    fn test_parse_python_annotations() -> Result<(), SchemaError> {
        assert_eq!(ParamKind::parse("str")?, ParamKind::String);
        assert_eq!(ParamKind::parse("int")?, ParamKind::Number);
        assert_eq!(ParamKind::parse("float")?, ParamKind::Number);
        assert_eq!(
            ParamKind::parse("typing.Dict[str, int]")?,
            HashMap::<String, i64>::param_kind()
        );
        assert_eq!(
            ParamKind::parse("List[List[str]]")?,
            Vec::<Vec<String>>::param_kind()
        );
        assert_eq!(
            ParamKind::parse("Optional[str]")?,
            Option::<String>::param_kind()
        );
        assert_eq!(
            ParamKind::parse("Union[int, str]")?,
            ParamKind::Union(vec![ParamKind::Number, ParamKind::String])
        );
        assert_eq!(
            ParamKind::parse("tuple[str, int]")?,
            <(String, u8)>::param_kind()
        );
        assert_eq!(ParamKind::parse("set[str]")?, HashSet::<String>::param_kind());
        Ok(())
    }

    #[test]
    fn test_parse_rust_annotations() -> Result<(), SchemaError> {
        assert_eq!(
            ParamKind::parse("HashMap<String, Vec<f64>>")?,
            HashMap::<String, Vec<f64>>::param_kind()
        );
        assert_eq!(ParamKind::parse("&str")?, ParamKind::String);
        assert_eq!(
            ParamKind::parse("(String, bool)")?,
            <(String, bool)>::param_kind()
        );
        assert_eq!(
            ParamKind::parse("i64 | None")?,
            ParamKind::Union(vec![ParamKind::Number, ParamKind::Null])
        );
        Ok(())
    }

    #[test]
    fn test_parse_literal() -> Result<(), SchemaError> {
        let kind = ParamKind::parse("Literal['celsius', \"fahrenheit\", 3, True]")?;
        assert_eq!(
            kind.to_schema(),
            json!({"enum": ["celsius", "fahrenheit", 3, true]})
        );
        Ok(())
    }

    #[test]
    fn test_parse_unsupported() {
        assert_eq!(
            ParamKind::parse("datetime"),
            Err(SchemaError::UnsupportedType("datetime".to_string()))
        );
        assert!(matches!(
            ParamKind::parse("List[Frobnicator]"),
            Err(SchemaError::UnsupportedType(_))
        ));
        assert!(matches!(
            ParamKind::parse("Dict[str]"),
            Err(SchemaError::MalformedAnnotation { .. })
        ));
        assert!(matches!(
            ParamKind::parse("List[int"),
            Err(SchemaError::MalformedAnnotation { .. })
        ));
        assert!(matches!(
            ParamKind::parse("list"),
            Err(SchemaError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_parse_doc() {
        let doc = "Runs a timer.\n\
                   \n\
                   Longer explanation of the timer.\n\
                   \n\
                   Args:\n    num_seconds (int): The number of seconds to run\n        the timer for.\n    label: A label.\n\
                   \n\
                   Returns:\n    A series of messages.";
        let parsed = FunctionDoc::parse(doc);
        assert_eq!(parsed.short_description.as_deref(), Some("Runs a timer."));
        assert_eq!(
            parsed.long_description.as_deref(),
            Some("Longer explanation of the timer.")
        );
        assert_eq!(parsed.params.len(), 2);
        assert_eq!(parsed.params[0].name, "num_seconds");
        assert_eq!(parsed.params[0].type_name.as_deref(), Some("int"));
        assert_eq!(
            parsed.params[0].description,
            "The number of seconds to run the timer for."
        );
        assert_eq!(parsed.params[1].name, "label");
        assert_eq!(parsed.params[1].type_name, None);
        assert_eq!(parsed.returns.as_deref(), Some("A series of messages."));
    }

    #[test]
    fn test_generate_schema() -> Result<(), SchemaError> {
        let doc = indoc::indoc! {"
            Echo the input back.

            Args:
                x (str): The text to echo.
                times (int): How many times.
        "};
        let descriptor = generate_schema(
            "echo",
            doc,
            &[Param::of::<String>("x"), Param::of::<u32>("times")],
        )?;

        assert_eq!(descriptor.name, "echo");
        assert_eq!(descriptor.description, "Echo the input back.");
        assert_eq!(
            serde_json::to_value(&descriptor.parameters).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "x": {"type": "string", "description": "The text to echo."},
                    "times": {"type": "number", "description": "How many times."}
                },
                "required": ["x", "times"]
            })
        );
        Ok(())
    }

    #[test]
    fn test_generate_schema_is_deterministic() -> Result<(), SchemaError> {
        let doc = "Look things up.\n\nArgs:\n    terms (list[str]): Search terms.\n    limit (Optional[int]): Max results.";
        let params = [
            Param::annotated("terms", "list[str]")?,
            Param::annotated("limit", "Optional[int]")?,
        ];
        let first = serde_json::to_string(&generate_schema("lookup", doc, &params)?).unwrap();
        let second = serde_json::to_string(&generate_schema("lookup", doc, &params)?).unwrap();
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_every_parameter_is_required() -> Result<(), SchemaError> {
        // `limit` can be null but is still listed as required
        let doc = "Search.\n\nArgs:\n    term (str): What to find.\n    limit (Optional[int]): Max results.";
        let descriptor = generate_schema(
            "search",
            doc,
            &[Param::of::<String>("term"), Param::of::<Option<i32>>("limit")],
        )?;
        assert_eq!(descriptor.parameters.required, vec!["term", "limit"]);
        Ok(())
    }

    #[test]
    fn test_documented_type_must_be_supported() {
        let doc = "Schedule it.\n\nArgs:\n    when (datetime): When to run.";
        assert_eq!(
            generate_schema("schedule", doc, &[Param::of::<String>("when")]),
            Err(SchemaError::UnsupportedType("datetime".to_string()))
        );
    }

    #[test]
    fn test_documented_type_describes_untyped_param() -> Result<(), SchemaError> {
        let doc = "Tag items.\n\nArgs:\n    tags (Dict[str, int]): Tag weights.\n    extra: Anything else.";
        let descriptor = generate_schema(
            "tag",
            doc,
            &[Param::of::<Value>("tags"), Param::of::<Value>("extra")],
        )?;
        assert_eq!(
            descriptor.parameters.properties["tags"],
            json!({
                "type": "object",
                "properties": {"key": {"type": "string"}, "value": {"type": "number"}},
                "description": "Tag weights."
            })
        );
        assert_eq!(
            descriptor.parameters.properties["extra"],
            json!({"type": "object", "description": "Anything else."})
        );
        Ok(())
    }

    #[test]
    fn test_generate_schema_no_params() -> Result<(), SchemaError> {
        let descriptor = generate_schema("time", "Get the current date and time.\n\nReturns: a string", &[])?;
        assert!(descriptor.parameters.properties.is_empty());
        assert!(descriptor.parameters.required.is_empty());
        Ok(())
    }

    #[test]
    fn test_generate_schema_errors() {
        assert_eq!(
            generate_schema("f", "", &[]),
            Err(SchemaError::MissingDescription("f".to_string()))
        );
        assert!(matches!(
            generate_schema("f", "Does f.\n\nArgs:\n    y (str): why", &[Param::of::<String>("x")]),
            Err(SchemaError::UnknownParameter { .. })
        ));
        assert!(matches!(
            generate_schema("f", "Does f.", &[Param::of::<String>("x")]),
            Err(SchemaError::UndocumentedParameter { .. })
        ));
        assert!(matches!(
            generate_schema(
                "f",
                "Does f.\n\nArgs:\n    x (str): ex",
                &[Param::of::<String>("x"), Param::of::<i32>("x")]
            ),
            Err(SchemaError::DuplicateParameter { .. })
        ));
    }
}

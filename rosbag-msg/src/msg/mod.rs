#![allow(missing_docs)]

//! MSG format parser.
//!
//! Parses single message definitions and concatenated multi-type blobs
//! (definitions separated by a line of 80 `=` characters, each introduced by
//! an `MSG:` header) into type descriptors.

use std::collections::HashMap;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use rosbag_types::{
    BaseType, ConstDef, ConstValue, ElementType, FieldDef, FieldType, PrimitiveKind,
    TypeDescriptor, normalize_fieldname, normalize_typename,
};

use crate::errors::{ParseError, ParseResult};

#[allow(missing_docs)]
#[derive(Parser)]
#[grammar = "msg/msg.pest"]
struct MsgParser;

/// Parse message definition text into type descriptors.
///
/// `name` is the declared primary type name; additional types in a
/// concatenated blob are keyed by their own `MSG:` headers. Unqualified type
/// references resolve against siblings declared in the same blob, then
/// against the owner's package.
///
/// # Errors
///
/// Returns [`ParseError`] when the text does not match the MSG grammar or
/// uses a non-primitive constant type.
pub fn get_types_from_msg(
    text: &str,
    name: &str,
) -> ParseResult<HashMap<String, TypeDescriptor>> {
    let input = format!("MSG: {name}\n{text}");
    let mut pairs = MsgParser::parse(Rule::specification, &input)
        .map_err(|err| ParseError::from_pest(&err))?;
    let spec = pairs
        .next()
        .ok_or_else(|| ParseError::invalid("empty specification"))?;

    let mut parsed: Vec<(String, Vec<ConstDef>, Vec<FieldDef>)> = Vec::new();
    for msgdef in spec.into_inner().filter(|p| p.as_rule() == Rule::msgdef) {
        parsed.push(visit_msgdef(msgdef)?);
    }

    // Unqualified references may point at any sibling declared in the blob.
    let basenames: HashMap<String, String> = parsed
        .iter()
        .map(|(name, _, _)| {
            let base = name.rsplit('/').next().unwrap_or(name).to_string();
            (base, name.clone())
        })
        .collect();

    let mut types = HashMap::new();
    for (name, constants, fields) in parsed {
        let fields = fields
            .into_iter()
            .map(|field| FieldDef {
                ty: resolve_fieldtype(field.ty, &name, &basenames),
                name: field.name,
            })
            .collect();
        types.insert(name.clone(), TypeDescriptor::new(&name, constants, fields));
    }
    Ok(types)
}

fn visit_msgdef(pair: Pair<'_, Rule>) -> ParseResult<(String, Vec<ConstDef>, Vec<FieldDef>)> {
    let mut name = String::new();
    let mut constants = Vec::new();
    let mut fields = Vec::new();

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::scoped_name => name = normalize_typename(item.as_str()),
            Rule::const_dcl => constants.push(visit_const_dcl(item)?),
            Rule::field_dcl => fields.push(visit_field_dcl(item)?),
            _ => {}
        }
    }
    Ok((name, constants, fields))
}

fn visit_const_dcl(pair: Pair<'_, Rule>) -> ParseResult<ConstDef> {
    let dcl = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::invalid("empty constant declaration"))?;
    match dcl.as_rule() {
        Rule::string_const_dcl => {
            let mut name = String::new();
            let mut value = String::new();
            for item in dcl.into_inner() {
                match item.as_rule() {
                    Rule::identifier => name = item.as_str().to_string(),
                    Rule::string_const_value => value = item.as_str().trim().to_string(),
                    _ => {}
                }
            }
            Ok(ConstDef {
                name: normalize_fieldname(&name),
                kind: PrimitiveKind::String,
                value: ConstValue::Str(value),
            })
        }
        Rule::typed_const_dcl => {
            let mut inner = dcl.into_inner();
            let type_spec = inner
                .next()
                .ok_or_else(|| ParseError::invalid("constant without type"))?;
            let kind = match visit_type_spec(type_spec)? {
                FieldType::Base(base) if base.limit == 0 => base.kind,
                other => {
                    return Err(ParseError::invalid(&format!(
                        "constant type must be primitive, got {other:?}"
                    )));
                }
            };
            let name = inner
                .next()
                .ok_or_else(|| ParseError::invalid("constant without name"))?
                .as_str();
            let value = inner
                .next()
                .ok_or_else(|| ParseError::invalid("constant without value"))?;
            Ok(ConstDef {
                name: normalize_fieldname(name),
                kind,
                value: visit_scalar_literal(&value)?,
            })
        }
        _ => Err(ParseError::invalid("unexpected constant declaration")),
    }
}

fn visit_field_dcl(pair: Pair<'_, Rule>) -> ParseResult<FieldDef> {
    let mut inner = pair.into_inner();
    let ty = visit_type_spec(
        inner
            .next()
            .ok_or_else(|| ParseError::invalid("field without type"))?,
    )?;
    let name = inner
        .next()
        .ok_or_else(|| ParseError::invalid("field without name"))?
        .as_str();
    // A trailing default value is validated by the grammar but not retained;
    // descriptors carry structure only.
    Ok(FieldDef {
        name: normalize_fieldname(name),
        ty,
    })
}

fn visit_type_spec(pair: Pair<'_, Rule>) -> ParseResult<FieldType> {
    let spec = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::invalid("empty type specifier"))?;
    match spec.as_rule() {
        Rule::simple_type_spec => Ok(match visit_simple_type_spec(spec)? {
            ElementType::Base(base) => FieldType::Base(base),
            ElementType::Name(name) => FieldType::Name(name),
        }),
        Rule::array_type_spec => {
            let mut inner = spec.into_inner();
            let elem = visit_simple_type_spec(
                inner
                    .next()
                    .ok_or_else(|| ParseError::invalid("array without element type"))?,
            )?;
            let size = inner
                .next()
                .and_then(|p| p.into_inner().next())
                .map(|p| visit_integer(&p))
                .transpose()?;
            Ok(match size {
                Some(len) => FieldType::Array(elem, cast_len(len)?),
                None => FieldType::Sequence(elem, 0),
            })
        }
        Rule::bounded_array_type_spec => {
            let mut inner = spec.into_inner();
            let elem = visit_simple_type_spec(
                inner
                    .next()
                    .ok_or_else(|| ParseError::invalid("bounded array without element type"))?,
            )?;
            let bound = inner
                .next()
                .and_then(|p| p.into_inner().next())
                .map(|p| visit_integer(&p))
                .transpose()?
                .ok_or_else(|| ParseError::invalid("bounded array without bound"))?;
            Ok(FieldType::Sequence(elem, cast_len(bound)?))
        }
        _ => Err(ParseError::invalid("unexpected type specifier")),
    }
}

fn visit_simple_type_spec(pair: Pair<'_, Rule>) -> ParseResult<ElementType> {
    let spec = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::invalid("empty simple type specifier"))?;
    match spec.as_rule() {
        Rule::bounded_string_spec => {
            let bound = spec
                .into_inner()
                .find(|p| p.as_rule() == Rule::integer_literal)
                .map(|p| visit_integer(&p))
                .transpose()?
                .ok_or_else(|| ParseError::invalid("bounded string without bound"))?;
            Ok(ElementType::Base(BaseType::bounded_string(cast_len(bound)?)))
        }
        Rule::scoped_name => Ok(match spec.as_str() {
            "time" => ElementType::Name("builtin_interfaces/msg/Time".to_string()),
            "duration" => ElementType::Name("builtin_interfaces/msg/Duration".to_string()),
            name => match PrimitiveKind::parse(name) {
                Some(kind) => ElementType::Base(BaseType::new(kind)),
                None => ElementType::Name(name.to_string()),
            },
        }),
        _ => Err(ParseError::invalid("unexpected simple type specifier")),
    }
}

fn visit_scalar_literal(pair: &Pair<'_, Rule>) -> ParseResult<ConstValue> {
    match pair.as_rule() {
        Rule::float_literal => pair
            .as_str()
            .parse()
            .map(ConstValue::Float)
            .map_err(|_| ParseError::invalid("invalid float literal")),
        Rule::integer_literal => Ok(ConstValue::Int(visit_integer(pair)?)),
        Rule::boolean_literal => Ok(ConstValue::Bool(matches!(
            pair.as_str().to_ascii_lowercase().as_str(),
            "true" | "1"
        ))),
        _ => Err(ParseError::invalid("unexpected literal")),
    }
}

fn visit_integer(pair: &Pair<'_, Rule>) -> ParseResult<i64> {
    let inner = pair
        .clone()
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::invalid("empty integer literal"))?;
    let text = inner.as_str();
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let value = match inner.as_rule() {
        Rule::hexadecimal_literal => i64::from_str_radix(&digits[2..], 16),
        Rule::octal_literal => i64::from_str_radix(&digits[1..], 8),
        _ => digits.parse(),
    }
    .map_err(|_| ParseError::invalid(&format!("invalid integer literal {text:?}")))?;
    Ok(sign * value)
}

fn cast_len(value: i64) -> ParseResult<u64> {
    u64::try_from(value).map_err(|_| ParseError::invalid("negative array size"))
}

/// Resolve unqualified and partially qualified type references.
fn resolve_fieldtype(
    ty: FieldType,
    owner: &str,
    basenames: &HashMap<String, String>,
) -> FieldType {
    match ty {
        FieldType::Name(name) => FieldType::Name(resolve_name(&name, owner, basenames)),
        FieldType::Array(ElementType::Name(name), len) => {
            FieldType::Array(ElementType::Name(resolve_name(&name, owner, basenames)), len)
        }
        FieldType::Sequence(ElementType::Name(name), bound) => FieldType::Sequence(
            ElementType::Name(resolve_name(&name, owner, basenames)),
            bound,
        ),
        other => other,
    }
}

fn resolve_name(name: &str, owner: &str, basenames: &HashMap<String, String>) -> String {
    if let Some(full) = basenames.get(name) {
        return full.clone();
    }
    if name == "Header" {
        return "std_msgs/msg/Header".to_string();
    }
    if !name.contains('/') {
        let parent = owner.rsplit_once('/').map_or("", |(parent, _)| parent);
        return format!("{parent}/{name}");
    }
    if !name.contains("/msg/") {
        return normalize_typename(name);
    }
    name.to_string()
}

#![allow(missing_docs)]

//! OMG IDL parser.
//!
//! Parses the IDL subset emitted by `rosidl_adapter`: nested modules
//! (flattened into the registry key), `typedef` expansion, `<name>_Constants`
//! modules, annotations (ignored), and constant literal expressions reduced
//! to values.

use std::collections::HashMap;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use rosbag_types::{
    BaseType, ConstDef, ConstValue, ElementType, FieldDef, FieldType, PrimitiveKind,
    TypeDescriptor, normalize_fieldname,
};

use crate::errors::{ParseError, ParseResult};

#[allow(missing_docs)]
#[derive(Parser)]
#[grammar = "idl/idl.pest"]
struct IdlParser;

/// Parse IDL text into type descriptors.
///
/// Only structs produce descriptors; constants outside `<name>_Constants`
/// modules and preprocessor directives are ignored.
///
/// # Errors
///
/// Returns [`ParseError`] when the text does not match the IDL grammar, an
/// expression cannot be reduced to a value, or a member type is not
/// expressible as a descriptor.
pub fn get_types_from_idl(text: &str) -> ParseResult<HashMap<String, TypeDescriptor>> {
    let mut pairs = IdlParser::parse(Rule::specification, text)
        .map_err(|err| ParseError::from_pest(&err))?;
    let spec = pairs
        .next()
        .ok_or_else(|| ParseError::invalid("empty specification"))?;

    let mut scope = Scope {
        namespaces: Vec::new(),
        typedefs: HashMap::new(),
    };
    let mut types = HashMap::new();
    walk_definitions(spec.into_inner().collect(), &mut scope, &mut types)?;
    Ok(types)
}

struct Scope {
    namespaces: Vec<String>,
    typedefs: HashMap<String, FieldType>,
}

impl Scope {
    fn qualify(&self, name: &str) -> String {
        if self.namespaces.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.namespaces.join("/"), name)
        }
    }
}

/// Process one module level: typedefs and constants modules first, then
/// structs and submodules.
fn walk_definitions(
    definitions: Vec<Pair<'_, Rule>>,
    scope: &mut Scope,
    types: &mut HashMap<String, TypeDescriptor>,
) -> ParseResult<()> {
    let mut constants: HashMap<String, Vec<ConstDef>> = HashMap::new();

    for def in &definitions {
        match def.as_rule() {
            Rule::typedef_dcl => visit_typedef(def.clone(), scope)?,
            Rule::module_dcl => {
                let (name, body) = split_module(def.clone())?;
                if let Some(base) = name.strip_suffix("_Constants") {
                    constants.insert(base.to_string(), visit_constants_module(body, scope)?);
                }
            }
            _ => {}
        }
    }

    for def in definitions {
        match def.as_rule() {
            Rule::struct_dcl => {
                let desc = visit_struct(def, scope, &mut constants)?;
                types.insert(desc.name.clone(), desc);
            }
            Rule::module_dcl => {
                let (name, body) = split_module(def)?;
                if name.ends_with("_Constants") {
                    continue;
                }
                scope.namespaces.push(name);
                walk_definitions(body, scope, types)?;
                scope.namespaces.pop();
            }
            _ => {}
        }
    }
    Ok(())
}

fn split_module(pair: Pair<'_, Rule>) -> ParseResult<(String, Vec<Pair<'_, Rule>>)> {
    let mut name = String::new();
    let mut body = Vec::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::identifier => name = item.as_str().to_string(),
            Rule::annotation => {}
            _ => body.push(item),
        }
    }
    if name.is_empty() {
        return Err(ParseError::invalid("module without name"));
    }
    Ok((name, body))
}

fn visit_constants_module(
    body: Vec<Pair<'_, Rule>>,
    scope: &Scope,
) -> ParseResult<Vec<ConstDef>> {
    let mut constants = Vec::new();
    for def in body {
        if def.as_rule() == Rule::const_dcl {
            constants.push(visit_const(def, scope)?);
        }
    }
    Ok(constants)
}

fn visit_const(pair: Pair<'_, Rule>, scope: &Scope) -> ParseResult<ConstDef> {
    let mut inner = pair.into_inner();
    let const_type = inner
        .next()
        .ok_or_else(|| ParseError::invalid("constant without type"))?;
    let ty = visit_type_spec(first_inner(const_type)?, scope)?;
    let kind = match ty {
        FieldType::Base(base) => base.kind,
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
    let expr = inner
        .next()
        .ok_or_else(|| ParseError::invalid("constant without value"))?;
    let value = match eval_expr(expr)? {
        ExprValue::Bool(v) => ConstValue::Bool(v),
        ExprValue::Int(v) => ConstValue::Int(v),
        ExprValue::Float(v) => ConstValue::Float(v),
        ExprValue::Str(v) => ConstValue::Str(v),
        ExprValue::Char(v) => ConstValue::Str(v.to_string()),
    };
    Ok(ConstDef {
        name: normalize_fieldname(name),
        kind,
        value,
    })
}

fn visit_typedef(pair: Pair<'_, Rule>, scope: &mut Scope) -> ParseResult<()> {
    let mut inner = pair.into_inner();
    let spec = inner
        .next()
        .ok_or_else(|| ParseError::invalid("typedef without type"))?;
    let mut ty = visit_type_spec(spec, scope)?;
    let name = inner
        .next()
        .ok_or_else(|| ParseError::invalid("typedef without name"))?
        .as_str()
        .to_string();
    for suffix in inner {
        let len = eval_u64(first_inner(suffix)?)?;
        ty = wrap_array(ty, len)?;
    }
    scope.typedefs.insert(name, ty);
    Ok(())
}

fn visit_struct(
    pair: Pair<'_, Rule>,
    scope: &Scope,
    constants: &mut HashMap<String, Vec<ConstDef>>,
) -> ParseResult<TypeDescriptor> {
    let mut name = String::new();
    let mut fields = Vec::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::identifier => name = item.as_str().to_string(),
            Rule::member => visit_member(item, scope, &mut fields)?,
            _ => {}
        }
    }
    if name.is_empty() {
        return Err(ParseError::invalid("struct without name"));
    }
    let consts = constants.remove(&name).unwrap_or_default();
    Ok(TypeDescriptor::new(&scope.qualify(&name), consts, fields))
}

fn visit_member(
    pair: Pair<'_, Rule>,
    scope: &Scope,
    fields: &mut Vec<FieldDef>,
) -> ParseResult<()> {
    let mut base_ty = None;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::type_spec => base_ty = Some(visit_type_spec(item, scope)?),
            Rule::declarator => {
                let ty = base_ty
                    .clone()
                    .ok_or_else(|| ParseError::invalid("member without type"))?;
                let mut inner = item.into_inner();
                let name = inner
                    .next()
                    .ok_or_else(|| ParseError::invalid("member without name"))?
                    .as_str();
                let mut ty = ty;
                for suffix in inner {
                    let len = eval_u64(first_inner(suffix)?)?;
                    ty = wrap_array(ty, len)?;
                }
                fields.push(FieldDef {
                    name: normalize_fieldname(name),
                    ty,
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn wrap_array(ty: FieldType, len: u64) -> ParseResult<FieldType> {
    let elem = element_type(ty)?;
    Ok(FieldType::Array(elem, len))
}

fn element_type(ty: FieldType) -> ParseResult<ElementType> {
    match ty {
        FieldType::Base(base) => Ok(ElementType::Base(base)),
        FieldType::Name(name) => Ok(ElementType::Name(name)),
        other => Err(ParseError::invalid(&format!(
            "nested aggregated types are not supported: {other:?}"
        ))),
    }
}

fn visit_type_spec(pair: Pair<'_, Rule>, scope: &Scope) -> ParseResult<FieldType> {
    let spec = if pair.as_rule() == Rule::type_spec {
        first_inner(pair)?
    } else {
        pair
    };
    match spec.as_rule() {
        Rule::base_type => Ok(FieldType::Base(BaseType::new(basetype_kind(
            spec.as_str(),
        )?))),
        Rule::string_type | Rule::wstring_type => {
            let bound = spec
                .into_inner()
                .find(|p| p.as_rule() == Rule::expr)
                .map(eval_u64)
                .transpose()?
                .unwrap_or(0);
            Ok(FieldType::Base(BaseType {
                kind: PrimitiveKind::String,
                limit: bound,
            }))
        }
        Rule::sequence_type => {
            let mut elem = None;
            let mut bound = 0;
            for item in spec.into_inner() {
                match item.as_rule() {
                    Rule::type_spec => elem = Some(visit_type_spec(item, scope)?),
                    Rule::expr => bound = eval_u64(item)?,
                    _ => {}
                }
            }
            let elem = elem.ok_or_else(|| ParseError::invalid("sequence without element type"))?;
            Ok(FieldType::Sequence(element_type(elem)?, bound))
        }
        Rule::scoped_name => Ok(resolve_scoped_name(spec.as_str(), scope)),
        _ => Err(ParseError::invalid("unexpected type specifier")),
    }
}

fn resolve_scoped_name(name: &str, scope: &Scope) -> FieldType {
    if name.contains("::") {
        return FieldType::Name(name.replace("::", "/"));
    }
    if let Some(ty) = scope.typedefs.get(name) {
        return ty.clone();
    }
    FieldType::Name(scope.qualify(name))
}

/// IDL basetype name to wire primitive kind.
fn basetype_kind(name: &str) -> ParseResult<PrimitiveKind> {
    Ok(match name {
        "boolean" => PrimitiveKind::Bool,
        "octet" => PrimitiveKind::Octet,
        "char" => PrimitiveKind::UInt8,
        "wchar" | "unsigned short" => PrimitiveKind::UInt16,
        "float" => PrimitiveKind::Float32,
        "double" | "long double" => PrimitiveKind::Float64,
        "short" => PrimitiveKind::Int16,
        "long" | "int" => PrimitiveKind::Int32,
        "long long" => PrimitiveKind::Int64,
        "unsigned long" => PrimitiveKind::UInt32,
        "unsigned long long" => PrimitiveKind::UInt64,
        other => PrimitiveKind::parse(other)
            .ok_or_else(|| ParseError::invalid(&format!("unknown basetype {other:?}")))?,
    })
}

fn first_inner(pair: Pair<'_, Rule>) -> ParseResult<Pair<'_, Rule>> {
    pair.clone()
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::invalid(&format!("empty {:?}", pair.as_rule())))
}

// Constant expression evaluation

#[derive(Debug, Clone, PartialEq)]
enum ExprValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
}

fn eval_u64(pair: Pair<'_, Rule>) -> ParseResult<u64> {
    match eval_expr(pair)? {
        ExprValue::Int(v) if v >= 0 => Ok(u64::try_from(v).unwrap_or(0)),
        other => Err(ParseError::invalid(&format!(
            "expected a non-negative integer, got {other:?}"
        ))),
    }
}

fn eval_expr(pair: Pair<'_, Rule>) -> ParseResult<ExprValue> {
    match pair.as_rule() {
        Rule::expr | Rule::paren_expr | Rule::primary_expr => eval_expr(first_inner(pair)?),
        Rule::or_expr | Rule::xor_expr | Rule::and_expr => eval_fold(pair),
        Rule::shift_expr | Rule::add_expr | Rule::mul_expr => eval_fold(pair),
        Rule::unary_expr => {
            let mut op = None;
            let mut value = None;
            for item in pair.into_inner() {
                match item.as_rule() {
                    Rule::unary_op => op = Some(item.as_str().to_string()),
                    _ => value = Some(eval_expr(item)?),
                }
            }
            let value = value.ok_or_else(|| ParseError::invalid("empty unary expression"))?;
            apply_unary(op.as_deref(), value)
        }
        Rule::boolean_literal => Ok(ExprValue::Bool(
            pair.as_str().eq_ignore_ascii_case("true"),
        )),
        Rule::integer_literal => {
            let inner = first_inner(pair)?;
            let text = inner.as_str();
            let value = match inner.as_rule() {
                Rule::hexadecimal_literal => i64::from_str_radix(&text[2..], 16),
                Rule::octal_literal => i64::from_str_radix(&text[1..], 8),
                _ => text.parse(),
            }
            .map_err(|_| ParseError::invalid(&format!("invalid integer literal {text:?}")))?;
            Ok(ExprValue::Int(value))
        }
        Rule::float_literal => pair
            .as_str()
            .parse()
            .map(ExprValue::Float)
            .map_err(|_| ParseError::invalid("invalid float literal")),
        Rule::char_literal => {
            let content = first_inner(pair)?.as_str();
            let ch = unescape(content)
                .chars()
                .next()
                .ok_or_else(|| ParseError::invalid("empty char literal"))?;
            Ok(ExprValue::Char(ch))
        }
        Rule::string_concat => {
            let mut out = String::new();
            for part in pair.into_inner() {
                out.push_str(&unescape(first_inner(part)?.as_str()));
            }
            Ok(ExprValue::Str(out))
        }
        Rule::scoped_name => Err(ParseError::invalid(&format!(
            "cannot evaluate constant reference {:?}",
            pair.as_str()
        ))),
        other => Err(ParseError::invalid(&format!(
            "unexpected expression node {other:?}"
        ))),
    }
}

/// Resolve the escape sequences of a char or string literal body.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn eval_fold(pair: Pair<'_, Rule>) -> ParseResult<ExprValue> {
    let mut items = pair.into_inner();
    let mut acc = eval_expr(
        items
            .next()
            .ok_or_else(|| ParseError::invalid("empty expression"))?,
    )?;
    while let Some(op) = items.next() {
        let (op, rhs) = match op.as_rule() {
            Rule::shift_op | Rule::add_op | Rule::mul_op => {
                let rhs = items
                    .next()
                    .ok_or_else(|| ParseError::invalid("missing operand"))?;
                (op.as_str().to_string(), eval_expr(rhs)?)
            }
            // bitwise levels carry no operator pair, the separator is fixed
            Rule::xor_expr => ("|".to_string(), eval_expr(op)?),
            Rule::and_expr => ("^".to_string(), eval_expr(op)?),
            Rule::shift_expr => ("&".to_string(), eval_expr(op)?),
            _ => {
                return Err(ParseError::invalid("malformed expression"));
            }
        };
        acc = apply_binary(&op, acc, rhs)?;
    }
    Ok(acc)
}

fn apply_unary(op: Option<&str>, value: ExprValue) -> ParseResult<ExprValue> {
    match (op, value) {
        (None, value) | (Some("+"), value) => Ok(value),
        (Some("-"), ExprValue::Int(v)) => Ok(ExprValue::Int(-v)),
        (Some("-"), ExprValue::Float(v)) => Ok(ExprValue::Float(-v)),
        (Some("~"), ExprValue::Int(v)) => Ok(ExprValue::Int(!v)),
        (op, value) => Err(ParseError::invalid(&format!(
            "cannot apply {op:?} to {value:?}"
        ))),
    }
}

fn apply_binary(op: &str, lhs: ExprValue, rhs: ExprValue) -> ParseResult<ExprValue> {
    if let (ExprValue::Int(a), ExprValue::Int(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        let value = match op {
            "|" => a | b,
            "^" => a ^ b,
            "&" => a & b,
            "<<" => a.wrapping_shl(u32::try_from(b).unwrap_or(0)),
            ">>" => a.wrapping_shr(u32::try_from(b).unwrap_or(0)),
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" => a
                .checked_div(b)
                .ok_or_else(|| ParseError::invalid("division by zero"))?,
            "%" => a
                .checked_rem(b)
                .ok_or_else(|| ParseError::invalid("division by zero"))?,
            _ => return Err(ParseError::invalid(&format!("unknown operator {op:?}"))),
        };
        return Ok(ExprValue::Int(value));
    }
    let as_float = |v: &ExprValue| match v {
        ExprValue::Int(v) => Some(*v as f64),
        ExprValue::Float(v) => Some(*v),
        _ => None,
    };
    match (as_float(&lhs), as_float(&rhs)) {
        (Some(a), Some(b)) => {
            let value = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                _ => {
                    return Err(ParseError::invalid(&format!(
                        "cannot apply {op:?} to float operands"
                    )));
                }
            };
            Ok(ExprValue::Float(value))
        }
        _ => Err(ParseError::invalid(&format!(
            "cannot apply {op:?} to {lhs:?} and {rhs:?}"
        ))),
    }
}

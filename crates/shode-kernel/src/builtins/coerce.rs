//! String to typed argument coercion.
//!
//! Arguments stay strings until a builtin is called; this module is the one
//! place they turn into [`Value`]s, following the builtin's [`Signature`].

use std::fmt;
use std::time::Duration;

use crate::error::TypeError;

use super::{Param, ParamType, Signature};

/// A coerced argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Duration(Duration),
    List(Vec<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Duration(d) => write!(f, "{}ms", d.as_millis()),
            Value::List(items) => f.write_str(&items.join(" ")),
        }
    }
}

/// Coerce raw string arguments against `signature`.
///
/// Missing optional parameters are simply absent from the result, so
/// builtins index it by position and treat a short vector as "not given".
pub fn coerce_args(signature: &Signature, raw: &[String]) -> Result<Vec<Value>, TypeError> {
    let mut out = Vec::with_capacity(signature.params.len());
    let mut rest = raw;
    let last = signature.params.len().saturating_sub(1);

    for (index, param) in signature.params.iter().enumerate() {
        if param.ty == ParamType::StringList && index == last {
            out.push(Value::List(rest.to_vec()));
            rest = &[];
            break;
        }
        let Some((first, tail)) = rest.split_first() else {
            if param.optional {
                break;
            }
            return Err(type_error(signature, param, "<missing>"));
        };
        out.push(coerce_one(signature, param, first)?);
        rest = tail;
    }

    if let Some(extra) = rest.first() {
        return Err(TypeError {
            command: signature.name.clone(),
            param: "<extra>".to_string(),
            expected: format!("at most {} argument(s)", signature.params.len()),
            found: extra.clone(),
        });
    }
    Ok(out)
}

fn coerce_one(signature: &Signature, param: &Param, raw: &str) -> Result<Value, TypeError> {
    let value = match param.ty {
        ParamType::String => Some(Value::String(raw.to_string())),
        ParamType::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
        ParamType::Bool => parse_bool(raw).map(Value::Bool),
        ParamType::Duration => parse_duration(raw).map(Value::Duration),
        ParamType::StringList => Some(Value::List(
            raw.split_whitespace().map(str::to_string).collect(),
        )),
    };
    value.ok_or_else(|| type_error(signature, param, raw))
}

fn type_error(signature: &Signature, param: &Param, found: &str) -> TypeError {
    TypeError {
        command: signature.name.clone(),
        param: param.name.clone(),
        expected: param.ty.to_string(),
        found: found.to_string(),
    }
}

/// `true/false/yes/no/1/0/on/off`, case-insensitive.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// A bare integer (seconds) or a sequence of `<int><unit>` with units
/// `ms`, `s`, `m`, `h`: `90`, `1m30s`, `250ms`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = raw;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let step = match &rest[..unit_len] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.checked_mul(60)?),
            "h" => Duration::from_secs(amount.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(step)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sig(params: Vec<Param>) -> Signature {
        Signature::new("t").params(params)
    }

    #[rstest]
    #[case("5", Some(Duration::from_secs(5)))]
    #[case("250ms", Some(Duration::from_millis(250)))]
    #[case("1m30s", Some(Duration::from_secs(90)))]
    #[case("2h", Some(Duration::from_secs(7200)))]
    #[case("1h1m1s1ms", Some(Duration::from_millis(3_661_001)))]
    #[case("", None)]
    #[case("ms", None)]
    #[case("5d", None)]
    #[case("1.5s", None)]
    fn durations(#[case] raw: &str, #[case] expected: Option<Duration>) {
        assert_eq!(parse_duration(raw), expected);
    }

    #[rstest]
    #[case("true", Some(true))]
    #[case("YES", Some(true))]
    #[case("on", Some(true))]
    #[case("1", Some(true))]
    #[case("Off", Some(false))]
    #[case("no", Some(false))]
    #[case("0", Some(false))]
    #[case("maybe", None)]
    fn bools(#[case] raw: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_bool(raw), expected);
    }

    #[test]
    fn trailing_list_is_variadic() {
        let s = sig(vec![
            Param::required("sep", ParamType::String),
            Param::optional("items", ParamType::StringList),
        ]);
        let raw: Vec<String> = ["-", "a b", "c"].iter().map(|s| s.to_string()).collect();
        let values = coerce_args(&s, &raw).unwrap();
        assert_eq!(
            values,
            vec![
                Value::String("-".into()),
                Value::List(vec!["a b".into(), "c".into()]),
            ]
        );
    }

    #[test]
    fn inner_list_splits_on_whitespace() {
        let s = sig(vec![
            Param::required("words", ParamType::StringList),
            Param::required("count", ParamType::Int),
        ]);
        let raw = vec!["a  b c".to_string(), "3".to_string()];
        let values = coerce_args(&s, &raw).unwrap();
        assert_eq!(values[0], Value::List(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(values[1], Value::Int(3));
    }

    #[test]
    fn bad_int_is_a_type_error() {
        let s = sig(vec![Param::required("count", ParamType::Int)]);
        let err = coerce_args(&s, &["three".to_string()]).unwrap_err();
        assert_eq!(err.param, "count");
        assert_eq!(err.expected, "int");
        assert_eq!(err.found, "three");
    }

    #[test]
    fn missing_required_and_extra_args_fail() {
        let s = sig(vec![Param::required("text", ParamType::String)]);
        assert!(coerce_args(&s, &[]).is_err());
        let err = coerce_args(&s, &["a".into(), "b".into()]).unwrap_err();
        assert_eq!(err.param, "<extra>");
    }

    #[test]
    fn optional_params_may_be_omitted() {
        let s = sig(vec![
            Param::required("text", ParamType::String),
            Param::optional("times", ParamType::Int),
        ]);
        assert_eq!(coerce_args(&s, &["x".into()]).unwrap().len(), 1);
    }
}

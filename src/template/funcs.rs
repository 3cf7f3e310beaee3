//! Functions callable from templates.

use super::value::{Fields, Value};

/// Names of every function templates may call.
const FUNCTIONS: &[&str] = &[
    "and",
    "base",
    "contains",
    "dir",
    "envOrDefault",
    "eq",
    "isEnvSet",
    "ne",
    "not",
    "or",
    "replace",
    "tolower",
    "toupper",
    "trim",
    "trimprefix",
    "trimsuffix",
];

/// Returns `true` if `name` is a known template function.
pub(crate) fn exists(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

/// Calls the function `name`. Errors are plain messages; the caller adds location.
pub(crate) fn call(name: &str, args: &[Value], fields: &Fields) -> Result<Value, String> {
    match name {
        "and" => and(args),
        "or" => or(args),
        "not" => {
            let [value] = exact::<1>(name, args)?;
            Ok(Value::Bool(!value.is_truthy()))
        }
        "eq" => compare(args).map(Value::Bool),
        "ne" => {
            let [left, right] = exact::<2>(name, args)?;
            Ok(Value::Bool(left != right))
        }
        "dir" => unary(name, args, go_dir),
        "base" => unary(name, args, go_base),
        "tolower" => unary(name, args, |s| s.to_lowercase()),
        "toupper" => unary(name, args, |s| s.to_uppercase()),
        "trim" => unary(name, args, |s| s.trim().to_owned()),
        "trimprefix" => binary(name, args, |s, prefix| {
            s.strip_prefix(prefix).unwrap_or(s).to_owned()
        }),
        "trimsuffix" => binary(name, args, |s, suffix| {
            s.strip_suffix(suffix).unwrap_or(s).to_owned()
        }),
        "contains" => {
            let [haystack, needle] = exact::<2>(name, args)?;
            Ok(Value::Bool(as_str(haystack)?.contains(as_str(needle)?)))
        }
        "replace" => {
            let [s, old, new] = exact::<3>(name, args)?;
            Ok(Value::Str(as_str(s)?.replace(as_str(old)?, as_str(new)?)))
        }
        "envOrDefault" => {
            let [key, default] = exact::<2>(name, args)?;
            Ok(env_value(fields, as_str(key)?)
                .filter(|value| !value.is_empty())
                .map_or_else(|| default.clone(), |value| Value::Str(value.to_owned())))
        }
        "isEnvSet" => {
            let [key] = exact::<1>(name, args)?;
            Ok(Value::Bool(
                env_value(fields, as_str(key)?).is_some_and(|v| !v.is_empty()),
            ))
        }
        _ => Err(format!("function {name:?} not defined")),
    }
}

fn exact<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<[&'a Value; N], String> {
    let refs: Vec<&Value> = args.iter().collect();
    refs.try_into().map_err(|rejected: Vec<&Value>| {
        format!(
            "wrong number of args for {name}: want {N} got {}",
            rejected.len()
        )
    })
}

fn as_str(value: &Value) -> Result<&str, String> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(format!(
            "wrong type for value; expected string; got {}",
            other.type_name()
        )),
    }
}

fn unary(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value, String> {
    let [value] = exact::<1>(name, args)?;
    Ok(Value::Str(f(as_str(value)?)))
}

fn binary(name: &str, args: &[Value], f: impl Fn(&str, &str) -> String) -> Result<Value, String> {
    let [first, second] = exact::<2>(name, args)?;
    Ok(Value::Str(f(as_str(first)?, as_str(second)?)))
}

fn and(args: &[Value]) -> Result<Value, String> {
    let Some(last) = args.last() else {
        return Err("wrong number of args for and: want at least 1 got 0".to_owned());
    };
    Ok(args
        .iter()
        .find(|value| !value.is_truthy())
        .unwrap_or(last)
        .clone())
}

fn or(args: &[Value]) -> Result<Value, String> {
    let Some(last) = args.last() else {
        return Err("wrong number of args for or: want at least 1 got 0".to_owned());
    };
    Ok(args
        .iter()
        .find(|value| value.is_truthy())
        .unwrap_or(last)
        .clone())
}

/// `eq a b c...` is true when `a` equals any of the rest.
fn compare(args: &[Value]) -> Result<bool, String> {
    match args.split_first() {
        Some((first, rest)) if !rest.is_empty() => Ok(rest.iter().any(|other| other == first)),
        _ => Err("missing argument for comparison".to_owned()),
    }
}

fn env_value<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    match fields.get("Env") {
        Some(Value::Map(env)) => match env.get(key) {
            Some(Value::Str(value)) => Some(value.as_str()),
            _ => None,
        },
        _ => None,
    }
}

/// All but the last element of a slash-separated path, `.` when there is none.
pub(crate) fn go_dir(path: &str) -> String {
    let Some(index) = path.rfind('/') else {
        return ".".to_owned();
    };
    let head = path.get(..index).unwrap_or_default().trim_end_matches('/');
    if head.is_empty() {
        "/".to_owned()
    } else {
        head.to_owned()
    }
}

/// The last element of a slash-separated path, ignoring trailing slashes.
pub(crate) fn go_base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_owned();
    }
    trimmed
        .rsplit_once('/')
        .map_or(trimmed, |(_, last)| last)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn strings(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::Str((*s).to_owned())).collect()
    }

    #[rstest]
    #[case("/tmp/dist/a.deb", "/tmp/dist")]
    #[case("a.deb", ".")]
    #[case("/a.deb", "/")]
    #[case("a/b/", "a/b")]
    #[case("", ".")]
    fn dir_matches_path_semantics(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(go_dir(input), expected);
    }

    #[rstest]
    #[case("/tmp/dist/a.deb", "a.deb")]
    #[case("a/b/", "b")]
    #[case("/", "/")]
    #[case("", ".")]
    fn base_matches_path_semantics(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(go_base(input), expected);
    }

    #[test]
    fn replace_substitutes_every_occurrence() {
        let result = call("replace", &strings(&["a-b-c", "-", "_"]), &Fields::new());
        assert_eq!(result, Ok(Value::Str("a_b_c".to_owned())));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let result = call("dir", &[], &Fields::new());
        assert_eq!(
            result,
            Err("wrong number of args for dir: want 1 got 0".to_owned())
        );
    }

    #[test]
    fn wrong_type_is_reported() {
        let result = call("toupper", &[Value::Bool(true)], &Fields::new());
        assert_eq!(
            result,
            Err("wrong type for value; expected string; got bool".to_owned())
        );
    }

    #[test]
    fn env_or_default_prefers_the_environment() {
        let mut env = BTreeMap::new();
        env.insert("TOKEN".to_owned(), Value::Str("t".to_owned()));
        let mut fields = Fields::new();
        fields.insert("Env".to_owned(), Value::Map(env));

        let hit = call("envOrDefault", &strings(&["TOKEN", "x"]), &fields);
        assert_eq!(hit, Ok(Value::Str("t".to_owned())));
        let miss = call("envOrDefault", &strings(&["OTHER", "x"]), &fields);
        assert_eq!(miss, Ok(Value::Str("x".to_owned())));
        assert_eq!(
            call("isEnvSet", &strings(&["TOKEN"]), &fields),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn eq_matches_any_candidate() {
        assert_eq!(
            call("eq", &strings(&["b", "a", "b"]), &Fields::new()),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            call("eq", &strings(&["a"]), &Fields::new()),
            Err("missing argument for comparison".to_owned())
        );
    }
}

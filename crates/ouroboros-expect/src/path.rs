//! URL path templates with `{name}` placeholders

use crate::error::RequestError;
use crate::values::to_text;
use serde_json::Value;
use std::fmt;

enum Substitution {
    Keep,
    Replace(String),
}

/// Walks `template`, asking `resolve` what to do with each placeholder name.
fn interpolate<F>(template: &str, mut resolve: F) -> Result<String, RequestError>
where
    F: FnMut(&str) -> Result<Substitution, RequestError>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| RequestError::MalformedTemplate {
            template: template.to_string(),
            reason: "unclosed '{'".to_string(),
        })?;
        let name = &after[..close];
        if name.contains('{') {
            return Err(RequestError::MalformedTemplate {
                template: template.to_string(),
                reason: "nested '{'".to_string(),
            });
        }
        match resolve(name)? {
            Substitution::Keep => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Substitution::Replace(value) => out.push_str(&value),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// A request path whose placeholders are resolved step by step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    path: String,
}

impl PathTemplate {
    /// Resolves placeholders positionally.
    ///
    /// Distinct placeholder names are numbered in order of first appearance
    /// (case-insensitively); the first `args.len()` of them are replaced, the
    /// rest stay in place for [`PathTemplate::substitute`].
    pub fn with_args(method: &str, template: &str, args: &[Value]) -> Result<Self, RequestError> {
        let mut seen: Vec<String> = Vec::new();
        let path = interpolate(template, |name| {
            let lower = name.to_lowercase();
            let index = match seen.iter().position(|n| *n == lower) {
                Some(i) => i,
                None => {
                    seen.push(lower);
                    seen.len() - 1
                }
            };
            match args.get(index) {
                None => Ok(Substitution::Keep),
                Some(arg) => to_text(arg).map(Substitution::Replace).ok_or_else(|| {
                    RequestError::NilPathArgument {
                        call: format!("Request::new({:?}, {:?}, {})", method, template, render_args(args)),
                    }
                }),
            }
        })?;
        Ok(Self { path })
    }

    /// Replaces every placeholder named `key` (case-insensitive) with `value`.
    ///
    /// On failure the path is left unchanged.
    pub fn substitute(&mut self, key: &str, value: &Value) -> Result<(), RequestError> {
        let wanted = key.to_lowercase();
        let mut matched = false;
        let path = interpolate(&self.path, |name| {
            if name.to_lowercase() != wanted {
                return Ok(Substitution::Keep);
            }
            let text = to_text(value).ok_or_else(|| RequestError::NilPathArgument {
                call: format!("with_path({:?}, null)", key),
            })?;
            matched = true;
            Ok(Substitution::Replace(text))
        })?;

        if !matched {
            return Err(RequestError::UnknownPathKey {
                key: key.to_string(),
                value: value.to_string(),
                path: self.path.clone(),
            });
        }
        self.path = path;
        Ok(())
    }

    /// Keeps `template` as is, placeholders included
    pub(crate) fn verbatim(template: &str) -> Self {
        Self {
            path: template.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn render_args(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Joins two path pieces with exactly one slash between them.
pub(crate) fn concat_paths(a: &str, b: &str) -> String {
    if a.is_empty() {
        return b.to_string();
    }
    if b.is_empty() {
        return a.to_string();
    }
    format!("{}/{}", a.trim_end_matches('/'), b.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positional_args() {
        let path = PathTemplate::with_args("GET", "/users/{id}", &[json!(42)]).unwrap();
        assert_eq!(path.as_str(), "/users/42");
    }

    #[test]
    fn test_positional_args_fewer_than_placeholders() {
        let path =
            PathTemplate::with_args("POST", "/repos/{user}/{repo}/{branch}", &[json!("gavv")]).unwrap();
        assert_eq!(path.as_str(), "/repos/gavv/{repo}/{branch}");
    }

    #[test]
    fn test_positional_repeated_placeholder_counts_once() {
        let path = PathTemplate::with_args("GET", "/{a}/{A}/{b}", &[json!(1), json!(2)]).unwrap();
        assert_eq!(path.as_str(), "/1/1/2");
    }

    #[test]
    fn test_positional_nil_argument() {
        let err = PathTemplate::with_args("GET", "/users/{id}", &[Value::Null]).unwrap_err();
        assert!(matches!(err, RequestError::NilPathArgument { .. }));
        assert!(err.to_string().contains("\"GET\""));
    }

    #[test]
    fn test_substitute_case_insensitive() {
        let mut path = PathTemplate::with_args("GET", "/repos/{User}/{repo}", &[]).unwrap();
        path.substitute("user", &json!("gavv")).unwrap();
        path.substitute("REPO", &json!("httpexpect")).unwrap();
        assert_eq!(path.as_str(), "/repos/gavv/httpexpect");
    }

    #[test]
    fn test_non_ascii_names_fold_the_same_way() {
        let path = PathTemplate::with_args("GET", "/{Ä}/{ä}", &[json!(1)]).unwrap();
        assert_eq!(path.as_str(), "/1/1");

        let mut path = PathTemplate::with_args("GET", "/straße/{Ä}", &[]).unwrap();
        path.substitute("ä", &json!(1)).unwrap();
        assert_eq!(path.as_str(), "/straße/1");
    }

    #[test]
    fn test_substitute_order_independent() {
        let mut first = PathTemplate::with_args("GET", "/{a}/{b}", &[]).unwrap();
        first.substitute("a", &json!(1)).unwrap();
        first.substitute("b", &json!(2)).unwrap();

        let mut second = PathTemplate::with_args("GET", "/{a}/{b}", &[]).unwrap();
        second.substitute("b", &json!(2)).unwrap();
        second.substitute("a", &json!(1)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_substitute_unknown_key_leaves_path() {
        let mut path = PathTemplate::with_args("GET", "/users/{id}", &[]).unwrap();
        let err = path.substitute("name", &json!("bob")).unwrap_err();
        assert!(matches!(err, RequestError::UnknownPathKey { .. }));
        assert!(err.to_string().contains("/users/{id}"));
        assert_eq!(path.as_str(), "/users/{id}");
    }

    #[test]
    fn test_substitute_nil_value_is_distinct_failure() {
        let mut path = PathTemplate::with_args("GET", "/users/{id}", &[]).unwrap();
        let err = path.substitute("id", &Value::Null).unwrap_err();
        assert!(matches!(err, RequestError::NilPathArgument { .. }));
        assert_eq!(path.as_str(), "/users/{id}");
    }

    #[test]
    fn test_malformed_template() {
        let err = PathTemplate::with_args("GET", "/users/{id", &[json!(1)]).unwrap_err();
        assert!(matches!(err, RequestError::MalformedTemplate { .. }));
    }

    #[test]
    fn test_concat_paths() {
        assert_eq!(concat_paths("", "/a"), "/a");
        assert_eq!(concat_paths("/a", ""), "/a");
        assert_eq!(concat_paths("/", "/users"), "/users");
        assert_eq!(concat_paths("/api/", "/users"), "/api/users");
        assert_eq!(concat_paths("/api", "users"), "/api/users");
    }
}

//! `{scope.path}` template resolution
//!
//! Templates appear in shell commands, env values, source option fields,
//! and built-in options. References resolve against the package context at
//! the moment the step runs, so values computed by earlier steps are
//! visible to later ones.

use crate::context::PackageContext;
use picopkg_errors::{Error, VariableError};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resolve every `{scope.path}` reference in a template
///
/// # Errors
///
/// `VariableError::UnterminatedReference` on a `{` with no closing `}`,
/// plus whatever [`PackageContext::resolve_reference`] reports for each
/// reference.
pub fn resolve(template: &str, ctx: &PackageContext) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(VariableError::UnterminatedReference {
                template: template.to_string(),
            }
            .into());
        };
        out.push_str(&ctx.resolve_reference(&after[..close])?);
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Resolve templates inside a JSON value: strings are resolved, containers
/// are walked, scalars pass through
///
/// # Errors
///
/// Propagates resolution errors from any nested string.
pub fn resolve_value(value: &Value, ctx: &PackageContext) -> Result<Value, Error> {
    match value {
        Value::String(s) => Ok(Value::String(resolve(s, ctx)?)),
        Value::Array(items) => {
            let resolved: Result<Vec<Value>, Error> =
                items.iter().map(|v| resolve_value(v, ctx)).collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (key, v) in map {
                resolved.insert(key.clone(), resolve_value(v, ctx)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve every value of a built-in's options map
///
/// # Errors
///
/// Propagates resolution errors from any option value.
pub fn resolve_options(
    options: &BTreeMap<String, Value>,
    ctx: &PackageContext,
) -> Result<BTreeMap<String, Value>, Error> {
    options
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(value, ctx)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use picopkg_types::PackageDescriptor;
    use serde_json::json;

    fn ctx_with(metadata: &[(&str, Value)]) -> (RunContext, PackageDescriptor) {
        let run = RunContext::new();
        let mut descriptor = PackageDescriptor::new("app");
        for (key, value) in metadata {
            descriptor.metadata.insert((*key).to_string(), value.clone());
        }
        (run, descriptor)
    }

    #[test]
    fn plain_text_passes_through() {
        let (run, descriptor) = ctx_with(&[]);
        let ctx = PackageContext::new(&descriptor, &run).unwrap();
        assert_eq!(resolve("make -j4", &ctx).unwrap(), "make -j4");
    }

    #[test]
    fn multiple_references_resolve_in_place() {
        let (run, descriptor) = ctx_with(&[
            ("name", json!("zlib")),
            ("version", json!("1.3.1")),
        ]);
        let ctx = PackageContext::new(&descriptor, &run).unwrap();
        assert_eq!(
            resolve("tar xf {metadata.name}-{metadata.version}.tar.gz", &ctx).unwrap(),
            "tar xf zlib-1.3.1.tar.gz"
        );
    }

    #[test]
    fn unterminated_reference_fails() {
        let (run, descriptor) = ctx_with(&[]);
        let ctx = PackageContext::new(&descriptor, &run).unwrap();
        let err = resolve("echo {metadata.name", &ctx).unwrap_err();
        assert!(matches!(
            err,
            Error::Variable(VariableError::UnterminatedReference { .. })
        ));
    }

    #[test]
    fn nested_values_resolve_recursively() {
        let (run, descriptor) = ctx_with(&[("prefix", json!("/opt/app"))]);
        let ctx = PackageContext::new(&descriptor, &run).unwrap();
        let value = json!({"path": "{metadata.prefix}/bin", "count": 3});
        assert_eq!(
            resolve_value(&value, &ctx).unwrap(),
            json!({"path": "/opt/app/bin", "count": 3})
        );
    }

    #[test]
    fn numbers_render_without_quotes() {
        let (run, descriptor) = ctx_with(&[("jobs", json!(8))]);
        let ctx = PackageContext::new(&descriptor, &run).unwrap();
        assert_eq!(resolve("make -j{metadata.jobs}", &ctx).unwrap(), "make -j8");
    }
}

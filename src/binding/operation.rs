//! Binding of one declared operation to a wire request

use super::{Arguments, OperationMeta, ParamMeta, ParamRole};
use crate::codec::{Codec, ResultShape};
use crate::error::{ClientError, Result};
use crate::transport::WireRequest;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Immutable description of how one operation becomes one request
#[derive(Debug, Clone)]
pub struct OperationBinding {
    name: String,
    method: Method,
    path_template: String,
    segments: Vec<Segment>,
    params: Vec<ParamMeta>,
    result: ResultShape,
}

impl OperationBinding {
    /// Validate operation metadata and bind it
    pub fn bind(meta: &OperationMeta) -> Result<Self> {
        if meta.name.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Operation declared without a name".to_string(),
            ));
        }

        let method = parse_method(&meta.name, &meta.method)?;
        let segments = parse_template(&meta.name, &meta.path)?;

        let mut seen = HashSet::new();
        for param in &meta.params {
            if param.name.trim().is_empty() {
                return Err(ClientError::Configuration(format!(
                    "Operation '{}' declares a parameter without a name",
                    meta.name
                )));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(ClientError::Configuration(format!(
                    "Operation '{}' declares parameter '{}' more than once",
                    meta.name, param.name
                )));
            }
        }

        let body_params = meta
            .params
            .iter()
            .filter(|p| p.role == ParamRole::Body)
            .count();
        if body_params > 1 {
            return Err(ClientError::Configuration(format!(
                "Operation '{}' declares {} body parameters, at most one is allowed",
                meta.name, body_params
            )));
        }

        let placeholders: HashSet<&str> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect();
        let path_params: HashSet<&str> = meta
            .params
            .iter()
            .filter(|p| p.role == ParamRole::Path)
            .map(|p| p.name.as_str())
            .collect();

        if let Some(missing) = placeholders.difference(&path_params).next() {
            return Err(ClientError::Configuration(format!(
                "Operation '{}' path '{}' has placeholder {{{}}} with no matching path parameter",
                meta.name, meta.path, missing
            )));
        }
        if let Some(unused) = path_params.difference(&placeholders).next() {
            return Err(ClientError::Configuration(format!(
                "Operation '{}' path parameter '{}' does not appear in path '{}'",
                meta.name, unused, meta.path
            )));
        }

        Ok(Self {
            name: meta.name.clone(),
            method,
            path_template: meta.path.clone(),
            segments,
            params: meta.params.clone(),
            result: meta.result.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn params(&self) -> &[ParamMeta] {
        &self.params
    }

    pub fn result_shape(&self) -> &ResultShape {
        &self.result
    }

    /// Shape the arguments of one call into a wire request
    pub fn build_request(&self, args: &Arguments, codec: &dyn Codec) -> Result<WireRequest> {
        if let Some(unknown) = args
            .keys()
            .find(|k| !self.params.iter().any(|p| &p.name == *k))
        {
            return Err(ClientError::InvalidArguments(format!(
                "Operation '{}' has no parameter named '{}'",
                self.name, unknown
            )));
        }

        let mut path_segments = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path_segments.push(text.clone()),
                Segment::Placeholder(name) => {
                    let value = args.get(name).filter(|v| !v.is_null()).ok_or_else(|| {
                        ClientError::InvalidArguments(format!(
                            "Operation '{}' requires path parameter '{}'",
                            self.name, name
                        ))
                    })?;
                    let text = scalar_to_string(value).ok_or_else(|| {
                        ClientError::InvalidArguments(format!(
                            "Path parameter '{}' must be a string, number or boolean",
                            name
                        ))
                    })?;
                    if text.is_empty() {
                        return Err(ClientError::InvalidArguments(format!(
                            "Path parameter '{}' must not be empty",
                            name
                        )));
                    }
                    path_segments.push(text);
                }
            }
        }

        let mut request = WireRequest::new(self.method.clone(), path_segments)
            .with_header("Accept", codec.content_type());

        for param in &self.params {
            let value = match args.get(&param.name) {
                Some(Value::Null) | None => continue,
                Some(value) => value,
            };

            match param.role {
                ParamRole::Path => {}
                ParamRole::Query => match value {
                    Value::Array(items) => {
                        for item in items {
                            request
                                .query
                                .push((param.name.clone(), self.scalar_arg(param, item)?));
                        }
                    }
                    other => {
                        request
                            .query
                            .push((param.name.clone(), self.scalar_arg(param, other)?));
                    }
                },
                ParamRole::Header => {
                    request
                        .headers
                        .push((param.name.clone(), self.scalar_arg(param, value)?));
                }
                ParamRole::Body => {
                    request.body = Some(codec.encode(value)?);
                    request.set_header("Content-Type", codec.content_type());
                }
            }
        }

        Ok(request)
    }

    fn scalar_arg(&self, param: &ParamMeta, value: &Value) -> Result<String> {
        scalar_to_string(value).ok_or_else(|| {
            ClientError::InvalidArguments(format!(
                "Parameter '{}' of operation '{}' must be a string, number or boolean",
                param.name, self.name
            ))
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_method(operation: &str, method: &str) -> Result<Method> {
    match method.trim().to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" => Ok(Method::OPTIONS),
        _ => Err(ClientError::Configuration(format!(
            "Operation '{}' declares unsupported HTTP method: {:?}",
            operation, method
        ))),
    }
}

fn parse_template(operation: &str, template: &str) -> Result<Vec<Segment>> {
    let trimmed = template.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let malformed = |reason: &str| {
        ClientError::Configuration(format!(
            "Operation '{}' has malformed path template '{}': {}",
            operation, template, reason
        ))
    };

    trimmed
        .split('/')
        .map(|part| {
            if part.is_empty() {
                return Err(malformed("empty path segment"));
            }
            match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => {
                    if name.is_empty() {
                        Err(malformed("empty placeholder"))
                    } else if name.contains('{') || name.contains('}') {
                        Err(malformed("unbalanced braces"))
                    } else {
                        Ok(Segment::Placeholder(name.to_string()))
                    }
                }
                None if part.contains('{') || part.contains('}') => {
                    Err(malformed("placeholders must span a whole segment"))
                }
                None => Ok(Segment::Literal(part.to_string())),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde_json::json;

    fn read_meta() -> OperationMeta {
        OperationMeta::new("readPatient", "GET", "Patient/{id}")
            .param("id", ParamRole::Path)
            .param("_format", ParamRole::Query)
            .returns(ResultShape::resource("Patient"))
    }

    fn args(pairs: &[(&str, Value)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_bind_valid_operation() {
        let binding = OperationBinding::bind(&read_meta()).unwrap();
        assert_eq!(binding.name(), "readPatient");
        assert_eq!(binding.method(), &Method::GET);
        assert_eq!(binding.path_template(), "Patient/{id}");
        assert_eq!(binding.result_shape(), &ResultShape::resource("Patient"));
    }

    #[test]
    fn test_bind_rejects_bad_method() {
        let meta = OperationMeta::new("op", "FETCH", "Patient");
        assert!(matches!(
            OperationBinding::bind(&meta),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_bind_rejects_malformed_templates() {
        for path in ["Patient/{id", "Patient/{}", "Patient//x", "Patient/a{id}", "{{id}}"] {
            let meta = OperationMeta::new("op", "GET", path).param("id", ParamRole::Path);
            assert!(
                matches!(OperationBinding::bind(&meta), Err(ClientError::Configuration(_))),
                "expected {} to be rejected",
                path
            );
        }
    }

    #[test]
    fn test_bind_rejects_placeholder_param_mismatch() {
        let missing_param = OperationMeta::new("op", "GET", "Patient/{id}");
        assert!(OperationBinding::bind(&missing_param).is_err());

        let missing_placeholder =
            OperationMeta::new("op", "GET", "Patient").param("id", ParamRole::Path);
        assert!(OperationBinding::bind(&missing_placeholder).is_err());
    }

    #[test]
    fn test_bind_rejects_duplicate_and_multiple_body_params() {
        let dup = OperationMeta::new("op", "GET", "Patient")
            .param("name", ParamRole::Query)
            .param("name", ParamRole::Header);
        assert!(OperationBinding::bind(&dup).is_err());

        let bodies = OperationMeta::new("op", "POST", "Patient")
            .param("a", ParamRole::Body)
            .param("b", ParamRole::Body);
        assert!(OperationBinding::bind(&bodies).is_err());
    }

    #[test]
    fn test_build_request_substitutes_path_and_query() {
        let binding = OperationBinding::bind(&read_meta()).unwrap();
        let request = binding
            .build_request(
                &args(&[("id", json!(123)), ("_format", json!("json"))]),
                &JsonCodec,
            )
            .unwrap();

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path(), "Patient/123");
        assert_eq!(
            request.query,
            vec![("_format".to_string(), "json".to_string())]
        );
        assert_eq!(request.header("Accept"), Some("application/json+fhir"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_build_request_requires_path_args() {
        let binding = OperationBinding::bind(&read_meta()).unwrap();
        let err = binding.build_request(&Arguments::new(), &JsonCodec).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArguments(_)));

        let err = binding
            .build_request(&args(&[("id", json!({"nested": true}))]), &JsonCodec)
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArguments(_)));
    }

    #[test]
    fn test_build_request_rejects_undeclared_args() {
        let binding = OperationBinding::bind(&read_meta()).unwrap();
        let err = binding
            .build_request(&args(&[("id", json!("1")), ("typo", json!("x"))]), &JsonCodec)
            .unwrap_err();
        assert!(err.to_string().contains("typo"));
    }

    #[test]
    fn test_build_request_body_header_and_repeated_query() {
        let meta = OperationMeta::new("createPatient", "POST", "/Patient")
            .param("resource", ParamRole::Body)
            .param("Prefer", ParamRole::Header)
            .param("tag", ParamRole::Query);
        let binding = OperationBinding::bind(&meta).unwrap();

        let request = binding
            .build_request(
                &args(&[
                    ("resource", json!({"resourceType": "Patient"})),
                    ("Prefer", json!("return=minimal")),
                    ("tag", json!(["a", "b"])),
                ]),
                &JsonCodec,
            )
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path(), "Patient");
        assert_eq!(request.header("Prefer"), Some("return=minimal"));
        assert_eq!(request.header("Content-Type"), Some("application/json+fhir"));
        assert_eq!(
            request.query,
            vec![
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string())
            ]
        );
        assert_eq!(
            request.body.as_deref(),
            Some(br#"{"resourceType":"Patient"}"#.as_slice())
        );
    }

    #[test]
    fn test_server_base_operation_has_no_segments() {
        let meta = OperationMeta::new("transaction", "POST", "/").param("bundle", ParamRole::Body);
        let binding = OperationBinding::bind(&meta).unwrap();
        let request = binding.build_request(&Arguments::new(), &JsonCodec).unwrap();
        assert!(request.path_segments.is_empty());
        assert!(request.body.is_none());
    }
}

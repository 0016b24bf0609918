//! Comparisons between observed and expected outcomes

use serde_json::Value;

use crate::api::result::{display_value, field, field_matches};
use crate::api::ApiResponse;
use crate::common::{Error, Result};

use super::config::{Outcome, ResponseExpectation, ResultShape, TextExpectation};
use super::vars::Vars;

/// Check observed text against every expectation given
pub fn check_text(subject: &str, expect: &TextExpectation, observed: &str, vars: &Vars<'_>) -> Result<()> {
    if let Some(expected) = &expect.equals {
        let expected = vars.interpolate(expected)?;
        if observed != expected {
            return Err(Error::assertion(subject, format!("'{}'", expected), format!("'{}'", observed)));
        }
    }

    if let Some(expected) = &expect.contains {
        let expected = vars.interpolate(expected)?;
        if !observed.contains(&expected) {
            return Err(Error::assertion(
                subject,
                format!("text containing '{}'", expected),
                format!("'{}'", observed),
            ));
        }
    }

    if let Some(pattern) = &expect.matches {
        if !pattern.0.is_match(observed) {
            return Err(Error::assertion(
                subject,
                format!("a match for /{}/", pattern.0.as_str()),
                format!("'{}'", observed),
            ));
        }
    }

    if let Some(pattern) = &expect.not_matches {
        if pattern.0.is_match(observed) {
            return Err(Error::assertion(
                subject,
                format!("no match for /{}/", pattern.0.as_str()),
                format!("'{}'", observed),
            ));
        }
    }

    Ok(())
}

/// Check a response against the step's expectations
///
/// A failure outcome is its own kind of expectation: a 2xx response is a
/// mismatch rather than a pass.
pub fn check_response(response: &ApiResponse, expect: &ResponseExpectation, vars: &Vars<'_>) -> Result<()> {
    let subject = format!("{} {}", response.method, response.url);

    match expect.outcome {
        Outcome::Success => {
            if !response.is_success() {
                return Err(Error::request(&response.method, &response.url, response.status, &response.text));
            }
        }
        Outcome::Failure => {
            if response.is_success() {
                return Err(Error::ExpectedFailureMismatch {
                    subject,
                    expected: "a non-2xx response".to_string(),
                    observed: format!("status {}", response.status),
                });
            }
        }
    }

    if let Some(status) = expect.status {
        if response.status != status {
            return Err(Error::assertion(
                format!("{} status", subject),
                status.to_string(),
                response.status.to_string(),
            ));
        }
    }

    if let Some(shape) = expect.result {
        let observed = response.body.get("result").or(match &response.body {
            Value::Array(_) => Some(&response.body),
            _ => None,
        });
        let ok = matches!(
            (shape, observed),
            (ResultShape::Array, Some(Value::Array(_))) | (ResultShape::Object, Some(Value::Object(_)))
        );
        if !ok {
            return Err(Error::assertion(
                format!("{} result", subject),
                format!("{:?}", shape).to_lowercase(),
                observed.map_or_else(|| "no result".to_string(), json_kind),
            ));
        }
    }

    let records = response.records();

    if let Some(min) = expect.min_records {
        if records.len() < min {
            return Err(Error::assertion(
                format!("{} record count", subject),
                format!("at least {}", min),
                records.len().to_string(),
            ));
        }
    }

    if !expect.each.is_empty() {
        for (index, record) in records.iter().enumerate() {
            for (path, expected) in &expect.each {
                let expected = vars.interpolate_json(expected)?;
                if !field_matches(record, path, &expected) {
                    return Err(Error::assertion(
                        format!("{} record {} field '{}'", subject, index, path),
                        format!("'{}'", display_value(&expected)),
                        observed_field(record, path),
                    ));
                }
            }
        }
    }

    if !expect.contains.is_empty() {
        let wanted = expect
            .contains
            .iter()
            .map(|(path, v)| Ok((path.as_str(), vars.interpolate_json(v)?)))
            .collect::<Result<Vec<_>>>()?;
        let found = records
            .iter()
            .any(|record| wanted.iter().all(|(path, v)| field_matches(record, path, v)));
        if !found {
            let description = wanted
                .iter()
                .map(|(path, v)| format!("{}='{}'", path, display_value(v)))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::assertion(
                format!("{} records", subject),
                format!("a record with {}", description),
                format!("{} records, none matching", records.len()),
            ));
        }
    }

    Ok(())
}

fn observed_field(record: &Value, path: &str) -> String {
    field(record, path).map_or_else(|| "missing".to_string(), |v| format!("'{}'", display_value(v)))
}

fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RunConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn response(status: u16, body: Value) -> ApiResponse {
        ApiResponse {
            method: "GET".to_string(),
            url: "https://dev1234.service-now.com/api/now/table/incident".to_string(),
            status,
            text: body.to_string(),
            body,
        }
    }

    fn expectation(yaml: &str) -> ResponseExpectation {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn with_vars<T>(f: impl FnOnce(&Vars<'_>) -> T) -> T {
        let config = RunConfig::new("https://dev1234.service-now.com/", "admin", "pw").unwrap();
        let empty = BTreeMap::new();
        let vars = Vars {
            config: &config,
            inputs: &empty,
            captures: &empty,
        };
        f(&vars)
    }

    #[test]
    fn test_every_record_satisfies_filter() {
        let ok = response(200, json!({"result": [{"priority": "1"}, {"priority": "1"}]}));
        let bad = response(200, json!({"result": [{"priority": "1"}, {"priority": "3"}]}));
        let expect = expectation("result: array\neach: { priority: \"1\" }");

        with_vars(|vars| {
            assert!(check_response(&ok, &expect, vars).is_ok());
            match check_response(&bad, &expect, vars) {
                Err(Error::Assertion { subject, expected, observed }) => {
                    assert!(subject.contains("record 1 field 'priority'"));
                    assert_eq!(expected, "'1'");
                    assert_eq!(observed, "'3'");
                }
                other => panic!("expected assertion failure, got {other:?}"),
            }
        });
    }

    #[test]
    fn test_result_shape_check() {
        let single = response(200, json!({"result": {"number": "INC1"}}));
        let expect = expectation("result: array");
        with_vars(|vars| {
            let err = check_response(&single, &expect, vars).unwrap_err();
            assert!(err.to_string().contains("expected array, got object"));
        });
    }

    #[test]
    fn test_contains_requires_one_record_with_all_fields() {
        let body = json!([
            {"title": "[Feature] request 1", "body": "other"},
            {"title": "[Feature] request 1", "body": "Feature description"}
        ]);
        let resp = response(200, body);
        with_vars(|vars| {
            let hit = expectation("contains: { title: '[Feature] request 1', body: Feature description }");
            assert!(check_response(&resp, &hit, vars).is_ok());

            let miss = expectation("contains: { title: '[Feature] request 2' }");
            assert!(matches!(check_response(&resp, &miss, vars), Err(Error::Assertion { .. })));
        });
    }

    #[test]
    fn test_non_2xx_is_request_error_on_success_path() {
        let resp = response(500, json!({"error": {"message": "boom"}}));
        with_vars(|vars| {
            let err = check_response(&resp, &ResponseExpectation::default(), vars).unwrap_err();
            assert!(matches!(err, Error::Request { status: 500, .. }));
        });
    }

    #[test]
    fn test_failure_outcome_accepts_non_2xx_and_rejects_2xx() {
        let expect = expectation("outcome: failure\nstatus: 401");
        with_vars(|vars| {
            let denied = response(401, json!({"error": {"message": "User Not Authenticated"}}));
            assert!(check_response(&denied, &expect, vars).is_ok());

            let allowed = response(200, json!({"result": []}));
            assert!(matches!(
                check_response(&allowed, &expect, vars),
                Err(Error::ExpectedFailureMismatch { .. })
            ));

            let wrong_code = response(403, json!({}));
            assert!(matches!(check_response(&wrong_code, &expect, vars), Err(Error::Assertion { .. })));
        });
    }

    #[test]
    fn test_min_records() {
        let resp = response(200, json!({"result": []}));
        with_vars(|vars| {
            let expect = expectation("min_records: 1\neach: { priority: \"1\" }");
            assert!(check_response(&resp, &expect, vars).is_err());
        });
    }

    #[test]
    fn test_text_expectations() {
        let expect: TextExpectation =
            serde_yaml::from_str("contains: '/now/nav/ui'\nmatches: '.*/now/nav/ui/home'\nnot_matches: login").unwrap();
        with_vars(|vars| {
            assert!(check_text("url", &expect, "https://x/now/nav/ui/home", vars).is_ok());
            assert!(check_text("url", &expect, "https://x/now/nav/ui/login/home", vars).is_err());
            assert!(check_text("url", &expect, "https://x/navpage.do", vars).is_err());

            let exact: TextExpectation = serde_yaml::from_str("equals: '${base_url}'").unwrap();
            assert!(check_text("url", &exact, "https://dev1234.service-now.com/", vars).is_ok());
        });
    }
}

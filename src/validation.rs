//! Structural checks applied to every response body.
//!
//! The rules are heuristics over the raw text: nothing is parsed as JSON.
//! They run in a fixed order and the first one that fails decides the verdict.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Empty,
    NotJsonShaped,
    ErrorMarker,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn reason(self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Empty => "result is empty",
            Verdict::NotJsonShaped => "expect start with '{' or '[', but it's not",
            Verdict::ErrorMarker => "find 'error' in result",
        }
    }
}

type Rule = fn(&str) -> Option<Verdict>;

const RULES: &[Rule] = &[empty_body, json_shape, error_marker];

fn empty_body(body: &str) -> Option<Verdict> {
    body.is_empty().then_some(Verdict::Empty)
}

// Leading whitespace is not skipped.
fn json_shape(body: &str) -> Option<Verdict> {
    (!(body.starts_with('{') || body.starts_with('['))).then_some(Verdict::NotJsonShaped)
}

// Plain case-sensitive substring match, so `"no errors"` trips it too.
fn error_marker(body: &str) -> Option<Verdict> {
    body.contains("error").then_some(Verdict::ErrorMarker)
}

pub fn validate(body: &str) -> Verdict {
    RULES
        .iter()
        .find_map(|rule| rule(body))
        .unwrap_or(Verdict::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_fails_first() {
        let verdict = validate("");
        assert_eq!(verdict, Verdict::Empty);
        assert_eq!(verdict.reason(), "result is empty");
        assert!(!verdict.is_pass());
    }

    #[test]
    fn body_must_open_with_brace_or_bracket() {
        for body in ["ok", "<html></html>", " {\"a\":1}", "\n[1]", "null"] {
            let verdict = validate(body);
            assert_eq!(verdict, Verdict::NotJsonShaped, "body {body:?}");
            assert_eq!(verdict.reason(), "expect start with '{' or '[', but it's not");
        }
    }

    #[test]
    fn shape_rule_wins_over_error_marker() {
        assert_eq!(validate("internal error"), Verdict::NotJsonShaped);
    }

    #[test]
    fn error_substring_fails_json_shaped_bodies() {
        for body in [
            "{\"error\":\"boom\"}",
            "[\"no errors here\"]",
            "{\"message\":\"terror\"}",
        ] {
            let verdict = validate(body);
            assert_eq!(verdict, Verdict::ErrorMarker, "body {body:?}");
            assert_eq!(verdict.reason(), "find 'error' in result");
        }
    }

    #[test]
    fn error_marker_is_case_sensitive() {
        assert_eq!(validate("{\"status\":\"ERROR\"}"), Verdict::Pass);
        assert_eq!(validate("{\"Error\":1}"), Verdict::Pass);
    }

    #[test]
    fn well_formed_bodies_pass() {
        for body in ["{}", "[]", "{\"ok\":true}", "[{\"id\":1},{\"id\":2}]", "{not even json"] {
            let verdict = validate(body);
            assert!(verdict.is_pass(), "body {body:?}");
            assert_eq!(verdict.reason(), "pass");
        }
    }
}

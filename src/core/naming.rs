// src/core/naming.rs

//! Name and label-template syntax checks shared by every entity kind.

use crate::constants::MAX_NAME_LENGTH;
use crate::models::Name;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NAME_RE: Regex =
        Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_\-.]*$").expect("name pattern compiles");
    // Everything between `${` and the next `}`.
    static ref LABEL_TOKEN_RE: Regex = Regex::new(r"\$\{([^}]*)\}").expect("label pattern compiles");
    static ref MATERIAL_TOKEN_RE: Regex =
        Regex::new(r"^(?P<material>[^\[]*)(\[:(?P<length>\d+)\])?$").expect("token pattern compiles");
}

const ENV_VAR_PREFIX: &str = "env:";

const LABEL_FORMAT_MESSAGE: &str = "Label should be composed of alphanumeric text, it can contain the build number as ${COUNT}, can contain a material revision as ${<material-name>} of ${<material-name>[:<number>]}, or use params as #{<param-name>}.";

pub fn is_valid_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LENGTH && NAME_RE.is_match(name)
}

/// The message for an invalid `kind` name, e.g. `name_error("pipeline", "a b")`.
pub fn name_error(kind: &str, name: &str) -> String {
    format!(
        "Invalid {kind} name '{name}'. This must be alphanumeric and can contain underscores, hyphens and periods (however, it cannot start with a period). The maximum allowed length is {MAX_NAME_LENGTH} characters."
    )
}

/// Returns the error message when `name` is not a valid `kind` name.
pub fn check_name(kind: &str, name: &Name) -> Option<String> {
    (!is_valid_name(name.as_str())).then(|| name_error(kind, name.as_str()))
}

/// Checks a pipeline label template against the material names of that pipeline.
///
/// Stops at the first bad token, so at most one message is produced.
pub fn check_label_template(
    pipeline: &Name,
    template: &str,
    material_names: &[Name],
) -> Option<String> {
    if template.trim().is_empty() {
        return Some(format!("Label cannot be blank. {LABEL_FORMAT_MESSAGE}"));
    }

    let invalid = || format!("Invalid label '{template}'. {LABEL_FORMAT_MESSAGE}");
    let mut tokens = LABEL_TOKEN_RE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .peekable();

    if tokens.peek().is_none() {
        return Some(invalid());
    }

    for token in tokens {
        if token.trim().is_empty() {
            return Some("Label template variable cannot be blank.".to_string());
        }
        if token.eq_ignore_ascii_case("COUNT") {
            continue;
        }
        if token.eq_ignore_ascii_case(ENV_VAR_PREFIX) {
            return Some("Missing environment variable name.".to_string());
        }
        if token.to_ascii_lowercase().starts_with(ENV_VAR_PREFIX) {
            continue;
        }

        let Some(caps) = MATERIAL_TOKEN_RE.captures(token) else {
            return Some(invalid());
        };
        let material = caps.name("material").map_or("", |m| m.as_str());
        if caps
            .name("length")
            .is_some_and(|length| length.as_str().starts_with('0'))
        {
            return Some(format!(
                "Length of zero not allowed on label {template} defined on pipeline {pipeline}."
            ));
        }
        if !material_names.iter().any(|name| name == material) {
            return Some(format!(
                "You have defined a label template in pipeline '{pipeline}' that refers to a material called '{material}', but no material with this name is defined."
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_pattern() {
        assert!(is_valid_name("build-linux_1.0"));
        assert!(is_valid_name("_private"));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(&"a".repeat(MAX_NAME_LENGTH + 1)));
    }

    #[test]
    fn test_check_name_message() {
        let message = check_name("pipeline", &Name::from("a b")).unwrap();
        assert!(message.starts_with("Invalid pipeline name 'a b'."));
        assert!(check_name("pipeline", &Name::from("ok")).is_none());
    }

    #[test]
    fn test_label_template_tokens() {
        // --- Setup ---
        let pipeline = Name::from("cruise");
        let materials = vec![Name::from("git")];

        // --- Execute & Assert ---
        assert!(check_label_template(&pipeline, "1.0-${COUNT}", &materials).is_none());
        assert!(check_label_template(&pipeline, "${git[:7]}-${env:BUILD}", &materials).is_none());
        assert!(
            check_label_template(&pipeline, "1.3.0", &materials)
                .unwrap()
                .starts_with("Invalid label '1.3.0'.")
        );
        assert_eq!(
            check_label_template(&pipeline, "${svn}", &materials).unwrap(),
            "You have defined a label template in pipeline 'cruise' that refers to a material called 'svn', but no material with this name is defined."
        );
        assert_eq!(
            check_label_template(&pipeline, "${env:}", &materials).unwrap(),
            "Missing environment variable name."
        );
        assert!(
            check_label_template(&pipeline, "${git[:0]}", &materials)
                .unwrap()
                .starts_with("Length of zero")
        );
        assert!(
            check_label_template(&pipeline, "${git[7]}", &materials)
                .unwrap()
                .starts_with("Invalid label")
        );
    }
}

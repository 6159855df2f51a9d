//! `${NAME}` environment-variable substitution in the raw config text.

use std::sync::OnceLock;

use regex::Regex;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("env token regex"))
}

/// Replaces every `${NAME}` token with the value of the environment variable
/// `NAME`. Missing variables resolve to the empty string. Only names of
/// `[A-Za-z0-9_]+` are recognized; anything else is left untouched.
pub fn substitute_env(raw: &str) -> String {
    token_re()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_present_variable() {
        std::env::set_var("ENV_SUBST_TEST_TOKEN", "abc123");
        assert_eq!(
            substitute_env("key=${ENV_SUBST_TEST_TOKEN}"),
            "key=abc123"
        );
        std::env::remove_var("ENV_SUBST_TEST_TOKEN");
    }

    #[test]
    fn missing_variable_becomes_empty() {
        assert_eq!(substitute_env("\"${ENV_SUBST_TEST_MISSING_XYZ}\""), "\"\"");
    }

    #[test]
    fn malformed_tokens_left_alone() {
        assert_eq!(substitute_env("${not-a-name} $PLAIN ${}"), "${not-a-name} $PLAIN ${}");
    }
}

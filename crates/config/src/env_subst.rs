/// Replace `${ENV_VAR}` placeholders in raw config text.
///
/// Unresolvable variables are left as-is so the parse error (if any) points
/// at the placeholder the user wrote.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Placeholder substitution against an arbitrary lookup.
pub fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // Malformed; emit literally.
                result.push_str("${");
                rest = after;
            },
        }
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        (name == "SPOTIFY_ID").then(|| "abc123".to_string())
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_with("client_id = \"${SPOTIFY_ID}\"", lookup),
            "client_id = \"abc123\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_with("${CADENZA_NONEXISTENT_XYZ}", lookup),
            "${CADENZA_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_with("a ${SPOTIFY_ID", lookup), "a ${SPOTIFY_ID");
        assert_eq!(substitute_with("${}", lookup), "${}");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}

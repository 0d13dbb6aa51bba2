//! Small environment-variable helpers shared by the gateway binaries.

/// Interpret a `CFP_*` feature-flag value, falling back to `default` when the variable is unset or unrecognisable.
///
/// Deployment tooling is inconsistent about how it spells booleans, so the usual spellings are all accepted,
/// including the `enabled`/`disabled` pair. Matching is case-insensitive and ignores surrounding whitespace.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => true,
        "0" | "false" | "no" | "off" | "disabled" => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags_accept_common_spellings() {
        for value in ["1", "true", "Yes", " on ", "ENABLED"] {
            assert!(parse_boolean_flag(Some(value.to_string()), false), "{value} should read as true");
        }
        for value in ["0", "false", "No", "off", "Disabled"] {
            assert!(!parse_boolean_flag(Some(value.to_string()), true), "{value} should read as false");
        }
    }

    #[test]
    fn unset_or_garbage_values_fall_back_to_the_default() {
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(None, false));
        assert!(parse_boolean_flag(Some("maybe".to_string()), true));
        assert!(!parse_boolean_flag(Some("maybe".to_string()), false));
    }
}

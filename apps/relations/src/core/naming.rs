/// Converts `user_roles` / `user-roles` / `user roles` into `UserRoles`.
/// Characters after the first of each word keep their case.
pub fn studly_case(value: &str) -> String {
    value
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `studly_case` with the first character lowercased.
pub fn camel_case(value: &str) -> String {
    let studly = studly_case(value);
    let mut chars = studly.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parameter keys are echoed back in error hints with underscores as spaces.
pub fn humanize_key(key: &str) -> String {
    key.replace('_', " ")
}

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_cases_snake_and_kebab_input() {
        assert_eq!(camel_case("foo_bar"), "fooBar");
        assert_eq!(camel_case("foo-bar"), "fooBar");
        assert_eq!(camel_case("foo_bar-baz"), "fooBarBaz");
    }

    #[test]
    fn camel_case_keeps_inner_capitals() {
        assert_eq!(camel_case("userRoles"), "userRoles");
        assert_eq!(camel_case("Roles"), "roles");
        assert_eq!(camel_case("api_URLs"), "apiURLs");
    }

    #[test]
    fn camel_case_collapses_repeated_separators() {
        assert_eq!(camel_case("foo--bar__baz"), "fooBarBaz");
        assert_eq!(camel_case(""), "");
    }

    #[test]
    fn humanize_replaces_underscores() {
        assert_eq!(humanize_key("user_roles"), "user roles");
        assert_eq!(humanize_key("tags"), "tags");
    }

    #[test]
    fn identifiers_reject_sql_metacharacters() {
        assert!(is_sql_identifier("role_user"));
        assert!(is_sql_identifier("_t1"));
        assert!(!is_sql_identifier("1table"));
        assert!(!is_sql_identifier("users; DROP TABLE x"));
        assert!(!is_sql_identifier("\"quoted\""));
        assert!(!is_sql_identifier(""));
    }
}

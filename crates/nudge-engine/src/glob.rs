// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `*`-wildcard patterns for page URLs and UTM values.

use regex::Regex;

/// A compiled wildcard pattern. `*` matches any run of characters
/// (including none); everything else matches literally.
#[derive(Debug, Clone)]
pub struct UrlGlob {
    regex: Option<Regex>,
}

impl UrlGlob {
    pub fn new(pattern: &str) -> Self {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))
            .inspect_err(|e| tracing::warn!(pattern, error = %e, "unusable URL pattern, it will never match"))
            .ok();
        Self { regex }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn star_matches_any_suffix() {
        let glob = UrlGlob::new("/products/*");
        assert!(glob.is_match("/products/shoes"));
        assert!(glob.is_match("/products/"));
        assert!(!glob.is_match("/product"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let glob = UrlGlob::new("/search?q=(a+b)");
        assert!(glob.is_match("/search?q=(a+b)"));
        assert!(!glob.is_match("/searchXq=aab"));
    }

    #[test]
    fn inner_wildcards() {
        let glob = UrlGlob::new("/shop/*/checkout*");
        assert!(glob.is_match("/shop/eu/checkout"));
        assert!(glob.is_match("/shop/us/checkout/step-2"));
        assert!(!glob.is_match("/shop/checkout"));
    }

    proptest! {
        #[test]
        fn lone_star_matches_everything(text in ".*") {
            prop_assert!(UrlGlob::new("*").is_match(&text));
        }

        #[test]
        fn literal_pattern_matches_only_itself(text in "[a-z/?=&.+()]{0,24}", other in "[a-z/]{1,8}") {
            let glob = UrlGlob::new(&text);
            prop_assert!(glob.is_match(&text));
            let longer = format!("{text}{other}");
            prop_assert!(!glob.is_match(&longer));
        }
    }
}

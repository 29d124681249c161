//! Lexical building blocks for matching minified player script

/// Identifier as emitted by the minifier
pub const JS_VARIABLE: &str = r"[A-Za-z_$][\w$]*";

/// Single-quoted string literal, escapes included
pub const JS_SINGLE_QUOTE_STRING: &str = r"'[^'\\]*(?:\\[\s\S][^'\\]*)*'";

/// Double-quoted string literal, escapes included
pub const JS_DOUBLE_QUOTE_STRING: &str = r#""[^"\\]*(?:\\[\s\S][^"\\]*)*""#;

/// `''` or `""`
pub const JS_EMPTY_STRING: &str = r#"(?:''|"")"#;

/// Any string literal
pub fn js_string() -> String {
    format!("(?:{}|{})", JS_SINGLE_QUOTE_STRING, JS_DOUBLE_QUOTE_STRING)
}

/// Object key, bare or quoted
pub fn js_key() -> String {
    format!("(?:{}|{})", JS_VARIABLE, js_string())
}

/// Property access, `.name` or `["name"]`
pub fn js_property() -> String {
    format!(r"(?:\.{}|\[{}\])", JS_VARIABLE, js_string())
}

/// String literal capturing its contents into `name_single` / `name_double`
pub fn js_capturing_string(name: &str) -> String {
    format!(
        r#"(?:'(?P<{name}_single>[^'\\]*(?:\\[\s\S][^'\\]*)*)'|"(?P<{name}_double>[^"\\]*(?:\\[\s\S][^"\\]*)*)")"#,
        name = name
    )
}

/// Remove surrounding quotes from a key or string literal
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_js_string_matches_escapes() {
        let re = Regex::new(&format!("^{}$", js_string())).unwrap();
        assert!(re.is_match(r#""abc""#));
        assert!(re.is_match(r"'a\'b'"));
        assert!(re.is_match(r#""""#));
        assert!(!re.is_match(r#""abc"#));
    }

    #[test]
    fn test_js_property() {
        let re = Regex::new(&format!("^{}$", js_property())).unwrap();
        assert!(re.is_match(".Ab"));
        assert!(re.is_match(r#"["cD"]"#));
        assert!(!re.is_match("[3]"));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""cD""#), "cD");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("Ab"), "Ab");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("'x\""), "'x\"");
    }

    #[test]
    fn test_capturing_string() {
        let re = Regex::new(&js_capturing_string("value")).unwrap();
        let caps = re.captures(r#"return"fallback_1"+a"#).unwrap();
        assert_eq!(caps.name("value_double").unwrap().as_str(), "fallback_1");
        assert!(caps.name("value_single").is_none());
    }
}

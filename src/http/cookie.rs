//! `Set-Cookie` parsing and `Cookie` header rendering
//!
//! A single `Set-Cookie` value may carry several cookies joined by `,`, each
//! with `;`-separated attributes. Names and values are split on the first
//! `=` only, so values such as base64 padding keep their `=` signs.
//!
//! The comma rule is a heuristic: a comma always ends the current cookie.
//! Dates inside `Expires=` contain a comma and therefore split into an extra
//! bogus cookie. Callers look cookies up by name, which keeps the heuristic
//! harmless for the login flow.

use super::Headers;

/// One cookie from a `Set-Cookie` value: the leading `name=value` pair
/// followed by its attributes, in header order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetCookie {
    pairs: Vec<(String, String)>,
}

impl SetCookie {
    /// Cookie name (the first key)
    pub fn name(&self) -> &str {
        self.pairs.first().map(|(k, _)| k.as_str()).unwrap_or_default()
    }

    /// Cookie value (the first value), still percent-encoded
    pub fn value(&self) -> &str {
        self.pairs.first().map(|(_, v)| v.as_str()).unwrap_or_default()
    }

    /// Attribute value by case-insensitive name; flags yield `Some("")`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .skip(1)
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All pairs in order, cookie first
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Tokenizer position inside the current pair
#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    Key,
    Value,
}

struct Tokenizer {
    cookies: Vec<SetCookie>,
    current: Vec<(String, String)>,
    key: String,
    value: String,
    position: Position,
}

impl Tokenizer {
    fn new() -> Self {
        Tokenizer {
            cookies: Vec::new(),
            current: Vec::new(),
            key: String::new(),
            value: String::new(),
            position: Position::Key,
        }
    }

    fn feed(&mut self, ch: char) {
        match (ch, self.position) {
            ('=', Position::Key) => self.position = Position::Value,
            (';', _) => self.end_pair(),
            (',', _) => {
                self.end_pair();
                self.end_cookie();
            }
            (c, Position::Key) => self.key.push(c),
            (c, Position::Value) => self.value.push(c),
        }
    }

    fn end_pair(&mut self) {
        let key = self.key.trim();
        let value = self.value.trim();
        if !key.is_empty() || !value.is_empty() {
            self.current.push((key.to_string(), value.to_string()));
        }
        self.key.clear();
        self.value.clear();
        self.position = Position::Key;
    }

    fn end_cookie(&mut self) {
        if !self.current.is_empty() {
            self.cookies.push(SetCookie {
                pairs: std::mem::take(&mut self.current),
            });
        }
    }

    fn finish(mut self) -> Vec<SetCookie> {
        self.end_pair();
        self.end_cookie();
        self.cookies
    }
}

/// Parse a `Set-Cookie` header value into cookies, left to right
pub fn parse_set_cookie_value(value: &str) -> Vec<SetCookie> {
    let mut tokenizer = Tokenizer::new();
    for ch in value.chars() {
        tokenizer.feed(ch);
    }
    tokenizer.finish()
}

/// Value of cookie `name` from the first `Set-Cookie` header that starts
/// with `"{name}="`
///
/// An empty value (a deleted cookie) counts as missing.
pub fn find_cookie(headers: &Headers, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    let header = headers.find("Set-Cookie", Some(&prefix))?;

    parse_set_cookie_value(header)
        .into_iter()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Render `name=value` pairs as a `Cookie` request header value
pub fn cookie_header<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cookies: &[SetCookie]) -> Vec<&str> {
        cookies.iter().map(|c| c.name()).collect()
    }

    #[test]
    fn test_single_cookie_with_attributes() {
        let cookies = parse_set_cookie_value("session=abc%20123; Path=/; Secure; HttpOnly");
        assert_eq!(cookies.len(), 1);

        let cookie = &cookies[0];
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.value(), "abc%20123");
        assert_eq!(cookie.attribute("path"), Some("/"));
        assert_eq!(cookie.attribute("Secure"), Some(""));
        assert_eq!(cookie.attribute("Domain"), None);
        assert_eq!(cookie.pairs().len(), 4);
    }

    #[test]
    fn test_comma_separates_cookies() {
        let cookies = parse_set_cookie_value("a=1; Path=/, b=2; HttpOnly, c=3");
        assert_eq!(names(&cookies), vec!["a", "b", "c"]);
        assert_eq!(cookies[0].value(), "1");
        assert_eq!(cookies[1].value(), "2");
        assert_eq!(cookies[2].value(), "3");
    }

    #[test]
    fn test_comma_after_flag_attribute() {
        let cookies = parse_set_cookie_value("a=1; HttpOnly,b=2");
        assert_eq!(names(&cookies), vec!["a", "b"]);
        assert_eq!(cookies[0].attribute("HttpOnly"), Some(""));
    }

    #[test]
    fn test_value_keeps_equals_signs() {
        let cookies = parse_set_cookie_value("token=YWJj==; Path=/a=b");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value(), "YWJj==");
        assert_eq!(cookies[0].attribute("Path"), Some("/a=b"));
    }

    #[test]
    fn test_attribute_order_preserved() {
        let cookies = parse_set_cookie_value("x=1; Max-Age=60; Path=/; SameSite=Lax");
        let keys: Vec<&str> = cookies[0].pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["x", "Max-Age", "Path", "SameSite"]);
    }

    #[test]
    fn test_expires_date_comma_splits_cookie() {
        // Known fragility: the comma inside the date ends the cookie.
        let cookies =
            parse_set_cookie_value("a=1; Expires=Wed, 01-Jan-2025 00:00:00 GMT; Path=/");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name(), "a");
        assert_eq!(cookies[0].attribute("Expires"), Some("Wed"));
        assert_eq!(cookies[1].name(), "01-Jan-2025 00:00:00 GMT");
        assert_eq!(cookies[1].value(), "");
        assert_eq!(cookies[1].attribute("Path"), Some("/"));
    }

    #[test]
    fn test_n_cookies_yield_n_maps() {
        for n in 1..6 {
            let value = (0..n)
                .map(|i| format!("c{}=v{}; Path=/; HttpOnly", i, i))
                .collect::<Vec<_>>()
                .join(", ");
            let cookies = parse_set_cookie_value(&value);
            assert_eq!(cookies.len(), n);
            for (i, cookie) in cookies.iter().enumerate() {
                assert_eq!(cookie.pairs()[0], (format!("c{}", i), format!("v{}", i)));
            }
        }
    }

    #[test]
    fn test_empty_and_trailing_separators() {
        assert!(parse_set_cookie_value("").is_empty());
        let cookies = parse_set_cookie_value("a=1;;, ,");
        assert_eq!(names(&cookies), vec!["a"]);
    }

    #[test]
    fn test_find_cookie_by_prefix() {
        let mut headers = Headers::new();
        headers.insert("Set-Cookie", "other=1; Path=/");
        headers.insert("Set-Cookie", "_frontend_session=xyz; Path=/; HttpOnly");

        assert_eq!(find_cookie(&headers, "_frontend_session"), Some("xyz".to_string()));
        assert_eq!(find_cookie(&headers, "other"), Some("1".to_string()));
        assert_eq!(find_cookie(&headers, "_frontend"), None);
        assert_eq!(find_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_find_cookie_deleted_value_is_missing() {
        let mut headers = Headers::new();
        headers.insert("Set-Cookie", "session=; Max-Age=0");
        assert_eq!(find_cookie(&headers, "session"), None);
    }

    #[test]
    fn test_cookie_header() {
        assert_eq!(cookie_header([("a", "1"), ("b", "x%20y")]), "a=1; b=x%20y");
        assert_eq!(cookie_header(Vec::<(String, String)>::new()), "");
    }
}

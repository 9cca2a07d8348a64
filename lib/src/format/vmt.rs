//! Material script format: a small line-oriented text format. The first
//! token names the shader, the rest are key/value parameter pairs.
//!
//! Real scripts in the wild are messy: keys with and without quotes, `//`
//! comments, one level of braces around the parameter block, stray nested
//! blocks. The parser tolerates all of it and never fails; garbage lines
//! contribute nothing.

use indexmap::IndexMap;

/// A parsed material script. Parameters keep file order, keys are stored
/// lowercased, and a key written twice keeps its last value.
#[derive(Clone, Debug, Default)]
pub struct MaterialScript {
    pub shader: String,
    pub parameters: IndexMap<String, String>,
}

impl MaterialScript {
    pub fn parse(text: &str) -> Self {
        let mut tokens = text.lines().flat_map(line_tokens);

        let shader = tokens.next().unwrap_or_default();
        let mut parameters = IndexMap::new();
        loop {
            let Some(key) = tokens.next() else { break };
            // A trailing key with no value is dropped.
            let Some(value) = tokens.next() else { break };
            parameters.insert(key.to_lowercase(), value);
        }
        Self { shader, parameters }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(data))
    }

    /// Case-insensitive parameter lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key)?.trim().parse().ok()
    }

    /// Scripts write booleans as 0/1; any other value reads as `None`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.trim().parse::<i64>().ok().map(|v| v != 0)
    }
}

/// Splits one line into tokens: quoted strings, bare words, with braces and
/// `//` comments discarded.
fn line_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let mut token = String::new();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    token.push(c);
                }
                tokens.push(token);
            }
            '{' | '}' => {}
            '/' if chars.peek() == Some(&'/') => break,
            c if c.is_whitespace() => {}
            c => {
                let mut token = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '"' | '{' | '}') {
                        break;
                    }
                    if next == '/' {
                        // Might start a comment; bare tokens keep single
                        // slashes (texture paths use them).
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        if lookahead.peek() == Some(&'/') {
                            break;
                        }
                    }
                    token.push(next);
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_pairs_with_braces_and_comments() {
        let script = MaterialScript::parse(
            r#"
            // player chest material
            "VertexLitGeneric"
            {
                "$basetexture" "models/player/chest" // diffuse
                "$bumpmap" "models/player/chest_normal"
            }
            "#,
        );
        assert_eq!(script.shader, "VertexLitGeneric");
        assert_eq!(script.get("$basetexture"), Some("models/player/chest"));
        assert_eq!(script.get("$bumpmap"), Some("models/player/chest_normal"));
    }

    #[test]
    fn unquoted_tokens_are_accepted() {
        let script = MaterialScript::parse(
            "VertexLitGeneric\n{\n\t$basetexture models/props/crate01\n\t$phong 1\n}\n",
        );
        assert_eq!(script.get("$basetexture"), Some("models/props/crate01"));
        assert_eq!(script.get_bool("$phong"), Some(true));
    }

    #[test]
    fn keys_are_case_insensitive_and_last_wins() {
        let script = MaterialScript::parse(
            r#""Shader" "$BaseTexture" "a" "$basetexture" "b""#,
        );
        assert_eq!(script.parameters.len(), 1);
        assert_eq!(script.get("$BASETEXTURE"), Some("b"));
    }

    #[test]
    fn parameter_order_is_preserved() {
        let script =
            MaterialScript::parse(r#""s" "$z" "1" "$a" "2" "$m" "3""#);
        let keys: Vec<&str> = script.parameters.keys().map(String::as_str).collect();
        assert_eq!(keys, ["$z", "$a", "$m"]);
    }

    #[test]
    fn numeric_and_boolean_accessors() {
        let script = MaterialScript::parse(
            r#""s" "$phongexponent" "42.5" "$phong" "0" "$alpha" "nope""#,
        );
        assert_eq!(script.get_f32("$phongexponent"), Some(42.5));
        assert_eq!(script.get_bool("$phong"), Some(false));
        assert_eq!(script.get_bool("$alpha"), None);
        assert_eq!(script.get_f32("$missing"), None);
    }

    #[test]
    fn bare_paths_keep_single_slashes() {
        let script = MaterialScript::parse("s $basetexture models/a/b // trailing");
        assert_eq!(script.get("$basetexture"), Some("models/a/b"));
    }

    #[test]
    fn empty_and_garbage_input_yield_empty_script() {
        assert_eq!(MaterialScript::parse("").shader, "");
        let script = MaterialScript::from_bytes(b"// nothing but comments\n");
        assert!(script.shader.is_empty());
        assert!(script.parameters.is_empty());
    }
}

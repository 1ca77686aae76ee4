//! Expression lowering.
//!
//! A step body is serialized as JSON with every prefixed string rewritten into
//! a bare expression over the runtime context:
//!
//! | prefix | meaning              | lowered form        |
//! |--------|----------------------|---------------------|
//! | `var:` | variable             | `ctx.vars.<rest>`   |
//! | `js:`  | raw expression       | `<rest>`            |
//! | `out:` | step output          | `ctx.outputs.<rest>`|
//! | `fm:`  | flow module          | `ctx.flows.<rest>`  |
//! | `ff:`  | form field           | `ctx.form.<rest>`   |
//! | `lp:`  | loop context         | `ctx.loop.<rest>`   |
//!
//! A rewritten value loses its quotes; a rewritten mapping key becomes a
//! computed key `[expr]`. Strings without a recognized prefix stay literal;
//! literals that contain the placeholder marker are themselves carried through
//! a placeholder so they come back quoted.
//! The result is a JavaScript object literal, not strict JSON.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use stepflow_types::node::Node;

const MARKER: &str = "__stepflow_expr_";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""__stepflow_expr_(\d+)__""#).expect("placeholder pattern is valid")
});

/// Lower a single prefixed string; `None` when no prefix applies.
pub fn lower_expression(text: &str) -> Option<String> {
    let (prefix, rest) = text.split_once(':')?;
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    let lowered = match prefix {
        "var" => format!("ctx.vars.{rest}"),
        "js" => rest.to_string(),
        "out" => format!("ctx.outputs.{rest}"),
        "fm" => format!("ctx.flows.{rest}"),
        "ff" => format!("ctx.form.{rest}"),
        "lp" => format!("ctx.loop.{rest}"),
        _ => return None,
    };
    Some(lowered)
}

/// Lower a whole step body into object-literal text.
pub fn lower_definition(raw: &Value) -> String {
    let mut expressions = Vec::new();
    let rewritten = rewrite(raw, &mut expressions);
    let text = serde_json::to_string(&rewritten).unwrap_or_else(|_| "null".to_string());
    if expressions.is_empty() {
        return text;
    }
    PLACEHOLDER
        .replace_all(&text, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| expressions.get(i).cloned())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Lowered body of `node`, computed on first access and cached on the node.
pub fn lowered(node: &Node) -> &str {
    node.lowered_or_init(lower_definition)
}

fn placeholder(expressions: &mut Vec<String>, expression: String) -> String {
    expressions.push(expression);
    format!("{MARKER}{}__", expressions.len() - 1)
}

/// JSON string literal for `text`, quotes included.
fn quoted(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn rewrite(value: &Value, expressions: &mut Vec<String>) -> Value {
    match value {
        Value::String(s) => match lower_expression(s) {
            Some(expr) => Value::String(placeholder(expressions, expr)),
            None if s.contains(MARKER) => Value::String(placeholder(expressions, quoted(s))),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite(v, expressions)).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                let key = match lower_expression(key) {
                    Some(expr) => placeholder(expressions, format!("[{expr}]")),
                    None if key.contains(MARKER) => placeholder(expressions, quoted(key)),
                    None => key.clone(),
                };
                out.insert(key, rewrite(v, expressions));
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepflow_types::node::NodeKind;

    #[test]
    fn test_lower_expression_prefixes() {
        assert_eq!(lower_expression("var:total").as_deref(), Some("ctx.vars.total"));
        assert_eq!(lower_expression("js:a + b").as_deref(), Some("a + b"));
        assert_eq!(lower_expression("out:fetch.body").as_deref(), Some("ctx.outputs.fetch.body"));
        assert_eq!(lower_expression("ff:email").as_deref(), Some("ctx.form.email"));
        assert_eq!(lower_expression("lp:index").as_deref(), Some("ctx.loop.index"));
        assert_eq!(lower_expression("fm:helper").as_deref(), Some("ctx.flows.helper"));
        assert_eq!(lower_expression("https://example.com"), None);
        assert_eq!(lower_expression("var:"), None);
        assert_eq!(lower_expression("plain"), None);
    }

    #[test]
    fn test_values_lose_quotes() {
        let lowered = lower_definition(&json!({"assign": [{"sum": "js:a + b"}]}));
        assert_eq!(lowered, r#"{"assign":[{"sum":a + b}]}"#);
    }

    #[test]
    fn test_keys_become_computed() {
        let lowered = lower_definition(&json!({"assign": [{"var:name": "literal"}]}));
        assert_eq!(lowered, r#"{"assign":[{[ctx.vars.name]:"literal"}]}"#);
    }

    #[test]
    fn test_plain_strings_untouched() {
        let raw = json!({"http": {"url": "https://example.com", "retries": 3}});
        assert_eq!(lower_definition(&raw), serde_json::to_string(&raw).unwrap());
    }

    #[test]
    fn test_marker_lookalikes_stay_literal() {
        let raw = json!({
            "assign": [
                {"a": "__stepflow_expr_0__"},
                {"b": "var:x"},
                {"__stepflow_expr_1__": "say \"__stepflow_expr_0__"}
            ]
        });
        assert_eq!(
            lower_definition(&raw),
            r#"{"assign":[{"a":"__stepflow_expr_0__"},{"b":ctx.vars.x},{"__stepflow_expr_1__":"say \"__stepflow_expr_0__"}]}"#
        );
    }

    #[test]
    fn test_lowered_is_cached_on_node() {
        let node = Node::new(NodeKind::Return, "r", json!({"return": "var:x"}));
        assert_eq!(lowered(&node), r#"{"return":ctx.vars.x}"#);
        assert_eq!(node.lowered(), Some(r#"{"return":ctx.vars.x}"#));
    }
}

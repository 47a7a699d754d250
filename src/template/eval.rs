//! Expression evaluation and template expansion.
//!
//! Evaluation distinguishes *undefined* (a lookup that resolved nothing)
//! from JSON null: a full-expression template of an undefined value expands
//! to null, while an undefined interpolation keeps its `{{…}}` literal.
//! Missing paths never raise; only malformed expressions and bad operand
//! types do.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::expr::{parse, BinOp, Expr, UnaryOp};
use crate::error::{Error, Result};

/// The mapping exposed to templates and rules during one execution.
///
/// `output` is bound only while setState rules run; `locals` hold names
/// bound by rule assignments and shadow the fixed roots.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub parameters: Value,
    pub config: Value,
    pub state: Value,
    pub parent: Value,
    pub output: Option<Value>,
    locals: HashMap<String, Value>,
}

impl Context {
    pub fn new(parameters: Value, config: Value, state: Value, parent: Value) -> Self {
        Self {
            parameters,
            config,
            state,
            parent,
            output: None,
            locals: HashMap::new(),
        }
    }

    /// Rebind the context with the just-produced node output (setState scope).
    pub fn with_output(&self, output: Value) -> Self {
        let mut ctx = self.clone();
        ctx.output = Some(output);
        ctx
    }

    /// Bind a rule-local name, shadowing context roots.
    pub fn set_local(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }

    /// Resolve a root identifier. `None` means undefined.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(local) = self.locals.get(name) {
            return Some(local.clone());
        }
        match name {
            "parameters" => Some(self.parameters.clone()),
            "config" => Some(self.config.clone()),
            "state" => Some(self.state.clone()),
            "parent" => Some(self.parent.clone()),
            "output" => self.output.clone(),
            _ => None,
        }
    }
}

/// JS-like truthiness over JSON values; undefined is falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// String coercion used by interpolation.
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number_value(f: f64) -> Result<Value> {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Ok(Value::Number((f as i64).into()));
    }
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Error::Template(format!("arithmetic produced a non-finite number: {}", f)))
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Evaluate an expression source string against a context.
///
/// `Ok(None)` means the expression resolved to undefined.
pub fn eval_expression(src: &str, ctx: &Context) -> Result<Option<Value>> {
    let expr = parse(src)?;
    eval(&expr, ctx)
}

fn eval(expr: &Expr, ctx: &Context) -> Result<Option<Value>> {
    match expr {
        Expr::Null => Ok(Some(Value::Null)),
        Expr::Bool(b) => Ok(Some(Value::Bool(*b))),
        Expr::Number(n) => Ok(Some(number_value(*n)?)),
        Expr::Str(s) => Ok(Some(Value::String(s.clone()))),
        Expr::Ident(name) => Ok(ctx.lookup(name)),
        Expr::Member(obj, key) => {
            let base = eval(obj, ctx)?;
            Ok(base.and_then(|v| v.get(key.as_str()).cloned()))
        }
        Expr::Index(obj, index) => {
            let base = eval(obj, ctx)?;
            let index = eval(index, ctx)?;
            let (Some(base), Some(index)) = (base, index) else {
                return Ok(None);
            };
            Ok(match index {
                Value::String(key) => base.get(key.as_str()).cloned(),
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|i| base.get(i as usize).cloned()),
                _ => None,
            })
        }
        Expr::Unary(op, inner) => {
            let value = eval(inner, ctx)?;
            match op {
                UnaryOp::Not => Ok(Some(Value::Bool(!is_truthy(value.as_ref())))),
                UnaryOp::Neg => {
                    let n = value
                        .as_ref()
                        .and_then(as_number)
                        .ok_or_else(|| Error::Template("cannot negate a non-number".to_string()))?;
                    Ok(Some(number_value(-n)?))
                }
            }
        }
        Expr::Binary(op, left, right) => eval_binary(*op, left, right, ctx),
        Expr::Call(name, args) => eval_call(name, args, ctx),
    }
}

fn eval_binary(op: BinOp, left: &Expr, right: &Expr, ctx: &Context) -> Result<Option<Value>> {
    // Short-circuit forms first.
    match op {
        BinOp::Or => {
            let l = eval(left, ctx)?;
            if is_truthy(l.as_ref()) {
                return Ok(Some(Value::Bool(true)));
            }
            let r = eval(right, ctx)?;
            return Ok(Some(Value::Bool(is_truthy(r.as_ref()))));
        }
        BinOp::And => {
            let l = eval(left, ctx)?;
            if !is_truthy(l.as_ref()) {
                return Ok(Some(Value::Bool(false)));
            }
            let r = eval(right, ctx)?;
            return Ok(Some(Value::Bool(is_truthy(r.as_ref()))));
        }
        _ => {}
    }

    let l = eval(left, ctx)?.unwrap_or(Value::Null);
    let r = eval(right, ctx)?.unwrap_or(Value::Null);

    let result = match op {
        BinOp::Eq => Value::Bool(l == r),
        BinOp::Ne => Value::Bool(l != r),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => match (as_number(&l), as_number(&r)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => {
                        return Err(Error::Template(format!(
                            "cannot compare {} with {}",
                            type_name(&l),
                            type_name(&r)
                        )))
                    }
                },
            };
            let Some(ordering) = ordering else {
                return Err(Error::Template("incomparable values".to_string()));
            };
            Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinOp::Add => match (&l, &r) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{}{}", coerce_string(&l), coerce_string(&r)))
            }
            _ => {
                let (a, b) = numeric_operands(&l, &r, "+")?;
                number_value(a + b)?
            }
        },
        BinOp::Sub => {
            let (a, b) = numeric_operands(&l, &r, "-")?;
            number_value(a - b)?
        }
        BinOp::Mul => {
            let (a, b) = numeric_operands(&l, &r, "*")?;
            number_value(a * b)?
        }
        BinOp::Div => {
            let (a, b) = numeric_operands(&l, &r, "/")?;
            if b == 0.0 {
                return Err(Error::Template("division by zero".to_string()));
            }
            number_value(a / b)?
        }
        BinOp::Mod => {
            let (a, b) = numeric_operands(&l, &r, "%")?;
            if b == 0.0 {
                return Err(Error::Template("division by zero".to_string()));
            }
            number_value(a % b)?
        }
        BinOp::Or | BinOp::And => unreachable!(),
    };

    Ok(Some(result))
}

fn numeric_operands(l: &Value, r: &Value, op: &str) -> Result<(f64, f64)> {
    match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::Template(format!(
            "operator '{}' requires numbers, got {} and {}",
            op,
            type_name(l),
            type_name(r)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &Context) -> Result<Option<Value>> {
    match name {
        "getPath" => {
            if args.len() != 2 {
                return Err(Error::Template(
                    "getPath expects two arguments: (obj, path)".to_string(),
                ));
            }
            let obj = eval(&args[0], ctx)?.unwrap_or(Value::Null);
            let path = eval(&args[1], ctx)?.unwrap_or(Value::Null);
            let Value::String(path) = path else {
                return Err(Error::Template(
                    "getPath expects a string path".to_string(),
                ));
            };
            Ok(Some(get_path(&obj, &path)))
        }
        "parse" => {
            if args.len() != 1 {
                return Err(Error::Template("parse expects one argument".to_string()));
            }
            let template = eval(&args[0], ctx)?.unwrap_or(Value::Null);
            Ok(Some(expand(&template, ctx)?))
        }
        "eval" => {
            if args.len() != 1 {
                return Err(Error::Template("eval expects one argument".to_string()));
            }
            let src = eval(&args[0], ctx)?.unwrap_or(Value::Null);
            let Value::String(src) = src else {
                return Err(Error::Template(
                    "eval expects an expression string".to_string(),
                ));
            };
            eval_expression(&src, ctx)
        }
        other => Err(Error::Template(format!("unknown function '{}'", other))),
    }
}

/// Resolve a dotted/bracketed path string against a value.
///
/// Returns null when any intermediate segment is absent.
pub fn get_path(obj: &Value, path: &str) -> Value {
    let mut current = obj.clone();
    for segment in path_segments(path) {
        let next = match &current {
            Value::Object(map) => map.get(&segment).cloned(),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current
}

fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !buf.is_empty() {
                    segments.push(std::mem::take(&mut buf));
                }
            }
            '[' => {
                if !buf.is_empty() {
                    segments.push(std::mem::take(&mut buf));
                }
                let mut inner = String::new();
                for ic in chars.by_ref() {
                    if ic == ']' {
                        break;
                    }
                    inner.push(ic);
                }
                let trimmed = inner.trim_matches(|q| q == '"' || q == '\'');
                segments.push(trimmed.to_string());
            }
            _ => buf.push(c),
        }
    }
    if !buf.is_empty() {
        segments.push(buf);
    }
    segments
}

/// Recursively expand a template tree against a context.
///
/// Strings follow the two-branch rule: a string that is exactly one
/// `{{expr}}` placeholder returns the expression's native value, any other
/// string interpolates each placeholder as text. Arrays expand element-wise,
/// mappings value-wise; other scalars pass through.
pub fn expand(template: &Value, ctx: &Context) -> Result<Value> {
    match template {
        Value::String(s) => expand_string(s, ctx),
        Value::Array(items) => {
            let expanded = items
                .iter()
                .map(|item| expand(item, ctx))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(expanded))
        }
        Value::Object(map) => {
            let mut expanded = Map::with_capacity(map.len());
            for (key, value) in map {
                expanded.insert(key.clone(), expand(value, ctx)?);
            }
            Ok(Value::Object(expanded))
        }
        other => Ok(other.clone()),
    }
}

/// If `s` is exactly one `{{…}}` placeholder, return the inner expression.
fn full_expression(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn expand_string(s: &str, ctx: &Context) -> Result<Value> {
    if let Some(src) = full_expression(s) {
        return Ok(eval_expression(src, ctx)?.unwrap_or(Value::Null));
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // No closing braces; keep the tail verbatim.
            out.push_str(&rest[start..]);
            return Ok(Value::String(out));
        };
        let src = &after[..end];
        match eval_expression(src.trim(), ctx)? {
            Some(value) => out.push_str(&coerce_string(&value)),
            // Undefined interpolations keep the original literal.
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::new(
            json!({"name": "ada", "n": 2}),
            json!({"region": "eu"}),
            json!({"count": 3, "items": ["a", "b"]}),
            json!({"A": {"a": 1}, "B": {"b": 2}}),
        )
    }

    #[test]
    fn test_full_expression_preserves_type() {
        let v = expand(&json!("{{parent.A.a}}"), &ctx()).unwrap();
        assert_eq!(v, json!(1));

        let v = expand(&json!("{{state.items}}"), &ctx()).unwrap();
        assert_eq!(v, json!(["a", "b"]));
    }

    #[test]
    fn test_full_expression_with_whitespace() {
        let v = expand(&json!("  {{ state.count }}  "), &ctx()).unwrap();
        assert_eq!(v, json!(3));
    }

    #[test]
    fn test_interpolation_coerces_to_string() {
        let v = expand(&json!("count={{state.count}}, region={{config.region}}"), &ctx()).unwrap();
        assert_eq!(v, json!("count=3, region=eu"));
    }

    #[test]
    fn test_undefined_interpolation_keeps_literal() {
        let v = expand(&json!("value: {{state.missing}}!"), &ctx()).unwrap();
        assert_eq!(v, json!("value: {{state.missing}}!"));
    }

    #[test]
    fn test_undefined_full_expression_is_null() {
        let v = expand(&json!("{{state.missing}}"), &ctx()).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_structural_expansion() {
        let template = json!({
            "greeting": "hi {{parameters.name}}",
            "nested": [{"v": "{{parent.B.b}}"}],
            "scalar": 7
        });
        let v = expand(&template, &ctx()).unwrap();
        assert_eq!(
            v,
            json!({"greeting": "hi ada", "nested": [{"v": 2}], "scalar": 7})
        );
    }

    #[test]
    fn test_expand_without_placeholders_is_identity() {
        let template = json!({"a": [1, 2, {"b": "plain"}], "c": true});
        let v = expand(&template, &ctx()).unwrap();
        assert_eq!(v, template);
    }

    #[test]
    fn test_expand_is_idempotent_after_full_substitution() {
        let template = json!({"x": "{{state.count}}", "y": "n={{parameters.n}}"});
        let once = expand(&template, &ctx()).unwrap();
        let twice = expand(&once, &ctx()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let c = ctx();
        assert_eq!(
            eval_expression("state.count + 1", &c).unwrap(),
            Some(json!(4))
        );
        assert_eq!(
            eval_expression("state.count >= 70", &c).unwrap(),
            Some(json!(false))
        );
        assert_eq!(
            eval_expression("parameters.n * 10 - 5", &c).unwrap(),
            Some(json!(15))
        );
        assert_eq!(
            eval_expression("'pre-' + parameters.name", &c).unwrap(),
            Some(json!("pre-ada"))
        );
    }

    #[test]
    fn test_boolean_short_circuit() {
        let c = ctx();
        assert_eq!(
            eval_expression("state.missing || state.count > 0", &c).unwrap(),
            Some(json!(true))
        );
        assert_eq!(
            eval_expression("state.missing && state.count", &c).unwrap(),
            Some(json!(false))
        );
        assert_eq!(eval_expression("!state.missing", &c).unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_bracket_indexing() {
        let c = ctx();
        assert_eq!(
            eval_expression("state.items[1]", &c).unwrap(),
            Some(json!("b"))
        );
        assert_eq!(
            eval_expression(r#"parent["A"].a"#, &c).unwrap(),
            Some(json!(1))
        );
        assert_eq!(eval_expression("state.items[9]", &c).unwrap(), None);
    }

    #[test]
    fn test_get_path_builtin() {
        let c = ctx();
        assert_eq!(
            eval_expression(r#"getPath(parent, "A.a")"#, &c).unwrap(),
            Some(json!(1))
        );
        assert_eq!(
            eval_expression(r#"getPath(parent, "A.zzz.deep")"#, &c).unwrap(),
            Some(Value::Null)
        );
        assert_eq!(
            eval_expression(r#"getPath(state, "items[0]")"#, &c).unwrap(),
            Some(json!("a"))
        );
    }

    #[test]
    fn test_eval_builtin() {
        let c = ctx();
        assert_eq!(
            eval_expression(r#"eval("state.count + 1")"#, &c).unwrap(),
            Some(json!(4))
        );
    }

    #[test]
    fn test_parse_builtin_is_reentrant() {
        let c = ctx();
        assert_eq!(
            eval_expression(r#"parse("{{state.count}}")"#, &c).unwrap(),
            Some(json!(3))
        );
    }

    #[test]
    fn test_numeric_errors() {
        let c = ctx();
        assert!(eval_expression("state.items - 1", &c).is_err());
        assert!(eval_expression("1 / 0", &c).is_err());
        assert!(eval_expression("-parameters.name", &c).is_err());
    }

    #[test]
    fn test_undefined_equals_null() {
        let c = ctx();
        assert_eq!(
            eval_expression("state.missing == null", &c).unwrap(),
            Some(json!(true))
        );
    }
}

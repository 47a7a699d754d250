//! Rule DSL interpreter.
//!
//! A rule is either a bare expression/assignment string or an ordered list
//! of `{if, then, else, return}` steps. Rules drive `setState` updates and
//! dynamic edge routing; the conditions-list edge variant lives here too.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::eval::{eval_expression, is_truthy, Context};
use crate::error::{Error, Result};

/// A rule program: a single statement or a step sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Expr(String),
    Steps(Vec<RuleStep>),
}

/// One step of a rule program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleStep {
    /// Guard expression; the step is skipped when falsy.
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,

    /// Statement executed when the guard holds (or unconditionally).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,

    /// Statement executed when the guard does not hold.
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<String>,

    /// Terminates the rule with the expression's value.
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<String>,
}

/// One entry of a conditions-list dynamic edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeCondition {
    pub condition: String,
    pub node: String,
}

/// Execute a rule against a context and return its result.
///
/// The result is the `return` value if one fires, otherwise the value of
/// the most recent assignment, otherwise null.
pub fn run_rule(rule: &Rule, ctx: &Context) -> Result<Value> {
    let mut scope = ctx.clone();
    let mut last_assigned: Option<Value> = None;

    match rule {
        Rule::Expr(statement) => {
            let value = exec_statement(statement, &mut scope)?;
            Ok(value.unwrap_or(Value::Null))
        }
        Rule::Steps(steps) => {
            for step in steps {
                let guard_holds = match &step.when {
                    Some(src) => {
                        let value = eval_expression(src, &scope)?;
                        is_truthy(value.as_ref())
                    }
                    None => true,
                };

                if guard_holds {
                    if let Some(src) = &step.ret {
                        return Ok(eval_expression(src, &scope)?.unwrap_or(Value::Null));
                    }
                    if let Some(statement) = &step.then {
                        if let Some(value) = exec_statement(statement, &mut scope)? {
                            last_assigned = Some(value);
                        }
                    }
                } else if let Some(statement) = &step.otherwise {
                    if let Some(value) = exec_statement(statement, &mut scope)? {
                        last_assigned = Some(value);
                    }
                }
            }
            Ok(last_assigned.unwrap_or(Value::Null))
        }
    }
}

/// Execute a statement: either `name = <expr>` binding a local, or a bare
/// expression. Returns the statement's value (undefined coerces to null).
fn exec_statement(statement: &str, scope: &mut Context) -> Result<Option<Value>> {
    if let Some((name, src)) = split_assignment(statement) {
        let value = eval_expression(src, scope)?.unwrap_or(Value::Null);
        scope.set_local(name, value.clone());
        return Ok(Some(value));
    }
    Ok(Some(
        eval_expression(statement, scope)?.unwrap_or(Value::Null),
    ))
}

/// Detect `name = expr` (a single `=`, not `==`, with an identifier head).
fn split_assignment(statement: &str) -> Option<(&str, &str)> {
    let bytes = statement.as_bytes();
    let eq = statement.find('=')?;
    if bytes.get(eq + 1) == Some(&b'=') || (eq > 0 && matches!(bytes[eq - 1], b'!' | b'<' | b'>')) {
        return None;
    }
    let name = statement[..eq].trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
        || name.chars().next().map(|c| c.is_numeric()).unwrap_or(true)
    {
        return None;
    }
    Some((name, statement[eq + 1..].trim()))
}

/// Evaluate a conditions-list dynamic edge: the first truthy condition
/// selects its node.
pub fn eval_conditions(conditions: &[EdgeCondition], ctx: &Context) -> Result<String> {
    for entry in conditions {
        let value = eval_expression(&entry.condition, ctx)?;
        if is_truthy(value.as_ref()) {
            return Ok(entry.node.clone());
        }
    }
    Err(Error::Template(
        "no condition matched in dynamic edge".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::new(
            json!({}),
            json!({}),
            json!({"count": 2, "score": 75}),
            json!({}),
        )
    }

    #[test]
    fn test_bare_expression_rule() {
        let rule = Rule::Expr("state.count + 1".to_string());
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), json!(3));
    }

    #[test]
    fn test_bare_assignment_rule() {
        let rule = Rule::Expr("count = state.count + 1".to_string());
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), json!(3));
    }

    #[test]
    fn test_if_then_else_steps() {
        let rule: Rule = serde_json::from_value(json!([
            {"if": "state.score >= 70", "then": "label = 'high'", "else": "label = 'low'"},
            {"return": "label"}
        ]))
        .unwrap();
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), json!("high"));
    }

    #[test]
    fn test_unconditional_then_as_else() {
        let rule: Rule = serde_json::from_value(json!([
            {"if": "state.count > 10", "then": "next = 'counter'"},
            {"then": "next = 'end'"},
            {"return": "next"}
        ]))
        .unwrap();
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), json!("end"));
    }

    #[test]
    fn test_guarded_return() {
        let rule: Rule = serde_json::from_value(json!([
            {"if": "state.count < 3", "return": "'counter'"},
            {"return": "'end'"}
        ]))
        .unwrap();
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), json!("counter"));
    }

    #[test]
    fn test_result_without_return_is_last_assignment() {
        let rule: Rule = serde_json::from_value(json!([
            {"then": "a = 1"},
            {"then": "b = a + 1"}
        ]))
        .unwrap();
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), json!(2));
    }

    #[test]
    fn test_empty_rule_is_null() {
        let rule = Rule::Steps(vec![]);
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn test_locals_shadow_context() {
        let rule: Rule = serde_json::from_value(json!([
            {"then": "state = 9"},
            {"return": "state"}
        ]))
        .unwrap();
        assert_eq!(run_rule(&rule, &ctx()).unwrap(), json!(9));
    }

    #[test]
    fn test_output_binding_visible_to_rules() {
        let rule = Rule::Expr("output.total * 2".to_string());
        let scoped = ctx().with_output(json!({"total": 21}));
        assert_eq!(run_rule(&rule, &scoped).unwrap(), json!(42));
    }

    #[test]
    fn test_assignment_detection_ignores_comparisons() {
        assert!(split_assignment("a == b").is_none());
        assert!(split_assignment("a != b").is_none());
        assert!(split_assignment("a <= b").is_none());
        assert!(split_assignment("count = 1").is_some());
        assert!(split_assignment("a.b = 1").is_none());
    }

    #[test]
    fn test_conditions_first_truthy_wins() {
        let conditions = vec![
            EdgeCondition {
                condition: "state.score >= 90".to_string(),
                node: "excellent".to_string(),
            },
            EdgeCondition {
                condition: "state.score >= 70".to_string(),
                node: "high".to_string(),
            },
            EdgeCondition {
                condition: "true".to_string(),
                node: "low".to_string(),
            },
        ];
        assert_eq!(eval_conditions(&conditions, &ctx()).unwrap(), "high");
    }

    #[test]
    fn test_conditions_none_matched_errors() {
        let conditions = vec![EdgeCondition {
            condition: "state.score > 100".to_string(),
            node: "never".to_string(),
        }];
        let err = eval_conditions(&conditions, &ctx()).unwrap_err();
        assert!(err.to_string().contains("no condition matched"));
    }

    #[test]
    fn test_rule_error_propagates() {
        let rule = Rule::Expr("state.count +".to_string());
        assert!(run_rule(&rule, &ctx()).is_err());
    }
}

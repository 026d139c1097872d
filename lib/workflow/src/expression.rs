//! JEXL conditions and `{{ }}` config templates.
//!
//! Both are evaluated against the same context object:
//!
//! ```json
//! {
//!   "input": <run input>,
//!   "nodes": { "<id>": { "status": "success", "output": ..., "error": null } },
//!   "run": { "id": ..., "workflowId": ..., "tenantId": ..., "mode": "test" }
//! }
//! ```
//!
//! Payloads are always passed as context, never spliced into expression
//! text.

use crate::error::ExpressionError;
use crate::execution::{NodeExecutionResult, WorkflowRun};
use rootcause::prelude::Report;
use serde_json::{Map, Value as JsonValue, json};
use tracing::warn;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Evaluates edge conditions and renders templated node config.
pub struct ExpressionEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl std::fmt::Debug for ExpressionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEvaluator").finish_non_exhaustive()
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn first_str(args: &[JsonValue]) -> &str {
    args.first().and_then(JsonValue::as_str).unwrap_or("")
}

impl ExpressionEvaluator {
    /// Creates an evaluator with the standard transforms registered.
    #[must_use]
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[JsonValue]| {
                Ok(json!(first_str(args).to_lowercase()))
            })
            .with_transform("upper", |args: &[JsonValue]| {
                Ok(json!(first_str(args).to_uppercase()))
            })
            .with_transform("trim", |args: &[JsonValue]| Ok(json!(first_str(args).trim())))
            .with_transform("length", |args: &[JsonValue]| {
                let len = match args.first() {
                    Some(JsonValue::String(s)) => s.chars().count(),
                    Some(JsonValue::Array(a)) => a.len(),
                    Some(JsonValue::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("contains", |args: &[JsonValue]| {
                let needle = args.get(1).cloned().unwrap_or(JsonValue::Null);
                let found = match args.first() {
                    Some(JsonValue::String(s)) => needle.as_str().is_some_and(|n| s.contains(n)),
                    Some(JsonValue::Array(items)) => items.contains(&needle),
                    Some(JsonValue::Object(map)) => {
                        needle.as_str().is_some_and(|key| map.contains_key(key))
                    }
                    _ => false,
                };
                Ok(json!(found))
            });
        Self { evaluator }
    }

    /// Evaluates an expression to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `Evaluation` if the expression does not parse or evaluate.
    pub fn evaluate(
        &self,
        expression: &str,
        context: &JsonValue,
    ) -> Result<JsonValue, Report<ExpressionError>> {
        self.evaluator
            .eval_in_context(expression, context)
            .map_err(|e| {
                ExpressionError::Evaluation {
                    expression: expression.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Evaluates an expression and coerces the result with [`is_truthy`].
    ///
    /// # Errors
    ///
    /// Returns `Evaluation` if the expression does not parse or evaluate.
    pub fn evaluate_bool(
        &self,
        expression: &str,
        context: &JsonValue,
    ) -> Result<bool, Report<ExpressionError>> {
        self.evaluate(expression, context).map(|v| is_truthy(&v))
    }

    /// Evaluates an edge condition; an expression that cannot be evaluated
    /// is false.
    #[must_use]
    pub fn condition_holds(&self, expression: &str, context: &JsonValue) -> bool {
        match self.evaluate_bool(expression, context) {
            Ok(holds) => holds,
            Err(report) => {
                warn!(expression, error = %report, "condition could not be evaluated");
                false
            }
        }
    }

    /// Renders every `{{ expr }}` placeholder in the strings of `value`.
    ///
    /// A string that is exactly one placeholder takes the JSON type of the
    /// expression's result; otherwise results are spliced in as text.
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder is unterminated or fails to evaluate.
    pub fn render(
        &self,
        value: &JsonValue,
        context: &JsonValue,
    ) -> Result<JsonValue, Report<ExpressionError>> {
        Ok(match value {
            JsonValue::String(template) => self.render_str(template, context)?,
            JsonValue::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.render(item, context))
                    .collect::<Result<_, _>>()?,
            ),
            JsonValue::Object(map) => {
                let mut rendered = Map::with_capacity(map.len());
                for (key, item) in map {
                    rendered.insert(key.clone(), self.render(item, context)?);
                }
                JsonValue::Object(rendered)
            }
            other => other.clone(),
        })
    }

    fn render_str(
        &self,
        template: &str,
        context: &JsonValue,
    ) -> Result<JsonValue, Report<ExpressionError>> {
        if !template.contains(OPEN) {
            return Ok(JsonValue::String(template.to_string()));
        }

        let trimmed = template.trim();
        if let Some(inner) = trimmed
            .strip_prefix(OPEN)
            .and_then(|rest| rest.strip_suffix(CLOSE))
            && !inner.contains(OPEN)
            && !inner.contains(CLOSE)
        {
            return self.evaluate(inner.trim(), context);
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            let end = after
                .find(CLOSE)
                .ok_or_else(|| ExpressionError::UnterminatedPlaceholder {
                    template: template.to_string(),
                })?;
            let value = self.evaluate(after[..end].trim(), context)?;
            out.push_str(&display(&value));
            rest = &after[end + CLOSE.len()..];
        }
        out.push_str(rest);
        Ok(JsonValue::String(out))
    }
}

fn display(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JavaScript-like truthiness.
#[must_use]
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Null => false,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// Builds the evaluation context for a run and the results so far.
#[must_use]
pub fn context<'a>(
    run: &WorkflowRun,
    results: impl IntoIterator<Item = &'a NodeExecutionResult>,
) -> JsonValue {
    let mut nodes = Map::new();
    for result in results {
        nodes.insert(
            result.node_id.to_string(),
            json!({
                "status": result.status,
                "output": result.output,
                "error": result.error_message,
            }),
        );
    }
    json!({
        "input": run.input,
        "nodes": nodes,
        "run": {
            "id": run.id.to_string(),
            "workflowId": run.workflow_id.to_string(),
            "tenantId": run.tenant_id.to_string(),
            "mode": run.mode,
        },
    })
}

//! Rhai expression aggregator.
//!
//! The expression sees the ordered input values both as an array `x` and as
//! individual variables `x0`, `x1`, ... Numbers arrive as floats, text as
//! strings, booleans as booleans and absent values as `()`.
//!
//! ```text
//! args: [N, name_1 .. name_N, expression]
//! e.g.  ["2", "$1.volts", "$1.amps", "x0 * x1"]
//! ```

use crate::derived::AggregateContext;
use crate::error::{EngineError, Result, ResultExt};
use crate::point::Point;
use crate::types::{PointValue, Value};
use rhai::{Array, Dynamic, Engine, Scope, AST};

pub struct ExpressionAggregator {
    engine: Engine,
    ast: AST,
    source: String,
}

impl ExpressionAggregator {
    pub fn from_args(parent: &Point, args: &[String]) -> Result<Self> {
        let source = args.first().ok_or_else(|| {
            EngineError::Config(format!("({}) missing expression", parent.name()))
        })?;
        Self::compile(source).map_err(|e| e.with_context(format!("({})", parent.name())))
    }

    /// Compile `source` with the engine's safety limits.
    pub fn compile(source: &str) -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(1_000);

        let ast = engine
            .compile(source)
            .map_err(|e| EngineError::Config(format!("invalid expression '{}': {}", source, e)))?;
        Ok(Self {
            engine,
            ast,
            source: source.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        "Expression"
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn calculate(&mut self, ctx: &AggregateContext, inputs: &[PointValue]) -> Result<Value> {
        let mut scope = Scope::new();
        let values: Array = inputs.iter().map(|v| to_dynamic(&v.value)).collect();
        for (i, v) in values.iter().enumerate() {
            scope.push_dynamic(format!("x{}", i), v.clone());
        }
        scope.push("x", values);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .with_context(|| format!("({}) evaluating '{}'", ctx.owner.name(), self.source))?;
        Ok(from_dynamic(result))
    }
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Number(v) => Dynamic::from_float(*v),
        Value::Text(v) => Dynamic::from(v.clone()),
        Value::Bool(v) => Dynamic::from_bool(*v),
        Value::Absent => Dynamic::UNIT,
    }
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Absent;
    }
    if let Ok(v) = value.as_float() {
        return Value::Number(v);
    }
    if let Ok(v) = value.as_int() {
        return Value::Number(v as f64);
    }
    if let Ok(v) = value.as_bool() {
        return Value::Bool(v);
    }
    match value.into_string() {
        Ok(s) => Value::Text(s),
        Err(other) => Value::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{PointDefinition, PointId};
    use chrono::Utc;
    use std::time::Duration;

    fn owner() -> Point {
        Point::new(PointId(1), &PointDefinition::new("pwr", "rig", Duration::ZERO))
    }

    fn run(expr: &str, inputs: &[Value]) -> Result<Value> {
        let owner = owner();
        let ctx = AggregateContext {
            owner: &owner,
            timestamp: Utc::now(),
        };
        let inputs: Vec<PointValue> = inputs.iter().cloned().map(PointValue::now).collect();
        ExpressionAggregator::compile(expr)?.calculate(&ctx, &inputs)
    }

    #[test]
    fn test_indexed_variables() {
        let v = run("x0 * x1", &[Value::Number(3.0), Value::Number(4.0)]).unwrap();
        assert_eq!(v, Value::Number(12.0));
    }

    #[test]
    fn test_array_variable() {
        let v = run("x.len()", &[1.0.into(), 2.0.into(), 3.0.into()]).unwrap();
        assert_eq!(v, Value::Number(3.0));
        let v = run("x[2] - x[0]", &[1.0.into(), 2.0.into(), 5.0.into()]).unwrap();
        assert_eq!(v, Value::Number(4.0));
    }

    #[test]
    fn test_text_and_bool_results() {
        assert_eq!(
            run("if x0 > 10.0 { \"HIGH\" } else { \"LOW\" }", &[12.0.into()]).unwrap(),
            Value::from("HIGH")
        );
        assert_eq!(run("x0 && !x1", &[true.into(), false.into()]).unwrap(), Value::Bool(true));
        assert_eq!(run("x0 + \"!\"", &["hi".into()]).unwrap(), Value::from("hi!"));
    }

    #[test]
    fn test_unit_result_is_absent() {
        assert_eq!(run("()", &[1.0.into()]).unwrap(), Value::Absent);
    }

    #[test]
    fn test_compile_error_is_config() {
        let err = ExpressionAggregator::from_args(&owner(), &["x0 +".to_string()])
            .err()
            .unwrap();
        assert!(err.is_config());
        assert!(ExpressionAggregator::from_args(&owner(), &[]).err().unwrap().is_config());
    }

    #[test]
    fn test_runtime_error_is_script() {
        let err = run("x0 / \"a\"", &[1.0.into()]).unwrap_err();
        assert!(err.to_string().contains("Script error"));
    }
}

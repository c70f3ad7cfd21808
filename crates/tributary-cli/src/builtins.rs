//! Transformers available to workflows run from the command line.

use async_trait::async_trait;
use rhi_tributary_adapters::{
    Callable, ConfigError, FnTransformer, Param, Ret, Signature, Sink, TransformError,
    Transformer, Typed, Value, ValueType,
};
use rhi_tributary_core::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A registry holding every built-in transformer.
pub fn registry() -> Result<Registry, ConfigError> {
    let mut registry = Registry::new();
    register_all(&mut registry)?;
    Ok(registry)
}

/// Register every built-in transformer.
pub fn register_all(registry: &mut Registry) -> Result<(), ConfigError> {
    registry.register(
        "inc",
        "Add one to an integer",
        Arc::new(FnTransformer::try_from_fn(|x: i64| {
            x.checked_add(1).ok_or_else(overflow)
        })),
    );
    registry.register(
        "double",
        "Multiply an integer by two",
        Arc::new(FnTransformer::try_from_fn(|x: i64| {
            x.checked_mul(2).ok_or_else(overflow)
        })),
    );
    registry.register(
        "square",
        "Multiply an integer by itself",
        Arc::new(FnTransformer::try_from_fn(|x: i64| {
            x.checked_mul(x).ok_or_else(overflow)
        })),
    );
    registry.register(
        "negate",
        "Negate an integer",
        Arc::new(FnTransformer::try_from_fn(|x: i64| {
            x.checked_neg().ok_or_else(overflow)
        })),
    );
    registry.register(
        "sqrt",
        "Square root of a number; fails on negative input",
        Arc::new(FnTransformer::try_from_fn(|x: f64| {
            if x < 0.0 {
                let msg = format!("square root of negative number {x}");
                return Err(TransformError::failed(msg));
            }
            Ok(x.sqrt())
        })),
    );
    registry.register("to-string", "Render any value as a string", to_string()?);
    registry.register("words", "Split a string into its words", Arc::new(Words));
    registry.register(
        "length",
        "Number of characters in a string",
        Arc::new(FnTransformer::from_fn(|s: String| s.chars().count() as i64)),
    );
    registry.register(
        "upper",
        "Uppercase a string",
        Arc::new(FnTransformer::from_fn(|s: String| s.to_uppercase())),
    );
    registry.register(
        "identity",
        "Pass any value through unchanged",
        Arc::new(FnTransformer::from_fn(|v: Value| v)),
    );
    registry.register("explode", "Emit each element of an array", Arc::new(Explode));
    registry.register(
        "sleep",
        "Wait the input's number of milliseconds, then pass it on",
        Arc::new(FnTransformer::from_async_fn(sleep)),
    );
    Ok(())
}

fn overflow() -> TransformError {
    TransformError::failed("integer overflow")
}

/// Strings pass through as-is; anything else becomes its JSON text.
fn to_string() -> Result<Arc<dyn Transformer>, ConfigError> {
    let signature = Signature::new()
        .param(Param::Value(ValueType::Any))
        .returns(Ret::Value(ValueType::String));
    let callable = Callable::new(signature, |_token, value: Value| async move {
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok::<_, TransformError>(Value::String(text))
    });

    Ok(Arc::new(FnTransformer::from_callable(callable)?))
}

async fn sleep(token: CancellationToken, millis: i64) -> Result<i64, TransformError> {
    let duration = u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| TransformError::failed(format!("cannot sleep for {millis}ms")))?;

    tokio::select! {
        _ = token.cancelled() => Err(TransformError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(millis),
    }
}

/// Emits each whitespace-separated word of its input.
struct Words;

#[async_trait]
impl Transformer for Words {
    fn input_type(&self) -> ValueType {
        ValueType::String
    }

    fn output_type(&self) -> ValueType {
        ValueType::String
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let text = String::from_value(value)
            .map_err(|value| TransformError::invalid_input(ValueType::String, &value))?;
        for word in text.split_whitespace() {
            sink.send(token, Value::from(word))?;
        }
        Ok(())
    }
}

/// Emits each element of its array input.
struct Explode;

#[async_trait]
impl Transformer for Explode {
    fn input_type(&self) -> ValueType {
        ValueType::Array
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let items = Vec::<Value>::from_value(value)
            .map_err(|value| TransformError::invalid_input(ValueType::Array, &value))?;
        for item in items {
            sink.send(token, item)?;
        }
        Ok(())
    }
}

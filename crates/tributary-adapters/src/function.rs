//! Transformers built from single-value functions.
//!
//! A function adapts when it takes one value, optionally preceded by a
//! cancellation token, and returns one value, optionally paired with an
//! error. Calling it with a token but no way to report failure makes no
//! sense, so that shape is rejected.
//!
//! The typed constructors ([`FnTransformer::from_fn`],
//! [`FnTransformer::try_from_fn`], [`FnTransformer::from_async_fn`]) accept
//! exactly those shapes and let the compiler enforce them. Callables
//! assembled at runtime describe themselves with a [`Signature`] and go
//! through [`FnTransformer::from_callable`], which checks the shape.

use crate::error::ConfigError;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use rhi_tributary_core::{Sink, TransformError, Transformer, Typed, Value, ValueType};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a callable's body resolves to.
pub type CallFuture = BoxFuture<'static, Result<Value, TransformError>>;

type Body = Arc<dyn Fn(CancellationToken, Value) -> CallFuture + Send + Sync>;

/// One declared parameter of a callable.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// The cancellation token of the current call.
    Token,
    Value(ValueType),
}

/// One declared result of a callable.
#[derive(Debug, Clone, PartialEq)]
pub enum Ret {
    Value(ValueType),
    Error,
}

/// Declared parameters and results of a callable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: Vec<Ret>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Append a result.
    pub fn returns(mut self, ret: Ret) -> Self {
        self.returns.push(ret);
        self
    }

    /// Check the shape, yielding the declared input and output types.
    fn validate(&self) -> Result<(ValueType, ValueType), ConfigError> {
        let (input, takes_token) = match self.params.as_slice() {
            [Param::Value(ty)] => (ty.clone(), false),
            [Param::Token, Param::Value(ty)] => (ty.clone(), true),
            [Param::Token] => return Err(ConfigError::ExpectedValueParam { position: 0 }),
            [Param::Token, Param::Token] => {
                return Err(ConfigError::ExpectedValueParam { position: 1 });
            }
            [Param::Value(_), _] => return Err(ConfigError::FirstParamNotToken),
            params => return Err(ConfigError::ParamCount(params.len())),
        };

        let output = match self.returns.as_slice() {
            [Ret::Value(_)] if takes_token => return Err(ConfigError::TokenWithoutError),
            [Ret::Value(ty)] | [Ret::Value(ty), Ret::Error] => ty.clone(),
            [Ret::Value(_), Ret::Value(second)] => {
                return Err(ConfigError::SecondReturnNotError(second.clone()));
            }
            [Ret::Error] | [Ret::Error, _] => return Err(ConfigError::ExpectedValueReturn),
            returns => return Err(ConfigError::ReturnCount(returns.len())),
        };

        Ok((input, output))
    }
}

/// A body paired with the signature it claims to have.
///
/// The body always receives the call's token; bodies whose signature does
/// not take one may ignore it.
pub struct Callable {
    pub signature: Signature,
    body: Body,
}

impl Callable {
    pub fn new<F, Fut>(signature: Signature, body: F) -> Self
    where
        F: Fn(CancellationToken, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TransformError>> + Send + 'static,
    {
        Self {
            signature,
            body: Arc::new(move |token, value| body(token, value).boxed()),
        }
    }
}

/// A transformer that calls a function once per input and writes its
/// single result.
///
/// If the function fails, the error is returned and nothing is written.
#[derive(Clone)]
pub struct FnTransformer {
    input_type: ValueType,
    output_type: ValueType,
    body: Body,
}

impl FnTransformer {
    /// Adapt a runtime-described callable, checking its signature.
    pub fn from_callable(callable: Callable) -> Result<Self, ConfigError> {
        let (input_type, output_type) = callable.signature.validate()?;
        Ok(Self {
            input_type,
            output_type,
            body: callable.body,
        })
    }

    /// Adapt an infallible `(T) -> R` function.
    pub fn from_fn<T, R, F>(f: F) -> Self
    where
        T: Typed + 'static,
        R: Typed + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        Self::try_from_fn(move |arg: T| Ok::<R, TransformError>(f(arg)))
    }

    /// Adapt a fallible `(T) -> Result<R, E>` function.
    pub fn try_from_fn<T, R, E, F>(f: F) -> Self
    where
        T: Typed + 'static,
        R: Typed + 'static,
        E: Into<TransformError> + 'static,
        F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
    {
        let body = move |_token: CancellationToken, value: Value| -> CallFuture {
            let result = convert::<T>(value)
                .and_then(|arg| f(arg).map(R::into_value).map_err(Into::into));
            future::ready(result).boxed()
        };
        Self {
            input_type: T::value_type(),
            output_type: R::value_type(),
            body: Arc::new(body),
        }
    }

    /// Adapt an async `(token, T) -> Result<R, E>` function.
    ///
    /// The function is expected to watch the token while it waits.
    pub fn from_async_fn<T, R, E, F, Fut>(f: F) -> Self
    where
        T: Typed + 'static,
        R: Typed + 'static,
        E: Into<TransformError> + 'static,
        F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let body = move |token: CancellationToken, value: Value| -> CallFuture {
            match convert::<T>(value) {
                Ok(arg) => {
                    let call = f(token, arg);
                    async move {
                        let output: Result<Value, TransformError> =
                            call.await.map(R::into_value).map_err(Into::into);
                        output
                    }
                    .boxed()
                }
                Err(err) => future::ready(Err(err)).boxed(),
            }
        };
        Self {
            input_type: T::value_type(),
            output_type: R::value_type(),
            body: Arc::new(body),
        }
    }
}

fn convert<T: Typed>(value: Value) -> Result<T, TransformError> {
    T::from_value(value).map_err(|value| TransformError::invalid_input(T::value_type(), &value))
}

#[async_trait]
impl Transformer for FnTransformer {
    fn input_type(&self) -> ValueType {
        self.input_type.clone()
    }

    fn output_type(&self) -> ValueType {
        self.output_type.clone()
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let output = (self.body)(token.clone(), value).await?;
        sink.send(token, output)
    }
}

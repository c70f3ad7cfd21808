use rhi_tributary_core::ValueType;

/// Errors raised while configuring an adapter.
///
/// These are recoverable: nothing has run yet, and the caller decides what
/// to do with a bad definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("callable takes either (value) or (token, value), got {0} parameters")]
    ParamCount(usize),

    #[error("parameter {position} must be a value, got a token")]
    ExpectedValueParam { position: usize },

    #[error("first of two parameters must be a cancellation token")]
    FirstParamNotToken,

    #[error("callable returns either (value) or (value, error), got {0} results")]
    ReturnCount(usize),

    #[error("first result must be a value, got an error")]
    ExpectedValueReturn,

    #[error("callable takes a token but has no error result")]
    TokenWithoutError,

    #[error("second result must be an error, got {0}")]
    SecondReturnNotError(ValueType),

    #[error("need at least one field name")]
    EmptyNames,

    #[error("type needs to be a record, got {0}")]
    NotRecord(ValueType),

    #[error("no field with name or alias {0:?}")]
    UnknownField(String),

    #[error("field {0:?} selected more than once")]
    DuplicateField(String),

    #[error("name {0:?} found on more than one field")]
    NameClash(String),
}

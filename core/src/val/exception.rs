use std::fmt;
use std::sync::Arc;

/// Built-in exception classes.
///
/// The hierarchy is fixed; `parent` walks one level up and `Exception` is the
/// root. Handlers match with [`ExcType::is_subclass_of`], so catching
/// `ArithmeticError` also catches `ZeroDivisionError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcType {
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    LookupError,
    IndexError,
    KeyError,
    NameError,
    UnboundLocalError,
    TypeError,
    ValueError,
    RuntimeError,
    RecursionError,
    StopIteration,
    AssertionError,
}

impl ExcType {
    pub const ALL: [ExcType; 15] = [
        ExcType::Exception,
        ExcType::ArithmeticError,
        ExcType::ZeroDivisionError,
        ExcType::OverflowError,
        ExcType::LookupError,
        ExcType::IndexError,
        ExcType::KeyError,
        ExcType::NameError,
        ExcType::UnboundLocalError,
        ExcType::TypeError,
        ExcType::ValueError,
        ExcType::RuntimeError,
        ExcType::RecursionError,
        ExcType::StopIteration,
        ExcType::AssertionError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExcType::Exception => "Exception",
            ExcType::ArithmeticError => "ArithmeticError",
            ExcType::ZeroDivisionError => "ZeroDivisionError",
            ExcType::OverflowError => "OverflowError",
            ExcType::LookupError => "LookupError",
            ExcType::IndexError => "IndexError",
            ExcType::KeyError => "KeyError",
            ExcType::NameError => "NameError",
            ExcType::UnboundLocalError => "UnboundLocalError",
            ExcType::TypeError => "TypeError",
            ExcType::ValueError => "ValueError",
            ExcType::RuntimeError => "RuntimeError",
            ExcType::RecursionError => "RecursionError",
            ExcType::StopIteration => "StopIteration",
            ExcType::AssertionError => "AssertionError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn parent(self) -> Option<Self> {
        match self {
            ExcType::Exception => None,
            ExcType::ZeroDivisionError | ExcType::OverflowError => Some(ExcType::ArithmeticError),
            ExcType::IndexError | ExcType::KeyError => Some(ExcType::LookupError),
            ExcType::UnboundLocalError => Some(ExcType::NameError),
            ExcType::RecursionError => Some(ExcType::RuntimeError),
            _ => Some(ExcType::Exception),
        }
    }

    pub fn is_subclass_of(self, other: ExcType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }
}

impl fmt::Display for ExcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A guest exception instance.
///
/// Natives return it through `anyhow::Error`; the VM downcasts it back so the
/// guest sees the original type instead of a generic `RuntimeError`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExcType,
    pub message: Option<Arc<str>>,
    pub cause: Option<Arc<Exception>>,
}

impl Exception {
    pub fn new(kind: ExcType, message: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            cause: None,
        }
    }

    pub fn bare(kind: ExcType) -> Self {
        Self {
            kind,
            message: None,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Arc<Exception>) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn type_error(message: impl Into<Arc<str>>) -> Self {
        Self::new(ExcType::TypeError, message)
    }

    pub fn value_error(message: impl Into<Arc<str>>) -> Self {
        Self::new(ExcType::ValueError, message)
    }

    pub fn zero_division(message: impl Into<Arc<str>>) -> Self {
        Self::new(ExcType::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(ExcType::OverflowError, "integer overflow")
    }

    pub fn index_error(message: impl Into<Arc<str>>) -> Self {
        Self::new(ExcType::IndexError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(ExcType::NameError, format!("name '{name}' is not defined"))
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) if !msg.is_empty() => write!(f, "{}: {}", self.kind, msg),
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Protocol,
    Panic,
    Checksum,
    Load,
    Cancelled,
    Callback,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    symbol: Option<String>,
    code: Option<i8>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            symbol: None,
            code: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn code(&self) -> Option<i8> {
        self.code
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_code(mut self, code: i8) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(symbol) = &self.symbol {
            write!(f, " (symbol: {symbol})")?;
        }
        if let Some(code) = self.code {
            write!(f, " (status code: {code})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Outcome of a boundary call that declares a typed error.
///
/// `Expected` carries the decoded declared error (status code 1); every
/// other failure, including native panics, arrives as `Runtime`.
#[derive(Debug)]
pub enum CallError<E> {
    Expected(E),
    Runtime(Error),
}

impl<E> CallError<E> {
    pub fn expected(self) -> Option<E> {
        match self {
            CallError::Expected(err) => Some(err),
            CallError::Runtime(_) => None,
        }
    }

    pub fn runtime(self) -> Option<Error> {
        match self {
            CallError::Expected(_) => None,
            CallError::Runtime(err) => Some(err),
        }
    }
}

impl<E> From<Error> for CallError<E> {
    fn from(err: Error) -> Self {
        CallError::Runtime(err)
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Expected(err) => write!(f, "{err}"),
            CallError::Runtime(err) => write!(f, "{err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> StdError for CallError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CallError::Expected(_) => None,
            CallError::Runtime(err) => Some(err),
        }
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Protocol => 3,
        ErrorKind::Panic => 4,
        ErrorKind::Checksum => 5,
        ErrorKind::Load => 6,
        ErrorKind::Cancelled => 7,
        ErrorKind::Callback => 8,
        ErrorKind::Io => 9,
    }
}

pub(crate) fn protocol(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Protocol).with_message(message)
}

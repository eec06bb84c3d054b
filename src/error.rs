use std::fmt;

/// Errors surfaced by the platform handler to downstream code.
///
/// Trust failures and unparsable identity headers are not errors:
/// those requests pass through un-enriched instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The forwarded client certificate could not be decoded.
    MalformedCertificate(CertificateError),
    /// No handler in the authentication chain accepted the scheme.
    UnhandledScheme {
        /// The scheme nobody answered for
        scheme: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedCertificate(e) => write!(f, "Malformed forwarded certificate: {}", e),
            Error::UnhandledScheme { scheme } => {
                write!(f, "No authentication handler accepted scheme '{}'", scheme)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MalformedCertificate(e) => Some(e),
            Error::UnhandledScheme { .. } => None,
        }
    }
}

impl From<CertificateError> for Error {
    fn from(e: CertificateError) -> Self {
        Error::MalformedCertificate(e)
    }
}

/// Why a forwarded certificate payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// The header value is not valid base64
    Encoding(String),
    /// The decoded bytes are not a DER X.509 certificate
    Der(String),
    /// A valid certificate followed by unexpected bytes
    TrailingData {
        /// Number of bytes left over after the certificate
        len: usize,
    },
}

impl fmt::Display for CertificateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateError::Encoding(msg) => write!(f, "invalid base64 payload: {}", msg),
            CertificateError::Der(msg) => write!(f, "invalid DER certificate: {}", msg),
            CertificateError::TrailingData { len } => {
                write!(f, "{} trailing bytes after certificate", len)
            }
        }
    }
}

impl std::error::Error for CertificateError {}

/// Failure of an OS token operation.
///
/// Returned by [`TokenSource`](crate::identity::TokenSource)
/// implementations. The platform handler logs these and continues without
/// a Windows identity, so they never reach downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityError {
    /// Which token operation failed
    pub operation: TokenOperation,
    /// OS status code, when one is available
    pub code: Option<i32>,
    /// Human-readable detail
    pub message: String,
}

impl IdentityError {
    /// Creates a new identity error.
    pub fn new(operation: TokenOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: None,
            message: message.into(),
        }
    }

    /// Attaches an OS status code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} failed ({:#x}): {}", self.operation, code, self.message),
            None => write!(f, "{} failed: {}", self.operation, self.message),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Token operations that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOperation {
    /// Duplicating the forwarded handle
    Duplicate,
    /// Resolving the account behind a token
    Account,
}

impl fmt::Display for TokenOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenOperation::Duplicate => write!(f, "duplicate"),
            TokenOperation::Account => write!(f, "account lookup"),
        }
    }
}

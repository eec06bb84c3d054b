//! TLS connection info backed by a certificate the proxy forwarded.

use std::fmt;
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use http::{Extensions, HeaderMap};

use crate::error::{CertificateError, Error};
use crate::headers;

/// A client certificate presented to the proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial: String,
}

impl ClientCertificate {
    /// Parses a DER encoded X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Der`] if the bytes are not a certificate
    /// and [`CertificateError::TrailingData`] if anything follows it.
    pub fn from_der(der: Vec<u8>) -> Result<Self, CertificateError> {
        let (subject, issuer, serial) = {
            let (rest, cert) = x509_parser::parse_x509_certificate(&der)
                .map_err(|e| CertificateError::Der(e.to_string()))?;
            if !rest.is_empty() {
                return Err(CertificateError::TrailingData { len: rest.len() });
            }
            let serial: String = cert
                .tbs_certificate
                .raw_serial()
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect();
            (cert.subject().to_string(), cert.issuer().to_string(), serial)
        };

        Ok(Self {
            der,
            subject,
            issuer,
            serial,
        })
    }

    /// Parses the payload of the forwarded certificate header: base64 of
    /// the DER bytes. ASCII whitespace inside the payload is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Encoding`] for invalid base64, otherwise
    /// whatever [`from_der`](Self::from_der) reports.
    pub fn from_header(value: &str) -> Result<Self, CertificateError> {
        let compact: String = value
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| CertificateError::Encoding(e.to_string()))?;
        Self::from_der(der)
    }

    /// The DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The serial number as uppercase hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial)
            .field("der_len", &self.der.len())
            .finish()
    }
}

/// Access to the TLS details of the connection a request arrived on.
pub trait TlsConnectionFeature: Send + Sync + fmt::Debug {
    /// Returns the client certificate, if the client presented one.
    ///
    /// # Errors
    ///
    /// Implementations that decode certificates lazily report a bad
    /// certificate here.
    fn client_certificate(&self) -> Result<Option<Arc<ClientCertificate>>, Error>;
}

/// The TLS connection info installed on a request.
///
/// # Examples
///
/// ```
/// use http::Request;
/// use platform_handler::TlsConnection;
///
/// let request = Request::new(());
/// assert!(TlsConnection::get(request.extensions()).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct TlsConnection(Arc<dyn TlsConnectionFeature>);

impl TlsConnection {
    /// Wraps a TLS feature implementation.
    pub fn new(feature: Arc<dyn TlsConnectionFeature>) -> Self {
        Self(feature)
    }

    /// Returns the TLS connection info installed on a request.
    pub fn get(extensions: &Extensions) -> Option<Self> {
        extensions.get::<Self>().cloned()
    }

    /// Returns the client certificate.
    ///
    /// # Errors
    ///
    /// See [`TlsConnectionFeature::client_certificate`].
    pub fn client_certificate(&self) -> Result<Option<Arc<ClientCertificate>>, Error> {
        self.0.client_certificate()
    }
}

/// Turns a header payload into a certificate.
pub type CertificateParser = fn(&str) -> Result<ClientCertificate, CertificateError>;

/// TLS connection info for a certificate relayed in a request header.
///
/// The payload is decoded on first access and the outcome cached, so
/// requests that never look at the certificate never pay for parsing it.
pub struct ForwardedTlsConnection {
    header: String,
    parser: CertificateParser,
    certificate: OnceLock<Result<Arc<ClientCertificate>, CertificateError>>,
}

impl ForwardedTlsConnection {
    /// Creates the adapter for a header payload.
    pub fn new(header: impl Into<String>) -> Self {
        Self::with_parser(header, ClientCertificate::from_header)
    }

    /// Creates the adapter with a custom payload parser.
    pub fn with_parser(header: impl Into<String>, parser: CertificateParser) -> Self {
        Self {
            header: header.into(),
            parser,
            certificate: OnceLock::new(),
        }
    }

    /// Returns `true` once the payload has been decoded.
    pub fn is_parsed(&self) -> bool {
        self.certificate.get().is_some()
    }
}

impl TlsConnectionFeature for ForwardedTlsConnection {
    fn client_certificate(&self) -> Result<Option<Arc<ClientCertificate>>, Error> {
        let parsed = self.certificate.get_or_init(|| {
            (self.parser)(&self.header).map(Arc::new).inspect_err(|e| {
                tracing::warn!(error = %e, "failed to read the forwarded client certificate");
            })
        });
        match parsed {
            Ok(cert) => Ok(Some(Arc::clone(cert))),
            Err(e) => Err(Error::MalformedCertificate(e.clone())),
        }
    }
}

impl fmt::Debug for ForwardedTlsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardedTlsConnection")
            .field("header_len", &self.header.len())
            .field("parsed", &self.is_parsed())
            .finish()
    }
}

/// Installs the forwarded certificate as the request's TLS info.
///
/// Does nothing when the header is missing or empty. Returns `true` when
/// an adapter was installed.
pub(crate) fn install_forwarded_certificate(
    headers: &HeaderMap,
    extensions: &mut Extensions,
) -> bool {
    let payload = headers::value_or_empty(headers, &headers::CLIENT_CERTIFICATE);
    if payload.is_empty() {
        return false;
    }
    let replaced = extensions
        .insert(TlsConnection::new(Arc::new(ForwardedTlsConnection::new(
            payload,
        ))))
        .is_some();
    tracing::debug!(replaced, "forwarded client certificate installed");
    true
}

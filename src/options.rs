use serde::Deserialize;

use crate::auth::AuthenticationDescription;

/// Settings for the platform handler.
///
/// Everything defaults to on, which matches a proxy that forwards both
/// client certificates and Windows authentication. Field names bind from
/// camelCase keys.
///
/// # Examples
///
/// ```
/// use platform_handler::PlatformHandlerOptions;
///
/// let options = PlatformHandlerOptions {
///     forward_client_certificate: false,
///     ..PlatformHandlerOptions::default()
/// };
/// assert!(options.forward_windows_authentication);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformHandlerOptions {
    /// Install the forwarded client certificate as the TLS connection info
    pub forward_client_certificate: bool,
    /// Materialize the forwarded Windows token as the request identity
    pub forward_windows_authentication: bool,
    /// Make the Windows identity the request user and answer the automatic scheme
    pub automatic_authentication: bool,
    /// Schemes answered on behalf of the proxy
    pub authentication_descriptions: Vec<AuthenticationDescription>,
}

impl Default for PlatformHandlerOptions {
    fn default() -> Self {
        Self {
            forward_client_certificate: true,
            forward_windows_authentication: true,
            automatic_authentication: true,
            authentication_descriptions: vec![
                AuthenticationDescription::new("NTLM"),
                AuthenticationDescription::new("Negotiate"),
            ],
        }
    }
}

//! Forwarded identity demonstration.
//!
//! Shows what a handler behind the platform proxy sees:
//! 1. A spoofed request without the pairing token is left alone
//! 2. A trusted request carries the client certificate and the Windows user
//! 3. The token is released once the response body is done
//!
//! Run with: `cargo run --example forwarded_identity`

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use http::{HeaderValue, Request, Response, StatusCode};
use platform_handler::identity::{RawToken, TokenAccount, TokenSource};
use platform_handler::{
    current_user, headers, AuthenticationFeature, ChallengeBehavior, IdentityError,
    PlatformHandlerLayer, PlatformHandlerOptions, TlsConnection, TrustGate, AUTOMATIC_SCHEME,
};
use tower::{service_fn, Layer, ServiceExt};

const CLIENT_CERT: &str = "MIIBnzCCAUWgAwIBAgICEjQwCgYIKoZIzj0EAwIwLTEZMBcGA1UEAwwQZm9yd2FyZGVkLWNsaWVudDEQMA4GA1UECgwHQ29udG9zbzAgFw0yNjEwMTYwNzE5NTdaGA8yMTI2MDkyMjA3MTk1N1owLTEZMBcGA1UEAwwQZm9yd2FyZGVkLWNsaWVudDEQMA4GA1UECgwHQ29udG9zbzBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABJDHx71n2u9ZiJyqLV9MSRstNwPRpQdnkkDErvYSoSdMZEZrZtMY3KztHrO//krVjzKV/Dkhesk4rXPEGdvxhz6jUzBRMB0GA1UdDgQWBBRJXrD9tp8PLuTzeb/1xb19msrjcTAfBgNVHSMEGDAWgBRJXrD9tp8PLuTzeb/1xb19msrjcTAPBgNVHRMBAf8EBTADAQH/MAoGCCqGSM49BAMCA0gAMEUCIQCIP3mMnaYwzkhlwG6I+b/Q4BSDS+dpYoHHafEcYycNFgIgVmZWo1M3CUTjgeL1GJBLHxjNHs6sIN1oe66DMmCeQs0=";

/// Pretends to be the OS token table so the demo runs anywhere.
#[derive(Debug, Default)]
struct PretendTokens {
    open: Mutex<Vec<u64>>,
}

impl TokenSource for PretendTokens {
    fn duplicate(&self, raw: RawToken) -> Result<RawToken, IdentityError> {
        let copy = raw.value() | 0x8000;
        self.open.lock().unwrap().push(copy);
        println!("   os: duplicated {raw} -> {}", RawToken::new(copy));
        Ok(RawToken::new(copy))
    }

    fn close(&self, raw: RawToken) {
        self.open.lock().unwrap().retain(|h| *h != raw.value());
        println!("   os: closed {raw}");
    }

    fn account(&self, _token: RawToken) -> Result<TokenAccount, IdentityError> {
        Ok(TokenAccount {
            name: "CONTOSO\\alice".to_string(),
            authentication_type: "Negotiate".to_string(),
        })
    }
}

fn forwarded(pairing: &'static str) -> Request<()> {
    let mut request = Request::new(());
    let map = request.headers_mut();
    map.insert(headers::PAIRING_TOKEN, HeaderValue::from_static(pairing));
    map.insert(headers::CLIENT_CERTIFICATE, HeaderValue::from_static(CLIENT_CERT));
    map.insert(headers::WINDOWS_AUTH_TOKEN, HeaderValue::from_static("2F4"));
    request
}

async fn handle(request: Request<()>) -> Result<Response<String>, Infallible> {
    let user = current_user(request.extensions());
    let name = user
        .identity()
        .and_then(|i| i.name())
        .unwrap_or("(anonymous)");
    println!("   app: user = {name}");

    if let Some(tls) = TlsConnection::get(request.extensions()) {
        match tls.client_certificate() {
            Ok(Some(cert)) => println!("   app: client certificate {}", cert.subject()),
            Ok(None) => println!("   app: no client certificate"),
            Err(e) => println!("   app: bad client certificate: {e}"),
        }
    }

    if let Some(feature) = AuthenticationFeature::get(request.extensions()) {
        let schemes: Vec<_> = feature
            .schemes()
            .into_iter()
            .map(|d| d.authentication_scheme)
            .collect();
        println!("   app: schemes answered by the proxy: {schemes:?}");
        if request.uri().path() == "/admin" {
            // Pretend the user lacks the admin role.
            if let Err(e) = feature.challenge(AUTOMATIC_SCHEME, ChallengeBehavior::Automatic) {
                println!("   app: challenge failed: {e}");
            }
        }
    }

    Ok(Response::new(format!("hello, {name}")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Platform Handler Demo ===");

    let tokens = Arc::new(PretendTokens::default());
    let layer = PlatformHandlerLayer::new(
        TrustGate::new("pairing-secret"),
        PlatformHandlerOptions::default(),
    )
    .with_token_source(tokens.clone());
    let service = layer.layer(service_fn(handle));

    println!("\n1. Spoofed request (wrong pairing token)");
    let response = service.clone().oneshot(forwarded("guess")).await?;
    println!("   status {} body {:?}", response.status(), response.body().get_ref());

    println!("\n2. Request relayed by the proxy");
    let response = service.clone().oneshot(forwarded("pairing-secret")).await?;
    println!("   status {} body {:?}", response.status(), response.body().get_ref());

    println!("\n3. Relayed request for a forbidden page");
    let mut request = forwarded("pairing-secret");
    *request.uri_mut() = "/admin".parse()?;
    let response = service.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    println!("   status {}", response.status());

    println!("\nOpen handles left: {:?}", tokens.open.lock().unwrap());
    Ok(())
}

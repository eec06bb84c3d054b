//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use http::{HeaderValue, Request};
use platform_handler::identity::{RawToken, TokenAccount, TokenSource};
use platform_handler::{headers, IdentityError, TokenOperation};

/// Self-signed P-256 certificate, subject `CN=forwarded-client, O=Contoso`,
/// serial `0x1234`, base64 DER.
pub const CLIENT_CERT: &str = "MIIBnzCCAUWgAwIBAgICEjQwCgYIKoZIzj0EAwIwLTEZMBcGA1UEAwwQZm9yd2FyZGVkLWNsaWVudDEQMA4GA1UECgwHQ29udG9zbzAgFw0yNjEwMTYwNzE5NTdaGA8yMTI2MDkyMjA3MTk1N1owLTEZMBcGA1UEAwwQZm9yd2FyZGVkLWNsaWVudDEQMA4GA1UECgwHQ29udG9zbzBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABJDHx71n2u9ZiJyqLV9MSRstNwPRpQdnkkDErvYSoSdMZEZrZtMY3KztHrO//krVjzKV/Dkhesk4rXPEGdvxhz6jUzBRMB0GA1UdDgQWBBRJXrD9tp8PLuTzeb/1xb19msrjcTAfBgNVHSMEGDAWgBRJXrD9tp8PLuTzeb/1xb19msrjcTAPBgNVHRMBAf8EBTADAQH/MAoGCCqGSM49BAMCA0gAMEUCIQCIP3mMnaYwzkhlwG6I+b/Q4BSDS+dpYoHHafEcYycNFgIgVmZWo1M3CUTjgeL1GJBLHxjNHs6sIN1oe66DMmCeQs0=";

pub const PAIRING: &str = "secret";

/// Duplicates are the original handle plus this offset.
pub const DUPLICATE_OFFSET: u64 = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Duplicated { from: u64, to: u64 },
    Closed(u64),
}

/// Token table that records every call instead of touching the OS.
#[derive(Debug, Default)]
pub struct RecordingTokens {
    log: Mutex<Vec<Event>>,
    fail_duplicate: bool,
}

impl RecordingTokens {
    pub fn shared() -> (Arc<Self>, Arc<dyn TokenSource>) {
        Self::shared_from(Self::default())
    }

    /// A table that refuses every duplication.
    pub fn failing_duplicate() -> Self {
        Self {
            fail_duplicate: true,
            ..Self::default()
        }
    }

    pub fn shared_from(tokens: Self) -> (Arc<Self>, Arc<dyn TokenSource>) {
        let tokens = Arc::new(tokens);
        let source: Arc<dyn TokenSource> = tokens.clone();
        (tokens, source)
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    pub fn closed(&self, raw: u64) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Closed(raw))
            .count()
    }

    pub fn duplicates(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Duplicated { .. }))
            .count()
    }
}

impl TokenSource for RecordingTokens {
    fn duplicate(&self, raw: RawToken) -> Result<RawToken, IdentityError> {
        if self.fail_duplicate {
            return Err(IdentityError::new(TokenOperation::Duplicate, "invalid handle").with_code(6));
        }
        let to = raw.value() + DUPLICATE_OFFSET;
        self.log.lock().unwrap().push(Event::Duplicated {
            from: raw.value(),
            to,
        });
        Ok(RawToken::new(to))
    }

    fn close(&self, raw: RawToken) {
        self.log.lock().unwrap().push(Event::Closed(raw.value()));
    }

    fn account(&self, token: RawToken) -> Result<TokenAccount, IdentityError> {
        Ok(TokenAccount {
            name: format!("CORP\\user{:x}", token.value() - DUPLICATE_OFFSET),
            authentication_type: "Negotiate".to_string(),
        })
    }
}

/// Builds a request carrying the given forwarded headers.
pub fn request(forwarded: &[(&http::HeaderName, &'static str)]) -> Request<()> {
    let mut request = Request::new(());
    for (name, value) in forwarded {
        request
            .headers_mut()
            .append((*name).clone(), HeaderValue::from_static(value));
    }
    request
}

/// A request the proxy would send with the pairing token attached.
pub fn trusted(forwarded: &[(&http::HeaderName, &'static str)]) -> Request<()> {
    let mut request = request(forwarded);
    request
        .headers_mut()
        .insert(headers::PAIRING_TOKEN, HeaderValue::from_static(PAIRING));
    request
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

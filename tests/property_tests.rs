//! Property tests for the trust gate, handle parsing and identity merging.

use http::{HeaderMap, HeaderValue};
use platform_handler::identity::{parse_token_handle, RawToken};
use platform_handler::{headers, Identity, Principal, TrustGate};
use proptest::prelude::*;

fn arb_token() -> impl Strategy<Value = String> {
    prop::string::string_regex("[!-~]{1,40}").unwrap()
}

fn arb_identity() -> impl Strategy<Value = Identity> {
    (
        prop::string::string_regex("[A-Za-z]{1,12}").unwrap(),
        prop_oneof![Just("Negotiate"), Just("NTLM"), Just("Cookies")],
    )
        .prop_map(|(name, kind)| Identity::new(name, kind))
}

fn headers_with(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(headers::PAIRING_TOKEN, HeaderValue::from_str(token).unwrap());
    headers
}

proptest! {
    /// Only the exact configured token is trusted.
    #[test]
    fn gate_trusts_exact_token_only(expected in arb_token(), presented in arb_token()) {
        let gate = TrustGate::new(expected.clone());

        prop_assert!(gate.is_trusted(&headers_with(&expected)));
        prop_assert_eq!(gate.is_trusted(&headers_with(&presented)), presented == expected);
    }

    /// A gate without a token ignores whatever the client sends.
    #[test]
    fn disabled_gate_trusts_nothing(presented in arb_token()) {
        prop_assert!(!TrustGate::disabled().is_trusted(&headers_with(&presented)));
        prop_assert!(!TrustGate::new("").is_trusted(&headers_with(&presented)));
    }

    /// Sending the header twice is never trusted, even with the right token.
    #[test]
    fn repeated_pairing_header_is_rejected(token in arb_token()) {
        let mut headers = headers_with(&token);
        headers.append(headers::PAIRING_TOKEN, HeaderValue::from_str(&token).unwrap());

        prop_assert!(!TrustGate::new(token).is_trusted(&headers));
    }

    /// Any pointer-width value survives hex formatting in either case.
    #[test]
    fn handle_hex_parses_back(value in any::<u64>(), upper in any::<bool>()) {
        let text = if upper { format!("{value:X}") } else { format!("{value:x}") };

        prop_assert_eq!(parse_token_handle(&text), Some(RawToken::new(value)));
    }

    /// Inputs with anything other than hex digits never parse.
    #[test]
    fn non_hex_never_parses(text in "[0-9a-fA-F]{0,6}[g-zG-Z+\\-][0-9a-fA-F]{0,6}") {
        prop_assert_eq!(parse_token_handle(&text), None);
    }

    /// Merging puts the new identities first and keeps every existing one.
    #[test]
    fn merge_keeps_all_identities_in_order(
        existing in prop::collection::vec(arb_identity(), 0..4),
        additional in prop::collection::vec(arb_identity(), 1..3),
    ) {
        let existing_user = Principal::from_identities(existing.clone());
        let merged = Principal::merge(
            Some(&existing_user),
            Principal::from_identities(additional.clone()),
        );

        let expected: Vec<Identity> = additional.into_iter().chain(existing).collect();
        prop_assert_eq!(merged.identities(), expected.as_slice());
    }
}

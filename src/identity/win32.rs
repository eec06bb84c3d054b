//! Win32 token source.

use std::ffi::c_void;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, ERROR_INSUFFICIENT_BUFFER, HANDLE};
use windows::Win32::Security::{
    DuplicateTokenEx, GetTokenInformation, LookupAccountSidW, SecurityImpersonation,
    TokenImpersonation, TokenUser, SID_NAME_USE, TOKEN_ACCESS_MASK, TOKEN_USER,
};

use super::token::{RawToken, TokenAccount, TokenSource};
use crate::error::{IdentityError, TokenOperation};

/// Scheme reported for forwarded Windows logons.
const WINDOWS_AUTHENTICATION_TYPE: &str = "Negotiate";

/// Token source backed by the Win32 security API.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32TokenSource;

/// Account names longer than this are retried with the size Windows reports.
const INITIAL_NAME_CAPACITY: usize = 256;

/// Converts a relayed value to a handle, rejecting values wider than a pointer.
fn handle(raw: RawToken, operation: TokenOperation) -> Result<HANDLE, IdentityError> {
    let value = usize::try_from(raw.value()).map_err(|_| {
        IdentityError::new(operation, format!("handle {} does not fit in a pointer", raw))
    })?;
    Ok(HANDLE(value as *mut c_void))
}

fn identity_error(operation: TokenOperation, e: windows::core::Error) -> IdentityError {
    IdentityError::new(operation, e.to_string()).with_code(e.code().0)
}

impl TokenSource for Win32TokenSource {
    fn duplicate(&self, raw: RawToken) -> Result<RawToken, IdentityError> {
        let existing = handle(raw, TokenOperation::Duplicate)?;
        let mut duplicate = HANDLE::default();
        // SAFETY: `raw` is a token handle the proxy duplicated into this
        // process; `duplicate` is a valid out pointer for the call.
        unsafe {
            DuplicateTokenEx(
                existing,
                TOKEN_ACCESS_MASK(0),
                None,
                SecurityImpersonation,
                TokenImpersonation,
                &mut duplicate,
            )
        }
        .map_err(|e| identity_error(TokenOperation::Duplicate, e))?;

        Ok(RawToken::new(duplicate.0 as usize as u64))
    }

    fn close(&self, raw: RawToken) {
        let Ok(target) = handle(raw, TokenOperation::Duplicate) else {
            tracing::warn!(handle = %raw, "token handle does not fit in a pointer, not closed");
            return;
        };
        // SAFETY: callers close each handle they own exactly once.
        if let Err(e) = unsafe { CloseHandle(target) } {
            tracing::warn!(handle = %raw, error = %e, "failed to close token handle");
        }
    }

    fn account(&self, token: RawToken) -> Result<TokenAccount, IdentityError> {
        let token = handle(token, TokenOperation::Account)?;

        let mut needed = 0u32;
        // SAFETY: a null buffer with zero length only queries the size.
        let size_query = unsafe { GetTokenInformation(token, TokenUser, None, 0, &mut needed) };
        if let Err(e) = size_query {
            if e.code() != ERROR_INSUFFICIENT_BUFFER.to_hresult() {
                return Err(identity_error(TokenOperation::Account, e));
            }
        }

        // u64 storage keeps TOKEN_USER suitably aligned.
        let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
        // SAFETY: `buffer` holds at least `needed` writable bytes.
        unsafe {
            GetTokenInformation(
                token,
                TokenUser,
                Some(buffer.as_mut_ptr().cast::<c_void>()),
                needed,
                &mut needed,
            )
        }
        .map_err(|e| identity_error(TokenOperation::Account, e))?;

        // SAFETY: GetTokenInformation(TokenUser) filled the buffer with a TOKEN_USER.
        let sid = unsafe { (*buffer.as_ptr().cast::<TOKEN_USER>()).User.Sid };

        let mut name = vec![0u16; INITIAL_NAME_CAPACITY];
        let mut domain = vec![0u16; INITIAL_NAME_CAPACITY];
        let mut retried = false;
        let (name_len, domain_len) = loop {
            let mut name_len = name.len() as u32;
            let mut domain_len = domain.len() as u32;
            let mut sid_use = SID_NAME_USE::default();
            // SAFETY: both buffers are valid for the lengths passed; `sid`
            // points into `buffer`, which outlives the call.
            let looked_up = unsafe {
                LookupAccountSidW(
                    PCWSTR::null(),
                    sid,
                    Some(PWSTR(name.as_mut_ptr())),
                    &mut name_len,
                    Some(PWSTR(domain.as_mut_ptr())),
                    &mut domain_len,
                    &mut sid_use,
                )
            };
            match looked_up {
                Ok(()) => break (name_len as usize, domain_len as usize),
                // On this error the lengths hold the required sizes, terminator included.
                Err(e) if !retried && e.code() == ERROR_INSUFFICIENT_BUFFER.to_hresult() => {
                    retried = true;
                    name.resize((name_len as usize).max(name.len()), 0);
                    domain.resize((domain_len as usize).max(domain.len()), 0);
                }
                Err(e) => return Err(identity_error(TokenOperation::Account, e)),
            }
        };

        let name = String::from_utf16_lossy(&name[..name_len]);
        let domain = String::from_utf16_lossy(&domain[..domain_len]);
        let name = if domain.is_empty() {
            name
        } else {
            format!("{}\\{}", domain, name)
        };

        Ok(TokenAccount {
            name,
            authentication_type: WINDOWS_AUTHENTICATION_TYPE.to_string(),
        })
    }
}

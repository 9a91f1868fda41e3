//! Process exit codes for `appstore-verify`.
//! Scripts branch on these, so they are part of the public contract.

pub const SUCCESS: i32 = 0;
pub const MALFORMED_INPUT: i32 = 1; // Token is not a well-formed signed envelope
pub const CONFIG_ERROR: i32 = 2; // Bad arguments, unreadable files, invalid roots
pub const UNTRUSTED: i32 = 3; // Chain or signature rejected
pub const WRONG_CONTEXT: i32 = 4; // Signed for another app or environment
pub const RETRYABLE: i32 = 5; // OCSP responder unavailable

//! Status code retryability table.
//!
//! Codes outside both lists are left to the caller's fallback.

use http::StatusCode;

/// Codes worth retrying. 524 is Cloudflare's "origin timed out": the edge reached the origin but
/// got no response in time.
const RETRYABLE: [u16; 6] = [503, 429, 502, 504, 408, 524];

/// Codes that will not change on retry.
const NON_RETRYABLE: [u16; 26] = [
    400, 401, 403, 404, 405, 406, 407, 409, 411, 412, 413, 414, 415, 416, 417, 418, 421, 422, 428,
    431, 451, 501, 505, 508, 510, 511,
];

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE.contains(&status.as_u16())
}

pub fn is_non_retryable_status(status: StatusCode) -> bool {
    NON_RETRYABLE.contains(&status.as_u16())
}

/// Table verdict, or `None` for codes the table does not list.
pub fn status_verdict(status: StatusCode) -> Option<bool> {
    if is_retryable_status(status) {
        Some(true)
    } else if is_non_retryable_status(status) {
        Some(false)
    } else {
        None
    }
}

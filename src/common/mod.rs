//! Shared utilities

pub mod cancellation;

pub use cancellation::{
    AtomicCancellationToken, CallContext, CancellationHandle, CancellationToken, NeverCancelToken,
    TokioCancellationHandle, TokioCancellationToken,
};

/// Format a number with thousands separators
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

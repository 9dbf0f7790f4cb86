//! Page fingerprints for content-diff based detection.
//!
//! A fingerprint is a small histogram of word lengths in the response body,
//! tagged with the status code. Two fingerprints are "the same page" when the
//! status codes match and the histograms are within a relative tolerance. This
//! is coarse on purpose: dynamic tokens such as timestamps or CSRF values shift
//! a few counts but leave the overall shape alone.

use crate::http::Response;
use serde::{Deserialize, Serialize};

const FP_SIZE: usize = 10;
const FP_MAX_LEN: usize = 15;
/// Per-bucket relative tolerance, in percent.
const FP_T_REL: u32 = 5;
/// Whole-histogram tolerance, in percent.
const FP_T_ABS: u32 = 6;
/// Maximum number of buckets allowed to exceed `FP_T_REL`.
const FP_B_FAIL: u32 = 3;

/// Comparable digest of a page response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageFingerprint {
    status: u16,
    buckets: [u32; FP_SIZE],
}

impl PageFingerprint {
    /// Computes a fingerprint from a status code and a raw body.
    pub fn compute(status: u16, body: &[u8]) -> Self {
        let mut buckets = [0u32; FP_SIZE];
        let mut word_len = 0usize;

        for &byte in body.iter().chain(std::iter::once(&b' ')) {
            if byte.is_ascii_whitespace() || byte == b'<' || byte == b'>' {
                if word_len > 0 && word_len <= FP_MAX_LEN {
                    buckets[word_len % FP_SIZE] += 1;
                }
                word_len = 0;
            } else {
                word_len += 1;
            }
        }

        PageFingerprint { status, buckets }
    }

    pub fn from_response(response: &Response) -> Self {
        Self::compute(response.status, &response.body)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true when both fingerprints describe the same page.
    pub fn is_same(&self, other: &PageFingerprint) -> bool {
        if self.status != other.status {
            return false;
        }

        let mut bucket_fail = 0u32;
        let mut total_diff: i64 = 0;
        let mut total_scale: u64 = 0;

        for (a, b) in self.buckets.iter().zip(other.buckets.iter()) {
            let diff = i64::from(*a) - i64::from(*b);
            let scale = u64::from(*a) + u64::from(*b);

            if diff.unsigned_abs() > 1 + scale * u64::from(FP_T_REL) / 100 {
                bucket_fail += 1;
                if bucket_fail > FP_B_FAIL {
                    return false;
                }
            }

            total_diff += diff;
            total_scale += scale;
        }

        total_diff.unsigned_abs() <= 1 + total_scale * u64::from(FP_T_ABS) / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_bodies_match() {
        let a = PageFingerprint::compute(200, b"<html><body>Welcome back, user</body></html>");
        let b = PageFingerprint::compute(200, b"<html><body>Welcome back, user</body></html>");
        assert!(a.is_same(&b));
    }

    #[test]
    fn test_status_mismatch_never_matches() {
        let a = PageFingerprint::compute(200, b"same body");
        let b = PageFingerprint::compute(500, b"same body");
        assert!(!a.is_same(&b));
    }

    #[test]
    fn test_small_dynamic_change_tolerated() {
        let base = "lorem ipsum dolor sit amet consectetur adipiscing elit ".repeat(20);
        let a = PageFingerprint::compute(200, format!("{base} token 1699999999").as_bytes());
        let b = PageFingerprint::compute(200, format!("{base} token 1700000000").as_bytes());
        assert!(a.is_same(&b));
    }

    #[test]
    fn test_different_pages_do_not_match() {
        let a = PageFingerprint::compute(200, "a bb ccc dddd ".repeat(30).as_bytes());
        let b = PageFingerprint::compute(200, "eeeee ffffff ggggggg hhhhhhhh ".repeat(30).as_bytes());
        assert!(!a.is_same(&b));
        assert!(!b.is_same(&a));
    }

    #[test]
    fn test_comparison_is_symmetric() {
        let a = PageFingerprint::compute(200, "one two three ".repeat(10).as_bytes());
        let b = PageFingerprint::compute(200, "one two three four ".repeat(10).as_bytes());
        assert_eq!(a.is_same(&b), b.is_same(&a));
    }
}

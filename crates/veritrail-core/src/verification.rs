//! Verification outcomes.
//!
//! [`Verdict`] is a tagged variant so that impossible combinations, such as
//! a tampered result without a stored hash, cannot be constructed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::Sha256Digest;
use crate::types::ArtifactId;

/// Wire-level status of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Authentic,
    Tampered,
    NoBaseline,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Authentic => "authentic",
            VerificationStatus::Tampered => "tampered",
            VerificationStatus::NoBaseline => "no_baseline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authentic" => Some(VerificationStatus::Authentic),
            "tampered" => Some(VerificationStatus::Tampered),
            "no_baseline" => Some(VerificationStatus::NoBaseline),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing presented content against a stored baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// Presented content matches the baseline.
    Authentic { hash: Sha256Digest },
    /// Presented content differs from the baseline.
    Tampered {
        current: Sha256Digest,
        stored: Sha256Digest,
    },
    /// No baseline is known for the reference.
    NoBaseline { current: Sha256Digest },
}

impl Verdict {
    /// Classify `current` against an optional stored hash.
    pub fn classify(current: Sha256Digest, stored: Option<Sha256Digest>) -> Self {
        match stored {
            None => Verdict::NoBaseline { current },
            Some(stored) if stored == current => Verdict::Authentic { hash: current },
            Some(stored) => Verdict::Tampered { current, stored },
        }
    }

    /// Rebuild a verdict from its flattened storage form.
    ///
    /// Returns `None` for combinations no verdict can produce.
    pub fn from_parts(
        status: VerificationStatus,
        current: Sha256Digest,
        stored: Option<Sha256Digest>,
    ) -> Option<Self> {
        match (status, stored) {
            (VerificationStatus::Authentic, Some(s)) if s == current => {
                Some(Verdict::Authentic { hash: current })
            }
            (VerificationStatus::Tampered, Some(s)) if s != current => {
                Some(Verdict::Tampered { current, stored: s })
            }
            (VerificationStatus::NoBaseline, None) => Some(Verdict::NoBaseline { current }),
            _ => None,
        }
    }

    pub fn status(&self) -> VerificationStatus {
        match self {
            Verdict::Authentic { .. } => VerificationStatus::Authentic,
            Verdict::Tampered { .. } => VerificationStatus::Tampered,
            Verdict::NoBaseline { .. } => VerificationStatus::NoBaseline,
        }
    }

    /// Hash of the presented content.
    pub fn current_hash(&self) -> Sha256Digest {
        match self {
            Verdict::Authentic { hash } => *hash,
            Verdict::Tampered { current, .. } | Verdict::NoBaseline { current } => *current,
        }
    }

    /// Hash of the baseline, when one exists.
    pub fn stored_hash(&self) -> Option<Sha256Digest> {
        match self {
            Verdict::Authentic { hash } => Some(*hash),
            Verdict::Tampered { stored, .. } => Some(*stored),
            Verdict::NoBaseline { .. } => None,
        }
    }

    pub fn is_authentic(&self) -> bool {
        matches!(self, Verdict::Authentic { .. })
    }
}

/// A completed verification, as returned to callers and kept in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub reference_id: String,
    /// The artifact holding the baseline, when one was found.
    pub artifact_id: Option<ArtifactId>,
    pub verdict: Verdict,
    /// When the baseline was recorded (Unix ms).
    pub baseline_timestamp: Option<i64>,
    /// When the verification ran (Unix ms).
    pub verified_at: i64,
}

impl VerificationResult {
    pub fn status(&self) -> VerificationStatus {
        self.verdict.status()
    }

    pub fn current_hash(&self) -> Sha256Digest {
        self.verdict.current_hash()
    }

    pub fn stored_hash(&self) -> Option<Sha256Digest> {
        self.verdict.stored_hash()
    }
}

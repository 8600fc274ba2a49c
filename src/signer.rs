//! Envelope signer
//!
//! Signature = lowercase hex SHA-256 of `secret + "." + canonical_json`.
//!
//! # Trust model
//!
//! The secret is generated and stored on the same device that builds the
//! payload. The signature is therefore tamper evidence for items sitting
//! in the local queue (corruption, bugs) and an integrity tag the backend
//! may log. It is NOT proof of authenticity against anyone who controls
//! the client. Server-side authentication rides on the ingest key and
//! bearer token.

use crate::contracts::{EventEnvelope, SIGNATURE_ALG};
use sha2::{Digest, Sha256};

/// Keyed digest over envelopes
#[derive(Clone)]
pub struct EnvelopeSigner {
    secret: String,
}

impl EnvelopeSigner {
    /// Create a signer from the install secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Compute the signature for an envelope's canonical form
    pub fn sign(&self, envelope: &EventEnvelope) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b".");
        hasher.update(envelope.canonical_json().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Attach signature and algorithm tag
    pub fn seal(&self, mut envelope: EventEnvelope) -> EventEnvelope {
        envelope.signature = self.sign(&envelope);
        envelope.signature_alg = SIGNATURE_ALG.to_string();
        envelope
    }

    /// Check an envelope against its stored signature
    pub fn verify(&self, envelope: &EventEnvelope) -> bool {
        envelope.signature_alg == SIGNATURE_ALG && envelope.signature == self.sign(envelope)
    }
}

impl std::fmt::Debug for EnvelopeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

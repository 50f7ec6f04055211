//! CRL-specific error types.

/// Result of checking certificates against a CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    /// None of the checked certificates is listed.
    Valid,
    /// A checked certificate is listed.
    ///
    /// Reason codes are not consulted: a listed certificate is revoked whatever the reason.
    Revoked {
        /// Serial number of the revoked certificate, upper-case hex.
        serial: String,
    },
}

/// Errors that can occur during CRL operations.
#[derive(Debug, thiserror::Error)]
pub enum CrlError {
    #[error("failed to fetch CRL from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to parse CRL: {0}")]
    Parse(#[from] der::Error),

    #[error("CRL signature verification failed")]
    SignatureInvalid,

    #[error("CRL issuer does not match the signing certificate")]
    IssuerMismatch,

    #[error("CRL has expired (nextUpdate: {next_update})")]
    Expired { next_update: String },

    #[error("CRL is not yet valid (thisUpdate: {this_update})")]
    NotYetValid { this_update: String },

    #[error("CRL contains unrecognized critical extension: {oid}")]
    UnrecognizedCriticalExtension { oid: String },

    #[error("no CRL distribution point in certificate")]
    NoDistributionPoint,

    #[error("CRL unavailable: {}", errors.join("; "))]
    AllUrlsFailed { errors: Vec<String> },
}

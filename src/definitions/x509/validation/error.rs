use std::fmt;

/// A finding of certificate trust validation.
///
/// Structural, temporal, revocation and chain findings reject the chain. Policy findings are
/// reported without rejecting it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error("{0}")]
    CertificateStructuralError(String),
    #[error("{0}")]
    CertificateExpired(String),
    #[error("certificate with serial {serial} is revoked")]
    CertificateRevoked { serial: String },
    #[error("{0}")]
    ChainNotTrusted(String),
    #[error("{0}")]
    PolicyViolation(String),
}

impl TrustError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TrustError::PolicyViolation(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorWithContext<E> {
    context: ErrorContext,
    error: E,
}

impl<E: fmt::Display> ErrorWithContext<E> {
    pub fn end_entity(error: E) -> String {
        Self {
            context: ErrorContext::EndEntity,
            error,
        }
        .to_string()
    }

    pub fn intermediate(error: E) -> String {
        Self {
            context: ErrorContext::Intermediate,
            error,
        }
        .to_string()
    }

    pub fn root(error: E) -> String {
        Self {
            context: ErrorContext::Root,
            error,
        }
        .to_string()
    }

    pub fn chain(error: E) -> String {
        Self {
            context: ErrorContext::Chain,
            error,
        }
        .to_string()
    }

    pub fn revocation(error: E) -> String {
        Self {
            context: ErrorContext::Revocation,
            error,
        }
        .to_string()
    }
}

impl<E: fmt::Display> fmt::Display for ErrorWithContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error: {}",
            match self.context {
                ErrorContext::EndEntity => "End-entity certificate",
                ErrorContext::Intermediate => "Intermediate certificate",
                ErrorContext::Root => "Root certificate",
                ErrorContext::Chain => "Certificate chain",
                ErrorContext::Revocation => "Revocation check",
            },
            self.error,
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum ErrorContext {
    EndEntity,
    Intermediate,
    Root,
    Chain,
    Revocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let message = ErrorWithContext::root(TrustError::CertificateRevoked {
            serial: "0A".into(),
        });
        assert_eq!(
            message,
            "Root certificate error: certificate with serial 0A is revoked"
        );
        assert!(!TrustError::PolicyViolation(String::new()).is_fatal());
    }
}

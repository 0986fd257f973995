//! Tagged error chain with operation trace and HTTP-status mapping.
//!
//! Mirrors the "errors as values" approach: a [`Kind`] classifies what went
//! wrong, an `Op` (a `&'static str`, the producing function) records where,
//! and an optional boxed cause threads the chain. Kinds never repeat in a
//! rendered chain; see [`Error::new`] for the demotion rule.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Unclassified error; also the demoted marker in chained errors.
    Other,
    /// Malformed input.
    Invalid,
    /// Engine/transport I/O failure.
    Io,
    /// Internal inconsistency or an engine error with no better classification.
    Internal,
    /// Evaluation exceeded its deadline.
    EvalTimeout,
    /// Requested language is not in the Config Registry.
    LanguageNotFound,
}

impl Kind {
    /// Fixed kind-to-HTTP-status mapping (§4.2).
    pub fn http_status(self) -> StatusCode {
        match self {
            Kind::Invalid => StatusCode::BAD_REQUEST,
            Kind::LanguageNotFound => StatusCode::NOT_FOUND,
            Kind::Io | Kind::Internal | Kind::Other => StatusCode::INTERNAL_SERVER_ERROR,
            // 513 has no named constant in the http crate; evaluation timeout is
            // rendered with a raw status code to match the source's contract.
            Kind::EvalTimeout => StatusCode::from_u16(513).unwrap(),
        }
    }

    fn message(self) -> &'static str {
        match self {
            Kind::Other => "unclassified error",
            Kind::Invalid => "invalid request",
            Kind::Io => "I/O error",
            Kind::Internal => "internal error",
            Kind::EvalTimeout => "evaluation timed out",
            Kind::LanguageNotFound => "language not found",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The function or method that produced this link in the chain.
pub type Op = &'static str;

/// A tagged error carrying an operation label, a kind, and an optional cause.
#[derive(Debug)]
pub struct Error {
    op: Option<Op>,
    kind: Kind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Build a leaf error: an operation label, a kind, and a message.
    pub fn new(op: Op, kind: Kind, msg: impl Into<String>) -> Self {
        Error {
            op: Some(op),
            kind,
            source: Some(Box::new(Leaf(msg.into()))),
        }
    }

    /// Wrap a lower-level error, attaching an operation label and (optionally)
    /// reclassifying it.
    ///
    /// Kinds never duplicate in a chain: if the outer kind equals the wrapped
    /// error's kind, the wrapped kind is demoted to [`Kind::Other`]. If the
    /// outer kind is [`Kind::Other`] (i.e. the caller didn't reclassify), the
    /// inner kind is promoted outward instead, preserving the most specific
    /// classification at the top of the chain.
    pub fn wrap(op: Op, kind: Kind, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        let mut outer_kind = kind;
        let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = Box::new(err);

        let source = if let Some(inner) = boxed.downcast_ref::<Error>() {
            // Re-box via a fresh Error so we can adjust its kind in place.
            let mut inner_kind = inner.kind;
            if inner_kind == outer_kind {
                inner_kind = Kind::Other;
            }
            if outer_kind == Kind::Other && inner_kind != Kind::Other {
                outer_kind = inner_kind;
                inner_kind = Kind::Other;
            }
            let rewritten = Error {
                op: inner.op,
                kind: inner_kind,
                source: clone_source(&inner.source),
            };
            Some(Box::new(rewritten) as Box<dyn std::error::Error + Send + Sync + 'static>)
        } else {
            Some(boxed)
        };

        Error {
            op: Some(op),
            kind: outer_kind,
            source,
        }
    }

    /// The kind driving the HTTP status of this (the outermost) link.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// `true` if this chain contains an [`Kind::EvalTimeout`] at the top.
    pub fn is_timeout(&self) -> bool {
        self.kind == Kind::EvalTimeout
    }
}

/// downcast_ref-free clone used when rewriting a chained [`Error`]'s kind.
///
/// The inner error is consumed into a fresh string-backed leaf since we can't
/// clone a boxed trait object generically; the operation/kind trail is what
/// matters for rendering and HTTP mapping, not object identity.
fn clone_source(
    source: &Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> Option<Box<dyn std::error::Error + Send + Sync + 'static>> {
    source
        .as_ref()
        .map(|e| Box::new(Leaf(e.to_string())) as Box<dyn std::error::Error + Send + Sync + 'static>)
}

#[derive(Debug)]
struct Leaf(String);

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Leaf {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(op) = self.op {
            f.write_str(op)?;
            wrote = true;
        }
        if self.kind != Kind::Other {
            if wrote {
                f.write_str(": ")?;
            }
            write!(f, "{}", self.kind)?;
            wrote = true;
        }
        if let Some(source) = &self.source {
            if wrote {
                f.write_str(": ")?;
            }
            write!(f, "{}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(e: bollard::errors::Error) -> Self {
        Error::wrap("engine", Kind::Io, e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.kind().http_status();
        let message = self.kind().message();
        let body = Json(json!({ "message": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_http_status_round_trips_for_every_variant() {
        let kinds = [
            Kind::Other,
            Kind::Invalid,
            Kind::Io,
            Kind::Internal,
            Kind::EvalTimeout,
            Kind::LanguageNotFound,
        ];
        for kind in kinds {
            let status = kind.http_status();
            let expected = match kind {
                Kind::Invalid => 400,
                Kind::LanguageNotFound => 404,
                Kind::Io | Kind::Internal | Kind::Other => 500,
                Kind::EvalTimeout => 513,
            };
            assert_eq!(status.as_u16(), expected);
        }
    }

    #[test]
    fn wrapping_with_same_kind_demotes_inner_to_other() {
        let inner = Error::new("docker.exec", Kind::Internal, "exec create failed");
        let outer = Error::wrap("eval.run", Kind::Internal, inner);
        assert_eq!(outer.kind(), Kind::Internal);
        // The rendered chain should mention "internal error" exactly once.
        let rendered = outer.to_string();
        assert_eq!(rendered.matches("internal error").count(), 1);
    }

    #[test]
    fn wrapping_other_promotes_inner_kind_outward() {
        let inner = Error::new("pool.select", Kind::LanguageNotFound, "no such language");
        let outer = Error::wrap("http.eval", Kind::Other, inner);
        assert_eq!(outer.kind(), Kind::LanguageNotFound);
    }

    #[test]
    fn is_timeout_only_true_for_eval_timeout() {
        let e = Error::new("eval.run", Kind::EvalTimeout, "deadline exceeded");
        assert!(e.is_timeout());
        let e2 = Error::new("eval.run", Kind::Internal, "boom");
        assert!(!e2.is_timeout());
    }
}

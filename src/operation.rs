//! The single-URL rendering contract consumed by the runner
//!
//! The remote protocol (endpoints, authentication, payload decoding) lives behind
//! [`RenderingOperation`]. Implementations classify their own failures through
//! [`ErrorRecord::retriable`]; per-call timeouts are their concern too.

use async_trait::async_trait;
use std::future::Future;

use crate::error::ErrorRecord;
use crate::types::{Artifact, OperationParams};

/// One network round trip to the remote rendering service
#[async_trait]
pub trait RenderingOperation: Send + Sync {
    /// Render `url` with `params`
    async fn render(&self, url: &str, params: &OperationParams) -> Result<Artifact, ErrorRecord>;
}

/// Adapter turning an async closure into a [`RenderingOperation`]
///
/// ```no_run
/// use render_batch::{Artifact, ErrorRecord, FnOperation, OperationKind, OperationParams};
///
/// let op = FnOperation::new(|url: String, _params: OperationParams| async move {
///     Ok::<_, ErrorRecord>(Artifact::Text {
///         kind: OperationKind::Markdown,
///         text: format!("# {url}"),
///     })
/// });
/// ```
pub struct FnOperation<F> {
    func: F,
}

impl<F> FnOperation<F> {
    /// Wrap `func`
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> RenderingOperation for FnOperation<F>
where
    F: Fn(String, OperationParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Artifact, ErrorRecord>> + Send,
{
    async fn render(&self, url: &str, params: &OperationParams) -> Result<Artifact, ErrorRecord> {
        (self.func)(url.to_string(), params.clone()).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationKind;

    #[tokio::test]
    async fn fn_operation_forwards_url_and_params() {
        let op = FnOperation::new(|url: String, params: OperationParams| async move {
            Ok::<_, ErrorRecord>(Artifact::Text {
                kind: params.kind,
                text: url,
            })
        });

        let artifact = op
            .render(
                "https://example.com",
                &OperationParams::new(OperationKind::Content),
            )
            .await
            .unwrap();

        assert_eq!(
            artifact,
            Artifact::Text {
                kind: OperationKind::Content,
                text: "https://example.com".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn fn_operation_propagates_errors() {
        let op = FnOperation::new(|_url: String, _params: OperationParams| async move {
            Err::<Artifact, _>(ErrorRecord::from_status(401, "bad token"))
        });

        let err = op
            .render("https://example.com", &OperationParams::default())
            .await
            .unwrap_err();

        assert!(!err.retriable);
    }
}

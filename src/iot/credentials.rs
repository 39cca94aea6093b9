use std::sync::Arc;
use tokio::sync::RwLock;

use super::protocol::TokenGrant;

/// Current vendor access token, shared between the request path and the
/// background refresh task.
#[derive(Clone, Default)]
pub struct IotCredentialState {
    inner: Arc<RwLock<Option<TokenGrant>>>,
}

impl IotCredentialState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<TokenGrant> {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, grant: TokenGrant) {
        *self.inner.write().await = Some(grant);
    }
}

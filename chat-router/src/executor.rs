use crate::backend::BackendError;
use crate::metrics_defs::{EXECUTOR_EXHAUSTED, NODE_FAILURES};
use crate::nodes::{Node, NodeDescriptor, NodeRegistry};
use shared::counter;
use std::future::Future;

/// A successful result together with the node that produced it.
#[derive(Debug)]
pub struct Executed<T> {
    pub result: T,
    pub node: NodeDescriptor,
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("no backend nodes available")]
    NoNodesAvailable,

    #[error("all {attempts} backend nodes failed")]
    AllNodesFailed {
        attempts: usize,
        #[source]
        source: BackendError,
    },
}

/// Runs an action against the nodes of a registry in priority order until
/// one succeeds.
///
/// Attempts are strictly sequential, without backoff: a session-creating
/// action raced against several nodes could leave divergent sessions behind.
#[derive(Clone)]
pub struct Executor {
    registry: NodeRegistry,
}

impl Executor {
    pub fn new(registry: NodeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub async fn execute<T, F, Fut>(&self, mut action: F) -> Result<Executed<T>, ExecutorError>
    where
        F: FnMut(Node) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut last_error = None;

        for node in self.registry.iter() {
            match action(node.clone()).await {
                Ok(result) => {
                    return Ok(Executed {
                        result,
                        node: node.descriptor().clone(),
                    });
                }
                Err(e) => {
                    counter!(NODE_FAILURES).increment(1);
                    tracing::warn!(
                        api_base = %node.descriptor().api_base,
                        priority = node.descriptor().priority,
                        error = %e,
                        "Backend node failed, trying the next node"
                    );
                    last_error = Some(e);
                }
            }
        }

        counter!(EXECUTOR_EXHAUSTED).increment(1);
        match last_error {
            Some(source) => {
                tracing::error!(
                    attempts = self.registry.len(),
                    "All backend nodes failed"
                );
                Err(ExecutorError::AllNodesFailed {
                    attempts: self.registry.len(),
                    source,
                })
            }
            None => Err(ExecutorError::NoNodesAvailable),
        }
    }
}

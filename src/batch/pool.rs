//! Resource Pool Module
//!
//! Buffers saved resources until the next scheduled tick commits them as a
//! micro-batch.

use crate::Resource;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Pool of resources waiting to be micro-batched
///
/// FIFO queue behind a read-write lock; producers push, the orchestrator
/// drains.
#[derive(Default)]
pub struct ResourcePool {
    resources: RwLock<VecDeque<Resource>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource to the back of the queue
    pub async fn add(&self, resource: Resource) {
        let mut resources = self.resources.write().await;
        resources.push_back(resource);
    }

    /// Remove and return up to `max` resources from the front
    pub async fn drain(&self, max: usize) -> Vec<Resource> {
        let mut resources = self.resources.write().await;
        let len = resources.len();
        resources.drain(..max.min(len)).collect()
    }

    /// Put resources back at the front, preserving their order
    ///
    /// Used when committing a drained set failed, so it is tried again.
    pub async fn requeue(&self, drained: Vec<Resource>) {
        let mut resources = self.resources.write().await;
        for resource in drained.into_iter().rev() {
            resources.push_front(resource);
        }
    }

    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_is_fifo_and_bounded() {
        let pool = ResourcePool::new();
        for (i, link) in ["a", "b", "c"].iter().enumerate() {
            pool.add(Resource::new(i as i64, *link)).await;
        }

        let first: Vec<String> = pool.drain(2).await.into_iter().map(|r| r.link).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(pool.len().await, 1);
        assert_eq!(pool.drain(10).await.len(), 1);
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_requeue_restores_front() {
        let pool = ResourcePool::new();
        pool.add(Resource::new(0, "a")).await;
        pool.add(Resource::new(1, "b")).await;
        pool.add(Resource::new(2, "c")).await;

        let drained = pool.drain(2).await;
        pool.requeue(drained).await;

        let links: Vec<String> = pool.drain(3).await.into_iter().map(|r| r.link).collect();
        assert_eq!(links, vec!["a", "b", "c"]);
    }
}

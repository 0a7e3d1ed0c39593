//! Ready-made capabilities built from iterators and closures

use anyhow::Result;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use super::stage::{Sink, SinkFlow, Source, Transform};

/// Source that yields the items of an iterator
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

#[async_trait]
impl<I> Source for IterSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    async fn next_item(&mut self) -> Result<Option<I::Item>> {
        Ok(self.iter.next())
    }
}

/// Transform that applies a closure to every item
pub struct FnTransform<F, A, B> {
    f: F,
    _types: PhantomData<fn(A) -> B>,
}

impl<F, A, B> FnTransform<F, A, B>
where
    F: FnMut(A) -> Result<B> + Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<F, A, B> Transform for FnTransform<F, A, B>
where
    F: FnMut(A) -> Result<B> + Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
{
    type Input = A;
    type Output = B;

    async fn apply(&mut self, item: A) -> Result<B> {
        (self.f)(item)
    }
}

/// Sink that keeps every item it receives
///
/// Clones share the same storage, so a handle kept outside the pipeline sees
/// what the sink collected.
pub struct CollectSink<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T: Send + 'static> CollectSink<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Copy of the items collected so far
    pub fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Sink for CollectSink<T> {
    type Input = T;

    async fn consume(&mut self, item: T) -> Result<SinkFlow> {
        self.items
            .lock()
            .map_err(|_| anyhow::anyhow!("collected items are poisoned"))?
            .push(item);
        Ok(SinkFlow::Continue)
    }
}

// src/transform.rs
//
//! Injected conversion capabilities bridging backend-native
//! representations to consumer-facing ones.
//!
//! [`FetchTransform`] realizes a backend's raw fetch payload into a
//! concrete in-memory block of rows — required because lazy proxies some
//! backends return are unsafe to hold across block or worker boundaries.
//! [`BatchTransform`] converts one `batch_size` slice of rows into the
//! representation the consumer expects (e.g. splitting into feature and
//! target containers, densifying a sparse encoding).
//!
//! Both are capability traits, not base classes: any backend adapter or
//! plain closure (via [`FetchFn`] / [`BatchFn`]) can satisfy them.

use crate::error::LoaderError;

/// Materialize one raw fetch payload into a block of rows.
pub trait FetchTransform<Raw>: Send + Sync + 'static {
    /// Concrete row type the rest of the pipeline shuffles and batches.
    type Row: Send + 'static;

    fn materialize(&self, raw: Raw) -> Result<Vec<Self::Row>, LoaderError>;
}

/// Convert one slice of rows into the consumer-facing batch type.
pub trait BatchTransform<Row>: Send + Sync + 'static {
    type Batch: Send + 'static;

    fn collate(&self, rows: Vec<Row>) -> Result<Self::Batch, LoaderError>;
}

/// Default fetch-transform for datasets whose raw payload already is a
/// materialized `Vec` of rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFetch;

impl<R: Send + 'static> FetchTransform<Vec<R>> for IdentityFetch {
    type Row = R;

    fn materialize(&self, raw: Vec<R>) -> Result<Vec<R>, LoaderError> {
        Ok(raw)
    }
}

/// Default batch-transform: the batch is the row slice itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityBatch;

impl<R: Send + 'static> BatchTransform<R> for IdentityBatch {
    type Batch = Vec<R>;

    fn collate(&self, rows: Vec<R>) -> Result<Vec<R>, LoaderError> {
        Ok(rows)
    }
}

/// Adapter letting a plain closure act as a [`FetchTransform`].
#[derive(Debug, Clone)]
pub struct FetchFn<F>(pub F);

impl<Raw, Row, F> FetchTransform<Raw> for FetchFn<F>
where
    F: Fn(Raw) -> Result<Vec<Row>, LoaderError> + Send + Sync + 'static,
    Raw: 'static,
    Row: Send + 'static,
{
    type Row = Row;

    fn materialize(&self, raw: Raw) -> Result<Vec<Row>, LoaderError> {
        (self.0)(raw)
    }
}

/// Adapter letting a plain closure act as a [`BatchTransform`].
#[derive(Debug, Clone)]
pub struct BatchFn<F>(pub F);

impl<Row, Out, F> BatchTransform<Row> for BatchFn<F>
where
    F: Fn(Vec<Row>) -> Result<Out, LoaderError> + Send + Sync + 'static,
    Row: Send + 'static,
    Out: Send + 'static,
{
    type Batch = Out;

    fn collate(&self, rows: Vec<Row>) -> Result<Out, LoaderError> {
        (self.0)(rows)
    }
}

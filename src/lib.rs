//! # Ferroblas
//!
//! A **lazy, pipelined, copy-on-write sparse linear algebra engine** in the
//! GraphBLAS style: sparse [`Matrix`], [`Vector`], and [`Scalar`] containers
//! over arbitrary element types, with composed operations — multiplication,
//! element-wise add/multiply, reduction, apply, select, assign, extract,
//! transpose, Kronecker product, diagonal construction — parameterized by
//! user-supplied [`Monoid`]s, [`Semiring`]s, and unary/binary/index-unary
//! operators. Every operation takes an optional write mask (with complement
//! and structure-only variants), an optional accumulator, and a
//! [`Descriptor`] controlling replace semantics and input transposition.
//!
//! ## Key Ideas
//!
//! - **Value semantics with sharing** — a handle holds one reference; `dup`
//!   (or `clone`) shares it, and every mutation rebinds the handle to a new
//!   reference, so no clone ever observes another's changes.
//! - **Deferred evaluation** — compute operations install a *computed node*
//!   describing what to produce; nothing runs until a read forces it
//!   (`extract_element`, `extract_tuples`, a reduction, or
//!   `wait(Materialize)`).
//! - **Streaming kernels** — evaluation flows as ordered sparse slices
//!   through bounded-concurrency pipelines with zipper-style multi-source
//!   merging; buffers are shared copy-on-write.
//! - **One-pass materialization** — `wait(Materialize)` collapses any delta
//!   chain or computed graph into the canonical sparse form (CSR-like for
//!   matrices) behind the same reference.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ferroblas::*;
//!
//! # fn main() -> ferroblas::Result<()> {
//! // Build a 4x4 adjacency matrix.
//! let mut a = Matrix::<f64>::new(4, 4)?;
//! a.build(&[0, 0, 1, 2], &[1, 2, 3, 3], &[1.0, 1.0, 1.0, 1.0], None)?;
//!
//! // One step of BFS-like traversal: w = A' * front, keeping new vertices.
//! let mut front = Vector::<f64>::new(4)?;
//! front.set_element(0, 1.0)?;
//!
//! let mut next = Vector::<f64>::new(4)?;
//! next.vxm(
//!     Some(&front.as_structure()),
//!     None,
//!     &ops::plus_times::<f64>(),
//!     &front,
//!     &a,
//!     Descriptor::new().with_complement().with_replace(),
//! )?;
//!
//! // Nothing has run yet; this read drives the pipeline.
//! let (indices, values) = next.extract_tuples()?;
//! # let _ = (indices, values);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`handle`] — the user-facing containers and mask synthesis
//! - [`ops`] — operators, monoids, semirings (and the canonical catalog)
//! - [`descriptor`] — the five-flag operation modifier
//! - [`pipeline`] — staged batch pipelines, sources, merges, collect/reduce
//! - [`slice`] — copy-on-write sparse slices
//! - [`bitset`] — atomic membership sets and the parallel scratch array
//! - [`error`] — the error taxonomy
//!
//! The representation variants (`form`), the reference layer (`reference`),
//! and the computed nodes (`compute`) are internal: they are reachable only
//! through handle operations.

pub mod bitset;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod index;
pub mod ops;
pub mod pipeline;
pub mod slice;
pub mod types;

mod compute;
mod form;
mod reference;

pub use descriptor::Descriptor;
pub use error::{Error, Result};
pub use handle::matrix::Matrix;
pub use handle::scalar::Scalar;
pub use handle::vector::Vector;
pub use handle::{MatMask, VecMask, WaitMode};
pub use index::{all, Ix};
pub use ops::{BinaryOp, IndexUnaryOp, Monoid, Semiring, UnaryOp};
pub use types::{Bounded, Element, MaskValue, One};

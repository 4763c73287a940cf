//! Structured extraction - recovering typed values from generator text
//!
//! The generator is asked for strict JSON but routinely wraps it in code
//! fences, prefixes commentary, or emits something that is not JSON at all.
//! This module is the boundary between that untyped text and the typed values
//! the rest of the crate works with:
//!
//! ```text
//! raw text → strip fences → slice {…} → parse → validate ─ok─→ value
//!        (fenced interior first, then the unfenced text)
//!                                                  │
//!                                                 fail
//!                                                  ↓
//!                                   one repair call (temperature 0)
//!                                                  ↓
//!                              same pipeline ─ok─→ value │ fail → default
//! ```
//!
//! At most two generator calls are made per extraction and no parse error
//! ever escapes: callers always receive a well-typed value.

mod error;
mod payload;
mod protocol;

pub use error::ShapeError;
pub use payload::{
    extract_payload, parse_structured, parse_with, payload_candidates, required_array, slice_object, strip_fences,
};
pub use protocol::{Extraction, ExtractionOutcome, ExtractionRequest, RepairContext, Structured, StructuredExtractor};

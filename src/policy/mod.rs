//! Synchronous pre-enqueue predicates: redaction, filtering, sampling.

mod filter;
mod redact;
mod sample;

pub use filter::FilterFn;
pub(crate) use filter::FilterChain;
pub use redact::Redactor;
pub use sample::SamplingStrategy;
pub(crate) use sample::Sampler;

//! Probe evaluation
//!
//! A probe turns the pixels of one configured region into a trigger signal.
//!
//! ```text
//!   Frame ──sample()──▶ ProbeSample ──evaluate(previous)──▶ ProbeResult
//!                                            ▲                   │
//!                                            └──── kept by caller ┘
//! ```
//!
//! Evaluation is a pure function of the new sample and the previous result.
//! Debounce is the caller's job (see [`Debouncer`]).

mod debounce;
mod engine;


pub use debounce::Debouncer;
pub use engine::{
    CrossDirection, EdgeDirection, PercentageReading, ProbeResult, ProbeSample, calculated_x,
    evaluate, fill_percentage, sample,
};

// Slant: subjectivity and sentiment scoring for news article corpora
//
// This is the library root. The analysis path runs
// article -> chunker -> classifier -> scoring -> processor, fanned out by
// the worker pool and drained into the output writer by the pipeline.
// `sources` covers the upstream stages that produce the article files.

pub mod article;
pub mod chunker;
pub mod classifier;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod processor;
pub mod scoring;
pub mod sources;
pub mod status;

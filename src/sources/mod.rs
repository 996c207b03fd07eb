// Upstream collaborators: where the article files come from.
//
// `directory` lists sources and story metadata from the MediaCloud API,
// `fetch` retrieves article text for each story and writes the per-article
// JSON files the analysis stage reads. Both stages are plain async I/O and
// run before the worker pool is involved.

pub mod directory;
pub mod fetch;
pub mod rate_limiter;

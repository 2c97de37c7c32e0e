pub mod backoff;
pub mod engine;
pub mod history;
pub mod outcome;
pub mod paths;
pub mod retry;
pub mod walker;

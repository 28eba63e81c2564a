//! Pipeline entry points for the article workflow.
//!
//! - `run_generate`: Submit a job and wait for the generated text
//! - `run_watch`: Wait on a job submitted earlier
//! - `run_publish`: Generate, then file the result as a CMS draft

mod publish;
mod submit;

pub use publish::{PublishContext, PublishReport, run_generate, run_publish, run_watch};
pub use submit::submit_draft;

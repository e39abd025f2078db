//! JSON body request filter.
//!
//! Requests flow through these stages, and every stage except the last can
//! end in a forward:
//!
//! 1. content-type gate (`application/json`, `application/*+json`)
//! 2. path/method pre-filter against the compiled rules, on the decoded path
//! 3. bounded body read (10 MiB) with body restoration
//! 4. JSON parse, up to 10 000 levels of nesting
//! 5. per-rule field extraction and value match, first match rejects
//!
//! # Module Structure
//!
//! - `content_type` - JSON media type detection
//! - `body` - bounded reads and body restoration
//! - `document` - JSON parsing and rule matching
//! - `evaluate` - the decision procedure
//! - `layer` - tower `Layer`/`Service` wrapper

mod body;
mod content_type;
mod document;
mod evaluate;
mod layer;

pub use body::{
    read_bounded, replay_with_remainder, BodyRead, BufferedBody, MAX_INSPECTED_BODY_BYTES,
};
pub use content_type::is_json_content_type;
pub use document::{match_body, nesting_depth, DocumentError, MAX_JSON_DEPTH};
pub use evaluate::{evaluate, Decision, ForwardReason, Rejection};
pub use layer::{JsonBodyFilter, JsonBodyFilterLayer};

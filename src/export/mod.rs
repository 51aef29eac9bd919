// Final stage of a migration: ordering, artifact files and the audit ledger.

pub mod dedup;
pub mod ledger;
pub mod writer;

pub use dedup::dedupe_and_order;
pub use ledger::{append_anchor_record, LedgerEntry};
pub use writer::{render_filename, write_artifact, WrittenArtifact};

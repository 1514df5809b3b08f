//! kinship-codec: Text representations of contact relationships.
//!
//! A contact document carries its relationships twice: as `RELATED` fields
//! in the front-matter block and as bullets under a "Related" heading. Both
//! codecs decode into [`DecodedRelation`]s and diff against the graph the
//! same way, so an edge means the same thing in either representation.

pub mod block;
pub mod diff;
pub mod error;
pub mod front_matter;
pub mod markdown;
pub mod revision;
pub mod slug;

pub use block::FrontMatter;
pub use diff::{diff_relations, DecodedRelation};
pub use error::CodecError;
pub use front_matter::{FrontMatterCodec, RelatedKey};
pub use markdown::{MarkdownCodec, Section};
pub use revision::{format_revision, parse_revision, should_update};
pub use slug::{document_path, slugify};

//! # Stages
//!
//! Line-oriented sample stages for `Consumer<String>` pipelines and the
//! registry the CLI and demos build pipelines from.
//!
//! | factory | params | effect |
//! |---|---|---|
//! | `uppercase` / `lowercase` | - | case mapping |
//! | `trim` | - | strip surrounding whitespace |
//! | `prefix` / `suffix` | `text` | wrap the line |
//! | `reject-empty` | - | report blank lines as processing errors |
//! | `max-length` | `limit` | report lines longer than `limit` chars |

mod error;
mod registry;
mod text;

pub use error::StageError;
pub use registry::{text_registry, TEXT_PAYLOAD};
pub use text::{Affix, Lowercase, MaxLength, RejectEmpty, Text, TextSink, Trim, Uppercase};

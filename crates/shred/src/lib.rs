mod bundle;
mod error;
mod from;
mod result;
mod store;
mod to;

pub use bundle::{name_of_field, AttributeRows, Bundle, InstanceRows, Row, Table};
pub use error::ShredError;
pub use from::reassemble;
pub use result::{Meta, QueryResult};
pub use store::Store;
pub use to::shred;

use serde::{Deserialize, Serialize};

/// Action is the verb of a request. POST and PUT upsert, PATCH partially
/// updates (zero-valued attributes preserve existing columns), DELETE and
/// GET consume queries or by-example filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Post,
    Put,
    Patch,
    Delete,
    Get,
}

mod codec;
mod node;
mod registry;
mod value;

pub mod typed;

pub use codec::{CodecError, JsonCodec, ValueCodec};
pub use node::{Kind, Node};
pub use registry::{Decorator, FieldDef, SchemaError, TypeDef, TypeRegistry};
pub use value::{Record, Value};

use std::sync::Arc;

/// Resources bundles the ambient collaborators every core operation needs:
/// the type registry (nodes plus key decorators) and the column-payload
/// codec. It is cheap to clone and share across threads.
#[derive(Clone)]
pub struct Resources {
    pub registry: Arc<TypeRegistry>,
    pub codec: Arc<dyn ValueCodec>,
}

impl Resources {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            codec: Arc::new(JsonCodec),
        }
    }

    pub fn with_codec(registry: Arc<TypeRegistry>, codec: Arc<dyn ValueCodec>) -> Self {
        Self { registry, codec }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShredError {
    #[error("request carries no elements")]
    Empty,
    #[error("cannot shred a {0} value; the root must be a record")]
    NotARecord(&'static str),
    #[error(transparent)]
    Schema(#[from] schema::SchemaError),
    #[error(transparent)]
    Codec(#[from] schema::CodecError),
    #[error("malformed rec-key {0:?}")]
    RecKey(String),
    #[error("slice index {index} out of range for {type_name:?} ({len} rows)")]
    SliceIndex {
        type_name: String,
        index: usize,
        len: usize,
    },
    #[error("projection selects struct attribute {attr:?} of {type_name:?}")]
    ProjectedStruct { type_name: String, attr: String },
}

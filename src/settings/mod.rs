pub mod upload_concurrency;

pub use upload_concurrency::{
    default_upload_concurrency, get_upload_concurrency, set_upload_concurrency,
    MAX_UPLOAD_CONCURRENCY, MIN_UPLOAD_CONCURRENCY,
};

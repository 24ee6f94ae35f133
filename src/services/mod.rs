pub(crate) mod answer_keys;
pub(crate) mod engine;
pub(crate) mod export;
pub(crate) mod files;
pub(crate) mod housekeeping;
pub(crate) mod pipeline;
pub(crate) mod spreadsheet;
pub(crate) mod thumbnails;
pub(crate) mod upload_store;

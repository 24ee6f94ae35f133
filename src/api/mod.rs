pub(crate) mod answer_keys;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod handlers;
pub(crate) mod multipart;
pub(crate) mod router;
pub(crate) mod sheets;
pub(crate) mod validation;

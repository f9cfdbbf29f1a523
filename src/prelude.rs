// Level macros used throughout the crate; see `observability` for backend selection.

#[allow(unused_imports)]
pub(crate) use crate::observability::{log_debug as debug, log_info as info, log_warn as warn};

pub mod error;
pub mod json_extract;
pub mod text;

pub use error::{ApiError, ApiResult};
pub use json_extract::{extract_json_content, parse_json_response};
pub use text::{collapse_whitespace, title_case};

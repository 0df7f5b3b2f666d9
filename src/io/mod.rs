mod http_source;
mod range_source;
mod s3_source;

pub use http_source::{archive_key, HttpArchiveSource, HttpRangeSource, DEFAULT_ORIGIN_TIMEOUT};
pub use range_source::{
    range_header, read_i32_le, read_u64_le, slice_window, ArchiveSource, CacheMetadata,
    RangeResponse, RangeSource, RawResponse,
};
pub use s3_source::{create_s3_client, S3ArchiveSource, S3RangeSource};

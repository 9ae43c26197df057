mod fetcher;

pub(crate) use fetcher::map_reqwest_error;
pub use fetcher::{HttpImageFetcher, ImageFetcher, DEFAULT_FETCH_TIMEOUT_SECS};

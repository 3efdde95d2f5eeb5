pub mod cleaner;
pub mod fetcher;
pub mod llm;

pub use cleaner::PageCleaner;
pub use fetcher::HttpFetcher;
pub use llm::ClaudeExtractor;

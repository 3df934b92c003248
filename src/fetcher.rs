use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    config::{RetryPolicy, SearchConfig},
    error::FetchError,
    model::Paper,
    parser::{PageRequest, SearchService},
};

/// Walks a newest-first search page by page until the tail of a page
/// falls before the cutoff.
pub struct PaginatedFetcher<S> {
    service: S,
    config: SearchConfig,
    retry: RetryPolicy,
}

impl<S: SearchService> PaginatedFetcher<S> {
    pub fn new(service: S, config: SearchConfig, retry: RetryPolicy) -> Self {
        PaginatedFetcher {
            service,
            config,
            retry,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Every record whose stop-field timestamp is at or after the cutoff,
    /// possibly with duplicates across pages and some older records from
    /// the final page.
    pub async fn fetch_all(&self) -> Result<Vec<Paper>, FetchError> {
        let mut offset = 0usize;
        let mut papers: Vec<Paper> = Vec::new();

        loop {
            info!(offset, found = papers.len(), "searching");
            let page = self.fetch_page_with_retry(offset).await?;

            let tail = page
                .last()
                .map(|paper| paper.timestamp(self.config.stop_field));
            papers.extend(page);

            match tail {
                Some(ts) if ts >= self.config.cutoff => {
                    offset += self.config.page_size;
                    if !self.config.page_delay.is_zero() {
                        sleep(self.config.page_delay).await;
                    }
                }
                _ => break,
            }
        }

        info!(found = papers.len(), "finished fetching");
        Ok(papers)
    }

    async fn fetch_page_with_retry(&self, offset: usize) -> Result<Vec<Paper>, FetchError> {
        let request = PageRequest::from_config(&self.config, offset);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.service.fetch_page(&request).await {
                Err(e @ FetchError::EmptyPage { .. }) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(FetchError::RetriesExhausted {
                            offset,
                            attempts: attempt,
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        offset,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{}, retrying",
                        e
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                other => return other,
            }
        }
    }
}

use std::path::PathBuf;

use tracing::info;

use crate::error::LabelerError;
use crate::models::event::LabelerEvent;
use crate::services::fetcher::ResultFetcher;
use crate::services::poller::JobPoller;
use crate::services::session::{RunContext, RunSummary};
use crate::services::submitter::JobSubmitter;

/// Split `paths` into consecutive chunks of at most `size` images.
pub fn split_into_chunks(paths: &[PathBuf], size: usize) -> Vec<Vec<PathBuf>> {
    paths.chunks(size.max(1)).map(<[PathBuf]>::to_vec).collect()
}

/// Runs a batch as a strict sequence of Submit -> Poll -> Fetch per chunk.
/// Chunk `n + 1` is not submitted until chunk `n` has been fully fetched.
#[derive(Clone)]
pub struct BatchChunker {
    submitter: JobSubmitter,
    poller: JobPoller,
    fetcher: ResultFetcher,
    chunk_size: usize,
}

impl BatchChunker {
    pub fn new(
        submitter: JobSubmitter,
        poller: JobPoller,
        fetcher: ResultFetcher,
        chunk_size: usize,
    ) -> Self {
        Self {
            submitter,
            poller,
            fetcher,
            chunk_size,
        }
    }

    pub async fn run(
        &self,
        paths: &[PathBuf],
        ctx: &RunContext<'_>,
    ) -> Result<RunSummary, LabelerError> {
        let guard = &ctx.guard;
        let chunks = split_into_chunks(paths, self.chunk_size);
        let mut summary = RunSummary {
            total: paths.len(),
            ..RunSummary::default()
        };

        ctx.session
            .update(guard, |s| s.remaining_chunks = chunks.len())
            .ok_or(LabelerError::Cancelled)?;
        ctx.events.emit(guard, LabelerEvent::Progress { done: 0, total: summary.total });

        for (index, chunk) in chunks.iter().enumerate() {
            info!(
                chunk = index + 1,
                chunks = chunks.len(),
                images = chunk.len(),
                "Submitting chunk"
            );

            let mut jobs = self
                .submitter
                .submit_chunk(chunk, &ctx.form, guard, ctx.events)
                .await?;
            ctx.session
                .update(guard, |s| {
                    s.jobs = jobs.clone();
                    s.remaining_chunks -= 1;
                })
                .ok_or(LabelerError::Cancelled)?;

            let polled = self.poller.poll_batch(&mut jobs, guard).await?;
            ctx.session
                .update(guard, |s| s.jobs = jobs.clone())
                .ok_or(LabelerError::Cancelled)?;

            if polled.failed > 0 {
                ctx.events.status(
                    guard,
                    format!(
                        "{}/{} batch jobs failed, fetching {} result(s).",
                        polled.failed,
                        jobs.len(),
                        polled.succeeded
                    ),
                    5000,
                );
            }

            let fetched = self
                .fetcher
                .fetch_chunk(&jobs, &ctx.classes, guard, ctx.events)
                .await?;

            summary.done += fetched.written;
            summary.failed += polled.failed + fetched.failed;
            ctx.session
                .update(guard, |s| {
                    s.jobs.clear();
                    s.done = summary.done;
                    s.failed = summary.failed;
                })
                .ok_or(LabelerError::Cancelled)?;

            info!(
                chunk = index + 1,
                written = fetched.written,
                failed = polled.failed + fetched.failed,
                "Chunk complete"
            );
            ctx.events.emit(
                guard,
                LabelerEvent::Progress {
                    done: summary.done,
                    total: summary.total,
                },
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("img{i}.jpg"))).collect()
    }

    #[test]
    fn test_25_images_make_two_chunks() {
        let chunks = split_into_chunks(&paths(25), 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks[1].len(), 5);
        assert_eq!(chunks[1][0], PathBuf::from("img20.jpg"));
    }

    #[test]
    fn test_exact_multiple() {
        let chunks = split_into_chunks(&paths(40), 20);
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![20, 20]);
    }

    #[test]
    fn test_empty_list_has_no_chunks() {
        assert!(split_into_chunks(&[], 20).is_empty());
    }

    #[test]
    fn test_order_preserved() {
        let input = paths(7);
        let flattened: Vec<PathBuf> = split_into_chunks(&input, 3).into_iter().flatten().collect();
        assert_eq!(flattened, input);
    }
}

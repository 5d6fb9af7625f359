//! Paged job history.

use tracing::{debug, warn};

use seqalign_core::{PageRequest, PagedResponse, SortSpec};
use seqalign_events::JobEvent;

use crate::store::AlignJobStore;

/// Read-only, best-effort listing of past jobs.
///
/// Storage failures degrade to an empty page instead of an error.
#[derive(Debug, Clone)]
pub struct JobHistoryQuery<J> {
    jobs: J,
}

impl<J> JobHistoryQuery<J>
where
    J: AlignJobStore,
{
    pub fn new(jobs: J) -> Self {
        Self { jobs }
    }

    /// `sort_tokens` are raw `field[,direction]` tokens; see `SortSpec::parse`.
    pub async fn list<S: AsRef<str>>(
        &self,
        request: PageRequest,
        sort_tokens: &[S],
    ) -> PagedResponse<JobEvent> {
        let sort = SortSpec::parse(sort_tokens);
        self.list_sorted(request, &sort).await
    }

    pub async fn list_sorted(&self, request: PageRequest, sort: &SortSpec) -> PagedResponse<JobEvent> {
        let fetched = tokio::try_join!(self.jobs.find_page(request, sort), self.jobs.count());

        match fetched {
            Ok((jobs, total)) => {
                let page = PagedResponse::of(jobs.iter().map(JobEvent::from).collect(), request, total);
                debug!(
                    page = page.page,
                    total_pages = page.total_pages,
                    total_elements = page.total_elements,
                    "job history page"
                );
                page
            }
            Err(e) => {
                warn!(error = %e, page = request.page(), size = request.size(), "job history query failed; returning empty page");
                PagedResponse::empty(request)
            }
        }
    }
}

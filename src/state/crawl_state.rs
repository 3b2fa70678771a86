/// Crawl run state machine
///
/// A run walks listing pages strictly in order:
/// `AwaitingListingPage(n)` → `ExtractingLinks(n)` → `VisitingDetailPages(n)`
/// → `AwaitingListingPage(n + 1)` → … → `Done`.
use std::fmt;

/// Where a crawl run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Listing page `n` is about to be loaded
    AwaitingListingPage(u32),

    /// Listing page `n` is loaded and its detail links are being extracted
    ExtractingLinks(u32),

    /// Detail links from listing page `n` are being fetched and stored
    VisitingDetailPages(u32),

    /// The run has stopped
    Done,
}

impl CrawlState {
    /// The state every run starts in
    pub fn initial() -> Self {
        Self::AwaitingListingPage(1)
    }

    /// Returns true once the run has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// The listing page this state refers to, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::AwaitingListingPage(n) | Self::ExtractingLinks(n) | Self::VisitingDetailPages(n) => {
                Some(*n)
            }
            Self::Done => None,
        }
    }

    /// Checks a transition against the run's state machine
    ///
    /// `Done` is reachable from every non-terminal state (empty page, page
    /// limit, navigation failure, cancellation). Pages only ever advance by one.
    pub fn can_transition_to(&self, next: &CrawlState) -> bool {
        match (self, next) {
            (Self::Done, _) => false,
            (_, Self::Done) => true,
            (Self::AwaitingListingPage(a), Self::ExtractingLinks(b)) => a == b,
            (Self::ExtractingLinks(a), Self::VisitingDetailPages(b)) => a == b,
            (Self::VisitingDetailPages(a), Self::AwaitingListingPage(b)) => a.checked_add(1) == Some(*b),
            _ => false,
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingListingPage(n) => write!(f, "awaiting_listing_page({})", n),
            Self::ExtractingLinks(n) => write!(f, "extracting_links({})", n),
            Self::VisitingDetailPages(n) => write!(f, "visiting_detail_pages({})", n),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Why a run reached `Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// A listing page loaded fine but held no detail links
    EmptyPage(u32),

    /// A listing page only repeated links already seen this run
    RepeatedPage(u32),

    /// The configured last page was processed
    PageLimit(u32),

    /// A listing page after the first could not be loaded, even after retries
    EndOfPagination(u32),

    /// A shutdown was requested
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPage(n) => write!(f, "listing page {} had no detail links", n),
            Self::RepeatedPage(n) => write!(f, "listing page {} had no new detail links", n),
            Self::PageLimit(n) => write!(f, "reached page limit {}", n),
            Self::EndOfPagination(n) => write!(f, "listing page {} could not be loaded", n),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

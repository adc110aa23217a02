//! Concurrent fan-out to peer campuses

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use campus_core::{Campus, UserId};

use crate::error::{Error, Result};
use crate::peer::PeerLink;
use crate::protocol::{Request, Response};

/// Per-campus results of a fan-out. `None` marks a campus that did not answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: BTreeMap<Campus, Option<u32>>,
}

impl Tally {
    pub fn insert(&mut self, campus: Campus, count: Option<u32>) {
        self.counts.insert(campus, count);
    }

    pub fn get(&self, campus: Campus) -> Option<u32> {
        self.counts.get(&campus).copied().flatten()
    }

    /// Sum over the campuses that answered
    pub fn total(&self) -> u32 {
        self.counts.values().flatten().sum()
    }

    pub fn unreachable(&self) -> impl Iterator<Item = Campus> + '_ {
        self.counts
            .iter()
            .filter(|(_, count)| count.is_none())
            .map(|(campus, _)| *campus)
    }
}

/// Renders as `DVL 3 KKL (no response from server) WST 2`
impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (campus, count) in &self.counts {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match count {
                Some(n) => write!(f, "{} {}", campus, n)?,
                None => write!(f, "{} (no response from server)", campus)?,
            }
        }
        Ok(())
    }
}

pub struct Aggregator {
    link: Arc<dyn PeerLink>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(link: Arc<dyn PeerLink>, timeout: Duration) -> Self {
        Self { link, timeout }
    }

    pub fn link(&self) -> &Arc<dyn PeerLink> {
        &self.link
    }

    /// Send `request` to every campus in `peers` at once. Each call is bounded
    /// by the per-call timeout; results come back in campus order.
    pub async fn fan_out(
        &self,
        peers: impl IntoIterator<Item = Campus>,
        request: Request,
    ) -> Vec<(Campus, Result<Response>)> {
        let timeout = self.timeout;
        let request = &request;
        let calls = peers.into_iter().map(|campus| async move {
            let result = tokio::time::timeout(timeout, self.link.send(campus, request, timeout))
                .await
                .unwrap_or(Err(Error::Timeout(timeout)));
            (campus, result)
        });

        let mut results = futures::future::join_all(calls).await;
        results.sort_by_key(|(campus, _)| *campus);
        results
    }

    /// Collect the `count` field from every peer's reply
    async fn tally(&self, peers: impl IntoIterator<Item = Campus>, request: Request) -> Tally {
        let mut tally = Tally::default();
        for (campus, result) in self.fan_out(peers, request).await {
            let count = match result {
                Ok(response) if response.success => response.count,
                Ok(response) => {
                    debug!(%campus, message = %response.message, "Peer declined");
                    None
                }
                Err(e) => {
                    warn!(%campus, error = %e, "Peer did not answer");
                    None
                }
            };
            tally.insert(campus, count);
        }
        tally
    }

    /// Bookings `student` holds on other campuses in the week ending `date`.
    /// Campuses that fail to answer count as zero.
    pub async fn peer_booking_total(&self, own: Campus, student: UserId, date: NaiveDate) -> Tally {
        self.tally(
            own.peers(),
            Request::GetBookingCount {
                student_id: student,
                date,
            },
        )
        .await
    }

    /// Free slots on `date` across every campus, with `local` filled in for `own`
    pub async fn availability(&self, own: Campus, local: u32, date: NaiveDate) -> Tally {
        let mut tally = self
            .tally(own.peers(), Request::GetAvailableTimeslots { date })
            .await;
        tally.insert(own, Some(local));
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Action, ErrorKind};
    use async_trait::async_trait;
    use campus_core::parse_date;

    /// Answers with a fixed count per campus; absent campuses never reply
    struct FixedLink {
        counts: BTreeMap<Campus, u32>,
    }

    #[async_trait]
    impl PeerLink for FixedLink {
        async fn send(&self, campus: Campus, request: &Request, _timeout: Duration) -> Result<Response> {
            match self.counts.get(&campus) {
                Some(n) => Ok(Response::ok(request.action(), n.to_string(), request.parameters())
                    .with_count(*n)),
                None => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Err(Error::PeerUnreachable(campus.to_string()))
                }
            }
        }
    }

    struct FailingLink;

    #[async_trait]
    impl PeerLink for FailingLink {
        async fn send(&self, campus: Campus, request: &Request, _timeout: Duration) -> Result<Response> {
            Ok(Response::fail(
                request.action(),
                ErrorKind::Unsupported,
                format!("{} refused", campus),
                request.parameters(),
            ))
        }
    }

    fn aggregator(counts: &[(Campus, u32)]) -> Aggregator {
        let link = FixedLink {
            counts: counts.iter().copied().collect(),
        };
        Aggregator::new(Arc::new(link), Duration::from_millis(100))
    }

    #[test]
    fn test_summary_format() {
        let mut tally = Tally::default();
        tally.insert(Campus::Wst, Some(2));
        tally.insert(Campus::Dvl, Some(3));
        tally.insert(Campus::Kkl, None);
        assert_eq!(tally.to_string(), "DVL 3 KKL (no response from server) WST 2");
        assert_eq!(tally.total(), 5);
        assert_eq!(tally.unreachable().collect::<Vec<_>>(), vec![Campus::Kkl]);
    }

    #[tokio::test]
    async fn test_peer_total_sums_answers() {
        let agg = aggregator(&[(Campus::Kkl, 1), (Campus::Wst, 2)]);
        let student = "dvls1234".parse().unwrap();
        let date = parse_date("2021-01-01").unwrap();

        let tally = agg.peer_booking_total(Campus::Dvl, student, date).await;
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.get(Campus::Dvl), None);
    }

    #[tokio::test]
    async fn test_silent_peer_counts_zero() {
        let agg = aggregator(&[(Campus::Kkl, 2)]);
        let student = "dvls1234".parse().unwrap();
        let date = parse_date("2021-01-01").unwrap();

        let started = std::time::Instant::now();
        let tally = agg.peer_booking_total(Campus::Dvl, student, date).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(tally.total(), 2);
        assert_eq!(tally.unreachable().collect::<Vec<_>>(), vec![Campus::Wst]);
    }

    #[tokio::test]
    async fn test_availability_includes_self() {
        let agg = aggregator(&[(Campus::Wst, 4)]);
        let date = parse_date("2021-01-01").unwrap();

        let tally = agg.availability(Campus::Dvl, 3, date).await;
        assert_eq!(tally.to_string(), "DVL 3 KKL (no response from server) WST 4");
    }

    #[tokio::test]
    async fn test_unsuccessful_reply_is_no_response() {
        let agg = Aggregator::new(Arc::new(FailingLink), Duration::from_millis(100));
        let date = parse_date("2021-01-01").unwrap();
        let results = agg
            .fan_out(Campus::Dvl.peers(), Request::GetAvailableTimeslots { date })
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, Campus::Kkl);
        assert_eq!(results[0].1.as_ref().unwrap().action, Action::GetAvailableTimeslots);

        let tally = agg.availability(Campus::Dvl, 0, date).await;
        assert_eq!(tally.total(), 0);
        assert_eq!(tally.unreachable().count(), 2);
    }
}

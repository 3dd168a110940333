/// The trace registry owns every request seen in the input, keyed by request id, plus the per-node
/// queue-length samples, which belong to no request.  It only ever grows.  Entities are created the
/// first time they are referenced: events for a request can precede its arrival event, and files
/// can be read in any order.
use crate::request::Request;
use crate::task::{Task, TaskRef};

use itertools::Itertools;
use log::trace;
use rustutils::Timestamp;
use std::collections::HashMap;
use ustr::Ustr;

#[derive(Debug, Default)]
pub struct TraceRegistry {
    requests: HashMap<Ustr, Request>,
    queue_lengths: HashMap<Ustr, Vec<(Timestamp, usize)>>,
    pub(crate) finalized: bool,
}

impl TraceRegistry {
    pub fn new() -> TraceRegistry {
        Default::default()
    }

    /// Get the request, creating it if this is the first time it is mentioned.

    pub fn request_mut(&mut self, request_id: Ustr) -> &mut Request {
        self.requests.entry(request_id).or_insert_with(|| {
            trace!("New request {request_id}");
            Request::new(request_id)
        })
    }

    pub fn request(&self, request_id: &str) -> Option<&Request> {
        self.requests.get(&Ustr::from(request_id))
    }

    pub fn task(&self, id: &TaskRef) -> Option<&Task> {
        self.requests.get(&id.request_id)?.tasks.get(&id.task_id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.requests.values()
    }

    pub(crate) fn requests_mut(&mut self) -> impl Iterator<Item = &mut Request> {
        self.requests.values_mut()
    }

    /// Requests ordered by arrival time, with requests that never arrived last, and then by id.

    pub fn sorted_requests(&self) -> Vec<&Request> {
        self.requests
            .values()
            .sorted_by(|a, b| {
                let ka = a.arrival.map(|x| x.time).unwrap_or(Timestamp::MAX);
                let kb = b.arrival.map(|x| x.time).unwrap_or(Timestamp::MAX);
                ka.cmp(&kb).then_with(|| a.id.cmp(&b.id))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// A sample identical to one already recorded for the node is the same observation, read twice.

    pub fn add_queue_length(&mut self, addr: Ustr, t: Timestamp, queue_length: usize) {
        let samples = self.queue_lengths.entry(addr).or_default();
        if !samples.contains(&(t, queue_length)) {
            samples.push((t, queue_length));
        }
    }

    /// The raw samples per node, in the order they were ingested.

    pub fn queue_lengths(&self) -> &HashMap<Ustr, Vec<(Timestamp, usize)>> {
        &self.queue_lengths
    }

    /// The earliest and latest arrival time, if any request has arrived.

    pub fn arrival_bounds(&self) -> Option<(Timestamp, Timestamp)> {
        self.requests
            .values()
            .filter_map(|r| r.arrival.map(|a| a.time))
            .minmax()
            .into_option()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

#[test]
fn test_registry() {
    use crate::configs::DuplicatePolicy;
    use crate::request::Arrival;

    let mut reg = TraceRegistry::new();
    assert!(reg.is_empty());
    assert!(reg.arrival_bounds().is_none());
    let s = Ustr::from("s");
    for (id, time) in [("b", 30), ("a", 30), ("c", 10)] {
        reg.request_mut(Ustr::from(id)).set_arrival(
            Arrival {
                time,
                expected_tasks: 1,
                scheduler: s,
            },
            DuplicatePolicy::Overwrite,
        );
    }
    reg.request_mut(Ustr::from("z")).task_mut(Ustr::from("t"));
    assert!(reg.len() == 4);
    assert!(reg.arrival_bounds() == Some((10, 30)));
    let ids = reg
        .sorted_requests()
        .iter()
        .map(|r| r.id.as_str())
        .collect::<Vec<&str>>();
    assert!(ids == vec!["c", "a", "b", "z"]);
    assert!(reg
        .task(&TaskRef::new(Ustr::from("z"), Ustr::from("t")))
        .is_some());
    assert!(reg
        .task(&TaskRef::new(Ustr::from("a"), Ustr::from("t")))
        .is_none());
    assert!(reg.request("q").is_none());

    let n = Ustr::from("n1");
    reg.add_queue_length(n, 5, 2);
    reg.add_queue_length(n, 3, 1);
    reg.add_queue_length(n, 5, 2);
    assert!(reg.queue_lengths()[&n] == vec![(5, 2), (3, 1)]);
}

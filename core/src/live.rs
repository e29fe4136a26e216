//! A viewer's live request list.
//!
//! Folds request events into a local copy keyed by request id. A copy is
//! replaced only by a strictly higher revision, so duplicated or
//! reordered deliveries converge on the same state.

use crate::{
    event::PortalEvent,
    request::Request,
    types::RequestId,
    visibility::Viewer,
};
use std::collections::HashMap;
use std::sync::mpsc::Receiver;

#[derive(Debug)]
pub struct LiveRequestView {
    viewer: Viewer,
    records: HashMap<RequestId, Request>,
}

impl LiveRequestView {
    pub fn new(viewer: Viewer) -> Self {
        Self {
            viewer,
            records: HashMap::new(),
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Load an initial listing.
    pub fn seed(&mut self, requests: impl IntoIterator<Item = Request>) {
        for request in requests {
            self.upsert(request);
        }
    }

    /// Apply one event. Returns true if the view changed.
    pub fn apply(&mut self, event: &PortalEvent) -> bool {
        match event {
            PortalEvent::RequestSubmitted { request }
            | PortalEvent::RequestStatusChanged { request, .. } => self.upsert(request.clone()),
            _ => false,
        }
    }

    /// Apply everything waiting on `rx` without blocking. Returns how
    /// many events changed the view.
    pub fn drain(&mut self, rx: &Receiver<PortalEvent>) -> usize {
        rx.try_iter().filter(|event| self.apply(event)).count()
    }

    fn upsert(&mut self, request: Request) -> bool {
        if !self.viewer.can_see(&request) {
            return false;
        }
        match self.records.get(&request.id) {
            Some(current) if current.revision >= request.revision => false,
            _ => {
                self.records.insert(request.id.clone(), request);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Request> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest first, matching the store's listing order.
    pub fn requests(&self) -> Vec<&Request> {
        let mut out: Vec<&Request> = self.records.values().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

//! The portal facade: every operation a client can trigger.
//!
//! RULES:
//!   - Identity comes from the directory, never from the caller's payload.
//!     An actor the directory cannot answer for is refused.
//!   - Listing visibility fails closed: a viewer the directory cannot
//!     answer for is treated as SALES.
//!   - A write that fails is reported once and not retried. Nothing is
//!     published for it.
//!   - Every successful write is appended to the event log and fanned
//!     out to subscribers.

use crate::{
    clock::Clock,
    command::{CommandOutcome, PortalCommand},
    config::PortalConfig,
    directory::{CachedDirectory, Department, User, UserDirectory},
    error::{PortalError, PortalResult},
    event::{EventBus, EventLogEntry, PortalEvent},
    live::LiveRequestView,
    matrix::{self, toggle_membership, AssignmentEntry, ManagerQuery, ManagerRow, Page},
    normalize::same,
    pic::PicAssignment,
    registry::{
        BookingRule, NewBookingRule, NewProtocol, Protocol, UpdateBookingRule,
        DEFAULT_RULE_PRIORITY,
    },
    request::{NewRequest, Request, RequestKind, ROUTED_DEPARTMENT},
    resolver::{PicResolver, ResolutionInput},
    rng::IdGenerator,
    status::{permitted_transition, plan_transition, Actor, RequestStatus, Transition, TransitionKind},
    store::PortalStore,
    visibility::Viewer,
};
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

pub struct Portal<D> {
    store: PortalStore,
    directory: CachedDirectory<D>,
    resolver: PicResolver,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
    bus: EventBus,
    protocol_uid_attempts: u32,
}

impl<D: UserDirectory> Portal<D> {
    pub fn new(
        store: PortalStore,
        directory: D,
        config: &PortalConfig,
        clock: Arc<dyn Clock>,
    ) -> PortalResult<Self> {
        let resolver = PicResolver::from_config(&config.resolver)?;
        let ids = match config.id_seed {
            Some(seed) => IdGenerator::seeded(seed),
            None => IdGenerator::from_entropy(),
        };
        Ok(Self {
            directory: CachedDirectory::new(directory, clock.clone(), config.directory_cache_ttl()),
            store,
            resolver,
            clock,
            ids,
            bus: EventBus::new(),
            protocol_uid_attempts: config.protocol_uid_attempts.max(1),
        })
    }

    /// In-memory, migrated store with the test configuration.
    pub fn build_test(directory: D, clock: Arc<dyn Clock>) -> PortalResult<Self> {
        let store = PortalStore::in_memory()?;
        store.migrate()?;
        Self::new(store, directory, &PortalConfig::default_test(), clock)
    }

    pub fn store(&self) -> &PortalStore {
        &self.store
    }

    pub fn directory(&self) -> &CachedDirectory<D> {
        &self.directory
    }

    pub fn resolver(&self) -> &PicResolver {
        &self.resolver
    }

    /// Swap the routing table used for new requests. Existing requests
    /// keep the PIC they were given.
    pub fn set_resolver(&mut self, resolver: PicResolver) {
        self.resolver = resolver;
    }

    pub fn subscribe(&mut self) -> Receiver<PortalEvent> {
        self.bus.subscribe()
    }

    // ── Identity ─────────────────────────────────────────────────────

    fn require_user(&self, user_id: &str) -> PortalResult<User> {
        self.directory
            .lookup(user_id)?
            .ok_or_else(|| PortalError::not_found("user", user_id))
    }

    fn require_admin(&self, actor_id: &str) -> PortalResult<User> {
        let user = self.require_user(actor_id)?;
        if !user.is_admin() {
            log::warn!("portal: {actor_id} attempted an admin operation without the admin role");
            return Err(PortalError::Forbidden {
                reason: format!("{actor_id} is not an admin"),
            });
        }
        Ok(user)
    }

    pub fn viewer(&self, viewer_id: &str) -> Viewer {
        Viewer::resolve(&self.directory, viewer_id)
    }

    // ── Requests ─────────────────────────────────────────────────────

    pub fn submit_request(&mut self, submitter_id: &str, input: NewRequest) -> PortalResult<Request> {
        let submitter = self.require_user(submitter_id)?;
        let protocols = self.validate_selection(&input.protocols)?;

        let mut resolution_input = ResolutionInput::new(protocols.iter().cloned());
        if let Some(team) = input.team.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            resolution_input = resolution_input.with_team(team);
        }
        if input.kind == RequestKind::SiteVisit {
            if let Some(pic) = self
                .store
                .get_assignment(&submitter.id)?
                .and_then(|entry| entry.as_pic())
            {
                resolution_input = resolution_input.with_manager_default(pic);
            }
        }
        let resolution = self.resolver.resolve(&resolution_input)?;

        let now = self.clock.now();
        let request = Request {
            id: self.ids.uuid(),
            kind: input.kind,
            submitted_by: submitter.id.clone(),
            department: ROUTED_DEPARTMENT.to_string(),
            protocols,
            pic: resolution.pic,
            status: RequestStatus::Pending,
            client: input.client.trim().to_string(),
            address: input.address.trim().to_string(),
            agenda: input.agenda.trim().to_string(),
            notes: input.notes.trim().to_string(),
            file_url: input.file_url.filter(|u| !u.trim().is_empty()),
            confirmation_notes: None,
            confirmed_by: None,
            confirmed_at: None,
            completed_by: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            last_modified_by: submitter.id.clone(),
            revision: 1,
        };

        self.store.insert_request(&request).inspect_err(|e| {
            log::warn!("portal: saving request from {submitter_id} failed: {e}");
        })?;
        log::info!(
            "request {} ({}) submitted by {} routed to {} via {:?}",
            request.id,
            request.kind.as_str(),
            request.submitted_by,
            request.pic,
            resolution.source,
        );
        self.publish(PortalEvent::RequestSubmitted {
            request: request.clone(),
        });
        Ok(request)
    }

    /// Trimmed, de-duplicated selection, rewritten to the stored protocol
    /// ids. Every id must name an active protocol.
    fn validate_selection(&self, selected: &[String]) -> PortalResult<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        for id in selected.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !ids.iter().any(|seen| same(seen, id)) {
                ids.push(id.to_string());
            }
        }
        if ids.is_empty() {
            return Err(PortalError::validation(
                "at least one service type must be selected",
            ));
        }

        let active = self.store.list_protocols(true)?;
        ids.into_iter()
            .map(|id| {
                active
                    .iter()
                    .find(|p| same(&p.id, &id))
                    .map(|p| p.id.clone())
                    .ok_or_else(|| PortalError::validation(format!("'{id}' is not an active protocol")))
            })
            .collect()
    }

    pub fn list_requests(&self, viewer_id: &str) -> PortalResult<Vec<Request>> {
        let viewer = self.viewer(viewer_id);
        self.store.list_requests(&viewer.scope())
    }

    /// A live list for one viewer: seeded from the current listing and
    /// fed by the returned receiver.
    pub fn live_view(&mut self, viewer_id: &str) -> PortalResult<(LiveRequestView, Receiver<PortalEvent>)> {
        let viewer = self.viewer(viewer_id);
        // Subscribe before listing so nothing written in between is lost.
        let rx = self.bus.subscribe();
        let seed = self.store.list_requests(&viewer.scope())?;
        let mut view = LiveRequestView::new(viewer);
        view.seed(seed);
        Ok((view, rx))
    }

    /// The action the actor may take on this request right now, if any.
    pub fn available_transition(
        &self,
        request_id: &str,
        actor_id: &str,
    ) -> PortalResult<Option<TransitionKind>> {
        let actor = self.require_user(actor_id)?;
        let request = self.store.get_request(request_id)?;
        let viewer = Viewer::new(actor.id.clone(), actor.department.clone());
        if !viewer.can_see(&request) {
            return Ok(None);
        }
        Ok(permitted_transition(request.status, &actor.department))
    }

    pub fn confirm_request(
        &mut self,
        request_id: &str,
        actor_id: &str,
        note: &str,
    ) -> PortalResult<Request> {
        self.transition(
            request_id,
            actor_id,
            Transition::Confirm {
                note: note.to_string(),
            },
        )
    }

    pub fn complete_request(&mut self, request_id: &str, actor_id: &str) -> PortalResult<Request> {
        self.transition(request_id, actor_id, Transition::Complete)
    }

    fn transition(
        &mut self,
        request_id: &str,
        actor_id: &str,
        transition: Transition,
    ) -> PortalResult<Request> {
        let user = self.require_user(actor_id)?;
        let actor = Actor::from(&user);
        let current = self.store.get_request(request_id)?;

        let viewer = Viewer::new(actor.id.clone(), actor.department.clone());
        if !viewer.can_see(&current) {
            return Err(PortalError::Forbidden {
                reason: format!("request {request_id} is not visible to {actor_id}"),
            });
        }

        let patch = plan_transition(current.status, &actor, &transition, self.clock.now())
            .inspect_err(|e| log::warn!("request {request_id}: {e}"))?;
        let updated = self
            .store
            .apply_status_patch(request_id, &patch)
            .inspect_err(|e| log::warn!("request {request_id}: writing {} failed: {e}", patch.to))?;

        log::info!(
            "request {request_id}: {} -> {} by {} ({})",
            patch.from,
            patch.to,
            actor.id,
            actor.department,
        );
        self.publish(PortalEvent::RequestStatusChanged {
            from: patch.from,
            actor_id: actor.id,
            request: updated.clone(),
        });
        Ok(updated)
    }

    // ── Assignment matrix ────────────────────────────────────────────

    /// Toggle against the latest stored version.
    pub fn toggle_assignment(
        &mut self,
        actor_id: &str,
        manager_id: &str,
        engineer: &str,
    ) -> PortalResult<AssignmentEntry> {
        let version = self
            .store
            .get_assignment(manager_id)?
            .map(|entry| entry.version)
            .unwrap_or(0);
        self.toggle_assignment_at(actor_id, manager_id, engineer, version)
    }

    /// Toggle against the version the caller last saw. If the entry has
    /// changed since, nothing is written and `VersionConflict` is returned.
    pub fn toggle_assignment_at(
        &mut self,
        actor_id: &str,
        manager_id: &str,
        engineer: &str,
        expected_version: u64,
    ) -> PortalResult<AssignmentEntry> {
        self.require_admin(actor_id)?;
        let engineer = engineer.trim();
        if engineer.is_empty() {
            return Err(PortalError::validation("engineer name must not be empty"));
        }
        let manager = self.require_user(manager_id)?;

        let current = self
            .store
            .get_assignment(manager_id)?
            .unwrap_or_else(|| AssignmentEntry::empty(manager_id, manager.display_name()));
        if current.version != expected_version {
            return Err(PortalError::VersionConflict {
                manager_id: manager_id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let next = toggle_membership(&current.assigned_pics, engineer);
        let assigned = next.len() > current.assigned_pics.len();
        let entry = self
            .store
            .write_assignment(
                manager_id,
                manager.display_name(),
                &next,
                expected_version,
                self.clock.now(),
            )
            .inspect_err(|e| log::warn!("assignment toggle for {manager_id} failed: {e}"))?;

        log::info!(
            "assignment: {engineer} {} manager {manager_id} (version {})",
            if assigned { "added to" } else { "removed from" },
            entry.version,
        );
        self.publish(PortalEvent::AssignmentToggled {
            engineer: engineer.to_string(),
            assigned,
            entry: entry.clone(),
        });
        Ok(entry)
    }

    pub fn assignment(&self, manager_id: &str) -> PortalResult<Option<AssignmentEntry>> {
        self.store.get_assignment(manager_id)
    }

    pub fn manager_page(&self, actor_id: &str, query: &ManagerQuery) -> PortalResult<Page<ManagerRow>> {
        self.require_admin(actor_id)?;
        let users = self.directory.list()?;
        let entries: HashMap<_, _> = self
            .store
            .list_assignments()?
            .into_iter()
            .map(|e| (e.manager_id.clone(), e))
            .collect();
        Ok(matrix::manager_page(users, &entries, query))
    }

    /// Engineering staff, for PIC pickers.
    pub fn engineers(&self) -> PortalResult<Vec<User>> {
        self.directory.list_department(&Department::Engineering)
    }

    // ── Rule registry ────────────────────────────────────────────────

    pub fn add_rule(&mut self, actor_id: &str, input: NewBookingRule) -> PortalResult<BookingRule> {
        self.require_admin(actor_id)?;
        input.validate()?;
        let rule = BookingRule {
            id: self.ids.uuid(),
            rule_type: input.rule_type,
            condition: input.condition.trim().to_string(),
            assigned_pic: input.assigned_pic.trim().to_string(),
            priority: input.priority.unwrap_or(DEFAULT_RULE_PRIORITY),
            created_at: self.clock.now(),
        };
        self.store.insert_booking_rule(&rule)?;
        log::info!(
            "rule {} added: {} '{}' -> {} (priority {})",
            rule.id,
            rule.rule_type.as_str(),
            rule.condition,
            rule.assigned_pic,
            rule.priority,
        );
        self.publish(PortalEvent::BookingRuleSaved { rule: rule.clone() });
        Ok(rule)
    }

    pub fn update_rule(
        &mut self,
        actor_id: &str,
        rule_id: &str,
        update: &UpdateBookingRule,
    ) -> PortalResult<BookingRule> {
        self.require_admin(actor_id)?;
        let mut rule = self.store.get_booking_rule(rule_id)?;
        rule.apply_update(update)?;
        self.store.update_booking_rule(&rule)?;
        log::info!("rule {rule_id} updated");
        self.publish(PortalEvent::BookingRuleSaved { rule: rule.clone() });
        Ok(rule)
    }

    pub fn delete_rule(&mut self, actor_id: &str, rule_id: &str) -> PortalResult<()> {
        self.require_admin(actor_id)?;
        if !self.store.delete_booking_rule(rule_id)? {
            return Err(PortalError::not_found("booking rule", rule_id));
        }
        log::info!("rule {rule_id} deleted");
        self.publish(PortalEvent::BookingRuleDeleted {
            rule_id: rule_id.to_string(),
        });
        Ok(())
    }

    pub fn list_rules(&self) -> PortalResult<Vec<BookingRule>> {
        self.store.list_booking_rules()
    }

    /// A resolver built from the stored booking rules. Not used for new
    /// requests unless installed with `set_resolver`.
    pub fn booking_rule_resolver(&self, default: PicAssignment) -> PortalResult<PicResolver> {
        PicResolver::from_booking_rules(&self.store.list_booking_rules()?, default)
    }

    pub fn add_protocol(&mut self, actor_id: &str, input: NewProtocol) -> PortalResult<Protocol> {
        self.require_admin(actor_id)?;
        input.validate()?;
        let id = input.id.trim().to_string();
        if self.store.protocol_exists(&id)? {
            return Err(PortalError::validation(format!("protocol '{id}' already exists")));
        }

        let protocol = Protocol {
            uid: self.unused_protocol_uid()?,
            id,
            label: input.label.trim().to_string(),
            pic: input.pic.normalized(),
            is_active: input.is_active,
        };
        self.store.insert_protocol(&protocol)?;
        log::info!(
            "protocol {} ({}) added, pic={}",
            protocol.id,
            protocol.uid,
            protocol.pic
        );
        self.publish(PortalEvent::ProtocolSaved {
            protocol: protocol.clone(),
        });
        Ok(protocol)
    }

    fn unused_protocol_uid(&mut self) -> PortalResult<String> {
        for _ in 0..self.protocol_uid_attempts {
            let uid = self.ids.protocol_uid();
            if !self.store.protocol_uid_taken(&uid)? {
                return Ok(uid);
            }
        }
        Err(PortalError::Other(anyhow::anyhow!(
            "no unused protocol uid found after {} attempts",
            self.protocol_uid_attempts
        )))
    }

    pub fn set_protocol_pic(
        &mut self,
        actor_id: &str,
        protocol_id: &str,
        pic: PicAssignment,
    ) -> PortalResult<Protocol> {
        self.require_admin(actor_id)?;
        if pic.is_empty() {
            return Err(PortalError::validation("a protocol needs at least one PIC"));
        }
        self.store.set_protocol_pic(protocol_id, &pic.normalized())?;
        let protocol = self.store.get_protocol(protocol_id)?;
        log::info!("protocol {protocol_id} reassigned to {}", protocol.pic);
        self.publish(PortalEvent::ProtocolSaved {
            protocol: protocol.clone(),
        });
        Ok(protocol)
    }

    pub fn toggle_protocol_active(&mut self, actor_id: &str, protocol_id: &str) -> PortalResult<Protocol> {
        self.require_admin(actor_id)?;
        let mut protocol = self.store.get_protocol(protocol_id)?;
        protocol.is_active = !protocol.is_active;
        self.store.set_protocol_active(protocol_id, protocol.is_active)?;
        log::info!("protocol {protocol_id} active={}", protocol.is_active);
        self.publish(PortalEvent::ProtocolSaved {
            protocol: protocol.clone(),
        });
        Ok(protocol)
    }

    pub fn delete_protocol(&mut self, actor_id: &str, protocol_id: &str) -> PortalResult<()> {
        self.require_admin(actor_id)?;
        let protocol = self.store.get_protocol(protocol_id)?;
        if !self.store.delete_protocol(&protocol.id)? {
            return Err(PortalError::not_found("protocol", protocol_id));
        }
        log::info!("protocol {} deleted", protocol.id);
        self.publish(PortalEvent::ProtocolDeleted {
            protocol_id: protocol.id,
        });
        Ok(())
    }

    pub fn list_protocols(&self) -> PortalResult<Vec<Protocol>> {
        self.store.list_protocols(false)
    }

    /// Protocols a requester may pick from.
    pub fn selectable_protocols(&self) -> PortalResult<Vec<Protocol>> {
        self.store.list_protocols(true)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn execute(&mut self, command: PortalCommand) -> PortalResult<CommandOutcome> {
        log::debug!("portal: executing {}", command.name());
        let outcome = match command {
            PortalCommand::SubmitRequest { actor_id, request } => {
                CommandOutcome::Request(self.submit_request(&actor_id, request)?)
            }
            PortalCommand::ConfirmRequest {
                actor_id,
                request_id,
                note,
            } => CommandOutcome::Request(self.confirm_request(&request_id, &actor_id, &note)?),
            PortalCommand::CompleteRequest {
                actor_id,
                request_id,
            } => CommandOutcome::Request(self.complete_request(&request_id, &actor_id)?),
            PortalCommand::ListRequests { viewer_id } => {
                CommandOutcome::Requests(self.list_requests(&viewer_id)?)
            }
            PortalCommand::ToggleAssignment {
                actor_id,
                manager_id,
                engineer,
                expected_version,
            } => {
                let entry = match expected_version {
                    Some(version) => {
                        self.toggle_assignment_at(&actor_id, &manager_id, &engineer, version)?
                    }
                    None => self.toggle_assignment(&actor_id, &manager_id, &engineer)?,
                };
                CommandOutcome::Assignment(entry)
            }
            PortalCommand::ListManagers { actor_id, query } => {
                CommandOutcome::Managers(self.manager_page(&actor_id, &query)?)
            }
            PortalCommand::AddRule { actor_id, rule } => {
                CommandOutcome::Rule(self.add_rule(&actor_id, rule)?)
            }
            PortalCommand::UpdateRule {
                actor_id,
                rule_id,
                update,
            } => CommandOutcome::Rule(self.update_rule(&actor_id, &rule_id, &update)?),
            PortalCommand::DeleteRule { actor_id, rule_id } => {
                self.delete_rule(&actor_id, &rule_id)?;
                CommandOutcome::Deleted { id: rule_id }
            }
            PortalCommand::ListRules => CommandOutcome::Rules(self.list_rules()?),
            PortalCommand::AddProtocol { actor_id, protocol } => {
                CommandOutcome::Protocol(self.add_protocol(&actor_id, protocol)?)
            }
            PortalCommand::SetProtocolPic {
                actor_id,
                protocol_id,
                pic,
            } => CommandOutcome::Protocol(self.set_protocol_pic(&actor_id, &protocol_id, pic)?),
            PortalCommand::ToggleProtocol {
                actor_id,
                protocol_id,
            } => CommandOutcome::Protocol(self.toggle_protocol_active(&actor_id, &protocol_id)?),
            PortalCommand::DeleteProtocol {
                actor_id,
                protocol_id,
            } => {
                self.delete_protocol(&actor_id, &protocol_id)?;
                CommandOutcome::Deleted { id: protocol_id }
            }
            PortalCommand::ListProtocols { active_only } => CommandOutcome::Protocols(if active_only {
                self.selectable_protocols()?
            } else {
                self.list_protocols()?
            }),
        };
        Ok(outcome)
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Log and fan out a change. The write it describes has already
    /// succeeded, so a failure to log is reported but not returned.
    fn publish(&mut self, event: PortalEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => {
                let entry = EventLogEntry {
                    id: None,
                    event_type: event.type_name().to_string(),
                    document_id: event.document_id().to_string(),
                    payload,
                    recorded_at: self.clock.now(),
                };
                if let Err(e) = self.store.append_event(&entry) {
                    log::warn!("event log: could not record {}: {e}", entry.event_type);
                }
            }
            Err(e) => log::warn!("event log: could not serialize {}: {e}", event.type_name()),
        }
        self.bus.publish(&event);
    }
}

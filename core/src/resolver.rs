//! PIC resolution.
//!
//! A resolver is an ordered table of `(predicate, PIC)` entries followed
//! by a mandatory default. Entries are evaluated top to bottom and the
//! first match wins, so the table order is the precedence order. Because
//! the default always exists, every non-empty selection resolves.
//!
//! Evaluation order for one input:
//!   1. table entries, in order
//!   2. the submitting manager's assigned engineers (site visits only)
//!   3. the default

use crate::{
    config::ResolverConfig,
    error::{PortalError, PortalResult},
    normalize::{normalize, same},
    pic::PicAssignment,
    registry::{BookingRule, RuleType},
};
use serde::{Deserialize, Serialize};

pub const DIALUX_SPECIALIST: &str = "Therese";
pub const COSTING_PAIR: &str = "Mark / Karl";
pub const DEFAULT_PIC: &str = "Patrick";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "when", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    /// The selection includes this protocol keyword.
    SelectionContains(String),
    /// The request was raised for this sales team.
    TeamIs(String),
}

impl Predicate {
    pub fn matches(&self, input: &ResolutionInput) -> bool {
        match self {
            Self::SelectionContains(keyword) => input.selected.iter().any(|s| same(s, keyword)),
            Self::TeamIs(team) => input.team.as_deref().is_some_and(|t| same(t, team)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverEntry {
    pub predicate: Predicate,
    pub pic: PicAssignment,
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionInput {
    pub selected: Vec<String>,
    pub team: Option<String>,
    pub manager_default: Option<PicAssignment>,
}

impl ResolutionInput {
    pub fn new<I, S>(selected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected: selected.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_manager_default(mut self, pic: PicAssignment) -> Self {
        self.manager_default = Some(pic);
        self
    }

    fn has_selection(&self) -> bool {
        self.selected.iter().any(|s| !normalize(s).is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "index", rename_all = "snake_case")]
pub enum ResolutionSource {
    Entry(usize),
    ManagerDefault,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub pic: PicAssignment,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone)]
pub struct PicResolver {
    entries: Vec<ResolverEntry>,
    default: PicAssignment,
}

impl PicResolver {
    pub fn builder() -> PicResolverBuilder {
        PicResolverBuilder::default()
    }

    /// The routing table used at request creation:
    /// DIALux work goes to the simulation specialist, costing to the
    /// costing pair, everything else to the default engineer.
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ResolverEntry {
                    predicate: Predicate::SelectionContains("dialux".into()),
                    pic: PicAssignment::one(DIALUX_SPECIALIST),
                },
                ResolverEntry {
                    predicate: Predicate::SelectionContains("costing".into()),
                    pic: PicAssignment::one(COSTING_PAIR),
                },
            ],
            default: PicAssignment::one(DEFAULT_PIC),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> PortalResult<Self> {
        let mut builder = Self::builder();
        for rule in &config.keyword_rules {
            builder = builder.when(Predicate::SelectionContains(rule.keyword.clone()), rule.pic.clone());
        }
        for rule in &config.team_rules {
            builder = builder.when(Predicate::TeamIs(rule.team.clone()), rule.pic.clone());
        }
        if let Some(default) = &config.default_pic {
            builder = builder.otherwise(default.clone());
        }
        builder.build()
    }

    /// Build a table from admin booking rules, lowest priority number
    /// first. Specialist rules match on the selection, team rules on the
    /// team.
    pub fn from_booking_rules(rules: &[BookingRule], default: PicAssignment) -> PortalResult<Self> {
        let mut ordered: Vec<&BookingRule> = rules.iter().collect();
        ordered.sort_by(|a, b| {
            (a.priority, a.created_at, &a.id).cmp(&(b.priority, b.created_at, &b.id))
        });

        let mut builder = Self::builder();
        for rule in ordered {
            let predicate = match rule.rule_type {
                RuleType::Specialist => Predicate::SelectionContains(rule.condition.clone()),
                RuleType::Team => Predicate::TeamIs(rule.condition.clone()),
            };
            builder = builder.when(predicate, PicAssignment::one(rule.assigned_pic.clone()));
        }
        builder.otherwise(default).build()
    }

    pub fn entries(&self) -> &[ResolverEntry] {
        &self.entries
    }

    pub fn default_pic(&self) -> &PicAssignment {
        &self.default
    }

    pub fn resolve(&self, input: &ResolutionInput) -> PortalResult<Resolution> {
        if !input.has_selection() {
            return Err(PortalError::validation(
                "at least one service type must be selected",
            ));
        }

        if let Some((index, entry)) = self
            .entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.predicate.matches(input))
        {
            return Ok(Resolution {
                pic: entry.pic.clone(),
                source: ResolutionSource::Entry(index),
            });
        }

        if let Some(pic) = input.manager_default.as_ref().filter(|p| !p.is_empty()) {
            return Ok(Resolution {
                pic: pic.normalized(),
                source: ResolutionSource::ManagerDefault,
            });
        }

        Ok(Resolution {
            pic: self.default.clone(),
            source: ResolutionSource::Default,
        })
    }

    /// Shorthand for a bare selection with no team or manager context.
    pub fn resolve_selection<S: AsRef<str>>(&self, selected: &[S]) -> PortalResult<PicAssignment> {
        let input = ResolutionInput::new(selected.iter().map(|s| s.as_ref().to_string()));
        Ok(self.resolve(&input)?.pic)
    }
}

impl Default for PicResolver {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PicResolverBuilder {
    entries: Vec<ResolverEntry>,
    default: Option<PicAssignment>,
}

impl PicResolverBuilder {
    pub fn when(mut self, predicate: Predicate, pic: PicAssignment) -> Self {
        self.entries.push(ResolverEntry { predicate, pic });
        self
    }

    pub fn otherwise(mut self, pic: PicAssignment) -> Self {
        self.default = Some(pic);
        self
    }

    /// Fails if there is no default or any entry names no engineer.
    pub fn build(self) -> PortalResult<PicResolver> {
        let default = self
            .default
            .filter(|pic| !pic.is_empty())
            .ok_or_else(|| PortalError::validation("resolver table has no default PIC"))?;
        if let Some(entry) = self.entries.iter().find(|e| e.pic.is_empty()) {
            return Err(PortalError::validation(format!(
                "resolver entry {:?} has no PIC",
                entry.predicate
            )));
        }
        Ok(PicResolver {
            entries: self.entries,
            default,
        })
    }
}

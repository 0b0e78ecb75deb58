//! Endorsement Group Selector.
//!
//! Decides which peers are contacted for a proposal and what their
//! responses must satisfy.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::config::PolicyRule;
use crate::error::{ClientError, ClientResult};
use crate::transport::{ConnectionRegistry, DiscoveredEndorsers, Discovery, Layout, Peer};

/// One peer to contact, tagged with the group it represents.
#[derive(Debug, Clone)]
pub struct Selection {
    pub peer: Peer,
    pub group: String,
}

/// What the collected responses must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Every contacted organization representative endorsed (AND).
    All,
    /// At least one contacted peer endorsed (OR).
    Any,
    /// At least one layout is fully met by successful responses.
    Layouts(Vec<Layout>),
}

#[derive(Debug, Clone)]
pub struct EndorsementPlan {
    pub selections: Vec<Selection>,
    pub requirement: Requirement,
}

/// Active selection strategy.
#[derive(Clone)]
pub enum EndorsementStrategy {
    Static { orgs: Vec<String>, rule: PolicyRule },
    Discovery(Arc<dyn Discovery>),
}

impl std::fmt::Debug for EndorsementStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndorsementStrategy::Static { orgs, rule } => f
                .debug_struct("Static")
                .field("orgs", orgs)
                .field("rule", rule)
                .finish(),
            EndorsementStrategy::Discovery(_) => f.write_str("Discovery"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupSelector {
    strategy: EndorsementStrategy,
}

impl GroupSelector {
    pub fn new(strategy: EndorsementStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &EndorsementStrategy {
        &self.strategy
    }

    pub async fn select(
        &self,
        registry: &ConnectionRegistry,
        channel: &str,
        chaincode: &str,
    ) -> ClientResult<EndorsementPlan> {
        let mut rng = fastrand::Rng::new();
        let plan = match &self.strategy {
            EndorsementStrategy::Static { orgs, rule } => {
                select_static(&registry.peers_by_org(channel), orgs, *rule, &mut rng)?
            }
            EndorsementStrategy::Discovery(discovery) => {
                let discovered = discovery.discover(channel, &[chaincode.to_string()]).await?;
                select_from_layouts(&discovered, channel, chaincode, &mut rng)?
            }
        };

        tracing::debug!(
            channel = %channel,
            chaincode = %chaincode,
            peers = ?plan.selections.iter().map(|s| s.peer.name.as_str()).collect::<Vec<_>>(),
            "Endorsers selected"
        );
        Ok(plan)
    }
}

/// Static policy: one random peer per org (AND) or one from the union (OR).
pub fn select_static(
    groups: &BTreeMap<String, Vec<Peer>>,
    orgs: &[String],
    rule: PolicyRule,
    rng: &mut fastrand::Rng,
) -> ClientResult<EndorsementPlan> {
    if orgs.is_empty() {
        return Err(ClientError::Configuration(
            "endorsement policy names no organization".to_string(),
        ));
    }

    match rule {
        PolicyRule::And => {
            let mut seen = HashSet::new();
            let mut selections = Vec::with_capacity(orgs.len());
            for org in orgs.iter().filter(|org| seen.insert(org.as_str())) {
                let peers = groups.get(org).filter(|p| !p.is_empty()).ok_or_else(|| {
                    ClientError::NoAvailablePeer(format!(
                        "organization '{}' has no available peer",
                        org
                    ))
                })?;
                selections.push(Selection {
                    peer: peers[rng.usize(..peers.len())].clone(),
                    group: org.clone(),
                });
            }
            Ok(EndorsementPlan {
                selections,
                requirement: Requirement::All,
            })
        }
        PolicyRule::Or => {
            let eligible: Vec<(&Peer, &String)> = orgs
                .iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter_map(|org| groups.get(org).map(|peers| (peers, org)))
                .flat_map(|(peers, org)| peers.iter().map(move |p| (p, org)))
                .collect();
            if eligible.is_empty() {
                return Err(ClientError::NoAvailablePeer(format!(
                    "no available peer in any of [{}]",
                    orgs.join(", ")
                )));
            }
            let (peer, org) = eligible[rng.usize(..eligible.len())];
            Ok(EndorsementPlan {
                selections: vec![Selection {
                    peer: peer.clone(),
                    group: org.clone(),
                }],
                requirement: Requirement::Any,
            })
        }
    }
}

/// Discovery: pick a random feasible layout and `count` distinct random
/// peers for each of its groups.
pub fn select_from_layouts(
    discovered: &DiscoveredEndorsers,
    channel: &str,
    chaincode: &str,
    rng: &mut fastrand::Rng,
) -> ClientResult<EndorsementPlan> {
    let no_layout = || ClientError::NoEndorsementLayout {
        channel: channel.to_string(),
        chaincode: chaincode.to_string(),
    };

    if discovered.layouts.is_empty() || discovered.groups.values().all(Vec::is_empty) {
        return Err(no_layout());
    }

    let feasible: Vec<&Layout> = discovered
        .layouts
        .iter()
        .filter(|layout| {
            !layout.is_empty()
                && layout.iter().all(|(group, count)| {
                    discovered
                        .groups
                        .get(group)
                        .map_or(false, |peers| peers.len() >= *count)
                })
        })
        .collect();
    if feasible.is_empty() {
        tracing::warn!(
            channel = %channel,
            chaincode = %chaincode,
            layouts = discovered.layouts.len(),
            "No layout can be satisfied by the available peers"
        );
        return Err(no_layout());
    }

    let layout = feasible[rng.usize(..feasible.len())];
    let mut selections = Vec::new();
    for (group, count) in layout {
        let mut candidates = discovered.groups.get(group).cloned().unwrap_or_default();
        rng.shuffle(&mut candidates);
        selections.extend(candidates.into_iter().take(*count).map(|peer| Selection {
            peer,
            group: group.clone(),
        }));
    }

    Ok(EndorsementPlan {
        selections,
        requirement: Requirement::Layouts(discovered.layouts.clone()),
    })
}

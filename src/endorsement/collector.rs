//! Endorsement Collector.
//!
//! # Responsibilities
//! - Send the identical signed proposal to every selected peer concurrently
//! - Bound each call with its own deadline
//! - Wait for every call, then judge the completed set against the plan

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;

use crate::endorsement::selector::{EndorsementPlan, Requirement, Selection};
use crate::error::{ClientError, ClientResult, PeerFailure, TransportError};
use crate::observability::metrics;
use crate::protos::peer::{ProposalResponse, SignedProposal};
use crate::resilience::with_timeout;

/// Outcome of one peer call.
#[derive(Debug, Clone)]
pub struct PeerResponse {
    pub peer: String,
    pub group: String,
    pub result: Result<ProposalResponse, TransportError>,
}

impl PeerResponse {
    /// Why this response cannot be used, or `None` when it qualifies.
    fn rejection(&self) -> Option<String> {
        match &self.result {
            Err(e) => Some(e.to_string()),
            Ok(response) => {
                let (status, message) = response
                    .response
                    .as_ref()
                    .map(|r| (r.status, r.message.as_str()))
                    .unwrap_or((0, "missing response"));
                if !(200..400).contains(&status) {
                    Some(format!("chaincode returned {}: {}", status, message))
                } else if response.endorsement.is_none() {
                    Some("response carries no endorsement".to_string())
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndorsementCollector {
    timeout: Duration,
}

impl EndorsementCollector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Fan out to every selection; returns one response per selection.
    pub async fn collect(
        &self,
        proposal: &SignedProposal,
        selections: &[Selection],
    ) -> Vec<PeerResponse> {
        let calls = selections.iter().map(|selection| async move {
            let result = with_timeout(
                self.timeout,
                selection.peer.endorser.process_proposal(proposal),
            )
            .await;
            PeerResponse {
                peer: selection.peer.name.clone(),
                group: selection.group.clone(),
                result,
            }
        });
        join_all(calls).await
    }

    /// Collect, then evaluate against the plan.
    pub async fn endorse(
        &self,
        proposal: &SignedProposal,
        plan: &EndorsementPlan,
    ) -> ClientResult<Vec<ProposalResponse>> {
        let responses = self.collect(proposal, &plan.selections).await;
        evaluate(&plan.requirement, responses)
    }
}

/// Judge a completed response set.
///
/// Returns the qualifying responses when the requirement is met and every
/// qualifying response carries the same proposal-response payload.
pub fn evaluate(
    requirement: &Requirement,
    responses: Vec<PeerResponse>,
) -> ClientResult<Vec<ProposalResponse>> {
    let mut failures = Vec::new();
    let mut endorsed: Vec<(String, ProposalResponse)> = Vec::new();

    for response in responses {
        match response.rejection() {
            Some(reason) => {
                tracing::warn!(
                    peer = %response.peer,
                    group = %response.group,
                    reason = %reason,
                    "Endorsement rejected"
                );
                metrics::record_endorsement(&response.peer, false);
                failures.push(PeerFailure {
                    peer: response.peer,
                    group: response.group,
                    reason,
                });
            }
            None => {
                metrics::record_endorsement(&response.peer, true);
                if let Ok(r) = response.result {
                    endorsed.push((response.group, r));
                }
            }
        }
    }

    let satisfied = !endorsed.is_empty()
        && match requirement {
            Requirement::All => failures.is_empty(),
            Requirement::Any => true,
            Requirement::Layouts(layouts) => {
                let mut per_group: HashMap<&str, usize> = HashMap::new();
                for (group, _) in &endorsed {
                    *per_group.entry(group.as_str()).or_default() += 1;
                }
                layouts.iter().any(|layout| {
                    layout.iter().all(|(group, count)| {
                        per_group.get(group.as_str()).copied().unwrap_or(0) >= *count
                    })
                })
            }
        };

    if !satisfied {
        return Err(ClientError::EndorsementFailed {
            reason: match requirement {
                Requirement::All => "not every required organization endorsed".to_string(),
                Requirement::Any => "no peer endorsed".to_string(),
                Requirement::Layouts(_) => "no endorsement layout satisfied".to_string(),
            },
            failures,
        });
    }

    let first = &endorsed[0].1.payload;
    if endorsed.iter().any(|(_, r)| &r.payload != first) {
        return Err(ClientError::EndorsementFailed {
            reason: "endorsers returned different proposal response payloads".to_string(),
            failures,
        });
    }

    Ok(endorsed.into_iter().map(|(_, r)| r).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{endorsed_response, peer, ScriptedEndorser};
    use crate::transport::Layout;
    use std::sync::Arc;

    fn ok(peer: &str, group: &str) -> PeerResponse {
        PeerResponse {
            peer: peer.into(),
            group: group.into(),
            result: Ok(endorsed_response(200, b"prp")),
        }
    }

    fn failed(peer: &str, group: &str) -> PeerResponse {
        PeerResponse {
            peer: peer.into(),
            group: group.into(),
            result: Err(TransportError::Unavailable("refused".into())),
        }
    }

    fn layout(entries: &[(&str, usize)]) -> Layout {
        entries.iter().map(|(g, c)| (g.to_string(), *c)).collect()
    }

    #[test]
    fn test_layout_requires_count_successes() {
        let requirement = Requirement::Layouts(vec![layout(&[("orgX", 2)])]);

        let result = evaluate(&requirement, vec![ok("x0", "orgX"), ok("x1", "orgX")]);
        assert_eq!(result.unwrap().len(), 2);

        let result = evaluate(&requirement, vec![ok("x0", "orgX"), failed("x1", "orgX")]);
        match result {
            Err(ClientError::EndorsementFailed { failures, .. }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].peer, "x1");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let result = evaluate(&requirement, vec![failed("x0", "orgX"), failed("x1", "orgX")]);
        assert!(matches!(result, Err(ClientError::EndorsementFailed { .. })));
    }

    #[test]
    fn test_any_layout_suffices() {
        let requirement = Requirement::Layouts(vec![
            layout(&[("A", 1), ("B", 1)]),
            layout(&[("C", 1)]),
        ]);
        let result = evaluate(&requirement, vec![failed("a0", "A"), ok("c0", "C")]);
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn test_and_requires_every_org() {
        let result = evaluate(&Requirement::All, vec![ok("a0", "A"), failed("b0", "B")]);
        assert!(matches!(result, Err(ClientError::EndorsementFailed { .. })));

        let result = evaluate(&Requirement::All, vec![ok("a0", "A"), ok("b0", "B")]);
        assert_eq!(result.unwrap().len(), 2);
    }

    #[test]
    fn test_chaincode_error_is_peer_failure() {
        let rejected = PeerResponse {
            peer: "a0".into(),
            group: "A".into(),
            result: Ok(endorsed_response(500, b"prp")),
        };
        match evaluate(&Requirement::Any, vec![rejected]) {
            Err(ClientError::EndorsementFailed { failures, .. }) => {
                assert!(failures[0].reason.contains("chaincode returned 500"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_payloads_rejected() {
        let other = PeerResponse {
            peer: "b0".into(),
            group: "B".into(),
            result: Ok(endorsed_response(200, b"different")),
        };
        let result = evaluate(&Requirement::All, vec![ok("a0", "A"), other]);
        match result {
            Err(ClientError::EndorsementFailed { reason, .. }) => {
                assert!(reason.contains("different proposal response payloads"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_peer_times_out_without_blocking_others() {
        let fast = Arc::new(ScriptedEndorser::endorsing(b"prp"));
        let slow = Arc::new(ScriptedEndorser::endorsing(b"prp").delayed(Duration::from_secs(60)));
        let selections = vec![
            Selection {
                peer: peer("fast", "A", fast.clone()),
                group: "A".into(),
            },
            Selection {
                peer: peer("slow", "B", slow.clone()),
                group: "B".into(),
            },
        ];

        let collector = EndorsementCollector::new(Duration::from_secs(5));
        let proposal = SignedProposal {
            proposal_bytes: b"proposal".to_vec(),
            signature: b"sig".to_vec(),
        };
        let responses = collector.collect(&proposal, &selections).await;

        assert_eq!(responses.len(), 2);
        assert!(responses[0].result.is_ok());
        assert_eq!(responses[1].result, Err(TransportError::Timeout(5000)));

        let plan = EndorsementPlan {
            selections,
            requirement: Requirement::Any,
        };
        let endorsed = collector.endorse(&proposal, &plan).await.unwrap();
        assert_eq!(endorsed.len(), 1);
    }
}

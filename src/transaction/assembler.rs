//! Transaction Assembler.

use prost::Message;

use crate::crypto::{CryptoSuite, Identity};
use crate::error::{ClientError, ClientResult};
use crate::proposal::{header, Proposal};
use crate::protos::common::Envelope;
use crate::protos::peer::{
    ChaincodeActionPayload, ChaincodeEndorsedAction, ChaincodeProposalPayload, ProposalResponse,
    Transaction, TransactionAction,
};

/// Merge a proposal and its endorsements into a signed transaction envelope.
pub fn assemble_transaction(
    proposal: &Proposal,
    responses: &[ProposalResponse],
    identity: &Identity,
    suite: &dyn CryptoSuite,
) -> ClientResult<Envelope> {
    let first = responses.first().ok_or_else(|| ClientError::EndorsementFailed {
        reason: "no endorsements to assemble".to_string(),
        failures: Vec::new(),
    })?;
    if responses.iter().any(|r| r.payload != first.payload) {
        return Err(ClientError::EndorsementFailed {
            reason: "endorsers returned different proposal response payloads".to_string(),
            failures: Vec::new(),
        });
    }

    let endorsements = responses
        .iter()
        .filter_map(|r| r.endorsement.clone())
        .collect::<Vec<_>>();

    // Private data never leaves the endorsers.
    let visible_payload = ChaincodeProposalPayload {
        input: proposal.payload.input.clone(),
        transient_map: Default::default(),
    };

    let action_payload = ChaincodeActionPayload {
        chaincode_proposal_payload: visible_payload.encode_to_vec(),
        action: Some(ChaincodeEndorsedAction {
            proposal_response_payload: first.payload.clone(),
            endorsements,
        }),
    };

    let transaction = Transaction {
        actions: vec![TransactionAction {
            header: proposal.header.signature_header.clone(),
            payload: action_payload.encode_to_vec(),
        }],
    };

    header::signed_envelope(
        proposal.header.clone(),
        transaction.encode_to_vec(),
        identity,
        suite,
    )
}

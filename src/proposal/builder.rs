//! Proposal Builder.

use std::collections::HashMap;

use prost::Message;

use crate::crypto::{CryptoSuite, Identity};
use crate::error::{ClientError, ClientResult};
use crate::proposal::header;
use crate::protos::common::{Header, HeaderType};
use crate::protos::peer::{
    self, ChaincodeHeaderExtension, ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec,
    ChaincodeProposalPayload, ChaincodeSpec, ChaincodeType,
};

/// One chaincode call.
#[derive(Debug, Clone, Default)]
pub struct ChaincodeInvocation {
    pub channel: String,
    pub chaincode: String,
    pub version: Option<String>,
    /// Function name followed by its arguments.
    pub args: Vec<Vec<u8>>,
    /// Private data; travels in the proposal only.
    pub transient: Option<HashMap<String, Vec<u8>>>,
}

impl ChaincodeInvocation {
    pub fn new(channel: impl Into<String>, chaincode: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chaincode: chaincode.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_transient(mut self, transient: HashMap<String, Vec<u8>>) -> Self {
        self.transient = Some(transient);
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.channel.trim().is_empty() {
            return Err(ClientError::Configuration("channel id is empty".to_string()));
        }
        if self.chaincode.trim().is_empty() {
            return Err(ClientError::Configuration("chaincode name is empty".to_string()));
        }
        Ok(())
    }
}

/// Unsigned proposal plus the parts the assembler reuses.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub tx_id: String,
    pub channel: String,
    pub chaincode: String,
    pub nonce: Vec<u8>,
    /// Header carried unchanged into the transaction payload.
    pub header: Header,
    pub payload: ChaincodeProposalPayload,
    /// Serialized `peer.Proposal`.
    pub bytes: Vec<u8>,
}

/// A proposal signed once; every endorser receives `wire` unchanged.
#[derive(Debug, Clone)]
pub struct SignedProposal {
    pub proposal: Proposal,
    pub wire: peer::SignedProposal,
}

impl SignedProposal {
    pub fn tx_id(&self) -> &str {
        &self.proposal.tx_id
    }
}

/// Builds and signs proposals for one identity.
pub struct ProposalBuilder<'a> {
    identity: &'a Identity,
    suite: &'a dyn CryptoSuite,
}

impl<'a> ProposalBuilder<'a> {
    pub fn new(identity: &'a Identity, suite: &'a dyn CryptoSuite) -> Self {
        Self { identity, suite }
    }

    /// Build with a fresh CSPRNG nonce.
    pub fn build(&self, invocation: &ChaincodeInvocation) -> ClientResult<Proposal> {
        self.build_with_nonce(invocation, header::new_nonce())
    }

    /// Build with a caller-supplied nonce; the transaction id follows from it.
    pub fn build_with_nonce(
        &self,
        invocation: &ChaincodeInvocation,
        nonce: Vec<u8>,
    ) -> ClientResult<Proposal> {
        invocation.validate()?;
        let creator = self.identity.creator()?;
        let tx_id = header::compute_tx_id(self.suite, &nonce, &creator);

        let chaincode_id = ChaincodeId {
            path: String::new(),
            name: invocation.chaincode.clone(),
            version: invocation.version.clone().unwrap_or_default(),
        };
        let extension = ChaincodeHeaderExtension {
            chaincode_id: Some(chaincode_id.clone()),
        };
        let channel_header = header::channel_header(
            HeaderType::EndorserTransaction,
            &invocation.channel,
            &tx_id,
            extension.encode_to_vec(),
        );
        let signature_header = header::signature_header(&creator, &nonce);
        let proposal_header = header::header(&channel_header, &signature_header);

        let spec = ChaincodeInvocationSpec {
            chaincode_spec: Some(ChaincodeSpec {
                r#type: ChaincodeType::Golang as i32,
                chaincode_id: Some(chaincode_id),
                input: Some(ChaincodeInput {
                    args: invocation.args.clone(),
                    decorations: HashMap::new(),
                    is_init: false,
                }),
                timeout: 0,
            }),
        };
        let payload = ChaincodeProposalPayload {
            input: spec.encode_to_vec(),
            transient_map: invocation.transient.clone().unwrap_or_default(),
        };

        let bytes = peer::Proposal {
            header: proposal_header.encode_to_vec(),
            payload: payload.encode_to_vec(),
            extension: Vec::new(),
        }
        .encode_to_vec();

        tracing::debug!(
            tx_id = %tx_id,
            channel = %invocation.channel,
            chaincode = %invocation.chaincode,
            "Proposal built"
        );

        Ok(Proposal {
            tx_id,
            channel: invocation.channel.clone(),
            chaincode: invocation.chaincode.clone(),
            nonce,
            header: proposal_header,
            payload,
            bytes,
        })
    }

    pub fn sign(&self, proposal: Proposal) -> ClientResult<SignedProposal> {
        let signature = self.suite.sign(&proposal.bytes, &self.identity.private_key)?;
        let wire = peer::SignedProposal {
            proposal_bytes: proposal.bytes.clone(),
            signature,
        };
        Ok(SignedProposal { proposal, wire })
    }

    pub fn build_signed(&self, invocation: &ChaincodeInvocation) -> ClientResult<SignedProposal> {
        let proposal = self.build(invocation)?;
        self.sign(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EcdsaP256Suite, PrivateKey};
    use crate::protos::common::{ChannelHeader, SignatureHeader};

    fn identity() -> Identity {
        Identity::new(
            "Org1MSP",
            b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n".to_vec(),
            PrivateKey::from_bytes(vec![7u8; 32]),
        )
    }

    fn invocation() -> ChaincodeInvocation {
        ChaincodeInvocation::new("mychannel", "basic").with_args(["transfer", "a", "b", "10"])
    }

    #[test]
    fn test_distinct_nonces_give_distinct_tx_ids() {
        let identity = identity();
        let suite = EcdsaP256Suite::new();
        let builder = ProposalBuilder::new(&identity, &suite);

        let a = builder.build(&invocation()).unwrap();
        let b = builder.build(&invocation()).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.tx_id, b.tx_id);
    }

    #[test]
    fn test_same_nonce_same_tx_id() {
        let identity = identity();
        let suite = EcdsaP256Suite::new();
        let builder = ProposalBuilder::new(&identity, &suite);

        let a = builder.build_with_nonce(&invocation(), vec![1; 24]).unwrap();
        let b = builder.build_with_nonce(&invocation(), vec![1; 24]).unwrap();
        assert_eq!(a.tx_id, b.tx_id);
    }

    #[test]
    fn test_headers_carry_tx_id_and_creator() {
        let identity = identity();
        let suite = EcdsaP256Suite::new();
        let builder = ProposalBuilder::new(&identity, &suite);
        let proposal = builder.build(&invocation()).unwrap();

        let channel_header = ChannelHeader::decode(proposal.header.channel_header.as_slice()).unwrap();
        assert_eq!(channel_header.tx_id, proposal.tx_id);
        assert_eq!(channel_header.channel_id, "mychannel");
        assert_eq!(channel_header.r#type, HeaderType::EndorserTransaction as i32);

        let signature_header =
            SignatureHeader::decode(proposal.header.signature_header.as_slice()).unwrap();
        assert_eq!(signature_header.creator, identity.creator().unwrap());
        assert_eq!(signature_header.nonce, proposal.nonce);

        let spec = ChaincodeInvocationSpec::decode(proposal.payload.input.as_slice()).unwrap();
        let input = spec.chaincode_spec.unwrap().input.unwrap();
        assert_eq!(input.args[0], b"transfer".to_vec());
        assert_eq!(input.args.len(), 4);
    }

    #[test]
    fn test_signature_verifies_over_proposal_bytes() {
        let identity = identity();
        let suite = EcdsaP256Suite::new();
        let builder = ProposalBuilder::new(&identity, &suite);
        let signed = builder.build_signed(&invocation()).unwrap();

        let public = suite.public_key(&identity.private_key).unwrap();
        assert_eq!(signed.wire.proposal_bytes, signed.proposal.bytes);
        assert!(suite
            .verify(&signed.wire.proposal_bytes, &signed.wire.signature, &public)
            .unwrap());
    }

    #[test]
    fn test_identity_without_org_rejected() {
        let mut identity = identity();
        identity.msp_id.clear();
        let suite = EcdsaP256Suite::new();
        let builder = ProposalBuilder::new(&identity, &suite);
        assert!(matches!(
            builder.build(&invocation()),
            Err(ClientError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_empty_channel_is_configuration_error() {
        let identity = identity();
        let suite = EcdsaP256Suite::new();
        let builder = ProposalBuilder::new(&identity, &suite);
        let invocation = ChaincodeInvocation::new("", "basic");
        assert!(matches!(
            builder.build(&invocation),
            Err(ClientError::Configuration(_))
        ));
    }
}

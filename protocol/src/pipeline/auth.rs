//! Signed-invocation checks, shared by the enqueue path, signed immediate
//! invokes and inline batch tasks.
//!
//! Order matters: everything that needs no state (envelope shape, target,
//! nonce syntax, argument decoding) runs before the ACL is asked, and the
//! nonce is recorded only after every signature verified.

use tracing::warn;

use super::{Chaincode, Contract};
use crate::acl::AclIdentity;
use crate::context::Environment;
use crate::crypto::PublicKey;
use crate::envelope::SignedEnvelope;
use crate::error::{LedgerError, LedgerResult};
use crate::nonce::parse_nonce;
use crate::router::{AuthPolicy, Route};
use crate::stub::ChaincodeStub;
use crate::token::TokenConfig;
use crate::types::AccountRef;

/// A signed call that passed every check.
pub(crate) struct SignedCall {
    pub envelope: SignedEnvelope,
    pub sender: AccountRef,
    pub nonce: u64,
}

impl<C: Contract> Chaincode<C> {
    pub(crate) fn authorize_signed(
        &self,
        stub: &mut dyn ChaincodeStub,
        route: &Route<C>,
        function: &str,
        rest: &[Vec<u8>],
    ) -> LedgerResult<SignedCall> {
        let envelope = SignedEnvelope::parse(function, rest, route.arity())?;
        envelope.check_target(stub.channel_id(), stub.chaincode_name())?;
        let nonce = parse_nonce(&envelope.nonce)?;
        let args: Vec<Vec<u8>> = envelope.args.iter().map(|a| a.clone().into_bytes()).collect();
        route.check(&args)?;

        let identity = authenticate(&self.env, stub, route.auth(), &envelope)?;
        self.nonces.check_and_record(stub, &identity.address, nonce)?;
        Ok(SignedCall {
            sender: identity.account_ref(),
            envelope,
            nonce,
        })
    }
}

/// Resolves the signer set, verifies every signature and applies `policy`.
pub(crate) fn authenticate(
    env: &Environment,
    stub: &mut dyn ChaincodeStub,
    policy: AuthPolicy,
    envelope: &SignedEnvelope,
) -> LedgerResult<AclIdentity> {
    let identity = env.acl.check_keys(stub, &envelope.public_keys)?;
    identity.check_status(true)?;
    if identity.key_types.len() != envelope.public_keys.len() {
        return Err(LedgerError::Invariant(format!(
            "ACL returned {} key types for {} keys",
            identity.key_types.len(),
            envelope.public_keys.len()
        )));
    }

    let keys = envelope
        .public_keys
        .iter()
        .zip(&identity.key_types)
        .map(|(text, key_type)| PublicKey::from_base58(*key_type, text))
        .collect::<Result<Vec<_>, _>>()?;
    let signatures = envelope.signature_bytes()?;
    if let Err(e) = env.schemes.verify_all(&keys, &envelope.message(), &signatures) {
        warn!(address = %identity.address, method = %envelope.method, "signature rejected");
        return Err(e);
    }
    if identity.is_multisig && keys.len() != identity.required_signatures as usize {
        warn!(
            address = %identity.address,
            presented = keys.len(),
            required = identity.required_signatures,
            "incomplete multisig signer set"
        );
        return Err(LedgerError::InvalidSignature);
    }

    match policy {
        AuthPolicy::None | AuthPolicy::Signed => {}
        AuthPolicy::MultiSig => {
            if !identity.is_multisig {
                return Err(LedgerError::Unauthorized);
            }
        }
        AuthPolicy::Admin => {
            let config = TokenConfig::load(&*stub)?.ok_or(LedgerError::NotInitialized)?;
            if config.issuer != identity.address {
                warn!(address = %identity.address, "admin method called by non-issuer");
                return Err(LedgerError::Unauthorized);
            }
        }
    }
    Ok(identity)
}

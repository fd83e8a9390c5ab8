//! ACL client that queries the ACL chaincode through the stub.

use tracing::{debug, warn};

use super::{
    AccountStatus, AclClient, AclIdentity, RightRequest, ACL_CHECK_KEYS, ACL_GET_ACCOUNT_INFO,
    KEY_LIST_SEPARATOR,
};
use crate::error::{LedgerError, LedgerResult};
use crate::stub::{ChaincodeStub, Response};
use crate::types::proto::{self, AccountInfoRecord, AclResponseRecord, HaveRightRecord};
use crate::types::Address;

#[derive(Debug, Clone)]
pub struct ChaincodeAcl {
    chaincode: String,
}

impl ChaincodeAcl {
    pub fn new(chaincode: impl Into<String>) -> Self {
        Self {
            chaincode: chaincode.into(),
        }
    }

    pub fn chaincode(&self) -> &str {
        &self.chaincode
    }

    fn call(&self, stub: &mut dyn ChaincodeStub, args: &[Vec<u8>]) -> LedgerResult<Response> {
        // Same channel: the ACL is installed next to us.
        stub.invoke_chaincode(&self.chaincode, args, "")
    }

    fn cross_call_error(&self, response: &Response) -> LedgerError {
        LedgerError::CrossCall {
            chaincode: self.chaincode.clone(),
            message: response.message.clone(),
        }
    }
}

impl AclClient for ChaincodeAcl {
    fn check_keys(
        &self,
        stub: &mut dyn ChaincodeStub,
        keys: &[String],
    ) -> LedgerResult<AclIdentity> {
        let args = vec![
            ACL_CHECK_KEYS.as_bytes().to_vec(),
            keys.join(KEY_LIST_SEPARATOR).into_bytes(),
        ];
        let response = self.call(stub, &args)?;
        if !response.is_ok() {
            // The ACL answers unknown keys with an error response; that is an
            // authentication failure, not an outage.
            warn!(chaincode = %self.chaincode, message = %response.message, "checkKeys rejected");
            return Err(LedgerError::UnknownKey(response.message));
        }
        let record: AclResponseRecord = proto::decode(&response.payload)?;
        let identity = AclIdentity::from_record(record)?;
        if identity.key_types.len() != keys.len() {
            return Err(LedgerError::Malformed(format!(
                "ACL returned {} key types for {} keys",
                identity.key_types.len(),
                keys.len()
            )));
        }
        Ok(identity)
    }

    fn account_info(
        &self,
        stub: &mut dyn ChaincodeStub,
        address: &Address,
    ) -> LedgerResult<AccountStatus> {
        let args = vec![
            ACL_GET_ACCOUNT_INFO.as_bytes().to_vec(),
            address.to_string().into_bytes(),
        ];
        let response = self.call(stub, &args)?;
        if !response.is_ok() {
            // An error answer means the ACL has no such account. Callers decide
            // whether an unknown address is acceptable.
            debug!(
                chaincode = %self.chaincode,
                %address,
                message = %response.message,
                "getAccountInfo rejected"
            );
            return Err(LedgerError::UnknownKey(response.message));
        }
        let record: AccountInfoRecord = proto::decode(&response.payload)?;
        Ok(record.into())
    }

    fn has_right(
        &self,
        stub: &mut dyn ChaincodeStub,
        request: &RightRequest,
    ) -> LedgerResult<bool> {
        let response = self.call(stub, &request.to_args())?;
        if !response.is_ok() {
            return Err(self.cross_call_error(&response));
        }
        let record: HaveRightRecord = proto::decode(&response.payload)?;
        Ok(record.have_right)
    }
}
